pub mod context;
pub mod control;
pub mod diagnostics;
pub mod document;
pub mod metadata;
pub mod module;
pub mod settings;

// Re-export key types for easier access from other presswork modules (and lib.rs)
pub use context::{BuildOptions, CancellationSignal, ExecutionContext};
pub use control::{BuildStatus, ExecutionMode, FailurePolicy, ModuleCategory, PipelineStatus};
pub use diagnostics::{Diagnostic, DiagnosticsSink, Severity};
pub use document::{Content, Document, DocumentBuilder};
pub use metadata::{Metadata, MetadataValue};
pub use module::{FnModule, Module, ModuleContext, ModuleError};
pub use settings::Settings;
