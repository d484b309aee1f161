// src/lib.rs

//! Presswork: an async content-pipeline execution engine.
//!
//! Presswork turns input documents into output artifacts by running them
//! through named chains of modules:
//!  - Pipelines reference modules by identity and declare dependencies on
//!    other pipelines' outputs.
//!  - Dependencies are validated up front and layered into waves; pipelines of
//!    one wave run concurrently, per-document work fans out over a worker pool.
//!  - Module outputs are cached under a content-hash key, so unchanged inputs
//!    skip the module entirely on the next build.
//!  - Failures follow a per-pipeline policy: abort the build or skip the
//!    failing document.

pub mod cache;
pub mod config;
pub mod core;
pub mod engine;
pub mod error;
pub mod graph;
pub mod modules;
pub mod pipeline;
pub mod provider;
pub mod registry;

// --- Re-exports for the Public API ---

pub use crate::core::{
  BuildOptions, BuildStatus, CancellationSignal, Content, Diagnostic, DiagnosticsSink, Document, DocumentBuilder,
  ExecutionContext, ExecutionMode, FailurePolicy, FnModule, Metadata, MetadataValue, Module, ModuleCategory,
  ModuleContext, ModuleError, PipelineStatus, Settings, Severity,
};

pub use crate::cache::{CacheKey, CacheStats, DocumentCache};
pub use crate::config::{CacheConfig, EngineConfig};
pub use crate::engine::{BuildReport, Engine};
pub use crate::error::{PressError, PressResult};
pub use crate::graph::ExecutionPlan;
pub use crate::modules::{FromDependencies, ReadFiles, SetMetadata, WriteFiles};
pub use crate::pipeline::Pipeline;
pub use crate::provider::{FileProvider, InMemoryFileProvider, LocalFileProvider};
pub use crate::registry::ModuleRegistry;

/*
    Typical build:
    1. Create an `Engine` from an `EngineConfig`.
    2. Register modules with `engine.register_module(..)`; identities are unique.
    3. Declare pipelines: `Pipeline::new("posts").with_input("read").with_process("render")`,
       with `.depends_on("assets")` for cross-pipeline inputs.
    4. Call `engine.build(BuildOptions::new().input_provider(..).output_provider(..)).await`.
       Wiring errors come back as `Err`; everything else is in the `BuildReport`.
    5. Build again with the same engine: modules whose inputs did not change are skipped.
*/
