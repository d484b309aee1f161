// presswork/src/core/control.rs

//! Policies that steer execution and the outcome of a build.

use serde::{Deserialize, Serialize};

/// What a pipeline does when one of its modules fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
  /// Any module error halts the entire build.
  #[default]
  AbortBuild,
  /// A failing document is dropped with a recorded diagnostic; its siblings continue.
  SkipDocument,
}

/// Position of a module inside a pipeline. Only affects scheduling order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ModuleCategory {
  Input,
  Process,
  Output,
}

impl std::fmt::Display for ModuleCategory {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      ModuleCategory::Input => f.write_str("input"),
      ModuleCategory::Process => f.write_str("process"),
      ModuleCategory::Output => f.write_str("output"),
    }
  }
}

/// How the scheduler invokes a module.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
  /// One call with the whole document set.
  Batch,
  /// One call per document, run concurrently on the worker pool.
  PerDocument,
}

/// Single status a build ends with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildStatus {
  Success,
  SuccessWithWarnings,
  Failed,
  /// Stopped cooperatively. Outputs are discarded.
  Cancelled,
}

/// Per-pipeline result inside a build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStatus {
  Completed,
  Failed,
  /// Not run because a dependency failed or was skipped.
  Skipped,
  /// Stopped by cancellation or by another pipeline aborting the build.
  Halted,
}
