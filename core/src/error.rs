// presswork/src/error.rs
use anyhow::Error as AnyhowError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PressError {
  /// Invalid wiring found before any module runs: duplicate names, unregistered
  /// modules, dependencies on isolated pipelines.
  #[error("Configuration error for pipeline '{pipeline}': {message}")]
  Configuration { pipeline: String, message: String },

  #[error("Pipeline '{pipeline}' depends on unknown pipeline '{missing}'")]
  UnknownPipeline { pipeline: String, missing: String },

  /// `cycle` lists the full path, first and last element being the same pipeline.
  #[error("Cyclic pipeline dependency: {}", .cycle.join(" -> "))]
  CyclicDependency { cycle: Vec<String> },

  #[error("Module '{module}' failed in pipeline '{pipeline}'{}. Source: {source}", document_suffix(.document_id))]
  ModuleExecution {
    pipeline: String,
    module: String,
    document_id: Option<String>,
    #[source]
    source: AnyhowError,
  },

  #[error("Cache discarded: {message}")]
  CacheCorruption { message: String },

  #[error("Build cancelled")]
  Cancelled,

  #[error("I/O error on '{path}': {source}")]
  Io {
    path: String,
    #[source]
    source: std::io::Error,
  },

  #[error("Serialization error: {0}")]
  Serialization(#[from] serde_json::Error),

  #[error("Invalid engine configuration: {0}")]
  InvalidConfig(#[from] toml::de::Error),

  #[error("Error in module or provider. Source: {source}")]
  Handler {
    #[source]
    source: AnyhowError,
  },

  #[error("Internal presswork error: {0}")]
  Internal(String),
}

fn document_suffix(document_id: &Option<String>) -> String {
  match document_id {
    Some(id) => format!(" on document '{}'", id),
    None => String::new(),
  }
}

impl PressError {
  pub(crate) fn io(path: impl Into<String>, source: std::io::Error) -> Self {
    PressError::Io {
      path: path.into(),
      source,
    }
  }

  pub(crate) fn configuration(pipeline: impl Into<String>, message: impl Into<String>) -> Self {
    PressError::Configuration {
      pipeline: pipeline.into(),
      message: message.into(),
    }
  }

  /// True for errors raised while validating the build, before any module ran.
  pub fn is_pre_execution(&self) -> bool {
    matches!(
      self,
      PressError::Configuration { .. } | PressError::UnknownPipeline { .. } | PressError::CyclicDependency { .. }
    )
  }
}

impl From<AnyhowError> for PressError {
  fn from(err: AnyhowError) -> Self {
    // Unwrap a PressError that was boxed into anyhow on its way through user code.
    match err.downcast::<PressError>() {
      Ok(press_err) => press_err,
      Err(err) => PressError::Handler { source: err },
    }
  }
}

pub type PressResult<T, E = PressError> = std::result::Result<T, E>;
