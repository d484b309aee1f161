// presswork/src/core/module.rs

//! The `Module` capability, its error type, and the per-call `ModuleContext`.

use crate::core::context::ExecutionContext;
use crate::core::control::ExecutionMode;
use crate::core::document::Document;
use crate::core::settings::Settings;
use crate::error::PressError;
use crate::provider::FileProvider;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use thiserror::Error;

/// Failure raised by a module.
#[derive(Debug, Error)]
pub enum ModuleError {
  /// Failure tied to one document. Handled per the pipeline's failure policy.
  #[error("document '{document_id}': {source}")]
  Document {
    document_id: String,
    #[source]
    source: anyhow::Error,
  },
  /// Failure of the whole invocation. Always fails the pipeline.
  #[error("{source}")]
  Batch {
    #[source]
    source: anyhow::Error,
  },
}

impl ModuleError {
  pub fn document(document: &Document, source: impl Into<anyhow::Error>) -> Self {
    ModuleError::Document {
      document_id: document.id().to_string(),
      source: source.into(),
    }
  }

  pub fn batch(source: impl Into<anyhow::Error>) -> Self {
    ModuleError::Batch { source: source.into() }
  }

  pub fn document_id(&self) -> Option<&str> {
    match self {
      ModuleError::Document { document_id, .. } => Some(document_id),
      ModuleError::Batch { .. } => None,
    }
  }

  pub(crate) fn into_source(self) -> anyhow::Error {
    match self {
      ModuleError::Document { source, .. } | ModuleError::Batch { source } => source,
    }
  }
}

impl From<anyhow::Error> for ModuleError {
  fn from(source: anyhow::Error) -> Self {
    ModuleError::Batch { source }
  }
}

impl From<PressError> for ModuleError {
  fn from(err: PressError) -> Self {
    ModuleError::Batch { source: err.into() }
  }
}

/// A transform over a sequence of documents.
///
/// Implementations must be referentially transparent with respect to their
/// input documents, `parameters()` and the settings named by
/// `relevant_settings()`: the engine skips the call whenever a cached result
/// exists for the same combination. Modules that read anything else (the file
/// system, the clock) must return `false` from `cacheable()`.
///
/// Documents are handed over by value for the duration of the call. Return new
/// or passed-through documents; never keep them around.
#[async_trait]
pub trait Module: Send + Sync {
  /// Registry key. Also the first component of every cache key.
  fn identity(&self) -> &str;

  /// Bump to invalidate cached outputs after changing behavior.
  fn version(&self) -> &str {
    "1"
  }

  /// Constructor arguments that change the output.
  fn parameters(&self) -> Value {
    Value::Null
  }

  /// Settings keys this module reads.
  fn relevant_settings(&self) -> Vec<String> {
    Vec::new()
  }

  fn execution_mode(&self) -> ExecutionMode {
    ExecutionMode::Batch
  }

  fn cacheable(&self) -> bool {
    true
  }

  async fn process(&self, documents: Vec<Document>, ctx: &ModuleContext) -> Result<Vec<Document>, ModuleError>;
}

/// What a module sees of the build while it runs.
#[derive(Clone)]
pub struct ModuleContext {
  pipeline: Arc<str>,
  execution: Arc<ExecutionContext>,
  upstream: Arc<BTreeMap<String, Arc<Vec<Document>>>>,
}

impl ModuleContext {
  pub(crate) fn new(
    pipeline: Arc<str>,
    execution: Arc<ExecutionContext>,
    upstream: Arc<BTreeMap<String, Arc<Vec<Document>>>>,
  ) -> Self {
    Self {
      pipeline,
      execution,
      upstream,
    }
  }

  pub fn pipeline(&self) -> &str {
    &self.pipeline
  }

  pub fn settings(&self) -> &Settings {
    self.execution.settings()
  }

  pub fn input_provider(&self) -> &Arc<dyn FileProvider> {
    self.execution.input_provider()
  }

  pub fn output_provider(&self) -> &Arc<dyn FileProvider> {
    self.execution.output_provider()
  }

  /// Settled output of a declared dependency. `None` for anything else.
  pub fn dependency_outputs(&self, pipeline: &str) -> Option<&[Document]> {
    self.upstream.get(pipeline).map(|docs| docs.as_slice())
  }

  pub fn dependencies(&self) -> impl Iterator<Item = &str> {
    self.upstream.keys().map(String::as_str)
  }

  pub fn is_cancelled(&self) -> bool {
    self.execution.should_stop()
  }

  pub(crate) fn execution(&self) -> &Arc<ExecutionContext> {
    &self.execution
  }
}

type ModuleFn = Box<
  dyn Fn(Vec<Document>, ModuleContext) -> Pin<Box<dyn Future<Output = Result<Vec<Document>, ModuleError>> + Send>>
    + Send
    + Sync,
>;

/// A module built from a closure, for small transforms and tests.
pub struct FnModule {
  identity: String,
  version: String,
  parameters: Value,
  relevant_settings: Vec<String>,
  mode: ExecutionMode,
  cacheable: bool,
  handler: ModuleFn,
}

impl FnModule {
  pub fn new<F, Fut>(identity: impl Into<String>, mode: ExecutionMode, handler: F) -> Self
  where
    F: Fn(Vec<Document>, ModuleContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Vec<Document>, ModuleError>> + Send + 'static,
  {
    Self {
      identity: identity.into(),
      version: "1".to_string(),
      parameters: Value::Null,
      relevant_settings: Vec::new(),
      mode,
      cacheable: true,
      handler: Box::new(move |docs, ctx| Box::pin(handler(docs, ctx))),
    }
  }

  pub fn batch<F, Fut>(identity: impl Into<String>, handler: F) -> Self
  where
    F: Fn(Vec<Document>, ModuleContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Vec<Document>, ModuleError>> + Send + 'static,
  {
    Self::new(identity, ExecutionMode::Batch, handler)
  }

  pub fn per_document<F, Fut>(identity: impl Into<String>, handler: F) -> Self
  where
    F: Fn(Vec<Document>, ModuleContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Vec<Document>, ModuleError>> + Send + 'static,
  {
    Self::new(identity, ExecutionMode::PerDocument, handler)
  }

  pub fn with_version(mut self, version: impl Into<String>) -> Self {
    self.version = version.into();
    self
  }

  pub fn with_parameters(mut self, parameters: Value) -> Self {
    self.parameters = parameters;
    self
  }

  pub fn with_relevant_settings<S: Into<String>>(mut self, keys: impl IntoIterator<Item = S>) -> Self {
    self.relevant_settings = keys.into_iter().map(Into::into).collect();
    self
  }

  pub fn not_cacheable(mut self) -> Self {
    self.cacheable = false;
    self
  }
}

#[async_trait]
impl Module for FnModule {
  fn identity(&self) -> &str {
    &self.identity
  }

  fn version(&self) -> &str {
    &self.version
  }

  fn parameters(&self) -> Value {
    self.parameters.clone()
  }

  fn relevant_settings(&self) -> Vec<String> {
    self.relevant_settings.clone()
  }

  fn execution_mode(&self) -> ExecutionMode {
    self.mode
  }

  fn cacheable(&self) -> bool {
    self.cacheable
  }

  async fn process(&self, documents: Vec<Document>, ctx: &ModuleContext) -> Result<Vec<Document>, ModuleError> {
    (self.handler)(documents, ctx.clone()).await
  }
}
