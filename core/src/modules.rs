// presswork/src/modules.rs

//! Built-in plumbing modules. They move documents between providers and
//! pipelines; content transforms are left to the application.

use crate::core::control::ExecutionMode;
use crate::core::document::Document;
use crate::core::metadata::MetadataValue;
use crate::core::module::{Module, ModuleContext, ModuleError};
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{event, Level};

/// Metadata key `WriteFiles` reads the output path from.
pub const DESTINATION_KEY: &str = "destination";

/// Emits one document per input file. The document id and source path are the
/// provider-relative path; content stays on the provider until read.
///
/// Reads external state, so it is never cached. Documents it receives are
/// passed through ahead of the ones it reads.
pub struct ReadFiles {
  identity: String,
  prefix: String,
  extensions: Vec<String>,
}

impl ReadFiles {
  pub fn new(identity: impl Into<String>) -> Self {
    Self {
      identity: identity.into(),
      prefix: String::new(),
      extensions: Vec::new(),
    }
  }

  /// Only lists files under `prefix`.
  pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
    self.prefix = prefix.into();
    self
  }

  /// Keeps files ending in `.{extension}`. Several calls accumulate.
  pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
    self.extensions.push(extension.into().trim_start_matches('.').to_string());
    self
  }

  fn matches(&self, path: &str) -> bool {
    self.extensions.is_empty()
      || self
        .extensions
        .iter()
        .any(|ext| path.rsplit_once('.').map_or(false, |(_, found)| found == ext))
  }
}

#[async_trait]
impl Module for ReadFiles {
  fn identity(&self) -> &str {
    &self.identity
  }

  fn parameters(&self) -> Value {
    json!({ "prefix": self.prefix, "extensions": self.extensions })
  }

  fn cacheable(&self) -> bool {
    false
  }

  async fn process(&self, documents: Vec<Document>, ctx: &ModuleContext) -> Result<Vec<Document>, ModuleError> {
    let provider = ctx.input_provider();
    let paths = provider.list(&self.prefix).await?;
    let mut outputs = documents;
    for path in paths.into_iter().filter(|p| self.matches(p)) {
      let content = provider.content(&path).await?;
      let document = Document::builder(path.clone())
        .source_path(path.clone())
        .content(content)
        .build()?;
      outputs.push(document);
    }
    event!(Level::DEBUG, module = %self.identity, prefix = %self.prefix, documents = outputs.len(), "Files read.");
    Ok(outputs)
  }
}

/// Writes every document to the output provider and passes it through
/// unchanged. The target path is the `destination` metadata string, or the
/// source path when that is absent.
pub struct WriteFiles {
  identity: String,
}

impl WriteFiles {
  pub fn new(identity: impl Into<String>) -> Self {
    Self {
      identity: identity.into(),
    }
  }
}

fn destination_of(document: &Document) -> Option<String> {
  if let Some(dest) = document.metadata().get_str(DESTINATION_KEY) {
    return Some(dest.to_string());
  }
  document
    .source_path()
    .map(|path| path.to_string_lossy().replace('\\', "/"))
}

#[async_trait]
impl Module for WriteFiles {
  fn identity(&self) -> &str {
    &self.identity
  }

  fn execution_mode(&self) -> ExecutionMode {
    ExecutionMode::PerDocument
  }

  fn cacheable(&self) -> bool {
    false
  }

  async fn process(&self, documents: Vec<Document>, ctx: &ModuleContext) -> Result<Vec<Document>, ModuleError> {
    for document in &documents {
      let Some(destination) = destination_of(document) else {
        return Err(ModuleError::document(
          document,
          anyhow::anyhow!("no '{}' metadata and no source path", DESTINATION_KEY),
        ));
      };
      let bytes = document
        .content()
        .to_bytes()
        .map_err(|e| ModuleError::document(document, e))?;
      ctx
        .output_provider()
        .write(&destination, &bytes)
        .await
        .map_err(|e| ModuleError::document(document, e))?;
      event!(Level::DEBUG, document = %document.id(), destination = %destination, bytes = bytes.len(), "Document written.");
    }
    Ok(documents)
  }
}

/// Appends the settled outputs of dependency pipelines to its input. With no
/// names configured, takes every declared dependency in name order.
pub struct FromDependencies {
  identity: String,
  pipelines: Vec<String>,
}

impl FromDependencies {
  pub fn new(identity: impl Into<String>) -> Self {
    Self {
      identity: identity.into(),
      pipelines: Vec::new(),
    }
  }

  pub fn with_pipeline(mut self, pipeline: impl Into<String>) -> Self {
    self.pipelines.push(pipeline.into());
    self
  }
}

#[async_trait]
impl Module for FromDependencies {
  fn identity(&self) -> &str {
    &self.identity
  }

  fn parameters(&self) -> Value {
    json!({ "pipelines": self.pipelines })
  }

  async fn process(&self, documents: Vec<Document>, ctx: &ModuleContext) -> Result<Vec<Document>, ModuleError> {
    let names: Vec<String> = if self.pipelines.is_empty() {
      ctx.dependencies().map(str::to_string).collect()
    } else {
      self.pipelines.clone()
    };

    let mut outputs = documents;
    for name in &names {
      let upstream = ctx.dependency_outputs(name).ok_or_else(|| {
        ModuleError::batch(anyhow::anyhow!(
          "pipeline '{}' is not a dependency of '{}'",
          name,
          ctx.pipeline()
        ))
      })?;
      outputs.extend(upstream.iter().cloned());
    }
    Ok(outputs)
  }
}

/// Sets one metadata value on every document and declares it hash-relevant.
pub struct SetMetadata {
  identity: String,
  key: String,
  value: MetadataValue,
}

impl SetMetadata {
  pub fn new(identity: impl Into<String>, key: impl Into<String>, value: impl Into<MetadataValue>) -> Self {
    Self {
      identity: identity.into(),
      key: key.into(),
      value: value.into(),
    }
  }
}

#[async_trait]
impl Module for SetMetadata {
  fn identity(&self) -> &str {
    &self.identity
  }

  fn parameters(&self) -> Value {
    json!({ "key": self.key, "value": serde_json::to_value(&self.value).unwrap_or(Value::Null) })
  }

  fn execution_mode(&self) -> ExecutionMode {
    ExecutionMode::PerDocument
  }

  async fn process(&self, documents: Vec<Document>, _ctx: &ModuleContext) -> Result<Vec<Document>, ModuleError> {
    documents
      .iter()
      .map(|document| {
        document
          .derive()
          .hashed_metadata(self.key.clone(), self.value.clone())
          .build()
          .map_err(|e| ModuleError::document(document, e))
      })
      .collect()
  }
}
