// presswork/src/core/diagnostics.rs

//! Structured diagnostic records and the sink contract the surrounding
//! application implements. The engine never formats or displays them.

use parking_lot::Mutex;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
  Info,
  Warning,
  Error,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
  pub severity: Severity,
  pub pipeline: Option<String>,
  pub module: Option<String>,
  pub document_id: Option<String>,
  pub message: String,
}

impl Diagnostic {
  pub fn new(severity: Severity, message: impl Into<String>) -> Self {
    Self {
      severity,
      pipeline: None,
      module: None,
      document_id: None,
      message: message.into(),
    }
  }

  pub fn info(message: impl Into<String>) -> Self {
    Self::new(Severity::Info, message)
  }

  pub fn warning(message: impl Into<String>) -> Self {
    Self::new(Severity::Warning, message)
  }

  pub fn error(message: impl Into<String>) -> Self {
    Self::new(Severity::Error, message)
  }

  pub fn in_pipeline(mut self, pipeline: impl Into<String>) -> Self {
    self.pipeline = Some(pipeline.into());
    self
  }

  pub fn in_module(mut self, module: impl Into<String>) -> Self {
    self.module = Some(module.into());
    self
  }

  pub fn for_document(mut self, document_id: impl Into<String>) -> Self {
    self.document_id = Some(document_id.into());
    self
  }
}

/// Receives diagnostics as they happen. Called from worker tasks, so
/// implementations must be thread-safe and should not block for long.
pub trait DiagnosticsSink: Send + Sync {
  fn record(&self, diagnostic: &Diagnostic);
}

/// Sink that drops everything.
pub struct NullSink;

impl DiagnosticsSink for NullSink {
  fn record(&self, _diagnostic: &Diagnostic) {}
}

/// Collects every diagnostic of a build and forwards each one to the external sink.
pub(crate) struct DiagnosticsCollector {
  records: Mutex<Vec<Diagnostic>>,
  sink: Arc<dyn DiagnosticsSink>,
}

impl DiagnosticsCollector {
  pub(crate) fn new(sink: Arc<dyn DiagnosticsSink>) -> Self {
    Self {
      records: Mutex::new(Vec::new()),
      sink,
    }
  }

  pub(crate) fn record(&self, diagnostic: Diagnostic) {
    self.sink.record(&diagnostic);
    self.records.lock().push(diagnostic);
  }

  pub(crate) fn max_severity(&self) -> Option<Severity> {
    self.records.lock().iter().map(|d| d.severity).max()
  }

  pub(crate) fn take(&self) -> Vec<Diagnostic> {
    std::mem::take(&mut *self.records.lock())
  }
}
