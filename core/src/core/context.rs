// presswork/src/core/context.rs

//! Defines `ExecutionContext`, the per-build state shared by the scheduler and
//! every module call, and `CancellationSignal`, the cooperative stop flag.
//!
//! A context is created when a build starts and torn down when it ends. It is
//! only ever handed out behind an `Arc`, so modules running on worker tasks
//! read the same settings, providers and cache as the scheduler.

use crate::cache::DocumentCache;
use crate::core::diagnostics::{Diagnostic, DiagnosticsCollector, DiagnosticsSink, NullSink, Severity};
use crate::core::settings::Settings;
use crate::error::{PressError, PressResult};
use crate::provider::staged::StagedFileProvider;
use crate::provider::{FileProvider, InMemoryFileProvider};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{event, Level};

/// Cloneable stop flag. Tripping it never interrupts running module code; the
/// scheduler polls it between waves, module invocations and document tasks.
#[derive(Debug, Clone, Default)]
pub struct CancellationSignal(Arc<AtomicBool>);

impl CancellationSignal {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn cancel(&self) {
    self.0.store(true, Ordering::SeqCst);
  }

  pub fn is_cancelled(&self) -> bool {
    self.0.load(Ordering::SeqCst)
  }
}

/// Everything a caller supplies for one build.
pub struct BuildOptions {
  pub(crate) settings: Settings,
  pub(crate) input_provider: Arc<dyn FileProvider>,
  pub(crate) output_provider: Arc<dyn FileProvider>,
  pub(crate) sink: Arc<dyn DiagnosticsSink>,
  pub(crate) cancellation: CancellationSignal,
}

impl Default for BuildOptions {
  fn default() -> Self {
    Self {
      settings: Settings::new(),
      input_provider: Arc::new(InMemoryFileProvider::new()),
      output_provider: Arc::new(InMemoryFileProvider::new()),
      sink: Arc::new(NullSink),
      cancellation: CancellationSignal::new(),
    }
  }
}

impl BuildOptions {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn settings(mut self, settings: Settings) -> Self {
    self.settings = settings;
    self
  }

  pub fn input_provider(mut self, provider: Arc<dyn FileProvider>) -> Self {
    self.input_provider = provider;
    self
  }

  pub fn output_provider(mut self, provider: Arc<dyn FileProvider>) -> Self {
    self.output_provider = provider;
    self
  }

  pub fn diagnostics_sink(mut self, sink: Arc<dyn DiagnosticsSink>) -> Self {
    self.sink = sink;
    self
  }

  pub fn cancellation(mut self, signal: CancellationSignal) -> Self {
    self.cancellation = signal;
    self
  }
}

pub struct ExecutionContext {
  settings: Settings,
  input_provider: Arc<dyn FileProvider>,
  // Modules write here; `staged` is the same provider, kept concrete for publishing.
  output_provider: Arc<dyn FileProvider>,
  staged: Arc<StagedFileProvider>,
  cancellation: CancellationSignal,
  // Tripped internally when a pipeline with `AbortBuild` fails.
  abort: CancellationSignal,
  cache: Option<Arc<DocumentCache>>,
  workers: Arc<Semaphore>,
  worker_count: usize,
  diagnostics: DiagnosticsCollector,
  invocations: AtomicU64,
}

impl ExecutionContext {
  pub(crate) fn new(options: BuildOptions, cache: Option<Arc<DocumentCache>>, worker_count: usize) -> Self {
    let worker_count = worker_count.max(1);
    if let Some(cache) = &cache {
      cache.begin_build();
    }
    let staged = Arc::new(StagedFileProvider::new(options.output_provider));
    Self {
      settings: options.settings,
      input_provider: options.input_provider,
      output_provider: Arc::clone(&staged) as Arc<dyn FileProvider>,
      staged,
      cancellation: options.cancellation,
      abort: CancellationSignal::new(),
      cache,
      workers: Arc::new(Semaphore::new(worker_count)),
      worker_count,
      diagnostics: DiagnosticsCollector::new(options.sink),
      invocations: AtomicU64::new(0),
    }
  }

  pub fn settings(&self) -> &Settings {
    &self.settings
  }

  pub fn input_provider(&self) -> &Arc<dyn FileProvider> {
    &self.input_provider
  }

  /// The build's view of the output provider. Writes are held back until the
  /// build ends and reach the caller's provider only if it was not cancelled.
  pub fn output_provider(&self) -> &Arc<dyn FileProvider> {
    &self.output_provider
  }

  pub fn is_cancelled(&self) -> bool {
    self.cancellation.is_cancelled()
  }

  pub(crate) fn abort_build(&self) {
    self.abort.cancel();
  }

  pub fn is_aborted(&self) -> bool {
    self.abort.is_cancelled()
  }

  /// True once the build was cancelled or aborted. No new work starts after that.
  pub fn should_stop(&self) -> bool {
    self.is_cancelled() || self.is_aborted()
  }

  pub(crate) fn cache(&self) -> Option<&Arc<DocumentCache>> {
    self.cache.as_ref()
  }

  pub fn worker_count(&self) -> usize {
    self.worker_count
  }

  /// Waits for a free worker slot. The permit is released when dropped.
  pub(crate) async fn acquire_worker(&self) -> PressResult<OwnedSemaphorePermit> {
    Arc::clone(&self.workers)
      .acquire_owned()
      .await
      .map_err(|_| PressError::Internal("worker pool closed".to_string()))
  }

  pub(crate) fn count_invocation(&self) {
    self.invocations.fetch_add(1, Ordering::Relaxed);
  }

  pub fn module_invocations(&self) -> u64 {
    self.invocations.load(Ordering::Relaxed)
  }

  pub fn record(&self, diagnostic: Diagnostic) {
    match diagnostic.severity {
      Severity::Error => event!(Level::ERROR, pipeline = ?diagnostic.pipeline, document = ?diagnostic.document_id, "{}", diagnostic.message),
      Severity::Warning => event!(Level::WARN, pipeline = ?diagnostic.pipeline, document = ?diagnostic.document_id, "{}", diagnostic.message),
      Severity::Info => event!(Level::DEBUG, pipeline = ?diagnostic.pipeline, "{}", diagnostic.message),
    }
    self.diagnostics.record(diagnostic);
  }

  pub(crate) fn max_severity(&self) -> Option<Severity> {
    self.diagnostics.max_severity()
  }

  pub(crate) fn take_diagnostics(&self) -> Vec<Diagnostic> {
    self.diagnostics.take()
  }

  /// Commits staged output writes to the caller's provider, or drops them
  /// when the build was cancelled. A failed commit is an error: the output
  /// is then only partly published.
  pub(crate) async fn settle_outputs(&self, cancelled: bool) {
    if cancelled {
      self.staged.discard();
      return;
    }
    match self.staged.publish().await {
      Ok(files) => event!(Level::DEBUG, files, "Output published."),
      Err(err) => {
        let unpublished = self.staged.staged_paths().len();
        self.record(Diagnostic::error(format!(
          "failed to publish output ({} file(s) not written): {}",
          unpublished, err
        )));
      }
    }
  }

  /// Flushes the cache. With `prune`, entries this build never used are dropped
  /// first. Flush failures only cost the next build its cache, so they are
  /// recorded as warnings.
  pub(crate) fn teardown(&self, prune: bool) {
    let Some(cache) = &self.cache else {
      return;
    };
    if prune {
      cache.retain_touched();
    }
    if let Err(err) = cache.flush() {
      self.record(Diagnostic::warning(format!("failed to persist cache: {}", err)));
    }
  }
}
