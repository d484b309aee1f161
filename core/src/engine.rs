// presswork/src/engine.rs

//! Defines `Engine`, the owner of the pipeline declarations, the module
//! registry and the cache, and `BuildReport`, the outcome of one build.

use crate::cache::{CacheStats, DocumentCache};
use crate::config::EngineConfig;
use crate::core::context::{BuildOptions, ExecutionContext};
use crate::core::control::{BuildStatus, FailurePolicy, PipelineStatus};
use crate::core::diagnostics::{Diagnostic, Severity};
use crate::core::document::Document;
use crate::core::module::Module;
use crate::error::{PressError, PressResult};
use crate::graph::{self, ExecutionPlan};
use crate::pipeline::Pipeline;
use crate::registry::ModuleRegistry;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{event, instrument, span, Instrument, Level};

/// Outcome of `Engine::build`.
#[derive(Debug)]
pub struct BuildReport {
  pub status: BuildStatus,
  pub diagnostics: Vec<Diagnostic>,
  /// Final documents per completed pipeline. Empty when cancelled.
  pub outputs: BTreeMap<String, Vec<Document>>,
  pub pipeline_statuses: BTreeMap<String, PipelineStatus>,
  pub cache: CacheStats,
  /// Module calls actually made. Cache hits do not count.
  pub module_invocations: u64,
}

impl BuildReport {
  pub fn is_success(&self) -> bool {
    matches!(self.status, BuildStatus::Success | BuildStatus::SuccessWithWarnings)
  }

  pub fn outputs_of(&self, pipeline: &str) -> Option<&[Document]> {
    self.outputs.get(pipeline).map(Vec::as_slice)
  }

  pub fn status_of(&self, pipeline: &str) -> Option<PipelineStatus> {
    self.pipeline_statuses.get(pipeline).copied()
  }

  pub fn diagnostics_at(&self, severity: Severity) -> impl Iterator<Item = &Diagnostic> {
    self.diagnostics.iter().filter(move |d| d.severity == severity)
  }

  /// Turns a failed or cancelled build into an error, for callers that only
  /// care whether the build went through.
  pub fn into_result(self) -> PressResult<BuildReport> {
    match self.status {
      BuildStatus::Success | BuildStatus::SuccessWithWarnings => Ok(self),
      BuildStatus::Cancelled => Err(PressError::Cancelled),
      BuildStatus::Failed => {
        let first = self.diagnostics.iter().find(|d| d.severity == Severity::Error);
        Err(PressError::ModuleExecution {
          pipeline: first.and_then(|d| d.pipeline.clone()).unwrap_or_default(),
          module: first.and_then(|d| d.module.clone()).unwrap_or_default(),
          document_id: first.and_then(|d| d.document_id.clone()),
          source: anyhow::anyhow!(first.map(|d| d.message.clone()).unwrap_or_else(|| "build failed".to_string())),
        })
      }
    }
  }
}

/// Schedules pipelines over waves and owns the cache between builds.
pub struct Engine {
  config: EngineConfig,
  registry: ModuleRegistry,
  pipelines: Vec<Pipeline>,
  // Opened on the first build that needs it.
  cache: Mutex<Option<Arc<DocumentCache>>>,
  // Builds of one engine never overlap; they share the cache's per-build state.
  build_lock: tokio::sync::Mutex<()>,
}

impl Default for Engine {
  fn default() -> Self {
    Self::new(EngineConfig::default())
  }
}

impl Engine {
  pub fn new(config: EngineConfig) -> Self {
    Self {
      config,
      registry: ModuleRegistry::new(),
      pipelines: Vec::new(),
      cache: Mutex::new(None),
      build_lock: tokio::sync::Mutex::new(()),
    }
  }

  pub fn config(&self) -> &EngineConfig {
    &self.config
  }

  pub fn registry(&self) -> &ModuleRegistry {
    &self.registry
  }

  /// Shorthand for `registry().register(module)`.
  pub fn register_module<M: Module + 'static>(&self, module: M) -> PressResult<()> {
    self.registry.register(module)
  }

  /// Declares a pipeline. Validation happens when the build is planned.
  pub fn add_pipeline(&mut self, pipeline: Pipeline) -> &mut Self {
    event!(Level::DEBUG, pipeline = %pipeline.name(), "Pipeline declared.");
    self.pipelines.push(pipeline);
    self
  }

  pub fn pipelines(&self) -> &[Pipeline] {
    &self.pipelines
  }

  pub fn pipeline_mut(&mut self, name: &str) -> Option<&mut Pipeline> {
    self.pipelines.iter_mut().find(|p| p.name() == name)
  }

  pub fn remove_pipeline(&mut self, name: &str) -> Option<Pipeline> {
    let idx = self.pipelines.iter().position(|p| p.name() == name)?;
    Some(self.pipelines.remove(idx))
  }

  /// Validates the declarations without running anything.
  pub fn plan(&self) -> PressResult<ExecutionPlan> {
    graph::resolve(&self.pipelines, &self.registry, self.config.default_failure_policy)
  }

  /// The engine's cache, if caching is enabled and a build has opened it.
  pub fn cache(&self) -> Option<Arc<DocumentCache>> {
    self.cache.lock().clone()
  }

  /// Drops every cached entry; the next build is cold.
  pub fn clear_cache(&self) {
    if let Some(cache) = self.cache.lock().as_ref() {
      cache.clear();
    }
  }

  fn open_cache(&self) -> (Option<Arc<DocumentCache>>, Option<PressError>) {
    if !self.config.cache.enabled {
      return (None, None);
    }
    let mut slot = self.cache.lock();
    if let Some(cache) = slot.as_ref() {
      return (Some(Arc::clone(cache)), None);
    }
    let (cache, warning) = match &self.config.cache.path {
      Some(path) => DocumentCache::open(path),
      None => (DocumentCache::new_memory(), None),
    };
    let cache = Arc::new(cache);
    *slot = Some(Arc::clone(&cache));
    (Some(cache), warning)
  }

  /// Runs one build.
  ///
  /// Configuration problems (unknown or isolated dependencies, cycles,
  /// unregistered modules) are returned as `Err` before any module runs.
  /// Everything that happens afterwards is reported through the
  /// `BuildReport`.
  #[instrument(
    name = "Engine::build",
    skip_all,
    fields(num_pipelines = self.pipelines.len(), workers = self.config.worker_count),
    err(Display)
  )]
  pub async fn build(&self, options: BuildOptions) -> PressResult<BuildReport> {
    let _build_guard = self.build_lock.lock().await;
    let plan = Arc::new(self.plan()?);
    event!(Level::INFO, num_waves = plan.waves.len(), "Build starting.");

    let (cache, cache_warning) = self.open_cache();
    let execution = Arc::new(ExecutionContext::new(options, cache, self.config.worker_count));
    if let Some(err) = cache_warning {
      execution.record(Diagnostic::warning(err.to_string()));
    }

    let count = plan.pipelines.len();
    let mut statuses: Vec<Option<PipelineStatus>> = vec![None; count];
    let mut outputs: Vec<Option<Arc<Vec<Document>>>> = vec![None; count];

    for (wave_idx, wave) in plan.waves.iter().enumerate() {
      if execution.should_stop() {
        event!(Level::INFO, wave = wave_idx, "Build stopping, remaining waves not started.");
        break;
      }

      let wave_span = span!(Level::INFO, "wave", wave = wave_idx, size = wave.len());
      let mut tasks = JoinSet::new();
      for &idx in wave {
        let planned = &plan.pipelines[idx];
        let blocked = planned
          .dependencies
          .iter()
          .find(|&&dep| statuses[dep] != Some(PipelineStatus::Completed));
        if let Some(&dep) = blocked {
          execution.record(
            Diagnostic::error(format!(
              "skipped: dependency '{}' did not complete",
              plan.pipelines[dep].name
            ))
            .in_pipeline(&*planned.name),
          );
          statuses[idx] = Some(PipelineStatus::Skipped);
          continue;
        }

        let upstream: BTreeMap<String, Arc<Vec<Document>>> = planned
          .dependencies
          .iter()
          .filter_map(|&dep| Some((plan.pipelines[dep].name.to_string(), Arc::clone(outputs[dep].as_ref()?))))
          .collect();
        let plan = Arc::clone(&plan);
        let execution = Arc::clone(&execution);
        tasks.spawn(
          async move {
            let run = plan.pipelines[idx].run(execution, Arc::new(upstream)).await;
            (idx, run)
          }
          .instrument(wave_span.clone()),
        );
      }

      while let Some(joined) = tasks.join_next().await {
        match joined {
          Ok((idx, run)) => {
            if run.status == PipelineStatus::Completed {
              outputs[idx] = Some(Arc::new(run.outputs));
            }
            statuses[idx] = Some(run.status);
          }
          Err(join_err) => {
            event!(Level::ERROR, error = %join_err, "Pipeline task panicked.");
          }
        }
      }

      // A pipeline that never reported back panicked.
      for &idx in wave {
        if statuses[idx].is_none() {
          let planned = &plan.pipelines[idx];
          execution.record(Diagnostic::error("pipeline task panicked").in_pipeline(&*planned.name));
          if planned.failure_policy == FailurePolicy::AbortBuild {
            execution.abort_build();
          }
          statuses[idx] = Some(PipelineStatus::Failed);
        }
      }
    }

    let cancelled = execution.is_cancelled();
    let statuses: BTreeMap<String, PipelineStatus> = plan
      .pipelines
      .iter()
      .zip(statuses)
      .map(|(p, status)| (p.name.to_string(), status.unwrap_or(PipelineStatus::Halted)))
      .collect();

    execution.settle_outputs(cancelled).await;
    let prune = !cancelled && execution.max_severity() != Some(Severity::Error);
    execution.teardown(prune);

    let status = if cancelled {
      BuildStatus::Cancelled
    } else {
      match execution.max_severity() {
        Some(Severity::Error) => BuildStatus::Failed,
        _ if statuses.values().any(|s| *s != PipelineStatus::Completed) => BuildStatus::Failed,
        Some(Severity::Warning) => BuildStatus::SuccessWithWarnings,
        _ => BuildStatus::Success,
      }
    };

    let outputs: BTreeMap<String, Vec<Document>> = if cancelled {
      BTreeMap::new()
    } else {
      plan
        .pipelines
        .iter()
        .zip(outputs)
        .filter_map(|(p, docs)| {
          let docs = docs?;
          Some((p.name.to_string(), Arc::try_unwrap(docs).unwrap_or_else(|shared| (*shared).clone())))
        })
        .collect()
    };

    let cache_stats = execution.cache().map(|c| c.stats()).unwrap_or_default();
    let module_invocations = execution.module_invocations();
    event!(
      Level::INFO,
      status = ?status,
      module_invocations,
      cache_hits = cache_stats.hits,
      cache_misses = cache_stats.misses,
      "Build finished."
    );

    Ok(BuildReport {
      status,
      diagnostics: execution.take_diagnostics(),
      outputs,
      pipeline_statuses: statuses,
      cache: cache_stats,
      module_invocations,
    })
  }
}
