// presswork/src/pipeline/execution.rs

//! Runs one planned pipeline: its input, process and output modules in order,
//! with cache lookups around every module invocation.

use crate::cache::key::upstream_hash;
use crate::cache::CacheKey;
use crate::core::context::ExecutionContext;
use crate::core::control::{ExecutionMode, FailurePolicy, ModuleCategory, PipelineStatus};
use crate::core::diagnostics::Diagnostic;
use crate::core::document::Document;
use crate::core::module::{Module, ModuleContext, ModuleError};
use crate::graph::PlannedPipeline;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{event, instrument, span, Instrument, Level};

/// Result of running one pipeline.
pub(crate) struct PipelineRun {
  pub(crate) status: PipelineStatus,
  /// Settled output, ordered by index. Empty unless `Completed`.
  pub(crate) outputs: Vec<Document>,
}

/// Why a stage stopped early.
enum StageStop {
  Halted,
  Failed,
}

/// Outcome of one per-document task.
enum DocumentOutcome {
  Done(Vec<Document>),
  Failed(ModuleError),
  Halted,
}

/// What one pipeline's modules share while it runs.
struct StageEnv {
  ctx: ModuleContext,
  policy: FailurePolicy,
  upstream_hash: Arc<str>,
}

impl StageEnv {
  fn execution(&self) -> &Arc<ExecutionContext> {
    self.ctx.execution()
  }

  fn diagnostic(&self, diagnostic: Diagnostic, module: &dyn Module) -> Diagnostic {
    diagnostic.in_pipeline(self.ctx.pipeline()).in_module(module.identity())
  }

  fn cache_key(&self, module: &dyn Module, inputs: &[Document]) -> Option<CacheKey> {
    if !module.cacheable() {
      return None;
    }
    self.execution().cache()?;
    Some(CacheKey::for_invocation(
      module,
      inputs,
      self.execution().settings(),
      &self.upstream_hash,
    ))
  }

  fn cached(&self, key: Option<&CacheKey>) -> Option<Vec<Document>> {
    let key = key?;
    let cached = self.execution().cache()?.lookup(key)?;
    Some(cached.iter().map(|c| Document::from_cached(c, 0)).collect())
  }

  fn store(&self, module: &dyn Module, key: Option<CacheKey>, outputs: &[Document]) {
    let (Some(key), Some(cache)) = (key, self.execution().cache()) else {
      return;
    };
    match outputs.iter().map(Document::to_cached).collect::<Result<Vec<_>, _>>() {
      Ok(documents) => {
        cache.insert_if_absent(key, documents);
      }
      Err(err) => {
        event!(Level::WARN, module = %module.identity(), error = %err, "Output not cacheable, skipping store.");
      }
    }
  }
}

impl PlannedPipeline {
  /// Runs every stage. Never returns an error: failures are recorded as
  /// diagnostics on `execution` and reflected in the returned status.
  #[instrument(name = "Pipeline::run", skip_all, fields(pipeline = %self.name, policy = ?self.failure_policy))]
  pub(crate) async fn run(
    &self,
    execution: Arc<ExecutionContext>,
    upstream: Arc<BTreeMap<String, Arc<Vec<Document>>>>,
  ) -> PipelineRun {
    event!(Level::DEBUG, "Pipeline execution starting.");
    let env = StageEnv {
      upstream_hash: Arc::from(upstream_hash(&upstream)),
      ctx: ModuleContext::new(Arc::clone(&self.name), execution, upstream),
      policy: self.failure_policy,
    };

    let mut documents: Vec<Document> = Vec::new();
    for (category, modules) in &self.stages {
      for (module_idx, module) in modules.iter().enumerate() {
        if env.execution().should_stop() {
          event!(Level::INFO, "Pipeline halted before module start.");
          return PipelineRun {
            status: PipelineStatus::Halted,
            outputs: Vec::new(),
          };
        }

        let mode = match category {
          ModuleCategory::Input => ExecutionMode::Batch,
          _ => module.execution_mode(),
        };
        let module_span = span!(
          Level::INFO,
          "module_execution",
          module = %module.identity(),
          category = %category,
          module_index = module_idx,
          inputs = documents.len()
        );
        let stage = match mode {
          ExecutionMode::Batch => run_batch(&env, module, documents).instrument(module_span).await,
          ExecutionMode::PerDocument => run_per_document(&env, module, documents).instrument(module_span).await,
        };

        documents = match stage {
          Ok(docs) => reindex(docs),
          Err(StageStop::Halted) => {
            return PipelineRun {
              status: PipelineStatus::Halted,
              outputs: Vec::new(),
            }
          }
          Err(StageStop::Failed) => {
            if env.policy == FailurePolicy::AbortBuild {
              env.execution().abort_build();
            }
            return PipelineRun {
              status: PipelineStatus::Failed,
              outputs: Vec::new(),
            };
          }
        };
      }
    }

    event!(Level::DEBUG, outputs = documents.len(), "Pipeline execution completed.");
    PipelineRun {
      status: PipelineStatus::Completed,
      outputs: documents,
    }
  }
}

fn reindex(documents: Vec<Document>) -> Vec<Document> {
  documents
    .into_iter()
    .enumerate()
    .map(|(i, doc)| doc.with_index(i))
    .collect()
}

fn record_cache_summary(env: &StageEnv, module: &dyn Module, hits: usize, misses: usize) {
  if hits + misses == 0 {
    return;
  }
  env.execution().record(env.diagnostic(
    Diagnostic::info(format!("cache: {} hit(s), {} miss(es)", hits, misses)),
    module,
  ));
}

/// One call over the whole set. Under `SkipDocument`, a document-level error
/// drops that document and the call is repeated without it, so the loop runs
/// at most once per input plus one.
async fn run_batch(env: &StageEnv, module: &Arc<dyn Module>, documents: Vec<Document>) -> Result<Vec<Document>, StageStop> {
  let mut inputs = documents;
  let mut misses = 0;

  loop {
    let key = env.cache_key(module.as_ref(), &inputs);
    if let Some(cached) = env.cached(key.as_ref()) {
      event!(Level::DEBUG, outputs = cached.len(), "Cache hit, module skipped.");
      record_cache_summary(env, module.as_ref(), 1, misses);
      return Ok(cached);
    }
    if key.is_some() {
      misses += 1;
    }

    if env.execution().should_stop() {
      return Err(StageStop::Halted);
    }
    let permit = env.execution().acquire_worker().await.map_err(|err| {
      env.execution().record(env.diagnostic(Diagnostic::error(err.to_string()), module.as_ref()));
      StageStop::Failed
    })?;
    env.execution().count_invocation();
    let result = module.process(inputs.clone(), &env.ctx).await;
    drop(permit);

    match result {
      Ok(outputs) => {
        env.store(module.as_ref(), key, &outputs);
        record_cache_summary(env, module.as_ref(), 0, misses);
        return Ok(outputs);
      }
      Err(ModuleError::Document { document_id, source })
        if env.policy == FailurePolicy::SkipDocument && inputs.iter().any(|d| d.id() == document_id) =>
      {
        env.execution().record(env.diagnostic(
          Diagnostic::warning(format!("document skipped: {:#}", source)).for_document(&document_id),
          module.as_ref(),
        ));
        inputs.retain(|d| d.id() != document_id);
      }
      Err(err) => {
        let mut diagnostic = Diagnostic::error(format!("module failed: {:#}", err));
        if let Some(id) = err.document_id() {
          diagnostic = diagnostic.for_document(id);
        }
        env.execution().record(env.diagnostic(diagnostic, module.as_ref()));
        return Err(StageStop::Failed);
      }
    }
  }
}

/// One call per document, spread over the worker pool. Results land in
/// per-input slots so completion order never shows in the output.
async fn run_per_document(
  env: &StageEnv,
  module: &Arc<dyn Module>,
  documents: Vec<Document>,
) -> Result<Vec<Document>, StageStop> {
  let count = documents.len();
  let mut tasks = JoinSet::new();
  let mut input_ids = Vec::with_capacity(count);

  for (slot, doc) in documents.into_iter().enumerate() {
    input_ids.push(doc.id().to_string());
    let key = env.cache_key(module.as_ref(), std::slice::from_ref(&doc));
    if let Some(cached) = env.cached(key.as_ref()) {
      tasks.spawn(async move { (slot, DocumentOutcome::Done(cached), true) });
      continue;
    }

    let module = Arc::clone(module);
    let ctx = env.ctx.clone();
    let task_span = span!(Level::DEBUG, "document_task", slot, document = %doc.id());
    tasks.spawn(
      async move {
        let execution = Arc::clone(ctx.execution());
        if execution.should_stop() {
          return (slot, DocumentOutcome::Halted, false);
        }
        let permit = match execution.acquire_worker().await {
          Ok(permit) => permit,
          Err(err) => return (slot, DocumentOutcome::Failed(ModuleError::batch(err)), false),
        };
        // Waiting for a slot can take a while; re-check before starting.
        if execution.should_stop() {
          return (slot, DocumentOutcome::Halted, false);
        }
        execution.count_invocation();
        let result = module.process(vec![doc], &ctx).await;
        drop(permit);

        match result {
          Ok(outputs) => {
            if let (Some(key), Some(cache)) = (key, execution.cache()) {
              if let Ok(cached) = outputs.iter().map(Document::to_cached).collect::<Result<Vec<_>, _>>() {
                cache.insert_if_absent(key, cached);
              }
            }
            (slot, DocumentOutcome::Done(outputs), false)
          }
          Err(err) => (slot, DocumentOutcome::Failed(err), false),
        }
      }
      .instrument(task_span),
    );
  }

  let mut slots: Vec<Option<DocumentOutcome>> = (0..count).map(|_| None).collect();
  let mut hits = 0;
  let mut misses = 0;
  let mut panicked = false;
  while let Some(joined) = tasks.join_next().await {
    match joined {
      Ok((slot, outcome, was_hit)) => {
        if was_hit {
          hits += 1;
        } else if module.cacheable() && env.execution().cache().is_some() {
          misses += 1;
        }
        // Stop scheduling siblings as soon as an aborting failure is known.
        if env.policy == FailurePolicy::AbortBuild && matches!(outcome, DocumentOutcome::Failed(_)) {
          env.execution().abort_build();
        }
        slots[slot] = Some(outcome);
      }
      Err(join_err) => {
        panicked = true;
        env.execution().record(env.diagnostic(
          Diagnostic::error(format!("document task panicked: {}", join_err)),
          module.as_ref(),
        ));
        if env.policy == FailurePolicy::AbortBuild {
          env.execution().abort_build();
        }
      }
    }
  }
  record_cache_summary(env, module.as_ref(), hits, misses);

  let mut outputs = Vec::new();
  let mut failed = panicked;
  let mut halted = false;
  for (slot, outcome) in slots.into_iter().enumerate() {
    match outcome {
      Some(DocumentOutcome::Done(docs)) => outputs.extend(docs),
      Some(DocumentOutcome::Halted) => halted = true,
      Some(DocumentOutcome::Failed(err)) => {
        let document_id = err.document_id().unwrap_or(input_ids[slot].as_str()).to_string();
        let batch_level = matches!(err, ModuleError::Batch { .. });
        if env.policy == FailurePolicy::SkipDocument && !batch_level {
          env.execution().record(env.diagnostic(
            Diagnostic::warning(format!("document skipped: {:#}", err.into_source())).for_document(document_id),
            module.as_ref(),
          ));
        } else {
          failed = true;
          env.execution().record(env.diagnostic(
            Diagnostic::error(format!("module failed: {:#}", err.into_source())).for_document(document_id),
            module.as_ref(),
          ));
        }
      }
      // Lost to a panic, already reported.
      None => {}
    }
  }

  if failed {
    Err(StageStop::Failed)
  } else if halted {
    Err(StageStop::Halted)
  } else {
    Ok(outputs)
  }
}
