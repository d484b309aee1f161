// tests/cancellation_tests.rs
mod common;

use common::*;
use presswork::modules::DESTINATION_KEY;
use presswork::{
  BuildOptions, BuildStatus, CancellationSignal, Document, Engine, EngineConfig, FnModule, InMemoryFileProvider,
  ModuleContext, ModuleError, Pipeline, PipelineStatus, WriteFiles,
};
use serial_test::serial;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn cancelling(identity: &str, signal: CancellationSignal, calls: Arc<AtomicUsize>, per_document: bool) -> FnModule {
  let handler = move |input: Vec<Document>, _ctx: ModuleContext| {
    let signal = signal.clone();
    let calls = calls.clone();
    async move {
      calls.fetch_add(1, Ordering::SeqCst);
      signal.cancel();
      // In-flight work still runs to completion.
      tokio::time::sleep(Duration::from_millis(20)).await;
      Ok::<_, ModuleError>(input)
    }
  };
  let module = if per_document {
    FnModule::per_document(identity, handler)
  } else {
    FnModule::batch(identity, handler)
  };
  module.not_cacheable()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
#[serial]
async fn test_cancel_mid_wave_discards_outputs_and_skips_later_waves() {
  setup_tracing();
  reset_counters();
  let signal = CancellationSignal::new();
  let calls = Arc::new(AtomicUsize::new(0));

  let mut engine = engine();
  engine.register_module(source_module("emit", &[("a", "alpha"), ("b", "beta")])).unwrap();
  engine.register_module(cancelling("stop-now", signal.clone(), calls.clone(), false)).unwrap();
  engine.register_module(uppercase_module("upper")).unwrap();
  engine
    .add_pipeline(Pipeline::new("slow").with_input("emit").with_process("stop-now").with_process("upper"))
    .add_pipeline(Pipeline::new("fast").with_input("emit"))
    .add_pipeline(Pipeline::new("late").with_process("upper").depends_on("fast"));

  let report = engine.build(BuildOptions::new().cancellation(signal.clone())).await.unwrap();
  assert_eq!(report.status, BuildStatus::Cancelled);
  assert!(report.outputs.is_empty(), "cancelled builds expose no outputs");
  assert_eq!(calls.load(Ordering::SeqCst), 1);
  assert_eq!(count(&UPPERCASE_EXEC_COUNTER), 0);
  assert_eq!(report.status_of("slow"), Some(PipelineStatus::Halted));
  assert_eq!(report.status_of("late"), Some(PipelineStatus::Halted));
  assert!(matches!(report.into_result(), Err(presswork::PressError::Cancelled)));
}

#[tokio::test]
#[serial]
async fn test_cancel_before_build_runs_nothing() {
  setup_tracing();
  reset_counters();
  let signal = CancellationSignal::new();
  signal.cancel();

  let mut engine = engine();
  engine.register_module(source_module("emit", &[("a", "alpha")])).unwrap();
  engine.add_pipeline(Pipeline::new("posts").with_input("emit"));

  let report = engine.build(BuildOptions::new().cancellation(signal)).await.unwrap();
  assert_eq!(report.status, BuildStatus::Cancelled);
  assert_eq!(report.module_invocations, 0);
  assert_eq!(count(&SOURCE_EXEC_COUNTER), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
#[serial]
async fn test_cancel_stops_pending_document_tasks() {
  setup_tracing();
  let signal = CancellationSignal::new();
  let calls = Arc::new(AtomicUsize::new(0));

  let mut engine = Engine::new(EngineConfig::default().with_worker_count(1));
  let docs: Vec<(String, String)> = (0..6).map(|i| (format!("d{i}"), format!("{i}"))).collect();
  let borrowed: Vec<(&str, &str)> = docs.iter().map(|(id, t)| (id.as_str(), t.as_str())).collect();
  engine.register_module(source_module("emit", &borrowed)).unwrap();
  engine.register_module(cancelling("stop-per-doc", signal.clone(), calls.clone(), true)).unwrap();
  engine.add_pipeline(Pipeline::new("posts").with_input("emit").with_process("stop-per-doc"));

  let report = engine.build(BuildOptions::new().cancellation(signal)).await.unwrap();
  assert_eq!(report.status, BuildStatus::Cancelled);
  assert_eq!(calls.load(Ordering::SeqCst), 1, "queued documents must not start after cancellation");
}

#[tokio::test]
#[serial]
async fn test_engine_is_reusable_after_cancellation() {
  setup_tracing();
  let mut engine = engine();
  engine.register_module(source_module("emit", &[("a", "alpha")])).unwrap();
  engine.add_pipeline(Pipeline::new("posts").with_input("emit"));

  let cancelled = CancellationSignal::new();
  cancelled.cancel();
  let first = engine.build(BuildOptions::new().cancellation(cancelled)).await.unwrap();
  assert_eq!(first.status, BuildStatus::Cancelled);

  let second = engine.build(BuildOptions::new()).await.unwrap();
  assert_eq!(second.status, BuildStatus::Success);
  assert_eq!(ids(second.outputs_of("posts").unwrap()), vec!["a"]);
}

/// Routes every document to `<id>.html`.
fn route_module(identity: &str) -> FnModule {
  FnModule::per_document(identity, |input: Vec<Document>, _ctx: ModuleContext| async move {
    let mut out = Vec::with_capacity(input.len());
    for doc in input {
      let destination = format!("{}.html", doc.id());
      out.push(doc.derive().metadata(DESTINATION_KEY, destination).build()?);
    }
    Ok::<_, ModuleError>(out)
  })
}

#[tokio::test]
#[serial]
async fn test_cancel_during_output_stage_publishes_nothing() {
  setup_tracing();
  let signal = CancellationSignal::new();
  let calls = Arc::new(AtomicUsize::new(0));
  let output = InMemoryFileProvider::new().with_file("existing.html", "kept");

  let mut engine = Engine::new(EngineConfig::default().with_worker_count(1));
  engine.register_module(source_module("emit", &[("a", "alpha"), ("b", "beta"), ("c", "gamma")])).unwrap();
  engine.register_module(route_module("dest")).unwrap();
  engine.register_module(WriteFiles::new("write")).unwrap();
  engine.register_module(cancelling("stop-after-write", signal.clone(), calls.clone(), false)).unwrap();
  engine.add_pipeline(
    Pipeline::new("site")
      .with_input("emit")
      .with_process("dest")
      .with_output("write")
      .with_output("stop-after-write"),
  );

  let report = engine
    .build(
      BuildOptions::new()
        .output_provider(Arc::new(output.clone()))
        .cancellation(signal),
    )
    .await
    .unwrap();
  assert_eq!(report.status, BuildStatus::Cancelled);
  assert_eq!(calls.load(Ordering::SeqCst), 1, "every document was written before the cancel");
  assert_eq!(output.paths(), vec!["existing.html"], "staged writes must not reach the provider");
  assert_eq!(output.get_text("existing.html").as_deref(), Some("kept"));

  // The same declarations publish everything once the build is left alone.
  let report = engine
    .build(BuildOptions::new().output_provider(Arc::new(output.clone())))
    .await
    .unwrap();
  assert_eq!(report.status, BuildStatus::Success);
  assert_eq!(output.paths(), vec!["a.html", "b.html", "c.html", "existing.html"]);
  assert_eq!(output.get_text("b.html").as_deref(), Some("beta"));
}
