// tests/common/mod.rs
#![allow(dead_code)] // Allow unused code in this common test module

use presswork::{
  Diagnostic, DiagnosticsSink, Document, Engine, EngineConfig, FnModule, ModuleContext, ModuleError, Severity,
};
use std::sync::{
  atomic::{AtomicUsize, Ordering},
  Arc,
};
use std::time::Duration;
use tracing::Level;

// --- Helper for Tracing Setup (call once per test run if needed) ---
use once_cell::sync::Lazy;
static TRACING_INIT: Lazy<()> = Lazy::new(|| {
  tracing_subscriber::fmt()
    .with_max_level(Level::DEBUG)
    .with_test_writer()
    .try_init()
    .ok();
});

pub fn setup_tracing() {
  Lazy::force(&TRACING_INIT);
}

// --- Atomic counters for checking execution counts ---
pub static SOURCE_EXEC_COUNTER: Lazy<Arc<AtomicUsize>> = Lazy::new(|| Arc::new(AtomicUsize::new(0)));
pub static UPPERCASE_EXEC_COUNTER: Lazy<Arc<AtomicUsize>> = Lazy::new(|| Arc::new(AtomicUsize::new(0)));
pub static SUFFIX_EXEC_COUNTER: Lazy<Arc<AtomicUsize>> = Lazy::new(|| Arc::new(AtomicUsize::new(0)));

pub fn reset_counters() {
  SOURCE_EXEC_COUNTER.store(0, Ordering::SeqCst);
  UPPERCASE_EXEC_COUNTER.store(0, Ordering::SeqCst);
  SUFFIX_EXEC_COUNTER.store(0, Ordering::SeqCst);
}

pub fn count(counter: &Lazy<Arc<AtomicUsize>>) -> usize {
  counter.load(Ordering::SeqCst)
}

// --- Documents ---
pub fn text_doc(id: &str, text: &str) -> Document {
  Document::builder(id).text(text).build().unwrap()
}

pub fn texts(documents: &[Document]) -> Vec<String> {
  documents.iter().map(|d| d.content().to_text().unwrap()).collect()
}

pub fn ids(documents: &[Document]) -> Vec<String> {
  documents.iter().map(|d| d.id().to_string()).collect()
}

pub fn engine() -> Engine {
  Engine::new(EngineConfig::default().with_worker_count(4))
}

// --- Common Module Creators ---

/// Batch module that appends fixed documents to its input.
pub fn source_module(identity: &str, docs: &[(&str, &str)]) -> FnModule {
  let docs: Vec<(String, String)> = docs.iter().map(|(id, t)| (id.to_string(), t.to_string())).collect();
  FnModule::batch(identity, move |mut input: Vec<Document>, _ctx: ModuleContext| {
    let docs = docs.clone();
    async move {
      SOURCE_EXEC_COUNTER.fetch_add(1, Ordering::SeqCst);
      for (id, text) in docs {
        input.push(Document::builder(id).text(text).build()?);
      }
      Ok::<_, ModuleError>(input)
    }
  })
}

/// Per-document module that uppercases content.
pub fn uppercase_module(identity: &str) -> FnModule {
  FnModule::per_document(identity, |input: Vec<Document>, _ctx: ModuleContext| async move {
    UPPERCASE_EXEC_COUNTER.fetch_add(1, Ordering::SeqCst);
    let mut out = Vec::with_capacity(input.len());
    for doc in input {
      let text = doc.content().to_text()?;
      out.push(doc.derive().text(text.to_uppercase()).build()?);
    }
    Ok::<_, ModuleError>(out)
  })
}

/// Batch module that appends `suffix` to every document's content.
pub fn suffix_module(identity: &str, suffix: &str) -> FnModule {
  let suffix = suffix.to_string();
  let parameters = serde_json::json!({ "suffix": suffix });
  FnModule::batch(identity, move |input: Vec<Document>, _ctx: ModuleContext| {
    let suffix = suffix.clone();
    async move {
      SUFFIX_EXEC_COUNTER.fetch_add(1, Ordering::SeqCst);
      let mut out = Vec::with_capacity(input.len());
      for doc in input {
        let text = doc.content().to_text()?;
        out.push(doc.derive().text(format!("{}{}", text, suffix)).build()?);
      }
      Ok::<_, ModuleError>(out)
    }
  })
  .with_parameters(parameters)
}

/// Per-document module that fails on the document with id `failing_id`.
pub fn failing_on(identity: &str, failing_id: &str) -> FnModule {
  let failing_id = failing_id.to_string();
  FnModule::per_document(identity, move |input: Vec<Document>, _ctx: ModuleContext| {
    let failing_id = failing_id.clone();
    async move {
      for doc in &input {
        if doc.id() == failing_id {
          return Err(ModuleError::document(doc, anyhow::anyhow!("cannot process {}", failing_id)));
        }
      }
      Ok::<_, ModuleError>(input)
    }
  })
}

/// Per-document module that sleeps a pseudo-random, index-dependent time
/// before passing its document through.
pub fn jitter_module(identity: &str) -> FnModule {
  FnModule::per_document(identity, |input: Vec<Document>, _ctx: ModuleContext| async move {
    let seed = input.first().map(|d| d.id().bytes().map(usize::from).sum::<usize>()).unwrap_or(0);
    tokio::time::sleep(Duration::from_millis(((seed * 7919) % 13) as u64)).await;
    Ok::<_, ModuleError>(input)
  })
  .not_cacheable()
}

// --- Diagnostics ---
#[derive(Default)]
pub struct RecordingSink {
  pub records: parking_lot::Mutex<Vec<Diagnostic>>,
}

impl DiagnosticsSink for RecordingSink {
  fn record(&self, diagnostic: &Diagnostic) {
    self.records.lock().push(diagnostic.clone());
  }
}

impl RecordingSink {
  pub fn count(&self, severity: Severity) -> usize {
    self.records.lock().iter().filter(|d| d.severity == severity).count()
  }
}
