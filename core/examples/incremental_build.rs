// presswork/examples/incremental_build.rs

use presswork::{
  BuildOptions, Document, Engine, EngineConfig, FnModule, InMemoryFileProvider, ModuleContext, ModuleError,
  PressResult, Pipeline, ReadFiles, Settings,
};
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> PressResult<()> {
  tracing_subscriber::fmt().with_max_level(tracing::Level::INFO).init();

  info!("--- Incremental Build Example ---");

  let cache_dir = std::env::temp_dir().join("presswork-incremental-example");
  let config = EngineConfig::from_toml_str(&format!(
    "worker_count = 2\n[cache]\npath = {:?}\n",
    cache_dir.join("cache.json").display().to_string()
  ))?;

  let input = InMemoryFileProvider::new()
    .with_file("notes/a.txt", "first note")
    .with_file("notes/b.txt", "second note");

  let mut engine = Engine::new(config);
  engine.register_module(ReadFiles::new("read").with_prefix("notes/"))?;
  engine.register_module(
    FnModule::per_document("stamp", |input: Vec<Document>, ctx: ModuleContext| async move {
      let author = ctx.settings().get_str("author").unwrap_or("anonymous").to_string();
      let mut out = Vec::with_capacity(input.len());
      for doc in input {
        let text = doc.content().to_text()?;
        out.push(doc.derive().text(format!("{} (by {})", text, author)).build()?);
      }
      Ok::<_, ModuleError>(out)
    })
    .with_relevant_settings(["author"]),
  )?;
  engine.add_pipeline(Pipeline::new("notes").with_input("read").with_process("stamp"));

  let options = |author: &str| {
    BuildOptions::new()
      .input_provider(Arc::new(input.clone()))
      .settings(Settings::new().with("author", author))
  };

  for (label, author) in [("cold", "ada"), ("warm", "ada"), ("settings changed", "grace")] {
    let report = engine.build(options(author)).await?;
    info!(
      "{label}: status {:?}, {} module call(s), cache hits {}, misses {}",
      report.status, report.module_invocations, report.cache.hits, report.cache.misses
    );
  }

  input.insert("notes/a.txt", "first note, edited");
  let report = engine.build(options("grace")).await?;
  info!(
    "after edit: {} module call(s), hit rate {:.0}%",
    report.module_invocations,
    report.cache.hit_rate_percent()
  );

  info!("--- Incremental Build Example Finished ---");
  Ok(())
}
