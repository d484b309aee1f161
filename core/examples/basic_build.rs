// presswork/examples/basic_build.rs

use presswork::{
  BuildOptions, Document, Engine, EngineConfig, FnModule, InMemoryFileProvider, ModuleContext, ModuleError,
  PressResult, Pipeline, ReadFiles, SetMetadata, Severity, WriteFiles,
};
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> PressResult<()> {
  // Initialize tracing (optional, for demonstration)
  tracing_subscriber::fmt().with_max_level(tracing::Level::INFO).init();

  info!("--- Basic Build Example ---");

  // 1. Sources live in an in-memory provider here; `LocalFileProvider` works the same way.
  let input = InMemoryFileProvider::new()
    .with_file("posts/hello.md", "hello, world")
    .with_file("posts/second.md", "a second post")
    .with_file("assets/site.css", "body { margin: 0 }");
  let output = InMemoryFileProvider::new();

  // 2. Register modules. Pipelines only ever refer to them by identity.
  let mut engine = Engine::new(EngineConfig::default().with_worker_count(4));
  engine.register_module(ReadFiles::new("read-posts").with_prefix("posts/").with_extension("md"))?;
  engine.register_module(ReadFiles::new("read-assets").with_prefix("assets/"))?;
  engine.register_module(FnModule::per_document(
    "shout",
    |input: Vec<Document>, _ctx: ModuleContext| async move {
      let mut out = Vec::with_capacity(input.len());
      for doc in input {
        let text = doc.content().to_text()?;
        let destination = format!("{}.html", doc.id().trim_end_matches(".md"));
        out.push(
          doc
            .derive()
            .text(format!("<p>{}</p>", text.to_uppercase()))
            .hashed_metadata("destination", destination)
            .build()?,
        );
      }
      Ok::<_, ModuleError>(out)
    },
  ))?;
  engine.register_module(SetMetadata::new("mark-asset", "kind", "asset"))?;
  engine.register_module(WriteFiles::new("write"))?;

  // 3. Declare pipelines. "posts" waits for "assets".
  engine
    .add_pipeline(Pipeline::new("assets").with_input("read-assets").with_process("mark-asset").with_output("write"))
    .add_pipeline(
      Pipeline::new("posts")
        .with_input("read-posts")
        .with_process("shout")
        .with_output("write")
        .depends_on("assets"),
    );
  info!("Waves: {:?}", engine.plan()?.waves());

  // 4. Build.
  let report = engine
    .build(
      BuildOptions::new()
        .input_provider(Arc::new(input))
        .output_provider(Arc::new(output.clone())),
    )
    .await?;

  info!("Build status: {:?}", report.status);
  for diagnostic in report.diagnostics_at(Severity::Warning) {
    info!("warning: {}", diagnostic.message);
  }
  for path in output.paths() {
    info!("{} => {:?}", path, output.get_text(&path).unwrap_or_default());
  }
  assert_eq!(output.get_text("posts/hello.html").as_deref(), Some("<p>HELLO, WORLD</p>"));

  info!("--- Basic Build Example Finished ---");
  Ok(())
}
