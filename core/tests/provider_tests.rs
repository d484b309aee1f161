// tests/provider_tests.rs
mod common;

use common::*;
use presswork::{
  BuildOptions, BuildStatus, FileProvider, InMemoryFileProvider, LocalFileProvider, MetadataValue, Pipeline,
  ReadFiles, SetMetadata, Severity, WriteFiles, FailurePolicy,
};
use serial_test::serial;
use std::sync::Arc;

#[tokio::test]
#[serial]
async fn test_local_provider_lists_reads_and_writes() {
  setup_tracing();
  let dir = tempfile::tempdir().unwrap();
  let provider = LocalFileProvider::new(dir.path());

  provider.write("posts/2024/hello.md", b"hello").await.unwrap();
  provider.write("posts/intro.md", b"intro").await.unwrap();
  provider.write("static/logo.svg", b"<svg/>").await.unwrap();

  assert_eq!(
    provider.list("").await.unwrap(),
    vec!["posts/2024/hello.md", "posts/intro.md", "static/logo.svg"]
  );
  assert_eq!(provider.list("posts/").await.unwrap(), vec!["posts/2024/hello.md", "posts/intro.md"]);
  assert_eq!(provider.read("posts/intro.md").await.unwrap(), b"intro");

  let content = provider.content("static/logo.svg").await.unwrap();
  assert!(!content.is_materialized());
  assert_eq!(content.to_text().unwrap(), "<svg/>");

  assert!(provider.read("missing.md").await.is_err());
  assert!(provider.write("../escape.md", b"x").await.is_err());
  assert!(provider.write("/abs.md", b"x").await.is_err());
}

#[tokio::test]
#[serial]
async fn test_local_provider_on_missing_root_lists_nothing() {
  setup_tracing();
  let dir = tempfile::tempdir().unwrap();
  let provider = LocalFileProvider::new(dir.path().join("does-not-exist"));
  assert!(provider.list("").await.unwrap().is_empty());
}

#[tokio::test]
#[serial]
async fn test_memory_provider_round_trip() {
  setup_tracing();
  let provider = InMemoryFileProvider::new().with_file("b.txt", "B").with_file("a.txt", "A");
  assert_eq!(provider.list("").await.unwrap(), vec!["a.txt", "b.txt"]);
  provider.write("c.txt", b"C").await.unwrap();
  assert_eq!(provider.get_text("c.txt").as_deref(), Some("C"));
  assert_eq!(provider.len(), 3);
  assert!(provider.read("nope").await.is_err());
}

#[tokio::test]
#[serial]
async fn test_read_and_write_files_end_to_end_on_disk() {
  setup_tracing();
  let src = tempfile::tempdir().unwrap();
  let out = tempfile::tempdir().unwrap();
  std::fs::create_dir_all(src.path().join("posts")).unwrap();
  std::fs::write(src.path().join("posts/one.md"), "first post").unwrap();
  std::fs::write(src.path().join("posts/two.md"), "second post").unwrap();
  std::fs::write(src.path().join("posts/notes.txt"), "ignored").unwrap();

  let mut engine = engine();
  engine.register_module(ReadFiles::new("read").with_prefix("posts/").with_extension("md")).unwrap();
  engine.register_module(uppercase_module("upper")).unwrap();
  engine.register_module(WriteFiles::new("write")).unwrap();
  engine.add_pipeline(Pipeline::new("posts").with_input("read").with_process("upper").with_output("write"));

  let options = BuildOptions::new()
    .input_provider(Arc::new(LocalFileProvider::new(src.path())))
    .output_provider(Arc::new(LocalFileProvider::new(out.path())));
  let report = engine.build(options).await.unwrap();
  assert_eq!(report.status, BuildStatus::Success);
  assert_eq!(ids(report.outputs_of("posts").unwrap()), vec!["posts/one.md", "posts/two.md"]);

  assert_eq!(std::fs::read_to_string(out.path().join("posts/one.md")).unwrap(), "FIRST POST");
  assert_eq!(std::fs::read_to_string(out.path().join("posts/two.md")).unwrap(), "SECOND POST");
  assert!(!out.path().join("posts/notes.txt").exists());
}

#[tokio::test]
#[serial]
async fn test_write_files_honours_destination_metadata() {
  setup_tracing();
  let input = InMemoryFileProvider::new().with_file("about.md", "about us");
  let output = InMemoryFileProvider::new();

  let mut engine = engine();
  engine.register_module(ReadFiles::new("read")).unwrap();
  engine
    .register_module(SetMetadata::new("route", "destination", "about/index.html"))
    .unwrap();
  engine.register_module(WriteFiles::new("write")).unwrap();
  engine.add_pipeline(Pipeline::new("pages").with_input("read").with_process("route").with_output("write"));

  let report = engine
    .build(
      BuildOptions::new()
        .input_provider(Arc::new(input))
        .output_provider(Arc::new(output.clone())),
    )
    .await
    .unwrap();
  assert_eq!(report.status, BuildStatus::Success);
  assert_eq!(output.paths(), vec!["about/index.html"]);
  assert_eq!(output.get_text("about/index.html").as_deref(), Some("about us"));

  let doc = &report.outputs_of("pages").unwrap()[0];
  assert_eq!(doc.get("destination"), Some(&MetadataValue::from("about/index.html")));
  assert!(doc.hash_keys().contains(&"destination".to_string()));
}

#[tokio::test]
#[serial]
async fn test_write_without_destination_is_a_document_failure() {
  setup_tracing();
  let output = InMemoryFileProvider::new();
  let mut engine = engine();
  engine
    .register_module(source_module("emit", &[("generated", "no path"), ("other", "also none")]))
    .unwrap();
  engine.register_module(WriteFiles::new("write")).unwrap();
  engine.add_pipeline(
    Pipeline::new("gen")
      .with_input("emit")
      .with_output("write")
      .with_failure_policy(FailurePolicy::SkipDocument),
  );

  let report = engine
    .build(BuildOptions::new().output_provider(Arc::new(output.clone())))
    .await
    .unwrap();
  assert_eq!(report.status, BuildStatus::SuccessWithWarnings);
  assert_eq!(report.diagnostics_at(Severity::Warning).count(), 2);
  assert!(output.is_empty());
}
