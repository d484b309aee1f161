// tests/registry_tests.rs
mod common;

use common::*;
use presswork::{BuildOptions, ModuleRegistry, PressError, Pipeline};
use serial_test::serial;

#[tokio::test]
#[serial]
async fn test_duplicate_identity_is_rejected() {
  setup_tracing();
  let registry = ModuleRegistry::new();
  registry.register(uppercase_module("upper")).unwrap();
  let err = registry.register(uppercase_module("upper")).unwrap_err();
  assert!(matches!(err, PressError::Configuration { .. }));
  assert!(err.to_string().contains("upper"));
  assert_eq!(registry.len(), 1);
}

#[tokio::test]
#[serial]
async fn test_identities_are_sorted_and_replace_overrides() {
  setup_tracing();
  let registry = ModuleRegistry::new();
  registry.register(suffix_module("zeta", "z")).unwrap();
  registry.register(suffix_module("alpha", "a")).unwrap();
  assert_eq!(registry.identities(), vec!["alpha", "zeta"]);
  assert!(registry.contains("alpha"));
  assert!(!registry.contains("beta"));

  registry.replace(suffix_module("alpha", "a").with_version("2"));
  assert_eq!(registry.len(), 2);
  assert_eq!(registry.get("alpha").unwrap().version(), "2");
}

#[tokio::test]
#[serial]
async fn test_engine_resolves_modules_through_its_registry() {
  setup_tracing();
  let mut engine = engine();
  engine.registry().register(source_module("emit", &[("a", "alpha")])).unwrap();
  engine.register_module(uppercase_module("upper")).unwrap();
  engine.add_pipeline(Pipeline::new("posts").with_input("emit").with_process("upper"));

  let report = engine.build(BuildOptions::new()).await.unwrap();
  assert!(report.is_success());
  assert_eq!(texts(report.outputs_of("posts").unwrap()), vec!["ALPHA"]);
  assert!(engine.register_module(uppercase_module("upper")).is_err());
}
