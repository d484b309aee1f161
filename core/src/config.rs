// presswork/src/config.rs

//! Engine configuration. Every field has a default, so an empty TOML document
//! is a valid configuration.

use crate::core::control::FailurePolicy;
use crate::error::PressResult;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
  /// Upper bound on concurrently running module invocations.
  pub worker_count: usize,
  /// Applied to pipelines that declare no policy of their own.
  pub default_failure_policy: FailurePolicy,
  pub cache: CacheConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
  pub enabled: bool,
  /// Where the cache is persisted between processes. `None` keeps it in memory.
  pub path: Option<PathBuf>,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      enabled: true,
      path: None,
    }
  }
}

impl Default for EngineConfig {
  fn default() -> Self {
    Self {
      worker_count: default_worker_count(),
      default_failure_policy: FailurePolicy::default(),
      cache: CacheConfig::default(),
    }
  }
}

fn default_worker_count() -> usize {
  std::thread::available_parallelism().map(|n| n.get()).unwrap_or(4)
}

impl EngineConfig {
  pub fn new() -> Self {
    Self::default()
  }

  /// Parses a TOML fragment, e.g.
  ///
  /// ```toml
  /// worker_count = 8
  /// default_failure_policy = "skip_document"
  ///
  /// [cache]
  /// path = ".presswork/cache.json"
  /// ```
  pub fn from_toml_str(source: &str) -> PressResult<Self> {
    Ok(toml::from_str(source)?)
  }

  pub fn with_worker_count(mut self, worker_count: usize) -> Self {
    self.worker_count = worker_count.max(1);
    self
  }

  pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
    self.default_failure_policy = policy;
    self
  }

  pub fn with_cache_path(mut self, path: impl Into<PathBuf>) -> Self {
    self.cache.enabled = true;
    self.cache.path = Some(path.into());
    self
  }

  pub fn without_cache(mut self) -> Self {
    self.cache.enabled = false;
    self
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn empty_toml_yields_defaults() {
    let config = EngineConfig::from_toml_str("").unwrap();
    assert_eq!(config, EngineConfig::default());
    assert!(config.worker_count >= 1);
    assert!(config.cache.enabled);
  }

  #[test]
  fn toml_overrides_selected_fields() {
    let config = EngineConfig::from_toml_str(
      r#"
        worker_count = 3
        default_failure_policy = "skip_document"

        [cache]
        path = "out/cache.json"
      "#,
    )
    .unwrap();
    assert_eq!(config.worker_count, 3);
    assert_eq!(config.default_failure_policy, FailurePolicy::SkipDocument);
    assert_eq!(config.cache.path, Some(PathBuf::from("out/cache.json")));
    assert!(config.cache.enabled);
  }

  #[test]
  fn unknown_policy_is_rejected() {
    let err = EngineConfig::from_toml_str(r#"default_failure_policy = "retry""#).unwrap_err();
    assert!(matches!(err, crate::error::PressError::InvalidConfig(_)));
  }
}
