// presswork/src/core/settings.rs

//! Immutable build settings and the hashing of the subsets modules depend on.

use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Read-only key/value settings snapshot for one build.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Settings {
  values: BTreeMap<String, Value>,
}

impl Settings {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
    self.values.insert(key.into(), value.into());
    self
  }

  pub fn get(&self, key: &str) -> Option<&Value> {
    self.values.get(key)
  }

  pub fn get_str(&self, key: &str) -> Option<&str> {
    self.get(key).and_then(Value::as_str)
  }

  pub fn keys(&self) -> impl Iterator<Item = &str> {
    self.values.keys().map(String::as_str)
  }

  /// Digest over the given keys only. Order of `keys` does not matter; a missing
  /// key hashes differently from any present value.
  pub fn subset_hash<S: AsRef<str>>(&self, keys: &[S]) -> String {
    let mut sorted: Vec<&str> = keys.iter().map(AsRef::as_ref).collect();
    sorted.sort_unstable();
    sorted.dedup();

    let mut hasher = Sha256::new();
    for key in sorted {
      hasher.update(key.as_bytes());
      hasher.update(b"=");
      match self.values.get(key) {
        Some(value) => hasher.update(canonicalize(value).to_string().as_bytes()),
        None => hasher.update(b"\0absent"),
      }
      hasher.update(b";");
    }
    format!("{:x}", hasher.finalize())
  }
}

impl FromIterator<(String, Value)> for Settings {
  fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
    Self {
      values: iter.into_iter().collect(),
    }
  }
}

/// Recursively sorts object keys so equal values serialize identically.
pub(crate) fn canonicalize(value: &Value) -> Value {
  match value {
    Value::Object(map) => {
      let mut sorted = serde_json::Map::new();
      let mut keys: Vec<_> = map.keys().collect();
      keys.sort();
      for key in keys {
        if let Some(val) = map.get(key) {
          sorted.insert(key.to_string(), canonicalize(val));
        }
      }
      Value::Object(sorted)
    }
    Value::Array(arr) => Value::Array(arr.iter().map(canonicalize).collect()),
    other => other.clone(),
  }
}
