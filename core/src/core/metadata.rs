// presswork/src/core/metadata.rs

//! Typed document metadata.
//!
//! Metadata is an append-only list of writes. The effective value of a key is
//! its latest write; earlier writes stay reachable through `history` so that
//! diagnostics can show what a module shadowed.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The closed set of metadata value kinds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum MetadataValue {
  String(String),
  /// Any `f64`. NaN and the infinities are stored as `"NaN"`, `"inf"` and
  /// `"-inf"`, since JSON has no literal for them.
  Number(#[serde(with = "number_repr")] f64),
  Bool(bool),
  /// Points at another document by id.
  DocumentRef(String),
  Map(BTreeMap<String, MetadataValue>),
}

impl MetadataValue {
  pub fn as_str(&self) -> Option<&str> {
    match self {
      MetadataValue::String(s) => Some(s),
      _ => None,
    }
  }

  pub fn as_number(&self) -> Option<f64> {
    match self {
      MetadataValue::Number(n) => Some(*n),
      _ => None,
    }
  }

  pub fn as_bool(&self) -> Option<bool> {
    match self {
      MetadataValue::Bool(b) => Some(*b),
      _ => None,
    }
  }

  pub fn as_document_ref(&self) -> Option<&str> {
    match self {
      MetadataValue::DocumentRef(id) => Some(id),
      _ => None,
    }
  }

  pub fn as_map(&self) -> Option<&BTreeMap<String, MetadataValue>> {
    match self {
      MetadataValue::Map(m) => Some(m),
      _ => None,
    }
  }

  /// Stable byte encoding used for content hashing. Maps are `BTreeMap`s, so
  /// key order is already canonical.
  pub(crate) fn canonical_bytes(&self) -> Vec<u8> {
    serde_json::to_vec(self).unwrap_or_default()
  }
}

mod number_repr {
  use serde::de::Error;
  use serde::{Deserialize, Deserializer, Serializer};

  pub(super) fn serialize<S: Serializer>(n: &f64, serializer: S) -> Result<S::Ok, S::Error> {
    if n.is_finite() {
      serializer.serialize_f64(*n)
    } else if n.is_nan() {
      serializer.serialize_str("NaN")
    } else if n.is_sign_positive() {
      serializer.serialize_str("inf")
    } else {
      serializer.serialize_str("-inf")
    }
  }

  #[derive(Deserialize)]
  #[serde(untagged)]
  enum Repr {
    Finite(f64),
    Named(String),
  }

  pub(super) fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    match Repr::deserialize(deserializer)? {
      Repr::Finite(n) => Ok(n),
      Repr::Named(name) => match name.as_str() {
        "NaN" => Ok(f64::NAN),
        "inf" => Ok(f64::INFINITY),
        "-inf" => Ok(f64::NEG_INFINITY),
        other => Err(D::Error::custom(format!("invalid metadata number '{}'", other))),
      },
    }
  }
}

impl From<&str> for MetadataValue {
  fn from(s: &str) -> Self {
    MetadataValue::String(s.to_string())
  }
}

impl From<String> for MetadataValue {
  fn from(s: String) -> Self {
    MetadataValue::String(s)
  }
}

impl From<f64> for MetadataValue {
  fn from(n: f64) -> Self {
    MetadataValue::Number(n)
  }
}

impl From<i64> for MetadataValue {
  fn from(n: i64) -> Self {
    MetadataValue::Number(n as f64)
  }
}

impl From<bool> for MetadataValue {
  fn from(b: bool) -> Self {
    MetadataValue::Bool(b)
  }
}

impl From<BTreeMap<String, MetadataValue>> for MetadataValue {
  fn from(m: BTreeMap<String, MetadataValue>) -> Self {
    MetadataValue::Map(m)
  }
}

/// Ordered key/value metadata with write history.
///
/// Equality compares effective values only: shadowed writes and key order do
/// not matter.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Metadata {
  writes: Vec<(String, MetadataValue)>,
}

impl PartialEq for Metadata {
  fn eq(&self, other: &Self) -> bool {
    self.len() == other.len() && self.iter().all(|(key, value)| other.get(key) == Some(value))
  }
}

impl Metadata {
  pub fn new() -> Self {
    Self::default()
  }

  /// Records a write. An existing key is shadowed, not removed.
  pub fn set(&mut self, key: impl Into<String>, value: impl Into<MetadataValue>) {
    self.writes.push((key.into(), value.into()));
  }

  /// Effective value for `key`, or `None` when the key was never written.
  pub fn get(&self, key: &str) -> Option<&MetadataValue> {
    self.writes.iter().rev().find(|(k, _)| k == key).map(|(_, v)| v)
  }

  pub fn get_str(&self, key: &str) -> Option<&str> {
    self.get(key).and_then(MetadataValue::as_str)
  }

  pub fn get_number(&self, key: &str) -> Option<f64> {
    self.get(key).and_then(MetadataValue::as_number)
  }

  pub fn get_bool(&self, key: &str) -> Option<bool> {
    self.get(key).and_then(MetadataValue::as_bool)
  }

  pub fn contains_key(&self, key: &str) -> bool {
    self.writes.iter().any(|(k, _)| k == key)
  }

  /// Every value ever written for `key`, oldest first.
  pub fn history(&self, key: &str) -> Vec<&MetadataValue> {
    self.writes.iter().filter(|(k, _)| k == key).map(|(_, v)| v).collect()
  }

  /// Effective entries in first-write order.
  pub fn iter(&self) -> impl Iterator<Item = (&str, &MetadataValue)> {
    let mut seen: Vec<&str> = Vec::new();
    for (k, _) in &self.writes {
      if !seen.contains(&k.as_str()) {
        seen.push(k);
      }
    }
    seen.into_iter().filter_map(move |k| self.get(k).map(|v| (k, v)))
  }

  /// Number of distinct keys.
  pub fn len(&self) -> usize {
    self.iter().count()
  }

  pub fn is_empty(&self) -> bool {
    self.writes.is_empty()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn later_writes_shadow_but_keep_history() {
    let mut meta = Metadata::new();
    meta.set("title", "Draft");
    meta.set("order", 3_i64);
    meta.set("title", "Final");

    assert_eq!(meta.get_str("title"), Some("Final"));
    assert_eq!(meta.history("title").len(), 2);
    assert_eq!(meta.len(), 2);
    let keys: Vec<&str> = meta.iter().map(|(k, _)| k).collect();
    assert_eq!(keys, vec!["title", "order"]);
  }

  #[test]
  fn equality_ignores_shadowed_writes() {
    let mut rewritten = Metadata::new();
    rewritten.set("title", "Draft");
    rewritten.set("order", 1_i64);
    rewritten.set("title", "Final");

    let mut direct = Metadata::new();
    direct.set("order", 1_i64);
    direct.set("title", "Final");

    assert_eq!(rewritten, direct);
    direct.set("order", 2_i64);
    assert_ne!(rewritten, direct);
  }

  #[test]
  fn non_finite_numbers_survive_json() {
    let mut meta = Metadata::new();
    meta.set("nan", f64::NAN);
    meta.set("up", f64::INFINITY);
    meta.set("down", f64::NEG_INFINITY);
    meta.set("plain", 2.5);

    let json = serde_json::to_string(&meta).unwrap();
    assert!(!json.contains("null"), "{json}");
    let back: Metadata = serde_json::from_str(&json).unwrap();
    assert!(back.get_number("nan").unwrap().is_nan());
    assert_eq!(back.get_number("up"), Some(f64::INFINITY));
    assert_eq!(back.get_number("down"), Some(f64::NEG_INFINITY));
    assert_eq!(back.get_number("plain"), Some(2.5));
    assert_eq!(MetadataValue::from(f64::NAN).canonical_bytes(), MetadataValue::from(f64::NAN).canonical_bytes());
  }

  #[test]
  fn unknown_number_names_are_rejected() {
    let err = serde_json::from_str::<MetadataValue>(r#"{"kind":"number","value":"huge"}"#);
    assert!(err.is_err());
  }

  #[test]
  fn missing_and_mismatched_keys_are_absent() {
    let mut meta = Metadata::new();
    meta.set("published", true);
    assert!(meta.get("nope").is_none());
    assert!(meta.get_str("published").is_none());
    assert_eq!(meta.get_bool("published"), Some(true));
  }
}
