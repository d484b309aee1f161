// presswork/src/cache/key.rs

use crate::core::document::Document;
use crate::core::module::Module;
use crate::core::settings::{canonicalize, Settings};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Composite cache key. Entries are trusted only when every field matches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheKey {
  pub module: String,
  pub version: String,
  /// Digest of the module's canonical parameters.
  pub parameters: String,
  /// `id:content_hash` of each input document, in input order. Outputs
  /// often carry the input id, so equal content under another id is a miss.
  pub inputs: Vec<String>,
  /// Digest of the settings the module declared relevant.
  pub settings: String,
  /// Digest of the pipeline's dependency outputs.
  pub upstream: String,
}

impl CacheKey {
  pub fn for_invocation(
    module: &dyn Module,
    inputs: &[Document],
    settings: &Settings,
    upstream_hash: &str,
  ) -> Self {
    let parameters = canonicalize(&module.parameters()).to_string();
    Self {
      module: module.identity().to_string(),
      version: module.version().to_string(),
      parameters: sha256_hex(parameters.as_bytes()),
      inputs: inputs.iter().map(|d| format!("{}:{}", d.id(), d.content_hash())).collect(),
      settings: settings.subset_hash(&module.relevant_settings()),
      upstream: upstream_hash.to_string(),
    }
  }

  /// Storage key. Collisions are harmless: lookups still compare the full key.
  pub fn digest(&self) -> String {
    let mut hasher = Sha256::new();
    for part in [&self.module, &self.version, &self.parameters, &self.settings, &self.upstream] {
      hasher.update(part.as_bytes());
      hasher.update(b"\0");
    }
    hasher.update(self.inputs.len().to_le_bytes());
    for input in &self.inputs {
      hasher.update(input.as_bytes());
      hasher.update(b"\0");
    }
    format!("{:x}", hasher.finalize())
  }
}

/// Digest over the dependency outputs a pipeline can see, by pipeline name
/// and then document order.
pub(crate) fn upstream_hash(upstream: &BTreeMap<String, Arc<Vec<Document>>>) -> String {
  let mut hasher = Sha256::new();
  for (name, docs) in upstream {
    hasher.update(name.as_bytes());
    hasher.update(b"\0");
    for doc in docs.iter() {
      hasher.update(doc.id().as_bytes());
      hasher.update(b"\0");
      hasher.update(doc.content_hash().as_bytes());
      hasher.update(b"\0");
    }
    hasher.update(b"\x01");
  }
  format!("{:x}", hasher.finalize())
}

fn sha256_hex(bytes: &[u8]) -> String {
  format!("{:x}", Sha256::digest(bytes))
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::core::module::{FnModule, ModuleError};

  fn echo() -> FnModule {
    FnModule::batch("echo", |docs, _ctx| async move { Ok::<_, ModuleError>(docs) }).with_relevant_settings(["theme"])
  }

  fn doc(id: &str, text: &str) -> Document {
    Document::builder(id).text(text).build().unwrap()
  }

  #[test]
  fn key_tracks_inputs_in_order() {
    let module = echo();
    let settings = Settings::new();
    let a = doc("a", "one");
    let b = doc("b", "two");

    let ab = CacheKey::for_invocation(&module, &[a.clone(), b.clone()], &settings, "");
    let ba = CacheKey::for_invocation(&module, &[b, a], &settings, "");
    assert_ne!(ab, ba);
    assert_ne!(ab.digest(), ba.digest());
  }

  #[test]
  fn equal_content_under_another_id_is_another_key() {
    let module = echo();
    let settings = Settings::new();
    let a = CacheKey::for_invocation(&module, &[doc("a.md", "same")], &settings, "");
    let b = CacheKey::for_invocation(&module, &[doc("b.md", "same")], &settings, "");
    assert_ne!(a, b);
  }

  #[test]
  fn key_ignores_irrelevant_settings() {
    let module = echo();
    let input = [doc("a", "one")];
    let base = Settings::new().with("theme", "dark");
    let unrelated = base.clone().with("analytics", true);
    let relevant = Settings::new().with("theme", "light");

    let k1 = CacheKey::for_invocation(&module, &input, &base, "");
    assert_eq!(k1, CacheKey::for_invocation(&module, &input, &unrelated, ""));
    assert_ne!(k1, CacheKey::for_invocation(&module, &input, &relevant, ""));
  }

  #[test]
  fn upstream_hash_changes_with_dependency_content() {
    let mut upstream = BTreeMap::new();
    upstream.insert("posts".to_string(), Arc::new(vec![doc("p1", "hello")]));
    let before = upstream_hash(&upstream);
    upstream.insert("posts".to_string(), Arc::new(vec![doc("p1", "hello, world")]));
    assert_ne!(before, upstream_hash(&upstream));
    assert_ne!(before, upstream_hash(&BTreeMap::new()));
  }
}
