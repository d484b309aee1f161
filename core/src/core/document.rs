// presswork/src/core/document.rs

//! Defines `Document`, the immutable unit of content and metadata that flows
//! through pipelines, and `Content`, its lazily materializable payload.
//!
//! A `Document` is a cheap handle: cloning it shares the same snapshot. There is
//! no way to mutate one. Modules that want a changed document call
//! `Document::derive` and build a new one.

use crate::core::metadata::{Metadata, MetadataValue};
use crate::error::{PressError, PressResult};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// The payload of a document.
#[derive(Debug, Clone, Default)]
pub enum Content {
  #[default]
  Empty,
  Bytes(Arc<[u8]>),
  /// A file on local disk, read only when someone asks for it.
  File(PathBuf),
}

impl Content {
  pub fn from_text(text: impl Into<String>) -> Self {
    Content::Bytes(Arc::from(text.into().into_bytes()))
  }

  pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
    Content::Bytes(Arc::from(bytes.into()))
  }

  /// Streaming accessor. Callers that only need a prefix never load the rest.
  pub fn reader(&self) -> PressResult<Box<dyn Read + Send + '_>> {
    match self {
      Content::Empty => Ok(Box::new(std::io::empty())),
      Content::Bytes(bytes) => Ok(Box::new(&bytes[..])),
      Content::File(path) => {
        let file = std::fs::File::open(path).map_err(|e| PressError::io(path.display().to_string(), e))?;
        Ok(Box::new(std::io::BufReader::new(file)))
      }
    }
  }

  /// Reads the whole payload into memory.
  pub fn to_bytes(&self) -> PressResult<Vec<u8>> {
    match self {
      Content::Empty => Ok(Vec::new()),
      Content::Bytes(bytes) => Ok(bytes.to_vec()),
      Content::File(path) => std::fs::read(path).map_err(|e| PressError::io(path.display().to_string(), e)),
    }
  }

  pub fn to_text(&self) -> PressResult<String> {
    let bytes = self.to_bytes()?;
    String::from_utf8(bytes).map_err(|e| PressError::Handler {
      source: anyhow::anyhow!("content is not valid UTF-8: {}", e),
    })
  }

  pub fn is_materialized(&self) -> bool {
    !matches!(self, Content::File(_))
  }
}

#[derive(Debug)]
struct DocumentInner {
  id: String,
  source_path: Option<PathBuf>,
  metadata: Metadata,
  content: Content,
  hash_keys: Vec<String>,
  content_hash: String,
}

/// An immutable snapshot of one piece of content.
///
/// `index` is the input-order position assigned by the engine after every
/// stage. It travels outside the shared snapshot so re-tagging never copies
/// content or metadata.
#[derive(Debug, Clone)]
pub struct Document {
  index: usize,
  inner: Arc<DocumentInner>,
}

impl Document {
  pub fn builder(id: impl Into<String>) -> DocumentBuilder {
    DocumentBuilder {
      id: id.into(),
      source_path: None,
      metadata: Metadata::new(),
      content: Content::Empty,
      hash_keys: Vec::new(),
    }
  }

  /// Starts a builder seeded with this document's id, source, metadata and
  /// content. Hash-relevant keys carry over.
  pub fn derive(&self) -> DocumentBuilder {
    DocumentBuilder {
      id: self.inner.id.clone(),
      source_path: self.inner.source_path.clone(),
      metadata: self.inner.metadata.clone(),
      content: self.inner.content.clone(),
      hash_keys: self.inner.hash_keys.clone(),
    }
  }

  pub fn id(&self) -> &str {
    &self.inner.id
  }

  pub fn source_path(&self) -> Option<&Path> {
    self.inner.source_path.as_deref()
  }

  pub fn metadata(&self) -> &Metadata {
    &self.inner.metadata
  }

  pub fn get(&self, key: &str) -> Option<&MetadataValue> {
    self.inner.metadata.get(key)
  }

  pub fn content(&self) -> &Content {
    &self.inner.content
  }

  /// Hex SHA-256 over content and the hash-relevant metadata.
  pub fn content_hash(&self) -> &str {
    &self.inner.content_hash
  }

  /// Metadata keys the producing module declared hash-relevant, sorted.
  pub fn hash_keys(&self) -> &[String] {
    &self.inner.hash_keys
  }

  pub fn index(&self) -> usize {
    self.index
  }

  /// Same snapshot, new position.
  pub(crate) fn with_index(&self, index: usize) -> Document {
    Document {
      index,
      inner: Arc::clone(&self.inner),
    }
  }

  /// True when both handles point at the same snapshot.
  pub fn ptr_eq(&self, other: &Document) -> bool {
    Arc::ptr_eq(&self.inner, &other.inner)
  }

  pub(crate) fn to_cached(&self) -> PressResult<CachedDocument> {
    Ok(CachedDocument {
      id: self.inner.id.clone(),
      source_path: self.inner.source_path.clone(),
      metadata: self.inner.metadata.clone(),
      content: self.inner.content.to_bytes()?,
      hash_keys: self.inner.hash_keys.clone(),
      content_hash: self.inner.content_hash.clone(),
    })
  }

  pub(crate) fn from_cached(cached: &CachedDocument, index: usize) -> Document {
    Document {
      index,
      inner: Arc::new(DocumentInner {
        id: cached.id.clone(),
        source_path: cached.source_path.clone(),
        metadata: cached.metadata.clone(),
        content: Content::from_bytes(cached.content.clone()),
        hash_keys: cached.hash_keys.clone(),
        content_hash: cached.content_hash.clone(),
      }),
    }
  }
}

/// Serialized form of a document inside the persisted cache. Content is always
/// materialized here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct CachedDocument {
  pub(crate) id: String,
  pub(crate) source_path: Option<PathBuf>,
  pub(crate) metadata: Metadata,
  pub(crate) content: Vec<u8>,
  pub(crate) hash_keys: Vec<String>,
  pub(crate) content_hash: String,
}

pub struct DocumentBuilder {
  id: String,
  source_path: Option<PathBuf>,
  metadata: Metadata,
  content: Content,
  hash_keys: Vec<String>,
}

impl DocumentBuilder {
  pub fn id(mut self, id: impl Into<String>) -> Self {
    self.id = id.into();
    self
  }

  pub fn source_path(mut self, path: impl Into<PathBuf>) -> Self {
    self.source_path = Some(path.into());
    self
  }

  pub fn content(mut self, content: Content) -> Self {
    self.content = content;
    self
  }

  pub fn text(self, text: impl Into<String>) -> Self {
    self.content(Content::from_text(text))
  }

  pub fn metadata(mut self, key: impl Into<String>, value: impl Into<MetadataValue>) -> Self {
    self.metadata.set(key, value);
    self
  }

  /// Sets a metadata value and marks the key as hash-relevant.
  pub fn hashed_metadata(mut self, key: impl Into<String>, value: impl Into<MetadataValue>) -> Self {
    let key = key.into();
    self.metadata.set(key.clone(), value);
    self.hash_key(key)
  }

  pub fn hash_key(mut self, key: impl Into<String>) -> Self {
    let key = key.into();
    if !self.hash_keys.contains(&key) {
      self.hash_keys.push(key);
    }
    self
  }

  /// Computes the content hash, streaming the payload, and seals the document.
  pub fn build(mut self) -> PressResult<Document> {
    self.hash_keys.sort();
    let content_hash = compute_hash(&self.content, &self.metadata, &self.hash_keys)?;
    Ok(Document {
      index: 0,
      inner: Arc::new(DocumentInner {
        id: self.id,
        source_path: self.source_path,
        metadata: self.metadata,
        content: self.content,
        hash_keys: self.hash_keys,
        content_hash,
      }),
    })
  }
}

fn compute_hash(content: &Content, metadata: &Metadata, hash_keys: &[String]) -> PressResult<String> {
  let mut hasher = Sha256::new();
  let mut reader = content.reader()?;
  let mut buf = [0u8; 8192];
  loop {
    let n = reader.read(&mut buf).map_err(|e| PressError::io("<content>", e))?;
    if n == 0 {
      break;
    }
    hasher.update(&buf[..n]);
  }
  for key in hash_keys {
    hasher.update(b"\0meta\0");
    hasher.update(key.as_bytes());
    hasher.update(b"\0");
    match metadata.get(key) {
      Some(value) => hasher.update(value.canonical_bytes()),
      None => hasher.update(b"null"),
    }
  }
  Ok(format!("{:x}", hasher.finalize()))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn hash_covers_content_and_declared_metadata_only() {
    let a = Document::builder("a").text("hello").metadata("noise", 1_i64).build().unwrap();
    let b = Document::builder("b").text("hello").metadata("noise", 2_i64).build().unwrap();
    assert_eq!(a.content_hash(), b.content_hash());

    let c = Document::builder("c").text("hello").hashed_metadata("title", "One").build().unwrap();
    let d = Document::builder("d").text("hello").hashed_metadata("title", "Two").build().unwrap();
    assert_ne!(c.content_hash(), d.content_hash());
    assert_ne!(a.content_hash(), c.content_hash());
  }

  #[test]
  fn derive_leaves_the_original_untouched() {
    let original = Document::builder("post").text("body").metadata("title", "Old").build().unwrap();
    let changed = original.derive().metadata("title", "New").build().unwrap();

    assert_eq!(original.metadata().get_str("title"), Some("Old"));
    assert_eq!(changed.metadata().get_str("title"), Some("New"));
    assert_eq!(changed.metadata().history("title").len(), 2);
    assert!(!original.ptr_eq(&changed));
  }

  #[test]
  fn file_content_is_streamed_lazily() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("page.txt");
    std::fs::write(&path, "on disk").unwrap();

    let lazy = Document::builder("page").content(Content::File(path)).build().unwrap();
    let eager = Document::builder("page").text("on disk").build().unwrap();
    assert!(!lazy.content().is_materialized());
    assert_eq!(lazy.content_hash(), eager.content_hash());
    assert_eq!(lazy.content().to_text().unwrap(), "on disk");
  }
}
