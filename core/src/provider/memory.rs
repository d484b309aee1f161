// presswork/src/provider/memory.rs

use super::{validate_relative, FileProvider};
use crate::error::{PressError, PressResult};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Map-backed provider for tests and generated sites.
#[derive(Default, Clone)]
pub struct InMemoryFileProvider {
  files: Arc<RwLock<BTreeMap<String, Arc<[u8]>>>>,
}

impl InMemoryFileProvider {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_file(self, path: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
    self.insert(path, bytes);
    self
  }

  pub fn insert(&self, path: impl Into<String>, bytes: impl Into<Vec<u8>>) {
    self.files.write().insert(path.into(), Arc::from(bytes.into()));
  }

  pub fn get(&self, path: &str) -> Option<Vec<u8>> {
    self.files.read().get(path).map(|b| b.to_vec())
  }

  pub fn get_text(&self, path: &str) -> Option<String> {
    self.get(path).and_then(|b| String::from_utf8(b).ok())
  }

  pub fn paths(&self) -> Vec<String> {
    self.files.read().keys().cloned().collect()
  }

  pub fn len(&self) -> usize {
    self.files.read().len()
  }

  pub fn is_empty(&self) -> bool {
    self.files.read().is_empty()
  }
}

#[async_trait]
impl FileProvider for InMemoryFileProvider {
  async fn list(&self, prefix: &str) -> PressResult<Vec<String>> {
    Ok(self.files.read().keys().filter(|p| p.starts_with(prefix)).cloned().collect())
  }

  async fn read(&self, path: &str) -> PressResult<Vec<u8>> {
    self.files.read().get(path).map(|b| b.to_vec()).ok_or_else(|| {
      PressError::io(
        path,
        std::io::Error::new(std::io::ErrorKind::NotFound, "no such file in memory provider"),
      )
    })
  }

  async fn write(&self, path: &str, bytes: &[u8]) -> PressResult<()> {
    validate_relative(path)?;
    self.files.write().insert(path.to_string(), Arc::from(bytes));
    Ok(())
  }
}
