// presswork/src/provider/staged.rs

//! Holds one build's writes back from the real output provider.
//!
//! Modules see the staged files layered over the target: reads and listings
//! include what this build wrote so far. Nothing reaches the target until
//! `publish` runs, which the engine only does for builds that were not
//! cancelled.

use super::{validate_relative, FileProvider};
use crate::core::document::Content;
use crate::error::PressResult;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{event, Level};

pub(crate) struct StagedFileProvider {
  target: Arc<dyn FileProvider>,
  staged: Mutex<BTreeMap<String, Arc<[u8]>>>,
}

impl StagedFileProvider {
  pub(crate) fn new(target: Arc<dyn FileProvider>) -> Self {
    Self {
      target,
      staged: Mutex::new(BTreeMap::new()),
    }
  }

  pub(crate) fn staged_paths(&self) -> Vec<String> {
    self.staged.lock().keys().cloned().collect()
  }

  /// Drops every staged write.
  pub(crate) fn discard(&self) {
    let dropped = std::mem::take(&mut *self.staged.lock());
    if !dropped.is_empty() {
      event!(Level::DEBUG, files = dropped.len(), "Discarded staged output.");
    }
  }

  /// Writes staged files to the target in path order. Stops at the first
  /// failure; files after it stay staged.
  pub(crate) async fn publish(&self) -> PressResult<usize> {
    let pending: Vec<(String, Arc<[u8]>)> = self
      .staged
      .lock()
      .iter()
      .map(|(path, bytes)| (path.clone(), Arc::clone(bytes)))
      .collect();
    for (path, bytes) in &pending {
      self.target.write(path, bytes).await?;
      self.staged.lock().remove(path);
    }
    event!(Level::DEBUG, files = pending.len(), "Published staged output.");
    Ok(pending.len())
  }
}

#[async_trait]
impl FileProvider for StagedFileProvider {
  async fn list(&self, prefix: &str) -> PressResult<Vec<String>> {
    let mut paths = self.target.list(prefix).await?;
    paths.extend(self.staged.lock().keys().filter(|p| p.starts_with(prefix)).cloned());
    paths.sort();
    paths.dedup();
    Ok(paths)
  }

  async fn read(&self, path: &str) -> PressResult<Vec<u8>> {
    let staged = self.staged.lock().get(path).map(|b| b.to_vec());
    match staged {
      Some(bytes) => Ok(bytes),
      None => self.target.read(path).await,
    }
  }

  async fn write(&self, path: &str, bytes: &[u8]) -> PressResult<()> {
    validate_relative(path)?;
    self.staged.lock().insert(path.to_string(), Arc::from(bytes));
    Ok(())
  }

  async fn content(&self, path: &str) -> PressResult<Content> {
    let staged = self.staged.lock().get(path).cloned();
    match staged {
      Some(bytes) => Ok(Content::Bytes(bytes)),
      None => self.target.content(path).await,
    }
  }
}
