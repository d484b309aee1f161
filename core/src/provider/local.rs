// presswork/src/provider/local.rs

use super::{validate_relative, FileProvider};
use crate::core::document::Content;
use crate::error::{PressError, PressResult};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::{event, Level};

/// Provider rooted at a directory on local disk.
#[derive(Debug, Clone)]
pub struct LocalFileProvider {
  root: PathBuf,
}

impl LocalFileProvider {
  pub fn new(root: impl Into<PathBuf>) -> Self {
    Self { root: root.into() }
  }

  pub fn root(&self) -> &Path {
    &self.root
  }

  fn resolve(&self, path: &str) -> PressResult<PathBuf> {
    validate_relative(path)?;
    Ok(self.root.join(path.trim_start_matches("./")))
  }
}

#[async_trait]
impl FileProvider for LocalFileProvider {
  async fn list(&self, prefix: &str) -> PressResult<Vec<String>> {
    let mut found = Vec::new();
    let mut pending = vec![self.root.clone()];

    while let Some(dir) = pending.pop() {
      let mut entries = match tokio::fs::read_dir(&dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
        Err(e) => return Err(PressError::io(dir.display().to_string(), e)),
      };
      while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| PressError::io(dir.display().to_string(), e))?
      {
        let path = entry.path();
        let file_type = entry
          .file_type()
          .await
          .map_err(|e| PressError::io(path.display().to_string(), e))?;
        if file_type.is_dir() {
          pending.push(path);
          continue;
        }
        let Ok(relative) = path.strip_prefix(&self.root) else {
          continue;
        };
        let relative = relative
          .components()
          .map(|c| c.as_os_str().to_string_lossy())
          .collect::<Vec<_>>()
          .join("/");
        if relative.starts_with(prefix) {
          found.push(relative);
        }
      }
    }

    found.sort();
    event!(Level::TRACE, root = %self.root.display(), prefix, count = found.len(), "Listed local files.");
    Ok(found)
  }

  async fn read(&self, path: &str) -> PressResult<Vec<u8>> {
    let full = self.resolve(path)?;
    tokio::fs::read(&full).await.map_err(|e| PressError::io(full.display().to_string(), e))
  }

  async fn write(&self, path: &str, bytes: &[u8]) -> PressResult<()> {
    let full = self.resolve(path)?;
    if let Some(parent) = full.parent() {
      tokio::fs::create_dir_all(parent)
        .await
        .map_err(|e| PressError::io(parent.display().to_string(), e))?;
    }
    tokio::fs::write(&full, bytes)
      .await
      .map_err(|e| PressError::io(full.display().to_string(), e))
  }

  async fn content(&self, path: &str) -> PressResult<Content> {
    let full = self.resolve(path)?;
    // Existence check only; the bytes stay on disk until someone reads them.
    tokio::fs::metadata(&full)
      .await
      .map_err(|e| PressError::io(full.display().to_string(), e))?;
    Ok(Content::File(full))
  }
}
