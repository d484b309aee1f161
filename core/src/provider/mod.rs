// presswork/src/provider/mod.rs

//! File providers: the engine's only window onto storage.
//!
//! Paths are relative, `/`-separated strings. Every call acquires and releases
//! its own handles, so nothing stays open between calls even when a call fails.

pub mod local;
pub mod memory;
pub(crate) mod staged;

use crate::core::document::Content;
use crate::error::PressResult;
use async_trait::async_trait;

pub use local::LocalFileProvider;
pub use memory::InMemoryFileProvider;

#[async_trait]
pub trait FileProvider: Send + Sync {
  /// All file paths under `prefix` (empty for everything), sorted.
  async fn list(&self, prefix: &str) -> PressResult<Vec<String>>;

  async fn read(&self, path: &str) -> PressResult<Vec<u8>>;

  /// Creates or replaces the file at `path`.
  async fn write(&self, path: &str, bytes: &[u8]) -> PressResult<()>;

  /// A content handle for `path`. Providers that can defer the read return
  /// lazy content; the default reads eagerly.
  async fn content(&self, path: &str) -> PressResult<Content> {
    Ok(Content::from_bytes(self.read(path).await?))
  }
}

/// Rejects absolute paths and parent traversal.
pub(crate) fn validate_relative(path: &str) -> PressResult<()> {
  let trimmed = path.trim_start_matches("./");
  if trimmed.starts_with('/') || trimmed.split('/').any(|part| part == "..") {
    return Err(crate::error::PressError::Handler {
      source: anyhow::anyhow!("path '{}' escapes the provider root", path),
    });
  }
  Ok(())
}
