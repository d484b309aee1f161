// presswork/src/cache/store.rs

//! In-memory cache map with optional JSON persistence.

use super::{CacheKey, CACHE_FORMAT, ENGINE_VERSION};
use crate::core::document::CachedDocument;
use crate::error::{PressError, PressResult};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{event, Level};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct CacheEntry {
  key: CacheKey,
  documents: Vec<CachedDocument>,
  valid: bool,
}

#[derive(Serialize, Deserialize)]
struct CacheFile {
  engine_version: String,
  format: u32,
  entries: BTreeMap<String, CacheEntry>,
}

/// Per-build cache counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
  pub hits: u64,
  pub misses: u64,
  pub stores: u64,
  pub entries: usize,
}

impl CacheStats {
  /// Hit rate as percentage (0-100).
  pub fn hit_rate_percent(&self) -> f64 {
    let total = (self.hits + self.misses) as f64;
    if total == 0.0 {
      0.0
    } else {
      (self.hits as f64 / total) * 100.0
    }
  }
}

#[derive(Default)]
struct Counters {
  hits: AtomicU64,
  misses: AtomicU64,
  stores: AtomicU64,
}

/// Shared across all workers of a build, and across builds of one engine.
pub struct DocumentCache {
  entries: RwLock<HashMap<String, CacheEntry>>,
  // Digests hit or stored since the last `begin_build`.
  touched: Mutex<HashSet<String>>,
  counters: Counters,
  path: Option<PathBuf>,
}

impl DocumentCache {
  pub fn new_memory() -> Self {
    Self {
      entries: RwLock::new(HashMap::new()),
      touched: Mutex::new(HashSet::new()),
      counters: Counters::default(),
      path: None,
    }
  }

  /// Opens the cache persisted at `path`.
  ///
  /// A missing file is a cold start. A file that fails to parse or carries
  /// another engine version is discarded: the cache starts empty and the
  /// returned `CacheCorruption` error is meant to be reported as a warning.
  pub fn open(path: impl Into<PathBuf>) -> (Self, Option<PressError>) {
    let path = path.into();
    let mut cache = Self::new_memory();
    cache.path = Some(path.clone());

    match Self::read_file(&path) {
      Ok(Some(entries)) => {
        event!(Level::DEBUG, path = %path.display(), entries = entries.len(), "Loaded persisted cache.");
        *cache.entries.write() = entries;
        (cache, None)
      }
      Ok(None) => {
        event!(Level::DEBUG, path = %path.display(), "No persisted cache, starting cold.");
        (cache, None)
      }
      Err(err) => {
        event!(Level::WARN, path = %path.display(), error = %err, "Discarding persisted cache.");
        (cache, Some(err))
      }
    }
  }

  fn read_file(path: &Path) -> PressResult<Option<HashMap<String, CacheEntry>>> {
    let raw = match std::fs::read(path) {
      Ok(raw) => raw,
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
      Err(e) => {
        return Err(PressError::CacheCorruption {
          message: format!("cannot read '{}': {}", path.display(), e),
        })
      }
    };
    let file: CacheFile = serde_json::from_slice(&raw).map_err(|e| PressError::CacheCorruption {
      message: format!("malformed cache file '{}': {}", path.display(), e),
    })?;
    if file.engine_version != ENGINE_VERSION || file.format != CACHE_FORMAT {
      return Err(PressError::CacheCorruption {
        message: format!(
          "cache written by engine {} (format {}), expected {} (format {})",
          file.engine_version, file.format, ENGINE_VERSION, CACHE_FORMAT
        ),
      });
    }
    Ok(Some(file.entries.into_iter().collect()))
  }

  pub fn path(&self) -> Option<&Path> {
    self.path.as_deref()
  }

  /// Resets per-build counters and the set of used entries.
  pub(crate) fn begin_build(&self) {
    self.touched.lock().clear();
    self.counters.hits.store(0, Ordering::Relaxed);
    self.counters.misses.store(0, Ordering::Relaxed);
    self.counters.stores.store(0, Ordering::Relaxed);
  }

  /// Exact-match lookup. Any difference in any key component is a miss.
  pub(crate) fn lookup(&self, key: &CacheKey) -> Option<Vec<CachedDocument>> {
    let digest = key.digest();
    let found = {
      let entries = self.entries.read();
      entries
        .get(&digest)
        .filter(|entry| entry.valid && entry.key == *key)
        .map(|entry| entry.documents.clone())
    };
    match found {
      Some(documents) => {
        self.counters.hits.fetch_add(1, Ordering::Relaxed);
        self.touched.lock().insert(digest);
        Some(documents)
      }
      None => {
        self.counters.misses.fetch_add(1, Ordering::Relaxed);
        None
      }
    }
  }

  /// First writer wins. Returns `false` when a valid entry for `key` already
  /// existed and was kept.
  pub(crate) fn insert_if_absent(&self, key: CacheKey, documents: Vec<CachedDocument>) -> bool {
    let digest = key.digest();
    let inserted = {
      let mut entries = self.entries.write();
      match entries.get(&digest) {
        Some(existing) if existing.valid && existing.key == key => false,
        _ => {
          entries.insert(
            digest.clone(),
            CacheEntry {
              key,
              documents,
              valid: true,
            },
          );
          true
        }
      }
    };
    if inserted {
      self.counters.stores.fetch_add(1, Ordering::Relaxed);
    }
    self.touched.lock().insert(digest);
    inserted
  }

  /// Marks an entry unusable without removing it.
  pub fn invalidate(&self, key: &CacheKey) {
    if let Some(entry) = self.entries.write().get_mut(&key.digest()) {
      entry.valid = false;
    }
  }

  pub fn clear(&self) {
    self.entries.write().clear();
    self.touched.lock().clear();
  }

  pub fn len(&self) -> usize {
    self.entries.read().len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.read().is_empty()
  }

  pub fn stats(&self) -> CacheStats {
    CacheStats {
      hits: self.counters.hits.load(Ordering::Relaxed),
      misses: self.counters.misses.load(Ordering::Relaxed),
      stores: self.counters.stores.load(Ordering::Relaxed),
      entries: self.len(),
    }
  }

  /// Drops every entry the last build neither hit nor stored.
  pub(crate) fn retain_touched(&self) {
    let touched = self.touched.lock();
    let mut entries = self.entries.write();
    let before = entries.len();
    entries.retain(|digest, entry| entry.valid && touched.contains(digest));
    event!(Level::DEBUG, evicted = before - entries.len(), kept = entries.len(), "Pruned cache.");
  }

  /// Writes the cache to its path, if it has one. Goes through a temp file so
  /// a crash never leaves a half-written cache behind.
  pub fn flush(&self) -> PressResult<()> {
    let Some(path) = &self.path else {
      return Ok(());
    };
    let file = CacheFile {
      engine_version: ENGINE_VERSION.to_string(),
      format: CACHE_FORMAT,
      entries: self
        .entries
        .read()
        .iter()
        .map(|(digest, entry)| (digest.clone(), entry.clone()))
        .collect(),
    };
    let bytes = serde_json::to_vec(&file)?;

    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent).map_err(|e| PressError::io(parent.display().to_string(), e))?;
    }
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, &bytes).map_err(|e| PressError::io(tmp.display().to_string(), e))?;
    std::fs::rename(&tmp, path).map_err(|e| PressError::io(path.display().to_string(), e))?;
    event!(Level::DEBUG, path = %path.display(), entries = file.entries.len(), bytes = bytes.len(), "Flushed cache.");
    Ok(())
  }
}
