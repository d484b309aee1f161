// presswork/src/cache/mod.rs

//! Content-hash-keyed store of module outputs.
//!
//! A module invocation is keyed by everything that can change its result:
//! module identity, version and parameters, the ordered hashes of its input
//! documents, the settings it declared relevant, and the outputs of its
//! pipeline's dependencies. Because upstream outputs are part of the key,
//! a change anywhere invalidates exactly the dependent work without any
//! manual flags.

pub mod key;
pub mod store;

pub use key::CacheKey;
pub use store::{CacheStats, DocumentCache};

/// Engine version written into, and checked against, the persisted cache.
pub const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Bumped whenever the persisted layout changes.
pub const CACHE_FORMAT: u32 = 1;
