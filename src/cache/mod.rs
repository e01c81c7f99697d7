//! Caching of remote reads.
//!
//! This module provides:
//! - A TTL-gated key/value store with optional LRU bounding
//! - Stable hashed keys for page queries and single documents
//! - Result metadata telling callers whether data came from cache

mod key;
mod store;
mod traits;

pub use key::CacheKey;
pub use store::{CacheEntry, CacheStore, DEFAULT_TTL_SECS, MAX_TTL_SECS};
pub use traits::{CacheResult, CacheSource};
