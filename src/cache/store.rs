//! Time-boxed in-memory cache.

use chrono::{DateTime, Duration, Utc};
use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;

/// Default time-to-live of a cache entry: five minutes.
pub const DEFAULT_TTL_SECS: i64 = 300;

/// Largest TTL a [`chrono::Duration`] can hold, in seconds.
pub const MAX_TTL_SECS: i64 = i64::MAX / 1000;

/// A stored value and the moment it was stored.
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
  pub value: V,
  pub stored_at: DateTime<Utc>,
}

/// Key/value cache whose entries are readable only within a TTL.
///
/// Expired entries are never swept; they stay in place, inert, until the
/// next `set` for the same key or a `clear`. An optional capacity bounds
/// memory with least-recently-used eviction. Eviction never makes a read
/// valid that the TTL would reject.
pub struct CacheStore<V> {
  entries: Mutex<LruCache<String, CacheEntry<V>>>,
  ttl: Duration,
}

impl<V: Clone> CacheStore<V> {
  /// Create an unbounded cache with the default TTL.
  pub fn new() -> Self {
    Self {
      entries: Mutex::new(LruCache::unbounded()),
      ttl: Duration::seconds(DEFAULT_TTL_SECS),
    }
  }

  /// Create a cache holding at most `capacity` keys.
  pub fn bounded(capacity: NonZeroUsize) -> Self {
    Self {
      entries: Mutex::new(LruCache::new(capacity)),
      ttl: Duration::seconds(DEFAULT_TTL_SECS),
    }
  }

  /// Set the time-to-live of entries.
  pub fn with_ttl(mut self, ttl: Duration) -> Self {
    self.ttl = ttl;
    self
  }

  pub fn ttl(&self) -> Duration {
    self.ttl
  }

  fn is_fresh(&self, stored_at: DateTime<Utc>) -> bool {
    Utc::now() - stored_at < self.ttl
  }

  /// The value for `key`, if present and within the TTL.
  pub fn get(&self, key: &str) -> Option<V> {
    self.get_entry(key).map(|entry| entry.value)
  }

  /// Like [`get`](Self::get), but also returns when the value was stored.
  pub fn get_entry(&self, key: &str) -> Option<CacheEntry<V>> {
    let mut entries = self.entries.lock();
    // Expired entries must not be promoted in the eviction order.
    if !self.is_fresh(entries.peek(key)?.stored_at) {
      return None;
    }
    entries.get(key).cloned()
  }

  /// Store `value`, replacing whatever was held for `key`.
  pub fn set(&self, key: impl Into<String>, value: V) {
    let entry = CacheEntry {
      value,
      stored_at: Utc::now(),
    };
    self.entries.lock().put(key.into(), entry);
  }

  pub fn clear(&self) {
    self.entries.lock().clear();
  }

  /// Number of held entries, expired ones included.
  pub fn len(&self) -> usize {
    self.entries.lock().len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }
}

impl<V: Clone> Default for CacheStore<V> {
  fn default() -> Self {
    Self::new()
  }
}
