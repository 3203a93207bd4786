//! Caching subsystem.
//!
//! Two independent caches with deliberately different lifecycles:
//!
//! - [`FingerprintCache`] — content-addressed duplicate detection. An
//!   insertion-ordered index of fingerprints (strong hash + frequent-term
//!   signature) with unconditional FIFO eviction past its size bound.
//!   Serves exact and near-duplicate lookups before any provider call is
//!   attempted.
//!
//! - [`KeyedCache`] — key-addressed result storage with LRU + TTL bounds
//!   (moka), for callers that have a stable key and want time-based
//!   expiry rather than similarity matching.

mod fingerprint;
mod signature;

pub use fingerprint::{
    CacheEntry, Fingerprint, FingerprintCache, FingerprintConfig, SimilarityMatch,
};
pub use signature::ContentType;

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::time::Duration;

use serde_json::Value;

use crate::telemetry;

/// Configuration for the keyed result cache.
#[derive(Debug, Clone)]
pub struct KeyedCacheConfig {
    /// Maximum number of cached entries. Default: 10,000.
    pub max_entries: u64,
    /// Time-to-live for cached entries. Default: 1 hour.
    pub ttl: Duration,
}

impl Default for KeyedCacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 10_000,
            ttl: Duration::from_secs(3600),
        }
    }
}

impl KeyedCacheConfig {
    /// Create a new config with sensible defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum number of cached entries.
    pub fn max_entries(mut self, n: u64) -> Self {
        self.max_entries = n;
        self
    }

    /// Set the time-to-live for cached entries.
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }
}

/// Key-addressed result cache with LRU + TTL bounds.
///
/// Keyed on a hash of (operation, input strings). Values are opaque JSON.
pub struct KeyedCache {
    cache: moka::sync::Cache<u64, Value>,
}

impl KeyedCache {
    /// Create a new keyed cache with the given configuration.
    pub fn new(config: &KeyedCacheConfig) -> Self {
        let cache = moka::sync::Cache::builder()
            .max_capacity(config.max_entries)
            .time_to_live(config.ttl)
            .build();
        Self { cache }
    }

    /// Look up a cached result.
    ///
    /// Returns `None` on miss or after TTL expiry.
    pub fn get(&self, operation: &str, input: &[&str]) -> Option<Value> {
        let key = cache_key(operation, input);
        match self.cache.get(&key) {
            Some(value) => {
                metrics::counter!(telemetry::CACHE_HITS_TOTAL, "kind" => "keyed").increment(1);
                Some(value)
            }
            None => {
                metrics::counter!(telemetry::CACHE_MISSES_TOTAL, "kind" => "keyed").increment(1);
                None
            }
        }
    }

    /// Insert (or overwrite) a cached result.
    pub fn insert(&self, operation: &str, input: &[&str], value: Value) {
        self.cache.insert(cache_key(operation, input), value);
    }

    /// Number of entries currently cached.
    pub fn len(&self) -> u64 {
        self.cache.entry_count()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Evict all entries.
    pub fn clear(&self) {
        self.cache.invalidate_all();
    }
}

/// Compute a cache key from operation and input strings.
///
/// `DefaultHasher` (SipHash) is deterministic within a process lifetime,
/// which is sufficient for an in-memory cache.
fn cache_key(operation: &str, input: &[&str]) -> u64 {
    let mut hasher = DefaultHasher::new();
    operation.hash(&mut hasher);
    for s in input {
        s.hash(&mut hasher);
    }
    hasher.finish()
}
