//! Size- and time-bounded caching for store and identity lookups.
//!
//! This module provides a generic TTL cache using Moka for concurrent
//! access with built-in TTL-based eviction.
//!
//! # Architecture
//!
//! The cache uses Moka's async Cache which provides:
//! - Lock-free concurrent reads
//! - Automatic TTL-based eviction
//! - Capacity-bounded storage
//!
//! Entries past their TTL are never returned: a read after expiry is a miss,
//! not a stale hit.
//!
//! # Key Design
//!
//! Callers own key construction and must namespace keys by tenant. Two
//! instances exist in the service:
//!
//! - store/model resolution: `"store-" + org` and `"model-" + org`
//! - identity lookups: `realm + ":" + email`
//!
//! # Example
//!
//! ```rust,ignore
//! use fgaiam_domain::cache::{TtlCache, TtlCacheConfig};
//! use std::time::Duration;
//!
//! let cache = TtlCache::new("stores", TtlCacheConfig::new(10, Duration::from_secs(300)));
//! cache.insert("store-acme".to_string(), "01HXYZ".to_string()).await;
//!
//! assert_eq!(cache.get(&"store-acme".to_string()).await, Some("01HXYZ".to_string()));
//! ```

use moka::future::Cache;
use std::hash::Hash;
use std::time::Duration;

/// Configuration for a TTL cache instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TtlCacheConfig {
    /// Maximum number of entries in the cache.
    pub max_capacity: u64,
    /// Time-to-live for every entry.
    pub ttl: Duration,
}

impl Default for TtlCacheConfig {
    fn default() -> Self {
        Self {
            max_capacity: 10_000,
            ttl: Duration::from_secs(3600),
        }
    }
}

impl TtlCacheConfig {
    /// Creates a configuration with the given capacity and TTL.
    pub fn new(max_capacity: u64, ttl: Duration) -> Self {
        Self { max_capacity, ttl }
    }

    /// Sets the maximum capacity.
    pub fn with_max_capacity(mut self, max_capacity: u64) -> Self {
        self.max_capacity = max_capacity;
        self
    }

    /// Sets the TTL.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }
}

/// Concurrent key-value cache with capacity and TTL eviction.
///
/// # Thread Safety
///
/// This cache is fully thread-safe and can be shared across multiple
/// async tasks without external synchronization. Cloning is cheap and
/// clones share the same storage.
pub struct TtlCache<K, V>
where
    K: Hash + Eq + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Label used for hit/miss metrics.
    name: &'static str,
    cache: Cache<K, V>,
    config: TtlCacheConfig,
}

impl<K, V> std::fmt::Debug for TtlCache<K, V>
where
    K: Hash + Eq + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TtlCache")
            .field("name", &self.name)
            .field("config", &self.config)
            .field("entry_count", &self.cache.entry_count())
            .finish()
    }
}

impl<K, V> TtlCache<K, V>
where
    K: Hash + Eq + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Creates a new cache with the given metrics label and configuration.
    pub fn new(name: &'static str, config: TtlCacheConfig) -> Self {
        let cache = Cache::builder()
            .max_capacity(config.max_capacity)
            .time_to_live(config.ttl)
            .build();

        Self {
            name,
            cache,
            config,
        }
    }

    /// Returns the configuration for this cache.
    pub fn config(&self) -> &TtlCacheConfig {
        &self.config
    }

    /// Retrieves a cached value.
    ///
    /// Returns `None` if the key is absent or has expired.
    ///
    /// # Metrics
    ///
    /// - `fgaiam_cache_hits_total{cache}` - incremented on hit
    /// - `fgaiam_cache_misses_total{cache}` - incremented on miss
    pub async fn get(&self, key: &K) -> Option<V> {
        let result = self.cache.get(key).await;
        if result.is_some() {
            metrics::counter!("fgaiam_cache_hits_total", "cache" => self.name).increment(1);
        } else {
            metrics::counter!("fgaiam_cache_misses_total", "cache" => self.name).increment(1);
        }
        result
    }

    /// Inserts a value; it expires after the configured TTL.
    pub async fn insert(&self, key: K, value: V) {
        self.cache.insert(key, value).await;
    }

    /// Inserts every pair from the iterator.
    pub async fn insert_many<I>(&self, entries: I)
    where
        I: IntoIterator<Item = (K, V)>,
    {
        for (key, value) in entries {
            self.cache.insert(key, value).await;
        }
    }

    /// Removes a single entry.
    pub async fn invalidate(&self, key: &K) {
        self.cache.invalidate(key).await;
    }

    /// Returns the approximate number of entries in the cache.
    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }

    /// Runs pending maintenance tasks (evictions).
    ///
    /// Useful in tests that assert on `entry_count`.
    pub async fn run_pending_tasks(&self) {
        self.cache.run_pending_tasks().await;
    }
}

impl<K, V> Clone for TtlCache<K, V>
where
    K: Hash + Eq + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            cache: self.cache.clone(),
            config: self.config.clone(),
        }
    }
}

/// Registers cache metric descriptions with the installed recorder.
pub fn register_cache_metrics() {
    metrics::describe_counter!(
        "fgaiam_cache_hits_total",
        "Number of TTL cache lookups that returned a live entry"
    );
    metrics::describe_counter!(
        "fgaiam_cache_misses_total",
        "Number of TTL cache lookups that found no live entry"
    );
}
