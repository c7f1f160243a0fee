//! Short-lived TTL cache that bounds how often expensive sampling runs.
//!
//! Entries expire lazily on read; [`TtlCache::cleanup_expired`] exists for
//! periodic maintenance only. The cache does not single-flight: two callers
//! that miss on the same key before either stores a value will both compute.
//! The internal lock is held only for map bookkeeping, never while a value is
//! being computed.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;
use tracing::trace;

/// A single cached value with its expiry window.
#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    created_at: Instant,
    ttl: Duration,
}

impl<V> CacheEntry<V> {
    fn new(value: V, ttl: Duration) -> Self {
        Self {
            value,
            created_at: Instant::now(),
            ttl,
        }
    }

    fn is_expired(&self, now: Instant) -> bool {
        now.duration_since(self.created_at) > self.ttl
    }
}

struct CacheInner<K, V> {
    entries: HashMap<K, CacheEntry<V>>,
    hits: u64,
    misses: u64,
    total: u64,
}

/// Counters accumulated since the cache was created.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub total: u64,
    pub hit_rate_percent: f64,
    pub active_entries: usize,
}

/// Generic key/value cache with per-entry time-to-live.
pub struct TtlCache<K, V> {
    inner: Mutex<CacheInner<K, V>>,
}

impl<K, V> Default for TtlCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(CacheInner {
                entries: HashMap::new(),
                hits: 0,
                misses: 0,
                total: 0,
            }),
        }
    }

    // A panic while holding the lock cannot leave the map half-updated, so a
    // poisoned lock is still usable.
    fn lock(&self) -> MutexGuard<'_, CacheInner<K, V>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Store `value` under `key`, replacing any previous entry.
    pub fn set(&self, key: K, value: V, ttl: Duration) {
        self.lock().entries.insert(key, CacheEntry::new(value, ttl));
    }

    /// Return the live value for `key`.
    ///
    /// An expired entry is evicted and reported as a miss.
    pub fn get(&self, key: &K) -> Option<V> {
        let now = Instant::now();
        let mut inner = self.lock();
        inner.total += 1;

        let expired = match inner.entries.get(key).map(|entry| entry.is_expired(now)) {
            None => {
                inner.misses += 1;
                return None;
            }
            Some(expired) => expired,
        };

        if expired {
            inner.entries.remove(key);
            inner.misses += 1;
            trace!("cache entry expired on read");
            return None;
        }

        inner.hits += 1;
        inner.entries.get(key).map(|entry| entry.value.clone())
    }

    /// Return the cached value or compute, store and return a fresh one.
    pub fn get_or_compute<F>(&self, key: K, compute: F, ttl: Duration) -> V
    where
        F: FnOnce() -> V,
    {
        if let Some(value) = self.get(&key) {
            return value;
        }
        let value = compute();
        self.set(key, value.clone(), ttl);
        value
    }

    /// Async flavour of [`TtlCache::get_or_compute`]. A failed computation is
    /// returned to the caller and nothing is stored.
    ///
    /// The lock is released while `compute` runs, so concurrent misses for the
    /// same key each run their own computation and the last one to finish
    /// wins the slot.
    pub async fn try_get_or_compute_async<F, Fut, E>(
        &self,
        key: K,
        compute: F,
        ttl: Duration,
    ) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        if let Some(value) = self.get(&key) {
            return Ok(value);
        }
        let value = compute().await?;
        self.set(key, value.clone(), ttl);
        Ok(value)
    }

    /// Evict one entry, or every entry when `key` is `None`.
    pub fn clear(&self, key: Option<&K>) {
        let mut inner = self.lock();
        match key {
            Some(k) => {
                inner.entries.remove(k);
            }
            None => inner.entries.clear(),
        }
    }

    /// Evict every expired entry and return how many were removed.
    pub fn cleanup_expired(&self) -> usize {
        let now = Instant::now();
        let mut inner = self.lock();
        let before = inner.entries.len();
        inner.entries.retain(|_, entry| !entry.is_expired(now));
        before - inner.entries.len()
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.lock();
        let hit_rate = if inner.total > 0 {
            inner.hits as f64 / inner.total as f64 * 100.0
        } else {
            0.0
        };

        CacheStats {
            hits: inner.hits,
            misses: inner.misses,
            total: inner.total,
            hit_rate_percent: (hit_rate * 100.0).round() / 100.0,
            active_entries: inner.entries.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    const TTL: Duration = Duration::from_secs(1);

    #[tokio::test(start_paused = true)]
    async fn test_set_then_get() {
        let cache: TtlCache<&str, u32> = TtlCache::new();
        cache.set("k", 7, TTL);
        assert_eq!(cache.get(&"k"), Some(7));
        assert_eq!(cache.get(&"missing"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_entry_expires_and_is_evicted_on_read() {
        let cache: TtlCache<&str, u32> = TtlCache::new();
        cache.set("k", 7, TTL);
        assert_eq!(cache.stats().active_entries, 1);

        tokio::time::advance(Duration::from_millis(900)).await;
        assert_eq!(cache.get(&"k"), Some(7));

        tokio::time::advance(Duration::from_millis(200)).await;
        assert_eq!(cache.get(&"k"), None);
        assert_eq!(cache.stats().active_entries, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_get_or_compute_computes_once_per_miss() {
        let cache: TtlCache<&str, u32> = TtlCache::new();
        let calls = Cell::new(0);
        let compute = || {
            calls.set(calls.get() + 1);
            calls.get() * 10
        };

        assert_eq!(cache.get_or_compute("k", compute, TTL), 10);
        assert_eq!(cache.get_or_compute("k", compute, TTL), 10);
        assert_eq!(calls.get(), 1);

        tokio::time::advance(Duration::from_millis(1500)).await;
        assert_eq!(cache.get_or_compute("k", compute, TTL), 20);
        assert_eq!(calls.get(), 2);
        assert_eq!(cache.get(&"k"), Some(20));
    }

    #[tokio::test(start_paused = true)]
    async fn test_try_get_or_compute_async_hits() {
        let cache: TtlCache<String, Vec<u8>> = TtlCache::new();
        let first: Result<_, ()> = cache
            .try_get_or_compute_async("dashboard".to_string(), || async { Ok(vec![1, 2]) }, TTL)
            .await;
        let second: Result<_, ()> = cache
            .try_get_or_compute_async("dashboard".to_string(), || async { Ok(vec![9]) }, TTL)
            .await;
        assert_eq!(first, Ok(vec![1, 2]));
        assert_eq!(second, Ok(vec![1, 2]));
        assert_eq!(cache.stats().hits, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_computation_is_not_cached() {
        let cache: TtlCache<&str, u32> = TtlCache::new();
        let failed: Result<u32, &str> = cache
            .try_get_or_compute_async("k", || async { Err("boom") }, TTL)
            .await;
        assert_eq!(failed, Err("boom"));
        assert_eq!(cache.stats().active_entries, 0);

        let ok: Result<u32, &str> = cache
            .try_get_or_compute_async("k", || async { Ok(3) }, TTL)
            .await;
        assert_eq!(ok, Ok(3));
        assert_eq!(cache.get(&"k"), Some(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_single_and_all() {
        let cache: TtlCache<&str, u32> = TtlCache::new();
        cache.set("a", 1, TTL);
        cache.set("b", 2, TTL);

        cache.clear(Some(&"a"));
        assert_eq!(cache.get(&"a"), None);
        assert_eq!(cache.get(&"b"), Some(2));

        cache.clear(None);
        assert_eq!(cache.stats().active_entries, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cleanup_expired_counts_evictions() {
        let cache: TtlCache<&str, u32> = TtlCache::new();
        cache.set("short", 1, Duration::from_millis(100));
        cache.set("short2", 2, Duration::from_millis(200));
        cache.set("long", 3, Duration::from_secs(60));

        assert_eq!(cache.cleanup_expired(), 0);
        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(cache.cleanup_expired(), 2);
        assert_eq!(cache.stats().active_entries, 1);
        assert_eq!(cache.get(&"long"), Some(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stats() {
        let cache: TtlCache<&str, u32> = TtlCache::new();
        assert_eq!(cache.stats().hit_rate_percent, 0.0);

        cache.get(&"k");
        cache.set("k", 1, TTL);
        cache.get(&"k");
        cache.get(&"k");

        let stats = cache.stats();
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.total, 3);
        assert_eq!(stats.hit_rate_percent, 66.67);
        assert_eq!(stats.active_entries, 1);
    }
}
