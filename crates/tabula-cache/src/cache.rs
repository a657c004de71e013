//! TTL + LRU cache implementation

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use indexmap::IndexMap;
use parking_lot::Mutex;
use tabula_core::CacheSettings;

use crate::stats::CacheStats;

/// One cached entry with its lifecycle timestamps
struct CacheEntry<V> {
    value: V,
    created_at: Instant,
    last_accessed_at: Instant,
}

impl<V> CacheEntry<V> {
    fn new(value: V) -> Self {
        let now = Instant::now();
        Self {
            value,
            created_at: now,
            last_accessed_at: now,
        }
    }
}

/// A capacity-bounded, TTL-bounded cache with LRU eviction.
///
/// Entry order in the inner `IndexMap` doubles as recency order: a hit
/// moves the entry to the back, so the front is always the
/// least-recently-used entry and eviction pops index 0. Expiry is
/// checked lazily on `get`; an expired entry counts as a miss and is
/// removed on the spot.
///
/// All mutating operations take the single inner mutex, so `put`, the
/// LRU touch, eviction and invalidation are atomic with respect to each
/// other.
pub struct TtlLruCache<V: Clone> {
    inner: Mutex<IndexMap<String, CacheEntry<V>>>,
    ttl: Duration,
    capacity: usize,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    expirations: AtomicU64,
}

impl<V: Clone> TtlLruCache<V> {
    /// Create a cache with the given TTL and entry capacity. A capacity
    /// of zero is treated as one; `put` always leaves the new entry in
    /// place.
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            inner: Mutex::new(IndexMap::new()),
            ttl,
            capacity: capacity.max(1),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            expirations: AtomicU64::new(0),
        }
    }

    /// Create a cache from service settings
    pub fn from_settings(settings: &CacheSettings) -> Self {
        Self::new(settings.ttl(), settings.capacity)
    }

    /// Look up an entry, refreshing its recency on a hit.
    pub fn get(&self, key: &str) -> Option<V> {
        let mut inner = self.inner.lock();
        match inner.shift_remove(key) {
            Some(mut entry) => {
                if entry.created_at.elapsed() > self.ttl {
                    self.expirations.fetch_add(1, Ordering::Relaxed);
                    self.misses.fetch_add(1, Ordering::Relaxed);
                    tracing::trace!(key, "cache entry expired");
                    return None;
                }
                entry.last_accessed_at = Instant::now();
                let value = entry.value.clone();
                // Re-insert at the back: most recently used.
                inner.insert(key.to_string(), entry);
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(value)
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Insert or replace an entry, evicting from the LRU end if the
    /// cache is at capacity.
    pub fn put(&self, key: String, value: V) {
        let mut inner = self.inner.lock();
        // Replacing counts as a fresh insertion for both TTL and recency.
        inner.shift_remove(&key);
        while inner.len() >= self.capacity {
            inner.shift_remove_index(0);
            self.evictions.fetch_add(1, Ordering::Relaxed);
        }
        inner.insert(key, CacheEntry::new(value));
    }

    /// Remove every entry whose key satisfies the predicate.
    /// Returns the number of removed entries.
    pub fn invalidate<F: Fn(&str) -> bool>(&self, predicate: F) -> usize {
        let mut inner = self.inner.lock();
        let before = inner.len();
        inner.retain(|key, _| !predicate(key));
        let removed = before - inner.len();
        if removed > 0 {
            tracing::debug!(removed, "cache entries invalidated");
        }
        removed
    }

    /// Remove every entry whose key starts with `prefix`.
    pub fn invalidate_prefix(&self, prefix: &str) -> usize {
        self.invalidate(|key| key.starts_with(prefix))
    }

    /// Drop all entries
    pub fn clear(&self) {
        self.inner.lock().clear();
        tracing::debug!("cache cleared");
    }

    /// Current number of entries (including not-yet-collected expired ones)
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    /// Snapshot the cache counters
    pub fn stats(&self) -> CacheStats {
        CacheStats::new(
            self.hits.load(Ordering::Relaxed),
            self.misses.load(Ordering::Relaxed),
            self.evictions.load(Ordering::Relaxed),
            self.expirations.load(Ordering::Relaxed),
            self.inner.lock().len(),
        )
    }

    /// Keys in recency order, least recently used first. Test hook.
    #[cfg(test)]
    pub(crate) fn keys(&self) -> Vec<String> {
        self.inner.lock().keys().cloned().collect()
    }
}
