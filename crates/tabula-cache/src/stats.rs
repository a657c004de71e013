//! Cache statistics types

use serde::{Deserialize, Serialize};

/// Snapshot of a cache's counters
///
/// Provides insight into hit rates and eviction pressure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct CacheStats {
    /// Number of reads that found a live entry
    hits: u64,
    /// Number of reads that found nothing (or an expired entry)
    misses: u64,
    /// Entries removed because the cache was at capacity
    evictions: u64,
    /// Entries removed because their TTL had elapsed
    expirations: u64,
    /// Current number of live entries
    size: usize,
}

impl CacheStats {
    pub(crate) fn new(
        hits: u64,
        misses: u64,
        evictions: u64,
        expirations: u64,
        size: usize,
    ) -> Self {
        Self {
            hits,
            misses,
            evictions,
            expirations,
            size,
        }
    }

    pub fn hits(&self) -> u64 {
        self.hits
    }

    pub fn misses(&self) -> u64 {
        self.misses
    }

    pub fn evictions(&self) -> u64 {
        self.evictions
    }

    pub fn expirations(&self) -> u64 {
        self.expirations
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Hit rate over all reads (0.0 to 1.0). Returns 0.0 before any read.
    pub fn hit_rate(&self) -> f64 {
        let reads = self.hits + self.misses;
        if reads == 0 {
            0.0
        } else {
            self.hits as f64 / reads as f64
        }
    }
}
