//! Caching for Tabula query results and column statistics
//!
//! One generic store, `TtlLruCache`, covers both caches: entries expire
//! after a TTL (checked lazily on read) and the least-recently-used
//! entry is evicted once the store is at capacity. Each cache is an
//! owned component handed to the executor explicitly, never a hidden
//! process-level singleton, so tests construct isolated instances.

mod cache;
mod stats;


pub use cache::TtlLruCache;
pub use stats::CacheStats;
