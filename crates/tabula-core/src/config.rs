//! Service configuration
//!
//! Tuning knobs for the caches, the connection pool and the statistics
//! engine. All durations are stored in seconds so the struct round-trips
//! through TOML config files cleanly.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{Result, TabulaError};

/// Result cache settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheSettings {
    /// Time-to-live for an entry, in seconds
    pub ttl_secs: u64,
    /// Maximum number of entries before LRU eviction kicks in
    pub capacity: usize,
}

impl CacheSettings {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    /// Set the TTL in seconds
    pub fn with_ttl_secs(mut self, ttl_secs: u64) -> Self {
        self.ttl_secs = ttl_secs;
        self
    }

    /// Set the entry capacity
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }
}

impl Default for CacheSettings {
    /// Defaults: TTL 5 minutes, capacity 1000 entries
    fn default() -> Self {
        Self {
            ttl_secs: 300,
            capacity: 1000,
        }
    }
}

/// Connection pool settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolSettings {
    /// Maximum idle lifetime of a connection before it is reopened, in seconds
    pub idle_timeout_secs: u64,
    /// Interval of the background sweep that closes idle connections, in seconds
    pub sweep_interval_secs: u64,
}

impl PoolSettings {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    /// Set the idle timeout in seconds
    pub fn with_idle_timeout_secs(mut self, secs: u64) -> Self {
        self.idle_timeout_secs = secs;
        self
    }

    /// Set the sweep interval in seconds
    pub fn with_sweep_interval_secs(mut self, secs: u64) -> Self {
        self.sweep_interval_secs = secs;
        self
    }
}

impl Default for PoolSettings {
    /// Defaults: 30 minute idle lifetime, 60 second sweep
    fn default() -> Self {
        Self {
            idle_timeout_secs: 1800,
            sweep_interval_secs: 60,
        }
    }
}

/// Statistics engine settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsSettings {
    /// Number of representative sample values collected per column
    pub sample_size: usize,
    /// Cache settings for the statistics cache (independent of the
    /// result cache, same policy shape)
    pub cache: CacheSettings,
}

impl Default for StatsSettings {
    fn default() -> Self {
        Self {
            sample_size: 10,
            cache: CacheSettings::default(),
        }
    }
}

/// Top-level service configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub cache: CacheSettings,
    pub pool: PoolSettings,
    pub stats: StatsSettings,
}

impl ServiceConfig {
    /// Parse a configuration from TOML text
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| TabulaError::Configuration(e.to_string()))
    }

    /// Load a configuration from a TOML file
    pub fn load(path: &std::path::Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        tracing::debug!(path = %path.display(), "loaded service configuration");
        Self::from_toml_str(&text)
    }
}
