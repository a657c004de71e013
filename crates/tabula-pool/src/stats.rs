//! Pool statistics types

use serde::{Deserialize, Serialize};

/// Snapshot of the pool's counters
///
/// `opens` is the instrumentation hook the connection-reuse tests rely
/// on: two requests that share a handle leave it unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct PoolStats {
    /// Number of currently live handles
    live: usize,
    /// Total handles opened since the pool was created
    opens: u64,
    /// Reopens forced by a file modification-time change
    stale_reopens: u64,
    /// Reopens forced by idle-lifetime expiry
    idle_reopens: u64,
    /// Completed background sweep passes
    sweeps: u64,
}

impl PoolStats {
    pub(crate) fn new(
        live: usize,
        opens: u64,
        stale_reopens: u64,
        idle_reopens: u64,
        sweeps: u64,
    ) -> Self {
        Self {
            live,
            opens,
            stale_reopens,
            idle_reopens,
            sweeps,
        }
    }

    pub fn live(&self) -> usize {
        self.live
    }

    pub fn opens(&self) -> u64 {
        self.opens
    }

    pub fn stale_reopens(&self) -> u64 {
        self.stale_reopens
    }

    pub fn idle_reopens(&self) -> u64 {
        self.idle_reopens
    }

    pub fn sweeps(&self) -> u64 {
        self.sweeps
    }
}
