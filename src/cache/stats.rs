//! Cache engine statistics tracking and reporting.

use std::sync::atomic::{AtomicU64, Ordering};

/// Internal atomic counters owned by the engine.
#[derive(Debug, Default)]
pub(crate) struct EngineCounters {
    hits: AtomicU64,
    misses: AtomicU64,
    stale_served: AtomicU64,
    refreshes: AtomicU64,
    write_backs: AtomicU64,
    write_failures: AtomicU64,
}

impl EngineCounters {
    pub(crate) fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_stale_served(&self) {
        self.stale_served.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_refresh(&self) {
        self.refreshes.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_write_back(&self) {
        self.write_backs.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_write_failure(&self) {
        self.write_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            stale_served: self.stale_served.load(Ordering::Relaxed),
            refreshes: self.refreshes.load(Ordering::Relaxed),
            write_backs: self.write_backs.load(Ordering::Relaxed),
            write_failures: self.write_failures.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time view of cache activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    /// Calls served fresh from cache without recomputation.
    pub hits: u64,
    /// Calls that had to recompute inline (absent, expired, undecodable).
    pub misses: u64,
    /// Calls that returned a stale value while a refresh ran.
    pub stale_served: u64,
    /// Recomputations performed, inline and background.
    pub refreshes: u64,
    /// Write-backs accepted into the hot layer.
    pub write_backs: u64,
    /// Durable writes that failed (the value was not persisted).
    pub write_failures: u64,
}

impl CacheStats {
    /// Fraction of calls answered without blocking on recomputation
    /// (fresh hits plus stale serves), 0.0 to 1.0.
    pub fn hit_rate(&self) -> f64 {
        let answered = self.hits + self.stale_served;
        let total = answered + self.misses;
        if total == 0 {
            0.0
        } else {
            answered as f64 / total as f64
        }
    }
}
