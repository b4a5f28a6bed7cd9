//! Worker pool telemetry.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Internal atomic counters owned by the pool.
#[derive(Debug, Default)]
pub(crate) struct PoolCounters {
    active: AtomicUsize,
    total_created: AtomicU64,
    peak_concurrent: AtomicUsize,
}

impl PoolCounters {
    /// Record a newly registered unit; returns the new active count.
    pub(crate) fn register(&self) -> usize {
        self.total_created.fetch_add(1, Ordering::Relaxed);
        let active = self.active.fetch_add(1, Ordering::Relaxed) + 1;
        self.peak_concurrent.fetch_max(active, Ordering::Relaxed);
        active
    }

    /// Record a deregistered unit.
    pub(crate) fn deregister(&self) {
        self.active.fetch_sub(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> PoolStats {
        PoolStats {
            active: self.active.load(Ordering::Relaxed),
            total_created: self.total_created.load(Ordering::Relaxed),
            peak_concurrent: self.peak_concurrent.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time view of pool activity.
///
/// `peak_concurrent` is the high-water mark of simultaneously registered
/// units; a persistently high value is a design smell in the caller (work
/// fan-out without bounds), not a pool failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    /// Units currently registered (admitted but not yet terminated).
    pub active: usize,
    /// Units ever created by this pool.
    pub total_created: u64,
    /// Highest number of simultaneously registered units observed.
    pub peak_concurrent: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_tracks_totals_and_peak() {
        let counters = PoolCounters::default();

        counters.register();
        counters.register();
        counters.deregister();
        counters.register();

        let stats = counters.snapshot();
        assert_eq!(stats.active, 2);
        assert_eq!(stats.total_created, 3);
        assert_eq!(stats.peak_concurrent, 2);
    }

    #[test]
    fn peak_survives_drain() {
        let counters = PoolCounters::default();
        for _ in 0..5 {
            counters.register();
        }
        for _ in 0..5 {
            counters.deregister();
        }

        let stats = counters.snapshot();
        assert_eq!(stats.active, 0);
        assert_eq!(stats.peak_concurrent, 5);
    }
}
