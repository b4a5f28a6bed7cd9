//! Clock abstraction for timestamps and age calculations.
//!
//! Cache entries are stamped with wall-clock seconds since the Unix epoch.
//! The [`Clock`] trait lets tests drive age-dependent freshness decisions
//! deterministically instead of sleeping through real time.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Source of wall-clock seconds since the Unix epoch.
pub trait Clock: Send + Sync {
    /// Current time in whole seconds since the Unix epoch.
    fn now_epoch_secs(&self) -> u64;
}

/// System clock backed by [`SystemTime`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_epoch_secs(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0) // Clock before epoch, treat as epoch
    }
}

/// Manually driven clock for tests.
///
/// Starts at an arbitrary base time and only moves when told to.
///
/// # Example
///
/// ```
/// use swrcache::time::{Clock, ManualClock};
///
/// let clock = ManualClock::new(1_000);
/// assert_eq!(clock.now_epoch_secs(), 1_000);
/// clock.advance(50);
/// assert_eq!(clock.now_epoch_secs(), 1_050);
/// ```
#[derive(Debug)]
pub struct ManualClock {
    secs: AtomicU64,
}

impl ManualClock {
    /// Create a clock fixed at the given epoch second.
    pub fn new(secs: u64) -> Self {
        Self {
            secs: AtomicU64::new(secs),
        }
    }

    /// Advance the clock by the given number of seconds.
    pub fn advance(&self, secs: u64) {
        self.secs.fetch_add(secs, Ordering::SeqCst);
    }

    /// Set the clock to an absolute epoch second.
    pub fn set(&self, secs: u64) {
        self.secs.store(secs, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_epoch_secs(&self) -> u64 {
        self.secs.load(Ordering::SeqCst)
    }
}
