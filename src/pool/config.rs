//! Worker pool configuration.

use std::time::Duration;

/// Default number of unit-creation attempts before giving up.
pub const DEFAULT_START_RETRY_BUDGET: u32 = 10;

/// Default bound on how long a queued unit waits for a finish signal
/// before retrying creation anyway.
pub const DEFAULT_QUEUED_WAIT: Duration = Duration::from_secs(1);

/// Default high-water mark above which the pool warns about designs that
/// spawn pathologically many units.
pub const DEFAULT_FLOOD_WARN_THRESHOLD: usize = 500;

/// Worker pool configuration.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Maximum concurrently admitted units.
    ///
    /// `None` derives a limit from hardware hints; `Some(0)` disables
    /// admission control entirely (unbounded).
    pub instance_limit: Option<usize>,
    /// Number of unit-creation attempts before a unit is marked failed.
    pub start_retry_budget: u32,
    /// Bounded wait while a unit is queued on resource exhaustion.
    pub queued_wait: Duration,
    /// Peak-concurrency threshold for the design-smell warning.
    pub flood_warn_threshold: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            instance_limit: None,
            start_retry_budget: DEFAULT_START_RETRY_BUDGET,
            queued_wait: DEFAULT_QUEUED_WAIT,
            flood_warn_threshold: DEFAULT_FLOOD_WARN_THRESHOLD,
        }
    }
}

impl PoolConfig {
    /// Set an explicit instance limit (0 = unbounded).
    pub fn with_instance_limit(mut self, limit: usize) -> Self {
        self.instance_limit = Some(limit);
        self
    }

    /// Set the unit-creation retry budget.
    pub fn with_start_retry_budget(mut self, budget: u32) -> Self {
        self.start_retry_budget = budget;
        self
    }

    /// Set the bounded wait used while a unit is queued.
    pub fn with_queued_wait(mut self, wait: Duration) -> Self {
        self.queued_wait = wait;
        self
    }
}
