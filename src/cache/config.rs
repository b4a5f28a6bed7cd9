//! Cache engine configuration.

/// Default artificial delay before a background durable write, in
/// milliseconds. Batches bursts of rapid write-backs instead of hammering
/// the durable store row by row.
pub const DEFAULT_WRITE_DELAY_MS: u64 = 200;

/// Default payload size above which values are compressed.
pub const DEFAULT_COMPRESS_THRESHOLD_BYTES: usize = 16 * 1024;

/// Default hard ceiling on entry age: 30 days. Beyond this an entry is too
/// stale to trust even as a fallback and a blocking recompute is forced.
pub const DEFAULT_RESET_AFTER_SECS: u64 = 30 * 86_400;

/// Default grace window for cached empty results. An empty payload older
/// than this is treated as a likely prior failure and refreshed.
pub const DEFAULT_EMPTY_RESULT_GRACE_SECS: u64 = 300;

/// Cache engine configuration.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Artificial delay before background durable writes, in milliseconds.
    pub write_delay_ms: u64,
    /// Payload size in bytes above which compression is applied.
    pub compress_threshold_bytes: usize,
    /// Hard ceiling on entry age before a blocking recompute is forced.
    pub reset_after_secs: u64,
    /// Grace window before a cached empty result is treated as a failure.
    ///
    /// `u64::MAX` disables the forced refresh of empty results entirely,
    /// which bounds the thundering-herd risk when many keys go empty at
    /// once (e.g. a transient upstream outage).
    pub empty_result_grace_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            write_delay_ms: DEFAULT_WRITE_DELAY_MS,
            compress_threshold_bytes: DEFAULT_COMPRESS_THRESHOLD_BYTES,
            reset_after_secs: DEFAULT_RESET_AFTER_SECS,
            empty_result_grace_secs: DEFAULT_EMPTY_RESULT_GRACE_SECS,
        }
    }
}

impl CacheConfig {
    /// Set the background write delay in milliseconds.
    pub fn with_write_delay_ms(mut self, delay_ms: u64) -> Self {
        self.write_delay_ms = delay_ms;
        self
    }

    /// Set the compression threshold in bytes.
    pub fn with_compress_threshold(mut self, bytes: usize) -> Self {
        self.compress_threshold_bytes = bytes;
        self
    }

    /// Set the hard age ceiling in seconds.
    pub fn with_reset_after_secs(mut self, secs: u64) -> Self {
        self.reset_after_secs = secs;
        self
    }

    /// Set the empty-result grace window in seconds.
    pub fn with_empty_result_grace_secs(mut self, secs: u64) -> Self {
        self.empty_result_grace_secs = secs;
        self
    }
}
