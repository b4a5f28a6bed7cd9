//! Core types for the cache engine.

use crate::cache::codec::CodecError;
use crate::cache::store::StoreError;
use crate::pool::PoolError;
use thiserror::Error;

/// Serving mode for a cache call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CacheMode {
    /// On a stale entry, block the caller until recomputation finishes.
    Sync,
    /// On a stale entry, return the cached value immediately and refresh
    /// in the background. Only a true miss blocks.
    #[default]
    Async,
}

/// Freshness policy for a cache call.
///
/// `MaxAge` is the normal case; the two refresh variants are the
/// force-refresh sentinels of the cache operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    /// Serve the cached value while its age is at most this many seconds.
    MaxAge(u64),
    /// Force a refresh now but still return the previously cached value.
    RefreshServeStale,
    /// Force a refresh and block for the fresh value, ignoring any entry.
    RefreshBlocking,
}

/// Fixed freshness band: 10 minutes.
pub const FRESH_SHORT_SECS: u64 = 600;

/// Fixed freshness band: 1 hour.
pub const FRESH_MEDIUM_SECS: u64 = 3_600;

/// Fixed freshness band: 24 hours.
pub const FRESH_LONG_SECS: u64 = 86_400;

/// Fixed freshness band: 7 days.
pub const FRESH_EXTENDED_SECS: u64 = 604_800;

/// What a recomputation produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Computed<V> {
    /// A value to cache and return.
    Cache(V),
    /// A value to return without caching (the do-not-cache sentinel).
    Skip(V),
    /// No result; cached as an empty marker so repeat callers within the
    /// grace window are not stampeded into recomputing.
    Empty,
}

/// One cached row: a timestamp and the encoded payload.
///
/// Entries are replaced wholesale, never mutated in place, so concurrent
/// readers always observe a consistent `(timestamp, payload)` pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    /// Wall-clock seconds since the Unix epoch at write time.
    pub timestamp: u64,
    /// Encoded (and possibly compressed) payload bytes.
    pub payload: Vec<u8>,
}

impl CacheEntry {
    /// Create an entry stamped with the given time.
    pub fn new(timestamp: u64, payload: Vec<u8>) -> Self {
        Self { timestamp, payload }
    }

    /// Age of this entry at `now`, saturating at zero for future stamps.
    pub fn age_at(&self, now: u64) -> u64 {
        now.saturating_sub(self.timestamp)
    }
}

/// Cache engine errors.
#[derive(Debug, Error)]
pub enum CacheError {
    /// The durable store collaborator reported a failure.
    #[error("durable store error: {0}")]
    Store(#[from] StoreError),

    /// Payload encoding failed.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// The worker pool could not run a recomputation.
    #[error("worker pool error: {0}")]
    Pool(#[from] PoolError),
}
