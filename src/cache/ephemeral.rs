//! Ephemeral process memory: a non-durable front tier.
//!
//! A process-wide key/value map with per-entry TTLs, consulted before the
//! cache engine for very hot, cheaply recomputed values (configuration
//! flags, small lookups). Expired entries are dropped lazily on read and
//! in bulk by [`ProcessMemory::sweep`]; there is no background timer. A
//! stale miss simply falls through to the next tier, so this tier needs
//! none of the engine's write-back coordination.

use crate::time::{Clock, SystemClock};
use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone)]
struct MemEntry {
    value: Value,
    expires_at: u64,
}

/// TTL'd process-wide memory tier.
///
/// # Example
///
/// ```
/// use swrcache::cache::ProcessMemory;
///
/// let memory = ProcessMemory::new();
/// memory.set("flags.provider", &"bing", 60);
/// assert_eq!(memory.get::<String>("flags.provider"), Some("bing".to_string()));
/// ```
pub struct ProcessMemory {
    entries: DashMap<String, MemEntry>,
    clock: Arc<dyn Clock>,
}

impl Default for ProcessMemory {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessMemory {
    /// Create an empty tier on the system clock.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Create an empty tier with an explicit clock.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::new(),
            clock,
        }
    }

    /// Fetch a live value, dropping it if its TTL has lapsed.
    ///
    /// Returns `None` for absent, expired, or undecodable entries.
    pub fn get<V: DeserializeOwned>(&self, key: &str) -> Option<V> {
        let now = self.clock.now_epoch_secs();
        let expired = match self.entries.get(key) {
            Some(entry) if entry.expires_at > now => {
                return serde_json::from_value(entry.value.clone()).ok();
            }
            Some(_) => true,
            None => false,
        };
        if expired {
            self.entries.remove(key);
        }
        None
    }

    /// Store a value with a TTL in seconds.
    ///
    /// Values that cannot be serialized are dropped silently; this tier is
    /// best-effort by design.
    pub fn set<V: Serialize>(&self, key: &str, value: &V, ttl_secs: u64) {
        let Ok(value) = serde_json::to_value(value) else {
            debug!("process memory value for {key} not serializable; skipped");
            return;
        };
        let expires_at = self.clock.now_epoch_secs().saturating_add(ttl_secs);
        self.entries
            .insert(key.to_string(), MemEntry { value, expires_at });
    }

    /// Remove a single entry.
    pub fn remove(&self, key: &str) {
        self.entries.remove(key);
    }

    /// Drop every expired entry; returns how many were removed.
    ///
    /// Called opportunistically from maintenance paths, not on a timer.
    pub fn sweep(&self) -> usize {
        let now = self.clock.now_epoch_secs();
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.expires_at > now);
        before - self.entries.len()
    }

    /// Drop every entry, expired or not.
    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Number of entries currently held, including not-yet-swept expired
    /// ones.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the tier holds no entries at all.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl std::fmt::Debug for ProcessMemory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessMemory")
            .field("entries", &self.entries.len())
            .finish()
    }
}
