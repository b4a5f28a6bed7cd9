//! In-process hot layer and write-back busy tracking.
//!
//! The hot layer mirrors the durable store inside the process: it is
//! updated synchronously before any durable write is scheduled, so a
//! reader in the same process never sees staler data than a writer
//! already observed.
//!
//! Busy counters sequence deletes after writes. Every write-back holds a
//! per-key count while its durable write is in flight; a delete waits
//! (bounded) for the count to drain before touching the durable row, so a
//! slow background writer can never resurrect data that was just deleted.

use crate::cache::types::CacheEntry;
use std::collections::HashMap;
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

/// Hot layer map plus per-key in-flight writer counts.
#[derive(Debug, Default)]
pub(crate) struct HotLayer {
    entries: Mutex<HashMap<String, CacheEntry>>,
    busy: Mutex<HashMap<String, usize>>,
    busy_cv: Condvar,
}

impl HotLayer {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Current entry for `key`, if present.
    pub(crate) fn get(&self, key: &str) -> Option<CacheEntry> {
        self.entries.lock().unwrap().get(key).cloned()
    }

    /// Replace the entry for `key` wholesale.
    pub(crate) fn insert(&self, key: &str, entry: CacheEntry) {
        self.entries.lock().unwrap().insert(key.to_string(), entry);
    }

    /// Drop the entry for `key`.
    pub(crate) fn remove(&self, key: &str) {
        self.entries.lock().unwrap().remove(key);
    }

    /// Drop every entry.
    pub(crate) fn clear(&self) {
        self.entries.lock().unwrap().clear();
    }

    /// Number of hot entries.
    pub(crate) fn entry_count(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    /// Count one in-flight writer for `key`.
    pub(crate) fn begin_write(&self, key: &str) {
        let mut busy = self.busy.lock().unwrap();
        *busy.entry(key.to_string()).or_insert(0) += 1;
    }

    /// Release one in-flight writer for `key` and wake delete waiters.
    ///
    /// Zero-count entries are removed so the map only holds keys with
    /// writers actually in flight.
    pub(crate) fn end_write(&self, key: &str) {
        let mut busy = self.busy.lock().unwrap();
        if let Some(count) = busy.get_mut(key) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                busy.remove(key);
            }
        }
        self.busy_cv.notify_all();
    }

    /// In-flight writer count for `key`.
    pub(crate) fn busy_count(&self, key: &str) -> usize {
        self.busy.lock().unwrap().get(key).copied().unwrap_or(0)
    }

    /// Wait until no writers are in flight for `key`, bounded by `timeout`.
    ///
    /// Returns `true` if the key drained, `false` on timeout.
    pub(crate) fn wait_for_writers(&self, key: &str, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut busy = self.busy.lock().unwrap();
        while busy.get(key).copied().unwrap_or(0) > 0 {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let (guard, _) = self.busy_cv.wait_timeout(busy, deadline - now).unwrap();
            busy = guard;
        }
        true
    }
}
