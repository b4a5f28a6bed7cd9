//! Finish-event signalling for queued task units.
//!
//! A unit that could not be physically created parks here, keyed by its
//! rank (depth in the calling hierarchy), until some other unit finishes
//! or a bounded timeout elapses. Waiters are woken from the highest rank
//! first: units deepest in the hierarchy are the most likely to be
//! short-lived leaves, which keeps a waiting parent from starving the
//! children it depends on.

use std::collections::BTreeMap;
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

/// A single parked waiter.
#[derive(Debug)]
pub(crate) struct Waiter {
    signalled: Mutex<bool>,
    cv: Condvar,
}

impl Waiter {
    fn new() -> Self {
        Self {
            signalled: Mutex::new(false),
            cv: Condvar::new(),
        }
    }

    fn signal(&self) {
        let mut signalled = self.signalled.lock().unwrap();
        *signalled = true;
        self.cv.notify_one();
    }

    /// Block until signalled or `timeout` elapses.
    ///
    /// Returns `true` if a finish signal arrived.
    pub(crate) fn wait(&self, timeout: Duration) -> bool {
        let deadline = std::time::Instant::now() + timeout;
        let mut signalled = self.signalled.lock().unwrap();
        while !*signalled {
            let now = std::time::Instant::now();
            if now >= deadline {
                return false;
            }
            let (guard, _) = self.cv.wait_timeout(signalled, deadline - now).unwrap();
            signalled = guard;
        }
        true
    }
}

/// Rank-ordered table of waiters for "someone finished" events.
#[derive(Debug, Default)]
pub(crate) struct FinishEventTable {
    buckets: Mutex<BTreeMap<u32, Vec<Arc<Waiter>>>>,
}

impl FinishEventTable {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Park a new waiter at the given rank.
    ///
    /// The caller must follow up with [`FinishEventTable::deregister`] once
    /// it stops waiting, whether it was signalled or timed out.
    pub(crate) fn register(&self, rank: u32) -> Arc<Waiter> {
        let waiter = Arc::new(Waiter::new());
        let mut buckets = self.buckets.lock().unwrap();
        buckets.entry(rank).or_default().push(Arc::clone(&waiter));
        waiter
    }

    /// Remove a waiter from its rank bucket.
    ///
    /// Safe to call when the waiter was already drained by
    /// [`FinishEventTable::signal_one`].
    pub(crate) fn deregister(&self, rank: u32, waiter: &Arc<Waiter>) {
        let mut buckets = self.buckets.lock().unwrap();
        if let Some(bucket) = buckets.get_mut(&rank) {
            bucket.retain(|w| !Arc::ptr_eq(w, waiter));
            if bucket.is_empty() {
                buckets.remove(&rank);
            }
        }
    }

    /// Wake exactly one waiter from the highest-rank non-empty bucket.
    ///
    /// Returns `true` if a waiter was signalled.
    pub(crate) fn signal_one(&self) -> bool {
        let mut buckets = self.buckets.lock().unwrap();
        let Some((&rank, _)) = buckets.last_key_value() else {
            return false;
        };
        let bucket = buckets.get_mut(&rank).unwrap();
        let waiter = bucket.remove(0);
        if bucket.is_empty() {
            buckets.remove(&rank);
        }
        drop(buckets);
        waiter.signal();
        true
    }

    /// Number of currently parked waiters across all ranks.
    pub(crate) fn waiter_count(&self) -> usize {
        self.buckets.lock().unwrap().values().map(Vec::len).sum()
    }
}
