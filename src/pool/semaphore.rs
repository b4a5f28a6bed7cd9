//! Counting semaphore for pool admission control.
//!
//! The pool admits units through a plain counting semaphore: `acquire`
//! blocks submitters at the configured concurrency limit and `release`
//! wakes exactly one of them when a unit terminates. Built on a mutex and
//! condvar since the pool's units are OS threads, not async tasks.

use std::sync::{Condvar, Mutex};

/// Blocking counting semaphore.
#[derive(Debug)]
pub(crate) struct Semaphore {
    permits: Mutex<usize>,
    cv: Condvar,
    capacity: usize,
}

impl Semaphore {
    /// Create a semaphore with the given number of permits.
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            permits: Mutex::new(capacity),
            cv: Condvar::new(),
            capacity,
        }
    }

    /// Total permits the semaphore was created with.
    pub(crate) fn capacity(&self) -> usize {
        self.capacity
    }

    /// Currently available permits.
    pub(crate) fn available(&self) -> usize {
        *self.permits.lock().unwrap()
    }

    /// Take one permit, blocking until one is available.
    pub(crate) fn acquire(&self) {
        let mut permits = self.permits.lock().unwrap();
        while *permits == 0 {
            permits = self.cv.wait(permits).unwrap();
        }
        *permits -= 1;
    }

    /// Take one permit if one is available right now.
    pub(crate) fn try_acquire(&self) -> bool {
        let mut permits = self.permits.lock().unwrap();
        if *permits == 0 {
            return false;
        }
        *permits -= 1;
        true
    }

    /// Return one permit and wake one blocked acquirer.
    pub(crate) fn release(&self) {
        let mut permits = self.permits.lock().unwrap();
        *permits += 1;
        self.cv.notify_one();
    }
}
