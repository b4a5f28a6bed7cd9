//! Durable store contract.
//!
//! The persistent backend is an external collaborator; the engine only
//! needs atomic single-row replace semantics over `(key, timestamp,
//! payload)`. [`MemoryStore`] is the reference implementation used in
//! tests and by embedders that want a purely in-process cache.

use crate::cache::types::CacheEntry;
use std::collections::HashMap;
use std::sync::Mutex;
use thiserror::Error;

/// Durable store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying I/O failure.
    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Backend-specific failure (lock contention, corruption, ...).
    #[error("store backend error: {0}")]
    Backend(String),
}

/// Persistent key-value backend for cache rows.
///
/// Implementations must provide atomic single-row replace semantics and
/// tolerate concurrent readers during a write. Failures are the backend's
/// own to log; the engine treats a failed write as "not cached this time".
pub trait DurableStore: Send + Sync {
    /// Fetch the row for `key`, if present.
    fn get(&self, key: &str) -> Result<Option<CacheEntry>, StoreError>;

    /// Insert or replace the row for `key`.
    fn put(&self, key: &str, entry: CacheEntry) -> Result<(), StoreError>;

    /// Remove the row for `key`. Removing an absent row is not an error.
    fn delete(&self, key: &str) -> Result<(), StoreError>;
}

/// In-process reference store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    rows: Mutex<HashMap<String, CacheEntry>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored rows.
    pub fn row_count(&self) -> usize {
        self.rows.lock().unwrap().len()
    }
}

impl DurableStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<CacheEntry>, StoreError> {
        Ok(self.rows.lock().unwrap().get(key).cloned())
    }

    fn put(&self, key: &str, entry: CacheEntry) -> Result<(), StoreError> {
        self.rows.lock().unwrap().insert(key.to_string(), entry);
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.rows.lock().unwrap().remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_absent_is_none() {
        let store = MemoryStore::new();
        assert!(store.get("missing").unwrap().is_none());
    }

    #[test]
    fn put_then_get() {
        let store = MemoryStore::new();
        store.put("k", CacheEntry::new(10, vec![1, 2, 3])).unwrap();

        let row = store.get("k").unwrap().unwrap();
        assert_eq!(row.timestamp, 10);
        assert_eq!(row.payload, vec![1, 2, 3]);
    }

    #[test]
    fn put_replaces_wholesale() {
        let store = MemoryStore::new();
        store.put("k", CacheEntry::new(10, vec![1])).unwrap();
        store.put("k", CacheEntry::new(20, vec![2])).unwrap();

        let row = store.get("k").unwrap().unwrap();
        assert_eq!(row.timestamp, 20);
        assert_eq!(row.payload, vec![2]);
        assert_eq!(store.row_count(), 1);
    }

    #[test]
    fn delete_removes_row() {
        let store = MemoryStore::new();
        store.put("k", CacheEntry::new(10, vec![1])).unwrap();
        store.delete("k").unwrap();
        assert!(store.get("k").unwrap().is_none());
    }

    #[test]
    fn delete_absent_is_ok() {
        let store = MemoryStore::new();
        assert!(store.delete("missing").is_ok());
    }
}
