//! The cache engine: freshness policy, serving modes and write-back.
//!
//! Every call computes the entry's key, consults the in-process hot layer
//! and then the durable store, and applies the freshness policy:
//!
//! - a true miss always blocks on an inline recomputation;
//! - an entry past the hard reset ceiling is recomputed inline, whatever
//!   the mode — it is too stale to trust even as a fallback;
//! - a fresh entry is returned as-is;
//! - an aged entry is served stale while a background refresh runs
//!   ([`CacheMode::Async`]) or recomputed inline ([`CacheMode::Sync`]).
//!
//! Write-backs install the new entry in the hot layer synchronously and
//! persist it durably afterwards, so readers in this process never see
//! staler data than a writer already observed. Per-key busy counts
//! sequence deletes after in-flight writes.

use crate::cache::codec;
use crate::cache::config::CacheConfig;
use crate::cache::hot::HotLayer;
use crate::cache::key::cache_key;
use crate::cache::stats::{CacheStats, EngineCounters};
use crate::cache::store::DurableStore;
use crate::cache::types::{
    CacheEntry, CacheError, CacheMode, Computed, Freshness, FRESH_EXTENDED_SECS, FRESH_LONG_SECS,
    FRESH_MEDIUM_SECS, FRESH_SHORT_SECS,
};
use crate::pool::{TaskSpec, WorkerPool};
use crate::time::{Clock, SystemClock};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashSet;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};

/// Extra slack on top of `2 * write_delay` when a delete waits out
/// in-flight writers.
const DELETE_WAIT_SLACK: Duration = Duration::from_millis(100);

/// State shared with background refresh and write tasks.
struct EngineShared {
    store: Arc<dyn DurableStore>,
    hot: HotLayer,
    refreshing: Mutex<HashSet<String>>,
    clock: Arc<dyn Clock>,
    config: CacheConfig,
    counters: EngineCounters,
}

/// Releases a key's busy count when dropped; commits the durable row when
/// the write actually happens. Dropping without committing (a cancelled
/// write task) still releases the count so deletes cannot hang.
struct WriteGuard {
    shared: Arc<EngineShared>,
    key: String,
}

impl WriteGuard {
    fn commit(self, entry: CacheEntry) {
        if let Err(err) = self.shared.store.put(&self.key, entry) {
            warn!(
                "durable write failed for {}: {err}; not cached this time",
                self.key
            );
            self.shared.counters.record_write_failure();
        }
    }
}

impl Drop for WriteGuard {
    fn drop(&mut self) {
        self.shared.hot.end_write(&self.key);
    }
}

/// Removes a key from the in-flight refresh set when dropped, so the
/// at-most-one-refresh invariant survives panicking computations and
/// cancelled tasks alike.
struct RefreshGuard {
    shared: Arc<EngineShared>,
    key: String,
}

impl Drop for RefreshGuard {
    fn drop(&mut self) {
        self.shared.refreshing.lock().unwrap().remove(&self.key);
    }
}

/// Stale-while-revalidate memoization cache.
///
/// # Example
///
/// ```
/// use swrcache::cache::{CacheConfig, CacheEngine, Computed, MemoryStore};
/// use swrcache::pool::{PoolConfig, WorkerPool};
/// use std::sync::Arc;
///
/// let pool = Arc::new(WorkerPool::new(PoolConfig::default()));
/// let engine = CacheEngine::new(Arc::new(MemoryStore::new()), pool, CacheConfig::default());
///
/// let value = engine
///     .cache_short("answer.compute", &[("n", 7.into())], || Computed::Cache(42u32))
///     .unwrap();
/// assert_eq!(value, Some(42));
/// ```
pub struct CacheEngine {
    shared: Arc<EngineShared>,
    pool: Arc<WorkerPool>,
}

impl CacheEngine {
    /// Create an engine over the given store and pool.
    pub fn new(store: Arc<dyn DurableStore>, pool: Arc<WorkerPool>, config: CacheConfig) -> Self {
        Self::with_clock(store, pool, config, Arc::new(SystemClock))
    }

    /// Create an engine with an explicit clock (tests drive freshness
    /// decisions through a manual clock).
    pub fn with_clock(
        store: Arc<dyn DurableStore>,
        pool: Arc<WorkerPool>,
        config: CacheConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            shared: Arc::new(EngineShared {
                store,
                hot: HotLayer::new(),
                refreshing: Mutex::new(HashSet::new()),
                clock,
                config,
                counters: EngineCounters::default(),
            }),
            pool,
        }
    }

    /// Memoize `compute` under the given mode and freshness policy.
    ///
    /// `refresh_after` forces a refresh check earlier than the serving
    /// window: an entry older than `refresh_after` but still within
    /// `Freshness::MaxAge` is served stale while a refresh runs (async
    /// mode) or recomputed inline (sync mode).
    ///
    /// Failures on the way (durable store, encoding, pool admission for
    /// background work) are logged and degraded, never raised: a cache can
    /// always legitimately answer as if nothing were cached.
    pub fn cache<V, F>(
        &self,
        mode: CacheMode,
        freshness: Freshness,
        refresh_after: Option<u64>,
        function_id: &str,
        args: &[(&str, Value)],
        compute: F,
    ) -> Result<Option<V>, CacheError>
    where
        V: Serialize + DeserializeOwned + Send + 'static,
        F: FnOnce() -> Computed<V> + Send + 'static,
    {
        let key = cache_key(function_id, args);
        self.cache_by_key(mode, freshness, refresh_after, &key, compute)
    }

    fn cache_by_key<V, F>(
        &self,
        mode: CacheMode,
        freshness: Freshness,
        refresh_after: Option<u64>,
        key: &str,
        compute: F,
    ) -> Result<Option<V>, CacheError>
    where
        V: Serialize + DeserializeOwned + Send + 'static,
        F: FnOnce() -> Computed<V> + Send + 'static,
    {
        let max_age = match freshness {
            Freshness::RefreshBlocking => {
                self.shared.counters.record_miss();
                return self.recompute_blocking(key, compute);
            }
            Freshness::RefreshServeStale => {
                // Forced refresh, but old data is still good enough to
                // hand back right now.
                let Some(entry) = self.lookup(key) else {
                    self.shared.counters.record_miss();
                    return self.recompute_blocking(key, compute);
                };
                return match codec::decode::<V>(&entry.payload) {
                    Ok(stale) => {
                        self.shared.counters.record_stale_served();
                        self.spawn_refresh(key, compute);
                        Ok(stale)
                    }
                    Err(err) => {
                        debug!("undecodable payload for {key}: {err}; recomputing");
                        self.shared.counters.record_miss();
                        self.recompute_blocking(key, compute)
                    }
                };
            }
            Freshness::MaxAge(max_age) => max_age,
        };

        let Some(entry) = self.lookup(key) else {
            self.shared.counters.record_miss();
            return self.recompute_blocking(key, compute);
        };

        let now = self.shared.clock.now_epoch_secs();
        let age = entry.age_at(now);

        if age > self.shared.config.reset_after_secs {
            debug!("entry for {key} aged {age}s, past reset ceiling; recomputing");
            self.shared.counters.record_miss();
            return self.recompute_blocking(key, compute);
        }

        let decoded: Option<V> = match codec::decode(&entry.payload) {
            Ok(decoded) => decoded,
            Err(err) => {
                debug!("undecodable payload for {key}: {err}; treating as miss");
                self.shared.counters.record_miss();
                return self.recompute_blocking(key, compute);
            }
        };

        let refresh_after = refresh_after.unwrap_or(max_age).min(max_age);
        if age <= refresh_after {
            self.shared.counters.record_hit();
            return Ok(decoded);
        }

        // A cached empty result past its grace window is most likely a
        // failure that got cached; recompute instead of perpetuating it.
        if decoded.is_none() && age > self.shared.config.empty_result_grace_secs {
            debug!("cached empty result for {key} aged {age}s; recomputing");
            self.shared.counters.record_miss();
            return self.recompute_blocking(key, compute);
        }

        match mode {
            CacheMode::Async => {
                self.shared.counters.record_stale_served();
                self.spawn_refresh(key, compute);
                Ok(decoded)
            }
            CacheMode::Sync => {
                self.shared.counters.record_miss();
                self.recompute_blocking(key, compute)
            }
        }
    }

    /// Read-only lookup; never triggers a recomputation.
    pub fn retrieve<V: DeserializeOwned>(&self, function_id: &str, args: &[(&str, Value)]) -> Option<V> {
        let key = cache_key(function_id, args);
        let entry = self.lookup(&key)?;
        match codec::decode(&entry.payload) {
            Ok(decoded) => decoded,
            Err(err) => {
                debug!("undecodable payload for {key}: {err}");
                None
            }
        }
    }

    /// Delete the entry for a computation.
    ///
    /// Waits out in-flight write-backs (bounded by roughly twice the write
    /// delay) before touching the durable row, so a delete is never
    /// silently undone by a writer that started earlier.
    pub fn delete(&self, function_id: &str, args: &[(&str, Value)]) -> Result<(), CacheError> {
        let key = cache_key(function_id, args);
        self.delete_by_key(&key)
    }

    fn delete_by_key(&self, key: &str) -> Result<(), CacheError> {
        let bound =
            Duration::from_millis(self.shared.config.write_delay_ms * 2) + DELETE_WAIT_SLACK;
        if !self.shared.hot.wait_for_writers(key, bound) {
            warn!("writers for {key} still in flight after {bound:?}; deleting anyway");
        }
        self.shared.hot.remove(key);
        self.shared.store.delete(key)?;
        Ok(())
    }

    /// Drop every hot-layer entry. Durable rows are untouched.
    pub fn clear_hot(&self) {
        self.shared.hot.clear();
    }

    /// Telemetry snapshot.
    pub fn stats(&self) -> CacheStats {
        self.shared.counters.snapshot()
    }

    /// Number of hot-layer entries.
    pub fn hot_entry_count(&self) -> usize {
        self.shared.hot.entry_count()
    }

    // =========================================================================
    // Fixed freshness bands
    // =========================================================================

    /// Asynchronous cache call with a 10 minute serving window.
    pub fn cache_short<V, F>(
        &self,
        function_id: &str,
        args: &[(&str, Value)],
        compute: F,
    ) -> Result<Option<V>, CacheError>
    where
        V: Serialize + DeserializeOwned + Send + 'static,
        F: FnOnce() -> Computed<V> + Send + 'static,
    {
        self.cache(
            CacheMode::Async,
            Freshness::MaxAge(FRESH_SHORT_SECS),
            None,
            function_id,
            args,
            compute,
        )
    }

    /// Asynchronous cache call with a 1 hour serving window.
    pub fn cache_medium<V, F>(
        &self,
        function_id: &str,
        args: &[(&str, Value)],
        compute: F,
    ) -> Result<Option<V>, CacheError>
    where
        V: Serialize + DeserializeOwned + Send + 'static,
        F: FnOnce() -> Computed<V> + Send + 'static,
    {
        self.cache(
            CacheMode::Async,
            Freshness::MaxAge(FRESH_MEDIUM_SECS),
            None,
            function_id,
            args,
            compute,
        )
    }

    /// Asynchronous cache call with a 24 hour serving window.
    pub fn cache_long<V, F>(
        &self,
        function_id: &str,
        args: &[(&str, Value)],
        compute: F,
    ) -> Result<Option<V>, CacheError>
    where
        V: Serialize + DeserializeOwned + Send + 'static,
        F: FnOnce() -> Computed<V> + Send + 'static,
    {
        self.cache(
            CacheMode::Async,
            Freshness::MaxAge(FRESH_LONG_SECS),
            None,
            function_id,
            args,
            compute,
        )
    }

    /// Asynchronous cache call with a 7 day serving window.
    pub fn cache_extended<V, F>(
        &self,
        function_id: &str,
        args: &[(&str, Value)],
        compute: F,
    ) -> Result<Option<V>, CacheError>
    where
        V: Serialize + DeserializeOwned + Send + 'static,
        F: FnOnce() -> Computed<V> + Send + 'static,
    {
        self.cache(
            CacheMode::Async,
            Freshness::MaxAge(FRESH_EXTENDED_SECS),
            None,
            function_id,
            args,
            compute,
        )
    }

    // =========================================================================
    // Internals
    // =========================================================================

    /// Hot layer first, then the durable store. Store read failures are
    /// logged and degraded to a miss.
    fn lookup(&self, key: &str) -> Option<CacheEntry> {
        if let Some(entry) = self.shared.hot.get(key) {
            return Some(entry);
        }
        match self.shared.store.get(key) {
            Ok(row) => row,
            Err(err) => {
                warn!("durable store read failed for {key}: {err}");
                None
            }
        }
    }

    /// Compute inline, write back, return. The caller is blocked for the
    /// duration; a panicking computation is logged and degrades to "no
    /// value" with nothing cached.
    fn recompute_blocking<V, F>(&self, key: &str, compute: F) -> Result<Option<V>, CacheError>
    where
        V: Serialize + DeserializeOwned + Send + 'static,
        F: FnOnce() -> Computed<V> + Send + 'static,
    {
        self.shared.counters.record_refresh();
        match run_compute(key, compute) {
            Some(Computed::Cache(value)) => {
                write_back(&self.shared, Some(&*self.pool), key, &Some(&value));
                Ok(Some(value))
            }
            Some(Computed::Skip(value)) => Ok(Some(value)),
            Some(Computed::Empty) => {
                write_back::<V>(&self.shared, Some(&*self.pool), key, &None);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    /// Submit a background refresh unless one is already in flight for
    /// this key. Submission failures are logged, never raised — the caller
    /// already holds a servable value.
    fn spawn_refresh<V, F>(&self, key: &str, compute: F)
    where
        V: Serialize + Send + 'static,
        F: FnOnce() -> Computed<V> + Send + 'static,
    {
        {
            let mut refreshing = self.shared.refreshing.lock().unwrap();
            if !refreshing.insert(key.to_string()) {
                debug!("refresh already in flight for {key}");
                return;
            }
        }
        self.shared.counters.record_refresh();

        let guard = RefreshGuard {
            shared: Arc::clone(&self.shared),
            key: key.to_string(),
        };
        let shared = Arc::clone(&self.shared);
        let key_owned = key.to_string();

        let submitted = self.pool.submit(TaskSpec::new(
            format!("swr-refresh-{}", short_key(key)),
            move || {
                let _guard = guard;
                match run_compute(&key_owned, compute) {
                    Some(Computed::Cache(value)) => {
                        write_back(&shared, None, &key_owned, &Some(&value));
                    }
                    Some(Computed::Empty) => {
                        write_back::<V>(&shared, None, &key_owned, &None);
                    }
                    // Do-not-cache sentinel or panic: nothing to persist.
                    Some(Computed::Skip(_)) | None => {}
                }
            },
        ));

        if let Err(err) = submitted {
            warn!("background refresh for {key} not started: {err}");
        }
    }
}

impl std::fmt::Debug for CacheEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheEngine")
            .field("hot_entries", &self.shared.hot.entry_count())
            .field("stats", &self.shared.counters.snapshot())
            .finish()
    }
}

/// Run a computation under panic isolation.
fn run_compute<V>(key: &str, compute: impl FnOnce() -> Computed<V>) -> Option<Computed<V>> {
    match panic::catch_unwind(AssertUnwindSafe(compute)) {
        Ok(computed) => Some(computed),
        Err(_) => {
            warn!("recomputation for {key} panicked; returning no value");
            None
        }
    }
}

/// Install the new entry in the hot layer synchronously, then persist it.
///
/// With a pool and a nonzero write delay the durable write runs on a
/// short-lived pool task after an artificial delay, batching bursts of
/// rapid write-backs. Background refresh tasks pass no pool and write
/// durably inline — they are already off the caller's thread.
fn write_back<V: Serialize>(
    shared: &Arc<EngineShared>,
    pool: Option<&WorkerPool>,
    key: &str,
    value: &Option<V>,
) {
    let payload = match codec::encode(value, shared.config.compress_threshold_bytes) {
        Ok(payload) => payload,
        Err(err) => {
            warn!("encode failed for {key}: {err}; not cached");
            shared.counters.record_write_failure();
            return;
        }
    };
    let entry = CacheEntry::new(shared.clock.now_epoch_secs(), payload);

    shared.hot.begin_write(key);
    let guard = WriteGuard {
        shared: Arc::clone(shared),
        key: key.to_string(),
    };
    shared.hot.insert(key, entry.clone());
    shared.counters.record_write_back();

    let delay_ms = shared.config.write_delay_ms;
    if let Some(pool) = pool {
        if delay_ms > 0 {
            let submitted = pool.submit(TaskSpec::new(
                format!("swr-write-{}", short_key(key)),
                move || {
                    thread::sleep(Duration::from_millis(delay_ms));
                    guard.commit(entry);
                },
            ));
            match submitted {
                Ok(_) => return,
                // Not persisted this time; the hot layer still serves it.
                Err(err) => {
                    debug!("deferred durable write for {key} not scheduled: {err}");
                    return;
                }
            }
        }
    }
    guard.commit(entry);
}

/// Shortened key for task names and log lines.
fn short_key(key: &str) -> &str {
    &key[..key.len().min(16)]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::store::MemoryStore;
    use crate::pool::PoolConfig;
    use crate::time::ManualClock;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Instant;

    struct Fixture {
        engine: CacheEngine,
        store: Arc<MemoryStore>,
        clock: Arc<ManualClock>,
        pool: Arc<WorkerPool>,
    }

    fn fixture(config: CacheConfig) -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(1_000));
        let pool = Arc::new(WorkerPool::new(PoolConfig::default().with_instance_limit(8)));
        let engine = CacheEngine::with_clock(
            Arc::clone(&store) as Arc<dyn DurableStore>,
            Arc::clone(&pool),
            config,
            Arc::clone(&clock) as Arc<dyn Clock>,
        );
        Fixture {
            engine,
            store,
            clock,
            pool,
        }
    }

    fn quick_config() -> CacheConfig {
        // Immediate durable writes keep assertions deterministic.
        CacheConfig::default().with_write_delay_ms(0)
    }

    fn counted_compute(
        counter: &Arc<AtomicUsize>,
        value: &str,
    ) -> impl FnOnce() -> Computed<String> + Send + 'static {
        let counter = Arc::clone(counter);
        let value = value.to_string();
        move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Computed::Cache(value)
        }
    }

    #[test]
    fn miss_computes_inline_and_caches() {
        let f = fixture(quick_config());
        let calls = Arc::new(AtomicUsize::new(0));

        let value: Option<String> = f
            .engine
            .cache(
                CacheMode::Async,
                Freshness::MaxAge(100),
                None,
                "f",
                &[("x", 1.into())],
                counted_compute(&calls, "A"),
            )
            .unwrap();

        assert_eq!(value, Some("A".to_string()));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(f.store.row_count(), 1);
        assert_eq!(f.engine.hot_entry_count(), 1);
    }

    #[test]
    fn fresh_hit_does_not_invoke_compute() {
        let f = fixture(quick_config());
        let calls = Arc::new(AtomicUsize::new(0));
        let args = [("x", Value::from(1))];

        let first: Option<String> = f
            .engine
            .cache(
                CacheMode::Async,
                Freshness::MaxAge(100),
                None,
                "f",
                &args,
                counted_compute(&calls, "A"),
            )
            .unwrap();
        assert_eq!(first, Some("A".to_string()));

        f.clock.advance(50);
        let second: Option<String> = f
            .engine
            .cache(
                CacheMode::Async,
                Freshness::MaxAge(100),
                None,
                "f",
                &args,
                counted_compute(&calls, "B"),
            )
            .unwrap();

        assert_eq!(second, Some("A".to_string()), "cached value served");
        assert_eq!(calls.load(Ordering::SeqCst), 1, "compute not invoked again");
        assert_eq!(f.engine.stats().hits, 1);
    }

    #[test]
    fn stale_serves_old_value_then_refreshes() {
        let f = fixture(quick_config());
        let args = [("x", Value::from(1))];

        let first: Option<String> = f
            .engine
            .cache(
                CacheMode::Async,
                Freshness::MaxAge(100),
                Some(10),
                "f",
                &args,
                || Computed::Cache("A".to_string()),
            )
            .unwrap();
        assert_eq!(first, Some("A".to_string()));

        // t=50: past the refresh threshold (10) but within max age (100).
        f.clock.advance(50);
        let started = Instant::now();
        let second: Option<String> = f
            .engine
            .cache(
                CacheMode::Async,
                Freshness::MaxAge(100),
                Some(10),
                "f",
                &args,
                || Computed::Cache("B".to_string()),
            )
            .unwrap();

        assert_eq!(second, Some("A".to_string()), "stale value served immediately");
        assert!(
            started.elapsed() < Duration::from_secs(1),
            "async call must not block on recompute"
        );

        // Once the background refresh lands, readers see the new value.
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            let current: Option<String> = f.engine.retrieve("f", &args);
            if current == Some("B".to_string()) {
                break;
            }
            assert!(Instant::now() < deadline, "refresh never landed");
            thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(f.engine.stats().stale_served, 1);
    }

    #[test]
    fn sync_mode_blocks_on_stale() {
        let f = fixture(quick_config());
        let args = [("x", Value::from(1))];

        let _: Option<String> = f
            .engine
            .cache(
                CacheMode::Sync,
                Freshness::MaxAge(100),
                Some(10),
                "f",
                &args,
                || Computed::Cache("A".to_string()),
            )
            .unwrap();

        f.clock.advance(50);
        let second: Option<String> = f
            .engine
            .cache(
                CacheMode::Sync,
                Freshness::MaxAge(100),
                Some(10),
                "f",
                &args,
                || Computed::Cache("B".to_string()),
            )
            .unwrap();

        assert_eq!(second, Some("B".to_string()), "sync mode returns the fresh value");
    }

    #[test]
    fn refresh_serve_stale_sentinel() {
        let f = fixture(quick_config());
        let args = [("x", Value::from(1))];

        let _: Option<String> = f
            .engine
            .cache(CacheMode::Async, Freshness::MaxAge(100), None, "f", &args, || {
                Computed::Cache("A".to_string())
            })
            .unwrap();

        // Entry is brand-new, but the sentinel forces a refresh anyway —
        // while still serving the old value.
        let served: Option<String> = f
            .engine
            .cache(
                CacheMode::Async,
                Freshness::RefreshServeStale,
                None,
                "f",
                &args,
                || Computed::Cache("B".to_string()),
            )
            .unwrap();
        assert_eq!(served, Some("A".to_string()));

        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            let current: Option<String> = f.engine.retrieve("f", &args);
            if current == Some("B".to_string()) {
                break;
            }
            assert!(Instant::now() < deadline, "forced refresh never landed");
            thread::sleep(Duration::from_millis(10));
        }
    }

    #[test]
    fn refresh_blocking_sentinel_ignores_entry() {
        let f = fixture(quick_config());
        let calls = Arc::new(AtomicUsize::new(0));
        let args = [("x", Value::from(1))];

        let _: Option<String> = f
            .engine
            .cache(CacheMode::Async, Freshness::MaxAge(100), None, "f", &args, || {
                Computed::Cache("A".to_string())
            })
            .unwrap();

        let value: Option<String> = f
            .engine
            .cache(
                CacheMode::Async,
                Freshness::RefreshBlocking,
                None,
                "f",
                &args,
                counted_compute(&calls, "B"),
            )
            .unwrap();

        assert_eq!(value, Some("B".to_string()), "fresh value returned, not cache");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn reset_ceiling_forces_blocking_recompute() {
        let f = fixture(quick_config().with_reset_after_secs(1_000));
        let args = [("x", Value::from(1))];

        let _: Option<String> = f
            .engine
            .cache(CacheMode::Async, Freshness::MaxAge(100), None, "f", &args, || {
                Computed::Cache("A".to_string())
            })
            .unwrap();

        f.clock.advance(5_000);
        let value: Option<String> = f
            .engine
            .cache(
                CacheMode::Async,
                Freshness::MaxAge(u64::MAX),
                None,
                "f",
                &args,
                || Computed::Cache("B".to_string()),
            )
            .unwrap();

        assert_eq!(value, Some("B".to_string()), "too-old entry is not servable");
    }

    #[test]
    fn cached_empty_past_grace_is_recomputed() {
        let f = fixture(quick_config().with_empty_result_grace_secs(60));
        let args = [("x", Value::from(1))];

        let first: Option<String> = f
            .engine
            .cache(CacheMode::Async, Freshness::MaxAge(10_000), None, "f", &args, || {
                Computed::Empty
            })
            .unwrap();
        assert_eq!(first, None);

        // Within grace: the empty result is served as a normal value.
        f.clock.advance(30);
        let calls = Arc::new(AtomicUsize::new(0));
        let second: Option<String> = f
            .engine
            .cache(
                CacheMode::Async,
                Freshness::MaxAge(10_000),
                None,
                "f",
                &args,
                counted_compute(&calls, "B"),
            )
            .unwrap();
        assert_eq!(second, None);
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        // Past grace but past the refresh threshold too: forced inline
        // recompute replaces the likely-failure marker.
        f.clock.advance(200);
        let third: Option<String> = f
            .engine
            .cache(
                CacheMode::Async,
                Freshness::MaxAge(10_000),
                Some(60),
                "f",
                &args,
                counted_compute(&calls, "B"),
            )
            .unwrap();
        assert_eq!(third, Some("B".to_string()));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn skip_sentinel_returns_without_caching() {
        let f = fixture(quick_config());
        let args = [("x", Value::from(1))];

        let value: Option<String> = f
            .engine
            .cache(CacheMode::Async, Freshness::MaxAge(100), None, "f", &args, || {
                Computed::Skip("transient".to_string())
            })
            .unwrap();

        assert_eq!(value, Some("transient".to_string()));
        assert_eq!(f.store.row_count(), 0, "skip must not write back");
        assert_eq!(f.engine.hot_entry_count(), 0);
    }

    #[test]
    fn panicking_compute_degrades_to_no_value() {
        let f = fixture(quick_config());
        let args = [("x", Value::from(1))];

        let value: Option<String> = f
            .engine
            .cache(CacheMode::Async, Freshness::MaxAge(100), None, "f", &args, || {
                panic!("upstream exploded")
            })
            .unwrap();

        assert_eq!(value, None);
        assert_eq!(f.store.row_count(), 0, "panic must not cache anything");
    }

    #[test]
    fn undecodable_row_is_a_miss() {
        let f = fixture(quick_config());
        let args = [("x", Value::from(1))];
        let key = cache_key("f", &args);

        f.store
            .put(&key, CacheEntry::new(1_000, vec![0x00, 0xff, 0x13]))
            .unwrap();

        let calls = Arc::new(AtomicUsize::new(0));
        let value: Option<String> = f
            .engine
            .cache(
                CacheMode::Async,
                Freshness::MaxAge(100),
                None,
                "f",
                &args,
                counted_compute(&calls, "A"),
            )
            .unwrap();

        assert_eq!(value, Some("A".to_string()));
        assert_eq!(calls.load(Ordering::SeqCst), 1, "decode failure forces recompute");
    }

    #[test]
    fn retrieve_never_computes() {
        let f = fixture(quick_config());
        let args = [("x", Value::from(1))];

        let absent: Option<String> = f.engine.retrieve("f", &args);
        assert_eq!(absent, None);

        let _: Option<String> = f
            .engine
            .cache(CacheMode::Async, Freshness::MaxAge(100), None, "f", &args, || {
                Computed::Cache("A".to_string())
            })
            .unwrap();

        let present: Option<String> = f.engine.retrieve("f", &args);
        assert_eq!(present, Some("A".to_string()));
    }

    #[test]
    fn only_one_refresh_in_flight_per_key() {
        let f = fixture(quick_config());
        let args = [("x", Value::from(1))];
        let calls = Arc::new(AtomicUsize::new(0));

        let _: Option<String> = f
            .engine
            .cache(CacheMode::Async, Freshness::MaxAge(100), Some(10), "f", &args, || {
                Computed::Cache("A".to_string())
            })
            .unwrap();

        f.clock.advance(50);

        // Both calls see a stale entry; only the first submits a refresh.
        for _ in 0..2 {
            let calls = Arc::clone(&calls);
            let _: Option<String> = f
                .engine
                .cache(
                    CacheMode::Async,
                    Freshness::MaxAge(100),
                    Some(10),
                    "f",
                    &args,
                    move || {
                        calls.fetch_add(1, Ordering::SeqCst);
                        thread::sleep(Duration::from_millis(100));
                        Computed::Cache("B".to_string())
                    },
                )
                .unwrap();
        }

        f.pool.join_all(Duration::from_secs(10));
        assert_eq!(calls.load(Ordering::SeqCst), 1, "second refresh was coalesced");
    }

    #[test]
    fn delete_waits_for_inflight_writer() {
        let f = fixture(quick_config().with_write_delay_ms(100));
        let args = [("x", Value::from(1))];
        let key = cache_key("f", &args);

        // The write-back is deferred ~100ms onto a pool task.
        let _: Option<String> = f
            .engine
            .cache(CacheMode::Async, Freshness::MaxAge(100), None, "f", &args, || {
                Computed::Cache("A".to_string())
            })
            .unwrap();

        f.engine.delete("f", &args).unwrap();

        // Let the deferred writer (if any survived) run its course.
        f.pool.join_all(Duration::from_secs(10));
        assert!(
            f.store.get(&key).unwrap().is_none(),
            "delete must win over the earlier-started write"
        );
        let gone: Option<String> = f.engine.retrieve("f", &args);
        assert_eq!(gone, None);
    }

    #[test]
    fn band_wrappers_serve_and_cache() {
        let f = fixture(quick_config());
        let args = [("id", Value::from(7))];

        let v1: Option<u32> = f.engine.cache_short("f", &args, || Computed::Cache(1)).unwrap();
        let v2: Option<u32> = f.engine.cache_medium("g", &args, || Computed::Cache(2)).unwrap();
        let v3: Option<u32> = f.engine.cache_long("h", &args, || Computed::Cache(3)).unwrap();
        let v4: Option<u32> = f.engine.cache_extended("i", &args, || Computed::Cache(4)).unwrap();

        assert_eq!((v1, v2, v3, v4), (Some(1), Some(2), Some(3), Some(4)));
        assert_eq!(f.store.row_count(), 4);
    }

    #[test]
    fn store_write_failure_is_not_raised() {
        struct FailingStore;
        impl DurableStore for FailingStore {
            fn get(&self, _key: &str) -> Result<Option<CacheEntry>, crate::cache::StoreError> {
                Ok(None)
            }
            fn put(&self, _key: &str, _entry: CacheEntry) -> Result<(), crate::cache::StoreError> {
                Err(crate::cache::StoreError::Backend("disk full".to_string()))
            }
            fn delete(&self, _key: &str) -> Result<(), crate::cache::StoreError> {
                Ok(())
            }
        }

        let pool = Arc::new(WorkerPool::new(PoolConfig::default().with_instance_limit(4)));
        let engine = CacheEngine::new(Arc::new(FailingStore), pool, quick_config());

        let value: Option<String> = engine
            .cache(
                CacheMode::Async,
                Freshness::MaxAge(100),
                None,
                "f",
                &[("x", 1.into())],
                || Computed::Cache("A".to_string()),
            )
            .unwrap();

        assert_eq!(value, Some("A".to_string()), "value served despite failed persist");
        assert_eq!(engine.stats().write_failures, 1);
    }
}
