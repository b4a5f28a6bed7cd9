//! Process-wide wiring of pool, engine and process memory.
//!
//! There is no global state in this crate: a [`CacheContext`] is built
//! once at process start and handed (or injected) into everything that
//! caches. Components can also be constructed individually; the context
//! is the convenient assembly for the common case of one shared pool and
//! one shared engine per process.

use crate::cache::{CacheConfig, CacheEngine, DurableStore, ProcessMemory};
use crate::pool::{HardwareHints, PoolConfig, WorkerPool};
use crate::time::Clock;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// One process's cache stack: worker pool, cache engine, process memory.
pub struct CacheContext {
    pool: Arc<WorkerPool>,
    engine: Arc<CacheEngine>,
    memory: Arc<ProcessMemory>,
}

impl CacheContext {
    /// Build a context over the given durable store.
    pub fn new(store: Arc<dyn DurableStore>, cache: CacheConfig, pool: PoolConfig) -> Self {
        Self::build(store, cache, pool, None, None)
    }

    /// Build a context with optional hardware hints and an explicit clock.
    pub fn build(
        store: Arc<dyn DurableStore>,
        cache: CacheConfig,
        pool: PoolConfig,
        hints: Option<Arc<dyn HardwareHints>>,
        clock: Option<Arc<dyn Clock>>,
    ) -> Self {
        let pool = Arc::new(WorkerPool::with_hints(pool, hints));
        let (engine, memory) = match clock {
            Some(clock) => (
                CacheEngine::with_clock(store, Arc::clone(&pool), cache, Arc::clone(&clock)),
                ProcessMemory::with_clock(clock),
            ),
            None => (
                CacheEngine::new(store, Arc::clone(&pool), cache),
                ProcessMemory::new(),
            ),
        };
        let engine = Arc::new(engine);
        let memory = Arc::new(memory);

        info!(
            "cache context ready (instance limit: {})",
            pool.instance_limit()
        );
        Self {
            pool,
            engine,
            memory,
        }
    }

    /// The shared worker pool.
    pub fn pool(&self) -> &Arc<WorkerPool> {
        &self.pool
    }

    /// The cache engine.
    pub fn engine(&self) -> &Arc<CacheEngine> {
        &self.engine
    }

    /// The ephemeral process-memory tier.
    pub fn memory(&self) -> &Arc<ProcessMemory> {
        &self.memory
    }

    /// Opportunistic maintenance: sweep expired process-memory entries.
    ///
    /// Returns how many entries were dropped.
    pub fn maintain(&self) -> usize {
        self.memory.sweep()
    }

    /// Wait for all in-flight background work to terminate.
    ///
    /// Returns `false` if units were still live when the timeout elapsed.
    pub fn shutdown(&self, timeout: Duration) -> bool {
        self.pool.join_all(timeout)
    }
}

impl std::fmt::Debug for CacheContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheContext")
            .field("pool", &self.pool)
            .field("memory", &self.memory)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{Computed, MemoryStore};

    fn context() -> CacheContext {
        CacheContext::new(
            Arc::new(MemoryStore::new()),
            CacheConfig::default().with_write_delay_ms(0),
            PoolConfig::default().with_instance_limit(4),
        )
    }

    #[test]
    fn engine_and_memory_are_usable() {
        let ctx = context();

        let value: Option<u32> = ctx
            .engine()
            .cache_short("f", &[("x", 1.into())], || Computed::Cache(5))
            .unwrap();
        assert_eq!(value, Some(5));

        ctx.memory().set("flag", &true, 60);
        assert_eq!(ctx.memory().get::<bool>("flag"), Some(true));
    }

    #[test]
    fn maintain_sweeps_memory() {
        let ctx = context();
        ctx.memory().set("flag", &true, 0);
        // TTL of zero expires immediately.
        assert_eq!(ctx.maintain(), 1);
    }

    #[test]
    fn shutdown_joins_background_work() {
        let ctx = context();
        ctx.pool()
            .spawn("bg", || {
                std::thread::sleep(Duration::from_millis(20));
            })
            .unwrap();
        assert!(ctx.shutdown(Duration::from_secs(5)));
    }
}
