//! swrcache - Stale-while-revalidate memoization cache
//!
//! This library memoizes the results of arbitrary expensive computations
//! behind a freshness policy. Depending on the age of a cached entry and the
//! serving mode, a call either returns the cached value immediately, blocks
//! while a fresh value is computed inline, or returns the stale value right
//! away while a background refresh updates the cache for future callers.
//!
//! Background work runs on a self-managing worker pool that bounds
//! concurrency through a counting semaphore and survives operating-system
//! thread exhaustion by queueing and retrying unit creation.
//!
//! # High-Level API
//!
//! For most use cases, the [`context`] module provides a simplified facade:
//!
//! ```ignore
//! use swrcache::context::CacheContext;
//! use swrcache::cache::{CacheConfig, Computed, MemoryStore};
//! use swrcache::pool::PoolConfig;
//! use std::sync::Arc;
//!
//! let ctx = CacheContext::new(
//!     Arc::new(MemoryStore::new()),
//!     CacheConfig::default(),
//!     PoolConfig::default(),
//! );
//!
//! // Serve cached metadata for up to an hour, refreshing in the
//! // background once it is ten minutes old.
//! let value: Option<String> = ctx.engine().cache_medium(
//!     "metadata.lookup",
//!     &[("title", "Heat".into()), ("year", 1995.into())],
//!     || Computed::Cache("tt0113277".to_string()),
//! )?;
//! ```

pub mod cache;
pub mod context;
pub mod logging;
pub mod pool;
pub mod time;

/// Version of the swrcache library.
///
/// The version is defined in `Cargo.toml` and injected at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
