//! Stale-while-revalidate cache engine.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │                        CacheEngine                            │
//! │  cache / retrieve / delete + fixed freshness bands            │
//! ├───────────────────────────────────────────────────────────────┤
//! │  ┌───────────┐  ┌─────────────┐  ┌──────────────────────────┐ │
//! │  │ Hot layer │  │ Busy counts │  │ DurableStore (external)  │ │
//! │  │ (in-proc) │  │ (per key)   │  │ get / put / delete       │ │
//! │  └───────────┘  └─────────────┘  └──────────────────────────┘ │
//! └───────────────────────────────────────────────────────────────┘
//!          background refreshes and deferred durable writes
//!                    run on the worker pool
//! ```
//!
//! # Core Concepts
//!
//! - **Key**: SHA-256 over the computation's identity and its sorted
//!   arguments; equal logical calls always map to the same key.
//!
//! - **Freshness policy**: a fresh entry is served as-is; an aged entry is
//!   served stale while a background refresh runs (async mode) or
//!   recomputed inline (sync mode); a true miss always blocks.
//!
//! - **Write-back ordering**: the hot layer is updated synchronously, the
//!   durable write may be deferred and batched; per-key busy counts make
//!   deletes wait out in-flight writers so a delete always wins.
//!
//! - **Process memory**: a separate TTL'd front tier ([`ProcessMemory`])
//!   for very hot values, with no durability and no write coordination.

mod codec;
mod config;
mod engine;
mod ephemeral;
mod hot;
mod key;
mod stats;
mod store;
mod types;

pub use codec::{decode, encode, CodecError};
pub use config::{
    CacheConfig, DEFAULT_COMPRESS_THRESHOLD_BYTES, DEFAULT_EMPTY_RESULT_GRACE_SECS,
    DEFAULT_RESET_AFTER_SECS, DEFAULT_WRITE_DELAY_MS,
};
pub use engine::CacheEngine;
pub use ephemeral::ProcessMemory;
pub use key::cache_key;
pub use stats::CacheStats;
pub use store::{DurableStore, MemoryStore, StoreError};
pub use types::{
    CacheEntry, CacheError, CacheMode, Computed, Freshness, FRESH_EXTENDED_SECS, FRESH_LONG_SECS,
    FRESH_MEDIUM_SECS, FRESH_SHORT_SECS,
};
