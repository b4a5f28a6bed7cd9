//! Self-managing worker pool.
//!
//! All concurrent work in the system is created through [`WorkerPool`]: a
//! single choke point that bounds concurrency, tracks every live unit, and
//! survives operating-system resource exhaustion.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        WorkerPool                            │
//! │  submit / submit_process / spawn / join_all / telemetry      │
//! ├──────────────────────────────────────────────────────────────┤
//! │  ┌────────────┐  ┌────────────┐  ┌─────────────────────────┐ │
//! │  │ Admission  │  │ Registry   │  │ FinishEventTable        │ │
//! │  │ Semaphore  │  │ (by id)    │  │ (rank -> queued units)  │ │
//! │  └────────────┘  └────────────┘  └─────────────────────────┘ │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Core Concepts
//!
//! - **Task unit**: one physical unit of execution — an OS thread
//!   ([`ThreadTask`]) or an OS process ([`ProcessTask`]) — behind the
//!   uniform [`Task`] lifecycle interface.
//!
//! - **Admission control**: a counting semaphore sized from configuration
//!   or hardware hints bounds how many units exist at once. Submitters
//!   block at the limit.
//!
//! - **Exhaustion retry**: when the OS refuses to create a thread or
//!   process, the unit queues at its rank, waits for some other unit to
//!   finish (highest ranks woken first), and retries with a bounded
//!   budget. The user sees at most one warning per process for this.
//!
//! # Example
//!
//! ```
//! use swrcache::pool::{PoolConfig, Task, TaskSpec, WorkerPool};
//! use std::time::Duration;
//!
//! let pool = WorkerPool::new(PoolConfig::default());
//!
//! let task = pool
//!     .submit(TaskSpec::new("lookup", || {
//!         // expensive work runs on its own thread
//!     }))
//!     .unwrap();
//!
//! task.join(Some(Duration::from_secs(5)));
//! pool.join_all(Duration::from_secs(5));
//! ```

mod config;
mod core;
mod finish;
mod limits;
mod semaphore;
mod stats;
mod task;
mod types;

pub use config::{
    PoolConfig, DEFAULT_FLOOD_WARN_THRESHOLD, DEFAULT_QUEUED_WAIT, DEFAULT_START_RETRY_BUDGET,
};
pub use core::{ProcessSpec, TaskSpec, WorkerPool};
pub use limits::{
    default_instance_limit, instance_limit, HardwareHints, CPU_MULTIPLIER, FALLBACK_CPU_COUNT,
    INSTANCE_LIMIT_MAX, INSTANCE_LIMIT_MIN,
};
pub use stats::PoolStats;
pub use task::{ProcessTask, Task, ThreadTask};
pub use types::{PoolError, TaskId, TaskStatus};
