//! Core types for the worker pool.

use std::io;
use thiserror::Error;

/// Unique identifier for a task unit within a pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(pub u64);

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "task-{}", self.0)
    }
}

/// Lifecycle state of a task unit.
///
/// Transitions: `Initial -> Started -> {Running | Queued} -> {Finished | Failed}`.
/// `Queued` is entered only when the operating system refuses to create the
/// physical thread or process; the unit re-attempts `Started` after being
/// signalled or after a bounded timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    /// Created but not yet asked to start.
    Initial,
    /// Start requested, physical unit being created.
    Started,
    /// Physical unit creation refused by the OS; waiting to retry.
    Queued,
    /// User function executing.
    Running,
    /// Terminal: ran to completion (including caught panics).
    Finished,
    /// Terminal: never ran (startup failure or exhausted retry budget).
    Failed,
}

impl TaskStatus {
    /// Whether this is a terminal state.
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Finished | TaskStatus::Failed)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            TaskStatus::Initial => "initial",
            TaskStatus::Started => "started",
            TaskStatus::Queued => "queued",
            TaskStatus::Running => "running",
            TaskStatus::Finished => "finished",
            TaskStatus::Failed => "failed",
        };
        write!(f, "{name}")
    }
}

/// Worker pool errors.
#[derive(Debug, Error)]
pub enum PoolError {
    /// Unit creation kept failing with resource exhaustion until the retry
    /// budget ran out.
    #[error("cannot start task unit after {attempts} attempts: {source}")]
    Exhausted {
        /// Number of creation attempts made.
        attempts: u32,
        /// The last resource-exhaustion error observed.
        source: io::Error,
    },

    /// Unit creation failed with a non-retryable error.
    #[error("failed to start task unit: {0}")]
    Spawn(#[from] io::Error),

    /// The unit kind does not support forced termination.
    #[error("task unit does not support forced termination")]
    TerminateUnsupported,
}

/// Whether a unit-creation failure is worth retrying.
///
/// The OS reports refusal to create another thread or process as resource
/// exhaustion (`EAGAIN` surfaces as [`io::ErrorKind::WouldBlock`]); allocator
/// pressure surfaces as [`io::ErrorKind::OutOfMemory`]. Some platforms only
/// put the refusal in the message, so that is inspected too. Everything
/// else is fatal to the unit.
pub fn is_retryable_spawn_error(err: &io::Error) -> bool {
    if matches!(
        err.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::OutOfMemory
    ) {
        return true;
    }
    let message = err.to_string();
    message.contains("unable to create") || message.contains("Resource temporarily unavailable")
}
