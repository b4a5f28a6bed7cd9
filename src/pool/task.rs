//! Task units: uniform lifecycle wrappers around threads and processes.
//!
//! A task unit owns one physical unit of execution and drives it through
//! the state machine in [`TaskStatus`]. The pool never distinguishes
//! thread-backed from process-backed units; both satisfy [`Task`].
//!
//! Unit creation is the one operation here with a real failure model: the
//! OS can refuse to create another thread or process under resource
//! pressure. That failure is retryable — the unit parks in `Queued`, waits
//! for some other unit to finish (or a bounded timeout), and tries again
//! until its retry budget runs out. All other startup errors fail the unit
//! immediately without touching the rest of the pool.

use crate::pool::types::{is_retryable_spawn_error, PoolError, TaskId, TaskStatus};
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::process::{Child, Command};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::Duration;
use tracing::{debug, error, warn};

/// Poll interval while a process-backed unit waits for its child to exit.
const CHILD_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// What a unit's work reported when it ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TaskOutcome {
    /// Work ran to completion (including caught panics).
    Completed,
    /// The physical payload never ran (e.g. a child process failed to launch).
    Failed,
}

pub(crate) type Work = Box<dyn FnOnce() -> TaskOutcome + Send>;

/// Pool-side hooks a task unit calls as it moves through its lifecycle.
pub(crate) trait TaskHooks: Send + Sync {
    /// The unit reached a terminal state. Called exactly once per unit.
    fn task_exited(&self, id: TaskId);

    /// Park the caller at `rank` until some unit finishes or the pool's
    /// bounded queue wait elapses.
    fn wait_for_finish(&self, rank: u32);

    /// Unit creation kept failing with resource exhaustion.
    fn report_exhaustion(&self, name: &str);
}

/// Hooks that do nothing; used by standalone units and tests.
#[derive(Debug, Default)]
pub(crate) struct NullHooks;

impl TaskHooks for NullHooks {
    fn task_exited(&self, _id: TaskId) {}
    fn wait_for_finish(&self, _rank: u32) {}
    fn report_exhaustion(&self, _name: &str) {}
}

/// Uniform interface over thread-backed and process-backed units.
pub trait Task: Send + Sync {
    /// Unit identifier, unique within its pool.
    fn id(&self) -> TaskId;

    /// Human-readable unit name (also the spawned thread's name).
    fn name(&self) -> &str;

    /// Depth of this unit in the calling hierarchy.
    fn rank(&self) -> u32;

    /// Current lifecycle state.
    fn status(&self) -> TaskStatus;

    /// Create and launch the physical unit, retrying on resource
    /// exhaustion up to `retry_budget` attempts.
    fn start(self: Arc<Self>, retry_budget: u32) -> Result<(), PoolError>;

    /// Block until the unit reaches a terminal state or `timeout` elapses.
    ///
    /// Returns the status observed at the end of the wait; does not itself
    /// force a terminal transition.
    fn join(&self, timeout: Option<Duration>) -> TaskStatus;

    /// Force-stop the unit where the backing kind supports it.
    fn terminate(&self) -> Result<(), PoolError>;
}

// =============================================================================
// Lifecycle core shared by both unit kinds
// =============================================================================

/// Status cell with exactly-once terminal transition semantics.
///
/// Every lifecycle-ending path (normal completion, startup failure, forced
/// termination) converges on [`Lifecycle::finish`]; only the first caller
/// applies the terminal state, so registry-removal side effects never run
/// twice.
#[derive(Debug)]
pub(crate) struct Lifecycle {
    status: Mutex<TaskStatus>,
    cv: Condvar,
}

impl Lifecycle {
    pub(crate) fn new() -> Self {
        Self {
            status: Mutex::new(TaskStatus::Initial),
            cv: Condvar::new(),
        }
    }

    pub(crate) fn status(&self) -> TaskStatus {
        *self.status.lock().unwrap()
    }

    /// Apply a non-terminal transition. Ignored once terminal.
    pub(crate) fn set(&self, status: TaskStatus) {
        debug_assert!(!status.is_terminal());
        let mut current = self.status.lock().unwrap();
        if !current.is_terminal() {
            *current = status;
            self.cv.notify_all();
        }
    }

    /// Apply a terminal transition exactly once.
    ///
    /// Returns `true` for the caller that won; losers see `false` and must
    /// not run terminal side effects.
    pub(crate) fn finish(&self, terminal: TaskStatus) -> bool {
        debug_assert!(terminal.is_terminal());
        let mut current = self.status.lock().unwrap();
        if current.is_terminal() {
            return false;
        }
        *current = terminal;
        self.cv.notify_all();
        true
    }

    /// Wait until terminal or until `timeout` elapses (forever if `None`).
    pub(crate) fn wait_terminal(&self, timeout: Option<Duration>) -> TaskStatus {
        let mut current = self.status.lock().unwrap();
        match timeout {
            None => {
                while !current.is_terminal() {
                    current = self.cv.wait(current).unwrap();
                }
            }
            Some(timeout) => {
                let deadline = std::time::Instant::now() + timeout;
                while !current.is_terminal() {
                    let now = std::time::Instant::now();
                    if now >= deadline {
                        break;
                    }
                    let (guard, _) = self.cv.wait_timeout(current, deadline - now).unwrap();
                    current = guard;
                }
            }
        }
        *current
    }
}

/// Shared creation loop: attempt, classify, queue, retry.
///
/// `retry_budget` counts creation attempts; a budget of zero still makes
/// one attempt. On an exhausted budget the unit fails and the pool is told
/// to raise its (rate-limited) user-facing warning.
fn start_with_retry<F>(
    lifecycle: &Lifecycle,
    hooks: &Arc<dyn TaskHooks>,
    id: TaskId,
    name: &str,
    rank: u32,
    retry_budget: u32,
    mut try_create: F,
) -> Result<(), PoolError>
where
    F: FnMut() -> io::Result<()>,
{
    let attempts = retry_budget.max(1);
    let mut last_err = None;

    for attempt in 1..=attempts {
        lifecycle.set(TaskStatus::Started);
        match try_create() {
            Ok(()) => return Ok(()),
            Err(err) if is_retryable_spawn_error(&err) => {
                debug!(
                    "unit '{}' ({}) creation refused (attempt {}/{}): {}",
                    name, id, attempt, attempts, err
                );
                last_err = Some(err);
                if attempt < attempts {
                    lifecycle.set(TaskStatus::Queued);
                    hooks.wait_for_finish(rank);
                }
            }
            Err(err) => {
                error!("unit '{}' ({}) failed to start: {}", name, id, err);
                if lifecycle.finish(TaskStatus::Failed) {
                    hooks.task_exited(id);
                }
                return Err(PoolError::Spawn(err));
            }
        }
    }

    hooks.report_exhaustion(name);
    if lifecycle.finish(TaskStatus::Failed) {
        hooks.task_exited(id);
    }
    let source =
        last_err.unwrap_or_else(|| io::Error::new(io::ErrorKind::WouldBlock, "no attempt made"));
    Err(PoolError::Exhausted { attempts, source })
}

// =============================================================================
// Thread-backed unit
// =============================================================================

/// Task unit backed by an OS thread.
pub struct ThreadTask {
    id: TaskId,
    name: String,
    rank: u32,
    synchronizer: Option<Arc<Mutex<()>>>,
    lifecycle: Lifecycle,
    work: Mutex<Option<Work>>,
    handle: Mutex<Option<thread::JoinHandle<()>>>,
    hooks: Arc<dyn TaskHooks>,
}

impl ThreadTask {
    pub(crate) fn new(
        id: TaskId,
        name: String,
        rank: u32,
        synchronizer: Option<Arc<Mutex<()>>>,
        work: Work,
        hooks: Arc<dyn TaskHooks>,
    ) -> Arc<Self> {
        Arc::new(Self {
            id,
            name,
            rank,
            synchronizer,
            lifecycle: Lifecycle::new(),
            work: Mutex::new(Some(work)),
            handle: Mutex::new(None),
            hooks,
        })
    }

    /// Thread body: run the work under panic isolation.
    fn run(self: Arc<Self>) {
        let work = self.work.lock().unwrap().take();
        let _guard = self.synchronizer.as_ref().map(|m| m.lock().unwrap());

        self.lifecycle.set(TaskStatus::Running);
        let outcome = match work {
            Some(work) => match panic::catch_unwind(AssertUnwindSafe(work)) {
                Ok(outcome) => outcome,
                Err(_) => {
                    warn!("task unit '{}' ({}) panicked; result discarded", self.name, self.id);
                    TaskOutcome::Completed
                }
            },
            // A racing terminate() already took the work.
            None => TaskOutcome::Completed,
        };

        let terminal = match outcome {
            TaskOutcome::Completed => TaskStatus::Finished,
            TaskOutcome::Failed => TaskStatus::Failed,
        };
        if self.lifecycle.finish(terminal) {
            self.hooks.task_exited(self.id);
        }
    }

    #[cfg(test)]
    fn start_with<F>(&self, retry_budget: u32, try_create: F) -> Result<(), PoolError>
    where
        F: FnMut() -> io::Result<()>,
    {
        start_with_retry(
            &self.lifecycle,
            &self.hooks,
            self.id,
            &self.name,
            self.rank,
            retry_budget,
            try_create,
        )
    }
}

impl Task for ThreadTask {
    fn id(&self) -> TaskId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn rank(&self) -> u32 {
        self.rank
    }

    fn status(&self) -> TaskStatus {
        self.lifecycle.status()
    }

    fn start(self: Arc<Self>, retry_budget: u32) -> Result<(), PoolError> {
        let task = Arc::clone(&self);
        start_with_retry(
            &self.lifecycle,
            &self.hooks,
            self.id,
            &self.name,
            self.rank,
            retry_budget,
            move || {
                let body = Arc::clone(&task);
                let handle = thread::Builder::new()
                    .name(format!("swr-{}", task.id))
                    .spawn(move || body.run())?;
                *task.handle.lock().unwrap() = Some(handle);
                Ok(())
            },
        )
    }

    fn join(&self, timeout: Option<Duration>) -> TaskStatus {
        let status = self.lifecycle.wait_terminal(timeout);
        if status.is_terminal() {
            // Reap the OS thread; it is exiting or already gone.
            if let Some(handle) = self.handle.lock().unwrap().take() {
                if handle.join().is_err() {
                    warn!("task unit '{}' ({}) thread panicked on exit", self.name, self.id);
                }
            }
        }
        status
    }

    fn terminate(&self) -> Result<(), PoolError> {
        // A thread cannot be force-stopped once its work is running; the
        // most we can do is cancel work that has not been picked up yet.
        let cancelled = self.work.lock().unwrap().take().is_some();
        if cancelled {
            debug!("task unit '{}' ({}) cancelled before running", self.name, self.id);
            if self.lifecycle.finish(TaskStatus::Failed) {
                self.hooks.task_exited(self.id);
            }
            Ok(())
        } else if self.status().is_terminal() {
            Ok(())
        } else {
            Err(PoolError::TerminateUnsupported)
        }
    }
}

impl std::fmt::Debug for ThreadTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadTask")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("rank", &self.rank)
            .field("status", &self.status())
            .finish()
    }
}

// =============================================================================
// Process-backed unit
// =============================================================================

/// Task unit backed by an OS process.
///
/// A monitor thread launches the child and watches it to exit; `terminate`
/// kills the child and lets the monitor drive the normal terminal
/// transition, so both unit kinds share one lifecycle path.
pub struct ProcessTask {
    id: TaskId,
    name: String,
    rank: u32,
    lifecycle: Lifecycle,
    command: Mutex<Option<Command>>,
    child: Mutex<Option<Child>>,
    handle: Mutex<Option<thread::JoinHandle<()>>>,
    hooks: Arc<dyn TaskHooks>,
}

impl ProcessTask {
    pub(crate) fn new(
        id: TaskId,
        name: String,
        rank: u32,
        command: Command,
        hooks: Arc<dyn TaskHooks>,
    ) -> Arc<Self> {
        Arc::new(Self {
            id,
            name,
            rank,
            lifecycle: Lifecycle::new(),
            command: Mutex::new(Some(command)),
            child: Mutex::new(None),
            handle: Mutex::new(None),
            hooks,
        })
    }

    /// Monitor thread body: launch the child and poll it to completion.
    fn run(self: Arc<Self>) {
        let command = self.command.lock().unwrap().take();
        self.lifecycle.set(TaskStatus::Running);

        let outcome = match command {
            Some(mut command) => match command.spawn() {
                Ok(child) => {
                    *self.child.lock().unwrap() = Some(child);
                    self.watch_child()
                }
                Err(err) => {
                    error!("process unit '{}' ({}) failed to launch: {}", self.name, self.id, err);
                    TaskOutcome::Failed
                }
            },
            // A racing terminate() already cancelled the launch.
            None => TaskOutcome::Completed,
        };

        let terminal = match outcome {
            TaskOutcome::Completed => TaskStatus::Finished,
            TaskOutcome::Failed => TaskStatus::Failed,
        };
        if self.lifecycle.finish(terminal) {
            self.hooks.task_exited(self.id);
        }
    }

    /// Poll the child in short intervals so `terminate` can take the lock.
    fn watch_child(&self) -> TaskOutcome {
        loop {
            let mut guard = self.child.lock().unwrap();
            let Some(child) = guard.as_mut() else {
                return TaskOutcome::Completed;
            };
            match child.try_wait() {
                Ok(Some(status)) => {
                    debug!("process unit '{}' ({}) exited: {}", self.name, self.id, status);
                    guard.take();
                    return TaskOutcome::Completed;
                }
                Ok(None) => {
                    drop(guard);
                    thread::sleep(CHILD_POLL_INTERVAL);
                }
                Err(err) => {
                    warn!("process unit '{}' ({}) wait failed: {}", self.name, self.id, err);
                    guard.take();
                    return TaskOutcome::Completed;
                }
            }
        }
    }
}

impl Task for ProcessTask {
    fn id(&self) -> TaskId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn rank(&self) -> u32 {
        self.rank
    }

    fn status(&self) -> TaskStatus {
        self.lifecycle.status()
    }

    fn start(self: Arc<Self>, retry_budget: u32) -> Result<(), PoolError> {
        let task = Arc::clone(&self);
        start_with_retry(
            &self.lifecycle,
            &self.hooks,
            self.id,
            &self.name,
            self.rank,
            retry_budget,
            move || {
                let body = Arc::clone(&task);
                let handle = thread::Builder::new()
                    .name(format!("swr-{}", task.id))
                    .spawn(move || body.run())?;
                *task.handle.lock().unwrap() = Some(handle);
                Ok(())
            },
        )
    }

    fn join(&self, timeout: Option<Duration>) -> TaskStatus {
        let status = self.lifecycle.wait_terminal(timeout);
        if status.is_terminal() {
            if let Some(handle) = self.handle.lock().unwrap().take() {
                if handle.join().is_err() {
                    warn!("process unit '{}' ({}) monitor panicked on exit", self.name, self.id);
                }
            }
        }
        status
    }

    fn terminate(&self) -> Result<(), PoolError> {
        if let Some(child) = self.child.lock().unwrap().as_mut() {
            // Monitor observes the exit and drives the terminal transition.
            if let Err(err) = child.kill() {
                if err.kind() != io::ErrorKind::InvalidInput {
                    return Err(PoolError::Spawn(err));
                }
            }
            return Ok(());
        }
        // Not launched yet: cancel the pending command.
        let cancelled = self.command.lock().unwrap().take().is_some();
        if cancelled {
            debug!("process unit '{}' ({}) cancelled before launch", self.name, self.id);
            if self.lifecycle.finish(TaskStatus::Failed) {
                self.hooks.task_exited(self.id);
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for ProcessTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessTask")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("rank", &self.rank)
            .field("status", &self.status())
            .finish()
    }
}
