//! The worker pool: admission-controlled factory and registry for task units.
//!
//! Every piece of concurrent work in the system is created here. The pool
//! admits units through a counting semaphore sized from configuration or
//! hardware hints, tracks them in a registry, and — when a unit terminates —
//! releases one admission slot and wakes one queued unit so that work stuck
//! on resource exhaustion retries promptly instead of only on timeout.

use crate::pool::config::PoolConfig;
use crate::pool::finish::FinishEventTable;
use crate::pool::limits::{self, HardwareHints};
use crate::pool::semaphore::Semaphore;
use crate::pool::stats::{PoolCounters, PoolStats};
use crate::pool::task::{ProcessTask, Task, TaskHooks, TaskOutcome, ThreadTask, Work};
use crate::pool::types::{PoolError, TaskId, TaskStatus};
use std::collections::HashMap;
use std::process::Command;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Specification of a thread-backed unit of work.
pub struct TaskSpec {
    name: String,
    rank: u32,
    synchronizer: Option<Arc<Mutex<()>>>,
    start: bool,
    wait: bool,
    work: Work,
}

impl TaskSpec {
    /// A unit that starts immediately and is not waited on.
    pub fn new(name: impl Into<String>, work: impl FnOnce() + Send + 'static) -> Self {
        Self {
            name: name.into(),
            rank: 0,
            synchronizer: None,
            start: true,
            wait: false,
            work: Box::new(move || {
                work();
                TaskOutcome::Completed
            }),
        }
    }

    /// Set the unit's depth in the calling hierarchy.
    pub fn with_rank(mut self, rank: u32) -> Self {
        self.rank = rank;
        self
    }

    /// Serialize this unit against others sharing the same lock.
    pub fn with_synchronizer(mut self, synchronizer: Arc<Mutex<()>>) -> Self {
        self.synchronizer = Some(synchronizer);
        self
    }

    /// Register the unit without starting it; the caller starts it later.
    pub fn manual_start(mut self) -> Self {
        self.start = false;
        self
    }

    /// Block the submitter until the unit terminates.
    pub fn wait_for_completion(mut self) -> Self {
        self.wait = true;
        self
    }
}

/// Specification of a process-backed unit of work.
pub struct ProcessSpec {
    name: String,
    rank: u32,
    command: Command,
    start: bool,
    wait: bool,
}

impl ProcessSpec {
    /// A process unit that starts immediately and is not waited on.
    pub fn new(name: impl Into<String>, command: Command) -> Self {
        Self {
            name: name.into(),
            rank: 0,
            command,
            start: true,
            wait: false,
        }
    }

    /// Set the unit's depth in the calling hierarchy.
    pub fn with_rank(mut self, rank: u32) -> Self {
        self.rank = rank;
        self
    }

    /// Register the unit without starting it.
    pub fn manual_start(mut self) -> Self {
        self.start = false;
        self
    }

    /// Block the submitter until the process exits.
    pub fn wait_for_completion(mut self) -> Self {
        self.wait = true;
        self
    }
}

/// State shared between the pool handle and its task units.
pub(crate) struct PoolShared {
    config: PoolConfig,
    hints: Option<Arc<dyn HardwareHints>>,
    registry: Mutex<HashMap<TaskId, Arc<dyn Task>>>,
    admission: OnceLock<Option<Semaphore>>,
    finish: FinishEventTable,
    counters: PoolCounters,
    next_id: AtomicU64,
    exhaustion_warned: AtomicBool,
    flood_warned: AtomicBool,
}

impl PoolShared {
    /// The admission semaphore, created on first use.
    ///
    /// `None` when the resolved instance limit is zero (unbounded).
    fn admission(&self) -> &Option<Semaphore> {
        self.admission.get_or_init(|| {
            let limit = self
                .config
                .instance_limit
                .unwrap_or_else(|| limits::instance_limit(self.hints.as_deref()));
            if limit == 0 {
                debug!("worker pool admission disabled (unbounded)");
                None
            } else {
                debug!("worker pool admission limit: {limit}");
                Some(Semaphore::new(limit))
            }
        })
    }

    fn allocate_id(&self) -> TaskId {
        TaskId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Register a constructed unit; the lock is held only for the map insert.
    fn register(&self, task: Arc<dyn Task>) {
        let id = task.id();
        self.registry.lock().unwrap().insert(id, task);
        let active = self.counters.register();
        if active >= self.config.flood_warn_threshold
            && !self.flood_warned.swap(true, Ordering::Relaxed)
        {
            warn!(
                "worker pool has {active} live units; this usually means the \
                 caller spawns units without bounds"
            );
        }
    }
}

impl TaskHooks for PoolShared {
    fn task_exited(&self, id: TaskId) {
        // Idempotent: only the call that actually removes the unit releases
        // an admission slot and signals a queued waiter.
        let removed = self.registry.lock().unwrap().remove(&id);
        if removed.is_some() {
            self.counters.deregister();
            if let Some(semaphore) = self.admission() {
                semaphore.release();
            }
            self.finish.signal_one();
        }
    }

    fn wait_for_finish(&self, rank: u32) {
        let waiter = self.finish.register(rank);
        waiter.wait(self.config.queued_wait);
        self.finish.deregister(rank, &waiter);
    }

    fn report_exhaustion(&self, name: &str) {
        // One user-visible warning per process; exhaustion usually means
        // many previously created units never returned their resources.
        if !self.exhaustion_warned.swap(true, Ordering::Relaxed) {
            warn!(
                "cannot create new task units (last for '{name}'); the system \
                 is out of thread resources - restarting the device usually \
                 clears this"
            );
        } else {
            debug!("task unit creation still exhausted (unit '{name}')");
        }
    }
}

/// Admission-controlled factory and registry for task units.
///
/// # Example
///
/// ```
/// use swrcache::pool::{PoolConfig, Task, TaskSpec, WorkerPool};
/// use std::time::Duration;
///
/// let pool = WorkerPool::new(PoolConfig::default().with_instance_limit(4));
/// let task = pool
///     .submit(TaskSpec::new("warmup", || {
///         // expensive work
///     }))
///     .unwrap();
/// task.join(Some(Duration::from_secs(5)));
/// pool.join_all(Duration::from_secs(5));
/// ```
pub struct WorkerPool {
    shared: Arc<PoolShared>,
}

impl WorkerPool {
    /// Create a pool with the given configuration and no hints provider.
    pub fn new(config: PoolConfig) -> Self {
        Self::with_hints(config, None)
    }

    /// Create a pool that derives its default limit from hardware hints.
    pub fn with_hints(config: PoolConfig, hints: Option<Arc<dyn HardwareHints>>) -> Self {
        Self {
            shared: Arc::new(PoolShared {
                config,
                hints,
                registry: Mutex::new(HashMap::new()),
                admission: OnceLock::new(),
                finish: FinishEventTable::new(),
                counters: PoolCounters::default(),
                next_id: AtomicU64::new(1),
                exhaustion_warned: AtomicBool::new(false),
                flood_warned: AtomicBool::new(false),
            }),
        }
    }

    /// Submit a thread-backed unit of work.
    ///
    /// Blocks while the pool is at its admission limit. The unit is
    /// registered before it is started; when `wait_for_completion` was
    /// requested the join happens after all pool locks are released, so
    /// other threads can keep submitting work.
    pub fn submit(&self, spec: TaskSpec) -> Result<Arc<ThreadTask>, PoolError> {
        if let Some(semaphore) = self.shared.admission() {
            semaphore.acquire();
        }

        let id = self.shared.allocate_id();
        let task = ThreadTask::new(
            id,
            spec.name,
            spec.rank,
            spec.synchronizer,
            spec.work,
            Arc::clone(&self.shared) as Arc<dyn TaskHooks>,
        );
        self.shared.register(Arc::clone(&task) as Arc<dyn Task>);

        if spec.start {
            Arc::clone(&task).start(self.shared.config.start_retry_budget)?;
            if spec.wait {
                task.join(None);
            }
        }
        Ok(task)
    }

    /// Submit a process-backed unit of work.
    pub fn submit_process(&self, spec: ProcessSpec) -> Result<Arc<ProcessTask>, PoolError> {
        if let Some(semaphore) = self.shared.admission() {
            semaphore.acquire();
        }

        let id = self.shared.allocate_id();
        let task = ProcessTask::new(
            id,
            spec.name,
            spec.rank,
            spec.command,
            Arc::clone(&self.shared) as Arc<dyn TaskHooks>,
        );
        self.shared.register(Arc::clone(&task) as Arc<dyn Task>);

        if spec.start {
            Arc::clone(&task).start(self.shared.config.start_retry_budget)?;
            if spec.wait {
                task.join(None);
            }
        }
        Ok(task)
    }

    /// Convenience wrapper: submit and start a named closure.
    pub fn spawn(
        &self,
        name: impl Into<String>,
        work: impl FnOnce() + Send + 'static,
    ) -> Result<Arc<ThreadTask>, PoolError> {
        self.submit(TaskSpec::new(name, work))
    }

    /// Idempotent deregistration hook.
    ///
    /// Safe to call from multiple lifecycle paths for the same unit; only
    /// the first call releases the unit's admission slot.
    pub fn remove(&self, task: &Arc<dyn Task>) {
        self.shared.task_exited(task.id());
    }

    /// Wait for every currently registered unit to terminate.
    ///
    /// Iterates over a snapshot so units removing themselves concurrently
    /// are tolerated. Returns `false` if the timeout elapsed with units
    /// still live.
    pub fn join_all(&self, timeout: Duration) -> bool {
        let snapshot: Vec<Arc<dyn Task>> = {
            let registry = self.shared.registry.lock().unwrap();
            registry.values().cloned().collect()
        };

        let deadline = Instant::now() + timeout;
        let mut all_terminal = true;
        for task in snapshot {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let status = task.join(Some(remaining));
            if !status.is_terminal() {
                warn!("unit '{}' ({}) still {} at shutdown", task.name(), task.id(), status);
                all_terminal = false;
            }
        }
        all_terminal
    }

    /// Number of currently registered units.
    pub fn active_count(&self) -> usize {
        self.stats().active
    }

    /// Number of units ever created.
    pub fn total_created(&self) -> u64 {
        self.stats().total_created
    }

    /// High-water mark of simultaneously registered units.
    pub fn peak_concurrent(&self) -> usize {
        self.stats().peak_concurrent
    }

    /// Telemetry snapshot.
    pub fn stats(&self) -> PoolStats {
        self.shared.counters.snapshot()
    }

    /// The resolved admission limit (0 = unbounded).
    pub fn instance_limit(&self) -> usize {
        self.shared
            .admission()
            .as_ref()
            .map(Semaphore::capacity)
            .unwrap_or(0)
    }

    /// Status of a registered unit, if it is still registered.
    pub fn status_of(&self, id: TaskId) -> Option<TaskStatus> {
        let registry = self.shared.registry.lock().unwrap();
        registry.get(&id).map(|task| task.status())
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let stats = self.stats();
        f.debug_struct("WorkerPool")
            .field("active", &stats.active)
            .field("total_created", &stats.total_created)
            .field("peak_concurrent", &stats.peak_concurrent)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::thread;

    #[test]
    fn submit_runs_work() {
        let pool = WorkerPool::new(PoolConfig::default().with_instance_limit(4));
        let ran = Arc::new(AtomicUsize::new(0));

        let ran_clone = Arc::clone(&ran);
        let task = pool
            .submit(TaskSpec::new("work", move || {
                ran_clone.fetch_add(1, Ordering::SeqCst);
            }))
            .unwrap();

        assert_eq!(task.join(Some(Duration::from_secs(5))), TaskStatus::Finished);
        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn wait_for_completion_blocks_submitter() {
        let pool = WorkerPool::new(PoolConfig::default().with_instance_limit(4));
        let ran = Arc::new(AtomicUsize::new(0));

        let ran_clone = Arc::clone(&ran);
        let task = pool
            .submit(
                TaskSpec::new("blocking", move || {
                    thread::sleep(Duration::from_millis(30));
                    ran_clone.fetch_add(1, Ordering::SeqCst);
                })
                .wait_for_completion(),
            )
            .unwrap();

        // Work already done by the time submit returned.
        assert_eq!(ran.load(Ordering::SeqCst), 1);
        assert!(task.status().is_terminal());
    }

    #[test]
    fn manual_start_defers_execution() {
        let pool = WorkerPool::new(PoolConfig::default().with_instance_limit(4));
        let ran = Arc::new(AtomicUsize::new(0));

        let ran_clone = Arc::clone(&ran);
        let task = pool
            .submit(
                TaskSpec::new("deferred", move || {
                    ran_clone.fetch_add(1, Ordering::SeqCst);
                })
                .manual_start(),
            )
            .unwrap();

        assert_eq!(task.status(), TaskStatus::Initial);
        assert_eq!(ran.load(Ordering::SeqCst), 0);

        Arc::clone(&task).start(1).unwrap();
        task.join(Some(Duration::from_secs(5)));
        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn registry_drains_after_completion() {
        let pool = WorkerPool::new(PoolConfig::default().with_instance_limit(4));

        let task = pool.spawn("drain", || {}).unwrap();
        task.join(Some(Duration::from_secs(5)));

        // The unit removes itself on exit.
        let deadline = Instant::now() + Duration::from_secs(2);
        while pool.active_count() > 0 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(pool.active_count(), 0);
        assert_eq!(pool.total_created(), 1);
    }

    #[test]
    fn admission_bounds_concurrency() {
        let limit = 3;
        let pool = WorkerPool::new(PoolConfig::default().with_instance_limit(limit));
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut tasks = Vec::new();
        for i in 0..10 {
            let running = Arc::clone(&running);
            let peak = Arc::clone(&peak);
            let task = pool
                .submit(TaskSpec::new(format!("bounded-{i}"), move || {
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    thread::sleep(Duration::from_millis(20));
                    running.fetch_sub(1, Ordering::SeqCst);
                }))
                .unwrap();
            tasks.push(task);
        }

        for task in &tasks {
            task.join(Some(Duration::from_secs(10)));
        }
        assert!(
            peak.load(Ordering::SeqCst) <= limit,
            "peak {} exceeded limit {}",
            peak.load(Ordering::SeqCst),
            limit
        );
    }

    #[test]
    fn remove_is_idempotent_for_admission() {
        let pool = WorkerPool::new(PoolConfig::default().with_instance_limit(2));

        let task = pool
            .submit(TaskSpec::new("idem", || {}).manual_start())
            .unwrap();
        let as_task: Arc<dyn Task> = task;

        pool.remove(&as_task);
        pool.remove(&as_task);

        // One slot released, not two: after taking both permits, a third
        // try_acquire must fail.
        let semaphore = pool.shared.admission().as_ref().unwrap();
        assert!(semaphore.try_acquire());
        assert!(semaphore.try_acquire());
        assert!(!semaphore.try_acquire());
    }

    #[test]
    fn join_all_waits_for_everything() {
        let pool = WorkerPool::new(PoolConfig::default().with_instance_limit(8));

        for i in 0..5 {
            pool.spawn(format!("ja-{i}"), || {
                thread::sleep(Duration::from_millis(20));
            })
            .unwrap();
        }

        assert!(pool.join_all(Duration::from_secs(10)));
        assert_eq!(pool.active_count(), 0);
    }

    #[test]
    fn telemetry_tracks_peak() {
        let pool = WorkerPool::new(PoolConfig::default().with_instance_limit(8));

        let mut tasks = Vec::new();
        for i in 0..4 {
            tasks.push(
                pool.spawn(format!("peak-{i}"), || {
                    thread::sleep(Duration::from_millis(50));
                })
                .unwrap(),
            );
        }
        for task in &tasks {
            task.join(Some(Duration::from_secs(5)));
        }

        assert!(pool.peak_concurrent() >= 1);
        assert_eq!(pool.total_created(), 4);
    }

    #[test]
    fn unbounded_pool_admits_everything() {
        let pool = WorkerPool::new(PoolConfig::default().with_instance_limit(0));
        assert_eq!(pool.instance_limit(), 0);

        for i in 0..20 {
            pool.spawn(format!("ub-{i}"), || {}).unwrap();
        }
        assert!(pool.join_all(Duration::from_secs(10)));
    }

    #[cfg(unix)]
    #[test]
    fn process_unit_through_pool() {
        let pool = WorkerPool::new(PoolConfig::default().with_instance_limit(4));
        let task = pool
            .submit_process(ProcessSpec::new("true", Command::new("true")).wait_for_completion())
            .unwrap();
        assert_eq!(task.status(), TaskStatus::Finished);
    }
}
