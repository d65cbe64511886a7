//! Fixed worker pool that repeatedly drives cooperative tasks.
//!
//! Workers share one ready queue guarded by a mutex/condvar pair. A worker
//! removes a task, runs one step outside the lock, then puts it back at the
//! tail. Removal is what keeps a task from running on two workers at once:
//! while it runs it is simply not in the queue.

pub mod backoff;
pub mod task;

pub use backoff::IdleBackoff;
pub use task::{Progress, StepFn, TaskId};

use crate::defaults;
use crate::error::{Error, Result};
use crate::pipeline::error::{ErrorReporter, LogReporter, StageError};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use task::Task;

/// Scheduler tuning.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Worker threads spawned by `start_default`.
    pub workers: usize,
    /// Consecutive Idle steps before a worker starts sleeping.
    pub idle_threshold: usize,
    /// Sleep applied per step once past the threshold.
    pub idle_backoff_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            workers: defaults::WORKER_COUNT,
            idle_threshold: defaults::IDLE_THRESHOLD,
            idle_backoff_ms: defaults::IDLE_BACKOFF_MS,
        }
    }
}

impl SchedulerConfig {
    pub fn idle_backoff(&self) -> Duration {
        Duration::from_millis(self.idle_backoff_ms)
    }
}

/// Point-in-time copy of the scheduler counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Steps executed.
    pub dispatched: u64,
    pub busy: u64,
    pub idle: u64,
    /// Tasks dropped after a fatal error or panic.
    pub aborted: u64,
    /// Backoff sleeps taken across all workers.
    pub backoff_sleeps: u64,
}

#[derive(Debug, Default)]
struct Stats {
    dispatched: AtomicU64,
    busy: AtomicU64,
    idle: AtomicU64,
    aborted: AtomicU64,
    backoff_sleeps: AtomicU64,
}

impl Stats {
    fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            dispatched: self.dispatched.load(Ordering::Relaxed),
            busy: self.busy.load(Ordering::Relaxed),
            idle: self.idle.load(Ordering::Relaxed),
            aborted: self.aborted.load(Ordering::Relaxed),
            backoff_sleeps: self.backoff_sleeps.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Default)]
struct ReadyQueue {
    tasks: VecDeque<Task>,
    stopping: bool,
}

struct Shared {
    ready: Mutex<ReadyQueue>,
    available: Condvar,
    idle_threshold: usize,
    idle_backoff: Duration,
    stats: Stats,
    registered: AtomicUsize,
    reporter: Arc<dyn ErrorReporter>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, ReadyQueue> {
        // Tasks never run under this lock, so poisoning would mean a bug in
        // the queue code itself; the queue is still structurally valid.
        self.ready.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Blocks until a task is ready, or returns `None` once stopping.
    fn next_task(&self) -> Option<Task> {
        let mut ready = self.lock();
        loop {
            if ready.stopping {
                return None;
            }
            if let Some(task) = ready.tasks.pop_front() {
                return Some(task);
            }
            ready = self
                .available
                .wait(ready)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    fn requeue(&self, task: Task) {
        self.lock().tasks.push_back(task);
        self.available.notify_one();
    }

    /// Runs one step, isolating failures to the task.
    ///
    /// Returns `None` when the task must be dropped.
    fn execute(&self, task: &mut Task) -> Option<Progress> {
        self.stats.dispatched.fetch_add(1, Ordering::Relaxed);
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| task.run()));
        let result = match outcome {
            Ok(result) => result,
            Err(payload) => Err(StageError::Fatal(format!(
                "step panicked: {}",
                panic_message(payload.as_ref())
            ))),
        };

        match result {
            Ok(progress) => {
                let counter = match progress {
                    Progress::Busy => &self.stats.busy,
                    Progress::Idle => &self.stats.idle,
                };
                counter.fetch_add(1, Ordering::Relaxed);
                Some(progress)
            }
            Err(error @ StageError::Recoverable(_)) => {
                self.reporter.report(task.name(), &error);
                self.stats.idle.fetch_add(1, Ordering::Relaxed);
                Some(Progress::Idle)
            }
            Err(error @ StageError::Fatal(_)) => {
                self.reporter.report(task.name(), &error);
                self.stats.aborted.fetch_add(1, Ordering::Relaxed);
                self.registered.fetch_sub(1, Ordering::SeqCst);
                log::warn!("Aborting {} ({})", task.id(), task.name());
                None
            }
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(|s| s.as_str()))
        .unwrap_or("unknown panic")
}

fn worker_loop(shared: &Shared, index: usize) {
    let mut backoff = IdleBackoff::new(shared.idle_threshold);
    log::debug!("Worker {} started", index);

    while let Some(mut task) = shared.next_task() {
        let progress = match shared.execute(&mut task) {
            Some(progress) => {
                shared.requeue(task);
                progress
            }
            None => Progress::Idle,
        };

        if backoff.record(progress) {
            shared.stats.backoff_sleeps.fetch_add(1, Ordering::Relaxed);
            thread::sleep(shared.idle_backoff);
        }
    }

    log::debug!("Worker {} exiting", index);
}

/// Owns the worker pool and the shared ready queue.
pub struct TaskScheduler {
    shared: Arc<Shared>,
    workers: Vec<JoinHandle<()>>,
    next_id: AtomicU64,
    default_workers: usize,
}

impl TaskScheduler {
    /// Creates a stopped scheduler. Tasks may be submitted before `start`.
    pub fn new(config: SchedulerConfig) -> Self {
        Self::with_error_reporter(config, Arc::new(LogReporter))
    }

    /// Creates a stopped scheduler with a custom error reporter.
    pub fn with_error_reporter(config: SchedulerConfig, reporter: Arc<dyn ErrorReporter>) -> Self {
        Self {
            shared: Arc::new(Shared {
                ready: Mutex::new(ReadyQueue::default()),
                available: Condvar::new(),
                idle_threshold: config.idle_threshold,
                idle_backoff: config.idle_backoff(),
                stats: Stats::default(),
                registered: AtomicUsize::new(0),
                reporter,
            }),
            workers: Vec::new(),
            next_id: AtomicU64::new(1),
            default_workers: config.workers,
        }
    }

    /// Adds a task to the tail of the ready queue and wakes one worker.
    pub fn submit<F>(&self, name: impl Into<String>, step: F) -> TaskId
    where
        F: FnMut() -> std::result::Result<Progress, StageError> + Send + 'static,
    {
        let id = TaskId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let task = Task::new(id, name.into(), Box::new(step));
        log::debug!("Submitting {} ({})", id, task.name());

        self.shared.registered.fetch_add(1, Ordering::SeqCst);
        self.shared.requeue(task);
        id
    }

    /// Spawns `workers` threads running the scheduling loop.
    pub fn start(&mut self, workers: usize) -> Result<()> {
        if workers == 0 {
            return Err(Error::InvalidWorkerCount { count: workers });
        }
        if !self.workers.is_empty() {
            return Err(Error::SchedulerRunning {
                workers: self.workers.len(),
            });
        }

        self.shared.lock().stopping = false;
        for index in 0..workers {
            let shared = Arc::clone(&self.shared);
            let spawned = thread::Builder::new()
                .name(format!("stagepipe-worker{}", index))
                .spawn(move || worker_loop(&shared, index));

            match spawned {
                Ok(handle) => self.workers.push(handle),
                Err(source) => {
                    self.stop();
                    return Err(Error::WorkerSpawn { index, source });
                }
            }
        }

        log::info!("Scheduler started with {} workers", workers);
        Ok(())
    }

    /// Starts the worker count given in the scheduler config.
    pub fn start_default(&mut self) -> Result<()> {
        self.start(self.default_workers)
    }

    /// Signals every worker to exit after its current step and joins them.
    ///
    /// In-flight steps complete and their tasks are put back, so a later
    /// `start` resumes them. Calling `stop` on a stopped scheduler is a no-op.
    pub fn stop(&mut self) {
        if self.workers.is_empty() {
            return;
        }

        self.shared.lock().stopping = true;
        self.shared.available.notify_all();

        for handle in self.workers.drain(..) {
            let name = handle.thread().name().unwrap_or("worker").to_string();
            if handle.join().is_err() {
                log::error!("Scheduler thread '{}' panicked", name);
            }
        }
        log::info!("Scheduler stopped");
    }

    pub fn is_running(&self) -> bool {
        !self.workers.is_empty()
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Tasks that are still scheduled (queued or running).
    pub fn registered_tasks(&self) -> usize {
        self.shared.registered.load(Ordering::SeqCst)
    }

    /// Tasks currently waiting in the ready queue.
    pub fn queued_tasks(&self) -> usize {
        self.shared.lock().tasks.len()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.shared.stats.snapshot()
    }
}

impl Drop for TaskScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}
