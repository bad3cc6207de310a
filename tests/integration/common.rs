//! Shared harness for the integration scenarios.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use uuid::Uuid;

use taskmill::{
    ExecutorRegistry, MemoryStore, Pool, Scheduler, SchedulerConfig, SystemClock, Task, TaskError,
    TaskExecutor, TaskStatus,
};

/// Config tuned for tests: tight polling and a 20ms backoff base, so a
/// full retry timeline (20ms, 80ms, 180ms) fits comfortably in a test.
pub fn fast_config(worker_count: usize) -> SchedulerConfig {
    SchedulerConfig {
        worker_count,
        poll_interval_ms: 10,
        backoff_base_ms: 20,
        ..SchedulerConfig::default()
    }
}

pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub scheduler: Scheduler,
    pub pool: Pool,
}

/// Builds a scheduler plus pool over a fresh in-memory store with the
/// built-in executors registered.
pub fn harness(worker_count: usize) -> Harness {
    harness_with(fast_config(worker_count), ExecutorRegistry::with_builtin())
}

/// Builds a harness with a custom config and executor registry.
pub fn harness_with(config: SchedulerConfig, executors: ExecutorRegistry) -> Harness {
    let clock = Arc::new(SystemClock);
    let store = Arc::new(MemoryStore::with_clock(clock.clone()).with_backoff(config.backoff()));
    let scheduler = Scheduler::new(store.clone(), clock, &config);
    let pool = Pool::new(scheduler.queue().clone(), Arc::new(executors), config);
    Harness {
        store,
        scheduler,
        pool,
    }
}

/// Polls until the task reaches `status` or the timeout elapses.
pub async fn wait_for_status(
    scheduler: &Scheduler,
    id: Uuid,
    status: TaskStatus,
    timeout: Duration,
) -> Task {
    let deadline = Instant::now() + timeout;
    loop {
        let task = scheduler.get(id).await.expect("task should exist");
        if task.status == status {
            return task;
        }
        assert!(
            Instant::now() < deadline,
            "timed out waiting for status {status}; task: {task:?}"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Fails a configurable number of attempts, then succeeds.
pub struct FlakyExecutor {
    task_type: String,
    failures_remaining: AtomicU32,
}

impl FlakyExecutor {
    pub fn new(task_type: impl Into<String>, failures: u32) -> Self {
        Self {
            task_type: task_type.into(),
            failures_remaining: AtomicU32::new(failures),
        }
    }
}

#[async_trait]
impl TaskExecutor for FlakyExecutor {
    fn task_type(&self) -> &str {
        &self.task_type
    }

    async fn execute(&self, _task: &Task) -> Result<(), TaskError> {
        let remaining = self
            .failures_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .unwrap_or(0);
        if remaining > 0 {
            Err(TaskError::Retryable(format!(
                "transient failure ({} left)",
                remaining - 1
            )))
        } else {
            Ok(())
        }
    }
}

/// Always fails with a retryable error carrying the attempt number.
pub struct AlwaysFailExecutor {
    task_type: String,
    attempts: AtomicU32,
}

impl AlwaysFailExecutor {
    pub fn new(task_type: impl Into<String>) -> Self {
        Self {
            task_type: task_type.into(),
            attempts: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl TaskExecutor for AlwaysFailExecutor {
    fn task_type(&self) -> &str {
        &self.task_type
    }

    async fn execute(&self, _task: &Task) -> Result<(), TaskError> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        Err(TaskError::Retryable(format!("attempt {attempt} failed")))
    }
}

/// Records the names of tasks it executes, in completion order.
pub struct RecordingExecutor {
    task_type: String,
    log: Arc<Mutex<Vec<String>>>,
}

impl RecordingExecutor {
    pub fn new(task_type: impl Into<String>) -> (Self, Arc<Mutex<Vec<String>>>) {
        let log = Arc::new(Mutex::new(Vec::new()));
        (
            Self {
                task_type: task_type.into(),
                log: log.clone(),
            },
            log,
        )
    }
}

#[async_trait]
impl TaskExecutor for RecordingExecutor {
    fn task_type(&self) -> &str {
        &self.task_type
    }

    async fn execute(&self, task: &Task) -> Result<(), TaskError> {
        self.log
            .lock()
            .expect("recording log lock poisoned")
            .push(task.name.clone());
        Ok(())
    }
}
