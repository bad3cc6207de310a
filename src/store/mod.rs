//! Durable record of tasks and workers.
//!
//! The scheduler core depends on the abstract [`Store`] trait; any backend
//! that honors the atomicity contract can stand behind it. The in-memory
//! sorted-set realization ([`MemoryStore`]) ships as the reference
//! implementation and test double; a relational backend would use
//! `SELECT ... FOR UPDATE SKIP LOCKED` for the same contract.

mod error;
mod memory;

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::{Task, TaskStatus, WorkerInfo, WorkerStatus};

pub use error::StoreError;
pub use memory::MemoryStore;

/// An ephemeral, time-bounded claim on a task.
///
/// The `lease_id` identifies the attempt: late completions carrying a
/// superseded lease id are rejected with [`StoreError::LeaseLost`], which
/// keeps duplicate expiries from double-counting retries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lease {
    /// The task this lease claims.
    pub task_id: Uuid,
    /// The worker holding the claim.
    pub worker_id: String,
    /// Unique token for this attempt.
    pub lease_id: Uuid,
    /// When the claim lapses and the sweeper may reclaim the task.
    pub expires_at: DateTime<Utc>,
}

/// A task claimed by `lease_ready`, paired with its lease.
///
/// Workers hold this through execution and hand it back to
/// `Queue::ack` / `Queue::nack` so the store can verify the attempt.
#[derive(Debug, Clone)]
pub struct LeasedTask {
    /// The claimed task, already transitioned to `Running`.
    pub task: Task,
    /// The lease installed for this attempt.
    pub lease: Lease,
}

/// Persistence contract for tasks and workers.
///
/// Concurrency contract: `lease_ready`, `complete_task`, `fail_task`,
/// `reschedule_for_retry` and `expire_leases` are atomic with respect to
/// each other. At most one live lease exists per task id. No operation
/// blocks another indefinitely; the lease TTL bounds recovery latency.
#[async_trait]
pub trait Store: Send + Sync + std::fmt::Debug {
    /// Inserts a new `Pending` task.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::DuplicateId`] if a task with the same id
    /// already exists.
    async fn create_task(&self, task: &Task) -> Result<(), StoreError>;

    /// Fetches a task by id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if the task does not exist.
    async fn get_task(&self, id: Uuid) -> Result<Task, StoreError>;

    /// Writes all mutable fields of a task, refreshing `updated_at`.
    ///
    /// The caller's `updated_at` is the optimistic-concurrency token: if it
    /// no longer matches the stored record the update lost a race.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`], [`StoreError::Conflict`] on a
    /// lost race, or [`StoreError::InvalidTransition`] when trying to move
    /// a terminal task to another status.
    async fn update_task(&self, task: &Task) -> Result<Task, StoreError>;

    /// Lists tasks ordered by `created_at` descending.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the store is unavailable.
    async fn list_tasks(&self, limit: usize, offset: usize) -> Result<Vec<Task>, StoreError>;

    /// Returns the number of tasks in each status. Statuses with no tasks
    /// are present with a zero count.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the store is unavailable.
    async fn count_by_status(&self) -> Result<HashMap<TaskStatus, usize>, StoreError>;

    /// Returns the runnable queue depth: `Pending` tasks whose
    /// `scheduled_at` has passed.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the store is unavailable.
    async fn count_ready(&self) -> Result<usize, StoreError>;

    /// Atomically claims up to `n` eligible tasks for `worker_id`.
    ///
    /// Eligible tasks (`Pending`, `scheduled_at <= now`) are selected in
    /// dispatch order (priority desc, `scheduled_at` asc, `created_at`
    /// asc, id asc), transitioned to `Running` with `started_at = now`,
    /// and a lease expiring at `now + lease_ttl` is installed for each.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the store is unavailable.
    async fn lease_ready(
        &self,
        worker_id: &str,
        n: usize,
        lease_ttl: Duration,
    ) -> Result<Vec<LeasedTask>, StoreError>;

    /// Pushes a live lease's expiry out by `extend_by`, returning the
    /// updated lease. Long-running executors call this through the queue
    /// to keep the sweeper from reclaiming their task.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::LeaseLost`] if `lease_id` is not the live
    /// lease for the task.
    async fn extend_lease(
        &self,
        id: Uuid,
        lease_id: Uuid,
        extend_by: Duration,
    ) -> Result<Lease, StoreError>;

    /// Marks a leased task `Completed`, clearing its error and releasing
    /// the lease.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::LeaseLost`] if `lease_id` is not the live
    /// lease for the task, or [`StoreError::NotFound`].
    async fn complete_task(&self, id: Uuid, lease_id: Uuid) -> Result<Task, StoreError>;

    /// Marks a leased task terminally `Failed`, recording the final retry
    /// count and error, and releasing the lease.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::LeaseLost`] if `lease_id` is not the live
    /// lease for the task, or [`StoreError::NotFound`].
    async fn fail_task(
        &self,
        id: Uuid,
        lease_id: Uuid,
        retries: u32,
        error: &str,
    ) -> Result<Task, StoreError>;

    /// Returns a leased task to `Pending` for a later attempt: clears
    /// `worker_id` and `started_at`, releases the lease, and records the
    /// retry count, error and new `scheduled_at`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::LeaseLost`] if `lease_id` is not the live
    /// lease for the task, or [`StoreError::NotFound`].
    async fn reschedule_for_retry(
        &self,
        id: Uuid,
        lease_id: Uuid,
        new_scheduled_at: DateTime<Utc>,
        retries: u32,
        error: &str,
    ) -> Result<Task, StoreError>;

    /// Reclaims tasks whose lease expired at or before `now`, treating
    /// each as a failed attempt under the retry policy. Returns the number
    /// of leases expired.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the store is unavailable.
    async fn expire_leases(&self, now: DateTime<Utc>) -> Result<usize, StoreError>;

    /// Cancels a `Pending` task.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidTransition`] if the task is not
    /// `Pending`, or [`StoreError::NotFound`].
    async fn cancel_task(&self, id: Uuid) -> Result<Task, StoreError>;

    /// Removes a task record. Admin operation; running tasks keep their
    /// lease until it expires naturally.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if the task does not exist.
    async fn delete_task(&self, id: Uuid) -> Result<(), StoreError>;

    /// Registers a worker, upserting by id. Re-registration refreshes
    /// status and heartbeat but keeps the lifetime task counter.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the store is unavailable.
    async fn register_worker(&self, worker: &WorkerInfo) -> Result<(), StoreError>;

    /// Writes a worker's status and refreshes its heartbeat.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::WorkerNotFound`] if the worker is not
    /// registered.
    async fn update_worker_status(&self, id: &str, status: WorkerStatus)
        -> Result<(), StoreError>;

    /// Increments a worker's lifetime task counter and refreshes its
    /// heartbeat.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::WorkerNotFound`] if the worker is not
    /// registered.
    async fn increment_tasks_run(&self, id: &str) -> Result<(), StoreError>;

    /// Lists all registered workers in registration order.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the store is unavailable.
    async fn list_workers(&self) -> Result<Vec<WorkerInfo>, StoreError>;

    /// Marks workers whose heartbeat is older than `timeout` as `Stopped`.
    /// Returns the number of workers swept.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the store is unavailable.
    async fn cleanup_stale_workers(&self, timeout: Duration) -> Result<usize, StoreError>;
}
