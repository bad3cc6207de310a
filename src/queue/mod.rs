//! Queue facade over the store ordering contract.
//!
//! The queue is a thin, typed layer that stamps and validates new tasks,
//! delegates lease/ack/nack to the store's atomic operations, owns the
//! retry policy applied on nack, and broadcasts change notifications.

mod notify;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use thiserror::Error;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::clock::Clock;
use crate::config::SchedulerConfig;
use crate::models::{BackoffPolicy, Task, TaskError, TaskSpec, TaskStatus};
use crate::store::{LeasedTask, Store, StoreError};

pub use notify::{Notifier, TaskNotification};

/// Errors surfaced by the queue facade and the control API.
#[derive(Debug, Error)]
pub enum QueueError {
    /// The task descriptor failed validation.
    #[error("invalid task: {0}")]
    Invalid(String),

    /// Cancellation was requested for a task that is no longer `Pending`.
    #[error("task {id} is not cancellable (status {status})")]
    NotCancellable {
        /// Id of the task.
        id: Uuid,
        /// The status the task was found in.
        status: TaskStatus,
    },

    /// An underlying store operation failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Applies the store-call deadline to a store future.
pub(crate) async fn with_deadline<T>(
    deadline: Duration,
    fut: impl Future<Output = Result<T, StoreError>>,
) -> Result<T, StoreError> {
    match tokio::time::timeout(deadline, fut).await {
        Ok(result) => result,
        Err(_) => Err(StoreError::Unavailable(format!(
            "store call exceeded {deadline:?}"
        ))),
    }
}

/// Priority-ordered view over the store's pending tasks.
///
/// Cheap to clone; all clones share the store, clock and notifier.
#[derive(Debug, Clone)]
pub struct Queue {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    backoff: BackoffPolicy,
    lease_ttl: Duration,
    store_call_timeout: Duration,
    notifier: Notifier,
}

impl Queue {
    /// Creates a queue over `store` with the configured lease TTL, store
    /// deadline and retry backoff.
    #[must_use]
    pub fn new(store: Arc<dyn Store>, clock: Arc<dyn Clock>, config: &SchedulerConfig) -> Self {
        Self {
            store,
            clock,
            backoff: config.backoff(),
            lease_ttl: config.lease_ttl(),
            store_call_timeout: config.store_call_timeout(),
            notifier: Notifier::default(),
        }
    }

    /// The store behind this queue.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// The clock this queue stamps timestamps with.
    #[must_use]
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Opens a subscription to change notifications.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<TaskNotification> {
        self.notifier.subscribe()
    }

    async fn call<T>(
        &self,
        fut: impl Future<Output = Result<T, StoreError>>,
    ) -> Result<T, StoreError> {
        with_deadline(self.store_call_timeout, fut).await
    }

    fn notify(&self, task: &Task) {
        self.notifier.publish(TaskNotification {
            task_id: task.id,
            status: task.status,
            ts: self.clock.now().timestamp(),
        });
    }

    /// Validates a descriptor, stamps server-assigned fields and persists
    /// the new `Pending` task.
    ///
    /// Defaults: priority medium, max_retries 3, `scheduled_at` = now.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Invalid`] when name or type is empty, or a
    /// [`QueueError::Store`] from persistence.
    pub async fn enqueue(&self, spec: TaskSpec) -> Result<Task, QueueError> {
        if spec.name.trim().is_empty() {
            return Err(QueueError::Invalid("task name must not be empty".into()));
        }
        if spec.task_type.trim().is_empty() {
            return Err(QueueError::Invalid("task type must not be empty".into()));
        }

        let now = self.clock.now();
        let task = Task {
            id: Uuid::now_v7(),
            name: spec.name,
            task_type: spec.task_type,
            payload: spec.payload,
            priority: spec.priority.unwrap_or_default(),
            status: TaskStatus::Pending,
            retries: 0,
            max_retries: spec.max_retries.unwrap_or(crate::models::DEFAULT_MAX_RETRIES),
            created_at: now,
            updated_at: now,
            scheduled_at: spec.scheduled_at.unwrap_or(now),
            started_at: None,
            completed_at: None,
            error: String::new(),
            worker_id: None,
        };

        self.call(self.store.create_task(&task)).await?;

        counter!("taskmill.tasks.enqueued", "task_type" => task.task_type.clone()).increment(1);
        tracing::info!(
            task_id = %task.id,
            task_type = %task.task_type,
            priority = task.priority.as_i32(),
            scheduled_at = %task.scheduled_at,
            "task enqueued"
        );
        self.notify(&task);
        Ok(task)
    }

    /// Claims up to `n` eligible tasks for `worker_id`, installing leases
    /// with the configured TTL. Returns an empty batch when nothing is
    /// eligible.
    ///
    /// # Errors
    ///
    /// Returns a [`QueueError::Store`] if the store call fails.
    pub async fn lease(&self, worker_id: &str, n: usize) -> Result<Vec<LeasedTask>, QueueError> {
        let leased = self
            .call(self.store.lease_ready(worker_id, n, self.lease_ttl))
            .await?;
        if !leased.is_empty() {
            counter!("taskmill.leases.acquired", "worker_id" => worker_id.to_string())
                .increment(leased.len() as u64);
        }
        Ok(leased)
    }

    /// Extends a held lease by `additional`, updating the lease in place.
    ///
    /// Long-running executors call this periodically so the sweeper does
    /// not reclaim their task mid-execution.
    ///
    /// # Errors
    ///
    /// Returns a [`QueueError::Store`] ([`StoreError::LeaseLost`] when the
    /// lease already expired and the attempt was resolved).
    pub async fn extend(
        &self,
        leased: &mut LeasedTask,
        additional: Duration,
    ) -> Result<(), QueueError> {
        let lease = self
            .call(
                self.store
                    .extend_lease(leased.task.id, leased.lease.lease_id, additional),
            )
            .await?;
        tracing::debug!(
            task_id = %leased.task.id,
            expires_at = %lease.expires_at,
            "lease extended"
        );
        leased.lease = lease;
        Ok(())
    }

    /// Resolves an attempt with a terminal status.
    ///
    /// `Completed` clears the error; `Failed` records `error` without
    /// touching the retry counter (the attempt already failed through
    /// [`nack`](Self::nack) semantics).
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Invalid`] for a non-terminal status, or a
    /// [`QueueError::Store`] (notably [`StoreError::LeaseLost`] when the
    /// attempt was already resolved).
    pub async fn ack(
        &self,
        leased: &LeasedTask,
        status: TaskStatus,
        error: Option<&str>,
    ) -> Result<Task, QueueError> {
        let id = leased.task.id;
        let lease_id = leased.lease.lease_id;
        let task = match status {
            TaskStatus::Completed => {
                let task = self.call(self.store.complete_task(id, lease_id)).await?;
                counter!("taskmill.tasks.completed", "task_type" => task.task_type.clone())
                    .increment(1);
                task
            }
            TaskStatus::Failed => {
                let task = self
                    .call(self.store.fail_task(
                        id,
                        lease_id,
                        leased.task.retries,
                        error.unwrap_or(""),
                    ))
                    .await?;
                counter!(
                    "taskmill.tasks.failed",
                    "task_type" => task.task_type.clone(),
                    "reason" => "acked"
                )
                .increment(1);
                task
            }
            other => {
                return Err(QueueError::Invalid(format!(
                    "ack requires Completed or Failed, got {other}"
                )));
            }
        };
        tracing::info!(task_id = %task.id, status = %task.status, "task acked");
        self.notify(&task);
        Ok(task)
    }

    /// Reports a failed attempt and applies the retry policy.
    ///
    /// Retryable errors increment the retry counter and reschedule with
    /// quadratic backoff while budget remains, then fail terminally.
    /// Permanent errors fail immediately without consuming retry budget.
    ///
    /// # Errors
    ///
    /// Returns a [`QueueError::Store`] (notably [`StoreError::LeaseLost`]
    /// when the attempt was already resolved by the sweeper).
    pub async fn nack(&self, leased: &LeasedTask, err: &TaskError) -> Result<Task, QueueError> {
        let id = leased.task.id;
        let lease_id = leased.lease.lease_id;
        let message = err.to_string();
        let task_type = leased.task.task_type.clone();

        let task = if !err.is_retryable() {
            counter!("taskmill.tasks.failed", "task_type" => task_type, "reason" => "permanent")
                .increment(1);
            self.call(
                self.store
                    .fail_task(id, lease_id, leased.task.retries, &message),
            )
            .await?
        } else {
            let retries = leased.task.retries + 1;
            if retries < leased.task.max_retries {
                let retry_at = self.backoff.schedule_after(self.clock.now(), retries);
                counter!("taskmill.tasks.retried", "task_type" => task_type).increment(1);
                let task = self
                    .call(self.store.reschedule_for_retry(
                        id,
                        lease_id,
                        retry_at,
                        retries,
                        &message,
                    ))
                    .await?;
                tracing::info!(
                    task_id = %task.id,
                    retries = task.retries,
                    max_retries = task.max_retries,
                    scheduled_at = %task.scheduled_at,
                    error = %message,
                    "task rescheduled for retry"
                );
                self.notify(&task);
                return Ok(task);
            }
            counter!(
                "taskmill.tasks.failed",
                "task_type" => task_type,
                "reason" => "retries_exhausted"
            )
            .increment(1);
            self.call(self.store.fail_task(id, lease_id, retries, &message))
                .await?
        };

        tracing::warn!(
            task_id = %task.id,
            retries = task.retries,
            error = %task.error,
            "task failed permanently"
        );
        self.notify(&task);
        Ok(task)
    }

    /// Cancels a `Pending` task.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::NotCancellable`] if the task has already
    /// started or finished, or a [`QueueError::Store`].
    pub async fn cancel(&self, id: Uuid) -> Result<Task, QueueError> {
        let task = match self.call(self.store.cancel_task(id)).await {
            Ok(task) => task,
            Err(StoreError::InvalidTransition { id, from }) => {
                return Err(QueueError::NotCancellable { id, status: from });
            }
            Err(err) => return Err(err.into()),
        };
        counter!("taskmill.tasks.cancelled").increment(1);
        tracing::info!(task_id = %task.id, "task cancelled");
        self.notify(&task);
        Ok(task)
    }

    /// Returns the runnable queue depth: `Pending` tasks whose
    /// `scheduled_at` has passed.
    ///
    /// # Errors
    ///
    /// Returns a [`QueueError::Store`] if the store call fails.
    pub async fn size(&self) -> Result<usize, QueueError> {
        Ok(self.call(self.store.count_ready()).await?)
    }
}
