//! Control API exposed to the outer layer.
//!
//! The [`Scheduler`] is the surface a transport (HTTP, gRPC, CLI) calls
//! into: enqueue, cancel, inspect and aggregate. It owns nothing beyond a
//! queue handle and a store handle; worker supervision lives in
//! [`Pool`](crate::worker::Pool).

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::broadcast;
use uuid::Uuid;

use crate::clock::Clock;
use crate::config::SchedulerConfig;
use crate::models::{Task, TaskSpec, TaskStatus, WorkerInfo};
use crate::queue::{with_deadline, Queue, QueueError, TaskNotification};
use crate::store::Store;

/// Typed control surface over the queue and store.
///
/// Cheap to clone; all clones share the same queue and store.
#[derive(Debug, Clone)]
pub struct Scheduler {
    queue: Queue,
    store: Arc<dyn Store>,
    store_call_timeout: std::time::Duration,
}

impl Scheduler {
    /// Creates a scheduler over `store` with the given clock and config.
    #[must_use]
    pub fn new(store: Arc<dyn Store>, clock: Arc<dyn Clock>, config: &SchedulerConfig) -> Self {
        let queue = Queue::new(store.clone(), clock, config);
        Self {
            queue,
            store,
            store_call_timeout: config.store_call_timeout(),
        }
    }

    /// The queue behind this scheduler, for wiring up a
    /// [`Pool`](crate::worker::Pool).
    #[must_use]
    pub fn queue(&self) -> &Queue {
        &self.queue
    }

    /// Opens a subscription to task change notifications.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<TaskNotification> {
        self.queue.subscribe()
    }

    /// Validates and enqueues a task described by `spec`.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Invalid`] or a [`QueueError::Store`].
    pub async fn enqueue(&self, spec: TaskSpec) -> Result<Task, QueueError> {
        self.queue.enqueue(spec).await
    }

    /// Cancels a `Pending` task.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::NotCancellable`] if the task already started
    /// or finished, or a [`QueueError::Store`].
    pub async fn cancel(&self, id: Uuid) -> Result<Task, QueueError> {
        self.queue.cancel(id).await
    }

    /// Fetches a task by id.
    ///
    /// # Errors
    ///
    /// Returns a [`QueueError::Store`] ([`StoreError::NotFound`] for a
    /// missing id).
    ///
    /// [`StoreError::NotFound`]: crate::store::StoreError::NotFound
    pub async fn get(&self, id: Uuid) -> Result<Task, QueueError> {
        Ok(with_deadline(self.store_call_timeout, self.store.get_task(id)).await?)
    }

    /// Lists tasks ordered by creation time descending.
    ///
    /// # Errors
    ///
    /// Returns a [`QueueError::Store`] if the store call fails.
    pub async fn list(&self, limit: usize, offset: usize) -> Result<Vec<Task>, QueueError> {
        Ok(with_deadline(self.store_call_timeout, self.store.list_tasks(limit, offset)).await?)
    }

    /// Deletes a task record. Admin operation.
    ///
    /// # Errors
    ///
    /// Returns a [`QueueError::Store`] if the task does not exist.
    pub async fn delete(&self, id: Uuid) -> Result<(), QueueError> {
        with_deadline(self.store_call_timeout, self.store.delete_task(id)).await?;
        tracing::info!(task_id = %id, "task deleted");
        Ok(())
    }

    /// Returns the number of tasks in each status.
    ///
    /// # Errors
    ///
    /// Returns a [`QueueError::Store`] if the store call fails.
    pub async fn stats(&self) -> Result<HashMap<TaskStatus, usize>, QueueError> {
        Ok(with_deadline(self.store_call_timeout, self.store.count_by_status()).await?)
    }

    /// Returns the runnable queue depth.
    ///
    /// # Errors
    ///
    /// Returns a [`QueueError::Store`] if the store call fails.
    pub async fn queue_size(&self) -> Result<usize, QueueError> {
        self.queue.size().await
    }

    /// Lists all registered workers.
    ///
    /// # Errors
    ///
    /// Returns a [`QueueError::Store`] if the store call fails.
    pub async fn worker_stats(&self) -> Result<Vec<WorkerInfo>, QueueError> {
        Ok(with_deadline(self.store_call_timeout, self.store.list_workers()).await?)
    }
}
