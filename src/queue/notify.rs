//! Best-effort change notifications.
//!
//! The queue broadcasts a small envelope whenever a task changes status.
//! Delivery is lossy: sends never block, and a slow subscriber drops the
//! oldest messages from its buffer. Consumers must be idempotent.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::models::TaskStatus;

/// Default buffer size per subscriber.
const DEFAULT_CAPACITY: usize = 256;

/// Change notification envelope.
///
/// Opaque to subscribers except these fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskNotification {
    /// Id of the task that changed.
    pub task_id: Uuid,
    /// The status the task moved to.
    pub status: TaskStatus,
    /// Unix seconds when the change was published.
    pub ts: i64,
}

/// Lossy fan-out publisher for [`TaskNotification`]s.
#[derive(Debug, Clone)]
pub struct Notifier {
    tx: broadcast::Sender<TaskNotification>,
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl Notifier {
    /// Creates a notifier whose subscribers buffer up to `capacity`
    /// messages before dropping the oldest.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Opens a new subscription.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<TaskNotification> {
        self.tx.subscribe()
    }

    /// Publishes a notification. Never blocks; a send with no subscribers
    /// is silently dropped.
    pub fn publish(&self, notification: TaskNotification) {
        let _ = self.tx.send(notification);
    }
}
