use thiserror::Error;
use uuid::Uuid;

use crate::models::TaskStatus;

/// Errors returned by [`Store`](super::Store) implementations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// The requested task does not exist.
    #[error("task not found: {id}")]
    NotFound {
        /// Id of the missing task.
        id: Uuid,
    },

    /// A task with this id already exists.
    #[error("task already exists: {id}")]
    DuplicateId {
        /// Id of the conflicting task.
        id: Uuid,
    },

    /// An optimistic update lost a race with a concurrent writer.
    /// The caller may re-read and retry.
    #[error("conflicting update for task: {id}")]
    Conflict {
        /// Id of the task whose update was rejected.
        id: Uuid,
    },

    /// The lease for this attempt is no longer live. The attempt was
    /// already resolved (acked, nacked or expired); the caller must not
    /// count it again.
    #[error("lease lost for task: {id}")]
    LeaseLost {
        /// Id of the task whose lease expired or was superseded.
        id: Uuid,
    },

    /// A conditional status transition was rejected, e.g. cancelling a
    /// task that is no longer `Pending`.
    #[error("task {id} cannot transition out of status {from}")]
    InvalidTransition {
        /// Id of the task.
        id: Uuid,
        /// The status the task was found in.
        from: TaskStatus,
    },

    /// The requested worker record does not exist.
    #[error("worker not found: {id}")]
    WorkerNotFound {
        /// Id of the missing worker.
        id: String,
    },

    /// Transient store failure (timeout, lost connection). The natural
    /// poll loop retries on the next tick.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    /// Returns true for transient errors worth retrying at the call site.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Conflict { .. } | Self::Unavailable(_))
    }
}
