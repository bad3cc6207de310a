//! Worker record for the scheduler.
//!
//! This module contains the [`WorkerInfo`] struct which represents a
//! registered execution agent and the heartbeat state used for staleness
//! detection.

use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle state of a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerStatus {
    /// Registered and polling, not currently executing a task.
    Idle,
    /// Currently executing a task.
    Running,
    /// Shut down cleanly, or swept after missing heartbeats.
    Stopped,
}

impl WorkerStatus {
    /// Lowercase string as stored at rest.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Stopped => "stopped",
        }
    }
}

impl std::fmt::Display for WorkerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WorkerStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "idle" => Ok(Self::Idle),
            "running" => Ok(Self::Running),
            "stopped" => Ok(Self::Stopped),
            _ => Err(()),
        }
    }
}

/// A registered worker in the scheduler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerInfo {
    /// Unique identifier for this worker (e.g. `worker-3`).
    pub id: String,

    /// Current lifecycle state.
    pub status: WorkerStatus,

    /// Last heartbeat timestamp. Monotonic within a worker's run.
    pub last_seen: DateTime<Utc>,

    /// Lifetime count of tasks this worker has executed.
    pub tasks_run: u64,
}

impl WorkerInfo {
    /// Creates an `Idle` worker record with `last_seen` at the given time.
    #[must_use]
    pub fn new(id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            status: WorkerStatus::Idle,
            last_seen: now,
            tasks_run: 0,
        }
    }

    /// Updates the heartbeat timestamp.
    pub fn touch_at(&mut self, now: DateTime<Utc>) {
        self.last_seen = now;
    }

    /// Returns true if the last heartbeat is older than `timeout` at `now`.
    #[must_use]
    pub fn is_stale_at(&self, now: DateTime<Utc>, timeout: Duration) -> bool {
        now.signed_duration_since(self.last_seen) > timeout
    }
}
