use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Default retry budget for new tasks.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Represents the status of a task in the scheduler.
///
/// Tasks progress through states: `Pending` -> `Running` ->
/// `Completed`/`Failed`. A `Pending` task can also be moved to `Cancelled`
/// before it is ever leased. `Completed`, `Failed` and `Cancelled` are
/// terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Task is waiting to be leased by a worker.
    Pending,
    /// Task is leased and being executed.
    Running,
    /// Task completed successfully.
    Completed,
    /// Task failed after exhausting its retries or on a permanent error.
    Failed,
    /// Task was cancelled before it started running.
    Cancelled,
}

impl Default for TaskStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl TaskStatus {
    /// All status variants, for exhaustive aggregation.
    pub const ALL: &'static [Self] = &[
        Self::Pending,
        Self::Running,
        Self::Completed,
        Self::Failed,
        Self::Cancelled,
    ];

    /// Lowercase string as it appears at rest and on the wire.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Returns true for states with no outbound transitions.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "cancelled" => Ok(Self::Cancelled),
            _ => Err(()),
        }
    }
}

/// Urgency of a task. Larger values are dispatched first.
///
/// Serialized as its integer value (`1`, `5` or `10`) so that the at-rest
/// record keeps the numeric priority field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "i32", try_from = "i32")]
pub enum TaskPriority {
    Low,
    Medium,
    High,
}

impl Default for TaskPriority {
    fn default() -> Self {
        Self::Medium
    }
}

impl TaskPriority {
    /// The numeric value used for ordering and serialization.
    #[must_use]
    pub const fn as_i32(&self) -> i32 {
        match self {
            Self::Low => 1,
            Self::Medium => 5,
            Self::High => 10,
        }
    }
}

impl From<TaskPriority> for i32 {
    fn from(priority: TaskPriority) -> Self {
        priority.as_i32()
    }
}

impl TryFrom<i32> for TaskPriority {
    type Error = String;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::Low),
            5 => Ok(Self::Medium),
            10 => Ok(Self::High),
            other => Err(format!("invalid task priority: {other}")),
        }
    }
}

/// Represents errors raised by task executors.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", content = "message", rename_all = "snake_case")]
pub enum TaskError {
    /// A transient failure; the attempt may be retried.
    Retryable(String),
    /// A permanent failure; the task fails immediately without retry.
    /// Covers unknown task types and malformed payloads.
    Permanent(String),
    /// Execution exceeded the configured timeout. Retryable.
    Timeout,
}

impl TaskError {
    /// Returns true if the retry policy may re-attempt after this error.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Retryable(_) | Self::Timeout)
    }
}

impl std::fmt::Display for TaskError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Retryable(msg) | Self::Permanent(msg) => f.write_str(msg),
            Self::Timeout => f.write_str("task execution timed out"),
        }
    }
}

impl std::error::Error for TaskError {}

/// A task in the scheduler.
///
/// Tasks are created `Pending` by `Queue::enqueue` and driven through their
/// lifecycle by workers via lease/ack/nack. Use [`TaskSpec`] to describe a
/// task to enqueue; server-assigned fields (id, status, timestamps) are
/// stamped at enqueue time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Unique, time-ordered identifier for the task.
    pub id: Uuid,

    /// Short human label (e.g. `send-welcome-mail`).
    pub name: String,

    /// Dispatch key into the executor registry (e.g. `email`, `report`).
    #[serde(rename = "type")]
    pub task_type: String,

    /// Opaque structured input, stored as a single JSON blob.
    /// Executors perform their own typed extraction.
    pub payload: Value,

    /// Dispatch urgency. Higher priorities are leased first.
    #[serde(default)]
    pub priority: TaskPriority,

    /// Current lifecycle state.
    #[serde(default)]
    pub status: TaskStatus,

    /// Number of failed attempts so far.
    #[serde(default)]
    pub retries: u32,

    /// Retry budget. Once `retries` reaches this bound the task fails.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Timestamp when the task was created.
    pub created_at: DateTime<Utc>,

    /// Last modification timestamp. Doubles as the optimistic-concurrency
    /// token for `Store::update_task`.
    pub updated_at: DateTime<Utc>,

    /// Earliest time the task is eligible to run. Backoff reschedules into
    /// the future instead of sleeping.
    pub scheduled_at: DateTime<Utc>,

    /// Timestamp when the current (or last) attempt started.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,

    /// Timestamp when the task reached a terminal state.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,

    /// Message from the last failed attempt. Empty when none.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub error: String,

    /// Identity of the worker currently holding the lease, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worker_id: Option<String>,
}

const fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

impl Task {
    /// Creates a new `Pending` task stamped with the current system time.
    ///
    /// `Queue::enqueue` builds tasks from a [`TaskSpec`] using its own
    /// clock; this constructor is a convenience for direct store access.
    #[must_use]
    pub fn new(name: impl Into<String>, task_type: impl Into<String>, payload: Value) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(),
            name: name.into(),
            task_type: task_type.into(),
            payload,
            priority: TaskPriority::default(),
            status: TaskStatus::Pending,
            retries: 0,
            max_retries: DEFAULT_MAX_RETRIES,
            created_at: now,
            updated_at: now,
            scheduled_at: now,
            started_at: None,
            completed_at: None,
            error: String::new(),
            worker_id: None,
        }
    }

    /// Returns true if the task is eligible for leasing at `now`
    /// (`Pending` with `scheduled_at <= now`).
    #[must_use]
    pub fn is_eligible_at(&self, now: DateTime<Utc>) -> bool {
        self.status == TaskStatus::Pending && self.scheduled_at <= now
    }

    /// Returns true if the retry budget allows another attempt after the
    /// next failure.
    #[must_use]
    pub const fn can_retry(&self) -> bool {
        self.retries + 1 < self.max_retries
    }
}

/// Describes a task to enqueue.
///
/// Server-assigned fields (id, status, retries, timestamps) are omitted;
/// optional fields fall back to the documented defaults at enqueue time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSpec {
    /// Short human label. Required.
    pub name: String,

    /// Dispatch key into the executor registry. Required.
    #[serde(rename = "type")]
    pub task_type: String,

    /// Opaque structured input. Defaults to an empty object.
    #[serde(default = "empty_payload")]
    pub payload: Value,

    /// Dispatch urgency. Defaults to [`TaskPriority::Medium`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<TaskPriority>,

    /// Retry budget. Defaults to [`DEFAULT_MAX_RETRIES`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_retries: Option<u32>,

    /// Earliest eligible run time. Defaults to the enqueue time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduled_at: Option<DateTime<Utc>>,
}

fn empty_payload() -> Value {
    Value::Object(serde_json::Map::new())
}

impl TaskSpec {
    /// Creates a spec with the required fields.
    #[must_use]
    pub fn new(name: impl Into<String>, task_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            task_type: task_type.into(),
            payload: empty_payload(),
            priority: None,
            max_retries: None,
            scheduled_at: None,
        }
    }

    /// Sets the payload.
    #[must_use]
    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = payload;
        self
    }

    /// Sets the priority.
    #[must_use]
    pub const fn with_priority(mut self, priority: TaskPriority) -> Self {
        self.priority = Some(priority);
        self
    }

    /// Sets the retry budget.
    #[must_use]
    pub const fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    /// Sets the earliest eligible run time.
    #[must_use]
    pub const fn with_scheduled_at(mut self, scheduled_at: DateTime<Utc>) -> Self {
        self.scheduled_at = Some(scheduled_at);
        self
    }
}
