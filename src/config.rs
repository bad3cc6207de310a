//! Scheduler configuration.
//!
//! All knobs carry serde defaults so a partial document deserializes into
//! a complete config; `from_env` layers `TASKMILL_*` environment variables
//! over the defaults for embedding without a config file.

use std::env;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::models::BackoffPolicy;

/// Tunables recognized by the scheduler core.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Number of workers the pool spawns.
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,

    /// How often an idle worker polls for work, in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Lease duration installed at claim time, in seconds. Bounds how long
    /// a crashed worker can hold a task.
    #[serde(default = "default_lease_ttl_s")]
    pub lease_ttl_s: u64,

    /// Per-task execution timeout, in seconds.
    #[serde(default = "default_task_exec_timeout_s")]
    pub task_exec_timeout_s: u64,

    /// Periodic worker heartbeat interval, in seconds.
    #[serde(default = "default_heartbeat_s")]
    pub heartbeat_s: u64,

    /// Heartbeat age after which a worker is swept to `Stopped`, in
    /// seconds.
    #[serde(default = "default_stale_worker_timeout_s")]
    pub stale_worker_timeout_s: u64,

    /// Deadline applied to every store call, in milliseconds.
    #[serde(default = "default_store_call_timeout_ms")]
    pub store_call_timeout_ms: u64,

    /// Base of the quadratic retry backoff, in milliseconds. The default
    /// keeps the `retries^2` seconds schedule.
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
}

const fn default_worker_count() -> usize {
    10
}

const fn default_poll_interval_ms() -> u64 {
    500
}

const fn default_lease_ttl_s() -> u64 {
    300
}

const fn default_task_exec_timeout_s() -> u64 {
    30
}

const fn default_heartbeat_s() -> u64 {
    30
}

const fn default_stale_worker_timeout_s() -> u64 {
    120
}

const fn default_store_call_timeout_ms() -> u64 {
    5000
}

const fn default_backoff_base_ms() -> u64 {
    1000
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            worker_count: default_worker_count(),
            poll_interval_ms: default_poll_interval_ms(),
            lease_ttl_s: default_lease_ttl_s(),
            task_exec_timeout_s: default_task_exec_timeout_s(),
            heartbeat_s: default_heartbeat_s(),
            stale_worker_timeout_s: default_stale_worker_timeout_s(),
            store_call_timeout_ms: default_store_call_timeout_ms(),
            backoff_base_ms: default_backoff_base_ms(),
        }
    }
}

impl SchedulerConfig {
    /// Loads the config from `TASKMILL_*` environment variables, falling
    /// back to the defaults for unset or unparsable values.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            worker_count: env_parse("TASKMILL_WORKER_COUNT", defaults.worker_count),
            poll_interval_ms: env_parse("TASKMILL_POLL_INTERVAL_MS", defaults.poll_interval_ms),
            lease_ttl_s: env_parse("TASKMILL_LEASE_TTL_S", defaults.lease_ttl_s),
            task_exec_timeout_s: env_parse(
                "TASKMILL_TASK_EXEC_TIMEOUT_S",
                defaults.task_exec_timeout_s,
            ),
            heartbeat_s: env_parse("TASKMILL_HEARTBEAT_S", defaults.heartbeat_s),
            stale_worker_timeout_s: env_parse(
                "TASKMILL_STALE_WORKER_TIMEOUT_S",
                defaults.stale_worker_timeout_s,
            ),
            store_call_timeout_ms: env_parse(
                "TASKMILL_STORE_CALL_TIMEOUT_MS",
                defaults.store_call_timeout_ms,
            ),
            backoff_base_ms: env_parse("TASKMILL_BACKOFF_BASE_MS", defaults.backoff_base_ms),
        }
    }

    /// Idle poll interval.
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Lease duration installed at claim time.
    #[must_use]
    pub const fn lease_ttl(&self) -> Duration {
        Duration::from_secs(self.lease_ttl_s)
    }

    /// Per-task execution timeout.
    #[must_use]
    pub const fn task_exec_timeout(&self) -> Duration {
        Duration::from_secs(self.task_exec_timeout_s)
    }

    /// Periodic heartbeat interval.
    #[must_use]
    pub const fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_s)
    }

    /// Staleness threshold for the worker sweeper.
    #[must_use]
    pub const fn stale_worker_timeout(&self) -> Duration {
        Duration::from_secs(self.stale_worker_timeout_s)
    }

    /// Deadline for every store call.
    #[must_use]
    pub const fn store_call_timeout(&self) -> Duration {
        Duration::from_millis(self.store_call_timeout_ms)
    }

    /// The retry backoff policy.
    #[must_use]
    pub const fn backoff(&self) -> BackoffPolicy {
        BackoffPolicy::new(Duration::from_millis(self.backoff_base_ms))
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(default)
}
