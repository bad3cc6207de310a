//! taskmill - Durable Priority Task Scheduler
//!
//! A distributed task scheduler core: a durable, priority-ordered queue
//! coupled to a pool of concurrent workers that lease, execute and retry
//! tasks with quadratic backoff. Execution is at-least-once with at most
//! one concurrent lease per task; short-lived leases bound recovery after
//! a worker crash.
//!
//! The core is transport-agnostic. An outer layer (HTTP, gRPC, CLI, cron)
//! drives it through [`Scheduler`] and wires a [`Pool`] of workers over
//! any [`Store`] implementation; [`MemoryStore`] ships as the reference
//! realization.

pub mod clock;
pub mod config;
pub mod executor;
pub mod models;
pub mod queue;
pub mod scheduler;
pub mod store;
pub mod worker;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::SchedulerConfig;
pub use executor::{ExecutorRegistry, TaskExecutor};
pub use models::{
    BackoffPolicy, Task, TaskError, TaskPriority, TaskSpec, TaskStatus, WorkerInfo, WorkerStatus,
};
pub use queue::{Notifier, Queue, QueueError, TaskNotification};
pub use scheduler::Scheduler;
pub use store::{Lease, LeasedTask, MemoryStore, Store, StoreError};
pub use worker::{shutdown_signal, wait_for_shutdown_signal, Pool, PoolStats, Worker};
