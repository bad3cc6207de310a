//! Worker loop: lease, execute, resolve, heartbeat.
//!
//! A worker drives one task at a time. It polls the queue on an interval,
//! executes the leased task under the configured timeout, and resolves the
//! attempt through ack/nack. Store errors are logged and the loop
//! continues; the next tick retries naturally.

use std::sync::Arc;
use std::time::Duration;

use metrics::{counter, histogram};
use rand::Rng;
use tokio::signal;
use tokio::sync::watch;
use tokio::time::timeout;

use crate::config::SchedulerConfig;
use crate::executor::ExecutorRegistry;
use crate::models::{TaskError, TaskStatus, WorkerInfo, WorkerStatus};
use crate::queue::{with_deadline, Queue};
use crate::store::{LeasedTask, StoreError};

/// Creates a shutdown signal channel.
///
/// The sender triggers shutdown with `send(true)`; workers watch the
/// receiver and finish their current task before stopping.
#[must_use]
pub fn shutdown_signal() -> (watch::Sender<bool>, watch::Receiver<bool>) {
    watch::channel(false)
}

/// Blocks until SIGINT (Ctrl+C) or SIGTERM, then triggers shutdown.
///
/// Spawn this alongside a pool to tie worker shutdown to process
/// signals.
pub async fn wait_for_shutdown_signal(shutdown_tx: watch::Sender<bool>) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl+c");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to listen for SIGTERM");
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, initiating shutdown");
        }
    }

    if shutdown_tx.send(true).is_err() {
        tracing::error!("failed to send shutdown signal");
    }
}

/// Applies +/-10% jitter to decorrelate worker polling.
fn apply_jitter(interval: Duration) -> Duration {
    let factor = rand::thread_rng().gen_range(0.9..=1.1);
    interval.mul_f64(factor)
}

/// One cooperative execution agent.
pub struct Worker {
    info: WorkerInfo,
    queue: Queue,
    executors: Arc<ExecutorRegistry>,
    poll_interval: Duration,
    task_exec_timeout: Duration,
    heartbeat_interval: Duration,
    store_call_timeout: Duration,
}

impl Worker {
    /// Creates a worker that leases from `queue` and dispatches through
    /// `executors`.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        queue: Queue,
        executors: Arc<ExecutorRegistry>,
        config: &SchedulerConfig,
    ) -> Self {
        let now = queue.clock().now();
        Self {
            info: WorkerInfo::new(id, now),
            queue,
            executors,
            poll_interval: config.poll_interval(),
            task_exec_timeout: config.task_exec_timeout(),
            heartbeat_interval: config.heartbeat_interval(),
            store_call_timeout: config.store_call_timeout(),
        }
    }

    /// The worker's id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.info.id
    }

    /// Registers the worker in the store as `Idle`.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if registration fails; the worker cannot
    /// run unregistered.
    pub async fn register(&mut self) -> Result<(), StoreError> {
        self.info.status = WorkerStatus::Idle;
        self.info.touch_at(self.queue.clock().now());
        with_deadline(
            self.store_call_timeout,
            self.queue.store().register_worker(&self.info),
        )
        .await
    }

    /// Writes the worker's current status, refreshing its heartbeat.
    /// Failures are logged; liveness recovers on the next heartbeat.
    async fn heartbeat(&mut self, status: WorkerStatus) {
        self.info.status = status;
        self.info.touch_at(self.queue.clock().now());
        let result = with_deadline(
            self.store_call_timeout,
            self.queue.store().update_worker_status(&self.info.id, status),
        )
        .await;
        if let Err(e) = result {
            tracing::warn!(worker_id = %self.info.id, error = %e, "heartbeat failed");
        }
    }

    /// Runs the worker loop until the shutdown signal fires.
    ///
    /// A task past the execute step is finished and resolved before the
    /// worker stops; a task leased but never started is released by lease
    /// expiry.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the initial registration fails.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> Result<(), StoreError> {
        self.register().await?;
        tracing::info!(
            worker_id = %self.info.id,
            poll_interval = ?self.poll_interval,
            "worker started"
        );

        let mut last_heartbeat = std::time::Instant::now();

        loop {
            if *shutdown.borrow() {
                break;
            }

            if last_heartbeat.elapsed() >= self.heartbeat_interval {
                self.heartbeat(self.info.status).await;
                last_heartbeat = std::time::Instant::now();
            }

            match self.queue.lease(&self.info.id, 1).await {
                Ok(mut batch) => {
                    if let Some(leased) = batch.pop() {
                        self.process(leased).await;
                        last_heartbeat = std::time::Instant::now();
                        // Drain eagerly while work is available.
                        continue;
                    }
                }
                Err(e) => {
                    tracing::warn!(worker_id = %self.info.id, error = %e, "lease poll failed");
                }
            }

            let sleep = apply_jitter(self.poll_interval);
            tokio::select! {
                () = tokio::time::sleep(sleep) => {}
                _ = shutdown.changed() => {}
            }
        }

        self.heartbeat(WorkerStatus::Stopped).await;
        tracing::info!(
            worker_id = %self.info.id,
            tasks_run = self.info.tasks_run,
            "worker stopped"
        );
        Ok(())
    }

    /// Executes one leased task and resolves the attempt.
    async fn process(&mut self, leased: LeasedTask) {
        let task = &leased.task;
        tracing::info!(
            worker_id = %self.info.id,
            task_id = %task.id,
            task_type = %task.task_type,
            retries = task.retries,
            "processing task"
        );
        self.heartbeat(WorkerStatus::Running).await;

        let outcome = match self.executors.get(&task.task_type) {
            None => Err(TaskError::Permanent(format!(
                "no executor registered for task type: {}",
                task.task_type
            ))),
            Some(executor) => {
                let start = std::time::Instant::now();
                let result = match timeout(self.task_exec_timeout, executor.execute(task)).await {
                    Ok(Ok(())) => Ok(()),
                    Ok(Err(e)) => Err(e),
                    Err(_elapsed) => Err(TaskError::Timeout),
                };
                histogram!("taskmill.task.duration_seconds", "task_type" => task.task_type.clone())
                    .record(start.elapsed().as_secs_f64());
                result
            }
        };

        match outcome {
            Ok(()) => {
                match self.queue.ack(&leased, TaskStatus::Completed, None).await {
                    Ok(_) => {
                        tracing::info!(worker_id = %self.info.id, task_id = %task.id, "task completed");
                    }
                    Err(e) => {
                        // The lease will expire and the task re-runs;
                        // at-least-once semantics.
                        tracing::error!(
                            worker_id = %self.info.id,
                            task_id = %task.id,
                            error = %e,
                            "failed to persist completion"
                        );
                    }
                }
            }
            Err(err) => {
                counter!("taskmill.executions.failed", "task_type" => task.task_type.clone())
                    .increment(1);
                if let Err(e) = self.queue.nack(&leased, &err).await {
                    tracing::error!(
                        worker_id = %self.info.id,
                        task_id = %task.id,
                        error = %e,
                        "failed to record task failure"
                    );
                }
            }
        }

        self.info.tasks_run += 1;
        let counted = with_deadline(
            self.store_call_timeout,
            self.queue.store().increment_tasks_run(&self.info.id),
        )
        .await;
        if let Err(e) = counted {
            tracing::warn!(worker_id = %self.info.id, error = %e, "failed to record task count");
        }

        self.heartbeat(WorkerStatus::Idle).await;
    }
}

impl std::fmt::Debug for Worker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Worker")
            .field("id", &self.info.id)
            .field("status", &self.info.status)
            .field("tasks_run", &self.info.tasks_run)
            .finish_non_exhaustive()
    }
}
