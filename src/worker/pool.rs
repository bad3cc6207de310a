//! Worker pool supervision.
//!
//! The pool spawns N workers plus two timers: a stats timer that logs
//! aggregate worker and queue state, and a cleanup timer that sweeps stale
//! workers and expired leases. Shutdown closes a single watch channel;
//! every worker finishes its in-flight task before stopping.

use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::config::SchedulerConfig;
use crate::executor::ExecutorRegistry;
use crate::models::{WorkerInfo, WorkerStatus};
use crate::queue::{Queue, QueueError};

use super::runner::Worker;

/// How often the pool logs aggregate stats.
const STATS_INTERVAL: Duration = Duration::from_secs(10);

/// How often the pool sweeps stale workers and expired leases.
const CLEANUP_INTERVAL: Duration = Duration::from_secs(60);

/// Aggregate view of the pool for the control API.
#[derive(Debug, Clone, Serialize)]
pub struct PoolStats {
    /// All registered workers.
    pub workers: Vec<WorkerInfo>,
    /// Number of registered workers.
    pub total_workers: usize,
    /// Eligible tasks waiting for a lease.
    pub runnable_queue_size: usize,
}

/// Supervises a fleet of [`Worker`]s.
#[derive(Debug)]
pub struct Pool {
    queue: Queue,
    executors: Arc<ExecutorRegistry>,
    config: SchedulerConfig,
    shutdown_tx: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
}

impl Pool {
    /// Creates a pool. Workers are spawned by [`start`](Self::start).
    #[must_use]
    pub fn new(queue: Queue, executors: Arc<ExecutorRegistry>, config: SchedulerConfig) -> Self {
        let (shutdown_tx, _rx) = watch::channel(false);
        Self {
            queue,
            executors,
            config,
            shutdown_tx,
            handles: Vec::new(),
        }
    }

    /// A handle for triggering shutdown externally, e.g. from a process
    /// signal listener.
    #[must_use]
    pub fn shutdown_sender(&self) -> watch::Sender<bool> {
        self.shutdown_tx.clone()
    }

    /// Spawns `worker_count` workers (`worker-1..worker-N`) plus the stats
    /// and cleanup timers. Idempotent while running.
    pub fn start(&mut self) {
        if !self.handles.is_empty() {
            return;
        }
        tracing::info!(
            worker_count = self.config.worker_count,
            "starting worker pool"
        );

        for i in 1..=self.config.worker_count {
            let worker = Worker::new(
                format!("worker-{i}"),
                self.queue.clone(),
                self.executors.clone(),
                &self.config,
            );
            let shutdown = self.shutdown_tx.subscribe();
            self.handles.push(tokio::spawn(async move {
                let id = worker.id().to_string();
                if let Err(e) = worker.run(shutdown).await {
                    tracing::error!(worker_id = %id, error = %e, "worker exited with error");
                }
            }));
        }

        self.handles.push(tokio::spawn(stats_loop(
            self.queue.clone(),
            self.shutdown_tx.subscribe(),
        )));
        self.handles.push(tokio::spawn(cleanup_loop(
            self.queue.clone(),
            self.config.clone(),
            self.shutdown_tx.subscribe(),
        )));
    }

    /// Signals all workers to stop, waits for them, and marks each worker
    /// `Stopped` in the store.
    pub async fn stop(&mut self) {
        tracing::info!("stopping worker pool");
        let _ = self.shutdown_tx.send(true);

        for handle in self.handles.drain(..) {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "pool task panicked");
            }
        }

        // Workers mark themselves Stopped on exit; this covers any that
        // died before reaching their shutdown path.
        let store = self.queue.store();
        for i in 1..=self.config.worker_count {
            let _ = store
                .update_worker_status(&format!("worker-{i}"), WorkerStatus::Stopped)
                .await;
        }
        tracing::info!("worker pool stopped");
    }

    /// Snapshot of registered workers and the runnable queue depth.
    ///
    /// # Errors
    ///
    /// Returns a [`QueueError::Store`] if the store is unavailable.
    pub async fn stats(&self) -> Result<PoolStats, QueueError> {
        let workers = self.queue.store().list_workers().await?;
        let runnable_queue_size = self.queue.size().await?;
        Ok(PoolStats {
            total_workers: workers.len(),
            workers,
            runnable_queue_size,
        })
    }
}

/// Periodically logs aggregate worker and queue stats.
async fn stats_loop(queue: Queue, mut shutdown: watch::Receiver<bool>) {
    let mut ticker = tokio::time::interval(STATS_INTERVAL);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    return;
                }
                continue;
            }
        }

        let workers = match queue.store().list_workers().await {
            Ok(workers) => workers,
            Err(e) => {
                tracing::warn!(error = %e, "failed to read worker stats");
                continue;
            }
        };
        let queue_size = queue.size().await.unwrap_or(0);

        let mut idle = 0;
        let mut running = 0;
        let mut stopped = 0;
        let mut total_tasks = 0;
        for worker in &workers {
            match worker.status {
                WorkerStatus::Idle => idle += 1,
                WorkerStatus::Running => running += 1,
                WorkerStatus::Stopped => stopped += 1,
            }
            total_tasks += worker.tasks_run;
        }

        tracing::info!(
            idle,
            running,
            stopped,
            total_tasks,
            queue_size,
            "worker pool stats"
        );
    }
}

/// Periodically sweeps stale workers and expired leases.
async fn cleanup_loop(queue: Queue, config: SchedulerConfig, mut shutdown: watch::Receiver<bool>) {
    let mut ticker = tokio::time::interval(CLEANUP_INTERVAL);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    return;
                }
                continue;
            }
        }

        match queue
            .store()
            .cleanup_stale_workers(config.stale_worker_timeout())
            .await
        {
            Ok(0) => {}
            Ok(swept) => {
                counter!("taskmill.workers.swept").increment(swept as u64);
                tracing::warn!(swept, "marked stale workers as stopped");
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to sweep stale workers");
            }
        }

        let now = queue.clock().now();
        match queue.store().expire_leases(now).await {
            Ok(0) => {}
            Ok(expired) => {
                counter!("taskmill.leases.expired").increment(expired as u64);
                tracing::warn!(expired, "reclaimed expired task leases");
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to expire leases");
            }
        }
    }
}
