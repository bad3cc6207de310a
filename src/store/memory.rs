//! In-memory store realization.
//!
//! Keeps tasks in a map plus a sorted ready-index ordered by dispatch
//! priority, with one live lease record per claimed task. All mutations go
//! through a single `RwLock`, which makes the operation pairs the contract
//! requires atomic trivially.

use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::clock::{Clock, SystemClock};
use crate::models::{BackoffPolicy, Task, TaskStatus, WorkerInfo, WorkerStatus};

use super::{Lease, LeasedTask, Store, StoreError};

/// Sort key for the ready index: priority descending, then scheduled
/// time, creation time and id ascending. UUIDv7 ids make the final
/// tie-break follow creation order as well.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ReadyKey {
    priority: crate::models::TaskPriority,
    scheduled_at: DateTime<Utc>,
    created_at: DateTime<Utc>,
    id: Uuid,
}

impl ReadyKey {
    fn for_task(task: &Task) -> Self {
        Self {
            priority: task.priority,
            scheduled_at: task.scheduled_at,
            created_at: task.created_at,
            id: task.id,
        }
    }
}

impl Ord for ReadyKey {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .priority
            .cmp(&self.priority)
            .then_with(|| self.scheduled_at.cmp(&other.scheduled_at))
            .then_with(|| self.created_at.cmp(&other.created_at))
            .then_with(|| self.id.cmp(&other.id))
    }
}

impl PartialOrd for ReadyKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Debug, Default)]
struct State {
    tasks: HashMap<Uuid, Task>,
    ready: BTreeSet<ReadyKey>,
    leases: HashMap<Uuid, Lease>,
    workers: HashMap<String, WorkerInfo>,
    worker_order: Vec<String>,
}

impl State {
    /// Removes a task's ready-index entry, if present.
    fn unindex(&mut self, task: &Task) {
        self.ready.remove(&ReadyKey::for_task(task));
    }

    /// Re-inserts a `Pending` task into the ready index.
    fn index(&mut self, task: &Task) {
        debug_assert_eq!(task.status, TaskStatus::Pending);
        self.ready.insert(ReadyKey::for_task(task));
    }

    /// Applies the retry policy after a failed attempt. The task must be
    /// `Running` with its lease already removed by the caller.
    fn resolve_failed_attempt(
        &mut self,
        id: Uuid,
        now: DateTime<Utc>,
        backoff: BackoffPolicy,
        error: &str,
    ) {
        let Some(task) = self.tasks.get_mut(&id) else {
            return;
        };
        task.retries += 1;
        task.error = error.to_string();
        task.updated_at = now;
        if task.retries < task.max_retries {
            task.status = TaskStatus::Pending;
            task.scheduled_at = backoff.schedule_after(now, task.retries);
            task.worker_id = None;
            task.started_at = None;
            let key = ReadyKey::for_task(task);
            self.ready.insert(key);
        } else {
            task.status = TaskStatus::Failed;
            task.completed_at = Some(now);
        }
    }
}

/// In-memory [`Store`] backed by a sorted ready-index and per-task leases.
#[derive(Debug)]
pub struct MemoryStore {
    clock: Arc<dyn Clock>,
    backoff: BackoffPolicy,
    state: RwLock<State>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Creates a store using the system clock and the default backoff.
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Creates a store reading time from the given clock.
    #[must_use]
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            backoff: BackoffPolicy::default(),
            state: RwLock::new(State::default()),
        }
    }

    /// Overrides the backoff policy used when expiring leases.
    #[must_use]
    pub const fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    /// Verifies that `lease_id` is the live lease for `id` and removes it.
    fn take_lease(state: &mut State, id: Uuid, lease_id: Uuid) -> Result<Lease, StoreError> {
        match state.leases.get(&id) {
            Some(lease) if lease.lease_id == lease_id => {}
            _ => return Err(StoreError::LeaseLost { id }),
        }
        state.leases.remove(&id).ok_or(StoreError::LeaseLost { id })
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn create_task(&self, task: &Task) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        if state.tasks.contains_key(&task.id) {
            return Err(StoreError::DuplicateId { id: task.id });
        }
        if task.status == TaskStatus::Pending {
            state.index(task);
        }
        state.tasks.insert(task.id, task.clone());
        Ok(())
    }

    async fn get_task(&self, id: Uuid) -> Result<Task, StoreError> {
        let state = self.state.read().await;
        state
            .tasks
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound { id })
    }

    async fn update_task(&self, task: &Task) -> Result<Task, StoreError> {
        let now = self.clock.now();
        let mut state = self.state.write().await;
        let stored = state
            .tasks
            .get(&task.id)
            .cloned()
            .ok_or(StoreError::NotFound { id: task.id })?;

        if stored.updated_at != task.updated_at {
            return Err(StoreError::Conflict { id: task.id });
        }
        if stored.status.is_terminal() && task.status != stored.status {
            return Err(StoreError::InvalidTransition {
                id: task.id,
                from: stored.status,
            });
        }

        state.unindex(&stored);
        let mut updated = task.clone();
        updated.updated_at = now;
        if updated.status == TaskStatus::Pending {
            state.index(&updated);
        }
        state.tasks.insert(updated.id, updated.clone());
        Ok(updated)
    }

    async fn list_tasks(&self, limit: usize, offset: usize) -> Result<Vec<Task>, StoreError> {
        let state = self.state.read().await;
        let mut tasks: Vec<Task> = state.tasks.values().cloned().collect();
        tasks.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.id.cmp(&a.id))
        });
        Ok(tasks.into_iter().skip(offset).take(limit).collect())
    }

    async fn count_by_status(&self) -> Result<HashMap<TaskStatus, usize>, StoreError> {
        let state = self.state.read().await;
        let mut counts: HashMap<TaskStatus, usize> =
            TaskStatus::ALL.iter().map(|s| (*s, 0)).collect();
        for task in state.tasks.values() {
            *counts.entry(task.status).or_default() += 1;
        }
        Ok(counts)
    }

    async fn count_ready(&self) -> Result<usize, StoreError> {
        let now = self.clock.now();
        let state = self.state.read().await;
        Ok(state
            .ready
            .iter()
            .filter(|key| key.scheduled_at <= now)
            .count())
    }

    async fn lease_ready(
        &self,
        worker_id: &str,
        n: usize,
        lease_ttl: Duration,
    ) -> Result<Vec<LeasedTask>, StoreError> {
        let now = self.clock.now();
        let expires_at = chrono::Duration::from_std(lease_ttl)
            .ok()
            .and_then(|ttl| now.checked_add_signed(ttl))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        let mut state = self.state.write().await;
        // The index is ordered by priority first, so a future-scheduled
        // high-priority task can precede eligible lower-priority ones:
        // skip over those rather than stopping at them.
        let claimed_keys: Vec<ReadyKey> = state
            .ready
            .iter()
            .filter(|key| key.scheduled_at <= now)
            .take(n)
            .cloned()
            .collect();

        let mut leased = Vec::with_capacity(claimed_keys.len());
        for key in claimed_keys {
            state.ready.remove(&key);
            let Some(task) = state.tasks.get_mut(&key.id) else {
                continue;
            };
            task.status = TaskStatus::Running;
            task.worker_id = Some(worker_id.to_string());
            task.started_at = Some(now);
            task.updated_at = now;
            let lease = Lease {
                task_id: task.id,
                worker_id: worker_id.to_string(),
                lease_id: Uuid::new_v4(),
                expires_at,
            };
            let task = task.clone();
            state.leases.insert(task.id, lease.clone());
            leased.push(LeasedTask { task, lease });
        }
        Ok(leased)
    }

    async fn extend_lease(
        &self,
        id: Uuid,
        lease_id: Uuid,
        extend_by: Duration,
    ) -> Result<Lease, StoreError> {
        let extend_by = chrono::Duration::from_std(extend_by)
            .unwrap_or(chrono::Duration::MAX);
        let mut state = self.state.write().await;
        let lease = match state.leases.get_mut(&id) {
            Some(lease) if lease.lease_id == lease_id => lease,
            _ => return Err(StoreError::LeaseLost { id }),
        };
        lease.expires_at = lease
            .expires_at
            .checked_add_signed(extend_by)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        Ok(lease.clone())
    }

    async fn complete_task(&self, id: Uuid, lease_id: Uuid) -> Result<Task, StoreError> {
        let now = self.clock.now();
        let mut state = self.state.write().await;
        Self::take_lease(&mut state, id, lease_id)?;
        let task = state
            .tasks
            .get_mut(&id)
            .ok_or(StoreError::NotFound { id })?;
        task.status = TaskStatus::Completed;
        task.completed_at = Some(now);
        task.updated_at = now;
        task.error = String::new();
        Ok(task.clone())
    }

    async fn fail_task(
        &self,
        id: Uuid,
        lease_id: Uuid,
        retries: u32,
        error: &str,
    ) -> Result<Task, StoreError> {
        let now = self.clock.now();
        let mut state = self.state.write().await;
        Self::take_lease(&mut state, id, lease_id)?;
        let task = state
            .tasks
            .get_mut(&id)
            .ok_or(StoreError::NotFound { id })?;
        task.status = TaskStatus::Failed;
        task.retries = retries;
        task.error = error.to_string();
        task.completed_at = Some(now);
        task.updated_at = now;
        Ok(task.clone())
    }

    async fn reschedule_for_retry(
        &self,
        id: Uuid,
        lease_id: Uuid,
        new_scheduled_at: DateTime<Utc>,
        retries: u32,
        error: &str,
    ) -> Result<Task, StoreError> {
        let now = self.clock.now();
        let mut state = self.state.write().await;
        Self::take_lease(&mut state, id, lease_id)?;
        let task = state
            .tasks
            .get_mut(&id)
            .ok_or(StoreError::NotFound { id })?;
        task.status = TaskStatus::Pending;
        task.retries = retries;
        task.error = error.to_string();
        task.scheduled_at = new_scheduled_at;
        task.worker_id = None;
        task.started_at = None;
        task.updated_at = now;
        let task = task.clone();
        state.index(&task);
        Ok(task)
    }

    async fn expire_leases(&self, now: DateTime<Utc>) -> Result<usize, StoreError> {
        let mut state = self.state.write().await;
        let expired: Vec<Lease> = state
            .leases
            .values()
            .filter(|lease| lease.expires_at < now)
            .cloned()
            .collect();

        for lease in &expired {
            state.leases.remove(&lease.task_id);
            let error = format!(
                "lease expired before completion (worker {})",
                lease.worker_id
            );
            state.resolve_failed_attempt(lease.task_id, now, self.backoff, &error);
        }
        Ok(expired.len())
    }

    async fn cancel_task(&self, id: Uuid) -> Result<Task, StoreError> {
        let now = self.clock.now();
        let mut state = self.state.write().await;
        let mut task = state.tasks.remove(&id).ok_or(StoreError::NotFound { id })?;
        if task.status != TaskStatus::Pending {
            let from = task.status;
            state.tasks.insert(id, task);
            return Err(StoreError::InvalidTransition { id, from });
        }
        state.unindex(&task);
        task.status = TaskStatus::Cancelled;
        task.completed_at = Some(now);
        task.updated_at = now;
        state.tasks.insert(id, task.clone());
        Ok(task)
    }

    async fn delete_task(&self, id: Uuid) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        let stored = state.tasks.remove(&id).ok_or(StoreError::NotFound { id })?;
        state.unindex(&stored);
        state.leases.remove(&id);
        Ok(())
    }

    async fn register_worker(&self, worker: &WorkerInfo) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        match state.workers.get_mut(&worker.id) {
            Some(existing) => {
                // Upsert refreshes liveness but keeps the lifetime counter.
                existing.status = worker.status;
                existing.last_seen = worker.last_seen;
            }
            None => {
                state.worker_order.push(worker.id.clone());
                state.workers.insert(worker.id.clone(), worker.clone());
            }
        }
        Ok(())
    }

    async fn update_worker_status(
        &self,
        id: &str,
        status: WorkerStatus,
    ) -> Result<(), StoreError> {
        let now = self.clock.now();
        let mut state = self.state.write().await;
        let worker = state
            .workers
            .get_mut(id)
            .ok_or_else(|| StoreError::WorkerNotFound { id: id.to_string() })?;
        worker.status = status;
        worker.touch_at(now);
        Ok(())
    }

    async fn increment_tasks_run(&self, id: &str) -> Result<(), StoreError> {
        let now = self.clock.now();
        let mut state = self.state.write().await;
        let worker = state
            .workers
            .get_mut(id)
            .ok_or_else(|| StoreError::WorkerNotFound { id: id.to_string() })?;
        worker.tasks_run += 1;
        worker.touch_at(now);
        Ok(())
    }

    async fn list_workers(&self) -> Result<Vec<WorkerInfo>, StoreError> {
        let state = self.state.read().await;
        Ok(state
            .worker_order
            .iter()
            .filter_map(|id| state.workers.get(id))
            .cloned()
            .collect())
    }

    async fn cleanup_stale_workers(&self, timeout: Duration) -> Result<usize, StoreError> {
        let now = self.clock.now();
        let timeout = chrono::Duration::from_std(timeout)
            .unwrap_or(chrono::Duration::MAX);
        let mut state = self.state.write().await;
        let mut swept = 0;
        for worker in state.workers.values_mut() {
            if worker.status != WorkerStatus::Stopped && worker.is_stale_at(now, timeout) {
                worker.status = WorkerStatus::Stopped;
                swept += 1;
            }
        }
        Ok(swept)
    }
}
