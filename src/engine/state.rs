// src/engine/state.rs

//! Shared engine state and the task status transitions.
//!
//! Every transition takes the state lock, mutates the record, snapshots it
//! and releases the lock *before* observers are notified. The lock is never
//! held across an `.await`.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::{oneshot, watch};
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::dag::{Planner, TaskError, TaskId, TaskRegistry, TaskSnapshot, TaskWork};
use crate::engine::hooks::HookRegistry;
use crate::engine::summary::ExecutionSummary;
use crate::errors::{EngineError, Result};
use crate::exec::ConcurrencyLimiter;
use crate::exec::retry::RetryPolicy;
use crate::types::TaskStatus;

/// Handle for a task whose attempt loop is in flight.
///
/// `cancel` is taken by the first cancellation request.
#[derive(Debug)]
struct ActiveTask {
    cancel: Option<oneshot::Sender<String>>,
}

#[derive(Debug)]
pub(crate) struct EngineState<T> {
    pub registry: TaskRegistry<T>,
    active: HashMap<TaskId, ActiveTask>,
    executing: bool,
    last_elapsed: Duration,
}

/// Everything an attempt loop needs, handed out when a task starts.
pub(crate) struct Launch<T> {
    pub work: TaskWork<T>,
    pub timeout: Option<Duration>,
    pub cancel_rx: oneshot::Receiver<String>,
}

/// Result of a cancellation request.
pub(crate) enum CancelRequest {
    AlreadyTerminal,
    /// The task had not started and is now cancelled.
    Cancelled,
    /// An attempt loop was signalled; wait on the receiver for its
    /// acknowledgement.
    Signalled(watch::Receiver<TaskStatus>),
}

/// Outcome of a failed attempt as decided by the retry budget.
pub(crate) enum RetryDecision {
    Retry { attempt: u32, max_retries: u32 },
    Exhausted,
}

pub(crate) struct EngineShared<T> {
    pub config: EngineConfig,
    pub retry: RetryPolicy,
    pub limiter: ConcurrencyLimiter,
    pub hooks: HookRegistry,
    state: Mutex<EngineState<T>>,
}

impl<T> EngineShared<T> {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            retry: config.retry_policy(),
            limiter: ConcurrencyLimiter::new(config.max_concurrent_tasks),
            hooks: HookRegistry::default(),
            state: Mutex::new(EngineState {
                registry: TaskRegistry::new(),
                active: HashMap::new(),
                executing: false,
                last_elapsed: Duration::ZERO,
            }),
            config,
        }
    }

    pub fn lock(&self) -> MutexGuard<'_, EngineState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn planner(&self) -> Result<Planner> {
        Planner::from_registry(&self.lock().registry)
    }

    /// Mark the engine as executing; the guard clears the flag on drop.
    pub fn begin_execution(&self) -> Result<ExecutionGuard<'_, T>> {
        let mut state = self.lock();
        if state.executing {
            return Err(EngineError::AlreadyRunning);
        }
        state.executing = true;
        Ok(ExecutionGuard { shared: self })
    }

    pub fn record_elapsed(&self, elapsed: Duration) {
        self.lock().last_elapsed = elapsed;
    }

    pub fn summary(&self) -> ExecutionSummary {
        let state = self.lock();
        ExecutionSummary::from_snapshots(&state.registry.snapshots(), state.last_elapsed)
    }

    /// Receiver for a task that is not terminal but already owned by an
    /// attempt loop (running, or pending between retries).
    pub fn in_flight(&self, id: TaskId) -> Option<watch::Receiver<TaskStatus>> {
        let state = self.lock();
        let rec = state.registry.get(id)?;
        let status = rec.status();
        let owned = state.active.contains_key(&id) || status == TaskStatus::Running;
        (!status.is_terminal() && owned).then(|| rec.subscribe())
    }

    /// Receiver for any task that has not reached a terminal status.
    pub fn watch_unless_terminal(&self, id: TaskId) -> Option<watch::Receiver<TaskStatus>> {
        let state = self.lock();
        let rec = state.registry.get(id)?;
        (!rec.status().is_terminal()).then(|| rec.subscribe())
    }

    /// Dependencies of `id` that are not `Completed`, unknown ids included.
    pub fn unmet_dependencies(&self, id: TaskId) -> Result<Vec<TaskId>> {
        let state = self.lock();
        let rec = state.registry.get(id).ok_or(EngineError::TaskNotFound(id))?;
        Ok(rec
            .dependencies
            .iter()
            .copied()
            .filter(|dep| {
                state
                    .registry
                    .status(*dep)
                    .map_or(true, |s| s != TaskStatus::Completed)
            })
            .collect())
    }

    /// Start a pending task that nobody else owns: mark it `Running`,
    /// register its cancel channel and fire the started hooks.
    ///
    /// The caller must already hold a concurrency slot.
    pub fn launch(&self, id: TaskId) -> Option<Launch<T>> {
        let (launch, snapshot) = {
            let mut state = self.lock();
            if state.active.contains_key(&id) {
                return None;
            }
            let rec = state.registry.get_mut(id)?;
            if rec.status() != TaskStatus::Pending {
                return None;
            }
            rec.set_status(TaskStatus::Running);
            let snapshot = rec.snapshot();
            let (cancel_tx, cancel_rx) = oneshot::channel();
            let launch = Launch {
                work: rec.work.clone(),
                timeout: rec.timeout,
                cancel_rx,
            };
            state.active.insert(
                id,
                ActiveTask {
                    cancel: Some(cancel_tx),
                },
            );
            (launch, snapshot)
        };

        info!(task = %snapshot.name, task_id = %id, priority = %snapshot.priority, "task started");
        self.hooks.started(&snapshot);
        Some(launch)
    }

    /// Move a task waiting for a retry back to `Running`.
    pub fn resume(&self, id: TaskId) -> bool {
        let snapshot = {
            let mut state = self.lock();
            let Some(rec) = state.registry.get_mut(id) else {
                return false;
            };
            if rec.status() != TaskStatus::Pending || !rec.set_status(TaskStatus::Running) {
                return false;
            }
            rec.snapshot()
        };

        info!(
            task = %snapshot.name,
            task_id = %id,
            attempt = snapshot.retry_attempts + 1,
            "task restarted"
        );
        self.hooks.started(&snapshot);
        true
    }

    /// Consume one unit of retry budget if any is left and park the task in
    /// `Pending` until its next attempt.
    pub fn schedule_retry(&self, id: TaskId) -> RetryDecision {
        let mut state = self.lock();
        let Some(rec) = state.registry.get_mut(id) else {
            return RetryDecision::Exhausted;
        };
        if rec.retry_attempts >= rec.max_retries || rec.status().is_terminal() {
            return RetryDecision::Exhausted;
        }
        rec.retry_attempts += 1;
        rec.set_status(TaskStatus::Pending);
        RetryDecision::Retry {
            attempt: rec.retry_attempts,
            max_retries: rec.max_retries,
        }
    }

    pub fn status_of(&self, id: TaskId) -> TaskStatus {
        self.lock()
            .registry
            .status(id)
            .unwrap_or(TaskStatus::Failed)
    }

    pub fn finish_success(&self, id: TaskId, value: T) -> TaskStatus {
        let finished = {
            let mut state = self.lock();
            state.active.remove(&id);
            state
                .registry
                .get_mut(id)
                .and_then(|rec| rec.complete(value).then(|| rec.snapshot()))
        };

        match finished {
            Some(snapshot) => {
                info!(
                    task = %snapshot.name,
                    task_id = %id,
                    retries = snapshot.retry_attempts,
                    "task completed"
                );
                self.hooks.completed(&snapshot);
                TaskStatus::Completed
            }
            None => self.status_of(id),
        }
    }

    pub fn finish_failure(&self, id: TaskId, error: TaskError) -> TaskStatus {
        let message = error.to_string();
        let finished = {
            let mut state = self.lock();
            state.active.remove(&id);
            state
                .registry
                .get_mut(id)
                .and_then(|rec| rec.fail(error).then(|| rec.snapshot()))
        };

        match finished {
            Some(snapshot) => {
                warn!(
                    task = %snapshot.name,
                    task_id = %id,
                    retries = snapshot.retry_attempts,
                    error = %message,
                    "task failed"
                );
                self.hooks.failed(&snapshot, &message);
                TaskStatus::Failed
            }
            None => self.status_of(id),
        }
    }

    pub fn finish_cancelled(&self, id: TaskId, reason: String) -> TaskStatus {
        let finished = {
            let mut state = self.lock();
            state.active.remove(&id);
            state
                .registry
                .get_mut(id)
                .and_then(|rec| rec.cancel(TaskError::Cancelled(reason)).then(|| rec.snapshot()))
        };

        match finished {
            Some(snapshot) => {
                info!(task = %snapshot.name, task_id = %id, "task cancelled");
                self.hooks.cancelled(&snapshot);
                TaskStatus::Cancelled
            }
            None => self.status_of(id),
        }
    }

    pub fn request_cancel(&self, id: TaskId, reason: &str) -> Result<CancelRequest> {
        let snapshot = {
            let mut state = self.lock();
            let EngineState {
                registry, active, ..
            } = &mut *state;
            let rec = registry.get_mut(id).ok_or(EngineError::TaskNotFound(id))?;
            if rec.status().is_terminal() {
                return Ok(CancelRequest::AlreadyTerminal);
            }
            if let Some(entry) = active.get_mut(&id) {
                if let Some(tx) = entry.cancel.take() {
                    if tx.send(reason.to_string()).is_err() {
                        debug!(task_id = %id, "attempt loop finished while cancelling");
                    }
                }
                return Ok(CancelRequest::Signalled(rec.subscribe()));
            }
            rec.cancel(TaskError::Cancelled(reason.to_string()));
            rec.snapshot()
        };

        info!(task = %snapshot.name, task_id = %id, "pending task cancelled");
        self.hooks.cancelled(&snapshot);
        Ok(CancelRequest::Cancelled)
    }

    /// Cancel every non-terminal task under a single lock so no new work
    /// can start in between.
    ///
    /// Returns the number of tasks cancelled directly and receivers for the
    /// in-flight tasks that were signalled.
    pub fn request_cancel_all(&self, reason: &str) -> (usize, Vec<watch::Receiver<TaskStatus>>) {
        let mut cancelled = Vec::new();
        let mut signalled = Vec::new();
        {
            let mut state = self.lock();
            let EngineState {
                registry, active, ..
            } = &mut *state;
            let ids: Vec<TaskId> = registry
                .iter()
                .filter(|rec| !rec.status().is_terminal())
                .map(|rec| rec.id)
                .collect();

            for id in ids {
                let Some(rec) = registry.get_mut(id) else {
                    continue;
                };
                if let Some(entry) = active.get_mut(&id) {
                    if let Some(tx) = entry.cancel.take() {
                        let _ = tx.send(reason.to_string());
                    }
                    signalled.push(rec.subscribe());
                } else if rec.cancel(TaskError::Cancelled(reason.to_string())) {
                    cancelled.push(rec.snapshot());
                }
            }
        }

        for snapshot in &cancelled {
            self.hooks.cancelled(snapshot);
        }
        (cancelled.len(), signalled)
    }

    /// Cancel every pending task whose dependency chain reaches a failed or
    /// cancelled task. Returns how many were cancelled.
    pub fn cascade_blocked(&self) -> Result<usize> {
        let cancelled: Vec<(TaskSnapshot, TaskId)> = {
            let mut state = self.lock();
            let blocked = Planner::from_registry(&state.registry)?.blocked();
            let EngineState {
                registry, active, ..
            } = &mut *state;

            blocked
                .into_iter()
                .filter(|b| !active.contains_key(&b.task))
                .filter_map(|b| {
                    let blocker = b.blocker();
                    let rec = registry.get_mut(b.task)?;
                    rec.cancel(TaskError::Blocked {
                        dependency: blocker,
                    })
                    .then(|| (rec.snapshot(), blocker))
                })
                .collect()
        };

        for (snapshot, blocker) in &cancelled {
            warn!(
                task = %snapshot.name,
                task_id = %snapshot.id,
                blocked_by = %blocker,
                "dependency failed; cancelling blocked task"
            );
            self.hooks.cancelled(snapshot);
        }
        Ok(cancelled.len())
    }
}

impl<T: Clone> EngineShared<T> {
    /// Stored outcome of a terminal task.
    pub fn outcome(&self, id: TaskId) -> Result<T> {
        let state = self.lock();
        let rec = state.registry.get(id).ok_or(EngineError::TaskNotFound(id))?;
        match rec.status() {
            TaskStatus::Completed => rec.result.clone().ok_or_else(|| {
                EngineError::Other(anyhow::anyhow!("task {id} completed without a result"))
            }),
            TaskStatus::Failed | TaskStatus::Cancelled => Err(rec
                .error
                .clone()
                .unwrap_or_else(|| TaskError::Failed("unknown error".to_string()))
                .into_engine_error(id)),
            status => Err(EngineError::Other(anyhow::anyhow!(
                "task {id} has not finished (status {status})"
            ))),
        }
    }
}

pub(crate) struct ExecutionGuard<'a, T> {
    shared: &'a EngineShared<T>,
}

impl<T> Drop for ExecutionGuard<'_, T> {
    fn drop(&mut self) {
        self.shared.lock().executing = false;
    }
}
