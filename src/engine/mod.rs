// src/engine/mod.rs

//! Public engine API.
//!
//! [`TaskEngine`] owns a task registry, a concurrency limiter and a set of
//! observers. Callers register tasks, then either drive everything with
//! [`TaskEngine::execute_all`] or run single tasks on demand.
//!
//! - [`state`] holds the shared state and every status transition.
//! - [`waves`] runs planned waves one after another.
//! - [`hooks`] defines the observer interface.
//! - [`summary`] aggregates registry state into an [`ExecutionSummary`].
//!
//! # Threading
//!
//! All engine state sits behind one mutex that is never held across an
//! `.await`, so handles can be cloned into other Tokio tasks (e.g. to cancel
//! from a signal handler). Ordering guarantees assume a single driver:
//! only one `execute_all` may run per engine at a time, and a second call
//! fails with [`EngineError::AlreadyRunning`].

pub mod hooks;
pub(crate) mod state;
pub mod summary;
mod waves;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::config::EngineConfig;
use crate::dag::{TaskDefinition, TaskId, TaskSnapshot, Wave};
use crate::errors::{EngineError, Result};
use crate::exec::task_runner::{supervise, wait_until_terminal};
use crate::types::TaskStatus;

pub use hooks::TaskObserver;
pub use summary::ExecutionSummary;

use hooks::{FailedCallback, HookEvent, SnapshotCallback};
use state::{CancelRequest, EngineShared};

/// Dependency-aware task engine producing results of type `T`.
///
/// Cloning is cheap and every clone drives the same registry.
pub struct TaskEngine<T> {
    shared: Arc<EngineShared<T>>,
}

impl<T> Clone for TaskEngine<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> std::fmt::Debug for TaskEngine<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskEngine")
            .field("config", &self.shared.config)
            .finish_non_exhaustive()
    }
}

impl<T> Default for TaskEngine<T> {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl<T> TaskEngine<T> {
    pub fn new(config: EngineConfig) -> Self {
        info!(
            max_concurrent_tasks = config.max_concurrent_tasks,
            blocked_policy = ?config.blocked_policy,
            "task engine created"
        );
        Self {
            shared: Arc::new(EngineShared::new(config)),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.shared.config
    }

    /// Register a task. Defaults: `Normal` priority, no retries.
    pub fn add_task(&self, def: TaskDefinition<T>) -> Result<TaskId> {
        self.shared.lock().registry.add(def)
    }

    /// Register several tasks, returning their ids in input order.
    pub fn add_task_group(&self, defs: Vec<TaskDefinition<T>>) -> Result<Vec<TaskId>> {
        self.shared.lock().registry.add_group(defs)
    }

    /// Make `task` depend on `on` after both were registered.
    pub fn add_dependency(&self, task: TaskId, on: TaskId) -> Result<()> {
        self.shared.lock().registry.add_dependency(task, on)
    }

    pub fn task_status(&self, id: TaskId) -> Result<TaskStatus> {
        self.shared.lock().registry.status(id)
    }

    pub fn all_task_statuses(&self) -> BTreeMap<TaskId, TaskStatus> {
        self.shared.lock().registry.statuses()
    }

    pub fn task(&self, id: TaskId) -> Result<TaskSnapshot> {
        self.shared
            .lock()
            .registry
            .get(id)
            .map(|rec| rec.snapshot())
            .ok_or(EngineError::TaskNotFound(id))
    }

    /// Snapshots of every task in registration order.
    pub fn tasks(&self) -> Vec<TaskSnapshot> {
        self.shared.lock().registry.snapshots()
    }

    /// Waves the current registry would run in, assuming every task
    /// completes. Nothing is executed.
    pub fn plan(&self) -> Result<Vec<Wave>> {
        self.shared.planner()?.plan()
    }

    /// Summary of the current registry state.
    pub fn summary(&self) -> ExecutionSummary {
        self.shared.summary()
    }

    /// Slots of the concurrency limiter currently held.
    pub fn running_slots(&self) -> usize {
        self.shared.limiter.in_use()
    }

    pub fn add_observer(&self, observer: Arc<dyn TaskObserver>) {
        self.shared.hooks.add(observer);
    }

    pub fn on_task_started<F>(&self, callback: F)
    where
        F: Fn(&TaskSnapshot) + Send + Sync + 'static,
    {
        self.add_observer(Arc::new(SnapshotCallback::new(HookEvent::Started, callback)));
    }

    pub fn on_task_completed<F>(&self, callback: F)
    where
        F: Fn(&TaskSnapshot) + Send + Sync + 'static,
    {
        self.add_observer(Arc::new(SnapshotCallback::new(HookEvent::Completed, callback)));
    }

    /// `callback` receives the task and its error message.
    pub fn on_task_failed<F>(&self, callback: F)
    where
        F: Fn(&TaskSnapshot, &str) + Send + Sync + 'static,
    {
        self.add_observer(Arc::new(FailedCallback(callback)));
    }

    pub fn on_task_cancelled<F>(&self, callback: F)
    where
        F: Fn(&TaskSnapshot) + Send + Sync + 'static,
    {
        self.add_observer(Arc::new(SnapshotCallback::new(HookEvent::Cancelled, callback)));
    }

    /// Cancel a task. A running task is signalled and this waits until it
    /// has acknowledged; its concurrency slot is released on the way out.
    ///
    /// Returns `false` if the task had already finished.
    pub async fn cancel_task(&self, id: TaskId) -> Result<bool> {
        match self.shared.request_cancel(id, "cancelled by caller")? {
            CancelRequest::AlreadyTerminal => Ok(false),
            CancelRequest::Cancelled => Ok(true),
            CancelRequest::Signalled(rx) => {
                Ok(wait_until_terminal(rx).await == TaskStatus::Cancelled)
            }
        }
    }

    /// Cancel every pending or running task and return how many ended up
    /// cancelled.
    pub async fn cancel_all_tasks(&self) -> usize {
        let (mut count, signalled) = self.shared.request_cancel_all("all tasks cancelled");
        for rx in signalled {
            if wait_until_terminal(rx).await == TaskStatus::Cancelled {
                count += 1;
            }
        }
        info!(cancelled = count, "cancelled all tasks");
        count
    }
}

impl<T> TaskEngine<T>
where
    T: Clone + Send + 'static,
{
    /// Run every non-terminal task wave by wave.
    ///
    /// Fails before anything runs if the graph has a cycle or an unknown
    /// dependency. Task failures do not surface here: inspect
    /// [`ExecutionSummary::failed_tasks`] instead. With the default
    /// [`BlockedPolicy::Fail`](crate::types::BlockedPolicy::Fail), a task
    /// stranded behind a failed dependency aborts the remaining waves with
    /// [`EngineError::BlockedDependency`].
    pub async fn execute_all(&self) -> Result<ExecutionSummary> {
        waves::execute_all(&self.shared).await
    }

    /// Run one task now, outside wave batching.
    ///
    /// Fails fast with [`EngineError::UnmetDependencies`] unless every
    /// dependency is `Completed`. A task that already finished returns its
    /// stored outcome; one already in flight is awaited.
    pub async fn execute_task(&self, id: TaskId) -> Result<T> {
        if self.task_status(id)?.is_terminal() {
            return self.shared.outcome(id);
        }
        if let Some(rx) = self.shared.in_flight(id) {
            wait_until_terminal(rx).await;
            return self.shared.outcome(id);
        }

        let unmet = self.shared.unmet_dependencies(id)?;
        if !unmet.is_empty() {
            return Err(EngineError::UnmetDependencies { task: id, unmet });
        }

        let slot = self.shared.limiter.acquire().await?;
        match self.shared.launch(id) {
            Some(launch) => {
                supervise(Arc::clone(&self.shared), id, launch, slot).await;
            }
            None => {
                drop(slot);
                if let Some(rx) = self.shared.watch_unless_terminal(id) {
                    wait_until_terminal(rx).await;
                }
            }
        }
        self.shared.outcome(id)
    }

    /// Result of a task, waiting for it if needed.
    ///
    /// - finished: returns immediately (an error for failed or cancelled
    ///   tasks)
    /// - in flight: waits up to `timeout`
    /// - still pending: starts it via [`execute_task`](Self::execute_task)
    ///
    /// Hitting `timeout` returns [`EngineError::WaitTimeout`] and leaves the
    /// task running.
    pub async fn wait_for_task(&self, id: TaskId, timeout: Option<Duration>) -> Result<T> {
        if self.task_status(id)?.is_terminal() {
            return self.shared.outcome(id);
        }

        let wait = async {
            match self.shared.in_flight(id) {
                Some(rx) => {
                    wait_until_terminal(rx).await;
                    self.shared.outcome(id)
                }
                None => self.execute_task(id).await,
            }
        };

        match timeout {
            Some(limit) => tokio::time::timeout(limit, wait)
                .await
                .map_err(|_| EngineError::WaitTimeout {
                    task: id,
                    after: limit,
                })?,
            None => wait.await,
        }
    }

    /// Stored result of a completed task.
    pub fn task_result(&self, id: TaskId) -> Result<Option<T>> {
        self.shared
            .lock()
            .registry
            .get(id)
            .map(|rec| rec.result.clone())
            .ok_or(EngineError::TaskNotFound(id))
    }
}
