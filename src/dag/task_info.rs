// src/dag/task_info.rs

//! Task definitions, per-task run state and read-only snapshots.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::watch;

use crate::errors::EngineError;
use crate::types::{Priority, TaskStatus};

static NEXT_TASK_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique task identifier, assigned at registration.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct TaskId(u64);

impl TaskId {
    pub(crate) fn next() -> Self {
        TaskId(NEXT_TASK_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl From<u64> for TaskId {
    fn from(raw: u64) -> Self {
        TaskId(raw)
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Error returned by a single attempt of a task's work.
///
/// `Retryable` failures consume the retry budget; `Fatal` failures end the
/// task immediately.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WorkError {
    #[error("{0}")]
    Retryable(String),
    #[error("{0}")]
    Fatal(String),
}

impl WorkError {
    pub fn retryable(msg: impl fmt::Display) -> Self {
        WorkError::Retryable(msg.to_string())
    }

    pub fn fatal(msg: impl fmt::Display) -> Self {
        WorkError::Fatal(msg.to_string())
    }
}

impl From<anyhow::Error> for WorkError {
    fn from(err: anyhow::Error) -> Self {
        WorkError::Retryable(format!("{err:#}"))
    }
}

pub type WorkResult<T> = std::result::Result<T, WorkError>;

/// Boxed future produced by one invocation of a [`TaskWork`] factory.
pub type WorkFuture<T> = Pin<Box<dyn Future<Output = WorkResult<T>> + Send + 'static>>;

/// Zero-argument factory producing a fresh future per attempt.
///
/// A future cannot be restarted once polled, so every retry calls the
/// factory again.
pub struct TaskWork<T> {
    factory: Arc<dyn Fn() -> WorkFuture<T> + Send + Sync>,
}

impl<T> Clone for TaskWork<T> {
    fn clone(&self) -> Self {
        Self {
            factory: Arc::clone(&self.factory),
        }
    }
}

impl<T> fmt::Debug for TaskWork<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskWork").finish_non_exhaustive()
    }
}

impl<T: Send + 'static> TaskWork<T> {
    pub fn new<F, Fut>(factory: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = WorkResult<T>> + Send + 'static,
    {
        Self {
            factory: Arc::new(move || Box::pin(factory()) as WorkFuture<T>),
        }
    }

    /// Start a new attempt.
    pub fn invoke(&self) -> WorkFuture<T> {
        (self.factory)()
    }
}

/// Caller-supplied description of a task, consumed by `add_task`.
#[derive(Debug, Clone)]
pub struct TaskDefinition<T> {
    pub name: String,
    pub work: TaskWork<T>,
    pub priority: Priority,
    /// Upper bound on a single attempt.
    pub timeout: Option<Duration>,
    pub max_retries: u32,
    pub dependencies: BTreeSet<TaskId>,
    pub metadata: BTreeMap<String, String>,
}

impl<T> TaskDefinition<T> {
    /// New definition with `Normal` priority, no timeout and no retries.
    pub fn new(name: impl Into<String>, work: TaskWork<T>) -> Self {
        Self {
            name: name.into(),
            work,
            priority: Priority::default(),
            timeout: None,
            max_retries: 0,
            dependencies: BTreeSet::new(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn depends_on(mut self, dep: TaskId) -> Self {
        self.dependencies.insert(dep);
        self
    }

    pub fn depends_on_all(mut self, deps: impl IntoIterator<Item = TaskId>) -> Self {
        self.dependencies.extend(deps);
        self
    }

    pub fn metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Why a task ended without completing.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TaskError {
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("{0}")]
    Failed(String),
    #[error("fatal: {0}")]
    Fatal(String),
    #[error("panicked: {0}")]
    Panicked(String),
    #[error("cancelled: {0}")]
    Cancelled(String),
    #[error("blocked by failed or cancelled dependency {dependency}")]
    Blocked { dependency: TaskId },
}

impl TaskError {
    pub fn into_engine_error(self, task: TaskId) -> EngineError {
        match self {
            TaskError::Timeout(after) => EngineError::ExecutionTimeout { task, after },
            TaskError::Cancelled(reason) => EngineError::Cancelled { task, reason },
            TaskError::Blocked { dependency } => EngineError::Cancelled {
                task,
                reason: format!("blocked by dependency {dependency}"),
            },
            other => EngineError::TaskExecution {
                task,
                message: other.to_string(),
            },
        }
    }
}

/// Definition plus mutable run state, owned by the registry.
#[derive(Debug)]
pub struct TaskRecord<T> {
    pub id: TaskId,
    /// Registration order within the owning registry.
    pub seq: u64,
    pub name: String,
    pub work: TaskWork<T>,
    pub priority: Priority,
    pub timeout: Option<Duration>,
    pub max_retries: u32,
    pub retry_attempts: u32,
    pub dependencies: BTreeSet<TaskId>,
    pub metadata: BTreeMap<String, String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub result: Option<T>,
    pub error: Option<TaskError>,
    status_tx: watch::Sender<TaskStatus>,
}

impl<T> TaskRecord<T> {
    pub fn new(id: TaskId, seq: u64, def: TaskDefinition<T>) -> Self {
        let (status_tx, _) = watch::channel(TaskStatus::Pending);
        Self {
            id,
            seq,
            name: def.name,
            work: def.work,
            priority: def.priority,
            timeout: def.timeout,
            max_retries: def.max_retries,
            retry_attempts: 0,
            dependencies: def.dependencies,
            metadata: def.metadata,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            result: None,
            error: None,
            status_tx,
        }
    }

    pub fn status(&self) -> TaskStatus {
        *self.status_tx.borrow()
    }

    /// Move to `status` unless the task is already terminal.
    ///
    /// Returns `false` (and changes nothing) for terminal tasks.
    pub fn set_status(&mut self, status: TaskStatus) -> bool {
        if self.status().is_terminal() {
            return false;
        }
        match status {
            TaskStatus::Running if self.started_at.is_none() => {
                self.started_at = Some(Utc::now())
            }
            s if s.is_terminal() => self.completed_at = Some(Utc::now()),
            _ => {}
        }
        self.status_tx.send_replace(status);
        true
    }

    pub fn complete(&mut self, value: T) -> bool {
        if !self.set_status(TaskStatus::Completed) {
            return false;
        }
        self.result = Some(value);
        true
    }

    pub fn fail(&mut self, error: TaskError) -> bool {
        if !self.set_status(TaskStatus::Failed) {
            return false;
        }
        self.error = Some(error);
        true
    }

    pub fn cancel(&mut self, error: TaskError) -> bool {
        if !self.set_status(TaskStatus::Cancelled) {
            return false;
        }
        self.error = Some(error);
        true
    }

    /// Receiver that observes every later status change.
    pub fn subscribe(&self) -> watch::Receiver<TaskStatus> {
        self.status_tx.subscribe()
    }

    pub fn snapshot(&self) -> TaskSnapshot {
        TaskSnapshot {
            id: self.id,
            name: self.name.clone(),
            priority: self.priority,
            status: self.status(),
            timeout: self.timeout,
            max_retries: self.max_retries,
            retry_attempts: self.retry_attempts,
            dependencies: self.dependencies.iter().copied().collect(),
            metadata: self.metadata.clone(),
            created_at: self.created_at,
            started_at: self.started_at,
            completed_at: self.completed_at,
            error: self.error.as_ref().map(|e| e.to_string()),
        }
    }
}

/// Read-only copy of a task's state, handed to observers and callers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskSnapshot {
    pub id: TaskId,
    pub name: String,
    pub priority: Priority,
    pub status: TaskStatus,
    pub timeout: Option<Duration>,
    pub max_retries: u32,
    pub retry_attempts: u32,
    pub dependencies: Vec<TaskId>,
    pub metadata: BTreeMap<String, String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}
