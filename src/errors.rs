// src/errors.rs

//! Crate-wide error type and aliases.

use std::time::Duration;

use thiserror::Error;

use crate::dag::TaskId;

#[derive(Error, Debug)]
pub enum EngineError {
    /// Malformed task definition or configuration, or a dependency on an id
    /// the registry does not know.
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Circular dependency among tasks {tasks:?}: {cycles}")]
    CircularDependency { tasks: Vec<TaskId>, cycles: String },

    #[error("Task {task} is blocked by dependency chain {}", format_chain(.chain))]
    BlockedDependency { task: TaskId, chain: Vec<TaskId> },

    #[error("Task {task} timed out after {after:?}")]
    ExecutionTimeout { task: TaskId, after: Duration },

    #[error("Task {task} failed: {message}")]
    TaskExecution { task: TaskId, message: String },

    #[error("Task {task} was cancelled: {reason}")]
    Cancelled { task: TaskId, reason: String },

    #[error("Task {task} has unmet dependencies: {unmet:?}")]
    UnmetDependencies { task: TaskId, unmet: Vec<TaskId> },

    #[error("Task not found: {0}")]
    TaskNotFound(TaskId),

    #[error("Timed out after {after:?} waiting for task {task}")]
    WaitTimeout { task: TaskId, after: Duration },

    #[error("execute_all is already in progress on this engine")]
    AlreadyRunning,

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

fn format_chain(chain: &[TaskId]) -> String {
    chain
        .iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(" -> ")
}

pub type Result<T> = std::result::Result<T, EngineError>;
