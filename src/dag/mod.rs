// src/dag/mod.rs

//! Task data model and dependency planning.
//!
//! - [`task_info`] defines task definitions, run records and snapshots.
//! - [`registry`] owns every task of an engine and assigns ids.
//! - [`graph`] holds adjacency information for dependency traversal.
//! - [`planner`] turns registry state into ordered waves and detects
//!   cycles and blocked dependencies.

pub mod graph;
pub mod planner;
pub mod registry;
pub mod task_info;

pub use graph::DagGraph;
pub use planner::{BlockedTask, PlanNode, Planner, Wave};
pub use registry::TaskRegistry;
pub use task_info::{
    TaskDefinition, TaskError, TaskId, TaskRecord, TaskSnapshot, TaskWork, WorkError,
    WorkFuture, WorkResult,
};
