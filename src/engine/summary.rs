// src/engine/summary.rs

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use serde::Serialize;

use crate::dag::TaskSnapshot;
use crate::types::{Priority, TaskStatus};

/// Aggregate view of an engine's tasks, derived on demand and never stored.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionSummary {
    pub total_tasks: usize,
    pub completed_tasks: usize,
    pub failed_tasks: usize,
    pub cancelled_tasks: usize,
    /// `completed / total`, `0.0` when there are no tasks.
    pub success_rate: f64,
    /// Every status, including those with a zero count.
    pub status_breakdown: BTreeMap<TaskStatus, usize>,
    /// Every priority, including those with a zero count.
    pub priority_breakdown: BTreeMap<Priority, usize>,
    /// Wall-clock seconds of the last `execute_all` call.
    pub elapsed_secs: f64,
}

impl ExecutionSummary {
    pub fn from_snapshots(tasks: &[TaskSnapshot], elapsed: Duration) -> Self {
        let mut status_breakdown: BTreeMap<TaskStatus, usize> =
            TaskStatus::ALL.iter().map(|s| (*s, 0)).collect();
        let mut priority_breakdown: BTreeMap<Priority, usize> =
            Priority::ALL.iter().map(|p| (*p, 0)).collect();

        for task in tasks {
            *status_breakdown.entry(task.status).or_default() += 1;
            *priority_breakdown.entry(task.priority).or_default() += 1;
        }

        let total_tasks = tasks.len();
        let count = |s: TaskStatus| status_breakdown.get(&s).copied().unwrap_or(0);
        let completed_tasks = count(TaskStatus::Completed);
        let failed_tasks = count(TaskStatus::Failed);
        let cancelled_tasks = count(TaskStatus::Cancelled);

        let success_rate = if total_tasks == 0 {
            0.0
        } else {
            completed_tasks as f64 / total_tasks as f64
        };

        Self {
            total_tasks,
            completed_tasks,
            failed_tasks,
            cancelled_tasks,
            success_rate,
            status_breakdown,
            priority_breakdown,
            elapsed_secs: elapsed.as_secs_f64(),
        }
    }

    /// Nothing failed or was cancelled.
    pub fn is_success(&self) -> bool {
        self.failed_tasks == 0 && self.cancelled_tasks == 0
    }
}

impl fmt::Display for ExecutionSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} tasks: {} completed, {} failed, {} cancelled ({:.1}% success) in {:.2}s",
            self.total_tasks,
            self.completed_tasks,
            self.failed_tasks,
            self.cancelled_tasks,
            self.success_rate * 100.0,
            self.elapsed_secs
        )?;
        let statuses: Vec<String> = self
            .status_breakdown
            .iter()
            .map(|(s, n)| format!("{s}={n}"))
            .collect();
        writeln!(f, "  by status:   {}", statuses.join(", "))?;
        let priorities: Vec<String> = self
            .priority_breakdown
            .iter()
            .map(|(p, n)| format!("{p}={n}"))
            .collect();
        write!(f, "  by priority: {}", priorities.join(", "))
    }
}
