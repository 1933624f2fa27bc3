// src/dag/planner.rs

//! Wave planning by iterative topological layering.
//!
//! A wave is the set of remaining tasks whose dependencies were all placed
//! in earlier waves. Waves are ordered by priority (highest first), with
//! registration order as the tie-breaker.

use std::cmp::Reverse;
use std::collections::{BTreeSet, HashMap, HashSet};

use tracing::debug;

use crate::dag::graph::DagGraph;
use crate::dag::registry::TaskRegistry;
use crate::dag::task_info::{TaskId, TaskRecord};
use crate::errors::{EngineError, Result};
use crate::types::{Priority, TaskStatus};

/// Ordered task ids that may run concurrently.
pub type Wave = Vec<TaskId>;

/// The slice of a task's state that planning looks at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanNode {
    pub id: TaskId,
    pub seq: u64,
    pub priority: Priority,
    pub status: TaskStatus,
    pub deps: Vec<TaskId>,
}

impl<T> From<&TaskRecord<T>> for PlanNode {
    fn from(rec: &TaskRecord<T>) -> Self {
        Self {
            id: rec.id,
            seq: rec.seq,
            priority: rec.priority,
            status: rec.status(),
            deps: rec.dependencies.iter().copied().collect(),
        }
    }
}

/// A remaining task that can never run, and the dependency that stops it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockedTask {
    pub task: TaskId,
    /// `[task, .., failed_or_cancelled_dependency]`
    pub chain: Vec<TaskId>,
}

impl BlockedTask {
    pub fn blocker(&self) -> TaskId {
        self.chain.last().copied().unwrap_or(self.task)
    }
}

#[derive(Debug)]
pub struct Planner {
    nodes: HashMap<TaskId, PlanNode>,
    graph: DagGraph,
}

impl Planner {
    /// Build a planner, rejecting dependencies on unknown ids.
    pub fn new(nodes: Vec<PlanNode>) -> Result<Self> {
        let nodes: HashMap<TaskId, PlanNode> = nodes.into_iter().map(|n| (n.id, n)).collect();

        let mut ordered: Vec<&PlanNode> = nodes.values().collect();
        ordered.sort_by_key(|n| n.seq);
        for node in ordered {
            if let Some(missing) = node.deps.iter().find(|d| !nodes.contains_key(d)) {
                return Err(EngineError::Validation(format!(
                    "task {} depends on unknown task {}",
                    node.id, missing
                )));
            }
        }

        let graph = DagGraph::from_edges(nodes.values().map(|n| (n.id, n.deps.as_slice())));
        Ok(Self { nodes, graph })
    }

    pub fn from_registry<T>(registry: &TaskRegistry<T>) -> Result<Self> {
        Self::new(registry.iter().map(PlanNode::from).collect())
    }

    /// Full plan assuming every planned task completes.
    pub fn plan(&self) -> Result<Vec<Wave>> {
        let mut placed = self.initially_placed();
        let mut remaining = self.remaining();
        let mut waves = Vec::new();

        while !remaining.is_empty() {
            let wave = self.layer(&placed, &remaining)?;
            for id in &wave {
                remaining.remove(id);
                placed.insert(*id);
            }
            debug!(wave = waves.len() + 1, tasks = ?wave, "planned wave");
            waves.push(wave);
        }

        Ok(waves)
    }

    /// Only the first wave of the current state, or `None` when nothing is
    /// left to run.
    pub fn next_wave(&self) -> Result<Option<Wave>> {
        let remaining = self.remaining();
        if remaining.is_empty() {
            return Ok(None);
        }
        self.layer(&self.initially_placed(), &remaining).map(Some)
    }

    /// Like [`Planner::next_wave`], but refuses to plan anything while a
    /// remaining task is blocked, even if other branches are ready. The
    /// first blocked task in registration order is reported.
    pub fn next_wave_fail_fast(&self) -> Result<Option<Wave>> {
        if let Some(stuck) = self.blocked().into_iter().next() {
            return Err(EngineError::BlockedDependency {
                task: stuck.task,
                chain: stuck.chain,
            });
        }
        self.next_wave()
    }

    /// Every remaining task whose dependency chain reaches a failed or
    /// cancelled task, in registration order.
    pub fn blocked(&self) -> Vec<BlockedTask> {
        let mut blocked: Vec<BlockedTask> = self
            .remaining()
            .into_iter()
            .filter_map(|task| {
                self.blocking_chain(task)
                    .map(|chain| BlockedTask { task, chain })
            })
            .collect();
        blocked.sort_by_key(|b| self.nodes.get(&b.task).map(|n| n.seq));
        blocked
    }

    fn initially_placed(&self) -> HashSet<TaskId> {
        self.nodes
            .values()
            .filter(|n| n.status == TaskStatus::Completed)
            .map(|n| n.id)
            .collect()
    }

    fn remaining(&self) -> BTreeSet<TaskId> {
        self.nodes
            .values()
            .filter(|n| !n.status.is_terminal())
            .map(|n| n.id)
            .collect()
    }

    fn layer(&self, placed: &HashSet<TaskId>, remaining: &BTreeSet<TaskId>) -> Result<Wave> {
        let mut ready: Vec<&PlanNode> = remaining
            .iter()
            .filter_map(|id| self.nodes.get(id))
            .filter(|n| n.deps.iter().all(|d| placed.contains(d)))
            .collect();

        if ready.is_empty() {
            return Err(self.stuck_error(remaining));
        }

        ready.sort_by_key(|n| (Reverse(n.priority), n.seq));
        Ok(ready.into_iter().map(|n| n.id).collect())
    }

    fn blocking_chain(&self, task: TaskId) -> Option<Vec<TaskId>> {
        self.graph.chain_to(task, |dep| {
            self.nodes
                .get(&dep)
                .is_some_and(|n| n.status.is_blocking())
        })
    }

    /// Nothing is ready but tasks remain: either a dependency failed or the
    /// remaining tasks wait on each other.
    fn stuck_error(&self, remaining: &BTreeSet<TaskId>) -> EngineError {
        let mut by_seq: Vec<TaskId> = remaining.iter().copied().collect();
        by_seq.sort_by_key(|id| self.nodes.get(id).map(|n| n.seq));

        for &task in &by_seq {
            if let Some(chain) = self.blocking_chain(task) {
                return EngineError::BlockedDependency { task, chain };
            }
        }

        let cycles = self.graph.cycles_among(remaining);
        let described = if cycles.is_empty() {
            "no task is ready".to_string()
        } else {
            cycles
                .iter()
                .map(|c| {
                    let mut ids: Vec<String> = c.iter().map(|id| id.to_string()).collect();
                    ids.push(c[0].to_string());
                    ids.join(" -> ")
                })
                .collect::<Vec<_>>()
                .join("; ")
        };

        EngineError::CircularDependency {
            tasks: by_seq,
            cycles: described,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(n: u64, priority: Priority, deps: &[u64]) -> PlanNode {
        PlanNode {
            id: TaskId::from(n),
            seq: n,
            priority,
            status: TaskStatus::Pending,
            deps: deps.iter().map(|d| TaskId::from(*d)).collect(),
        }
    }

    fn ids(raw: &[u64]) -> Vec<TaskId> {
        raw.iter().map(|n| TaskId::from(*n)).collect()
    }

    #[test]
    fn high_before_low_then_dependents() {
        let planner = Planner::new(vec![
            node(1, Priority::Low, &[]),
            node(2, Priority::High, &[]),
            node(3, Priority::Normal, &[1, 2]),
        ])
        .unwrap();

        assert_eq!(planner.plan().unwrap(), vec![ids(&[2, 1]), ids(&[3])]);
    }

    #[test]
    fn equal_priority_keeps_registration_order() {
        let planner = Planner::new(vec![
            node(3, Priority::Normal, &[]),
            node(1, Priority::Normal, &[]),
            node(2, Priority::Critical, &[]),
        ])
        .unwrap();

        assert_eq!(planner.plan().unwrap(), vec![ids(&[2, 1, 3])]);
    }

    #[test]
    fn unknown_dependency_is_a_validation_error() {
        let err = Planner::new(vec![node(1, Priority::Normal, &[42])]).unwrap_err();
        assert!(matches!(err, EngineError::Validation(msg) if msg.contains("#42")));
    }

    #[test]
    fn cycle_is_reported_with_members() {
        let planner = Planner::new(vec![
            node(1, Priority::Normal, &[2]),
            node(2, Priority::Normal, &[1]),
            node(3, Priority::Normal, &[]),
        ])
        .unwrap();

        match planner.plan() {
            Err(EngineError::CircularDependency { tasks, cycles }) => {
                assert_eq!(tasks, ids(&[1, 2]));
                assert_eq!(cycles, "#1 -> #2 -> #1");
            }
            other => panic!("expected CircularDependency, got {other:?}"),
        }
    }

    #[test]
    fn failed_dependency_blocks_dependents() {
        let mut failed = node(1, Priority::Normal, &[]);
        failed.status = TaskStatus::Failed;
        let planner = Planner::new(vec![
            failed,
            node(2, Priority::Normal, &[1]),
            node(3, Priority::Normal, &[2]),
        ])
        .unwrap();

        match planner.next_wave() {
            Err(EngineError::BlockedDependency { task, chain }) => {
                assert_eq!(task, TaskId::from(2));
                assert_eq!(chain, ids(&[2, 1]));
            }
            other => panic!("expected BlockedDependency, got {other:?}"),
        }

        let blocked = planner.blocked();
        assert_eq!(blocked.len(), 2);
        assert_eq!(blocked[1].chain, ids(&[3, 2, 1]));
        assert_eq!(blocked[1].blocker(), TaskId::from(1));
    }

    #[test]
    fn fail_fast_refuses_ready_branch_while_another_is_blocked() {
        let mut cancelled = node(1, Priority::Normal, &[]);
        cancelled.status = TaskStatus::Cancelled;
        let mut done = node(2, Priority::Normal, &[]);
        done.status = TaskStatus::Completed;
        let planner = Planner::new(vec![
            cancelled,
            done,
            node(3, Priority::Normal, &[1]),
            node(4, Priority::Normal, &[2]),
        ])
        .unwrap();

        match planner.next_wave_fail_fast() {
            Err(EngineError::BlockedDependency { task, chain }) => {
                assert_eq!(task, TaskId::from(3));
                assert_eq!(chain, ids(&[3, 1]));
            }
            other => panic!("expected BlockedDependency, got {other:?}"),
        }

        // Once the blocked task is pruned, the ready branch is planned.
        let mut pruned = node(3, Priority::Normal, &[1]);
        pruned.status = TaskStatus::Cancelled;
        let mut cancelled = node(1, Priority::Normal, &[]);
        cancelled.status = TaskStatus::Cancelled;
        let mut done = node(2, Priority::Normal, &[]);
        done.status = TaskStatus::Completed;
        let planner =
            Planner::new(vec![cancelled, done, pruned, node(4, Priority::Normal, &[2])]).unwrap();
        assert_eq!(planner.next_wave_fail_fast().unwrap(), Some(ids(&[4])));
    }

    #[test]
    fn nothing_left_means_no_wave() {
        let mut done = node(1, Priority::Normal, &[]);
        done.status = TaskStatus::Completed;
        let planner = Planner::new(vec![done]).unwrap();
        assert_eq!(planner.next_wave().unwrap(), None);
        assert!(planner.plan().unwrap().is_empty());
    }
}
