// src/dag/graph.rs

use std::collections::{BTreeSet, HashMap, HashSet};

use petgraph::algo::tarjan_scc;
use petgraph::graphmap::DiGraphMap;

use crate::dag::task_info::TaskId;

/// Internal node structure: stores immediate deps and dependents.
#[derive(Debug, Clone, Default)]
struct DagNode {
    /// Direct dependencies: tasks that must complete before this one can run.
    deps: Vec<TaskId>,
    /// Direct dependents: tasks that depend on this one.
    dependents: Vec<TaskId>,
}

/// In-memory adjacency of the task graph keyed by id.
///
/// Built fresh for each planning pass. Edges may point at ids that are not
/// nodes; the planner reports those before using the graph.
#[derive(Debug, Clone, Default)]
pub struct DagGraph {
    nodes: HashMap<TaskId, DagNode>,
}

impl DagGraph {
    /// Build from `(task, dependencies)` pairs.
    pub fn from_edges<'a, I>(edges: I) -> Self
    where
        I: IntoIterator<Item = (TaskId, &'a [TaskId])>,
    {
        let mut nodes: HashMap<TaskId, DagNode> = HashMap::new();

        for (id, deps) in edges {
            nodes.entry(id).or_default().deps = deps.to_vec();
        }

        let ids: Vec<TaskId> = nodes.keys().copied().collect();
        for id in ids {
            let deps = nodes.get(&id).map(|n| n.deps.clone()).unwrap_or_default();
            for dep in deps {
                if let Some(dep_node) = nodes.get_mut(&dep) {
                    dep_node.dependents.push(id);
                }
            }
        }

        Self { nodes }
    }

    pub fn contains(&self, id: TaskId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn tasks(&self) -> impl Iterator<Item = TaskId> + '_ {
        self.nodes.keys().copied()
    }

    pub fn dependencies_of(&self, id: TaskId) -> &[TaskId] {
        self.nodes
            .get(&id)
            .map(|n| n.deps.as_slice())
            .unwrap_or(&[])
    }

    pub fn dependents_of(&self, id: TaskId) -> &[TaskId] {
        self.nodes
            .get(&id)
            .map(|n| n.dependents.as_slice())
            .unwrap_or(&[])
    }

    /// Depth-first search along dependency edges for a task matching
    /// `is_blocking`. Returns the path `[start, .., blocker]`.
    pub fn chain_to<F>(&self, start: TaskId, is_blocking: F) -> Option<Vec<TaskId>>
    where
        F: Fn(TaskId) -> bool,
    {
        let mut visited = HashSet::new();
        let mut path = vec![start];
        self.chain_from(start, &is_blocking, &mut visited, &mut path)
            .then_some(path)
    }

    fn chain_from<F>(
        &self,
        id: TaskId,
        is_blocking: &F,
        visited: &mut HashSet<TaskId>,
        path: &mut Vec<TaskId>,
    ) -> bool
    where
        F: Fn(TaskId) -> bool,
    {
        if !visited.insert(id) {
            return false;
        }
        for &dep in self.dependencies_of(id) {
            path.push(dep);
            if is_blocking(dep) || self.chain_from(dep, is_blocking, visited, path) {
                return true;
            }
            path.pop();
        }
        false
    }

    /// Strongly connected components among `subset` that form a cycle
    /// (more than one member, or a self-loop). Members come out sorted.
    pub fn cycles_among(&self, subset: &BTreeSet<TaskId>) -> Vec<Vec<TaskId>> {
        // Edge direction: dep -> task.
        let mut graph: DiGraphMap<TaskId, ()> = DiGraphMap::new();
        for &id in subset {
            graph.add_node(id);
        }
        for &id in subset {
            for &dep in self.dependencies_of(id) {
                if subset.contains(&dep) {
                    graph.add_edge(dep, id, ());
                }
            }
        }

        let mut cycles: Vec<Vec<TaskId>> = tarjan_scc(&graph)
            .into_iter()
            .filter(|scc| scc.len() > 1 || graph.contains_edge(scc[0], scc[0]))
            .map(|mut scc| {
                scc.sort();
                scc
            })
            .collect();
        cycles.sort();
        cycles
    }
}
