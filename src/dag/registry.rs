// src/dag/registry.rs

//! Ownership of every task known to an engine.
//!
//! Dependencies are *not* validated here: tasks can be added in any order
//! and edges wired afterwards, so unknown ids are only reported when a plan
//! is computed.

use std::collections::{BTreeMap, HashMap};

use tracing::debug;

use crate::dag::task_info::{TaskDefinition, TaskId, TaskRecord, TaskSnapshot};
use crate::errors::{EngineError, Result};
use crate::types::TaskStatus;

#[derive(Debug)]
pub struct TaskRegistry<T> {
    tasks: HashMap<TaskId, TaskRecord<T>>,
    /// Ids in registration order.
    order: Vec<TaskId>,
}

impl<T> Default for TaskRegistry<T> {
    fn default() -> Self {
        Self {
            tasks: HashMap::new(),
            order: Vec::new(),
        }
    }
}

impl<T> TaskRegistry<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a task and return its freshly assigned id.
    pub fn add(&mut self, def: TaskDefinition<T>) -> Result<TaskId> {
        validate_definition(&def)?;
        Ok(self.insert(def))
    }

    /// Register several tasks, returning ids in input order.
    ///
    /// All definitions are validated before any is inserted.
    pub fn add_group(&mut self, defs: Vec<TaskDefinition<T>>) -> Result<Vec<TaskId>> {
        for def in &defs {
            validate_definition(def)?;
        }
        Ok(defs.into_iter().map(|def| self.insert(def)).collect())
    }

    fn insert(&mut self, def: TaskDefinition<T>) -> TaskId {
        let id = TaskId::next();
        let seq = self.order.len() as u64;
        debug!(task = %def.name, task_id = %id, priority = %def.priority, "registered task");
        self.tasks.insert(id, TaskRecord::new(id, seq, def));
        self.order.push(id);
        id
    }

    /// Make `task` depend on `on`. `on` does not need to exist yet.
    pub fn add_dependency(&mut self, task: TaskId, on: TaskId) -> Result<()> {
        if task == on {
            return Err(EngineError::Validation(format!(
                "task {task} cannot depend on itself"
            )));
        }
        let record = self
            .tasks
            .get_mut(&task)
            .ok_or(EngineError::TaskNotFound(task))?;
        if record.status() != TaskStatus::Pending {
            return Err(EngineError::Validation(format!(
                "cannot add dependencies to task {task} in status {}",
                record.status()
            )));
        }
        record.dependencies.insert(on);
        Ok(())
    }

    pub fn get(&self, id: TaskId) -> Option<&TaskRecord<T>> {
        self.tasks.get(&id)
    }

    pub fn get_mut(&mut self, id: TaskId) -> Option<&mut TaskRecord<T>> {
        self.tasks.get_mut(&id)
    }

    pub fn contains(&self, id: TaskId) -> bool {
        self.tasks.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Records in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &TaskRecord<T>> {
        self.order.iter().filter_map(|id| self.tasks.get(id))
    }

    pub fn status(&self, id: TaskId) -> Result<TaskStatus> {
        self.tasks
            .get(&id)
            .map(TaskRecord::status)
            .ok_or(EngineError::TaskNotFound(id))
    }

    pub fn statuses(&self) -> BTreeMap<TaskId, TaskStatus> {
        self.iter().map(|rec| (rec.id, rec.status())).collect()
    }

    pub fn snapshots(&self) -> Vec<TaskSnapshot> {
        self.iter().map(TaskRecord::snapshot).collect()
    }
}

fn validate_definition<T>(def: &TaskDefinition<T>) -> Result<()> {
    if def.name.trim().is_empty() {
        return Err(EngineError::Validation(
            "task name must not be empty".to_string(),
        ));
    }
    if def.timeout.is_some_and(|t| t.is_zero()) {
        return Err(EngineError::Validation(format!(
            "task '{}' has a zero timeout",
            def.name
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::dag::task_info::TaskWork;
    use crate::types::Priority;

    fn def(name: &str) -> TaskDefinition<()> {
        TaskDefinition::new(name, TaskWork::new(|| async { Ok(()) }))
    }

    #[test]
    fn add_applies_defaults() {
        let mut reg = TaskRegistry::new();
        let id = reg.add(def("a")).unwrap();
        let rec = reg.get(id).unwrap();
        assert_eq!(rec.priority, Priority::Normal);
        assert_eq!(rec.max_retries, 0);
        assert_eq!(rec.retry_attempts, 0);
        assert_eq!(rec.status(), TaskStatus::Pending);
    }

    #[test]
    fn group_preserves_input_order() {
        let mut reg = TaskRegistry::new();
        let ids = reg.add_group(vec![def("a"), def("b"), def("c")]).unwrap();
        let names: Vec<_> = reg.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
        let seqs: Vec<_> = ids.iter().map(|id| reg.get(*id).unwrap().seq).collect();
        assert_eq!(seqs, vec![0, 1, 2]);
    }

    #[test]
    fn group_is_all_or_nothing() {
        let mut reg = TaskRegistry::new();
        let err = reg.add_group(vec![def("a"), def("  ")]).unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
        assert!(reg.is_empty());
    }

    #[test]
    fn rejects_zero_timeout() {
        let mut reg = TaskRegistry::new();
        let err = reg.add(def("a").timeout(Duration::ZERO)).unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
    }

    #[test]
    fn forward_dependencies_are_accepted() {
        let mut reg = TaskRegistry::new();
        let a = reg.add(def("a").depends_on(TaskId::from(u64::MAX))).unwrap();
        let b = reg.add(def("b")).unwrap();
        reg.add_dependency(b, a).unwrap();
        assert!(reg.get(b).unwrap().dependencies.contains(&a));
        assert!(matches!(
            reg.add_dependency(a, a),
            Err(EngineError::Validation(_))
        ));
    }
}
