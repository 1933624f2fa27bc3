// src/config/register.rs

//! Turning a validated task file into engine tasks.

use std::collections::BTreeMap;

use tracing::debug;

use crate::config::model::ConfigFile;
use crate::dag::{TaskDefinition, TaskId};
use crate::engine::TaskEngine;
use crate::errors::{EngineError, Result};
use crate::exec::{CommandOutput, shell_work};

/// Register every `[task.<name>]` of `cfg` as a shell-command task.
///
/// Tasks are registered in name order, which is also the tie-breaker
/// between equal priorities. Dependencies are wired once every task has
/// an id, so `after` may reference tasks declared later in the file.
pub fn register_tasks(
    engine: &TaskEngine<CommandOutput>,
    cfg: &ConfigFile,
) -> Result<BTreeMap<String, TaskId>> {
    let mut ids = BTreeMap::new();

    for (name, task) in cfg.task.iter() {
        let mut def = TaskDefinition::new(name.clone(), shell_work(name.clone(), task.cmd.clone()))
            .priority(task.priority)
            .max_retries(task.max_retries);
        if let Some(timeout) = task.timeout() {
            def = def.timeout(timeout);
        }
        for (key, value) in task.metadata.iter() {
            def = def.metadata(key.clone(), value.clone());
        }

        let id = engine.add_task(def)?;
        debug!(task = %name, task_id = %id, "registered task from config");
        ids.insert(name.clone(), id);
    }

    for (name, task) in cfg.task.iter() {
        let id = lookup(&ids, name)?;
        for dep in task.after.iter() {
            engine.add_dependency(id, lookup(&ids, dep)?)?;
        }
    }

    Ok(ids)
}

fn lookup(ids: &BTreeMap<String, TaskId>, name: &str) -> Result<TaskId> {
    ids.get(name)
        .copied()
        .ok_or_else(|| EngineError::Validation(format!("unknown task '{name}'")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::model::RawConfigFile;
    use crate::types::Priority;

    #[test]
    fn wires_dependencies_by_name() {
        let raw: RawConfigFile = toml::from_str(
            r#"
            [task.deploy]
            cmd = "true"
            after = ["build"]
            priority = "high"
            metadata = { env = "prod" }

            [task.build]
            cmd = "true"
            timeout_secs = 2.0
            "#,
        )
        .unwrap();
        let cfg = ConfigFile::try_from(raw).unwrap();
        let engine = TaskEngine::default();

        let ids = register_tasks(&engine, &cfg).unwrap();
        let deploy = engine.task(ids["deploy"]).unwrap();
        let build = engine.task(ids["build"]).unwrap();

        assert_eq!(deploy.dependencies, vec![ids["build"]]);
        assert_eq!(deploy.priority, Priority::High);
        assert_eq!(deploy.metadata["env"], "prod");
        assert_eq!(build.timeout, Some(std::time::Duration::from_secs(2)));
        assert_eq!(engine.plan().unwrap(), vec![vec![ids["build"]], vec![ids["deploy"]]]);
    }
}
