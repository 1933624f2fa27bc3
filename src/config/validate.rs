// src/config/validate.rs

use std::time::Duration;

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::{EngineError, Result};

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = EngineError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        Ok(ConfigFile::new_unchecked(raw.engine, raw.task))
    }
}

fn validate_raw_config(cfg: &RawConfigFile) -> Result<()> {
    ensure_has_tasks(cfg)?;
    validate_engine_config(cfg)?;
    validate_tasks(cfg)?;
    validate_task_dependencies(cfg)?;
    validate_dag(cfg)?;
    Ok(())
}

fn ensure_has_tasks(cfg: &RawConfigFile) -> Result<()> {
    if cfg.task.is_empty() {
        return Err(EngineError::Validation(
            "config must contain at least one [task.<name>] section".to_string(),
        ));
    }
    Ok(())
}

fn validate_engine_config(cfg: &RawConfigFile) -> Result<()> {
    let engine = &cfg.engine;

    if engine.max_concurrent_tasks == 0 {
        return Err(EngineError::Validation(
            "[engine].max_concurrent_tasks must be >= 1 (got 0)".to_string(),
        ));
    }

    if engine.retry_base_delay_ms > engine.retry_max_delay_ms {
        return Err(EngineError::Validation(format!(
            "[engine].retry_base_delay_ms ({}) must not exceed retry_max_delay_ms ({})",
            engine.retry_base_delay_ms, engine.retry_max_delay_ms
        )));
    }

    Ok(())
}

fn validate_tasks(cfg: &RawConfigFile) -> Result<()> {
    for (name, task) in cfg.task.iter() {
        if task.cmd.trim().is_empty() {
            return Err(EngineError::Validation(format!(
                "task '{name}' has an empty `cmd`"
            )));
        }
        if let Some(secs) = task.timeout_secs {
            if !secs.is_finite() || secs <= 0.0 {
                return Err(EngineError::Validation(format!(
                    "task '{name}' has invalid `timeout_secs` {secs} (must be a positive number)"
                )));
            }
            if Duration::try_from_secs_f64(secs).is_err() {
                return Err(EngineError::Validation(format!(
                    "task '{name}' has `timeout_secs` {secs}, which is too large"
                )));
            }
        }
    }
    Ok(())
}

fn validate_task_dependencies(cfg: &RawConfigFile) -> Result<()> {
    for (name, task) in cfg.task.iter() {
        for dep in task.after.iter() {
            if dep == name {
                return Err(EngineError::Validation(format!(
                    "task '{name}' cannot depend on itself in `after`"
                )));
            }
            if !cfg.task.contains_key(dep) {
                return Err(EngineError::Validation(format!(
                    "task '{name}' has unknown dependency '{dep}' in `after`"
                )));
            }
        }
    }
    Ok(())
}

fn validate_dag(cfg: &RawConfigFile) -> Result<()> {
    // Edge direction: dep -> task, so `[task.B] after = ["A"]` adds A -> B.
    let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();

    for name in cfg.task.keys() {
        graph.add_node(name.as_str());
    }

    for (name, task) in cfg.task.iter() {
        for dep in task.after.iter() {
            graph.add_edge(dep.as_str(), name.as_str(), ());
        }
    }

    match toposort(&graph, None) {
        Ok(_order) => Ok(()),
        Err(cycle) => {
            let node = cycle.node_id();
            Err(EngineError::CircularDependency {
                tasks: Vec::new(),
                cycles: format!("cycle detected in task file involving task '{node}'"),
            })
        }
    }
}
