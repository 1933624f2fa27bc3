#![allow(dead_code)]

use std::collections::BTreeMap;

use taskwave::config::{ConfigFile, EngineConfig, RawConfigFile, TaskConfig};
use taskwave::errors::Result;
use taskwave::types::{BlockedPolicy, Priority};

/// Builder for `ConfigFile` to simplify test setup.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile {
                engine: EngineConfig::default(),
                task: BTreeMap::new(),
            },
        }
    }

    pub fn with_task(mut self, name: &str, task: TaskConfig) -> Self {
        self.config.task.insert(name.to_string(), task);
        self
    }

    pub fn max_concurrent_tasks(mut self, n: usize) -> Self {
        self.config.engine.max_concurrent_tasks = n;
        self
    }

    pub fn blocked_policy(mut self, policy: BlockedPolicy) -> Self {
        self.config.engine.blocked_policy = policy;
        self
    }

    pub fn retry_delays_ms(mut self, base: u64, max: u64) -> Self {
        self.config.engine.retry_base_delay_ms = base;
        self.config.engine.retry_max_delay_ms = max;
        self
    }

    pub fn raw(self) -> RawConfigFile {
        self.config
    }

    pub fn try_build(self) -> Result<ConfigFile> {
        ConfigFile::try_from(self.config)
    }

    pub fn build(self) -> ConfigFile {
        self.try_build()
            .expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `TaskConfig`.
pub struct TaskConfigBuilder {
    task: TaskConfig,
}

impl TaskConfigBuilder {
    pub fn new(cmd: &str) -> Self {
        Self {
            task: TaskConfig {
                cmd: cmd.to_string(),
                after: vec![],
                priority: Priority::Normal,
                timeout_secs: None,
                max_retries: 0,
                metadata: BTreeMap::new(),
            },
        }
    }

    pub fn after(mut self, dep: &str) -> Self {
        self.task.after.push(dep.to_string());
        self
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.task.priority = priority;
        self
    }

    pub fn timeout_secs(mut self, secs: f64) -> Self {
        self.task.timeout_secs = Some(secs);
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.task.max_retries = n;
        self
    }

    pub fn metadata(mut self, key: &str, value: &str) -> Self {
        self.task.metadata.insert(key.to_string(), value.to_string());
        self
    }

    pub fn build(self) -> TaskConfig {
        self.task
    }
}
