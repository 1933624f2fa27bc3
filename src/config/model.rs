// src/config/model.rs

use std::collections::BTreeMap;
use std::time::Duration;

use serde::Deserialize;

use crate::exec::RetryPolicy;
use crate::types::{BlockedPolicy, Priority};

/// A task file exactly as deserialized from TOML.
///
/// ```toml
/// [engine]
/// max_concurrent_tasks = 4
/// blocked_policy = "cascade"
///
/// [task.fetch]
/// cmd = "git fetch"
///
/// [task.build]
/// cmd = "cargo build"
/// after = ["fetch"]
/// priority = "high"
/// timeout_secs = 30.0
/// max_retries = 2
/// ```
///
/// Nothing here has been validated; convert into [`ConfigFile`] with
/// `ConfigFile::try_from` (see `validate.rs`).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawConfigFile {
    #[serde(default)]
    pub engine: EngineConfig,

    /// Tasks from `[task.<name>]`, keyed by name.
    #[serde(default)]
    pub task: BTreeMap<String, TaskConfig>,
}

/// A validated task file.
///
/// Only obtainable through validation, so holders can rely on every `after`
/// entry naming a known task and on the graph being acyclic.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub engine: EngineConfig,
    pub task: BTreeMap<String, TaskConfig>,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(engine: EngineConfig, task: BTreeMap<String, TaskConfig>) -> Self {
        Self { engine, task }
    }
}

/// Engine tuning, from `[engine]` or built in code.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    /// Upper bound on tasks running at the same time.
    #[serde(default = "default_max_concurrent_tasks")]
    pub max_concurrent_tasks: usize,

    #[serde(default)]
    pub blocked_policy: BlockedPolicy,

    /// Backoff before retry `n` is `min(base * 2^n, max)`.
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,

    #[serde(default = "default_retry_max_delay_ms")]
    pub retry_max_delay_ms: u64,
}

fn default_max_concurrent_tasks() -> usize {
    4
}

fn default_retry_base_delay_ms() -> u64 {
    1_000
}

fn default_retry_max_delay_ms() -> u64 {
    10_000
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_concurrent_tasks: default_max_concurrent_tasks(),
            blocked_policy: BlockedPolicy::default(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            retry_max_delay_ms: default_retry_max_delay_ms(),
        }
    }
}

impl EngineConfig {
    pub fn with_max_concurrent_tasks(mut self, n: usize) -> Self {
        self.max_concurrent_tasks = n;
        self
    }

    pub fn with_blocked_policy(mut self, policy: BlockedPolicy) -> Self {
        self.blocked_policy = policy;
        self
    }

    /// Override the backoff curve. Tests use millisecond delays here.
    pub fn with_retry_delays(mut self, base: Duration, max: Duration) -> Self {
        self.retry_base_delay_ms = base.as_millis() as u64;
        self.retry_max_delay_ms = max.as_millis() as u64;
        self
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            Duration::from_millis(self.retry_base_delay_ms),
            Duration::from_millis(self.retry_max_delay_ms),
        )
    }
}

/// `[task.<name>]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TaskConfig {
    /// Shell command run on every attempt.
    pub cmd: String,

    /// Names of tasks that must complete first.
    #[serde(default)]
    pub after: Vec<String>,

    #[serde(default)]
    pub priority: Priority,

    /// Per-attempt timeout in seconds; `None` means unbounded.
    #[serde(default)]
    pub timeout_secs: Option<f64>,

    #[serde(default)]
    pub max_retries: u32,

    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl TaskConfig {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs
            .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_uses_defaults() {
        let raw: RawConfigFile = toml::from_str("").unwrap();
        assert_eq!(raw.engine, EngineConfig::default());
        assert_eq!(raw.engine.max_concurrent_tasks, 4);
        assert_eq!(raw.engine.blocked_policy, BlockedPolicy::Fail);
        assert!(raw.task.is_empty());
    }

    #[test]
    fn parses_full_task_section() {
        let raw: RawConfigFile = toml::from_str(
            r#"
            [engine]
            max_concurrent_tasks = 2
            blocked_policy = "cascade"
            retry_base_delay_ms = 5

            [task.build]
            cmd = "make"
            after = ["fetch"]
            priority = "critical"
            timeout_secs = 1.5
            max_retries = 3
            metadata = { owner = "ci" }
            "#,
        )
        .unwrap();

        assert_eq!(raw.engine.max_concurrent_tasks, 2);
        assert_eq!(raw.engine.blocked_policy, BlockedPolicy::Cascade);
        assert_eq!(raw.engine.retry_max_delay_ms, 10_000);

        let build = &raw.task["build"];
        assert_eq!(build.after, vec!["fetch".to_string()]);
        assert_eq!(build.priority, Priority::Critical);
        assert_eq!(build.timeout(), Some(Duration::from_millis(1500)));
        assert_eq!(build.max_retries, 3);
        assert_eq!(build.metadata["owner"], "ci");
    }

    #[test]
    fn oversized_timeout_is_not_a_duration() {
        let raw: RawConfigFile =
            toml::from_str("[task.a]\ncmd = \"true\"\ntimeout_secs = 1e300\n").unwrap();
        assert_eq!(raw.task["a"].timeout(), None);
    }

    #[test]
    fn rejects_unknown_fields() {
        let err = toml::from_str::<RawConfigFile>("[task.a]\ncmd = \"x\"\nwatch = []\n");
        assert!(err.is_err());
    }

    #[test]
    fn retry_policy_follows_delays() {
        let cfg = EngineConfig::default()
            .with_retry_delays(Duration::from_millis(2), Duration::from_millis(5));
        let policy = cfg.retry_policy();
        assert_eq!(policy.backoff(1), Duration::from_millis(4));
        assert_eq!(policy.backoff(3), Duration::from_millis(5));
    }
}
