// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use crate::config::default_config_path;
use crate::types::BlockedPolicy;

/// Command-line arguments for `taskwave`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "taskwave",
    version,
    about = "Run a dependency graph of shell commands in prioritized, concurrency-bounded waves.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the task file (TOML).
    #[arg(long, value_name = "PATH", default_value_os_t = default_config_path())]
    pub config: PathBuf,

    /// Validate the task file and print the planned waves without running
    /// anything.
    #[arg(long)]
    pub dry_run: bool,

    /// Override `[engine].max_concurrent_tasks`.
    #[arg(long, value_name = "N", value_parser = clap::value_parser!(u64).range(1..))]
    pub max_concurrent: Option<u64>,

    /// Override `[engine].blocked_policy`.
    #[arg(long, value_enum, value_name = "POLICY")]
    pub blocked_policy: Option<BlockedPolicyArg>,

    /// Print the execution summary as JSON on stdout.
    #[arg(long)]
    pub json: bool,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `TASKWAVE_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,
}

/// Blocked-dependency policy as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum BlockedPolicyArg {
    Fail,
    Cascade,
}

impl From<BlockedPolicyArg> for BlockedPolicy {
    fn from(arg: BlockedPolicyArg) -> Self {
        match arg {
            BlockedPolicyArg::Fail => BlockedPolicy::Fail,
            BlockedPolicyArg::Cascade => BlockedPolicy::Cascade,
        }
    }
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
