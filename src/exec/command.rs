// src/exec/command.rs

//! Shell-command work for tasks defined in a task file.

use std::process::Stdio;

use anyhow::Context;
use serde::Serialize;
use tokio::process::Command;
use tracing::{debug, info};

use crate::dag::{TaskWork, WorkError};

/// What a finished command left behind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandOutput {
    pub exit_code: i32,
    pub stdout: String,
}

/// Work that runs `cmd` through the platform shell on every attempt.
///
/// - exit status 0 completes the task with the captured stdout
/// - a non-zero exit is retryable and carries the tail of stderr
/// - failing to spawn the shell at all is fatal
///
/// The child is spawned with `kill_on_drop`, so a timeout or cancellation
/// that drops the attempt also kills the process.
pub fn shell_work(name: impl Into<String>, cmd: impl Into<String>) -> TaskWork<CommandOutput> {
    let name = name.into();
    let cmd = cmd.into();
    TaskWork::new(move || run_command(name.clone(), cmd.clone()))
}

async fn run_command(name: String, cmd: String) -> Result<CommandOutput, WorkError> {
    info!(task = %name, cmd = %cmd, "starting task process");

    // Build a shell command appropriate for the platform.
    let mut command = if cfg!(windows) {
        let mut c = Command::new("cmd");
        c.arg("/C").arg(&cmd);
        c
    } else {
        let mut c = Command::new("sh");
        c.arg("-c").arg(&cmd);
        c
    };

    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let child = command
        .spawn()
        .with_context(|| format!("spawning process for task '{name}'"))
        .map_err(|e| WorkError::fatal(format!("{e:#}")))?;

    let output = child
        .wait_with_output()
        .await
        .with_context(|| format!("waiting for process of task '{name}'"))?;

    let code = output.status.code().unwrap_or(-1);
    let stderr = String::from_utf8_lossy(&output.stderr);
    for line in stderr.lines() {
        debug!(task = %name, "stderr: {}", line);
    }

    info!(
        task = %name,
        exit_code = code,
        success = output.status.success(),
        "task process exited"
    );

    if output.status.success() {
        Ok(CommandOutput {
            exit_code: code,
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        })
    } else {
        Err(WorkError::Retryable(format!(
            "command exited with code {code}: {}",
            stderr_tail(&stderr)
        )))
    }
}

fn stderr_tail(stderr: &str) -> String {
    const MAX_LINES: usize = 5;
    let lines: Vec<&str> = stderr.lines().filter(|l| !l.trim().is_empty()).collect();
    let start = lines.len().saturating_sub(MAX_LINES);
    lines[start..].join(" | ")
}
