// src/lib.rs

pub mod cli;
pub mod config;
pub mod dag;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod logging;
pub mod types;

use anyhow::Result;
use tracing::{debug, info, warn};

use crate::cli::CliArgs;
use crate::config::loader::load_and_validate;
use crate::config::register_tasks;
use crate::engine::{ExecutionSummary, TaskEngine};
use crate::exec::CommandOutput;

/// High-level entry point used by `main.rs`.
///
/// Loads the task file, registers its tasks, then either prints the plan
/// (`--dry-run`) or runs everything. Ctrl-C cancels all tasks. Fails when
/// any task failed or was cancelled.
pub async fn run(args: CliArgs) -> Result<()> {
    let cfg = load_and_validate(&args.config)?;

    let mut engine_cfg = cfg.engine.clone();
    if let Some(n) = args.max_concurrent {
        engine_cfg = engine_cfg.with_max_concurrent_tasks(usize::try_from(n)?);
    }
    if let Some(policy) = args.blocked_policy {
        engine_cfg = engine_cfg.with_blocked_policy(policy.into());
    }

    let engine: TaskEngine<CommandOutput> = TaskEngine::new(engine_cfg);
    let ids = register_tasks(&engine, &cfg)?;
    info!(tasks = ids.len(), config = %args.config.display(), "task file loaded");

    if args.dry_run {
        print_dry_run(&engine)?;
        return Ok(());
    }

    // Ctrl-C → cancel everything still pending or running.
    {
        let engine = engine.clone();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "failed to listen for Ctrl+C");
                return;
            }
            info!("Ctrl+C received; cancelling all tasks");
            engine.cancel_all_tasks().await;
        });
    }

    let outcome = engine.execute_all().await;
    let summary = engine.summary();
    report(&engine, &summary, args.json)?;
    outcome?;

    if !summary.is_success() {
        anyhow::bail!(
            "{} task(s) failed, {} cancelled",
            summary.failed_tasks,
            summary.cancelled_tasks
        );
    }
    Ok(())
}

fn report(
    engine: &TaskEngine<CommandOutput>,
    summary: &ExecutionSummary,
    json: bool,
) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(summary)?);
        return Ok(());
    }

    for task in engine.tasks() {
        match &task.error {
            Some(err) => println!("  {:<24} {:<10} {}", task.name, task.status, err),
            None => println!("  {:<24} {}", task.name, task.status),
        }
    }
    println!("{summary}");
    Ok(())
}

/// Print the planned waves without executing anything.
fn print_dry_run(engine: &TaskEngine<CommandOutput>) -> Result<()> {
    let waves = engine.plan()?;
    let config = engine.config();

    println!("taskwave dry-run");
    println!("  engine.max_concurrent_tasks = {}", config.max_concurrent_tasks);
    println!("  engine.blocked_policy = {:?}", config.blocked_policy);
    println!();

    println!("waves ({}):", waves.len());
    for (i, wave) in waves.iter().enumerate() {
        println!("  wave {}:", i + 1);
        for id in wave {
            let task = engine.task(*id)?;
            println!("    - {} [{}]", task.name, task.priority);
            if let Some(timeout) = task.timeout {
                println!("        timeout: {timeout:?}");
            }
            if task.max_retries > 0 {
                println!("        max_retries: {}", task.max_retries);
            }
        }
    }

    debug!("dry-run complete (no execution)");
    Ok(())
}
