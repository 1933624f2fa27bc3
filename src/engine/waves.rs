// src/engine/waves.rs

//! Wave-by-wave execution for `execute_all`.

use std::sync::Arc;
use std::time::Instant;

use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::dag::{TaskId, Wave};
use crate::engine::state::EngineShared;
use crate::engine::summary::ExecutionSummary;
use crate::errors::{EngineError, Result};
use crate::exec::task_runner::{supervise, wait_until_terminal};
use crate::types::{BlockedPolicy, TaskStatus};

pub(crate) async fn execute_all<T>(shared: &Arc<EngineShared<T>>) -> Result<ExecutionSummary>
where
    T: Send + 'static,
{
    let _executing = shared.begin_execution()?;
    let started = Instant::now();

    let outcome = run_waves(shared).await;
    shared.record_elapsed(started.elapsed());
    outcome?;

    let summary = shared.summary();
    info!(
        total = summary.total_tasks,
        completed = summary.completed_tasks,
        failed = summary.failed_tasks,
        cancelled = summary.cancelled_tasks,
        elapsed_secs = summary.elapsed_secs,
        "execution finished"
    );
    Ok(summary)
}

async fn run_waves<T>(shared: &Arc<EngineShared<T>>) -> Result<()>
where
    T: Send + 'static,
{
    let cascade = shared.config.blocked_policy == BlockedPolicy::Cascade;

    if cascade {
        shared.cascade_blocked()?;
    }

    // Plan everything up front so cycles and unknown ids fail before any
    // task starts.
    let plan = shared.planner()?.plan()?;
    info!(
        waves = plan.len(),
        tasks = plan.iter().map(Vec::len).sum::<usize>(),
        "execution plan ready"
    );

    let mut wave_no = 0;
    loop {
        if cascade {
            shared.cascade_blocked()?;
        }

        // Re-plan from live state: earlier waves may have failed.
        let planner = shared.planner()?;
        let next = if cascade {
            planner.next_wave()
        } else {
            planner.next_wave_fail_fast()
        };
        let next = next.inspect_err(|err| {
            if let EngineError::BlockedDependency { task, .. } = err {
                warn!(task_id = %task, "dependency failed; aborting remaining waves");
            }
        })?;
        let Some(wave) = next else {
            break;
        };
        wave_no += 1;
        run_wave(shared, wave_no, wave).await?;
    }

    Ok(())
}

/// Launch every task of the wave in order, bounded by the limiter, and wait
/// until all of them are terminal. One task's failure never stops its
/// siblings.
async fn run_wave<T>(shared: &Arc<EngineShared<T>>, wave_no: usize, wave: Wave) -> Result<()>
where
    T: Send + 'static,
{
    info!(wave = wave_no, tasks = wave.len(), "starting wave");
    let mut running: JoinSet<(TaskId, TaskStatus)> = JoinSet::new();

    for id in wave {
        // Already owned by `execute_task` or `wait_for_task`: just wait.
        if let Some(rx) = shared.in_flight(id) {
            debug!(wave = wave_no, task_id = %id, "task already in flight; waiting for it");
            running.spawn(async move { (id, wait_until_terminal(rx).await) });
            continue;
        }

        let slot = shared.limiter.acquire().await?;
        match shared.launch(id) {
            Some(launch) => {
                let task = supervise(Arc::clone(shared), id, launch, slot);
                running.spawn(async move { (id, task.await) });
            }
            None => {
                drop(slot);
                if let Some(rx) = shared.watch_unless_terminal(id) {
                    running.spawn(async move { (id, wait_until_terminal(rx).await) });
                } else {
                    debug!(wave = wave_no, task_id = %id, "task finished before launch; skipping");
                }
            }
        }
    }

    let (mut completed, mut failed, mut cancelled) = (0usize, 0usize, 0usize);
    while let Some(joined) = running.join_next().await {
        match joined {
            Ok((_, TaskStatus::Completed)) => completed += 1,
            Ok((_, TaskStatus::Failed)) => failed += 1,
            Ok((_, TaskStatus::Cancelled)) => cancelled += 1,
            Ok((id, status)) => {
                warn!(wave = wave_no, task_id = %id, %status, "task left wave without a terminal status");
            }
            Err(err) => warn!(wave = wave_no, error = %err, "wave member could not be joined"),
        }
    }

    info!(wave = wave_no, completed, failed, cancelled, "wave finished");
    Ok(())
}
