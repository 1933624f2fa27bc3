// src/exec/task_runner.rs

//! Per-task attempt loop: timeout, retry with backoff, cancellation.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{oneshot, watch};
use tracing::{debug, info, warn};

use crate::dag::{TaskError, TaskId, TaskWork, WorkError};
use crate::engine::hooks::panic_message;
use crate::engine::state::{EngineShared, Launch, RetryDecision};
use crate::exec::limiter::SlotGuard;
use crate::types::TaskStatus;

/// Why an attempt did not produce a value.
struct AttemptFailure {
    retryable: bool,
    error: TaskError,
}

/// Run a launched task in its own Tokio task and wait for its terminal
/// status.
///
/// A panic inside the task's work is contained here and recorded as a
/// failure of that task alone.
pub(crate) async fn supervise<T>(
    shared: Arc<EngineShared<T>>,
    id: TaskId,
    launch: Launch<T>,
    slot: SlotGuard,
) -> TaskStatus
where
    T: Send + 'static,
{
    let runner = tokio::spawn(run_task(Arc::clone(&shared), id, launch, slot));

    match runner.await {
        Ok(status) => status,
        Err(err) => {
            let message = if err.is_panic() {
                panic_message(err.into_panic().as_ref())
            } else {
                "task runner aborted".to_string()
            };
            shared.finish_failure(id, TaskError::Panicked(message))
        }
    }
}

/// Drive attempts until the task is terminal.
///
/// The first attempt reuses the slot the launcher acquired. Every later
/// attempt waits for the backoff and a fresh slot. Cancellation is honoured
/// at each of those suspension points, including the backoff sleep.
pub(crate) async fn run_task<T>(
    shared: Arc<EngineShared<T>>,
    id: TaskId,
    launch: Launch<T>,
    slot: SlotGuard,
) -> TaskStatus
where
    T: Send + 'static,
{
    let Launch {
        work,
        timeout,
        mut cancel_rx,
    } = launch;
    let mut slot = Some(slot);

    loop {
        let guard = match slot.take() {
            Some(guard) => guard,
            None => {
                let acquired = tokio::select! {
                    acquired = shared.limiter.acquire() => acquired,
                    reason = &mut cancel_rx => {
                        return shared.finish_cancelled(id, cancel_reason(reason));
                    }
                };
                let guard = match acquired {
                    Ok(guard) => guard,
                    Err(err) => {
                        return shared.finish_failure(id, TaskError::Failed(err.to_string()));
                    }
                };
                if !shared.resume(id) {
                    return shared.status_of(id);
                }
                guard
            }
        };

        let outcome = tokio::select! {
            outcome = run_attempt(&work, timeout) => outcome,
            reason = &mut cancel_rx => {
                drop(guard);
                return shared.finish_cancelled(id, cancel_reason(reason));
            }
        };
        drop(guard);

        let failure = match outcome {
            Ok(value) => return shared.finish_success(id, value),
            Err(failure) => failure,
        };

        if !failure.retryable {
            return shared.finish_failure(id, failure.error);
        }

        match shared.schedule_retry(id) {
            RetryDecision::Exhausted => return shared.finish_failure(id, failure.error),
            RetryDecision::Retry {
                attempt,
                max_retries,
            } => {
                let delay = shared.retry.backoff(attempt);
                info!(
                    task_id = %id,
                    attempt,
                    max_retries,
                    delay_ms = delay.as_millis() as u64,
                    error = %failure.error,
                    "attempt failed; retrying after backoff"
                );
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    reason = &mut cancel_rx => {
                        return shared.finish_cancelled(id, cancel_reason(reason));
                    }
                }
            }
        }
    }
}

async fn run_attempt<T>(
    work: &TaskWork<T>,
    timeout: Option<Duration>,
) -> Result<T, AttemptFailure>
where
    T: Send + 'static,
{
    let attempt = work.invoke();

    let result = match timeout {
        Some(limit) => match tokio::time::timeout(limit, attempt).await {
            Ok(result) => result,
            Err(_) => {
                return Err(AttemptFailure {
                    retryable: true,
                    error: TaskError::Timeout(limit),
                });
            }
        },
        None => attempt.await,
    };

    result.map_err(|err| match err {
        WorkError::Retryable(msg) => AttemptFailure {
            retryable: true,
            error: TaskError::Failed(msg),
        },
        WorkError::Fatal(msg) => AttemptFailure {
            retryable: false,
            error: TaskError::Fatal(msg),
        },
    })
}

fn cancel_reason(received: Result<String, oneshot::error::RecvError>) -> String {
    match received {
        Ok(reason) => reason,
        Err(_) => {
            debug!("cancel channel closed without explicit cancellation");
            "cancel channel closed".to_string()
        }
    }
}

/// Wait until the watched task reaches a terminal status.
pub(crate) async fn wait_until_terminal(mut rx: watch::Receiver<TaskStatus>) -> TaskStatus {
    let waited = rx.wait_for(|s| s.is_terminal()).await.map(|status| *status);
    match waited {
        Ok(status) => status,
        Err(_) => {
            let status = *rx.borrow();
            warn!(%status, "task record dropped before reaching a terminal status");
            status
        }
    }
}
