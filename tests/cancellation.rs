use std::time::{Duration, Instant};

use taskwave::dag::{TaskDefinition, TaskId};
use taskwave::engine::TaskEngine;
use taskwave::errors::EngineError;
use taskwave::types::{Priority, TaskStatus};
use taskwave_test_utils::observer::RecordingObserver;
use taskwave_test_utils::work::{always_fail, pending_forever, succeed};
use taskwave_test_utils::{fast_config, fast_engine, init_tracing, with_timeout};

async fn wait_for_status<T>(engine: &TaskEngine<T>, id: TaskId, status: TaskStatus) {
    with_timeout(async {
        while engine.task_status(id).unwrap() != status {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    })
    .await;
}

#[tokio::test]
async fn cancelling_running_task_frees_its_slot() {
    let engine = fast_engine::<u32>(1);
    let observer = RecordingObserver::new();
    engine.add_observer(observer.clone());

    let (stuck, _) = pending_forever();
    let blocker = engine
        .add_task(TaskDefinition::new("stuck", stuck).priority(Priority::High))
        .unwrap();
    let queued = engine.add_task(TaskDefinition::new("queued", succeed(2))).unwrap();

    let driver = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.execute_all().await })
    };
    wait_for_status(&engine, blocker, TaskStatus::Running).await;
    assert_eq!(engine.running_slots(), 1);
    assert_eq!(engine.task_status(queued).unwrap(), TaskStatus::Pending);

    assert!(engine.cancel_task(blocker).await.unwrap());
    assert_eq!(engine.task_status(blocker).unwrap(), TaskStatus::Cancelled);

    let summary = with_timeout(driver).await.unwrap().unwrap();
    assert_eq!(engine.task_status(queued).unwrap(), TaskStatus::Completed);
    assert_eq!(summary.cancelled_tasks, 1);
    assert_eq!(summary.completed_tasks, 1);
    assert_eq!(engine.running_slots(), 0);
    assert_eq!(observer.cancelled(), vec!["stuck"]);

    let task = engine.task(blocker).unwrap();
    assert!(task.completed_at.is_some());
    assert!(matches!(
        engine.wait_for_task(blocker, None).await,
        Err(EngineError::Cancelled { .. })
    ));
}

#[tokio::test]
async fn cancelling_pending_task_skips_it() {
    let engine = fast_engine::<u32>(2);
    let observer = RecordingObserver::new();
    engine.add_observer(observer.clone());

    let skipped = engine.add_task(TaskDefinition::new("skipped", succeed(1))).unwrap();
    let kept = engine.add_task(TaskDefinition::new("kept", succeed(2))).unwrap();

    assert!(engine.cancel_task(skipped).await.unwrap());
    // Terminal tasks cannot be cancelled again.
    assert!(!engine.cancel_task(skipped).await.unwrap());

    let summary = with_timeout(engine.execute_all()).await.unwrap();
    assert_eq!(summary.cancelled_tasks, 1);
    assert_eq!(engine.task_status(kept).unwrap(), TaskStatus::Completed);
    assert_eq!(observer.started(), vec!["kept"]);
    assert_eq!(observer.cancelled(), vec!["skipped"]);
}

#[tokio::test]
async fn cancelling_completed_task_returns_false() {
    let engine = fast_engine::<u32>(1);
    let id = engine.add_task(TaskDefinition::new("a", succeed(1))).unwrap();
    engine.execute_task(id).await.unwrap();

    assert!(!engine.cancel_task(id).await.unwrap());
    assert_eq!(engine.task_status(id).unwrap(), TaskStatus::Completed);
}

#[tokio::test]
async fn cancelling_unknown_task_is_an_error() {
    let engine = fast_engine::<u32>(1);
    let missing = TaskId::from(u64::MAX);
    assert!(matches!(
        engine.cancel_task(missing).await,
        Err(EngineError::TaskNotFound(id)) if id == missing
    ));
}

#[tokio::test]
async fn cancel_during_backoff_is_immediate() {
    init_tracing();
    // Long backoff: the test only finishes quickly if cancellation cuts it short.
    let config = fast_config(1)
        .with_retry_delays(Duration::from_secs(20), Duration::from_secs(20));
    let engine: TaskEngine<u32> = TaskEngine::new(config);

    let (work, calls) = always_fail("flaky backend");
    let id = engine
        .add_task(TaskDefinition::new("retrying", work).max_retries(5))
        .unwrap();

    let driver = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.execute_all().await })
    };

    with_timeout(async {
        while !(calls.count() >= 1 && engine.task_status(id).unwrap() == TaskStatus::Pending) {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    })
    .await;
    // Parked between attempts: no slot is held.
    assert_eq!(engine.running_slots(), 0);

    let started = Instant::now();
    assert!(with_timeout(engine.cancel_task(id)).await.unwrap());
    assert!(started.elapsed() < Duration::from_secs(2));

    let summary = with_timeout(driver).await.unwrap().unwrap();
    assert_eq!(summary.cancelled_tasks, 1);
    assert_eq!(calls.count(), 1);
    assert_eq!(engine.task(id).unwrap().retry_attempts, 1);
}

#[tokio::test]
async fn cancel_all_covers_running_queued_and_dependent_tasks() {
    let engine = fast_engine::<u32>(2);
    let observer = RecordingObserver::new();
    engine.add_observer(observer.clone());

    let mut roots = Vec::new();
    for i in 0..3 {
        let (work, _) = pending_forever();
        roots.push(
            engine
                .add_task(TaskDefinition::new(format!("root{i}"), work))
                .unwrap(),
        );
    }
    engine
        .add_task(TaskDefinition::new("leaf", succeed(1)).depends_on_all(roots.clone()))
        .unwrap();

    let driver = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.execute_all().await })
    };
    wait_for_status(&engine, roots[1], TaskStatus::Running).await;
    assert_eq!(engine.running_slots(), 2);

    let cancelled = with_timeout(engine.cancel_all_tasks()).await;
    assert_eq!(cancelled, 4);

    let summary = with_timeout(driver).await.unwrap().unwrap();
    assert_eq!(summary.cancelled_tasks, 4);
    assert_eq!(engine.running_slots(), 0);
    assert_eq!(observer.started().len(), 2);
    assert_eq!(observer.cancelled().len(), 4);
    assert!(observer.completed().is_empty());

    // Nothing left to cancel.
    assert_eq!(engine.cancel_all_tasks().await, 0);
}
