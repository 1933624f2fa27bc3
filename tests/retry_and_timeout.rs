use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use taskwave::dag::{TaskDefinition, TaskWork};
use taskwave::errors::EngineError;
use taskwave::types::TaskStatus;
use taskwave_test_utils::observer::RecordingObserver;
use taskwave_test_utils::work::{always_fail, fatal, flaky, panicking, sleep_then, succeed};
use taskwave_test_utils::{fast_engine, with_timeout};

#[tokio::test]
async fn retries_until_success_within_budget() {
    let engine = fast_engine::<&'static str>(2);
    let observer = RecordingObserver::new();
    engine.add_observer(observer.clone());

    let (work, calls) = flaky(2, "done");
    let id = engine
        .add_task(TaskDefinition::new("flaky", work).max_retries(2))
        .unwrap();

    let summary = with_timeout(engine.execute_all()).await.unwrap();

    let task = engine.task(id).unwrap();
    assert_eq!(task.status, TaskStatus::Completed);
    assert_eq!(task.retry_attempts, 2);
    assert_eq!(calls.count(), 3);
    assert_eq!(engine.task_result(id).unwrap(), Some("done"));
    assert_eq!(summary.completed_tasks, 1);
    // One started event per attempt, a single completion.
    assert_eq!(observer.started().len(), 3);
    assert_eq!(observer.completed(), vec!["flaky"]);
    assert!(observer.failed().is_empty());
}

#[tokio::test]
async fn exhausted_budget_marks_task_failed() {
    let engine = fast_engine::<&'static str>(2);
    let observer = RecordingObserver::new();
    engine.add_observer(observer.clone());

    let (work, calls) = flaky(2, "never");
    let id = engine
        .add_task(TaskDefinition::new("flaky", work).max_retries(1))
        .unwrap();

    let summary = with_timeout(engine.execute_all()).await.unwrap();

    let task = engine.task(id).unwrap();
    assert_eq!(task.status, TaskStatus::Failed);
    assert_eq!(task.retry_attempts, 1);
    assert_eq!(calls.count(), 2);
    assert!(task.completed_at.is_some());
    assert_eq!(task.error.as_deref(), Some("attempt 2 failed"));
    assert_eq!(summary.failed_tasks, 1);
    assert_eq!(
        observer.failed(),
        vec![("flaky".to_string(), "attempt 2 failed".to_string())]
    );
}

#[tokio::test]
async fn fatal_errors_skip_remaining_retries() {
    let engine = fast_engine::<u32>(1);
    let (work, calls) = fatal("bad input");
    let id = engine
        .add_task(TaskDefinition::new("strict", work).max_retries(5))
        .unwrap();

    let err = with_timeout(engine.execute_task(id)).await.unwrap_err();

    assert_eq!(calls.count(), 1);
    assert_eq!(engine.task(id).unwrap().retry_attempts, 0);
    match err {
        EngineError::TaskExecution { task, message } => {
            assert_eq!(task, id);
            assert!(message.contains("bad input"));
        }
        other => panic!("expected task execution error, got {other:?}"),
    }
}

#[tokio::test]
async fn attempt_timeout_fails_the_task() {
    let engine = fast_engine::<u32>(1);
    let id = engine
        .add_task(
            TaskDefinition::new("slow", sleep_then(Duration::from_secs(30), 1))
                .timeout(Duration::from_millis(20)),
        )
        .unwrap();

    let err = with_timeout(engine.execute_task(id)).await.unwrap_err();

    assert!(matches!(
        err,
        EngineError::ExecutionTimeout { task, after } if task == id && after == Duration::from_millis(20)
    ));
    assert_eq!(engine.task_status(id).unwrap(), TaskStatus::Failed);
    assert_eq!(engine.running_slots(), 0);
}

#[tokio::test]
async fn timed_out_attempt_is_retried() {
    let engine = fast_engine::<u32>(1);
    let attempts = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&attempts);
    let work = TaskWork::new(move || {
        let attempt = counter.fetch_add(1, Ordering::SeqCst);
        async move {
            if attempt == 0 {
                tokio::time::sleep(Duration::from_secs(30)).await;
            }
            Ok(7)
        }
    });
    let id = engine
        .add_task(
            TaskDefinition::new("hangs_once", work)
                .timeout(Duration::from_millis(20))
                .max_retries(1),
        )
        .unwrap();

    let value = with_timeout(engine.execute_task(id)).await.unwrap();

    assert_eq!(value, 7);
    assert_eq!(attempts.load(Ordering::SeqCst), 2);
    assert_eq!(engine.task(id).unwrap().retry_attempts, 1);
}

#[tokio::test]
async fn panicking_task_does_not_affect_siblings() {
    let engine = fast_engine::<u32>(2);
    let exploding = engine
        .add_task(TaskDefinition::new("explodes", panicking("kaboom")))
        .unwrap();
    let healthy = engine
        .add_task(TaskDefinition::new("healthy", sleep_then(Duration::from_millis(10), 5)))
        .unwrap();

    let summary = with_timeout(engine.execute_all()).await.unwrap();

    assert_eq!(engine.task_status(healthy).unwrap(), TaskStatus::Completed);
    let task = engine.task(exploding).unwrap();
    assert_eq!(task.status, TaskStatus::Failed);
    assert!(task.error.unwrap().contains("kaboom"));
    assert_eq!(summary.completed_tasks, 1);
    assert_eq!(summary.failed_tasks, 1);
    assert_eq!(engine.running_slots(), 0);
}

#[tokio::test]
async fn failing_sibling_does_not_abort_wave() {
    let engine = fast_engine::<u32>(3);
    let (work, _) = always_fail("nope");
    engine.add_task(TaskDefinition::new("bad", work)).unwrap();
    let good: Vec<_> = (0..3)
        .map(|i| {
            engine
                .add_task(TaskDefinition::new(format!("good{i}"), succeed(i)))
                .unwrap()
        })
        .collect();

    with_timeout(engine.execute_all()).await.unwrap();

    for id in good {
        assert_eq!(engine.task_status(id).unwrap(), TaskStatus::Completed);
    }
}

#[tokio::test]
async fn panicking_observer_is_contained() {
    let engine = fast_engine::<u32>(1);
    engine.on_task_started(|_| panic!("observer bug"));
    let observer = RecordingObserver::new();
    engine.add_observer(observer.clone());

    let id = engine.add_task(TaskDefinition::new("a", succeed(1))).unwrap();
    with_timeout(engine.execute_all()).await.unwrap();

    assert_eq!(engine.task_status(id).unwrap(), TaskStatus::Completed);
    assert_eq!(observer.started(), vec!["a"]);
}
