//! Scripted work factories for engine tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use taskwave::dag::{TaskWork, WorkError, WorkResult};

/// Shared count of how many times a work factory was invoked.
#[derive(Debug, Clone, Default)]
pub struct CallCounter(Arc<AtomicUsize>);

impl CallCounter {
    pub fn count(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }

    /// Record a call and return its zero-based index.
    fn hit(&self) -> usize {
        self.0.fetch_add(1, Ordering::SeqCst)
    }
}

/// Work that completes immediately with `value`.
pub fn succeed<T>(value: T) -> TaskWork<T>
where
    T: Clone + Send + Sync + 'static,
{
    TaskWork::new(move || {
        let value = value.clone();
        async move { Ok(value) }
    })
}

/// Work that completes with `value` after sleeping for `delay`.
pub fn sleep_then<T>(delay: Duration, value: T) -> TaskWork<T>
where
    T: Clone + Send + Sync + 'static,
{
    TaskWork::new(move || {
        let value = value.clone();
        async move {
            tokio::time::sleep(delay).await;
            Ok(value)
        }
    })
}

/// Work whose first `failures` attempts fail with a retryable error.
pub fn flaky<T>(failures: usize, value: T) -> (TaskWork<T>, CallCounter)
where
    T: Clone + Send + Sync + 'static,
{
    let calls = CallCounter::default();
    let counter = calls.clone();
    let work = TaskWork::new(move || {
        let value = value.clone();
        let attempt = counter.hit();
        async move {
            if attempt < failures {
                Err(WorkError::retryable(format!("attempt {} failed", attempt + 1)))
            } else {
                Ok(value)
            }
        }
    });
    (work, calls)
}

/// Work that fails with a retryable error on every attempt.
pub fn always_fail<T>(message: &str) -> (TaskWork<T>, CallCounter)
where
    T: Send + 'static,
{
    let calls = CallCounter::default();
    let counter = calls.clone();
    let message = message.to_string();
    let work = TaskWork::new(move || {
        counter.hit();
        let message = message.clone();
        async move { Err(WorkError::Retryable(message)) }
    });
    (work, calls)
}

/// Work that fails with a non-retryable error.
pub fn fatal<T>(message: &str) -> (TaskWork<T>, CallCounter)
where
    T: Send + 'static,
{
    let calls = CallCounter::default();
    let counter = calls.clone();
    let message = message.to_string();
    let work = TaskWork::new(move || {
        counter.hit();
        let message = message.clone();
        async move { Err(WorkError::Fatal(message)) }
    });
    (work, calls)
}

/// Work that panics while running.
pub fn panicking<T>(message: &'static str) -> TaskWork<T>
where
    T: Send + 'static,
{
    TaskWork::new(move || explode(message))
}

async fn explode<T>(message: &'static str) -> WorkResult<T> {
    panic!("{message}")
}

/// Work that never finishes on its own.
pub fn pending_forever<T>() -> (TaskWork<T>, CallCounter)
where
    T: Send + 'static,
{
    let calls = CallCounter::default();
    let counter = calls.clone();
    let work = TaskWork::new(move || {
        counter.hit();
        std::future::pending::<WorkResult<T>>()
    });
    (work, calls)
}
