// src/engine/hooks.rs

//! Observer hooks fired on task lifecycle transitions.
//!
//! Observers run synchronously on the engine's task, after the state lock
//! has been released, in registration order. A panicking observer is logged
//! and skipped; it never reaches the engine.

use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, PoisonError, RwLock};

use tracing::warn;

use crate::dag::TaskSnapshot;

/// Typed observer interface. Every method defaults to a no-op.
pub trait TaskObserver: Send + Sync {
    /// The task moved to `Running` (once per attempt).
    fn on_started(&self, _task: &TaskSnapshot) {}

    fn on_completed(&self, _task: &TaskSnapshot) {}

    /// The task reached `Failed` after its retry budget was spent.
    fn on_failed(&self, _task: &TaskSnapshot, _error: &str) {}

    /// The task was cancelled explicitly or because a dependency failed.
    fn on_cancelled(&self, _task: &TaskSnapshot) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum HookEvent {
    Started,
    Completed,
    Cancelled,
}

/// Adapter turning a closure into an observer for one event.
pub(crate) struct SnapshotCallback<F> {
    event: HookEvent,
    callback: F,
}

impl<F> SnapshotCallback<F> {
    pub fn new(event: HookEvent, callback: F) -> Self {
        Self { event, callback }
    }
}

impl<F> TaskObserver for SnapshotCallback<F>
where
    F: Fn(&TaskSnapshot) + Send + Sync,
{
    fn on_started(&self, task: &TaskSnapshot) {
        if self.event == HookEvent::Started {
            (self.callback)(task);
        }
    }

    fn on_completed(&self, task: &TaskSnapshot) {
        if self.event == HookEvent::Completed {
            (self.callback)(task);
        }
    }

    fn on_cancelled(&self, task: &TaskSnapshot) {
        if self.event == HookEvent::Cancelled {
            (self.callback)(task);
        }
    }
}

pub(crate) struct FailedCallback<F>(pub F);

impl<F> TaskObserver for FailedCallback<F>
where
    F: Fn(&TaskSnapshot, &str) + Send + Sync,
{
    fn on_failed(&self, task: &TaskSnapshot, error: &str) {
        (self.0)(task, error);
    }
}

#[derive(Default)]
pub(crate) struct HookRegistry {
    observers: RwLock<Vec<Arc<dyn TaskObserver>>>,
}

impl HookRegistry {
    pub fn add(&self, observer: Arc<dyn TaskObserver>) {
        self.observers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(observer);
    }

    pub fn started(&self, task: &TaskSnapshot) {
        self.fire("started", task, |o| o.on_started(task));
    }

    pub fn completed(&self, task: &TaskSnapshot) {
        self.fire("completed", task, |o| o.on_completed(task));
    }

    pub fn failed(&self, task: &TaskSnapshot, error: &str) {
        self.fire("failed", task, |o| o.on_failed(task, error));
    }

    pub fn cancelled(&self, task: &TaskSnapshot) {
        self.fire("cancelled", task, |o| o.on_cancelled(task));
    }

    fn fire<F>(&self, hook: &str, task: &TaskSnapshot, call: F)
    where
        F: Fn(&dyn TaskObserver),
    {
        // Clone the list so observers may register further observers.
        let observers: Vec<Arc<dyn TaskObserver>> = self
            .observers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        for observer in observers {
            if let Err(payload) = catch_unwind(AssertUnwindSafe(|| call(observer.as_ref()))) {
                warn!(
                    hook,
                    task = %task.name,
                    task_id = %task.id,
                    panic = %panic_message(payload.as_ref()),
                    "task observer panicked; ignoring"
                );
            }
        }
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
