//! Observers and probes for asserting on engine behaviour.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use taskwave::dag::{TaskSnapshot, TaskWork};
use taskwave::engine::TaskObserver;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HookCall {
    Started(String),
    Completed(String),
    Failed(String, String),
    Cancelled(String),
}

/// Observer that records every hook call, in order.
#[derive(Debug, Default)]
pub struct RecordingObserver {
    calls: Mutex<Vec<HookCall>>,
}

impl RecordingObserver {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> Vec<HookCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Names of tasks in the order their started hook fired.
    pub fn started(&self) -> Vec<String> {
        self.filter(|c| match c {
            HookCall::Started(name) => Some(name.clone()),
            _ => None,
        })
    }

    pub fn completed(&self) -> Vec<String> {
        self.filter(|c| match c {
            HookCall::Completed(name) => Some(name.clone()),
            _ => None,
        })
    }

    /// `(name, error)` pairs of failed tasks.
    pub fn failed(&self) -> Vec<(String, String)> {
        self.filter(|c| match c {
            HookCall::Failed(name, err) => Some((name.clone(), err.clone())),
            _ => None,
        })
    }

    pub fn cancelled(&self) -> Vec<String> {
        self.filter(|c| match c {
            HookCall::Cancelled(name) => Some(name.clone()),
            _ => None,
        })
    }

    fn filter<R>(&self, f: impl Fn(&HookCall) -> Option<R>) -> Vec<R> {
        self.calls.lock().unwrap().iter().filter_map(f).collect()
    }

    fn push(&self, call: HookCall) {
        self.calls.lock().unwrap().push(call);
    }
}

impl TaskObserver for RecordingObserver {
    fn on_started(&self, task: &TaskSnapshot) {
        self.push(HookCall::Started(task.name.clone()));
    }

    fn on_completed(&self, task: &TaskSnapshot) {
        self.push(HookCall::Completed(task.name.clone()));
    }

    fn on_failed(&self, task: &TaskSnapshot, error: &str) {
        self.push(HookCall::Failed(task.name.clone(), error.to_string()));
    }

    fn on_cancelled(&self, task: &TaskSnapshot) {
        self.push(HookCall::Cancelled(task.name.clone()));
    }
}

/// Tracks how many wrapped work futures are running at once.
#[derive(Debug, Clone, Default)]
pub struct ConcurrencyProbe {
    current: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

impl ConcurrencyProbe {
    pub fn new() -> Self {
        Self::default()
    }

    /// Highest number of simultaneously running attempts seen so far.
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn current(&self) -> usize {
        self.current.load(Ordering::SeqCst)
    }

    /// Wrap `work` so each attempt counts as running until it finishes or is
    /// dropped.
    pub fn wrap<T>(&self, work: TaskWork<T>) -> TaskWork<T>
    where
        T: Send + 'static,
    {
        let probe = self.clone();
        TaskWork::new(move || {
            let attempt = work.invoke();
            let probe = probe.clone();
            async move {
                let _running = probe.enter();
                attempt.await
            }
        })
    }

    fn enter(&self) -> ProbeGuard {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        ProbeGuard {
            current: Arc::clone(&self.current),
        }
    }
}

struct ProbeGuard {
    current: Arc<AtomicUsize>,
}

impl Drop for ProbeGuard {
    fn drop(&mut self) {
        self.current.fetch_sub(1, Ordering::SeqCst);
    }
}
