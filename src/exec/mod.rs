// src/exec/mod.rs

//! Execution layer.
//!
//! - [`limiter`] bounds how many tasks run at once across the whole engine.
//! - [`retry`] computes the exponential backoff between attempts.
//! - [`task_runner`] drives a single task through its attempts, enforcing
//!   timeouts and honouring cancellation.
//! - [`command`] builds work that runs a shell command, used by the CLI.

pub mod command;
pub mod limiter;
pub mod retry;
pub(crate) mod task_runner;

pub use command::{CommandOutput, shell_work};
pub use limiter::{ConcurrencyLimiter, SlotGuard};
pub use retry::RetryPolicy;
