pub mod builders;
pub mod observer;
pub mod work;

use std::sync::Once;
use std::time::Duration;

use taskwave::config::EngineConfig;
use taskwave::engine::TaskEngine;
use taskwave::types::BlockedPolicy;
use tracing_subscriber::{EnvFilter, fmt};

static INIT: Once = Once::new();

/// Initialise tracing for tests.
///
/// - Uses `with_test_writer()`, so logs are captured per-test.
/// - The Rust test harness only prints captured output for **failing** tests
///   (unless you run with `-- --nocapture`).
///
/// Enable levels with e.g.:
/// `RUST_LOG=debug cargo test`
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        fmt()
            .with_env_filter(filter)
            .with_test_writer() // print only for failing tests unless --nocapture
            .with_target(true)
            .init();
    });
}

/// Run a future with a 5-second timeout.
pub async fn with_timeout<F, T>(f: F) -> T
where
    F: std::future::Future<Output = T>,
{
    tokio::time::timeout(Duration::from_secs(5), f)
        .await
        .expect("Test timed out after 5 seconds")
}

/// Engine config with millisecond backoff so retry tests stay fast.
pub fn fast_config(max_concurrent_tasks: usize) -> EngineConfig {
    EngineConfig::default()
        .with_max_concurrent_tasks(max_concurrent_tasks)
        .with_retry_delays(Duration::from_millis(1), Duration::from_millis(10))
}

/// Engine built from [`fast_config`], with tracing initialised.
pub fn fast_engine<T>(max_concurrent_tasks: usize) -> TaskEngine<T> {
    init_tracing();
    TaskEngine::new(fast_config(max_concurrent_tasks))
}

/// Like [`fast_engine`] with an explicit blocked-dependency policy.
pub fn fast_engine_with_policy<T>(max_concurrent_tasks: usize, policy: BlockedPolicy) -> TaskEngine<T> {
    init_tracing();
    TaskEngine::new(fast_config(max_concurrent_tasks).with_blocked_policy(policy))
}
