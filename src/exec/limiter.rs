// src/exec/limiter.rs

//! Engine-wide bound on concurrently running tasks.

use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::errors::{EngineError, Result};

/// Counting gate over a fair (FIFO) semaphore.
///
/// Slots are handed out in request order, so tasks asking in priority order
/// also start in priority order.
#[derive(Debug, Clone)]
pub struct ConcurrencyLimiter {
    semaphore: Arc<Semaphore>,
    capacity: usize,
}

/// One occupied slot. Dropping it frees the slot, whichever way the task
/// ended.
#[derive(Debug)]
pub struct SlotGuard {
    _permit: OwnedSemaphorePermit,
}

impl ConcurrencyLimiter {
    /// A capacity of zero is raised to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    pub async fn acquire(&self) -> Result<SlotGuard> {
        let permit = Arc::clone(&self.semaphore)
            .acquire_owned()
            .await
            .map_err(|_| EngineError::Other(anyhow::anyhow!("concurrency limiter closed")))?;
        Ok(SlotGuard { _permit: permit })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    pub fn in_use(&self) -> usize {
        self.capacity - self.available()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn guard_releases_on_drop() {
        let limiter = ConcurrencyLimiter::new(2);
        let a = limiter.acquire().await.unwrap();
        let _b = limiter.acquire().await.unwrap();
        assert_eq!(limiter.in_use(), 2);
        assert_eq!(limiter.available(), 0);

        drop(a);
        assert_eq!(limiter.in_use(), 1);
    }

    #[tokio::test]
    async fn excess_requests_wait_for_a_free_slot() {
        let limiter = ConcurrencyLimiter::new(1);
        let held = limiter.acquire().await.unwrap();

        let blocked = tokio::time::timeout(Duration::from_millis(20), limiter.acquire()).await;
        assert!(blocked.is_err());

        drop(held);
        let got = tokio::time::timeout(Duration::from_millis(200), limiter.acquire()).await;
        assert!(got.is_ok());
    }

    #[test]
    fn zero_capacity_is_clamped() {
        assert_eq!(ConcurrencyLimiter::new(0).capacity(), 1);
    }
}
