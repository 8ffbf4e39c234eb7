//! Bounded-concurrency pools with a fixed-size FIFO wait queue.
//!
//! Each pool admits up to `limit` concurrent operations; excess arrivals wait
//! in a queue of at most `queue_size`. A full queue is a capacity rejection,
//! surfaced as `ServiceOverloaded`. Pools are independent: saturation in one
//! never blocks another.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use inv_core::InventoryError;
use inv_core::config::env_usize;
use tokio::sync::Semaphore;
use tracing::debug;

#[derive(Debug, Clone, Copy)]
pub struct BulkheadConfig {
    pub limit: usize,
    pub queue_size: usize,
}

impl BulkheadConfig {
    /// API pool: `CONCURRENCY_API` concurrent (default 16), 100 waiters.
    pub fn api_from_env() -> Self {
        Self {
            limit: env_usize("CONCURRENCY_API", 16).max(1),
            queue_size: 100,
        }
    }

    /// Sync pool: `CONCURRENCY_SYNC` concurrent (default 4), 50 waiters.
    pub fn sync_from_env() -> Self {
        Self {
            limit: env_usize("CONCURRENCY_SYNC", 4).max(1),
            queue_size: 50,
        }
    }

    /// Filesystem pool: 8 concurrent, 200 waiters.
    pub fn filesystem() -> Self {
        Self {
            limit: 8,
            queue_size: 200,
        }
    }
}

pub struct Bulkhead {
    name: &'static str,
    limit: usize,
    queue_size: usize,
    semaphore: Semaphore,
    queued: AtomicUsize,
}

impl Bulkhead {
    pub fn new(name: &'static str, config: BulkheadConfig) -> Arc<Self> {
        Arc::new(Self {
            name,
            limit: config.limit,
            queue_size: config.queue_size,
            semaphore: Semaphore::new(config.limit),
            queued: AtomicUsize::new(0),
        })
    }

    /// Runs `fut` within the pool, queueing FIFO when all slots are busy.
    /// Rejects immediately when the wait queue is full.
    pub async fn run<F, T>(&self, fut: F) -> Result<T, InventoryError>
    where
        F: Future<Output = T>,
    {
        // Waiters already in line keep their ordering; only jump the queue
        // when it is empty.
        let permit = if self.queue_depth() == 0
            && let Ok(permit) = self.semaphore.try_acquire()
        {
            permit
        } else {
            let slot = QueueSlot::claim(self)?;
            let permit = self
                .semaphore
                .acquire()
                .await
                .map_err(|_| InventoryError::internal("bulkhead semaphore closed"))?;
            drop(slot);
            permit
        };

        let out = fut.await;
        drop(permit);
        Ok(out)
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Number of callers currently waiting for a slot.
    pub fn queue_depth(&self) -> usize {
        self.queued.load(Ordering::Acquire)
    }

    /// Number of operations currently running.
    pub fn active(&self) -> usize {
        self.limit.saturating_sub(self.semaphore.available_permits())
    }

    fn capacity_error(&self) -> InventoryError {
        let retry = ((self.queue_depth() as f64) / 10.0).ceil() as u64;
        InventoryError::Overloaded {
            reason: format!("{} pool at capacity", self.name),
            retry_after_secs: retry.clamp(1, 60),
        }
    }
}

/// RAII slot in the wait queue; releases its place even when the waiting
/// future is cancelled.
struct QueueSlot<'a> {
    owner: &'a Bulkhead,
}

impl<'a> QueueSlot<'a> {
    fn claim(owner: &'a Bulkhead) -> Result<Self, InventoryError> {
        let mut current = owner.queued.load(Ordering::Acquire);
        loop {
            if current >= owner.queue_size {
                debug!(pool = owner.name, depth = current, "bulkhead queue full");
                return Err(owner.capacity_error());
            }
            match owner.queued.compare_exchange(
                current,
                current + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return Ok(Self { owner }),
                Err(observed) => current = observed,
            }
        }
    }
}

impl Drop for QueueSlot<'_> {
    fn drop(&mut self) {
        self.owner.queued.fetch_sub(1, Ordering::AcqRel);
    }
}
