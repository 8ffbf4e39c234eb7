//! Queue-depth load shedding in front of bulkhead admission.

use std::sync::Arc;

use inv_core::InventoryError;
use inv_core::config::env_usize;
use inv_telemetry::counters;
use tracing::debug;

use crate::bulkhead::Bulkhead;

/// Rejects new work when the combined wait-queue depth of the observed pools
/// exceeds the configured threshold. Runs before any queueing so shedding is
/// a fast failure.
pub struct LoadShedder {
    max_queue_depth: usize,
    pools: Vec<Arc<Bulkhead>>,
}

impl LoadShedder {
    pub fn new(max_queue_depth: usize, pools: Vec<Arc<Bulkhead>>) -> Self {
        Self {
            max_queue_depth,
            pools,
        }
    }

    /// Threshold from `LOAD_SHED_QUEUE_MAX` (default 100).
    pub fn from_env(pools: Vec<Arc<Bulkhead>>) -> Self {
        Self::new(env_usize("LOAD_SHED_QUEUE_MAX", 100), pools)
    }

    pub fn total_queue_depth(&self) -> usize {
        self.pools.iter().map(|pool| pool.queue_depth()).sum()
    }

    pub fn admit(&self) -> Result<(), InventoryError> {
        let depth = self.total_queue_depth();
        if depth <= self.max_queue_depth {
            return Ok(());
        }
        debug!(depth, max = self.max_queue_depth, "shedding request");
        counters::record_counter(counters::SHED, 1);
        let retry = ((depth as f64) / 10.0).ceil() as u64;
        Err(InventoryError::Overloaded {
            reason: "queue depth over limit".into(),
            retry_after_secs: retry.clamp(1, 60),
        })
    }
}
