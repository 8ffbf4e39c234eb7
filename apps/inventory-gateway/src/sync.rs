//! Background projection of the event log into the central inventory view.
//!
//! The worker only reads the event log and only writes the central file; it
//! never touches the stock store. The projection resumes from the persisted
//! `lastSequence`, so restarting the process never reprocesses the prefix.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use inv_core::InventoryError;
use inv_resilience::{Bulkhead, CircuitBreaker};
use inv_storage::{EventLog, RetryPolicy, read_json, write_json};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

pub const CENTRAL_FILE: &str = "central-inventory.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CentralEntry {
    pub qty: i64,
    pub version: u64,
}

/// On-disk shape of the central inventory projection.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CentralProjection {
    #[serde(default)]
    pub last_sequence: u64,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub projected_at: Option<OffsetDateTime>,
    #[serde(default)]
    pub stores: BTreeMap<String, BTreeMap<String, CentralEntry>>,
}

pub struct SyncWorker {
    events: Arc<EventLog>,
    path: PathBuf,
    retry: RetryPolicy,
    pool: Arc<Bulkhead>,
    breaker: Arc<CircuitBreaker>,
    interval: Duration,
    snapshot_every: usize,
    running: AtomicBool,
}

impl SyncWorker {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        events: Arc<EventLog>,
        data_dir: impl Into<PathBuf>,
        retry: RetryPolicy,
        pool: Arc<Bulkhead>,
        breaker: Arc<CircuitBreaker>,
        interval: Duration,
        snapshot_every: usize,
    ) -> Self {
        Self {
            events,
            path: data_dir.into().join(CENTRAL_FILE),
            retry,
            pool,
            breaker,
            interval,
            snapshot_every: snapshot_every.max(1),
            running: AtomicBool::new(true),
        }
    }

    /// Starts the periodic projection loop.
    pub fn spawn(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut timer = tokio::time::interval(self.interval);
            timer.tick().await;
            while self.running.load(Ordering::SeqCst) {
                timer.tick().await;
                match self.run_once().await {
                    Ok(0) => {}
                    Ok(applied) => debug!(applied, "central projection advanced"),
                    Err(err) => warn!(error = %err, "central projection tick failed"),
                }
            }
        })
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// Applies events newer than the stored `lastSequence`, flushing the file
    /// every `snapshot_every` applied events and once at the end of the tick.
    /// Returns the number of events applied.
    pub async fn run_once(&self) -> Result<usize, InventoryError> {
        let mut projection: CentralProjection = read_json(&self.path).await?;
        let since = projection.last_sequence;

        let read = async { self.events.events_after(since).await };
        let fresh = self
            .breaker
            .guard(async { self.pool.run(read).await.and_then(|inner| inner) })
            .await?;
        if fresh.is_empty() {
            return Ok(0);
        }

        let mut applied = 0usize;
        for event in fresh {
            let entry = CentralEntry {
                qty: event.payload.new_qty,
                version: event.payload.new_version,
            };
            projection
                .stores
                .entry(event.payload.store_id.to_string())
                .or_default()
                .insert(event.payload.sku.to_string(), entry);
            projection.last_sequence = event.sequence;
            applied += 1;

            if applied % self.snapshot_every == 0 {
                projection.projected_at = Some(OffsetDateTime::now_utc());
                self.flush(&projection).await?;
            }
        }

        projection.projected_at = Some(OffsetDateTime::now_utc());
        self.flush(&projection).await?;
        Ok(applied)
    }

    async fn flush(&self, projection: &CentralProjection) -> Result<(), InventoryError> {
        let write = async { write_json(&self.path, projection, &self.retry).await };
        self.breaker
            .guard(async { self.pool.run(write).await.and_then(|inner| inner) })
            .await
    }
}
