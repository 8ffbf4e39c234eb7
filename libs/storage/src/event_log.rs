//! Append-only domain event log persisted as a single JSON document.
//!
//! The log is the system of record: every committed mutation appends here
//! before the stock store is touched. Appends are idempotent by event id and
//! assign a globally monotone sequence.

use std::path::PathBuf;
use std::sync::Arc;

use inv_core::{EventType, InventoryError, Sku, StockEvent, StoreId};
use inv_resilience::{Bulkhead, CircuitBreaker};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tokio::sync::Mutex;
use tracing::debug;

use crate::durable::{RetryPolicy, read_json, write_json};

pub const EVENT_LOG_FILE: &str = "event-log.json";

/// On-disk shape of the log.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventLogDocument {
    #[serde(default)]
    pub events: Vec<StockEvent>,
    #[serde(default)]
    pub last_id: Option<String>,
    #[serde(default)]
    pub last_sequence: u64,
}

/// Result of an append call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    /// Event persisted under this sequence number.
    Appended(u64),
    /// An event with the same id already existed; nothing was written.
    Duplicate,
}

pub struct EventLog {
    path: PathBuf,
    retry: RetryPolicy,
    write_lock: Mutex<()>,
    fs_pool: Option<Arc<Bulkhead>>,
    breaker: Option<Arc<CircuitBreaker>>,
}

impl EventLog {
    pub fn new(data_dir: impl Into<PathBuf>, retry: RetryPolicy) -> Self {
        Self {
            path: data_dir.into().join(EVENT_LOG_FILE),
            retry,
            write_lock: Mutex::new(()),
            fs_pool: None,
            breaker: None,
        }
    }

    /// Routes writes through the filesystem bulkhead and persistence breaker.
    pub fn with_guards(mut self, fs_pool: Arc<Bulkhead>, breaker: Arc<CircuitBreaker>) -> Self {
        self.fs_pool = Some(fs_pool);
        self.breaker = Some(breaker);
        self
    }

    /// Appends `event`, assigning `lastSequence + 1`. An event whose id is
    /// already present is a no-op.
    pub async fn append(&self, event: StockEvent) -> Result<AppendOutcome, InventoryError> {
        let _guard = self.write_lock.lock().await;
        let mut doc = self.load().await?;

        if doc.events.iter().any(|existing| existing.id == event.id) {
            debug!(event_id = %event.id, "duplicate event id, append skipped");
            return Ok(AppendOutcome::Duplicate);
        }

        let mut event = event;
        event.sequence = doc.last_sequence + 1;
        doc.last_sequence = event.sequence;
        doc.last_id = Some(event.id.clone());
        let sequence = event.sequence;
        doc.events.push(event);

        self.store(&doc).await?;
        Ok(AppendOutcome::Appended(sequence))
    }

    pub async fn get_all(&self) -> Result<Vec<StockEvent>, InventoryError> {
        Ok(self.load().await?.events)
    }

    pub async fn get_by_type(
        &self,
        event_type: EventType,
    ) -> Result<Vec<StockEvent>, InventoryError> {
        let mut events = self.load().await?.events;
        events.retain(|event| event.event_type == event_type);
        Ok(events)
    }

    /// Events with `from <= timestamp <= to`, ordered by sequence.
    pub async fn get_by_time_range(
        &self,
        from: OffsetDateTime,
        to: OffsetDateTime,
    ) -> Result<Vec<StockEvent>, InventoryError> {
        let mut events = self.load().await?.events;
        events.retain(|event| event.timestamp >= from && event.timestamp <= to);
        Ok(events)
    }

    pub async fn get_last_id(&self) -> Result<Option<String>, InventoryError> {
        Ok(self.load().await?.last_id)
    }

    pub async fn last_sequence(&self) -> Result<u64, InventoryError> {
        Ok(self.load().await?.last_sequence)
    }

    /// Events for one identity, in commit order.
    pub async fn events_for(
        &self,
        store_id: &StoreId,
        sku: &Sku,
    ) -> Result<Vec<StockEvent>, InventoryError> {
        let mut events = self.load().await?.events;
        events.retain(|event| {
            event.payload.store_id == *store_id && event.payload.sku == *sku
        });
        Ok(events)
    }

    /// Events with a sequence strictly greater than `sequence`.
    pub async fn events_after(&self, sequence: u64) -> Result<Vec<StockEvent>, InventoryError> {
        let mut events = self.load().await?.events;
        events.retain(|event| event.sequence > sequence);
        Ok(events)
    }

    async fn load(&self) -> Result<EventLogDocument, InventoryError> {
        read_json(&self.path).await
    }

    async fn store(&self, doc: &EventLogDocument) -> Result<(), InventoryError> {
        let write = async { write_json(&self.path, doc, &self.retry).await };
        let op = async {
            match &self.fs_pool {
                Some(pool) => pool.run(write).await.and_then(|inner| inner),
                None => write.await,
            }
        };
        match &self.breaker {
            Some(breaker) => breaker.guard(op).await,
            None => op.await,
        }
    }
}
