//! Outbox crash recovery.
//!
//! The event append precedes the record upsert, so a crash between the two
//! leaves the log exactly one version ahead of the store for that identity.
//! On startup the trailing event is re-applied; a wider gap means the files
//! no longer describe the same history and startup must fail.

use std::collections::HashMap;

use inv_core::{InventoryError, Sku, StockEvent, StockRecord, StoreId};
use inv_storage::{EventLog, StockStore};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    /// Identities present in the event log.
    pub scanned: usize,
    /// Identities whose trailing event was re-applied to the store.
    pub replayed: usize,
}

/// Scans the event log and re-applies any trailing event the stock store
/// missed. Idempotent: running it twice replays nothing the second time.
pub async fn recover(
    events: &EventLog,
    stock: &StockStore,
) -> Result<RecoveryReport, InventoryError> {
    let all = events.get_all().await?;
    let mut latest: HashMap<(StoreId, Sku), StockEvent> = HashMap::new();
    for event in all {
        latest.insert(
            (event.payload.store_id.clone(), event.payload.sku.clone()),
            event,
        );
    }

    let mut report = RecoveryReport::default();
    for ((store_id, sku), event) in &latest {
        report.scanned += 1;
        let record_version = stock
            .find(store_id, sku)
            .await?
            .map(|record| record.version)
            .unwrap_or(0);
        let log_version = event.payload.new_version;

        if log_version == record_version {
            continue;
        }
        if log_version == record_version + 1 {
            stock
                .upsert(StockRecord {
                    store_id: store_id.clone(),
                    sku: sku.clone(),
                    qty: event.payload.new_qty,
                    version: log_version,
                    updated_at: event.timestamp,
                })
                .await?;
            warn!(
                store_id = %store_id,
                sku = %sku,
                version = log_version,
                "replayed trailing event into stock store"
            );
            report.replayed += 1;
            continue;
        }

        return Err(InventoryError::persistence(format!(
            "event log at version {log_version} but stock record at {record_version} \
             for {store_id}/{sku}; cannot recover automatically"
        )));
    }

    if report.replayed > 0 {
        info!(
            scanned = report.scanned,
            replayed = report.replayed,
            "outbox recovery complete"
        );
    }
    Ok(report)
}
