//! Restart semantics: the stock store is always reproducible from the log.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use inv_core::{AdjustCommand, ReserveCommand, Sku, StockEvent, StoreId};
use inv_engine::{CommandEngine, recover};
use inv_idempotency::IdempotencyCache;
use inv_storage::{EventLog, RetryPolicy, StockStore};

fn engine(dir: &tempfile::TempDir) -> (Arc<CommandEngine>, Arc<EventLog>, Arc<StockStore>) {
    let retry = RetryPolicy::default();
    let events = Arc::new(EventLog::new(dir.path(), retry.clone()));
    let stock = Arc::new(StockStore::new(dir.path(), retry));
    let engine = Arc::new(CommandEngine::new(
        stock.clone(),
        events.clone(),
        Arc::new(IdempotencyCache::new(Duration::from_secs(60))),
        Duration::from_secs(60),
    ));
    (engine, events, stock)
}

/// Replays the full log into a map of (storeId, sku) → (qty, version).
fn replay(events: &[StockEvent]) -> HashMap<(String, String), (i64, u64)> {
    let mut state = HashMap::new();
    for event in events {
        state.insert(
            (
                event.payload.store_id.to_string(),
                event.payload.sku.to_string(),
            ),
            (event.payload.new_qty, event.payload.new_version),
        );
    }
    state
}

#[tokio::test]
async fn every_record_equals_the_log_replay_after_restart() {
    let dir = tempfile::tempdir().unwrap();
    {
        let (engine, _, _) = engine(&dir);
        for (sku, delta) in [("A", 100), ("B", 40), ("A", -25), ("C", 7)] {
            engine
                .adjust(AdjustCommand {
                    store_id: StoreId::new("S1").unwrap(),
                    sku: Sku::new(sku).unwrap(),
                    delta,
                    expected_version: None,
                    idempotency_key: None,
                })
                .await
                .unwrap();
        }
        engine
            .reserve(ReserveCommand {
                store_id: StoreId::new("S1").unwrap(),
                sku: Sku::new("B").unwrap(),
                qty: 10,
                expected_version: None,
                idempotency_key: None,
            })
            .await
            .unwrap();
    }

    // Fresh handles over the same files model a process restart.
    let (_, events, stock) = engine(&dir);
    recover(&events, &stock).await.unwrap();

    let replayed = replay(&events.get_all().await.unwrap());
    assert_eq!(replayed.len(), 3);
    for ((store_id, sku), (qty, version)) in replayed {
        let record = stock
            .get(&StoreId::new(store_id).unwrap(), &Sku::new(sku).unwrap())
            .await
            .unwrap();
        assert_eq!(record.qty, qty);
        assert_eq!(record.version, version);
    }
}

#[tokio::test]
async fn writes_resume_after_restart_with_recovery() {
    let dir = tempfile::tempdir().unwrap();
    {
        let (engine, _, _) = engine(&dir);
        engine
            .adjust(AdjustCommand {
                store_id: StoreId::new("S1").unwrap(),
                sku: Sku::new("A").unwrap(),
                delta: 10,
                expected_version: None,
                idempotency_key: None,
            })
            .await
            .unwrap();
    }

    let (engine, events, stock) = engine(&dir);
    recover(&events, &stock).await.unwrap();

    let result = engine
        .adjust(AdjustCommand {
            store_id: StoreId::new("S1").unwrap(),
            sku: Sku::new("A").unwrap(),
            delta: 5,
            expected_version: Some(1),
            idempotency_key: None,
        })
        .await
        .unwrap();
    assert_eq!(result.qty, 15);
    assert_eq!(result.version, 2);

    let all = events.get_all().await.unwrap();
    assert_eq!(all.len(), 2);
    assert_eq!(all[1].sequence, 2);
}
