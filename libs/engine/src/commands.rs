//! Adjust and reserve handlers sharing one commit protocol.
//!
//! Protocol per command: probe the idempotency cache (before taking the
//! per-key lock), serialize on the sku, validate version and stock, append
//! the event, then upsert the derived record. The event append always
//! precedes the record write so a crash between the two is recoverable from
//! the log.

use std::sync::Arc;
use std::time::Duration;

use inv_core::{
    AdjustCommand, CommandResult, EventPayload, EventType, InventoryError, ReserveCommand, Sku,
    StockEvent, StockRecord, StoreId, validate_reserve_qty,
};
use inv_idempotency::{IdempotencyCache, IdempotencyOutcome, payload_hash};
use inv_storage::{EventLog, StockStore};
use inv_telemetry::counters;
use serde_json::{Value, json};
use time::OffsetDateTime;
use tracing::debug;
use uuid::Uuid;

use crate::serializer::KeyedSerializer;

/// The two mutations share everything except how the new quantity is derived.
#[derive(Debug, Clone, Copy)]
enum Mutation {
    Adjust { delta: i64 },
    Reserve { qty: i64 },
}

impl Mutation {
    fn event_type(&self) -> EventType {
        match self {
            Mutation::Adjust { .. } => EventType::StockAdjusted,
            Mutation::Reserve { .. } => EventType::StockReserved,
        }
    }

    fn apply(&self, current: i64) -> i64 {
        match self {
            Mutation::Adjust { delta } => current + delta,
            Mutation::Reserve { qty } => current - qty,
        }
    }

    /// Magnitude reported when the mutation would drive stock negative.
    fn requested(&self) -> i64 {
        match self {
            Mutation::Adjust { delta } => delta.abs(),
            Mutation::Reserve { qty } => *qty,
        }
    }

    /// Whether an absent record may be created by this mutation.
    fn creates_record(&self) -> bool {
        matches!(self, Mutation::Adjust { .. })
    }
}

pub struct CommandEngine {
    stock: Arc<StockStore>,
    events: Arc<EventLog>,
    idempotency: Arc<IdempotencyCache>,
    serializer: KeyedSerializer,
    result_ttl: Duration,
}

impl CommandEngine {
    pub fn new(
        stock: Arc<StockStore>,
        events: Arc<EventLog>,
        idempotency: Arc<IdempotencyCache>,
        result_ttl: Duration,
    ) -> Self {
        Self {
            stock,
            events,
            idempotency,
            serializer: KeyedSerializer::new(),
            result_ttl,
        }
    }

    /// Applies a signed delta. An absent record is created when the result
    /// stays non-negative.
    pub async fn adjust(&self, cmd: AdjustCommand) -> Result<CommandResult, InventoryError> {
        let fingerprint = json!({
            "op": "adjust",
            "storeId": cmd.store_id.as_str(),
            "sku": cmd.sku.as_str(),
            "delta": cmd.delta,
            "expectedVersion": cmd.expected_version,
        });
        self.execute(
            cmd.store_id,
            cmd.sku,
            cmd.expected_version,
            cmd.idempotency_key,
            Mutation::Adjust { delta: cmd.delta },
            fingerprint,
        )
        .await
    }

    /// Reserves a non-negative quantity from existing stock. A zero reserve
    /// is accepted and commits a version bump without changing the quantity.
    pub async fn reserve(&self, cmd: ReserveCommand) -> Result<CommandResult, InventoryError> {
        validate_reserve_qty(cmd.qty)?;
        let fingerprint = json!({
            "op": "reserve",
            "storeId": cmd.store_id.as_str(),
            "sku": cmd.sku.as_str(),
            "qty": cmd.qty,
            "expectedVersion": cmd.expected_version,
        });
        self.execute(
            cmd.store_id,
            cmd.sku,
            cmd.expected_version,
            cmd.idempotency_key,
            Mutation::Reserve { qty: cmd.qty },
            fingerprint,
        )
        .await
    }

    /// Number of skus with a write in flight.
    pub fn active_keys(&self) -> usize {
        self.serializer.active_keys()
    }

    async fn execute(
        &self,
        store_id: StoreId,
        sku: Sku,
        expected_version: Option<u64>,
        idempotency_key: Option<String>,
        mutation: Mutation,
        fingerprint: Value,
    ) -> Result<CommandResult, InventoryError> {
        let key = idempotency_key.unwrap_or_else(|| Uuid::new_v4().to_string());
        let hash = payload_hash(&fingerprint);

        // Fast path: a live entry short-circuits before the per-key lock.
        match self.idempotency.check(&key, &fingerprint) {
            IdempotencyOutcome::Replay(result) => {
                debug!(%key, "idempotent replay");
                return Ok(result);
            }
            IdempotencyOutcome::Conflict => {
                counters::record_counter(counters::CONFLICTS, 1);
                return Err(InventoryError::IdempotencyConflict { key });
            }
            IdempotencyOutcome::Proceed => {}
        }

        self.serializer
            .run(sku.as_str(), async {
                // Re-check under the lock: a concurrent duplicate may have
                // committed while this call was waiting its turn.
                match self.idempotency.check(&key, &fingerprint) {
                    IdempotencyOutcome::Replay(result) => {
                        debug!(%key, "idempotent replay");
                        return Ok(result);
                    }
                    IdempotencyOutcome::Conflict => {
                        counters::record_counter(counters::CONFLICTS, 1);
                        return Err(InventoryError::IdempotencyConflict { key: key.clone() });
                    }
                    IdempotencyOutcome::Proceed => {}
                }

                let result = self
                    .commit(&store_id, &sku, expected_version, mutation)
                    .await?;
                // Cache before releasing the lock so the next waiter on this
                // key observes the result, not a fresh commit.
                self.idempotency
                    .set(&key, result, Some(hash), Some(self.result_ttl));
                Ok(result)
            })
            .await
    }

    /// Runs under the per-key lock.
    async fn commit(
        &self,
        store_id: &StoreId,
        sku: &Sku,
        expected_version: Option<u64>,
        mutation: Mutation,
    ) -> Result<CommandResult, InventoryError> {
        let current = self.stock.find(store_id, sku).await?;
        let (previous_qty, previous_version) = match &current {
            Some(record) => (record.qty, record.version),
            None if mutation.creates_record() => (0, 0),
            None => {
                return Err(InventoryError::NotFound {
                    store_id: store_id.to_string(),
                    sku: sku.to_string(),
                });
            }
        };

        if let Some(expected) = expected_version
            && expected != previous_version
        {
            counters::record_counter(counters::CONFLICTS, 1);
            return Err(InventoryError::VersionConflict {
                expected,
                actual: previous_version,
            });
        }

        let new_qty = mutation.apply(previous_qty);
        if new_qty < 0 {
            return Err(InventoryError::InsufficientStock {
                requested: mutation.requested(),
                available: previous_qty,
            });
        }

        let new_version = previous_version + 1;
        let now = OffsetDateTime::now_utc();
        let (delta, reserved_qty) = match mutation {
            Mutation::Adjust { delta } => (Some(delta), None),
            Mutation::Reserve { qty } => (None, Some(qty)),
        };
        let event = StockEvent {
            id: Uuid::new_v4().to_string(),
            sequence: 0,
            event_type: mutation.event_type(),
            payload: EventPayload {
                store_id: store_id.clone(),
                sku: sku.clone(),
                delta,
                reserved_qty,
                previous_qty,
                new_qty,
                previous_version,
                new_version,
            },
            timestamp: now,
        };

        self.events.append(event).await?;
        self.stock
            .upsert(StockRecord {
                store_id: store_id.clone(),
                sku: sku.clone(),
                qty: new_qty,
                version: new_version,
                updated_at: now,
            })
            .await?;

        debug!(
            store_id = %store_id,
            sku = %sku,
            qty = new_qty,
            version = new_version,
            "mutation committed"
        );
        Ok(CommandResult {
            qty: new_qty,
            version: new_version,
        })
    }
}
