use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::error::InventoryError;
use crate::validate::{validate_sku, validate_store_id};

/// Opaque identifier of a physical or logical store, 1-20 characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StoreId(String);

impl StoreId {
    pub fn new(raw: impl Into<String>) -> Result<Self, InventoryError> {
        let raw = raw.into();
        validate_store_id(&raw)?;
        Ok(Self(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for StoreId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Stock keeping unit, 1-50 characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Sku(String);

impl Sku {
    pub fn new(raw: impl Into<String>) -> Result<Self, InventoryError> {
        let raw = raw.into();
        validate_sku(&raw)?;
        Ok(Self(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Sku {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Current stock level for one (store, sku) identity.
///
/// Invariants: `qty >= 0` at every committed state, `version` advances by
/// exactly one per committed mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockRecord {
    pub store_id: StoreId,
    pub sku: Sku,
    pub qty: i64,
    pub version: u64,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// Kind of committed mutation recorded in the event log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    StockAdjusted,
    StockReserved,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::StockAdjusted => "StockAdjusted",
            EventType::StockReserved => "StockReserved",
        }
    }
}

/// Event payload capturing the state transition of one identity.
///
/// Exactly one of `delta` / `reserved_qty` is present, matching the event
/// type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventPayload {
    pub store_id: StoreId,
    pub sku: Sku,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delta: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reserved_qty: Option<i64>,
    pub previous_qty: i64,
    pub new_qty: i64,
    pub previous_version: u64,
    pub new_version: u64,
}

/// Committed domain event. Immutable once appended; `sequence` is assigned by
/// the event log on append and is globally monotone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockEvent {
    pub id: String,
    pub sequence: u64,
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub payload: EventPayload,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

/// Result returned to the client by both mutating commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandResult {
    pub qty: i64,
    pub version: u64,
}

/// Inputs to the adjust command.
#[derive(Debug, Clone)]
pub struct AdjustCommand {
    pub store_id: StoreId,
    pub sku: Sku,
    pub delta: i64,
    pub expected_version: Option<u64>,
    pub idempotency_key: Option<String>,
}

/// Inputs to the reserve command.
#[derive(Debug, Clone)]
pub struct ReserveCommand {
    pub store_id: StoreId,
    pub sku: Sku,
    pub qty: i64,
    pub expected_version: Option<u64>,
    pub idempotency_key: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn record_serializes_camel_case() {
        let record = StockRecord {
            store_id: StoreId::new("STORE001").unwrap(),
            sku: Sku::new("SKU123").unwrap(),
            qty: 100,
            version: 1,
            updated_at: datetime!(2024-06-01 12:00:00 UTC),
        };
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["storeId"], "STORE001");
        assert_eq!(value["sku"], "SKU123");
        assert_eq!(value["qty"], 100);
        assert_eq!(value["version"], 1);
        assert_eq!(value["updatedAt"], "2024-06-01T12:00:00Z");
    }

    #[test]
    fn event_payload_omits_absent_delta() {
        let payload = EventPayload {
            store_id: StoreId::new("STORE001").unwrap(),
            sku: Sku::new("SKU123").unwrap(),
            delta: None,
            reserved_qty: Some(5),
            previous_qty: 10,
            new_qty: 5,
            previous_version: 1,
            new_version: 2,
        };
        let value = serde_json::to_value(&payload).unwrap();
        assert!(value.get("delta").is_none());
        assert_eq!(value["reservedQty"], 5);
        assert_eq!(value["previousVersion"], 1);
    }

    #[test]
    fn event_round_trips() {
        let event = StockEvent {
            id: "evt-1".into(),
            sequence: 7,
            event_type: EventType::StockAdjusted,
            payload: EventPayload {
                store_id: StoreId::new("S1").unwrap(),
                sku: Sku::new("A").unwrap(),
                delta: Some(-3),
                reserved_qty: None,
                previous_qty: 10,
                new_qty: 7,
                previous_version: 3,
                new_version: 4,
            },
            timestamp: datetime!(2024-06-01 12:00:00 UTC),
        };
        let raw = serde_json::to_string(&event).unwrap();
        let back: StockEvent = serde_json::from_str(&raw).unwrap();
        assert_eq!(back, event);
        assert!(raw.contains(r#""type":"StockAdjusted""#));
    }
}
