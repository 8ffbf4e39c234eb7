use serde_json::{Value, json};
use thiserror::Error;

/// Typed domain errors produced by the core and surfaced verbatim at the HTTP
/// boundary, which maps them to status codes and the wire error body.
#[derive(Debug, Error)]
pub enum InventoryError {
    #[error("{message}")]
    Validation { message: String },
    #[error("invalid If-Match header: {value}")]
    InvalidIfMatch { value: String },
    #[error("no stock record for {store_id}/{sku}")]
    NotFound { store_id: String, sku: String },
    #[error("version mismatch: expected {expected}, actual {actual}")]
    VersionConflict { expected: u64, actual: u64 },
    #[error("idempotency key {key} reused with a different payload")]
    IdempotencyConflict { key: String },
    #[error("insufficient stock: requested {requested}, available {available}")]
    InsufficientStock { requested: i64, available: i64 },
    #[error("rate limit exceeded, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },
    #[error("service overloaded ({reason}), retry after {retry_after_secs}s")]
    Overloaded {
        reason: String,
        retry_after_secs: u64,
    },
    #[error("circuit {name} is open")]
    CircuitOpen { name: String },
    #[error("persistence failure: {context}")]
    Persistence { context: String },
    #[error("internal error: {message}")]
    Internal { message: String },
}

impl InventoryError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    pub fn persistence(context: impl Into<String>) -> Self {
        Self::Persistence {
            context: context.into(),
        }
    }

    /// Error class name carried in the wire error body.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Validation { .. } | Self::InvalidIfMatch { .. } => "ValidationError",
            Self::NotFound { .. } => "NotFoundError",
            Self::VersionConflict { .. } | Self::IdempotencyConflict { .. } => "ConflictError",
            Self::InsufficientStock { .. } => "InsufficientStockError",
            Self::RateLimited { .. } => "RateLimited",
            Self::Overloaded { .. } => "ServiceOverloaded",
            Self::CircuitOpen { .. } => "CircuitOpen",
            Self::Persistence { .. } => "PersistenceError",
            Self::Internal { .. } => "InternalError",
        }
    }

    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "VALIDATION_ERROR",
            Self::InvalidIfMatch { .. } => "INVALID_IF_MATCH",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::VersionConflict { .. } => "VERSION_CONFLICT",
            Self::IdempotencyConflict { .. } => "IDEMPOTENCY_CONFLICT",
            Self::InsufficientStock { .. } => "INSUFFICIENT_STOCK",
            Self::RateLimited { .. } => "RATE_LIMITED",
            Self::Overloaded { .. } => "SERVICE_OVERLOADED",
            Self::CircuitOpen { .. } => "CIRCUIT_OPEN",
            Self::Persistence { .. } => "PERSISTENCE_ERROR",
            Self::Internal { .. } => "INTERNAL_ERROR",
        }
    }

    pub fn status_code(&self) -> u16 {
        match self {
            Self::Validation { .. } | Self::InvalidIfMatch { .. } => 400,
            Self::NotFound { .. } => 404,
            Self::VersionConflict { .. } | Self::IdempotencyConflict { .. } => 409,
            Self::InsufficientStock { .. } => 422,
            Self::RateLimited { .. } => 429,
            Self::Overloaded { .. } | Self::CircuitOpen { .. } => 503,
            Self::Persistence { .. } | Self::Internal { .. } => 500,
        }
    }

    /// Retry hint in seconds for backpressure rejections.
    pub fn retry_after_secs(&self) -> Option<u64> {
        match self {
            Self::RateLimited { retry_after_secs } | Self::Overloaded { retry_after_secs, .. } => {
                Some(*retry_after_secs)
            }
            _ => None,
        }
    }

    /// Structured details for the wire error body, when the variant carries
    /// any.
    pub fn details(&self) -> Option<Value> {
        match self {
            Self::VersionConflict { expected, actual } => Some(json!({
                "expectedVersion": expected,
                "actualVersion": actual,
            })),
            Self::InsufficientStock {
                requested,
                available,
            } => Some(json!({
                "requested": requested,
                "available": available,
            })),
            Self::NotFound { store_id, sku } => Some(json!({
                "storeId": store_id,
                "sku": sku,
            })),
            Self::RateLimited { retry_after_secs } | Self::Overloaded { retry_after_secs, .. } => {
                Some(json!({ "retryAfter": retry_after_secs }))
            }
            _ => None,
        }
    }
}
