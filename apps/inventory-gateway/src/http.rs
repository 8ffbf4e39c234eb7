//! HTTP surface: routing, precondition handling, the admission chain for
//! mutating requests, and the wire error body mapping.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::body::Bytes;
use axum::extract::{ConnectInfo, FromRequestParts, Path, State};
use axum::http::request::Parts;
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use inv_core::{
    AdjustCommand, CommandResult, InventoryError, ReserveCommand, Sku, StoreId, etag,
    resolve_expected_version,
};
use inv_telemetry::counters;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

pub const IDEMPOTENCY_KEY_HEADER: &str = "idempotency-key";

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .route("/stores/{store_id}/inventory/{sku}", get(get_stock))
        .route("/stores/{store_id}/inventory/{sku}/adjust", post(adjust))
        .route("/stores/{store_id}/inventory/{sku}/reserve", post(reserve))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Wire wrapper that renders the domain error taxonomy as the JSON error
/// body, with a `Retry-After` header on backpressure rejections.
pub struct ApiError(pub InventoryError);

impl From<InventoryError> for ApiError {
    fn from(err: InventoryError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let err = self.0;
        counters::record_counter(counters::ERRORS, 1);

        let status = StatusCode::from_u16(err.status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let timestamp = OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .unwrap_or_default();
        let mut body = json!({
            "success": false,
            "error": {
                "name": err.name(),
                "message": err.to_string(),
                "code": err.code(),
                "statusCode": err.status_code(),
                "timestamp": timestamp,
            }
        });
        if let Some(details) = err.details() {
            body["error"]["details"] = details;
        }

        let mut response = (status, Json(body)).into_response();
        if let Some(secs) = err.retry_after_secs()
            && let Ok(value) = HeaderValue::from_str(&secs.to_string())
        {
            response.headers_mut().insert(header::RETRY_AFTER, value);
        }
        response
    }
}

/// Peer address when the server is driven with connect info; absent in
/// router-level tests.
struct ClientAddr(Option<SocketAddr>);

impl<S> FromRequestParts<S> for ClientAddr
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self(
            parts
                .extensions
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| *addr),
        ))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AdjustBody {
    delta: i64,
    #[serde(default)]
    expected_version: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReserveBody {
    qty: i64,
    #[serde(default)]
    expected_version: Option<u64>,
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn metrics(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "counters": counters::snapshot(),
        "pools": {
            "api": {
                "active": state.api_pool.active(),
                "queued": state.api_pool.queue_depth(),
            },
            "sync": {
                "active": state.sync_pool.active(),
                "queued": state.sync_pool.queue_depth(),
            },
            "filesystem": {
                "active": state.fs_pool.active(),
                "queued": state.fs_pool.queue_depth(),
            },
        },
        "breakers": {
            "persistence": state.persistence_breaker.state_name(),
            "sync": state.sync_breaker.state_name(),
        },
        "idempotencyEntries": state.idempotency.len(),
        "rateLimitBuckets": state.limiter.bucket_count(),
        "activeWriteKeys": state.engine.active_keys(),
    }))
}

async fn get_stock(
    State(state): State<Arc<AppState>>,
    Path((store_id, sku)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    counters::record_counter(counters::REQUESTS, 1);
    let store_id = StoreId::new(store_id)?;
    let sku = Sku::new(sku)?;

    let record = state.stock.get(&store_id, &sku).await?;
    let tag = etag(record.version);
    let mut response = (StatusCode::OK, Json(record)).into_response();
    set_etag(&mut response, &tag);
    Ok(response)
}

async fn adjust(
    State(state): State<Arc<AppState>>,
    Path((store_id, sku)): Path<(String, String)>,
    client: ClientAddr,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    let (store_id, sku) = admit(&state, store_id, sku, &headers, &client)?;
    let body: AdjustBody = parse_body(&body)?;
    let expected_version =
        resolve_expected_version(header_str(&headers, header::IF_MATCH), body.expected_version)?;

    let cmd = AdjustCommand {
        store_id,
        sku,
        delta: body.delta,
        expected_version,
        idempotency_key: idempotency_key(&headers),
    };
    let result = state.api_pool.run(state.engine.adjust(cmd)).await??;
    Ok(command_response(result))
}

async fn reserve(
    State(state): State<Arc<AppState>>,
    Path((store_id, sku)): Path<(String, String)>,
    client: ClientAddr,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    let (store_id, sku) = admit(&state, store_id, sku, &headers, &client)?;
    let body: ReserveBody = parse_body(&body)?;
    let expected_version =
        resolve_expected_version(header_str(&headers, header::IF_MATCH), body.expected_version)?;

    let cmd = ReserveCommand {
        store_id,
        sku,
        qty: body.qty,
        expected_version,
        idempotency_key: idempotency_key(&headers),
    };
    let result = state.api_pool.run(state.engine.reserve(cmd)).await??;
    Ok(command_response(result))
}

/// Write-path admission chain: rate limiter, then the load shedder, before
/// any queueing. Also validates the path identifiers.
fn admit(
    state: &AppState,
    store_id: String,
    sku: String,
    headers: &HeaderMap,
    client: &ClientAddr,
) -> Result<(StoreId, Sku), InventoryError> {
    counters::record_counter(counters::REQUESTS, 1);
    let client = client_id(headers, client);
    state.limiter.check(&client)?;
    state.shedder.admit()?;
    Ok((StoreId::new(store_id)?, Sku::new(sku)?))
}

/// The rate-limit identifier: first `X-Forwarded-For` hop when present,
/// otherwise the peer address.
fn client_id(headers: &HeaderMap, client: &ClientAddr) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .or_else(|| client.0.map(|addr| addr.ip().to_string()))
        .unwrap_or_else(|| "unknown".into())
}

fn idempotency_key(headers: &HeaderMap) -> Option<String> {
    headers
        .get(IDEMPOTENCY_KEY_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
        .filter(|value| !value.trim().is_empty())
}

fn header_str(headers: &HeaderMap, name: header::HeaderName) -> Option<&str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

fn parse_body<T: DeserializeOwned>(body: &[u8]) -> Result<T, InventoryError> {
    if body.is_empty() {
        return Err(InventoryError::validation("request body is required"));
    }
    serde_json::from_slice(body)
        .map_err(|err| InventoryError::validation(format!("invalid request body: {err}")))
}

fn command_response(result: CommandResult) -> Response {
    let tag = etag(result.version);
    let body = json!({ "qty": result.qty, "version": result.version });
    let mut response = (StatusCode::OK, Json(body)).into_response();
    set_etag(&mut response, &tag);
    response
}

fn set_etag(response: &mut Response, tag: &str) {
    if let Ok(value) = HeaderValue::from_str(tag) {
        response.headers_mut().insert(header::ETAG, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_id_prefers_forwarded_header() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("10.1.2.3, 172.16.0.1"),
        );
        let client = ClientAddr(Some("127.0.0.1:9999".parse().unwrap()));
        assert_eq!(client_id(&headers, &client), "10.1.2.3");
    }

    #[test]
    fn client_id_falls_back_to_peer_then_unknown() {
        let headers = HeaderMap::new();
        let client = ClientAddr(Some("192.168.1.5:1234".parse().unwrap()));
        assert_eq!(client_id(&headers, &client), "192.168.1.5");
        assert_eq!(client_id(&headers, &ClientAddr(None)), "unknown");
    }

    #[test]
    fn blank_idempotency_key_is_ignored() {
        let mut headers = HeaderMap::new();
        headers.insert(IDEMPOTENCY_KEY_HEADER, HeaderValue::from_static("  "));
        assert_eq!(idempotency_key(&headers), None);

        headers.insert(IDEMPOTENCY_KEY_HEADER, HeaderValue::from_static("k1"));
        assert_eq!(idempotency_key(&headers), Some("k1".into()));
    }

    #[test]
    fn parse_body_reports_typed_validation_errors() {
        let missing: Result<AdjustBody, _> = parse_body(b"");
        assert_eq!(missing.unwrap_err().status_code(), 400);

        let malformed: Result<AdjustBody, _> = parse_body(b"{not json");
        assert_eq!(malformed.unwrap_err().code(), "VALIDATION_ERROR");

        let wrong: Result<AdjustBody, _> = parse_body(br#"{ "delta": "ten" }"#);
        assert_eq!(wrong.unwrap_err().code(), "VALIDATION_ERROR");

        let ok: AdjustBody = parse_body(br#"{ "delta": 5 }"#).unwrap();
        assert_eq!(ok.delta, 5);
        assert_eq!(ok.expected_version, None);
    }
}
