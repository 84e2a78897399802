//! HTTP route handlers

use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{ConnectInfo, Path, State};
use axum::http::HeaderMap;
use axum::Json;
use serde_json::{json, Value};

use anchor_common::DeviceId;
use anchor_protocol::{BatchAck, DeviceEvent, HeartbeatAck, IdentityGrant};

use super::{api_key, client_origin, ApiError};
use crate::registry::DeviceRecord;
use crate::sentinel::Alert;
use crate::state::CoreState;

type ApiResult<T> = Result<Json<T>, ApiError>;

pub async fn health(State(state): State<Arc<CoreState>>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "uptimeSecs": state.uptime().as_secs(),
        "timestamp": state.clock.now(),
    }))
}

pub async fn metrics(State(state): State<Arc<CoreState>>) -> Json<Value> {
    Json(json!({
        "connections": state.relay.len(),
        "devices": state.registry.len(),
        "alerts": state.sentinel.alert_count(),
        "uptimeSecs": state.uptime().as_secs(),
    }))
}

/// Issue a fresh device identity
pub async fn register_identity() -> Json<IdentityGrant> {
    let id = DeviceId::generate();
    tracing::info!("Issued device identity {}", id.short());
    Json(IdentityGrant { id: id.to_string() })
}

/// Single live heartbeat; the core stamps arrival time
pub async fn heartbeat(
    State(state): State<Arc<CoreState>>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<HeartbeatAck> {
    let origin = client_origin(connect_info.as_ref(), &headers);
    state.authenticate(api_key(&headers), &origin, "Invalid API Key")?;

    // Client timestamps are dropped; arrival time is stamped below
    let mut body: Value = parse_body(&body)?;
    if let Some(fields) = body.as_object_mut() {
        fields.remove("timestamp");
    }
    let mut event: DeviceEvent = serde_json::from_value(body)
        .map_err(|e| ApiError::Validation(format!("Invalid heartbeat: {}", e)))?;
    event.ip = Some(origin);
    event.timestamp = Some(state.clock.now());
    state.registry.upsert(event)?;

    Ok(Json(HeartbeatAck { success: true }))
}

/// Replay of buffered events; each keeps its own timestamp
pub async fn heartbeat_batch(
    State(state): State<Arc<CoreState>>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<BatchAck> {
    let origin = client_origin(connect_info.as_ref(), &headers);
    state.authenticate(api_key(&headers), &origin, "Invalid API Key (Batch)")?;

    let body: Value = parse_body(&body)?;
    let Some(events) = body.get("events").and_then(Value::as_array) else {
        return Err(ApiError::Validation("Invalid batch format".to_string()));
    };
    let batch_id = body.get("id").and_then(Value::as_str);

    tracing::info!(
        "Received batch of {} events from {}",
        events.len(),
        batch_id.unwrap_or(origin.as_str())
    );

    let mut count = 0;
    for raw in events {
        let mut event: DeviceEvent = match serde_json::from_value(raw.clone()) {
            Ok(event) => event,
            Err(e) => {
                tracing::debug!("Skipping malformed batch event: {}", e);
                continue;
            }
        };
        if event.id.as_deref().map_or(true, str::is_empty) {
            event.id = batch_id.map(str::to_owned);
        }
        event.ip = Some(origin.clone());
        if event.timestamp.is_none() {
            event.timestamp = Some(state.clock.now());
        }

        match state.registry.upsert(event) {
            Ok(_) => count += 1,
            Err(e) => tracing::debug!("Skipping batch event: {}", e),
        }
    }

    Ok(Json(BatchAck {
        success: true,
        count,
    }))
}

pub async fn list_devices(State(state): State<Arc<CoreState>>) -> Json<Vec<DeviceRecord>> {
    Json(state.registry.list())
}

pub async fn get_device(
    State(state): State<Arc<CoreState>>,
    Path(id): Path<String>,
) -> ApiResult<DeviceRecord> {
    state
        .registry
        .get(&DeviceId::new(id.as_str()))
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Device {}", id)))
}

pub async fn security_alerts(State(state): State<Arc<CoreState>>) -> Json<Vec<Alert>> {
    Json(state.sentinel.alerts())
}

fn parse_body<T: serde::de::DeserializeOwned>(body: &[u8]) -> Result<T, ApiError> {
    let body = if body.is_empty() { b"{}".as_slice() } else { body };
    serde_json::from_slice(body)
        .map_err(|e| ApiError::Validation(format!("Invalid JSON body: {}", e)))
}
