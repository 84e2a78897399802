//! End-to-end tests for the core's HTTP API

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::body::{to_bytes, Body};
use axum::extract::connect_info::MockConnectInfo;
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use anchor_common::config::CoreConfig;
use anchor_common::{Clock, DeviceId, ManualClock};
use anchor_server::{api, CoreState};

const KEY: &str = "anchor_secure_dev_key";

fn setup() -> (Router, Arc<CoreState>, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::from_millis(1_714_557_600_000));
    let state = Arc::new(CoreState::with_clock(CoreConfig::default(), clock.clone()));
    let app = api::router(Arc::clone(&state))
        .layer(MockConnectInfo(SocketAddr::from(([10, 0, 0, 5], 40000))));
    (app, state, clock)
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn post(uri: &str, key: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::post(uri).header("content-type", "application/json");
    if let Some(key) = key {
        builder = builder.header("x-api-key", key);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::get(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn test_heartbeat_registers_device() {
    let (app, _state, _clock) = setup();

    let (status, body) = send(
        &app,
        post(
            "/api/devices/heartbeat",
            Some(KEY),
            json!({"id": "dev-1", "name": "Laptop - alice", "activity": "Coding"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"success": true}));

    let (status, devices) = send(&app, get("/api/devices")).await;
    assert_eq!(status, StatusCode::OK);
    let devices = devices.as_array().unwrap();
    assert_eq!(devices.len(), 1);
    assert_eq!(devices[0]["id"], "dev-1");
    assert_eq!(devices[0]["type"], "Laptop");
    assert_eq!(devices[0]["user"], "alice");
    assert_eq!(devices[0]["ip"], "10.0.0.5");
    assert_eq!(devices[0]["activity"], "Coding");
    assert_eq!(devices[0]["status"], "online");
}

#[tokio::test]
async fn test_heartbeat_rejects_bad_key() {
    let (app, state, _clock) = setup();

    let (status, body) = send(
        &app,
        post("/api/devices/heartbeat", Some("wrong"), json!({"id": "dev-1"})),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body, json!({"success": false, "error": "Unauthorized"}));

    let (status, _) = send(&app, post("/api/devices/heartbeat", None, json!({"id": "dev-1"}))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    assert!(state.registry.is_empty());
    assert_eq!(state.sentinel.events().len(), 2);
    assert_eq!(state.sentinel.events()[0].source, "10.0.0.5");
}

#[tokio::test]
async fn test_heartbeat_without_id_is_bad_request() {
    let (app, state, _clock) = setup();

    let (status, body) = send(
        &app,
        post("/api/devices/heartbeat", Some(KEY), json!({"name": "nobody"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({"success": false, "error": "Missing ID"}));
    assert!(state.registry.is_empty());
}

#[tokio::test]
async fn test_batch_replays_with_original_timestamps() {
    let (app, state, _clock) = setup();

    // A live heartbeat lands first, stamped with the core's clock
    send(
        &app,
        post(
            "/api/devices/heartbeat",
            Some(KEY),
            json!({"id": "dev-1", "activity": "Live"}),
        ),
    )
    .await;

    let (status, body) = send(
        &app,
        post(
            "/api/devices/heartbeat/batch",
            Some(KEY),
            json!({
                "id": "dev-1",
                "events": [
                    {"activity": "Old-1", "timestamp": "2024-05-01T09:00:00Z"},
                    {"activity": "Old-2", "timestamp": "2024-05-01T09:00:05Z"},
                    {"id": "dev-2", "activity": "Other", "timestamp": "2024-05-01T09:00:05Z"}
                ]
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"success": true, "count": 3}));

    let (_, device) = send(&app, get("/api/devices/dev-1")).await;
    assert_eq!(device["activity"], "Live");
    assert_eq!(device["history"].as_array().unwrap().len(), 3);

    assert_eq!(state.registry.len(), 2);
}

#[tokio::test]
async fn test_heartbeat_ignores_client_timestamp_format() {
    let (app, state, clock) = setup();

    let (status, body) = send(
        &app,
        post(
            "/api/devices/heartbeat",
            Some(KEY),
            json!({"id": "dev-1", "timestamp": 1_700_000_000_000u64}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"success": true}));

    let record = state.registry.get(&DeviceId::new("dev-1")).unwrap();
    assert_eq!(record.last_seen, Some(clock.now()));
}

#[tokio::test]
async fn test_batch_empty_event_id_falls_back_to_batch_id() {
    let (app, state, _clock) = setup();

    let (status, body) = send(
        &app,
        post(
            "/api/devices/heartbeat/batch",
            Some(KEY),
            json!({
                "id": "dev-1",
                "events": [{"id": "", "activity": "Replayed", "timestamp": "2024-05-01T09:00:00Z"}]
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"success": true, "count": 1}));

    let (status, device) = send(&app, get("/api/devices/dev-1")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(device["activity"], "Replayed");
    assert_eq!(state.registry.len(), 1);
}

#[tokio::test]
async fn test_batch_without_events_is_bad_request() {
    let (app, _state, _clock) = setup();

    let (status, body) = send(
        &app,
        post("/api/devices/heartbeat/batch", Some(KEY), json!({"id": "dev-1"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({"success": false, "error": "Invalid batch format"}));
}

#[tokio::test]
async fn test_batch_requires_key() {
    let (app, _state, _clock) = setup();

    let (status, _) = send(
        &app,
        post(
            "/api/devices/heartbeat/batch",
            Some("nope"),
            json!({"id": "dev-1", "events": []}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_auth_burst_raises_one_alert() {
    let (app, _state, clock) = setup();

    for _ in 0..6 {
        let (status, _) = send(
            &app,
            post("/api/devices/heartbeat", Some("guess"), json!({"id": "x"})),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        clock.advance(Duration::from_secs(1));
    }

    let (status, alerts) = send(&app, get("/api/security/alerts")).await;
    assert_eq!(status, StatusCode::OK);
    let alerts = alerts.as_array().unwrap();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0]["ruleId"], "AUTH_FAIL_BURST");
    assert_eq!(alerts[0]["source"], "10.0.0.5");
}

#[tokio::test]
async fn test_register_issues_unique_ids() {
    let (app, _state, _clock) = setup();

    let (status, first) = send(&app, post("/api/register", None, json!({}))).await;
    assert_eq!(status, StatusCode::OK);
    let (_, second) = send(&app, post("/api/register", None, json!({}))).await;

    let first = first["id"].as_str().unwrap();
    let second = second["id"].as_str().unwrap();
    assert_eq!(first.len(), 36);
    assert_ne!(first, second);
}

#[tokio::test]
async fn test_unknown_device_is_not_found() {
    let (app, _state, _clock) = setup();

    let (status, body) = send(&app, get("/api/devices/missing")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn test_health_and_metrics() {
    let (app, _state, _clock) = setup();

    let (status, health) = send(&app, get("/api/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(health["status"], "ok");
    assert_eq!(health["version"], env!("CARGO_PKG_VERSION"));

    send(
        &app,
        post("/api/devices/heartbeat", Some(KEY), json!({"id": "dev-1"})),
    )
    .await;

    let (_, metrics) = send(&app, get("/api/metrics")).await;
    assert_eq!(metrics["devices"], 1);
    assert_eq!(metrics["connections"], 0);
    assert_eq!(metrics["alerts"], 0);
}

#[tokio::test]
async fn test_name_is_escaped_in_listing() {
    let (app, _state, _clock) = setup();

    send(
        &app,
        post(
            "/api/devices/heartbeat",
            Some(KEY),
            json!({"id": "dev-1", "name": "<img src=x onerror=alert(1)>"}),
        ),
    )
    .await;

    let (_, device) = send(&app, get("/api/devices/dev-1")).await;
    assert_eq!(device["name"], "&lt;img src=x onerror=alert(1)&gt;");
}
