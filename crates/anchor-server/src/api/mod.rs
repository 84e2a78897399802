//! HTTP and WebSocket surface of the core

mod error;
mod handlers;
mod ws;

pub use error::ApiError;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::ConnectInfo;
use axum::http::{header, request::Parts, HeaderMap, HeaderName, HeaderValue, Method};
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::auth::API_KEY_HEADER;
use crate::state::CoreState;

/// Origin recorded when neither the socket nor a proxy header names one
const FALLBACK_ORIGIN: &str = "127.0.0.1";

/// Build the core's router
pub fn router(state: Arc<CoreState>) -> Router {
    let cors = cors_layer(&state.config.allowed_origins);

    Router::new()
        .route("/api/health", get(handlers::health))
        .route("/api/metrics", get(handlers::metrics))
        .route("/api/register", post(handlers::register_identity))
        .route("/api/devices", get(handlers::list_devices))
        .route("/api/devices/heartbeat", post(handlers::heartbeat))
        .route("/api/devices/heartbeat/batch", post(handlers::heartbeat_batch))
        .route("/api/devices/:id", get(handlers::get_device))
        .route("/api/security/alerts", get(handlers::security_alerts))
        .route("/api/ws", get(ws::ws_handler))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// CORS policy admitting origins that contain any allowed host
fn cors_layer(allowed: &[String]) -> CorsLayer {
    let allowed = allowed.to_vec();
    CorsLayer::new()
        .allow_origin(AllowOrigin::predicate(
            move |origin: &HeaderValue, _parts: &Parts| {
                origin
                    .to_str()
                    .map(|origin| allowed.iter().any(|host| origin.contains(host.as_str())))
                    .unwrap_or(false)
            },
        ))
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE, HeaderName::from_static(API_KEY_HEADER)])
}

/// Network origin of a caller, used as the sentinel source and device ip
pub(crate) fn client_origin(
    connect_info: Option<&ConnectInfo<SocketAddr>>,
    headers: &HeaderMap,
) -> String {
    if let Some(ConnectInfo(addr)) = connect_info {
        return addr.ip().to_string();
    }
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| FALLBACK_ORIGIN.to_string())
}

/// Shared secret presented in the request headers
pub(crate) fn api_key(headers: &HeaderMap) -> Option<&str> {
    headers.get(API_KEY_HEADER).and_then(|v| v.to_str().ok())
}
