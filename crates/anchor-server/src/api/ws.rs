//! Relay WebSocket endpoint

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::ws::{close_code, CloseFrame, Message, WebSocket};
use axum::extract::{ConnectInfo, Query, State, WebSocketUpgrade};
use axum::http::HeaderMap;
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;

use super::client_origin;
use crate::relay::{ChannelHandle, RelaySession, RELAY_CHANNEL_CAPACITY};
use crate::state::CoreState;

#[derive(Debug, Deserialize)]
pub struct WsParams {
    #[serde(rename = "apiKey")]
    api_key: Option<String>,
}

/// WebSocket upgrade handler
///
/// The shared secret travels in the `apiKey` query parameter. Rejected
/// callers are upgraded and immediately closed with a policy-violation code.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<CoreState>>,
    Query(params): Query<WsParams>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
) -> Response {
    let origin = client_origin(connect_info.as_ref(), &headers);

    if state
        .authenticate(params.api_key.as_deref(), &origin, "Invalid WS Key")
        .is_err()
    {
        return ws.on_upgrade(refuse);
    }

    tracing::debug!("Relay connection accepted from {}", origin);
    ws.on_upgrade(move |socket| handle_socket(socket, state, origin))
}

async fn refuse(mut socket: WebSocket) {
    let frame = CloseFrame {
        code: close_code::POLICY,
        reason: "Unauthorized".into(),
    };
    let _ = socket.send(Message::Close(Some(frame))).await;
}

/// Drive one authenticated relay connection
async fn handle_socket(socket: WebSocket, state: Arc<CoreState>, origin: String) {
    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::channel::<String>(RELAY_CHANNEL_CAPACITY);
    let mut session = RelaySession::new(state, ChannelHandle::new(tx), origin);

    let writer = tokio::spawn(async move {
        while let Some(text) = rx.recv().await {
            if sender.send(Message::Text(text)).await.is_err() {
                tracing::debug!("Client disconnected");
                break;
            }
        }
    });

    while let Some(message) = receiver.next().await {
        match message {
            Ok(Message::Text(text)) => {
                session.handle_text(&text);
            }
            Ok(Message::Close(_)) => break,
            Ok(Message::Binary(_)) => tracing::debug!("Ignoring binary relay frame"),
            Ok(_) => {}
            Err(e) => {
                tracing::debug!("Relay socket error: {}", e);
                break;
            }
        }
    }

    session.close();
    writer.abort();
}
