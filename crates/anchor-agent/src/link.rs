//! HTTP link to the core

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

use anchor_common::DeviceId;
use anchor_protocol::{BatchAck, DeviceEvent, HeartbeatAck, HeartbeatBatch, IdentityGrant};

/// Header carrying the shared secret
const API_KEY_HEADER: &str = "x-api-key";

/// Failures talking to the core; all of them are recoverable
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LinkError {
    #[error("Request timed out")]
    Timeout,

    #[error("Network error: {0}")]
    Network(String),

    #[error("Unexpected status {0}")]
    Status(u16),

    #[error("Core reported failure")]
    Rejected,

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl From<reqwest::Error> for LinkError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            LinkError::Timeout
        } else {
            LinkError::Network(e.to_string())
        }
    }
}

/// Requests the agent makes of the core.
///
/// `server` is the core's base URL, e.g. `http://10.0.0.2:3333`.
#[async_trait]
pub trait CoreLink: Send + Sync {
    /// Ask the core for a fresh device identity
    async fn request_identity(&self, server: &str) -> Result<DeviceId, LinkError>;

    /// Send one live heartbeat
    async fn send_heartbeat(&self, server: &str, event: &DeviceEvent) -> Result<(), LinkError>;

    /// Replay buffered heartbeats; the batch succeeds or fails as a whole
    async fn send_batch(&self, server: &str, batch: &HeartbeatBatch) -> Result<(), LinkError>;
}

/// [`CoreLink`] over HTTP with a per-request timeout
pub struct HttpLink {
    client: reqwest::Client,
    secret: String,
}

impl HttpLink {
    /// Create a link presenting `secret` on authenticated requests
    pub fn new(secret: impl Into<String>, timeout: Duration) -> Result<Self, LinkError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("anchor-agent/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            secret: secret.into(),
        })
    }

    async fn post<B, R>(&self, url: String, body: &B, authenticated: bool) -> Result<R, LinkError>
    where
        B: Serialize + Sync,
        R: DeserializeOwned,
    {
        let mut request = self.client.post(&url).json(body);
        if authenticated {
            request = request.header(API_KEY_HEADER, &self.secret);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(LinkError::Status(response.status().as_u16()));
        }

        response
            .json()
            .await
            .map_err(|e| LinkError::InvalidResponse(e.to_string()))
    }
}

#[async_trait]
impl CoreLink for HttpLink {
    async fn request_identity(&self, server: &str) -> Result<DeviceId, LinkError> {
        let grant: IdentityGrant = self
            .post(endpoint(server, "/api/register"), &serde_json::json!({}), false)
            .await?;
        if grant.id.is_empty() {
            return Err(LinkError::InvalidResponse("empty identity".to_string()));
        }
        Ok(DeviceId::new(grant.id))
    }

    async fn send_heartbeat(&self, server: &str, event: &DeviceEvent) -> Result<(), LinkError> {
        let ack: HeartbeatAck = self
            .post(endpoint(server, "/api/devices/heartbeat"), event, true)
            .await?;
        if ack.success {
            Ok(())
        } else {
            Err(LinkError::Rejected)
        }
    }

    async fn send_batch(&self, server: &str, batch: &HeartbeatBatch) -> Result<(), LinkError> {
        let ack: BatchAck = self
            .post(endpoint(server, "/api/devices/heartbeat/batch"), batch, true)
            .await?;
        if ack.success {
            Ok(())
        } else {
            Err(LinkError::Rejected)
        }
    }
}

fn endpoint(server: &str, path: &str) -> String {
    format!("{}{}", server.trim_end_matches('/'), path)
}
