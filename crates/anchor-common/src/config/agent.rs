//! Agent configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::serde_utils::duration_secs;
use super::{DEFAULT_DISCOVERY_GROUP, DEFAULT_SHARED_SECRET};
use crate::discovery::ANCHOR_SERVICE;

/// Configuration for a device agent
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Identity issued by the core; requested on first contact when absent
    pub device_id: Option<String>,

    /// Display name, conventionally `"<type> - <user>"`
    pub name: Option<String>,

    /// Shared secret presented on every heartbeat
    pub shared_secret: String,

    /// Fixed core base URL (e.g. `http://10.0.0.2:3333`), bypassing discovery
    pub server_url: Option<String>,

    /// Discovery service to look for
    pub service_name: String,

    /// Multicast group used by the discovery beacon
    pub discovery_group: String,

    /// Period of the state machine tick
    #[serde(with = "duration_secs")]
    pub heartbeat_interval: Duration,

    /// Upper bound on each outbound request
    #[serde(with = "duration_secs")]
    pub request_timeout: Duration,

    /// Pending heartbeats kept while the core is unreachable
    pub buffer_capacity: usize,

    /// Consecutive heartbeat failures before going offline
    pub failure_threshold: u32,

    /// Probe the core on every n-th offline tick
    pub probe_every: u32,

    /// Activity string reported with heartbeats
    pub activity: Option<String>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            device_id: None,
            name: None,
            shared_secret: DEFAULT_SHARED_SECRET.to_string(),
            server_url: None,
            service_name: ANCHOR_SERVICE.to_string(),
            discovery_group: DEFAULT_DISCOVERY_GROUP.to_string(),
            heartbeat_interval: Duration::from_secs(5),
            request_timeout: Duration::from_secs(2),
            buffer_capacity: 100,
            failure_threshold: 2,
            probe_every: 3,
            activity: None,
        }
    }
}

impl AgentConfig {
    /// Display name, falling back to `"<hostname> - <user>"`
    pub fn display_name(&self) -> String {
        self.name.clone().unwrap_or_else(|| {
            format!(
                "{} - {}",
                gethostname::gethostname().to_string_lossy(),
                whoami::username()
            )
        })
    }
}
