//! Core server configuration

use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use super::serde_utils::duration_secs;
use super::{DEFAULT_DISCOVERY_GROUP, DEFAULT_SHARED_SECRET};
use crate::discovery::ANCHOR_SERVICE;

/// Configuration for the core server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    /// Address the HTTP/WebSocket listener binds to
    pub bind_address: String,

    /// Process-wide shared secret for heartbeats and the relay
    pub shared_secret: String,

    /// Host name advertised through discovery
    pub host_name: String,

    /// Discovery service name answered by this core
    pub service_name: String,

    /// Address advertised to agents (defaults to the first non-loopback IPv4)
    pub advertised_address: Option<IpAddr>,

    /// Multicast group used by the discovery beacon
    pub discovery_group: String,

    /// Period between unsolicited announcements
    #[serde(with = "duration_secs")]
    pub announce_interval: Duration,

    /// TTL carried by announcements, in seconds
    pub announce_ttl_secs: u32,

    /// Raw events kept per device
    pub history_capacity: usize,

    /// Security events kept by the sentinel
    pub security_log_capacity: usize,

    /// Browser origins allowed by CORS (substring match)
    pub allowed_origins: Vec<String>,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:3333".to_string(),
            shared_secret: DEFAULT_SHARED_SECRET.to_string(),
            host_name: "anchor-core.local".to_string(),
            service_name: ANCHOR_SERVICE.to_string(),
            advertised_address: None,
            discovery_group: DEFAULT_DISCOVERY_GROUP.to_string(),
            announce_interval: Duration::from_secs(30),
            announce_ttl_secs: 300,
            history_capacity: 50,
            security_log_capacity: 1000,
            allowed_origins: vec![
                "localhost".to_string(),
                "127.0.0.1".to_string(),
                "anchor-core.local".to_string(),
            ],
        }
    }
}

impl CoreConfig {
    /// Port portion of the bind address
    pub fn port(&self) -> Option<u16> {
        self.bind_address
            .parse::<SocketAddr>()
            .map(|addr| addr.port())
            .ok()
    }

    /// Instance name announced for this core
    pub fn instance_name(&self) -> String {
        let host = self.host_name.trim_end_matches(".local");
        format!("{}.{}", host, self.service_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CoreConfig::default();
        assert_eq!(config.port(), Some(3333));
        assert_eq!(config.history_capacity, 50);
        assert_eq!(config.security_log_capacity, 1000);
        assert_eq!(config.instance_name(), "anchor-core._anchor._tcp.local");
    }

    #[test]
    fn test_unparsable_bind_has_no_port() {
        let config = CoreConfig {
            bind_address: "nowhere".to_string(),
            ..CoreConfig::default()
        };
        assert_eq!(config.port(), None);
    }
}
