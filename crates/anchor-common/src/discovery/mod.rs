//! Service discovery
//!
//! The core advertises itself and agents look for it through a
//! [`DiscoveryBeacon`]: a transport offering `announce` and `query`
//! primitives plus a stream of everything heard on the segment. Consumers
//! drive a single loop over [`DiscoveryBeacon::subscribe`] instead of
//! registering callbacks.

mod memory;
mod udp;

pub use memory::MemoryBeacon;
pub use udp::{BeaconRole, UdpBeacon};

use std::net::{IpAddr, SocketAddr};

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

use crate::error::DiscoveryError;

/// Service name the core answers for
pub const ANCHOR_SERVICE: &str = "_anchor._tcp.local";

/// Where a service instance can be reached
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Announcement {
    /// Service name, e.g. `_anchor._tcp.local`
    pub service: String,
    /// Instance name, e.g. `anchor-core._anchor._tcp.local`
    pub instance: String,
    /// Advertised host name
    pub host: String,
    /// Address the host name resolves to
    pub address: IpAddr,
    /// Service port
    pub port: u16,
    /// Seconds the answer stays valid
    pub ttl_secs: u32,
}

impl Announcement {
    /// HTTP base URL for the announced service
    pub fn base_url(&self) -> String {
        format!("http://{}", SocketAddr::new(self.address, self.port))
    }
}

/// Something heard on the discovery segment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DiscoveryEvent {
    /// Someone is looking for a service
    Query { service: String },
    /// A service instance advertised itself
    Announce(Announcement),
}

impl DiscoveryEvent {
    /// The announcement, if this event resolves `service`
    pub fn resolves(&self, service: &str) -> Option<&Announcement> {
        match self {
            DiscoveryEvent::Announce(a) if a.service == service => Some(a),
            _ => None,
        }
    }

    /// Whether this event asks for `service`
    pub fn asks_for(&self, service: &str) -> bool {
        matches!(self, DiscoveryEvent::Query { service: s } if s == service)
    }
}

/// Lazy, unbounded sequence of discovery events
pub type DiscoveryStream = BoxStream<'static, DiscoveryEvent>;

/// Transport for discovery traffic
#[async_trait]
pub trait DiscoveryBeacon: Send + Sync {
    /// Advertise a service instance
    async fn announce(&self, announcement: &Announcement) -> Result<(), DiscoveryError>;

    /// Ask who provides `service`
    async fn query(&self, service: &str) -> Result<(), DiscoveryError>;

    /// Stream of events heard from now on
    fn subscribe(&self) -> DiscoveryStream;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn announcement() -> Announcement {
        Announcement {
            service: ANCHOR_SERVICE.to_string(),
            instance: "anchor-core._anchor._tcp.local".to_string(),
            host: "anchor-core.local".to_string(),
            address: IpAddr::V4(Ipv4Addr::new(192, 168, 1, 20)),
            port: 3333,
            ttl_secs: 300,
        }
    }

    #[test]
    fn test_base_url() {
        assert_eq!(announcement().base_url(), "http://192.168.1.20:3333");
    }

    #[test]
    fn test_resolves_only_matching_service() {
        let event = DiscoveryEvent::Announce(announcement());
        assert!(event.resolves(ANCHOR_SERVICE).is_some());
        assert!(event.resolves("_other._tcp.local").is_none());

        let query = DiscoveryEvent::Query {
            service: ANCHOR_SERVICE.to_string(),
        };
        assert!(query.resolves(ANCHOR_SERVICE).is_none());
        assert!(query.asks_for(ANCHOR_SERVICE));
    }

    #[test]
    fn test_event_wire_format() {
        let json = serde_json::to_value(DiscoveryEvent::Query {
            service: ANCHOR_SERVICE.to_string(),
        })
        .unwrap();
        assert_eq!(
            json,
            serde_json::json!({"kind": "query", "service": "_anchor._tcp.local"})
        );

        let json = serde_json::to_string(&DiscoveryEvent::Announce(announcement())).unwrap();
        let back: DiscoveryEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back.resolves(ANCHOR_SERVICE), Some(&announcement()));
    }
}
