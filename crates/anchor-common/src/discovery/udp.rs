//! UDP multicast discovery transport
//!
//! Datagrams are JSON-encoded [`DiscoveryEvent`]s. The responder (the core)
//! binds the group port and joins the group; seekers (agents) send queries
//! to the group from an ephemeral port. Announcements go to the group and,
//! by unicast, to every seeker that queried since the last announcement, so
//! several agents can share a host without port reuse.

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::net::UdpSocket;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use super::memory::broadcast_stream;
use super::{Announcement, DiscoveryBeacon, DiscoveryEvent, DiscoveryStream};
use crate::error::DiscoveryError;

/// Largest datagram the beacon will read
const MAX_DATAGRAM: usize = 2048;

/// Pause after a failed receive before reading again
const RECV_RETRY_DELAY: Duration = Duration::from_millis(250);

/// Seekers remembered between announcements
const MAX_PENDING_QUERIERS: usize = 64;

/// Which side of discovery this beacon plays
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BeaconRole {
    /// Listens on the group and answers queries
    Responder,
    /// Sends queries and listens for unicast answers
    Seeker,
}

/// Multicast UDP discovery transport
pub struct UdpBeacon {
    socket: Arc<UdpSocket>,
    group: SocketAddrV4,
    queriers: Arc<Mutex<Vec<SocketAddr>>>,
    tx: broadcast::Sender<DiscoveryEvent>,
    receiver: JoinHandle<()>,
}

impl UdpBeacon {
    /// Bind a beacon on `group` (e.g. `239.255.42.99:53530`)
    pub async fn bind(group: &str, role: BeaconRole) -> Result<Self, DiscoveryError> {
        let group: SocketAddrV4 = group
            .parse()
            .map_err(|_| DiscoveryError::InvalidGroup(group.to_string()))?;
        if !group.ip().is_multicast() {
            return Err(DiscoveryError::InvalidGroup(group.to_string()));
        }

        let socket = match role {
            BeaconRole::Responder => {
                let socket =
                    UdpSocket::bind(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, group.port())).await?;
                socket.join_multicast_v4(*group.ip(), Ipv4Addr::UNSPECIFIED)?;
                socket
            }
            BeaconRole::Seeker => {
                UdpSocket::bind(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0)).await?
            }
        };
        socket.set_multicast_loop_v4(true)?;

        tracing::debug!("Discovery beacon bound as {:?} on {}", role, socket.local_addr()?);

        let socket = Arc::new(socket);
        let queriers = Arc::new(Mutex::new(Vec::new()));
        let (tx, _) = broadcast::channel(256);

        let receiver = tokio::spawn(receive_loop(
            Arc::clone(&socket),
            tx.clone(),
            Arc::clone(&queriers),
            role,
        ));

        Ok(Self {
            socket,
            group,
            queriers,
            tx,
            receiver,
        })
    }

    async fn send(&self, event: &DiscoveryEvent, to: SocketAddr) -> Result<(), DiscoveryError> {
        let datagram = serde_json::to_vec(event)?;
        self.socket.send_to(&datagram, to).await?;
        Ok(())
    }
}

#[async_trait]
impl DiscoveryBeacon for UdpBeacon {
    async fn announce(&self, announcement: &Announcement) -> Result<(), DiscoveryError> {
        let event = DiscoveryEvent::Announce(announcement.clone());
        self.send(&event, SocketAddr::V4(self.group)).await?;

        let mut pending = std::mem::take(&mut *self.queriers.lock());
        pending.sort();
        pending.dedup();
        for querier in pending {
            if let Err(e) = self.send(&event, querier).await {
                tracing::debug!("Failed to answer querier {}: {}", querier, e);
            }
        }
        Ok(())
    }

    async fn query(&self, service: &str) -> Result<(), DiscoveryError> {
        let event = DiscoveryEvent::Query {
            service: service.to_string(),
        };
        self.send(&event, SocketAddr::V4(self.group)).await
    }

    fn subscribe(&self) -> DiscoveryStream {
        broadcast_stream(self.tx.subscribe())
    }
}

impl Drop for UdpBeacon {
    fn drop(&mut self) {
        self.receiver.abort();
    }
}

async fn receive_loop(
    socket: Arc<UdpSocket>,
    tx: broadcast::Sender<DiscoveryEvent>,
    queriers: Arc<Mutex<Vec<SocketAddr>>>,
    role: BeaconRole,
) {
    let mut buf = vec![0u8; MAX_DATAGRAM];
    loop {
        let (len, from) = match socket.recv_from(&mut buf).await {
            Ok(received) => received,
            Err(e) => {
                tracing::debug!("Discovery receive error: {}", e);
                tokio::time::sleep(RECV_RETRY_DELAY).await;
                continue;
            }
        };

        let event: DiscoveryEvent = match serde_json::from_slice(&buf[..len]) {
            Ok(event) => event,
            Err(e) => {
                tracing::trace!("Ignoring foreign datagram from {}: {}", from, e);
                continue;
            }
        };

        if role == BeaconRole::Responder && matches!(event, DiscoveryEvent::Query { .. }) {
            let mut pending = queriers.lock();
            if pending.len() < MAX_PENDING_QUERIERS {
                pending.push(from);
            }
        }

        let _ = tx.send(event);
    }
}
