//! In-process discovery segment
//!
//! Every clone of a [`MemoryBeacon`] shares one broadcast segment, so a core
//! and any number of agents in the same process can find each other. Like a
//! multicast socket with loopback enabled, a beacon hears its own traffic.

use async_trait::async_trait;
use futures::StreamExt;
use tokio::sync::broadcast::{self, error::RecvError};

use super::{Announcement, DiscoveryBeacon, DiscoveryEvent, DiscoveryStream};
use crate::error::DiscoveryError;

const SEGMENT_CAPACITY: usize = 256;

/// Broadcast-channel discovery transport
#[derive(Clone)]
pub struct MemoryBeacon {
    tx: broadcast::Sender<DiscoveryEvent>,
}

impl MemoryBeacon {
    /// Create a fresh, empty segment
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(SEGMENT_CAPACITY);
        Self { tx }
    }

    fn publish(&self, event: DiscoveryEvent) {
        // No subscribers means nobody is listening, which is not an error
        let _ = self.tx.send(event);
    }
}

impl Default for MemoryBeacon {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DiscoveryBeacon for MemoryBeacon {
    async fn announce(&self, announcement: &Announcement) -> Result<(), DiscoveryError> {
        self.publish(DiscoveryEvent::Announce(announcement.clone()));
        Ok(())
    }

    async fn query(&self, service: &str) -> Result<(), DiscoveryError> {
        self.publish(DiscoveryEvent::Query {
            service: service.to_string(),
        });
        Ok(())
    }

    fn subscribe(&self) -> DiscoveryStream {
        broadcast_stream(self.tx.subscribe())
    }
}

/// Adapt a broadcast receiver into a discovery stream, skipping over lag
pub(crate) fn broadcast_stream(rx: broadcast::Receiver<DiscoveryEvent>) -> DiscoveryStream {
    futures::stream::unfold(rx, |mut rx| async move {
        loop {
            match rx.recv().await {
                Ok(event) => return Some((event, rx)),
                Err(RecvError::Lagged(missed)) => {
                    tracing::warn!("Discovery subscriber lagged, skipped {} events", missed);
                }
                Err(RecvError::Closed) => return None,
            }
        }
    })
    .boxed()
}
