//! Device id to channel bindings

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use anchor_common::DeviceId;
use anchor_protocol::RelayedFrame;

/// Frames queued per connection before new ones are dropped
pub const RELAY_CHANNEL_CAPACITY: usize = 256;

static NEXT_CHANNEL_ID: AtomicU64 = AtomicU64::new(1);

/// Sending half of one connection's outbound queue
#[derive(Debug, Clone)]
pub struct ChannelHandle {
    id: u64,
    tx: mpsc::Sender<String>,
}

impl ChannelHandle {
    /// Wrap a connection's outbound sender
    pub fn new(tx: mpsc::Sender<String>) -> Self {
        Self {
            id: NEXT_CHANNEL_ID.fetch_add(1, Ordering::Relaxed),
            tx,
        }
    }

    /// Process-unique channel id
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Whether the connection behind this handle is gone
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Result of a delivery attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Queued on the target's channel
    Delivered,
    /// No live binding for the target
    Absent,
    /// Target's queue was full
    Dropped,
}

/// Registered connections by device id
pub struct ConnectionRelay {
    bindings: DashMap<DeviceId, ChannelHandle>,
}

impl ConnectionRelay {
    /// Create an empty relay
    pub fn new() -> Self {
        Self {
            bindings: DashMap::new(),
        }
    }

    /// Bind `id` to `channel`, returning the live binding it replaced.
    ///
    /// Duplicate identities are not rejected; the latest registration wins
    /// and the displaced channel stays open.
    pub fn register(&self, id: DeviceId, channel: ChannelHandle) -> Option<ChannelHandle> {
        self.bindings
            .insert(id, channel)
            .filter(|previous| !previous.is_closed())
    }

    /// Remove `id`'s binding only if it still points at `channel_id`
    pub fn unregister(&self, id: &DeviceId, channel_id: u64) -> bool {
        self.bindings
            .remove_if(id, |_, handle| handle.id == channel_id)
            .is_some()
    }

    /// Queue a frame for `target`.
    ///
    /// Lookup and send happen under the binding's guard, so a channel that
    /// closes concurrently is reported as absent rather than faulting.
    pub fn deliver(&self, target: &DeviceId, frame: &RelayedFrame) -> Delivery {
        let text = match frame.to_json() {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!("Failed to encode frame for {}: {}", target.short(), e);
                return Delivery::Dropped;
            }
        };

        let Some(handle) = self.bindings.get(target) else {
            return Delivery::Absent;
        };
        match handle.tx.try_send(text) {
            Ok(()) => Delivery::Delivered,
            Err(TrySendError::Closed(_)) => Delivery::Absent,
            Err(TrySendError::Full(_)) => {
                tracing::warn!("Outbound queue full for {}, dropping frame", target.short());
                Delivery::Dropped
            }
        }
    }

    /// Whether `id` has a binding
    pub fn is_bound(&self, id: &DeviceId) -> bool {
        self.bindings.contains_key(id)
    }

    /// Number of bound device ids
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    /// Check if nothing is bound
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

impl Default for ConnectionRelay {
    fn default() -> Self {
        Self::new()
    }
}
