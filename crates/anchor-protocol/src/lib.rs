//! anchor-protocol: Wire types for the Anchor core
//!
//! This crate defines the JSON frames exchanged over the relay WebSocket
//! and the heartbeat payloads agents post to the core's HTTP API.

pub mod error;
pub mod heartbeat;
pub mod message;

pub use error::ProtocolError;
pub use heartbeat::{BatchAck, DeviceEvent, DeviceStats, DeviceStatus, HeartbeatAck, HeartbeatBatch, IdentityGrant};
pub use message::{InboundFrame, OutboundFrame, RelayedFrame};
