//! anchor-server: The coordinating core for Anchor devices
//!
//! The core keeps the authoritative device registry, relays typed control
//! messages between connected peers, and watches authentication outcomes
//! for brute-force bursts. Agents find it through the discovery beacon and
//! report over HTTP; consoles and devices talk through the relay WebSocket.

pub mod announcer;
pub mod api;
pub mod auth;
pub mod error;
pub mod registry;
pub mod relay;
pub mod sentinel;
pub mod state;

pub use registry::{DeviceRecord, DeviceRegistry};
pub use relay::{ChannelHandle, ConnectionRelay, RelaySession};
pub use sentinel::SentinelEngine;
pub use state::CoreState;
