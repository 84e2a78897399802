//! WebSocket message relay
//!
//! [`ConnectionRelay`] maps device ids to live outbound channels;
//! [`RelaySession`] interprets one connection's inbound frames.

mod pool;
mod session;

pub use pool::{ChannelHandle, ConnectionRelay, Delivery, RELAY_CHANNEL_CAPACITY};
pub use session::{FrameOutcome, RelaySession};
