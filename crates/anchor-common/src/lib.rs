//! anchor-common: Shared building blocks for the Anchor core and agents
//!
//! This crate provides configuration structures, the error taxonomy,
//! clock and ticker abstractions, and the discovery beacon used by both
//! the core server and device agents.

pub mod config;
pub mod discovery;
pub mod error;
pub mod net;
pub mod ticker;
pub mod time;
pub mod types;

pub use error::{ConfigError, DiscoveryError};
pub use ticker::Ticker;
pub use time::{Clock, ManualClock, SharedClock, SystemClock};
pub use types::DeviceId;
