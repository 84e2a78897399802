//! anchor-agent: Device-side presence reporting
//!
//! The agent finds the core through discovery, sends a heartbeat on every
//! tick, and falls back to a bounded local buffer while the core is
//! unreachable. Buffered heartbeats are replayed as one batch once the core
//! answers again.

pub mod link;
pub mod metrics;
pub mod runner;
pub mod state;

pub use link::{CoreLink, HttpLink, LinkError};
pub use metrics::{MetricsSource, SystemMetrics};
pub use runner::run_agent;
pub use state::{AgentMode, AgentState, AgentStateMachine};
