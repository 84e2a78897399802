//! Global core state

use std::time::{Duration, Instant};

use anchor_common::config::CoreConfig;
use anchor_common::discovery::Announcement;
use anchor_common::{net, SharedClock, SystemClock};

use crate::auth::SharedSecret;
use crate::error::AuthError;
use crate::registry::DeviceRegistry;
use crate::relay::ConnectionRelay;
use crate::sentinel::{SentinelEngine, AUTH_FAIL};

/// Port announced when the bind address carries none
const FALLBACK_PORT: u16 = 3333;

/// Global state for the core server
pub struct CoreState {
    /// Configuration
    pub config: CoreConfig,
    /// Time source for event ordering and sentinel windows
    pub clock: SharedClock,
    /// Device registry
    pub registry: DeviceRegistry,
    /// Relay bindings
    pub relay: ConnectionRelay,
    /// Intrusion sentinel
    pub sentinel: SentinelEngine,
    secret: SharedSecret,
    started_at: Instant,
}

impl CoreState {
    /// Create core state on the system clock
    pub fn new(config: CoreConfig) -> Self {
        Self::with_clock(config, SystemClock::shared())
    }

    /// Create core state on a caller-supplied clock
    pub fn with_clock(config: CoreConfig, clock: SharedClock) -> Self {
        Self {
            registry: DeviceRegistry::new(config.history_capacity, clock.clone()),
            relay: ConnectionRelay::new(),
            sentinel: SentinelEngine::new(config.security_log_capacity, clock.clone()),
            secret: SharedSecret::new(&config.shared_secret),
            started_at: Instant::now(),
            clock,
            config,
        }
    }

    /// Check a caller's key against the shared secret.
    ///
    /// Failures are reported to the sentinel keyed by `origin`.
    pub fn authenticate(
        &self,
        provided: Option<&str>,
        origin: &str,
        details: &str,
    ) -> Result<(), AuthError> {
        if self.secret.verify(provided) {
            return Ok(());
        }
        tracing::warn!("Unauthorized request blocked from {}: {}", origin, details);
        self.sentinel.observe(AUTH_FAIL, origin, details);
        Err(AuthError)
    }

    /// Time since the core started
    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Discovery answer describing this core
    pub fn announcement(&self) -> Announcement {
        Announcement {
            service: self.config.service_name.clone(),
            instance: self.config.instance_name(),
            host: self.config.host_name.clone(),
            address: self
                .config
                .advertised_address
                .unwrap_or_else(net::local_ipv4),
            port: self.config.port().unwrap_or(FALLBACK_PORT),
            ttl_secs: self.config.announce_ttl_secs,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    #[test]
    fn test_authenticate_reports_failures() {
        let state = CoreState::new(CoreConfig::default());
        assert!(state
            .authenticate(Some("anchor_secure_dev_key"), "10.0.0.1", "ok")
            .is_ok());
        assert_eq!(
            state.authenticate(Some("wrong"), "10.0.0.1", "Invalid API Key"),
            Err(AuthError)
        );
        assert_eq!(state.authenticate(None, "10.0.0.1", "Missing"), Err(AuthError));

        let events = state.sentinel.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event_type, AUTH_FAIL);
        assert_eq!(events[0].source, "10.0.0.1");
    }

    #[test]
    fn test_announcement() {
        let config = CoreConfig {
            bind_address: "0.0.0.0:4444".to_string(),
            advertised_address: Some(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2))),
            ..CoreConfig::default()
        };
        let announcement = CoreState::new(config).announcement();
        assert_eq!(announcement.base_url(), "http://10.0.0.2:4444");
        assert_eq!(announcement.service, "_anchor._tcp.local");
        assert_eq!(announcement.host, "anchor-core.local");
        assert_eq!(announcement.ttl_secs, 300);
    }
}
