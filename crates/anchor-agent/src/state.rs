//! Agent state machine
//!
//! ```text
//! BOOT ──tick──▶ SCANNING ──answer──▶ CONNECTED ◀──────────────┐
//!                    │                   │ N failures          │ flush ok
//!                    │ answer, buffer    ▼                     │
//!                    └──────────────▶ SYNCING ◀──probe ok── OFFLINE_BUFFERING
//!                                        │ flush failed          ▲
//!                                        └───────────────────────┘
//! ```
//!
//! The machine is driven by two inputs: [`AgentStateMachine::tick`] on a
//! fixed period and [`AgentStateMachine::on_discovery`] for every event
//! heard on the discovery segment. Every network call goes through a
//! [`CoreLink`] whose failures are recoverable.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use anchor_common::config::AgentConfig;
use anchor_common::discovery::{DiscoveryBeacon, DiscoveryEvent};
use anchor_common::{DeviceId, SharedClock};
use anchor_protocol::{DeviceEvent, DeviceStatus, HeartbeatBatch};

use crate::link::CoreLink;
use crate::metrics::MetricsSource;

const DEFAULT_ACTIVITY: &str = "Idle";

/// Connectivity mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentMode {
    Boot,
    Scanning,
    Connected,
    OfflineBuffering,
    Syncing,
}

impl fmt::Display for AgentMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AgentMode::Boot => "BOOT",
            AgentMode::Scanning => "SCANNING",
            AgentMode::Connected => "CONNECTED",
            AgentMode::OfflineBuffering => "OFFLINE_BUFFERING",
            AgentMode::Syncing => "SYNCING",
        };
        f.write_str(name)
    }
}

/// Observable state of the agent
#[derive(Debug, Clone)]
pub struct AgentState {
    pub mode: AgentMode,
    /// Base URL of the resolved core
    pub server: Option<String>,
    /// Heartbeats waiting for the core, oldest first
    pub buffer: VecDeque<DeviceEvent>,
    pub consecutive_failures: u32,
    pub last_success: Option<DateTime<Utc>>,
    /// Ticks spent in the current offline stretch
    pub offline_ticks: u32,
}

impl Default for AgentState {
    fn default() -> Self {
        Self {
            mode: AgentMode::Boot,
            server: None,
            buffer: VecDeque::new(),
            consecutive_failures: 0,
            last_success: None,
            offline_ticks: 0,
        }
    }
}

/// Tunables taken from [`AgentConfig`]
#[derive(Debug, Clone)]
struct Limits {
    buffer_capacity: usize,
    failure_threshold: u32,
    probe_every: u32,
}

/// The device agent's connectivity state machine
pub struct AgentStateMachine<L> {
    link: L,
    beacon: Arc<dyn DiscoveryBeacon>,
    metrics: Box<dyn MetricsSource>,
    clock: SharedClock,
    identity: Option<DeviceId>,
    name: String,
    activity: String,
    service: String,
    fixed_server: Option<String>,
    limits: Limits,
    state: AgentState,
}

impl<L: CoreLink> AgentStateMachine<L> {
    /// Create a machine in `BOOT`
    pub fn new(
        config: &AgentConfig,
        link: L,
        beacon: Arc<dyn DiscoveryBeacon>,
        metrics: Box<dyn MetricsSource>,
        clock: SharedClock,
    ) -> Self {
        Self {
            link,
            beacon,
            metrics,
            clock,
            identity: config.device_id.clone().map(DeviceId::new),
            name: config.display_name(),
            activity: config
                .activity
                .clone()
                .unwrap_or_else(|| DEFAULT_ACTIVITY.to_string()),
            service: config.service_name.clone(),
            fixed_server: config.server_url.clone(),
            limits: Limits {
                buffer_capacity: config.buffer_capacity.max(1),
                failure_threshold: config.failure_threshold.max(1),
                probe_every: config.probe_every.max(1),
            },
            state: AgentState::default(),
        }
    }

    /// Current state
    pub fn state(&self) -> &AgentState {
        &self.state
    }

    /// Current mode
    pub fn mode(&self) -> AgentMode {
        self.state.mode
    }

    /// Identity issued by or configured for the core
    pub fn identity(&self) -> Option<&DeviceId> {
        self.identity.as_ref()
    }

    /// Discovery transport this machine queries
    pub fn beacon(&self) -> &Arc<dyn DiscoveryBeacon> {
        &self.beacon
    }

    /// Set the activity string reported from now on
    pub fn set_activity(&mut self, activity: impl Into<String>) {
        self.activity = activity.into();
    }

    /// Advance one period
    pub async fn tick(&mut self) -> AgentMode {
        match self.state.mode {
            AgentMode::Boot => {
                self.transition(AgentMode::Scanning);
                self.scan().await;
            }
            AgentMode::Scanning => self.scan().await,
            AgentMode::Connected => self.heartbeat().await,
            AgentMode::OfflineBuffering => self.buffer_tick().await,
            AgentMode::Syncing => self.flush().await,
        }
        self.state.mode
    }

    /// React to something heard on the discovery segment
    pub async fn on_discovery(&mut self, event: &DiscoveryEvent) {
        let Some(announcement) = event.resolves(&self.service) else {
            return;
        };
        let url = announcement.base_url();

        match self.state.mode {
            AgentMode::Scanning => {
                tracing::info!("Discovered Anchor core at {}", url);
                self.resolve(url).await;
            }
            AgentMode::OfflineBuffering if self.state.server.as_deref() != Some(url.as_str()) => {
                tracing::info!("Anchor core moved to {}", url);
                self.state.server = Some(url);
            }
            _ => {}
        }
    }

    async fn scan(&mut self) {
        if let Some(url) = self.fixed_server.clone() {
            self.resolve(url).await;
            return;
        }
        self.query().await;
    }

    async fn query(&self) {
        if let Err(e) = self.beacon.query(&self.service).await {
            tracing::debug!("Discovery query failed: {}", e);
        }
    }

    /// Adopt a core address and leave `SCANNING`
    async fn resolve(&mut self, url: String) {
        if self.identity.is_none() {
            match self.link.request_identity(&url).await {
                Ok(id) => {
                    tracing::info!("Core issued identity {}", id);
                    self.identity = Some(id);
                }
                Err(e) => {
                    tracing::warn!("Identity request to {} failed: {}", url, e);
                    return;
                }
            }
        }

        self.state.server = Some(url);
        self.state.consecutive_failures = 0;
        if self.state.buffer.is_empty() {
            self.transition(AgentMode::Connected);
        } else {
            self.transition(AgentMode::Syncing);
        }
    }

    async fn heartbeat(&mut self) {
        let Some(server) = self.state.server.clone() else {
            self.transition(AgentMode::Scanning);
            return;
        };

        let event = self.current_heartbeat();
        match self.link.send_heartbeat(&server, &event).await {
            Ok(()) => {
                self.record_success();
                if !self.state.buffer.is_empty() {
                    self.transition(AgentMode::Syncing);
                }
            }
            Err(e) => {
                self.state.consecutive_failures += 1;
                tracing::warn!(
                    "Heartbeat failed ({}/{}): {}",
                    self.state.consecutive_failures,
                    self.limits.failure_threshold,
                    e
                );
                self.push_buffer(event);
                if self.state.consecutive_failures >= self.limits.failure_threshold {
                    self.go_offline();
                }
            }
        }
    }

    async fn buffer_tick(&mut self) {
        self.state.offline_ticks += 1;
        let event = self.current_heartbeat();
        self.push_buffer(event);

        if self.state.offline_ticks % self.limits.probe_every != 0 {
            return;
        }

        self.query().await;
        let Some(server) = self.state.server.clone() else {
            return;
        };

        // Probes are never buffered; the tick's heartbeat already is
        let probe = self.current_heartbeat();
        match self.link.send_heartbeat(&server, &probe).await {
            Ok(()) => {
                tracing::info!("Core reachable again at {}", server);
                self.record_success();
                if self.state.buffer.is_empty() {
                    self.transition(AgentMode::Connected);
                } else {
                    self.transition(AgentMode::Syncing);
                }
            }
            Err(e) => tracing::debug!("Probe failed: {}", e),
        }
    }

    async fn flush(&mut self) {
        let Some(server) = self.state.server.clone() else {
            self.go_offline();
            return;
        };
        if self.state.buffer.is_empty() {
            self.transition(AgentMode::Connected);
            return;
        }

        let batch = HeartbeatBatch {
            id: self.identity.as_ref().map(|id| id.to_string()),
            name: Some(self.name.clone()),
            events: self.state.buffer.iter().cloned().collect(),
        };
        let count = batch.events.len();
        tracing::info!("Flushing {} buffered events...", count);

        match self.link.send_batch(&server, &batch).await {
            Ok(()) => {
                self.state.buffer.clear();
                self.record_success();
                tracing::info!("Buffer flushed");
                self.transition(AgentMode::Connected);
            }
            Err(e) => {
                tracing::warn!("Flush failed, keeping {} buffered events: {}", count, e);
                self.go_offline();
            }
        }
    }

    fn current_heartbeat(&mut self) -> DeviceEvent {
        let mut stats = self.metrics.sample();
        stats.buffer_size = Some(self.state.buffer.len());

        DeviceEvent {
            id: self.identity.as_ref().map(|id| id.to_string()),
            name: Some(self.name.clone()),
            status: Some(DeviceStatus::Online),
            activity: Some(self.activity.clone()),
            stats: Some(stats),
            timestamp: Some(self.clock.now()),
            ..DeviceEvent::default()
        }
    }

    fn push_buffer(&mut self, event: DeviceEvent) {
        while self.state.buffer.len() >= self.limits.buffer_capacity {
            self.state.buffer.pop_front();
        }
        self.state.buffer.push_back(event);
    }

    fn record_success(&mut self) {
        self.state.consecutive_failures = 0;
        self.state.last_success = Some(self.clock.now());
    }

    fn go_offline(&mut self) {
        self.state.offline_ticks = 0;
        self.transition(AgentMode::OfflineBuffering);
    }

    fn transition(&mut self, to: AgentMode) {
        let from = self.state.mode;
        if from == to {
            return;
        }
        tracing::info!("Agent state {} -> {}", from, to);
        self.state.mode = to;
    }
}
