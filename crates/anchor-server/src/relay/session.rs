//! Per-connection frame handling

use std::sync::Arc;

use anchor_common::DeviceId;
use anchor_protocol::{DeviceEvent, DeviceStatus, InboundFrame, OutboundFrame, RelayedFrame};

use super::pool::{ChannelHandle, Delivery};
use crate::registry::UNKNOWN;
use crate::state::CoreState;

/// Log target for free-form `log:event` lines
pub const EVENT_LOG_TARGET: &str = "anchor::events";

/// Display name given to ids the registry has never seen
const NEW_DEVICE_NAME: &str = "New Device";

/// Passthrough types too chatty for info-level logging
const QUIET_PASSTHROUGH: &[&str] = &[
    "stream:chunk",
    "preview:request",
    "preview:data",
    "action:file",
    "gps:data",
];

/// What happened to one inbound frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    /// The connection is now bound to a device id
    Registered,
    /// A routed frame was handed to the relay
    Forwarded(Delivery),
    /// Written to the operational log
    Logged,
    /// Routed frame from a connection that never registered
    Unbound,
    /// Unparsable, unknown, or missing a target
    Dropped,
}

/// State of one relay connection
pub struct RelaySession {
    state: Arc<CoreState>,
    channel: ChannelHandle,
    origin: String,
    device_id: Option<DeviceId>,
}

impl RelaySession {
    /// Start a session for an authenticated connection
    pub fn new(state: Arc<CoreState>, channel: ChannelHandle, origin: impl Into<String>) -> Self {
        Self {
            state,
            channel,
            origin: origin.into(),
            device_id: None,
        }
    }

    /// Device id this connection registered as
    pub fn device_id(&self) -> Option<&DeviceId> {
        self.device_id.as_ref()
    }

    /// Handle one text frame.
    ///
    /// Malformed and unknown frames are logged and dropped; the connection
    /// stays open.
    pub fn handle_text(&mut self, text: &str) -> FrameOutcome {
        match InboundFrame::parse(text) {
            Ok(frame) => self.handle_frame(frame),
            Err(e) => {
                tracing::debug!("Dropping frame from {}: {}", self.origin, e);
                FrameOutcome::Dropped
            }
        }
    }

    /// Handle one decoded frame
    pub fn handle_frame(&mut self, frame: InboundFrame) -> FrameOutcome {
        match frame {
            InboundFrame::Register { id } => self.register(id),
            InboundFrame::LogEvent { message } => {
                tracing::info!(target: EVENT_LOG_TARGET, "[{}] {}", self.sender_name(), message);
                FrameOutcome::Logged
            }
            routed => self.route(routed),
        }
    }

    /// Release this connection's binding, if it still owns one
    pub fn close(self) {
        let Some(id) = self.device_id else {
            return;
        };
        let released = self.state.relay.unregister(&id, self.channel.id());
        let name = self
            .state
            .registry
            .display_name(&id)
            .unwrap_or_else(|| UNKNOWN.to_string());
        if released {
            tracing::info!("Device disconnected: {} ({})", name, id.short());
        } else {
            tracing::debug!("Closed displaced connection for {} ({})", name, id.short());
        }
    }

    fn register(&mut self, id: String) -> FrameOutcome {
        if id.is_empty() {
            tracing::debug!("Ignoring register without id from {}", self.origin);
            return FrameOutcome::Dropped;
        }
        let id = DeviceId::new(id);

        if let Some(previous) = self.device_id.take() {
            if previous != id {
                self.state.relay.unregister(&previous, self.channel.id());
            }
        }

        if let Some(displaced) = self.state.relay.register(id.clone(), self.channel.clone()) {
            if displaced.id() != self.channel.id() {
                tracing::warn!(
                    "Device {} registered again from {}; previous connection no longer receives frames",
                    id.short(),
                    self.origin
                );
            }
        }

        let known = self.state.registry.contains(&id);
        let mut event = DeviceEvent::new(id.as_str()).at(self.state.clock.now());
        event.status = Some(DeviceStatus::Online);
        event.ip = Some(self.origin.clone());
        if !known {
            event.name = Some(NEW_DEVICE_NAME.to_string());
        }
        if let Err(e) = self.state.registry.upsert(event) {
            tracing::warn!("Failed to record relay registration: {}", e);
        }

        let name = self
            .state
            .registry
            .display_name(&id)
            .unwrap_or_else(|| NEW_DEVICE_NAME.to_string());
        tracing::info!("Device registered: {} ({})", name, id.short());

        self.device_id = Some(id);
        FrameOutcome::Registered
    }

    fn route(&self, frame: InboundFrame) -> FrameOutcome {
        let Some(from) = self.device_id.as_ref() else {
            tracing::debug!(
                "Dropping {} from unregistered connection {}",
                frame.kind(),
                self.origin
            );
            return FrameOutcome::Unbound;
        };
        let Some(target) = frame.target_id().map(DeviceId::from) else {
            tracing::debug!("Dropping {} without targetId from {}", frame.kind(), from.short());
            return FrameOutcome::Dropped;
        };

        let relayed: RelayedFrame = match frame {
            InboundFrame::Ping { .. } => {
                let target_name = self
                    .state
                    .registry
                    .display_name(&target)
                    .unwrap_or_else(|| target.to_string());
                tracing::info!("Routing ping to {}", target_name);
                OutboundFrame::Ping {
                    from: from.to_string(),
                }
                .into()
            }
            InboundFrame::LatencyStart { timestamp, .. } => OutboundFrame::LatencyCheck {
                from: from.to_string(),
                timestamp: timestamp.unwrap_or_else(|| self.state.clock.now_millis()),
            }
            .into(),
            InboundFrame::LatencyPong {
                original_timestamp, ..
            } => OutboundFrame::LatencyResult {
                from: from.to_string(),
                original_timestamp,
            }
            .into(),
            InboundFrame::Passthrough { kind, payload, .. } => {
                if QUIET_PASSTHROUGH.contains(&kind.as_str()) {
                    tracing::trace!("{} from {}", kind, from.short());
                } else {
                    tracing::info!("{} from {}", kind, self.sender_name());
                }
                RelayedFrame::passthrough(payload, from.as_str())
            }
            InboundFrame::Register { .. } | InboundFrame::LogEvent { .. } => {
                return FrameOutcome::Dropped;
            }
        };

        let delivery = self.state.relay.deliver(&target, &relayed);
        if delivery == Delivery::Absent {
            tracing::debug!("Target {} is not connected; frame dropped", target.short());
        }
        FrameOutcome::Forwarded(delivery)
    }

    fn sender_name(&self) -> String {
        self.device_id
            .as_ref()
            .and_then(|id| self.state.registry.display_name(id))
            .unwrap_or_else(|| UNKNOWN.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anchor_common::config::CoreConfig;
    use anchor_common::ManualClock;
    use serde_json::{json, Value};
    use tokio::sync::mpsc;

    fn state() -> Arc<CoreState> {
        Arc::new(CoreState::with_clock(
            CoreConfig::default(),
            Arc::new(ManualClock::from_millis(1_700_000_000_000)),
        ))
    }

    fn session(state: &Arc<CoreState>) -> (RelaySession, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(16);
        (
            RelaySession::new(Arc::clone(state), ChannelHandle::new(tx), "10.0.0.9"),
            rx,
        )
    }

    fn recv(rx: &mut mpsc::Receiver<String>) -> Value {
        serde_json::from_str(&rx.try_recv().unwrap()).unwrap()
    }

    #[test]
    fn test_register_binds_and_records_device() {
        let state = state();
        let (mut a, _rx) = session(&state);

        assert_eq!(
            a.handle_text(r#"{"type":"register","id":"A"}"#),
            FrameOutcome::Registered
        );
        assert!(state.relay.is_bound(&DeviceId::new("A")));

        let record = state.registry.get(&DeviceId::new("A")).unwrap();
        assert_eq!(record.name, "New Device");
        assert_eq!(record.ip, "10.0.0.9");
        assert_eq!(record.status, DeviceStatus::Online);
    }

    #[test]
    fn test_register_keeps_known_name() {
        let state = state();
        let mut event = DeviceEvent::new("A");
        event.name = Some("Phone - bob".to_string());
        let earlier = chrono::DateTime::from_timestamp_millis(1_000).unwrap();
        state.registry.upsert(event.at(earlier)).unwrap();

        let (mut a, _rx) = session(&state);
        a.handle_text(r#"{"type":"register","id":"A"}"#);
        assert_eq!(state.registry.display_name(&DeviceId::new("A")).unwrap(), "Phone - bob");
    }

    #[test]
    fn test_ping_is_relayed_with_sender() {
        let state = state();
        let (mut a, mut rx_a) = session(&state);
        let (mut b, mut rx_b) = session(&state);
        let (mut c, mut rx_c) = session(&state);
        a.handle_text(r#"{"type":"register","id":"A"}"#);
        b.handle_text(r#"{"type":"register","id":"B"}"#);
        c.handle_text(r#"{"type":"register","id":"C"}"#);

        assert_eq!(
            a.handle_text(r#"{"type":"ping","targetId":"B"}"#),
            FrameOutcome::Forwarded(Delivery::Delivered)
        );
        assert_eq!(recv(&mut rx_b), json!({"type": "ping", "from": "A"}));
        assert!(rx_b.try_recv().is_err());
        // Neither the sender nor a bystander hears anything
        assert!(rx_a.try_recv().is_err());
        assert!(rx_c.try_recv().is_err());
    }

    #[test]
    fn test_latency_round_trip() {
        let state = state();
        let (mut a, mut rx_a) = session(&state);
        let (mut b, mut rx_b) = session(&state);
        a.handle_text(r#"{"type":"register","id":"A"}"#);
        b.handle_text(r#"{"type":"register","id":"B"}"#);

        a.handle_text(r#"{"type":"latency:start","targetId":"B"}"#);
        let check = recv(&mut rx_b);
        assert_eq!(check["type"], "latency:check");
        assert_eq!(check["from"], "A");
        assert_eq!(check["timestamp"], json!(1_700_000_000_000u64));

        b.handle_text(
            r#"{"type":"latency:pong","targetId":"A","originalTimestamp":1700000000000}"#,
        );
        assert_eq!(
            recv(&mut rx_a),
            json!({"type": "latency:result", "from": "B", "originalTimestamp": 1_700_000_000_000u64})
        );
    }

    #[test]
    fn test_latency_start_keeps_caller_timestamp() {
        let state = state();
        let (mut a, _rx_a) = session(&state);
        let (mut b, mut rx_b) = session(&state);
        a.handle_text(r#"{"type":"register","id":"A"}"#);
        b.handle_text(r#"{"type":"register","id":"B"}"#);

        a.handle_text(r#"{"type":"latency:start","targetId":"B","timestamp":42}"#);
        assert_eq!(recv(&mut rx_b)["timestamp"], json!(42));
    }

    #[test]
    fn test_passthrough_is_forwarded_verbatim() {
        let state = state();
        let (mut a, _rx_a) = session(&state);
        let (mut b, mut rx_b) = session(&state);
        a.handle_text(r#"{"type":"register","id":"A"}"#);
        b.handle_text(r#"{"type":"register","id":"B"}"#);

        a.handle_text(r#"{"type":"action:vibrate","targetId":"B","pattern":[100,50],"from":"Z"}"#);
        assert_eq!(
            recv(&mut rx_b),
            json!({"type": "action:vibrate", "targetId": "B", "pattern": [100, 50], "from": "A"})
        );
    }

    #[test]
    fn test_unknown_target_is_dropped_silently() {
        let state = state();
        let (mut a, mut rx_a) = session(&state);
        a.handle_text(r#"{"type":"register","id":"A"}"#);

        assert_eq!(
            a.handle_text(r#"{"type":"ping","targetId":"C"}"#),
            FrameOutcome::Forwarded(Delivery::Absent)
        );
        assert!(rx_a.try_recv().is_err());
    }

    #[test]
    fn test_routed_frame_before_register() {
        let state = state();
        let (mut a, _rx_a) = session(&state);
        let (mut b, mut rx_b) = session(&state);
        b.handle_text(r#"{"type":"register","id":"B"}"#);

        assert_eq!(
            a.handle_text(r#"{"type":"ping","targetId":"B"}"#),
            FrameOutcome::Unbound
        );
        assert!(rx_b.try_recv().is_err());
    }

    #[test]
    fn test_bad_frames_are_dropped() {
        let state = state();
        let (mut a, _rx) = session(&state);
        a.handle_text(r#"{"type":"register","id":"A"}"#);

        assert_eq!(a.handle_text("{not json"), FrameOutcome::Dropped);
        assert_eq!(a.handle_text(r#"{"type":"teleport"}"#), FrameOutcome::Dropped);
        assert_eq!(a.handle_text(r#"{"type":"stream:start"}"#), FrameOutcome::Dropped);
        assert_eq!(
            a.handle_text(r#"{"type":"log:event","message":"hello"}"#),
            FrameOutcome::Logged
        );
    }

    #[test]
    fn test_stale_close_keeps_newer_binding() {
        let state = state();
        let (mut first, _rx1) = session(&state);
        let (mut second, mut rx2) = session(&state);
        let (mut peer, _rx3) = session(&state);
        first.handle_text(r#"{"type":"register","id":"X"}"#);
        second.handle_text(r#"{"type":"register","id":"X"}"#);
        peer.handle_text(r#"{"type":"register","id":"P"}"#);

        first.close();
        assert!(state.relay.is_bound(&DeviceId::new("X")));

        peer.handle_text(r#"{"type":"ping","targetId":"X"}"#);
        assert_eq!(recv(&mut rx2)["from"], "P");

        second.close();
        assert!(!state.relay.is_bound(&DeviceId::new("X")));
    }

    #[test]
    fn test_reregister_under_new_id_releases_old() {
        let state = state();
        let (mut a, _rx) = session(&state);
        a.handle_text(r#"{"type":"register","id":"A"}"#);
        a.handle_text(r#"{"type":"register","id":"A2"}"#);

        assert!(!state.relay.is_bound(&DeviceId::new("A")));
        assert!(state.relay.is_bound(&DeviceId::new("A2")));
        assert_eq!(a.device_id().unwrap().as_str(), "A2");
    }
}
