//! Relay frame taxonomy
//!
//! Every WebSocket text frame is a JSON object carrying a `type` tag. The
//! relay understands a small closed set of control frames; everything in the
//! passthrough families (`stream:*`, `preview:*`, `action:*`, `gps:data`) is
//! forwarded verbatim, so new action types need no relay changes.
//!
//! # Frame Flow
//!
//! 1. A peer connects and sends `register` with its device id
//! 2. `ping` is relayed to the target as `{type:"ping", from}`
//! 3. `latency:start` reaches the target as `latency:check` carrying a timestamp
//! 4. The target answers `latency:pong`, delivered to the initiator as `latency:result`
//! 5. `log:event` stays on the core and lands in the operational log

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ProtocolError;

/// Type prefixes whose frames are forwarded without interpretation
pub const PASSTHROUGH_PREFIXES: &[&str] = &["stream:", "preview:", "action:"];

/// Exact frame types forwarded without interpretation
pub const PASSTHROUGH_TYPES: &[&str] = &["gps:data"];

/// Types decoded into typed [`InboundFrame`] variants
const TYPED_FRAMES: &[&str] = &["register", "ping", "latency:start", "latency:pong", "log:event"];

/// Whether a frame type belongs to the opaque passthrough families
pub fn is_passthrough(kind: &str) -> bool {
    PASSTHROUGH_TYPES.contains(&kind)
        || PASSTHROUGH_PREFIXES
            .iter()
            .any(|prefix| kind.starts_with(prefix))
}

/// Frames a peer sends to the relay
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type")]
pub enum InboundFrame {
    /// Bind the sender's channel to a device id
    #[serde(rename = "register")]
    Register {
        /// Device id claimed by the sender
        id: String,
    },

    /// Ping another peer
    #[serde(rename = "ping", rename_all = "camelCase")]
    Ping {
        /// Device id of the peer to ping
        target_id: String,
    },

    /// Begin a round-trip latency measurement
    #[serde(rename = "latency:start", rename_all = "camelCase")]
    LatencyStart {
        /// Peer to measure
        target_id: String,
        /// Caller-supplied start time in Unix millis; the relay stamps one if absent
        #[serde(default)]
        timestamp: Option<u64>,
    },

    /// Answer to a `latency:check`
    #[serde(rename = "latency:pong", rename_all = "camelCase")]
    LatencyPong {
        /// The initiator of the measurement
        target_id: String,
        /// Timestamp echoed from the `latency:check`
        #[serde(default)]
        original_timestamp: Option<u64>,
    },

    /// Free-form line for the core's operational log
    #[serde(rename = "log:event")]
    LogEvent {
        #[serde(default)]
        message: String,
    },

    /// Opaque frame forwarded to `target_id` untouched
    #[serde(skip)]
    Passthrough {
        /// The frame's `type` tag
        kind: String,
        /// Destination peer, if the frame names one
        target_id: Option<String>,
        /// The complete original frame
        payload: Map<String, Value>,
    },
}

impl InboundFrame {
    /// Decode a text frame.
    ///
    /// Fails with [`ProtocolError::UnknownFrameType`] for tags outside the
    /// taxonomy; the caller drops such frames and keeps the connection.
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        let value: Value = serde_json::from_str(text)?;
        let Value::Object(payload) = value else {
            return Err(ProtocolError::NotAnObject);
        };

        let kind = payload
            .get("type")
            .and_then(Value::as_str)
            .ok_or(ProtocolError::MissingField("type"))?
            .to_owned();

        if is_passthrough(&kind) {
            let target_id = payload
                .get("targetId")
                .and_then(Value::as_str)
                .map(str::to_owned);
            return Ok(Self::Passthrough {
                kind,
                target_id,
                payload,
            });
        }

        if !TYPED_FRAMES.contains(&kind.as_str()) {
            return Err(ProtocolError::UnknownFrameType(kind));
        }

        Ok(serde_json::from_value(Value::Object(payload))?)
    }

    /// The frame's `type` tag
    pub fn kind(&self) -> &str {
        match self {
            InboundFrame::Register { .. } => "register",
            InboundFrame::Ping { .. } => "ping",
            InboundFrame::LatencyStart { .. } => "latency:start",
            InboundFrame::LatencyPong { .. } => "latency:pong",
            InboundFrame::LogEvent { .. } => "log:event",
            InboundFrame::Passthrough { kind, .. } => kind,
        }
    }

    /// Destination peer for routed frames
    pub fn target_id(&self) -> Option<&str> {
        match self {
            InboundFrame::Ping { target_id }
            | InboundFrame::LatencyStart { target_id, .. }
            | InboundFrame::LatencyPong { target_id, .. } => Some(target_id),
            InboundFrame::Passthrough { target_id, .. } => target_id.as_deref(),
            InboundFrame::Register { .. } | InboundFrame::LogEvent { .. } => None,
        }
    }
}

/// Control frames the relay synthesizes for a target
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum OutboundFrame {
    #[serde(rename = "ping")]
    Ping { from: String },

    #[serde(rename = "latency:check")]
    LatencyCheck { from: String, timestamp: u64 },

    #[serde(rename = "latency:result", rename_all = "camelCase")]
    LatencyResult {
        from: String,
        original_timestamp: Option<u64>,
    },
}

/// A frame on its way to a target channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RelayedFrame {
    /// Synthesized control frame
    Typed(OutboundFrame),
    /// Original passthrough payload stamped with `from`
    Passthrough(Map<String, Value>),
}

impl RelayedFrame {
    /// Stamp `from` onto an opaque payload, replacing any sender-supplied value
    pub fn passthrough(mut payload: Map<String, Value>, from: &str) -> Self {
        payload.insert("from".to_string(), Value::String(from.to_string()));
        RelayedFrame::Passthrough(payload)
    }

    /// Encode as a text frame
    pub fn to_json(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }
}

impl From<OutboundFrame> for RelayedFrame {
    fn from(frame: OutboundFrame) -> Self {
        RelayedFrame::Typed(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_register() {
        let frame = InboundFrame::parse(r#"{"type":"register","id":"dev-1"}"#).unwrap();
        assert_eq!(
            frame,
            InboundFrame::Register {
                id: "dev-1".to_string()
            }
        );
        assert_eq!(frame.target_id(), None);
    }

    #[test]
    fn test_parse_ping_uses_camel_case_target() {
        let frame = InboundFrame::parse(r#"{"type":"ping","targetId":"B"}"#).unwrap();
        assert_eq!(frame.kind(), "ping");
        assert_eq!(frame.target_id(), Some("B"));
    }

    #[test]
    fn test_latency_start_timestamp_is_optional() {
        let frame = InboundFrame::parse(r#"{"type":"latency:start","targetId":"B"}"#).unwrap();
        assert_eq!(
            frame,
            InboundFrame::LatencyStart {
                target_id: "B".to_string(),
                timestamp: None
            }
        );

        let frame =
            InboundFrame::parse(r#"{"type":"latency:start","targetId":"B","timestamp":42}"#)
                .unwrap();
        assert!(matches!(
            frame,
            InboundFrame::LatencyStart {
                timestamp: Some(42),
                ..
            }
        ));
    }

    #[test]
    fn test_passthrough_families() {
        assert!(is_passthrough("stream:start"));
        assert!(is_passthrough("preview:data"));
        assert!(is_passthrough("action:vibrate"));
        assert!(is_passthrough("gps:data"));
        assert!(!is_passthrough("gps:other"));
        assert!(!is_passthrough("ping"));
    }

    #[test]
    fn test_passthrough_keeps_whole_payload() {
        let text = r#"{"type":"action:alert","targetId":"B","text":"hi","extra":{"n":1}}"#;
        let frame = InboundFrame::parse(text).unwrap();
        match frame {
            InboundFrame::Passthrough {
                kind,
                target_id,
                payload,
            } => {
                assert_eq!(kind, "action:alert");
                assert_eq!(target_id.as_deref(), Some("B"));
                assert_eq!(payload["text"], json!("hi"));
                assert_eq!(payload["extra"], json!({"n": 1}));
            }
            other => panic!("expected passthrough, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_type_is_rejected() {
        let err = InboundFrame::parse(r#"{"type":"teleport","targetId":"B"}"#).unwrap_err();
        assert!(matches!(err, ProtocolError::UnknownFrameType(t) if t == "teleport"));
    }

    #[test]
    fn test_unparsable_frames() {
        assert!(matches!(
            InboundFrame::parse("not json").unwrap_err(),
            ProtocolError::Malformed(_)
        ));
        assert!(matches!(
            InboundFrame::parse("[1,2]").unwrap_err(),
            ProtocolError::NotAnObject
        ));
        assert!(matches!(
            InboundFrame::parse(r#"{"targetId":"B"}"#).unwrap_err(),
            ProtocolError::MissingField("type")
        ));
        assert!(matches!(
            InboundFrame::parse(r#"{"type":"ping"}"#).unwrap_err(),
            ProtocolError::Malformed(_)
        ));
    }

    #[test]
    fn test_outbound_wire_shape() {
        let ping = RelayedFrame::from(OutboundFrame::Ping {
            from: "A".to_string(),
        });
        let value: Value = serde_json::from_str(&ping.to_json().unwrap()).unwrap();
        assert_eq!(value, json!({"type": "ping", "from": "A"}));

        let result = RelayedFrame::from(OutboundFrame::LatencyResult {
            from: "B".to_string(),
            original_timestamp: Some(7),
        });
        let value: Value = serde_json::from_str(&result.to_json().unwrap()).unwrap();
        assert_eq!(
            value,
            json!({"type": "latency:result", "from": "B", "originalTimestamp": 7})
        );
    }

    #[test]
    fn test_passthrough_overwrites_from() {
        let mut payload = Map::new();
        payload.insert("type".to_string(), json!("stream:start"));
        payload.insert("from".to_string(), json!("spoofed"));

        let frame = RelayedFrame::passthrough(payload, "A");
        let value: Value = serde_json::from_str(&frame.to_json().unwrap()).unwrap();
        assert_eq!(value["from"], json!("A"));
        assert_eq!(value["type"], json!("stream:start"));
    }
}
