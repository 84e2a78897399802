//! Device record stored by the registry

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::Serialize;

use anchor_common::DeviceId;
use anchor_protocol::{DeviceEvent, DeviceStatus};

/// Placeholder for fields a device never reported
pub const UNKNOWN: &str = "Unknown";

const DEFAULT_ACTIVITY: &str = "Idle";

/// Separator in `"<type> - <user>"` display names
const NAME_SEPARATOR: &str = " - ";

/// Everything the core knows about one device
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceRecord {
    pub id: DeviceId,
    /// HTML-escaped display name
    pub name: String,
    #[serde(rename = "type")]
    pub device_type: String,
    pub user: String,
    pub status: DeviceStatus,
    pub last_seen: Option<DateTime<Utc>>,
    pub ip: String,
    pub activity: String,
    pub browser: String,
    pub os: String,
    /// Raw events, oldest first
    pub history: VecDeque<DeviceEvent>,
}

impl DeviceRecord {
    /// Blank record seeded from the first event's static fields
    pub(crate) fn from_event(id: DeviceId, event: &DeviceEvent) -> Self {
        let stats = event.stats.as_ref();
        Self {
            id,
            name: UNKNOWN.to_string(),
            device_type: stats
                .and_then(|s| s.kind.clone())
                .unwrap_or_else(|| UNKNOWN.to_string()),
            user: UNKNOWN.to_string(),
            status: DeviceStatus::Online,
            last_seen: None,
            ip: UNKNOWN.to_string(),
            activity: DEFAULT_ACTIVITY.to_string(),
            browser: UNKNOWN.to_string(),
            os: UNKNOWN.to_string(),
            history: VecDeque::new(),
        }
    }

    /// Overwrite core fields from a newer event
    pub(crate) fn apply(&mut self, event: &DeviceEvent, at: DateTime<Utc>) {
        if let Some(name) = event.name.as_deref() {
            self.name = escape_html(name);
            if let Some((kind, user)) = name.split_once(NAME_SEPARATOR) {
                self.device_type = escape_html(kind);
                self.user = escape_html(user);
            }
        }
        self.status = event.status.unwrap_or_default();
        if let Some(ip) = &event.ip {
            self.ip = ip.clone();
        }
        if let Some(activity) = &event.activity {
            self.activity = activity.clone();
        }
        if let Some(ua) = event.stats.as_ref().and_then(|s| s.ua.as_ref()) {
            self.browser = ua.clone();
        }
        self.last_seen = Some(at);
    }

    pub(crate) fn push_history(&mut self, event: DeviceEvent, capacity: usize) {
        while self.history.len() >= capacity {
            self.history.pop_front();
        }
        self.history.push_back(event);
    }
}

/// Escape the characters that matter in HTML text and attributes
pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            '`' => out.push_str("&#96;"),
            _ => out.push(c),
        }
    }
    out
}
