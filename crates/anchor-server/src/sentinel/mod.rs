//! Intrusion sentinel
//!
//! Records security-relevant events in a bounded log and re-scans it after
//! every observation. Windows slide with the clock rather than resetting
//! on fixed boundaries, and repeated alerts for one source are debounced.

pub mod rules;

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;

use anchor_common::SharedClock;

pub use rules::{Rule, RuleKind, Severity, AUTH_FAIL, AUTH_FAIL_BURST, DEFAULT_RULES};

/// Default number of security events retained
pub const DEFAULT_LOG_CAPACITY: usize = 1000;

/// One observed security event
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityEvent {
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type")]
    pub event_type: String,
    pub source: String,
    pub details: String,
}

/// A fired rule
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    pub timestamp: DateTime<Utc>,
    pub rule_id: String,
    pub severity: Severity,
    pub source: String,
    pub message: String,
}

#[derive(Default)]
struct Ledger {
    events: VecDeque<SecurityEvent>,
    alerts: Vec<Alert>,
}

/// Rule-driven detector over the security event log
pub struct SentinelEngine {
    clock: SharedClock,
    rules: &'static [Rule],
    capacity: usize,
    ledger: Mutex<Ledger>,
}

impl SentinelEngine {
    /// Create an engine with the default rule table
    pub fn new(capacity: usize, clock: SharedClock) -> Self {
        Self::with_rules(capacity, clock, DEFAULT_RULES)
    }

    /// Create an engine with a custom rule table
    pub fn with_rules(capacity: usize, clock: SharedClock, rules: &'static [Rule]) -> Self {
        Self {
            clock,
            rules,
            capacity: capacity.max(1),
            ledger: Mutex::new(Ledger::default()),
        }
    }

    /// Record an event and evaluate the rules against the updated log.
    ///
    /// Returns the alert raised by this observation, if any.
    pub fn observe(&self, event_type: &str, source: &str, details: &str) -> Option<Alert> {
        let now = self.clock.now();
        let mut ledger = self.ledger.lock();

        while ledger.events.len() >= self.capacity {
            ledger.events.pop_front();
        }
        ledger.events.push_back(SecurityEvent {
            timestamp: now,
            event_type: event_type.to_string(),
            source: source.to_string(),
            details: details.to_string(),
        });

        let mut raised = None;
        for rule in self.rules.iter().filter(|r| r.enabled) {
            let RuleKind::Frequency {
                event_type: watched,
                window,
                threshold,
            } = rule.kind
            else {
                continue;
            };
            if watched != event_type {
                continue;
            }

            let window = chrono::Duration::milliseconds(window.as_millis() as i64);
            let count = ledger
                .events
                .iter()
                .filter(|e| e.event_type == watched && e.source == source)
                .filter(|e| now - e.timestamp < window)
                .count();
            if count < threshold {
                continue;
            }

            if is_debounced(&ledger.alerts, rule.id, source, now) {
                tracing::debug!("{} for {} suppressed by debounce", rule.id, source);
                continue;
            }

            let alert = Alert {
                timestamp: now,
                rule_id: rule.id.to_string(),
                severity: rule.severity,
                source: source.to_string(),
                message: format!(
                    "{} {} events from {} within {}s",
                    count,
                    watched,
                    source,
                    window.num_seconds()
                ),
            };
            tracing::warn!(
                rule = rule.id,
                severity = ?rule.severity,
                "SECURITY ALERT: {}",
                alert.message
            );
            ledger.alerts.push(alert.clone());
            raised = Some(alert);
        }
        raised
    }

    /// Every alert raised since startup
    pub fn alerts(&self) -> Vec<Alert> {
        self.ledger.lock().alerts.clone()
    }

    /// Number of alerts raised since startup
    pub fn alert_count(&self) -> usize {
        self.ledger.lock().alerts.len()
    }

    /// Snapshot of the retained event log
    pub fn events(&self) -> Vec<SecurityEvent> {
        self.ledger.lock().events.iter().cloned().collect()
    }
}

fn is_debounced(alerts: &[Alert], rule_id: &str, source: &str, now: DateTime<Utc>) -> bool {
    let debounce = chrono::Duration::milliseconds(rules::DEBOUNCE.as_millis() as i64);
    alerts
        .iter()
        .rev()
        .find(|a| a.rule_id == rule_id && a.source == source)
        .is_some_and(|a| now - a.timestamp < debounce)
}
