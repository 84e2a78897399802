//! Static rule table

use std::time::Duration;

use serde::Serialize;

/// Rule id for repeated authentication failures
pub const AUTH_FAIL_BURST: &str = "AUTH_FAIL_BURST";

/// Rule id for oversized heartbeat batches
pub const BATCH_SIZE_ANOMALY: &str = "BATCH_SIZE_ANOMALY";

/// Event type recorded for a rejected shared secret
pub const AUTH_FAIL: &str = "AUTH_FAIL";

/// Minimum spacing between alerts for the same rule and source
pub const DEBOUNCE: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

/// How a rule decides to fire
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleKind {
    /// Count matching events per source within a trailing window
    Frequency {
        event_type: &'static str,
        window: Duration,
        threshold: usize,
    },
    /// Compare a single reported value against a limit
    ValueCheck { threshold: u64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rule {
    pub id: &'static str,
    pub kind: RuleKind,
    pub severity: Severity,
    /// Whether the engine evaluates this rule
    pub enabled: bool,
}

/// The rule table used by the core.
///
/// `BATCH_SIZE_ANOMALY` is declared with its threshold but not evaluated.
pub const DEFAULT_RULES: &[Rule] = &[
    Rule {
        id: AUTH_FAIL_BURST,
        kind: RuleKind::Frequency {
            event_type: AUTH_FAIL,
            window: Duration::from_secs(60),
            threshold: 5,
        },
        severity: Severity::High,
        enabled: true,
    },
    Rule {
        id: BATCH_SIZE_ANOMALY,
        kind: RuleKind::ValueCheck { threshold: 1000 },
        severity: Severity::Medium,
        enabled: false,
    },
];
