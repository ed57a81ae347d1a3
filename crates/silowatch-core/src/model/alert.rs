// ── Critical alert domain types ──

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

const CRITICAL: &[&str] = &[
    "crit", "severe", "high", "major", "emerg", "fatal", "alarm", "danger",
];
const WARNING: &[&str] = &[
    "warn", "medium", "moderate", "low", "minor", "info", "notice", "caution",
];
const ACTIVE: &[&str] = &["activ", "open", "new", "trigger", "firing", "raised"];
const RESOLVED: &[&str] = &["resolv", "clear", "close", "done", "fixed"];
const NEGATIONS: &[&str] = &["un", "in", "non", "not"];

/// Whether `stem` appears in `s` directly after a standalone negation
/// ("inactive", "non-critical", "not acked").
fn negated(s: &str, stem: &str) -> bool {
    s.match_indices(stem).any(|(at, _)| {
        let head = s[..at].trim_end_matches([' ', '-', '_']);
        NEGATIONS.iter().any(|neg| {
            head.strip_suffix(neg)
                .is_some_and(|rest| !rest.ends_with(|c: char| c.is_ascii_alphabetic()))
        })
    })
}

/// Some stem in `stems` occurs without a negation in front of it.
fn affirms(s: &str, stems: &[&str]) -> bool {
    stems.iter().any(|k| s.contains(k) && !negated(s, k))
}

/// Some stem in `stems` occurs negated.
fn denies(s: &str, stems: &[&str]) -> bool {
    stems.iter().any(|k| negated(s, k))
}

#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum AlertSeverity {
    #[default]
    Warning,
    Critical,
}

impl AlertSeverity {
    /// Lenient mapping of free-form severity strings.
    ///
    /// Anything mentioning "crit" is critical, as are the usual synonyms for
    /// a page-worthy alarm; negated forms such as "non-critical" are
    /// warnings. Unrecognized text yields `None`.
    pub fn parse_lenient(raw: &str) -> Option<Self> {
        let s = raw.trim().to_ascii_lowercase();
        if s.is_empty() {
            return None;
        }
        if affirms(&s, CRITICAL) {
            Some(Self::Critical)
        } else if denies(&s, CRITICAL) || WARNING.iter().any(|k| s.contains(k)) {
            Some(Self::Warning)
        } else {
            None
        }
    }
}

#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum AlertStatus {
    #[default]
    Active,
    Acknowledged,
    Resolved,
}

impl AlertStatus {
    /// Lenient mapping of free-form status strings ("ack" → acknowledged,
    /// "unresolved" → active, "inactive" → resolved).
    pub fn parse_lenient(raw: &str) -> Option<Self> {
        let s = raw.trim().to_ascii_lowercase();
        if s.is_empty() {
            return None;
        }
        if negated(&s, "ack") || denies(&s, RESOLVED) {
            Some(Self::Active)
        } else if denies(&s, ACTIVE) {
            Some(Self::Resolved)
        } else if s.contains("ack") {
            Some(Self::Acknowledged)
        } else if affirms(&s, RESOLVED) {
            Some(Self::Resolved)
        } else if affirms(&s, ACTIVE) {
            Some(Self::Active)
        } else {
            None
        }
    }

    /// Active or acknowledged (still needs attention).
    pub fn is_open(self) -> bool {
        !matches!(self, Self::Resolved)
    }
}

/// A critical alert in the reconciled list. Identity is `id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CriticalAlert {
    pub id: String,
    pub silo_name: String,
    pub alert_type: String,
    pub severity: AlertSeverity,
    pub detected_at: DateTime<Utc>,
    pub duration_minutes: u32,
    pub status: AlertStatus,
    pub description: String,
    pub recommended_action: String,
}

// ── Action state ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum FeedbackStatus {
    Success,
    Error,
}

/// Outcome message of the last acknowledge/resolve on an alert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionFeedback {
    pub status: FeedbackStatus,
    pub message: String,
}

impl ActionFeedback {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            status: FeedbackStatus::Success,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: FeedbackStatus::Error,
            message: message.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.status == FeedbackStatus::Error
    }
}

/// Transient per-alert bookkeeping for in-flight actions. Kept apart from
/// the alert list; an entry with nothing set is removed from its map.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertActionState {
    pub acknowledging: bool,
    pub resolving: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feedback: Option<ActionFeedback>,
}

impl AlertActionState {
    pub fn is_empty(&self) -> bool {
        !self.acknowledging && !self.resolving && self.feedback.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_is_lenient() {
        assert_eq!(AlertSeverity::parse_lenient("CRITICAL"), Some(AlertSeverity::Critical));
        assert_eq!(AlertSeverity::parse_lenient("crit"), Some(AlertSeverity::Critical));
        assert_eq!(AlertSeverity::parse_lenient("Warning"), Some(AlertSeverity::Warning));
        assert_eq!(AlertSeverity::parse_lenient("high"), Some(AlertSeverity::Critical));
        assert_eq!(AlertSeverity::parse_lenient("non-critical"), Some(AlertSeverity::Warning));
        assert_eq!(AlertSeverity::parse_lenient("not critical"), Some(AlertSeverity::Warning));
        assert_eq!(AlertSeverity::parse_lenient("noncritical"), Some(AlertSeverity::Warning));
        assert_eq!(AlertSeverity::parse_lenient("???"), None);
        assert_eq!(AlertSeverity::parse_lenient(""), None);
    }

    #[test]
    fn status_is_lenient() {
        assert_eq!(AlertStatus::parse_lenient("ack"), Some(AlertStatus::Acknowledged));
        assert_eq!(AlertStatus::parse_lenient("ACKNOWLEDGED"), Some(AlertStatus::Acknowledged));
        assert_eq!(AlertStatus::parse_lenient("resolved"), Some(AlertStatus::Resolved));
        assert_eq!(AlertStatus::parse_lenient("cleared"), Some(AlertStatus::Resolved));
        assert_eq!(AlertStatus::parse_lenient("open"), Some(AlertStatus::Active));
        assert_eq!(AlertStatus::parse_lenient("unacknowledged"), Some(AlertStatus::Active));
        assert_eq!(AlertStatus::parse_lenient("not acknowledged"), Some(AlertStatus::Active));
        assert_eq!(AlertStatus::parse_lenient("unresolved"), Some(AlertStatus::Active));
        assert_eq!(AlertStatus::parse_lenient("inactive"), Some(AlertStatus::Resolved));
        assert_eq!(AlertStatus::parse_lenient("not_active"), Some(AlertStatus::Resolved));
        assert_eq!(AlertStatus::parse_lenient("active"), Some(AlertStatus::Active));
        assert_eq!(AlertStatus::parse_lenient("reopened"), Some(AlertStatus::Active));
        assert_eq!(AlertStatus::parse_lenient("pending"), None);
    }

    #[test]
    fn empty_action_state() {
        assert!(AlertActionState::default().is_empty());
        let state = AlertActionState {
            feedback: Some(ActionFeedback::error("nope")),
            ..Default::default()
        };
        assert!(!state.is_empty());
    }
}
