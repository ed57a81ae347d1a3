// ── Filter predicates for alert snapshots ──
//
// Used by consumers to filter the reconciled list without re-querying the
// server.

use crate::model::{AlertSeverity, AlertStatus, CriticalAlert};

/// Filter predicate for critical alerts.
pub enum AlertFilter {
    All,
    ByStatus(AlertStatus),
    BySeverity(AlertSeverity),
    /// Active or acknowledged.
    Open,
    Custom(Box<dyn Fn(&CriticalAlert) -> bool + Send + Sync>),
}

impl AlertFilter {
    pub fn matches(&self, alert: &CriticalAlert) -> bool {
        match self {
            Self::All => true,
            Self::ByStatus(status) => alert.status == *status,
            Self::BySeverity(severity) => alert.severity == *severity,
            Self::Open => alert.status.is_open(),
            Self::Custom(f) => f(alert),
        }
    }

    /// Keep only the matching alerts, preserving order.
    pub fn apply<'a, I>(&self, alerts: I) -> Vec<&'a CriticalAlert>
    where
        I: IntoIterator<Item = &'a CriticalAlert>,
    {
        alerts.into_iter().filter(|a| self.matches(a)).collect()
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    fn alert(id: &str, severity: AlertSeverity, status: AlertStatus) -> CriticalAlert {
        CriticalAlert {
            id: id.into(),
            silo_name: "Silo 1".into(),
            alert_type: "temperature".into(),
            severity,
            detected_at: Utc::now(),
            duration_minutes: 0,
            status,
            description: String::new(),
            recommended_action: String::new(),
        }
    }

    #[test]
    fn filters() {
        let alerts = vec![
            alert("a", AlertSeverity::Critical, AlertStatus::Active),
            alert("b", AlertSeverity::Warning, AlertStatus::Acknowledged),
            alert("c", AlertSeverity::Critical, AlertStatus::Resolved),
        ];
        let ids = |f: AlertFilter| -> Vec<String> {
            f.apply(&alerts).into_iter().map(|a| a.id.clone()).collect()
        };

        assert_eq!(ids(AlertFilter::All), ["a", "b", "c"]);
        assert_eq!(ids(AlertFilter::Open), ["a", "b"]);
        assert_eq!(ids(AlertFilter::BySeverity(AlertSeverity::Critical)), ["a", "c"]);
        assert_eq!(ids(AlertFilter::ByStatus(AlertStatus::Resolved)), ["c"]);
        assert_eq!(
            ids(AlertFilter::Custom(Box::new(|a| a.id != "a"))),
            ["b", "c"]
        );
    }
}
