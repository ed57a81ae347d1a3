// ── Alert list reconciliation ──
//
// The single list of critical alerts for the active device, keyed by id.
// REST baselines replace it wholesale; live pushes and action responses
// merge into it one alert at a time.

use indexmap::IndexMap;
use serde::{Serialize, Serializer};

use crate::model::CriticalAlert;

/// What a merge did to the list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// New id, placed at the front.
    Inserted,
    /// Existing entry updated in place.
    Updated,
    /// The merged alert equals the existing entry.
    Unchanged,
}

impl MergeOutcome {
    pub fn changed(self) -> bool {
        !matches!(self, Self::Unchanged)
    }
}

/// Ordered alert list with at most one entry per id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AlertList {
    entries: IndexMap<String, CriticalAlert>,
}

impl AlertList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&CriticalAlert> {
        self.entries.get(id)
    }

    /// Alerts in display order.
    pub fn iter(&self) -> impl Iterator<Item = &CriticalAlert> {
        self.entries.values()
    }

    pub fn to_vec(&self) -> Vec<CriticalAlert> {
        self.entries.values().cloned().collect()
    }

    /// Merge one alert by id.
    ///
    /// An existing entry is overwritten field by field, except that an
    /// empty incoming `description` or `recommended_action` keeps the
    /// previous text. Unknown ids are prepended.
    pub fn merge(&mut self, incoming: CriticalAlert) -> MergeOutcome {
        if let Some(existing) = self.entries.get_mut(&incoming.id) {
            let merged = merge_alert(existing, incoming);
            if *existing == merged {
                return MergeOutcome::Unchanged;
            }
            *existing = merged;
            return MergeOutcome::Updated;
        }
        self.entries
            .shift_insert(0, incoming.id.clone(), incoming);
        MergeOutcome::Inserted
    }
}

impl FromIterator<CriticalAlert> for AlertList {
    /// Build a baseline in server order. A repeated id keeps its first
    /// position and is merged with the later occurrence.
    fn from_iter<I: IntoIterator<Item = CriticalAlert>>(iter: I) -> Self {
        let mut entries: IndexMap<String, CriticalAlert> = IndexMap::new();
        for alert in iter {
            match entries.get_mut(&alert.id) {
                Some(existing) => *existing = merge_alert(existing, alert),
                None => {
                    entries.insert(alert.id.clone(), alert);
                }
            }
        }
        Self { entries }
    }
}

impl Serialize for AlertList {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.entries.values())
    }
}

/// Field-wise merge of `incoming` over `existing`.
pub fn merge_alert(existing: &CriticalAlert, incoming: CriticalAlert) -> CriticalAlert {
    let keep_text = |new: String, old: &String| if new.is_empty() { old.clone() } else { new };
    CriticalAlert {
        description: keep_text(incoming.description, &existing.description),
        recommended_action: keep_text(incoming.recommended_action, &existing.recommended_action),
        ..incoming
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::{TimeZone, Utc};
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::model::{AlertSeverity, AlertStatus};

    fn alert(id: &str) -> CriticalAlert {
        CriticalAlert {
            id: id.into(),
            silo_name: "Silo 3".into(),
            alert_type: "temperature".into(),
            severity: AlertSeverity::Critical,
            detected_at: Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap(),
            duration_minutes: 10,
            status: AlertStatus::Active,
            description: "Grain temperature above threshold".into(),
            recommended_action: "Run aeration fans".into(),
        }
    }

    fn ids(list: &AlertList) -> Vec<&str> {
        list.iter().map(|a| a.id.as_str()).collect()
    }

    #[test]
    fn unknown_ids_are_prepended() {
        let mut list: AlertList = vec![alert("a"), alert("b")].into_iter().collect();
        assert_eq!(list.merge(alert("c")), MergeOutcome::Inserted);
        assert_eq!(ids(&list), vec!["c", "a", "b"]);
    }

    #[test]
    fn known_ids_update_in_place() {
        let mut list: AlertList = vec![alert("a"), alert("b")].into_iter().collect();
        let mut update = alert("b");
        update.status = AlertStatus::Acknowledged;
        assert_eq!(list.merge(update), MergeOutcome::Updated);
        assert_eq!(ids(&list), vec!["a", "b"]);
        assert_eq!(list.get("b").unwrap().status, AlertStatus::Acknowledged);
        assert_eq!(list.merge(alert("a")), MergeOutcome::Unchanged);
    }

    #[test]
    fn empty_text_keeps_previous() {
        let mut list: AlertList = std::iter::once(alert("a")).collect();
        let mut update = alert("a");
        update.description = String::new();
        update.recommended_action = String::new();
        update.duration_minutes = 25;
        list.merge(update);

        let merged = list.get("a").unwrap();
        assert_eq!(merged.description, "Grain temperature above threshold");
        assert_eq!(merged.recommended_action, "Run aeration fans");
        assert_eq!(merged.duration_minutes, 25);
    }

    #[test]
    fn baseline_collapses_duplicate_ids() {
        let mut second = alert("a");
        second.status = AlertStatus::Resolved;
        let list: AlertList = vec![alert("a"), alert("b"), second].into_iter().collect();
        assert_eq!(list.len(), 2);
        assert_eq!(ids(&list), vec!["a", "b"]);
        assert_eq!(list.get("a").unwrap().status, AlertStatus::Resolved);
    }

    #[test]
    fn serializes_as_array() {
        let list: AlertList = std::iter::once(alert("a")).collect();
        let json = serde_json::to_value(&list).unwrap();
        assert_eq!(json[0]["id"], "a");
        assert_eq!(json[0]["siloName"], "Silo 3");
    }
}
