// ── Aggregate device state ──
//
// The pure fold behind `UpdateAggregator`: one normalized update in,
// merged snapshots and a bounded history out.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::model::{
    DeviceAlertSnapshot, DeviceGatewaySnapshot, DeviceReadingSnapshot, NormalizedDeviceUpdate,
};

/// Updates kept in the history unless configured otherwise.
pub const DEFAULT_HISTORY_CAPACITY: usize = 50;

/// The most recent alert snapshot, stamped with its carrying update.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LatestAlert {
    pub alert: DeviceAlertSnapshot,
    pub received_at: DateTime<Utc>,
    pub update_id: String,
}

impl LatestAlert {
    /// The alert carried by `update`, if any.
    pub fn from_update(update: &NormalizedDeviceUpdate) -> Option<Self> {
        update.alert.as_ref().map(|alert| Self {
            alert: alert.clone(),
            received_at: update.timestamp,
            update_id: update.id.clone(),
        })
    }
}

/// Everything known about the active device's live feed.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateState {
    /// Newest first.
    pub updates: VecDeque<NormalizedDeviceUpdate>,
    pub latest_reading: Option<DeviceReadingSnapshot>,
    pub latest_gateway: Option<DeviceGatewaySnapshot>,
    pub latest_alert: Option<LatestAlert>,
    pub last_event_timestamp: Option<DateTime<Utc>>,
}

impl AggregateState {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Fold one update into the state.
    ///
    /// Snapshots and `last_event_timestamp` always take the update. The id
    /// only de-duplicates history entries: an exact re-delivery (same id and
    /// payload) adds none, while a different payload under a colliding id is
    /// kept with a `#n` suffix. Returns whether anything changed.
    pub fn apply(&mut self, mut update: NormalizedDeviceUpdate, capacity: usize) -> bool {
        let redelivery = match self.updates.iter().find(|u| u.id == update.id) {
            Some(seen) if seen.raw == update.raw => true,
            Some(_) => {
                update.id = self.unused_id(&update.id);
                false
            }
            None => false,
        };

        let before = redelivery.then(|| {
            (
                self.latest_reading,
                self.latest_gateway,
                self.latest_alert.clone(),
                self.last_event_timestamp,
            )
        });

        if let Some(reading) = update.reading {
            self.latest_reading = Some(match self.latest_reading {
                Some(prev) => prev.merge(reading),
                None => reading,
            });
        }
        if let Some(gateway) = update.gateway {
            self.latest_gateway = Some(match self.latest_gateway {
                Some(prev) => prev.merge(gateway),
                None => gateway,
            });
        }
        if let Some(latest) = LatestAlert::from_update(&update) {
            self.latest_alert = Some(latest);
        }
        self.last_event_timestamp = Some(update.timestamp);

        if let Some(before) = before {
            return before
                != (
                    self.latest_reading,
                    self.latest_gateway,
                    self.latest_alert.clone(),
                    self.last_event_timestamp,
                );
        }

        self.updates.push_front(update);
        self.updates.truncate(capacity.max(1));
        true
    }

    /// First `{base}#n` not used by any history entry.
    fn unused_id(&self, base: &str) -> String {
        let taken = |candidate: &str| self.updates.iter().any(|u| u.id == candidate);
        (2..=self.updates.len() + 2)
            .map(|n| format!("{base}#{n}"))
            .find(|candidate| !taken(candidate))
            .unwrap_or_else(|| format!("{base}#{}", self.updates.len() + 3))
    }
}
