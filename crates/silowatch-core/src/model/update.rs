// ── Normalized device update types ──

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::alert::{AlertSeverity, AlertStatus};

/// What a push-stream message is about.
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
#[strum(serialize_all = "lowercase")]
pub enum UpdateKind {
    #[default]
    Reading,
    Alert,
    Gateway,
    Unknown,
}

/// Gateway connectivity as reported by the device.
#[derive(
    Debug,
    Clone,
    Copy,
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
pub enum GatewayStatus {
    Online,
    Degraded,
    Offline,
}

/// Sensor population counts. Any subset may be present.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceSensorStatusSnapshot {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_sensors: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub online: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offline: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub maintenance: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub battery_critical: Option<u32>,
}

impl DeviceSensorStatusSnapshot {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Field-wise override: fields present in `newer` win.
    pub fn merge(self, newer: Self) -> Self {
        Self {
            total_sensors: newer.total_sensors.or(self.total_sensors),
            online: newer.online.or(self.online),
            offline: newer.offline.or(self.offline),
            maintenance: newer.maintenance.or(self.maintenance),
            battery_critical: newer.battery_critical.or(self.battery_critical),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceReadingSnapshot {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sensor_status: Option<DeviceSensorStatusSnapshot>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub average_signal_quality: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gateway_status: Option<GatewayStatus>,
}

impl DeviceReadingSnapshot {
    /// Field-wise override; `sensor_status` is itself merged field-wise.
    pub fn merge(self, newer: Self) -> Self {
        let sensor_status = match (self.sensor_status, newer.sensor_status) {
            (Some(old), Some(new)) => Some(old.merge(new)),
            (old, new) => new.or(old),
        };
        Self {
            sensor_status,
            average_signal_quality: newer.average_signal_quality.or(self.average_signal_quality),
            gateway_status: newer.gateway_status.or(self.gateway_status),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceGatewaySnapshot {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<GatewayStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signal_quality: Option<f64>,
}

impl DeviceGatewaySnapshot {
    pub fn merge(self, newer: Self) -> Self {
        Self {
            status: newer.status.or(self.status),
            signal_quality: newer.signal_quality.or(self.signal_quality),
        }
    }
}

/// Alert as carried inside a live update. Every field is optional; the
/// alert service fills gaps from its list when reconciling.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceAlertSnapshot {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub severity: Option<AlertSeverity>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<AlertStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub silo_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alert_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detected_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_minutes: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recommended_action: Option<String>,
}

/// One push-stream message in strict form.
///
/// `id` only de-duplicates entries in the aggregate history; it is not an
/// alert identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedDeviceUpdate {
    pub id: String,
    pub device_id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type")]
    pub kind: UpdateKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reading: Option<DeviceReadingSnapshot>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gateway: Option<DeviceGatewaySnapshot>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alert: Option<DeviceAlertSnapshot>,
    pub raw: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reading_merge_keeps_previous_fields() {
        let old = DeviceReadingSnapshot {
            sensor_status: Some(DeviceSensorStatusSnapshot {
                total_sensors: Some(10),
                online: Some(9),
                ..Default::default()
            }),
            average_signal_quality: Some(71.0),
            gateway_status: Some(GatewayStatus::Online),
        };
        let new = DeviceReadingSnapshot {
            sensor_status: Some(DeviceSensorStatusSnapshot {
                online: Some(8),
                offline: Some(2),
                ..Default::default()
            }),
            average_signal_quality: None,
            gateway_status: Some(GatewayStatus::Degraded),
        };

        let merged = old.merge(new);
        let sensors = merged.sensor_status.unwrap_or_default();
        assert_eq!(sensors.total_sensors, Some(10));
        assert_eq!(sensors.online, Some(8));
        assert_eq!(sensors.offline, Some(2));
        assert_eq!(merged.average_signal_quality, Some(71.0));
        assert_eq!(merged.gateway_status, Some(GatewayStatus::Degraded));
    }

    #[test]
    fn update_serializes_kind_as_type() {
        let update = NormalizedDeviceUpdate {
            id: "u1".into(),
            device_id: "d1".into(),
            timestamp: DateTime::<Utc>::UNIX_EPOCH,
            kind: UpdateKind::Gateway,
            reading: None,
            gateway: None,
            alert: None,
            raw: serde_json::Value::Null,
        };
        let json = serde_json::to_value(&update).unwrap_or_default();
        assert_eq!(json["type"], "gateway");
        assert_eq!(json["deviceId"], "d1");
        assert!(json.get("reading").is_none());
    }
}
