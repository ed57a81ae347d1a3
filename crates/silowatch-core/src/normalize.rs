//! Event normalizer: opaque push-stream payload → [`NormalizedDeviceUpdate`].
//!
//! Devices and gateways in the field send loosely-typed JSON with many
//! aliases for the same field. Normalization runs in two stages:
//!
//! 1. A permissive structural probe over the parsed `serde_json::Value`
//!    that knows every alias and nesting location, and returns borrowed
//!    candidates.
//! 2. Validation of those candidates into the strict update type, where
//!    anything unrecognized is dropped rather than reported.
//!
//! [`normalize`] never fails. Unparsable input still yields a record (with
//! `type = unknown` when nothing could be inferred), so one bad message can
//! never stall the pipeline.

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;

use crate::convert::{
    clamp_duration_minutes, parse_timestamp, value_as_count, value_as_f64, value_as_text,
};
use crate::model::{
    AlertSeverity, AlertStatus, DeviceAlertSnapshot, DeviceGatewaySnapshot, DeviceReadingSnapshot,
    DeviceSensorStatusSnapshot, GatewayStatus, NormalizedDeviceUpdate, UpdateKind,
};

/// Device id used when neither the payload nor the caller names one.
pub const UNKNOWN_DEVICE: &str = "unknown-device";

// ── Alias tables ────────────────────────────────────────────────────

const TYPE_KEYS: &[&str] = &["eventType", "event", "type", "kind", "updateType", "category"];
const TIMESTAMP_KEYS: &[&str] = &[
    "timestamp",
    "ts",
    "time",
    "eventTime",
    "event_time",
    "createdAt",
    "created_at",
    "receivedAt",
    "received_at",
];
const DEVICE_ID_KEYS: &[&str] = &["deviceId", "device_id", "id_device"];
const UPDATE_ID_KEYS: &[&str] = &["id", "eventId", "messageId", "updateId"];

const TOTAL_KEYS: &[&str] = &["totalSensors", "total_sensors", "total"];
const ONLINE_KEYS: &[&str] = &["online", "onlineSensors", "online_sensors"];
const OFFLINE_KEYS: &[&str] = &["offline", "offlineSensors", "offline_sensors"];
const MAINTENANCE_KEYS: &[&str] = &["maintenance", "maintenanceSensors", "maintenance_sensors"];
const BATTERY_KEYS: &[&str] = &[
    "batteryCritical",
    "battery_critical",
    "lowBattery",
    "low_battery",
];

const AVG_SIGNAL_KEYS: &[&str] = &["averageSignalQuality", "average_signal_quality"];
const SIGNAL_KEYS: &[&str] = &["signalQuality", "signal_quality"];
const GATEWAY_STATUS_KEYS: &[&str] = &["gatewayStatus", "gateway_status"];

const ALERT_ID_KEYS: &[&str] = &["id", "alertId", "alert_id"];
const ALERT_MESSAGE_KEYS: &[&str] = &["message", "description", "text", "title", "summary"];
const ALERT_SEVERITY_KEYS: &[&str] = &["severity", "level", "priority"];
const ALERT_STATUS_KEYS: &[&str] = &["status", "state"];
const ALERT_SILO_KEYS: &[&str] = &["siloName", "silo_name", "silo"];
const ALERT_TYPE_KEYS: &[&str] = &["alertType", "alert_type", "type", "kind", "category"];
const ALERT_DETECTED_KEYS: &[&str] = &[
    "detectedAt",
    "detected_at",
    "timestamp",
    "createdAt",
    "created_at",
];
const ALERT_DURATION_KEYS: &[&str] = &["durationMinutes", "duration_minutes", "duration"];
const ALERT_ACTION_KEYS: &[&str] = &[
    "recommendedAction",
    "recommended_action",
    "action",
    "recommendation",
];

// ── Entry points ────────────────────────────────────────────────────

/// Normalize one raw message body.
///
/// `fallback_device_id` is the subscription's device; `event_id` is the
/// transport-level message id (SSE `id:`), used when the payload has none.
pub fn normalize(
    raw: &str,
    fallback_device_id: Option<&str>,
    event_id: Option<&str>,
) -> NormalizedDeviceUpdate {
    normalize_at(raw, fallback_device_id, event_id, Utc::now())
}

/// [`normalize`] with an explicit clock, for timestamps that cannot be
/// recovered from the payload.
pub fn normalize_at(
    raw: &str,
    fallback_device_id: Option<&str>,
    event_id: Option<&str>,
    now: DateTime<Utc>,
) -> NormalizedDeviceUpdate {
    let parsed = serde_json::from_str::<Value>(raw).unwrap_or_else(|_| Value::String(raw.to_owned()));
    normalize_value(parsed, fallback_device_id, event_id, now)
}

/// Normalize an already-parsed payload.
pub fn normalize_value(
    parsed: Value,
    fallback_device_id: Option<&str>,
    event_id: Option<&str>,
    now: DateTime<Utc>,
) -> NormalizedDeviceUpdate {
    let (envelope, source) = unwrap_data(parsed);
    let probe = Probe {
        source: &source,
        envelope: envelope.as_ref(),
    };

    let declared = probe.declared_kind();
    let timestamp = probe.timestamp().unwrap_or(now);
    let device_id = probe
        .device_id()
        .or_else(|| non_empty(fallback_device_id))
        .unwrap_or_else(|| UNKNOWN_DEVICE.to_owned());
    let id = probe
        .update_id()
        .or_else(|| non_empty(event_id))
        .unwrap_or_else(|| synthetic_id(&device_id, timestamp, declared));

    let reading = probe.reading();
    let gateway = probe.gateway(declared);
    let alert = probe.alert();

    let kind = if declared == UpdateKind::Unknown {
        infer_kind(reading.is_some(), alert.is_some(), gateway.is_some())
    } else {
        declared
    };

    NormalizedDeviceUpdate {
        id,
        device_id,
        timestamp,
        kind,
        reading,
        gateway,
        alert,
        raw: source,
    }
}

// ── Stage 1: structural probe ───────────────────────────────────────

/// Split off a `data` wrapper. A string `data` holding JSON is parsed.
fn unwrap_data(parsed: Value) -> (Option<Value>, Value) {
    let Value::Object(mut map) = parsed else {
        return (None, parsed);
    };
    match map.remove("data") {
        Some(Value::String(inner)) => {
            let source = serde_json::from_str(&inner).unwrap_or(Value::String(inner));
            (Some(Value::Object(map)), source)
        }
        Some(inner) => (Some(Value::Object(map)), inner),
        None => (None, Value::Object(map)),
    }
}

/// First non-null value under any of `keys`.
fn field<'v>(obj: &'v Value, keys: &[&str]) -> Option<&'v Value> {
    let map = obj.as_object()?;
    keys.iter()
        .find_map(|key| map.get(*key).filter(|v| !v.is_null()))
}

/// Nested object at `parent.key`.
fn child<'v>(obj: &'v Value, key: &str) -> Option<&'v Value> {
    obj.get(key).filter(|v| v.is_object())
}

fn non_empty(s: Option<&str>) -> Option<String> {
    s.map(str::trim).filter(|s| !s.is_empty()).map(str::to_owned)
}

struct Probe<'a> {
    source: &'a Value,
    /// The object that wrapped `source` under `data`, if any. Consulted for
    /// routing fields (device id, update id, timestamp) the inner payload
    /// lacks.
    envelope: Option<&'a Value>,
}

impl Probe<'_> {
    fn routing_field(&self, keys: &[&str]) -> Option<&Value> {
        field(self.source, keys).or_else(|| self.envelope.and_then(|env| field(env, keys)))
    }

    /// Non-object payloads (bare strings, numbers, arrays) carry no type and
    /// are `Unknown`; objects without a type field default to `Reading`.
    fn declared_kind(&self) -> UpdateKind {
        if !self.source.is_object() {
            return UpdateKind::Unknown;
        }
        let declared = TYPE_KEYS.iter().find_map(|key| {
            self.source
                .get(*key)
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
        });
        declared.map_or(UpdateKind::Reading, |s| kind_from_str(&s.to_ascii_lowercase()))
    }

    fn timestamp(&self) -> Option<DateTime<Utc>> {
        TIMESTAMP_KEYS
            .iter()
            .filter_map(|key| self.routing_field(&[*key]))
            .find_map(parse_timestamp)
    }

    fn device_id(&self) -> Option<String> {
        self.routing_field(DEVICE_ID_KEYS).and_then(value_as_text)
    }

    fn update_id(&self) -> Option<String> {
        self.routing_field(UPDATE_ID_KEYS).and_then(value_as_text)
    }

    /// Candidate objects for sensor counts, in priority order. The first one
    /// that resolves at least one count wins.
    fn sensor_status(&self) -> Option<DeviceSensorStatusSnapshot> {
        let src = self.source;
        let reading = child(src, "reading");
        let payload = child(src, "payload");

        let candidates = [
            field(src, &["sensorStatus"]),
            field(src, &["sensor_status"]),
            reading.and_then(|r| field(r, &["sensorStatus"])),
            reading.and_then(|r| field(r, &["sensor_status"])),
            field(src, &["sensors"]),
            payload.and_then(|p| field(p, &["sensorStatus"])),
            payload.and_then(|p| field(p, &["sensor_status"])),
            payload,
        ];

        candidates
            .into_iter()
            .flatten()
            .map(sensor_counts)
            .find(|snapshot| !snapshot.is_empty())
    }

    fn average_signal_quality(&self) -> Option<f64> {
        let src = self.source;
        [Some(src), child(src, "reading"), child(src, "gateway")]
            .into_iter()
            .flatten()
            .find_map(|obj| field(obj, AVG_SIGNAL_KEYS).and_then(value_as_f64))
    }

    fn gateway_status(&self) -> Option<GatewayStatus> {
        let src = self.source;
        let gateway = child(src, "gateway");

        let candidates = [
            field(src, GATEWAY_STATUS_KEYS),
            child(src, "reading").and_then(|r| field(r, GATEWAY_STATUS_KEYS)),
            gateway.and_then(|gw| field(gw, &["status"]).or_else(|| field(gw, GATEWAY_STATUS_KEYS))),
            // `"gateway": "online"` shorthand.
            src.get("gateway").filter(|v| v.is_string()),
        ];
        candidates.into_iter().flatten().find_map(gateway_status)
    }

    fn reading(&self) -> Option<DeviceReadingSnapshot> {
        let snapshot = DeviceReadingSnapshot {
            sensor_status: self.sensor_status(),
            average_signal_quality: self.average_signal_quality(),
            gateway_status: self.gateway_status(),
        };
        (snapshot != DeviceReadingSnapshot::default()).then_some(snapshot)
    }

    /// Gateway snapshot from the `gateway` object; for messages declared as
    /// gateway updates, top-level `status`/`signalQuality` count as well.
    fn gateway(&self, declared: UpdateKind) -> Option<DeviceGatewaySnapshot> {
        let src = self.source;
        let gateway = child(src, "gateway");
        let is_gateway_message = declared == UpdateKind::Gateway;

        let status = self.gateway_status().or_else(|| {
            is_gateway_message
                .then(|| field(src, &["status"]))
                .flatten()
                .and_then(gateway_status)
        });
        let signal_quality = gateway
            .and_then(|gw| field(gw, SIGNAL_KEYS))
            .or_else(|| is_gateway_message.then(|| field(src, SIGNAL_KEYS)).flatten())
            .and_then(value_as_f64);

        let snapshot = DeviceGatewaySnapshot {
            status,
            signal_quality,
        };
        (snapshot != DeviceGatewaySnapshot::default()).then_some(snapshot)
    }

    fn alert(&self) -> Option<DeviceAlertSnapshot> {
        let src = self.source;
        let candidates = [
            child(src, "alert"),
            child(src, "payload").and_then(|p| child(p, "alert")),
            child(src, "notification"),
        ];
        candidates.into_iter().flatten().find_map(alert_snapshot)
    }
}

// ── Stage 2: validation into strict types ───────────────────────────

fn kind_from_str(s: &str) -> UpdateKind {
    const READING: &[&str] = &["reading", "telemetry", "measurement", "sensor", "metric"];
    const ALERT: &[&str] = &["alert", "alarm", "notification", "incident"];

    if ALERT.iter().any(|k| s.contains(k)) {
        UpdateKind::Alert
    } else if s.contains("gateway") {
        UpdateKind::Gateway
    } else if READING.iter().any(|k| s.contains(k)) {
        UpdateKind::Reading
    } else {
        UpdateKind::Unknown
    }
}

fn infer_kind(has_reading: bool, has_alert: bool, has_gateway: bool) -> UpdateKind {
    if has_reading {
        UpdateKind::Reading
    } else if has_alert {
        UpdateKind::Alert
    } else if has_gateway {
        UpdateKind::Gateway
    } else {
        UpdateKind::Unknown
    }
}

fn synthetic_id(device_id: &str, timestamp: DateTime<Utc>, kind: UpdateKind) -> String {
    format!(
        "{device_id}-{}-{kind}",
        timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
    )
}

fn sensor_counts(obj: &Value) -> DeviceSensorStatusSnapshot {
    let count = |keys: &[&str]| field(obj, keys).and_then(value_as_count);
    DeviceSensorStatusSnapshot {
        total_sensors: count(TOTAL_KEYS),
        online: count(ONLINE_KEYS),
        offline: count(OFFLINE_KEYS),
        maintenance: count(MAINTENANCE_KEYS),
        battery_critical: count(BATTERY_KEYS),
    }
}

/// Only `online`, `degraded` and `offline` are accepted.
fn gateway_status(value: &Value) -> Option<GatewayStatus> {
    value.as_str()?.trim().parse().ok()
}

fn alert_snapshot(obj: &Value) -> Option<DeviceAlertSnapshot> {
    let text = |keys: &[&str]| field(obj, keys).and_then(value_as_text);

    let id = text(ALERT_ID_KEYS);
    let message = text(ALERT_MESSAGE_KEYS);
    let raw_severity = text(ALERT_SEVERITY_KEYS);
    if id.is_none() && message.is_none() && raw_severity.is_none() {
        return None;
    }

    Some(DeviceAlertSnapshot {
        id,
        message,
        severity: raw_severity.as_deref().and_then(AlertSeverity::parse_lenient),
        status: text(ALERT_STATUS_KEYS)
            .as_deref()
            .and_then(AlertStatus::parse_lenient),
        silo_name: text(ALERT_SILO_KEYS),
        alert_type: text(ALERT_TYPE_KEYS),
        detected_at: ALERT_DETECTED_KEYS
            .iter()
            .filter_map(|key| field(obj, &[*key]))
            .find_map(parse_timestamp),
        duration_minutes: field(obj, ALERT_DURATION_KEYS)
            .and_then(value_as_f64)
            .map(clamp_duration_minutes),
        recommended_action: text(ALERT_ACTION_KEYS),
    })
}

// ── Tests ───────────────────────────────────────────────────────────
