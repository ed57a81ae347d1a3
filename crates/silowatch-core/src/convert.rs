// ── API-to-domain type conversions ──
//
// Bridges `silowatch_api` wire types and loosely-typed JSON values into
// canonical `silowatch_core::model` types. Every helper is lenient: bad
// input becomes `None` or a default, never an error.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::Value;

use silowatch_api::ApiCriticalAlert;

use crate::model::{AlertSeverity, AlertStatus, CriticalAlert, DeviceAlertSnapshot};

/// Magnitude below which a numeric timestamp is read as epoch seconds.
const SECONDS_THRESHOLD: f64 = 1e11;

// ── Scalar helpers ─────────────────────────────────────────────────

/// Round and clamp a duration to whole non-negative minutes. Non-finite
/// input maps to zero.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::as_conversions)]
pub fn clamp_duration_minutes(raw: f64) -> u32 {
    if !raw.is_finite() {
        return 0;
    }
    // Float-to-int `as` saturates, so the clamp is exact at both ends.
    raw.round().clamp(0.0, f64::from(u32::MAX)) as u32
}

/// Non-negative integer count from a number or numeric string.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::as_conversions)]
pub(crate) fn value_as_count(value: &Value) -> Option<u32> {
    let n = value_as_f64(value)?;
    if !n.is_finite() || n < 0.0 {
        return None;
    }
    Some(n.round().min(f64::from(u32::MAX)) as u32)
}

/// Finite float from a number or numeric string.
pub(crate) fn value_as_f64(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    n.is_finite().then_some(n)
}

/// Non-empty text from a string or number.
pub(crate) fn value_as_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => {
            let s = s.trim();
            (!s.is_empty()).then(|| s.to_owned())
        }
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

// ── Timestamps ─────────────────────────────────────────────────────

/// Parse a timestamp from an ISO-8601 string, a numeric epoch (seconds or
/// milliseconds), or a digit-only string holding an epoch.
pub fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::Number(n) => n.as_f64().and_then(epoch_to_datetime),
        Value::String(s) => parse_timestamp_str(s),
        _ => None,
    }
}

fn parse_timestamp_str(raw: &str) -> Option<DateTime<Utc>> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    if s.bytes().all(|b| b.is_ascii_digit() || b == b'.') {
        return s.parse::<f64>().ok().and_then(epoch_to_datetime);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    // Offset-less timestamps are taken as UTC.
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Values below 1e11 in magnitude read as seconds first, larger ones as
/// milliseconds first; the other reading is tried if the first is out of
/// range.
fn epoch_to_datetime(n: f64) -> Option<DateTime<Utc>> {
    if !n.is_finite() {
        return None;
    }
    if n.abs() < SECONDS_THRESHOLD {
        from_epoch_seconds(n).or_else(|| from_epoch_millis(n))
    } else {
        from_epoch_millis(n).or_else(|| from_epoch_seconds(n))
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::as_conversions)]
fn from_epoch_seconds(n: f64) -> Option<DateTime<Utc>> {
    let secs = n.floor();
    let nanos = ((n - secs) * 1e9).round().min(999_999_999.0) as u32;
    DateTime::from_timestamp(secs as i64, nanos)
}

#[allow(clippy::cast_possible_truncation, clippy::as_conversions)]
fn from_epoch_millis(n: f64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp_millis(n.round() as i64)
}

// ── Critical alerts ────────────────────────────────────────────────

impl From<ApiCriticalAlert> for CriticalAlert {
    fn from(api: ApiCriticalAlert) -> Self {
        alert_from_api(api, None)
    }
}

/// Convert a REST alert, taking fields the response omits from `existing`.
///
/// Mutation responses are often partial (`{"id": .., "status": ..}`), so a
/// missing field must not blank out what the list already knows.
pub fn alert_from_api(api: ApiCriticalAlert, existing: Option<&CriticalAlert>) -> CriticalAlert {
    let description = api
        .text()
        .filter(|t| !t.is_empty())
        .map(str::to_owned)
        .or_else(|| existing.map(|e| e.description.clone()))
        .unwrap_or_default();
    let keep = |new: Option<String>, old: Option<&String>| {
        new.filter(|s| !s.is_empty())
            .or_else(|| old.cloned())
            .unwrap_or_default()
    };

    CriticalAlert {
        silo_name: keep(api.silo_name, existing.map(|e| &e.silo_name)),
        alert_type: keep(api.alert_type, existing.map(|e| &e.alert_type)),
        severity: api
            .severity
            .as_deref()
            .and_then(AlertSeverity::parse_lenient)
            .or(existing.map(|e| e.severity))
            .unwrap_or(AlertSeverity::Critical),
        detected_at: api
            .detected_at
            .as_ref()
            .and_then(parse_timestamp)
            .or(existing.map(|e| e.detected_at))
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH),
        duration_minutes: api
            .duration_minutes
            .as_ref()
            .and_then(value_as_f64)
            .map(clamp_duration_minutes)
            .or(existing.map(|e| e.duration_minutes))
            .unwrap_or_default(),
        status: api
            .status
            .as_deref()
            .and_then(AlertStatus::parse_lenient)
            .or(existing.map(|e| e.status))
            .unwrap_or_default(),
        description,
        recommended_action: keep(
            api.recommended_action,
            existing.map(|e| &e.recommended_action),
        ),
        id: api.id,
    }
}

/// Build a `CriticalAlert` from a live snapshot.
///
/// Fields absent from the snapshot come from `existing` (the list entry with
/// the same id), or defaults when there is none. `fallback_id` identifies
/// snapshots that carry no id of their own; `received_at` stands in for a
/// missing detection time on new alerts.
pub fn alert_from_snapshot(
    snapshot: &DeviceAlertSnapshot,
    fallback_id: &str,
    received_at: DateTime<Utc>,
    existing: Option<&CriticalAlert>,
) -> CriticalAlert {
    let id = snapshot
        .id
        .clone()
        .unwrap_or_else(|| fallback_id.to_owned());

    let text = |new: &Option<String>, old: Option<&String>| {
        new.clone()
            .or_else(|| old.cloned())
            .unwrap_or_default()
    };

    CriticalAlert {
        silo_name: text(&snapshot.silo_name, existing.map(|e| &e.silo_name)),
        alert_type: text(&snapshot.alert_type, existing.map(|e| &e.alert_type)),
        severity: snapshot
            .severity
            .or(existing.map(|e| e.severity))
            .unwrap_or(AlertSeverity::Critical),
        detected_at: snapshot
            .detected_at
            .or(existing.map(|e| e.detected_at))
            .unwrap_or(received_at),
        duration_minutes: snapshot
            .duration_minutes
            .or(existing.map(|e| e.duration_minutes))
            .unwrap_or_default(),
        status: snapshot
            .status
            .or(existing.map(|e| e.status))
            .unwrap_or_default(),
        description: text(&snapshot.message, existing.map(|e| &e.description)),
        recommended_action: text(
            &snapshot.recommended_action,
            existing.map(|e| &e.recommended_action),
        ),
        id,
    }
}
