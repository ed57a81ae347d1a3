// Wire types for the device REST endpoints.
//
// Field names vary between server versions, so every field accepts both the
// camelCase and snake_case spellings. Values stay loosely typed here; the core
// crate validates them into its domain model.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// A critical alert as returned by `GET /devices/{id}/alerts` and the
/// acknowledge/resolve mutations.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiCriticalAlert {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(default, alias = "silo_name", alias = "silo")]
    pub silo_name: Option<String>,
    #[serde(default, alias = "alert_type", alias = "type")]
    pub alert_type: Option<String>,
    #[serde(default)]
    pub severity: Option<String>,
    /// ISO-8601 string or epoch seconds/milliseconds.
    #[serde(default, alias = "detected_at", alias = "createdAt", alias = "created_at")]
    pub detected_at: Option<Value>,
    /// Number or numeric string.
    #[serde(default, alias = "duration_minutes")]
    pub duration_minutes: Option<Value>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    /// Older servers send the alert text as `message`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, alias = "recommended_action")]
    pub recommended_action: Option<String>,
}

impl ApiCriticalAlert {
    /// Alert text, preferring a non-empty `description` over `message`.
    pub fn text(&self) -> Option<&str> {
        self.description
            .as_deref()
            .filter(|d| !d.is_empty())
            .or(self.message.as_deref())
    }
}

/// Body for `PATCH /devices/{id}/alerts/{alertId}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AcknowledgeRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub acknowledged_by: Option<String>,
}

/// Body for `POST /devices/{id}/alerts/{alertId}/resolve`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_by: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolution_code: Option<String>,
}

/// Pull the alert array out of a list response.
///
/// Accepts a bare array or an object holding it under `alerts`, `data` or
/// `results`. Anything else yields an empty list.
pub fn unwrap_alert_list(body: Value) -> Vec<Value> {
    match body {
        Value::Array(items) => items,
        Value::Object(mut map) => ["alerts", "data", "results"]
            .iter()
            .find_map(|key| match map.remove(*key) {
                Some(Value::Array(items)) => Some(items),
                _ => None,
            })
            .unwrap_or_default(),
        _ => Vec::new(),
    }
}

/// Pull the alert object out of a mutation response (bare, or wrapped under
/// `alert` / `data`). `Null` means the server returned no representation.
pub fn unwrap_alert_object(body: Value) -> Option<Value> {
    match body {
        Value::Null => None,
        Value::Object(mut map) => {
            for key in ["alert", "data"] {
                if let Some(inner @ Value::Object(_)) = map.remove(key) {
                    return Some(inner);
                }
            }
            Some(Value::Object(map))
        }
        other => Some(other),
    }
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        Text(String),
        Int(i64),
        Float(f64),
    }

    Ok(match Id::deserialize(deserializer)? {
        Id::Text(s) => s,
        Id::Int(n) => n.to_string(),
        Id::Float(f) => f.to_string(),
    })
}
