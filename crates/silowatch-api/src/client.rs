// Async REST client for the device alert endpoints.
//
// Base URL: the monitoring server root (e.g. `https://monitor.example.com/api/`)
// Auth: optional `Authorization: Bearer` default header (see TransportConfig)

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

use crate::Error;
use crate::models::{
    AcknowledgeRequest, ApiCriticalAlert, ResolveRequest, unwrap_alert_list, unwrap_alert_object,
};
use crate::transport::TransportConfig;

// ── Error response shape ─────────────────────────────────────────────

#[derive(serde::Deserialize)]
struct ErrorResponse {
    #[serde(default, alias = "error", alias = "detail")]
    message: Option<String>,
    #[serde(default)]
    code: Option<String>,
}

// ── Client ───────────────────────────────────────────────────────────

/// Async client for the per-device REST surface.
///
/// Every operation is scoped to a device id passed by the caller; the client
/// itself holds no device state and is cheap to clone.
#[derive(Debug, Clone)]
pub struct DeviceClient {
    http: reqwest::Client,
    base_url: Url,
}

impl DeviceClient {
    // ── Constructors ─────────────────────────────────────────────────

    /// Build a client from a base URL and transport settings.
    pub fn new(base_url: &str, transport: &TransportConfig) -> Result<Self, Error> {
        let http = transport.build_client()?;
        Self::with_client(base_url, http)
    }

    /// Wrap an existing `reqwest::Client` (caller manages auth headers).
    pub fn with_client(base_url: &str, http: reqwest::Client) -> Result<Self, Error> {
        let mut url = Url::parse(base_url)?;
        if url.cannot_be_a_base() {
            return Err(Error::InvalidBaseUrl(base_url.to_owned()));
        }
        // Trailing slash so relative joins keep the last path segment.
        if !url.path().ends_with('/') {
            let path = format!("{}/", url.path());
            url.set_path(&path);
        }
        Ok(Self {
            http,
            base_url: url,
        })
    }

    /// The normalized base URL (always ends with `/`).
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    // ── URL builders ─────────────────────────────────────────────────

    /// Append percent-encoded segments to the base URL.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, Error> {
        let mut url = self.base_url.clone();
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|()| Error::InvalidBaseUrl(self.base_url.to_string()))?;
            path.pop_if_empty();
            path.extend(segments);
        }
        Ok(url)
    }

    /// `GET /devices/{id}/updates` as an HTTP(S) URL (SSE transport).
    pub fn updates_url(&self, device_id: &str) -> Result<Url, Error> {
        self.endpoint(&["devices", device_id, "updates"])
    }

    /// Same path as [`updates_url`](Self::updates_url) with a `ws`/`wss`
    /// scheme for the WebSocket transport.
    pub fn websocket_url(&self, device_id: &str) -> Result<Url, Error> {
        let mut url = self.updates_url(device_id)?;
        let scheme = match url.scheme() {
            "https" | "wss" => "wss",
            _ => "ws",
        };
        url.set_scheme(scheme)
            .map_err(|()| Error::InvalidBaseUrl(self.base_url.to_string()))?;
        Ok(url)
    }

    // ── HTTP verbs ───────────────────────────────────────────────────

    /// `GET` a path under the base URL and return the parsed JSON body.
    pub async fn get(&self, segments: &[&str]) -> Result<Value, Error> {
        let url = self.endpoint(segments)?;
        debug!("GET {url}");

        let resp = self.http.get(url).send().await?;
        Self::handle_response(resp).await
    }

    /// `PATCH` a JSON body and return the parsed response (`Null` when empty).
    pub async fn patch<B: Serialize + Sync>(
        &self,
        segments: &[&str],
        body: &B,
    ) -> Result<Value, Error> {
        let url = self.endpoint(segments)?;
        debug!("PATCH {url}");

        let resp = self.http.patch(url).json(body).send().await?;
        Self::handle_response(resp).await
    }

    /// `POST` a JSON body and return the parsed response (`Null` when empty).
    pub async fn post<B: Serialize + Sync>(
        &self,
        segments: &[&str],
        body: &B,
    ) -> Result<Value, Error> {
        let url = self.endpoint(segments)?;
        debug!("POST {url}");

        let resp = self.http.post(url).json(body).send().await?;
        Self::handle_response(resp).await
    }

    // ── Alert operations ─────────────────────────────────────────────

    /// Fetch the authoritative alert list for a device.
    ///
    /// Elements that cannot be read as an alert are skipped rather than
    /// failing the whole list.
    pub async fn list_alerts(&self, device_id: &str) -> Result<Vec<ApiCriticalAlert>, Error> {
        let body = self.get(&["devices", device_id, "alerts"]).await?;
        let items = unwrap_alert_list(body);
        let total = items.len();

        let alerts: Vec<ApiCriticalAlert> = items
            .into_iter()
            .filter_map(|item| match serde_json::from_value(item) {
                Ok(alert) => Some(alert),
                Err(e) => {
                    warn!(device_id, error = %e, "skipping malformed alert");
                    None
                }
            })
            .collect();

        debug!(device_id, total, kept = alerts.len(), "alert list fetched");
        Ok(alerts)
    }

    /// Acknowledge an alert. Returns the updated alert when the server sends
    /// one back.
    pub async fn acknowledge_alert(
        &self,
        device_id: &str,
        alert_id: &str,
        request: &AcknowledgeRequest,
    ) -> Result<Option<ApiCriticalAlert>, Error> {
        let body = self
            .patch(&["devices", device_id, "alerts", alert_id], request)
            .await?;
        Self::decode_alert(body)
    }

    /// Resolve an alert. Returns the updated alert when the server sends one
    /// back.
    pub async fn resolve_alert(
        &self,
        device_id: &str,
        alert_id: &str,
        request: &ResolveRequest,
    ) -> Result<Option<ApiCriticalAlert>, Error> {
        let body = self
            .post(&["devices", device_id, "alerts", alert_id, "resolve"], request)
            .await?;
        Self::decode_alert(body)
    }

    /// A mutation that succeeded but returned something other than an alert
    /// (e.g. `{"ok": true}`) counts as "no representation".
    fn decode_alert(body: Value) -> Result<Option<ApiCriticalAlert>, Error> {
        let Some(inner) = unwrap_alert_object(body) else {
            return Ok(None);
        };
        match serde_json::from_value(inner) {
            Ok(alert) => Ok(Some(alert)),
            Err(e) => {
                debug!(error = %e, "mutation response carried no alert");
                Ok(None)
            }
        }
    }

    // ── Response handling ────────────────────────────────────────────

    async fn handle_response(resp: reqwest::Response) -> Result<Value, Error> {
        let status = resp.status();
        if !status.is_success() {
            return Err(Self::parse_error(status, resp).await);
        }

        let body = resp.text().await?;
        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&body).map_err(|e| {
            let preview: String = body.chars().take(200).collect();
            Error::Deserialization {
                message: format!("{e} (body preview: {preview:?})"),
                body,
            }
        })
    }

    async fn parse_error(status: reqwest::StatusCode, resp: reqwest::Response) -> Error {
        let raw = resp.text().await.unwrap_or_default();
        let parsed = serde_json::from_str::<ErrorResponse>(&raw).ok();

        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN
        {
            return Error::Authentication {
                message: parsed
                    .and_then(|p| p.message)
                    .unwrap_or_else(|| status.to_string()),
            };
        }

        match parsed {
            Some(err) => Error::Api {
                status: status.as_u16(),
                message: err.message.unwrap_or_else(|| status.to_string()),
                code: err.code,
            },
            None => Error::Api {
                status: status.as_u16(),
                message: if raw.is_empty() { status.to_string() } else { raw },
                code: None,
            },
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn client(base: &str) -> DeviceClient {
        DeviceClient::with_client(base, reqwest::Client::new()).unwrap()
    }

    #[test]
    fn base_url_gains_trailing_slash() {
        let c = client("https://monitor.example.com/api");
        assert_eq!(c.base_url().as_str(), "https://monitor.example.com/api/");
    }

    #[test]
    fn endpoint_encodes_segments() {
        let c = client("https://monitor.example.com/api/");
        let url = c.endpoint(&["devices", "silo 7/a", "alerts"]).unwrap();
        assert_eq!(
            url.as_str(),
            "https://monitor.example.com/api/devices/silo%207%2Fa/alerts"
        );
    }

    #[test]
    fn websocket_url_swaps_scheme() {
        let c = client("https://monitor.example.com/");
        assert_eq!(
            c.websocket_url("d1").unwrap().as_str(),
            "wss://monitor.example.com/devices/d1/updates"
        );
        let c = client("http://localhost:8080");
        assert_eq!(
            c.websocket_url("d1").unwrap().as_str(),
            "ws://localhost:8080/devices/d1/updates"
        );
    }

    #[test]
    fn rejects_non_base_urls() {
        assert!(matches!(
            DeviceClient::with_client("mailto:ops@example.com", reqwest::Client::new()),
            Err(Error::InvalidBaseUrl(_))
        ));
    }
}
