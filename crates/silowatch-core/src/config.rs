// ── Runtime monitor configuration ──
//
// These types describe *how* to reach the monitoring server and how the
// engine behaves once a device is active. They carry credential data and
// tuning, but never touch disk. The CLI constructs a `MonitorConfig` and
// hands it in.

use std::time::Duration;

use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use silowatch_api::stream::ReconnectConfig;
use silowatch_api::{TlsMode, TransportConfig};
use url::Url;

use crate::error::CoreError;

/// TLS verification strategy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TlsVerification {
    /// System CA store (strict).
    #[default]
    SystemDefaults,
    /// Custom CA certificate file.
    CustomCa(std::path::PathBuf),
    /// Skip verification (self-signed lab servers).
    DangerAcceptInvalid,
}

/// Push-stream transport used for `/devices/{id}/updates`.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum StreamTransport {
    /// Server-Sent Events over HTTP(S).
    #[default]
    Sse,
    /// WebSocket (`ws`/`wss`).
    #[strum(serialize = "websocket", serialize = "ws")]
    #[serde(alias = "ws")]
    WebSocket,
}

/// Configuration for monitoring devices on a single server.
///
/// Built by the CLI, passed to `DeviceRegistry`; core never reads config
/// files.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Server base URL (e.g., `https://monitor.example.com/api/`).
    pub url: Url,
    /// Bearer token, if the server requires one.
    pub token: Option<SecretString>,
    /// TLS verification strategy.
    pub tls: TlsVerification,
    /// REST request timeout (also bounds stream connection setup).
    pub timeout: Duration,
    /// Push-stream transport.
    pub transport: StreamTransport,
    /// Open the live update stream when a device becomes active.
    pub stream_enabled: bool,
    /// Reconnect backoff for the update stream.
    pub reconnect: ReconnectConfig,
    /// Maximum number of updates kept in the aggregate history.
    pub history_capacity: usize,
    /// How long per-alert action feedback stays visible.
    pub feedback_ttl: Duration,
    /// How often to re-poll the alert baseline (seconds). 0 = never.
    pub alert_refresh_interval_secs: u64,
    /// Load the alert baseline in the background when a device becomes
    /// active.
    pub fetch_alerts_on_activate: bool,
}

impl MonitorConfig {
    pub fn new(url: Url) -> Self {
        Self {
            url,
            token: None,
            tls: TlsVerification::default(),
            timeout: Duration::from_secs(30),
            transport: StreamTransport::default(),
            stream_enabled: true,
            reconnect: ReconnectConfig::default(),
            history_capacity: crate::store::DEFAULT_HISTORY_CAPACITY,
            feedback_ttl: Duration::from_secs(5),
            alert_refresh_interval_secs: 60,
            fetch_alerts_on_activate: true,
        }
    }

    /// Parse `url` and apply defaults.
    pub fn from_url(url: &str) -> Result<Self, CoreError> {
        let url = Url::parse(url).map_err(|e| CoreError::Config {
            message: format!("invalid server URL '{url}': {e}"),
        })?;
        Ok(Self::new(url))
    }

    pub(crate) fn transport_config(&self) -> TransportConfig {
        let tls = match &self.tls {
            TlsVerification::SystemDefaults => TlsMode::System,
            TlsVerification::CustomCa(path) => TlsMode::CustomCa(path.clone()),
            TlsVerification::DangerAcceptInvalid => TlsMode::DangerAcceptInvalid,
        };
        TransportConfig {
            tls,
            timeout: self.timeout,
            token: self.token.clone(),
        }
    }
}
