//! Shared configuration for silowatch.
//!
//! TOML profiles, token resolution (env + keyring + plaintext), and
//! translation to `silowatch_core::MonitorConfig`. The CLI layers its
//! flag overrides on top.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use silowatch_core::{MonitorConfig, StreamTransport, TlsVerification};

/// Keyring service name under which tokens are stored.
pub const KEYRING_SERVICE: &str = "silowatch";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("profile '{profile}' not found")]
    UnknownProfile { profile: String },

    #[error("keyring error: {0}")]
    Keyring(String),

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

impl From<keyring::Error> for ConfigError {
    fn from(err: keyring::Error) -> Self {
        Self::Keyring(err.to_string())
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Default profile name.
    pub default_profile: Option<String>,

    /// Global defaults.
    #[serde(default)]
    pub defaults: Defaults,

    /// Named server profiles.
    #[serde(default)]
    pub profiles: HashMap<String, Profile>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_profile: Some("default".into()),
            defaults: Defaults::default(),
            profiles: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Defaults {
    #[serde(default = "default_output")]
    pub output: String,

    #[serde(default = "default_color")]
    pub color: String,

    #[serde(default = "default_transport")]
    pub transport: String,

    #[serde(default)]
    pub insecure: bool,

    #[serde(default = "default_timeout")]
    pub timeout: u64,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            output: default_output(),
            color: default_color(),
            transport: default_transport(),
            insecure: false,
            timeout: default_timeout(),
        }
    }
}

fn default_output() -> String {
    "table".into()
}
fn default_color() -> String {
    "auto".into()
}
fn default_transport() -> String {
    "sse".into()
}
fn default_timeout() -> u64 {
    30
}

/// A named server profile.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Profile {
    /// Server base URL (e.g., "https://monitor.example.com/api").
    pub server: String,

    /// Device selected when none is given on the command line.
    pub device: Option<String>,

    /// Push transport: "sse" or "websocket". Falls back to the defaults.
    pub transport: Option<String>,

    /// Bearer token (plaintext; prefer keyring or env var).
    pub token: Option<String>,

    /// Environment variable name containing the token.
    pub token_env: Option<String>,

    /// Path to custom CA certificate.
    pub ca_cert: Option<PathBuf>,

    /// Override insecure TLS setting.
    pub insecure: Option<bool>,

    /// Override timeout (seconds).
    pub timeout: Option<u64>,

    /// Alert baseline re-poll interval (seconds, 0 = never).
    pub alert_refresh_secs: Option<u64>,

    /// Number of updates kept in the live history.
    pub history_capacity: Option<usize>,
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("com", "silowatch", "silowatch").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("silowatch");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from the canonical file + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load from `path`, then apply `SILOWATCH_*` overrides. Nested keys use a
/// double underscore (`SILOWATCH_DEFAULTS__TIMEOUT=10`).
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("SILOWATCH_").split("__"));

    let config: Config = figment.extract()?;
    Ok(config)
}

/// Load config, returning a default if the file doesn't exist.
pub fn load_config_or_default() -> Config {
    load_config().unwrap_or_default()
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write to the canonical config path.
pub fn save_config(cfg: &Config) -> Result<(), ConfigError> {
    save_config_to(cfg, &config_path())
}

pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

// ── Token resolution ────────────────────────────────────────────────

fn keyring_entry(profile_name: &str) -> Result<keyring::Entry, ConfigError> {
    Ok(keyring::Entry::new(
        KEYRING_SERVICE,
        &format!("{profile_name}/token"),
    )?)
}

/// Resolve the bearer token from the credential chain: `token_env`, then
/// the system keyring, then plaintext. A server without auth needs none, so
/// an empty chain is `None`, not an error.
pub fn resolve_token(profile: &Profile, profile_name: &str) -> Option<SecretString> {
    // 1. Profile's token_env → env var lookup
    if let Some(ref env_name) = profile.token_env {
        if let Ok(val) = std::env::var(env_name) {
            return Some(SecretString::from(val));
        }
    }

    // 2. System keyring
    if let Ok(entry) = keyring_entry(profile_name) {
        if let Ok(secret) = entry.get_password() {
            return Some(SecretString::from(secret));
        }
    }

    // 3. Plaintext in config
    profile.token.clone().map(SecretString::from)
}

/// Store a profile's token in the system keyring.
pub fn store_token(profile_name: &str, token: &SecretString) -> Result<(), ConfigError> {
    keyring_entry(profile_name)?.set_password(token.expose_secret())?;
    Ok(())
}

// ── Translation to MonitorConfig ────────────────────────────────────

pub fn parse_transport(raw: &str) -> Result<StreamTransport, ConfigError> {
    StreamTransport::from_str(raw).map_err(|_| ConfigError::Validation {
        field: "transport".into(),
        reason: format!("expected 'sse' or 'websocket', got '{raw}'"),
    })
}

/// Build a `MonitorConfig` from a profile, resolving its token.
pub fn profile_to_monitor_config(
    profile: &Profile,
    profile_name: &str,
    defaults: &Defaults,
) -> Result<MonitorConfig, ConfigError> {
    let token = resolve_token(profile, profile_name);
    build_monitor_config(profile, defaults, token)
}

/// Build a `MonitorConfig` from a profile and an already-resolved token.
pub fn build_monitor_config(
    profile: &Profile,
    defaults: &Defaults,
    token: Option<SecretString>,
) -> Result<MonitorConfig, ConfigError> {
    let url: url::Url = profile
        .server
        .parse()
        .map_err(|_| ConfigError::Validation {
            field: "server".into(),
            reason: format!("invalid URL: {}", profile.server),
        })?;

    let mut config = MonitorConfig::new(url);
    config.token = token;
    config.tls = if profile.insecure.unwrap_or(defaults.insecure) {
        TlsVerification::DangerAcceptInvalid
    } else if let Some(ref ca_path) = profile.ca_cert {
        TlsVerification::CustomCa(ca_path.clone())
    } else {
        TlsVerification::SystemDefaults
    };
    config.timeout = Duration::from_secs(profile.timeout.unwrap_or(defaults.timeout));
    config.transport = parse_transport(
        profile
            .transport
            .as_deref()
            .unwrap_or(&defaults.transport),
    )?;
    if let Some(secs) = profile.alert_refresh_secs {
        config.alert_refresh_interval_secs = secs;
    }
    if let Some(capacity) = profile.history_capacity {
        if capacity == 0 {
            return Err(ConfigError::Validation {
                field: "history_capacity".into(),
                reason: "must be at least 1".into(),
            });
        }
        config.history_capacity = capacity;
    }
    Ok(config)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    const SAMPLE: &str = r#"
default_profile = "farm"

[defaults]
output = "json"
timeout = 12

[profiles.farm]
server = "https://monitor.example.com/api"
device = "silo-gw-01"
transport = "ws"
token = "plain-token"
alert_refresh_secs = 120
history_capacity = 80

[profiles.lab]
server = "http://10.0.0.5:8080"
insecure = true
"#;

    fn write_sample() -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, SAMPLE).unwrap();
        (dir, path)
    }

    #[test]
    fn loads_profiles_and_defaults() {
        let (_dir, path) = write_sample();
        let cfg = load_config_from(&path).unwrap();

        assert_eq!(cfg.default_profile.as_deref(), Some("farm"));
        assert_eq!(cfg.defaults.output, "json");
        assert_eq!(cfg.defaults.timeout, 12);
        assert_eq!(cfg.defaults.color, "auto");

        let farm = &cfg.profiles["farm"];
        assert_eq!(farm.device.as_deref(), Some("silo-gw-01"));
        assert_eq!(farm.alert_refresh_secs, Some(120));
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = load_config_from(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(cfg.default_profile.as_deref(), Some("default"));
        assert!(cfg.profiles.is_empty());
    }

    #[test]
    fn profile_translates_to_monitor_config() {
        let (_dir, path) = write_sample();
        let cfg = load_config_from(&path).unwrap();

        let farm = build_monitor_config(&cfg.profiles["farm"], &cfg.defaults, None).unwrap();
        assert_eq!(farm.url.as_str(), "https://monitor.example.com/api");
        assert_eq!(farm.transport, StreamTransport::WebSocket);
        assert_eq!(farm.timeout, Duration::from_secs(12));
        assert_eq!(farm.alert_refresh_interval_secs, 120);
        assert_eq!(farm.history_capacity, 80);
        assert_eq!(farm.tls, TlsVerification::SystemDefaults);

        let lab = build_monitor_config(&cfg.profiles["lab"], &cfg.defaults, None).unwrap();
        assert_eq!(lab.tls, TlsVerification::DangerAcceptInvalid);
        assert_eq!(lab.transport, StreamTransport::Sse);
        assert_eq!(lab.alert_refresh_interval_secs, 60);
    }

    #[test]
    fn invalid_values_are_rejected() {
        let defaults = Defaults::default();
        let bad_url = Profile {
            server: "not a url".into(),
            ..Default::default()
        };
        assert!(matches!(
            build_monitor_config(&bad_url, &defaults, None),
            Err(ConfigError::Validation { ref field, .. }) if field == "server"
        ));

        let bad_transport = Profile {
            server: "https://x.example".into(),
            transport: Some("carrier-pigeon".into()),
            ..Default::default()
        };
        assert!(matches!(
            build_monitor_config(&bad_transport, &defaults, None),
            Err(ConfigError::Validation { ref field, .. }) if field == "transport"
        ));
    }

    #[test]
    fn save_round_trips_through_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let mut cfg = Config::default();
        cfg.profiles.insert(
            "default".into(),
            Profile {
                server: "https://monitor.example.com".into(),
                device: Some("dev-9".into()),
                ..Default::default()
            },
        );
        save_config_to(&cfg, &path).unwrap();

        let loaded = load_config_from(&path).unwrap();
        assert_eq!(
            loaded.profiles["default"].device.as_deref(),
            Some("dev-9")
        );
    }
}
