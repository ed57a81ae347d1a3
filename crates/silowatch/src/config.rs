//! CLI configuration: a thin layer over `silowatch_config`.
//!
//! Adds resolution that respects `GlobalOpts` flag overrides (--server,
//! --token, --device, ...) on top of the selected profile.

use secrecy::SecretString;

use silowatch_core::MonitorConfig;

use crate::cli::{GlobalOpts, TransportArg};
use crate::error::CliError;

// ── Re-exports from shared crate ────────────────────────────────────

pub use silowatch_config::{
    Config, Profile, config_path, load_config_or_default, save_config, store_token,
};

/// Everything a device command needs to talk to the server.
#[derive(Debug)]
pub struct Resolved {
    pub profile_name: String,
    pub monitor: MonitorConfig,
    pub device: Option<String>,
}

impl Resolved {
    /// The device to operate on, or a usage error when none is configured.
    pub fn require_device(&self) -> Result<String, CliError> {
        self.device.clone().ok_or(CliError::NoDevice)
    }
}

/// Resolve the active profile name from CLI flags and config.
pub fn active_profile_name(global: &GlobalOpts, config: &Config) -> String {
    global
        .profile
        .clone()
        .or_else(|| config.default_profile.clone())
        .unwrap_or_else(|| "default".into())
}

/// Build a `MonitorConfig` from the config file, the active profile and CLI
/// overrides. Flags win over profile values.
pub fn resolve(global: &GlobalOpts) -> Result<Resolved, CliError> {
    resolve_with(global, &load_config_or_default())
}

pub fn resolve_with(global: &GlobalOpts, cfg: &Config) -> Result<Resolved, CliError> {
    let profile_name = active_profile_name(global, cfg);

    let mut profile = match cfg.profiles.get(&profile_name) {
        Some(profile) => profile.clone(),
        // An explicitly named profile must exist.
        None if global.profile.is_some() => {
            return Err(CliError::ProfileNotFound {
                name: profile_name,
                available: available_profiles(cfg),
            });
        }
        None => Profile::default(),
    };

    if let Some(ref server) = global.server {
        profile.server.clone_from(server);
    }
    if profile.server.is_empty() {
        return Err(CliError::NoConfig {
            path: config_path().display().to_string(),
        });
    }
    if let Some(transport) = global.transport {
        profile.transport = Some(transport_name(transport).into());
    }
    if global.insecure {
        profile.insecure = Some(true);
    }
    if let Some(timeout) = global.timeout {
        profile.timeout = Some(timeout);
    }

    let token = match global.token {
        Some(ref token) => Some(SecretString::from(token.clone())),
        None => silowatch_config::resolve_token(&profile, &profile_name),
    };
    let monitor = silowatch_config::build_monitor_config(&profile, &cfg.defaults, token)?;

    let device = global
        .device
        .clone()
        .or_else(|| profile.device.clone())
        .filter(|d| !d.trim().is_empty());

    Ok(Resolved {
        profile_name,
        monitor,
        device,
    })
}

pub fn available_profiles(cfg: &Config) -> String {
    if cfg.profiles.is_empty() {
        return "(none)".into();
    }
    let mut names: Vec<_> = cfg.profiles.keys().cloned().collect();
    names.sort();
    names.join(", ")
}

fn transport_name(arg: TransportArg) -> &'static str {
    match arg {
        TransportArg::Sse => "sse",
        TransportArg::Websocket => "websocket",
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use clap::Parser;
    use silowatch_core::{StreamTransport, TlsVerification};

    use super::*;
    use crate::cli::Cli;

    fn global(args: &[&str]) -> GlobalOpts {
        let mut argv = vec!["silowatch"];
        argv.extend_from_slice(args);
        argv.push("config");
        argv.push("path");
        Cli::try_parse_from(argv).unwrap().global
    }

    fn farm_config() -> Config {
        let mut cfg = Config {
            default_profile: Some("farm".into()),
            ..Config::default()
        };
        cfg.profiles.insert(
            "farm".into(),
            Profile {
                server: "https://monitor.example.com/api".into(),
                device: Some("silo-gw-01".into()),
                token: Some("from-profile".into()),
                ..Profile::default()
            },
        );
        cfg
    }

    #[test]
    fn flags_override_profile() {
        let g = global(&[
            "--server",
            "http://10.0.0.9:8080",
            "--device",
            "dev-7",
            "--transport",
            "ws",
            "-k",
            "--timeout",
            "3",
        ]);
        let resolved = resolve_with(&g, &farm_config()).unwrap();

        assert_eq!(resolved.profile_name, "farm");
        assert_eq!(resolved.monitor.url.as_str(), "http://10.0.0.9:8080/");
        assert_eq!(resolved.monitor.transport, StreamTransport::WebSocket);
        assert_eq!(resolved.monitor.tls, TlsVerification::DangerAcceptInvalid);
        assert_eq!(resolved.monitor.timeout.as_secs(), 3);
        assert_eq!(resolved.require_device().unwrap(), "dev-7");
    }

    #[test]
    fn profile_supplies_device() {
        let resolved = resolve_with(&global(&[]), &farm_config()).unwrap();
        assert_eq!(resolved.device.as_deref(), Some("silo-gw-01"));
        assert!(resolved.monitor.token.is_some());
    }

    #[test]
    fn missing_server_and_profile_are_usage_errors() {
        let err = resolve_with(&global(&[]), &Config::default()).unwrap_err();
        assert!(matches!(err, CliError::NoConfig { .. }));

        let err = resolve_with(&global(&["-p", "nope"]), &farm_config()).unwrap_err();
        assert!(matches!(err, CliError::ProfileNotFound { ref available, .. } if available == "farm"));
    }

    #[test]
    fn blank_device_counts_as_none() {
        let g = global(&["--server", "http://localhost:1", "-d", "  "]);
        let resolved = resolve_with(&g, &Config::default()).unwrap();
        assert!(matches!(resolved.require_device(), Err(CliError::NoDevice)));
    }
}
