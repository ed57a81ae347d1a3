//! Clap derive structures for the `silowatch` CLI.
//!
//! Defines the command tree, global flags, and shared value enums. This
//! file is also compiled by `build.rs` for man pages, so it may only depend
//! on clap and clap_complete.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// silowatch -- live silo telemetry and critical alert triage
#[derive(Debug, Parser)]
#[command(
    name = "silowatch",
    version,
    about = "Watch live silo telemetry and triage critical alerts",
    long_about = "Streams device updates from a grain-silo monitoring server,\n\
        folds them into a live view, and reconciles critical alerts with\n\
        the server's alert list so they can be acknowledged or resolved.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Server profile to use
    #[arg(long, short = 'p', env = "SILOWATCH_PROFILE", global = true)]
    pub profile: Option<String>,

    /// Monitoring server base URL (overrides profile)
    #[arg(long, env = "SILOWATCH_SERVER", global = true)]
    pub server: Option<String>,

    /// Device to monitor (overrides profile)
    #[arg(long, short = 'd', env = "SILOWATCH_DEVICE", global = true)]
    pub device: Option<String>,

    /// Bearer token (overrides keyring and profile)
    #[arg(long, env = "SILOWATCH_TOKEN", global = true, hide_env_values = true)]
    pub token: Option<String>,

    /// Push-stream transport (overrides profile)
    #[arg(long, env = "SILOWATCH_TRANSPORT", global = true)]
    pub transport: Option<TransportArg>,

    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "SILOWATCH_OUTPUT",
        default_value = "table",
        global = true
    )]
    pub output: OutputFormat,

    /// When to use color output
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorMode,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Accept self-signed TLS certificates
    #[arg(long, short = 'k', env = "SILOWATCH_INSECURE", global = true)]
    pub insecure: bool,

    /// Request timeout in seconds (overrides profile)
    #[arg(long, env = "SILOWATCH_TIMEOUT", global = true)]
    pub timeout: Option<u64>,

    /// Log line format on stderr
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,
}

// ── Value Enums ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
    /// YAML
    Yaml,
    /// Plain text, one value per line (scripting)
    Plain,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ColorMode {
    /// Auto-detect (color if terminal is interactive)
    Auto,
    /// Always emit color codes
    Always,
    /// Never emit color codes
    Never,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Human-readable lines
    Text,
    /// One JSON object per line
    Json,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TransportArg {
    /// Server-Sent Events
    Sse,
    /// WebSocket
    #[value(alias = "ws")]
    Websocket,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StatusArg {
    Active,
    Acknowledged,
    Resolved,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SeverityArg {
    Critical,
    Warning,
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Stream live updates for a device until interrupted
    #[command(alias = "w")]
    Watch(WatchArgs),

    /// List, acknowledge and resolve critical alerts
    #[command(alias = "a")]
    Alerts(AlertsArgs),

    /// Normalize a raw push-stream payload (offline)
    Normalize(NormalizeArgs),

    /// Manage CLI configuration
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ── Watch ────────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct WatchArgs {
    /// Also print the reconciled alert list whenever it changes
    #[arg(long)]
    pub alerts: bool,

    /// Do not poll the alert list in the background
    #[arg(long)]
    pub no_refresh: bool,
}

// ── Alerts ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct AlertsArgs {
    #[command(subcommand)]
    pub command: AlertsCommand,
}

#[derive(Debug, Subcommand)]
pub enum AlertsCommand {
    /// List the device's critical alerts
    #[command(alias = "ls")]
    List {
        /// Only alerts with this status
        #[arg(long)]
        status: Option<StatusArg>,

        /// Only alerts with this severity
        #[arg(long)]
        severity: Option<SeverityArg>,

        /// Only active or acknowledged alerts
        #[arg(long, conflicts_with = "status")]
        open: bool,
    },

    /// Acknowledge an alert
    #[command(alias = "acknowledge")]
    Ack {
        /// Alert ID
        id: String,

        /// Free-form note stored with the acknowledgement
        #[arg(long)]
        note: Option<String>,

        /// Who is acknowledging
        #[arg(long = "by")]
        by: Option<String>,
    },

    /// Resolve an alert
    Resolve {
        /// Alert ID
        id: String,

        /// Free-form note stored with the resolution
        #[arg(long)]
        note: Option<String>,

        /// Who resolved it
        #[arg(long = "by")]
        by: Option<String>,

        /// Resolution code understood by the server
        #[arg(long)]
        code: Option<String>,
    },
}

// ── Normalize ────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct NormalizeArgs {
    /// Payload file (reads stdin when omitted or "-")
    pub file: Option<PathBuf>,

    /// Transport-level event id used when the payload has none
    #[arg(long)]
    pub event_id: Option<String>,
}

// ── Config ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Create a profile with guided setup
    Init,

    /// Print the config file path
    Path,

    /// Show the current configuration (tokens redacted)
    Show,

    /// Store the active profile's token in the system keyring
    SetToken,

    /// List configured profiles
    Profiles,

    /// Set the default profile
    Use {
        /// Profile name
        name: String,
    },
}

// ── Completions ──────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}
