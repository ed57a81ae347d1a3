//! Command dispatch: bridges CLI args -> core sessions -> output formatting.

pub mod alerts;
pub mod config_cmd;
pub mod normalize;
pub mod watch;

use crate::cli::{Command, GlobalOpts};
use crate::config::Resolved;
use crate::error::CliError;

/// Dispatch a server-bound command to its handler.
pub async fn dispatch(cmd: Command, resolved: Resolved, global: &GlobalOpts) -> Result<(), CliError> {
    match cmd {
        Command::Watch(args) => watch::handle(&args, resolved, global).await,
        Command::Alerts(args) => alerts::handle(args, resolved, global).await,
        // Handled before a server config is resolved
        Command::Normalize(_) | Command::Config(_) | Command::Completions(_) => {
            Err(CliError::Internal(format!("{cmd:?} does not need a server")))
        }
    }
}
