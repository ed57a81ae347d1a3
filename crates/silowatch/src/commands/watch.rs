//! `silowatch watch`: follow a device's live feed until Ctrl-C.

use owo_colors::OwoColorize;

use silowatch_core::{
    AggregateState, AlertList, DeviceRegistry, DeviceSession, NormalizedDeviceUpdate,
    StreamState, StreamStatus, UpdateKind,
};

use crate::cli::{GlobalOpts, OutputFormat, WatchArgs};
use crate::config::Resolved;
use crate::error::CliError;
use crate::output;

use super::alerts::AlertRow;

// ── Update printing ─────────────────────────────────────────────────

/// Prints each update once, oldest first, across coalesced snapshots.
struct UpdatePrinter {
    format: OutputFormat,
    color: bool,
    quiet: bool,
    last_id: Option<String>,
}

impl UpdatePrinter {
    fn new(format: OutputFormat, color: bool, quiet: bool) -> Self {
        Self {
            format,
            color,
            quiet,
            last_id: None,
        }
    }

    /// Updates in `state` not printed yet, oldest first.
    fn unseen<'a>(&self, state: &'a AggregateState) -> Vec<&'a NormalizedDeviceUpdate> {
        let mut fresh: Vec<_> = state
            .updates
            .iter()
            .take_while(|u| Some(&u.id) != self.last_id.as_ref())
            .collect();
        fresh.reverse();
        fresh
    }

    fn print_new(&mut self, state: &AggregateState) -> Result<(), CliError> {
        for update in self.unseen(state) {
            let line = match self.format {
                OutputFormat::Table => one_line(update, self.color),
                OutputFormat::Json => serde_json::to_string_pretty(update)?,
                OutputFormat::JsonCompact => serde_json::to_string(update)?,
                OutputFormat::Yaml => format!("---\n{}", serde_yaml::to_string(update)?),
                OutputFormat::Plain => update.id.clone(),
            };
            output::print_output(&line, self.quiet);
        }
        if let Some(newest) = state.updates.front() {
            self.last_id = Some(newest.id.clone());
        }
        Ok(())
    }
}

fn one_line(u: &NormalizedDeviceUpdate, color: bool) -> String {
    let time = u.timestamp.format("%H:%M:%S").to_string();
    let label = u.kind.to_string();
    let kind = format!("{label:<7}");
    let kind = if color {
        match u.kind {
            UpdateKind::Alert => kind.red().bold().to_string(),
            UpdateKind::Gateway => kind.cyan().to_string(),
            UpdateKind::Reading => kind.green().to_string(),
            UpdateKind::Unknown => kind.dimmed().to_string(),
        }
    } else {
        kind
    };
    format!("{time} {kind} {}", describe(u, color))
}

fn describe(u: &NormalizedDeviceUpdate, color: bool) -> String {
    let mut parts = Vec::new();
    if let Some(reading) = u.reading {
        if let Some(sensors) = reading.sensor_status {
            match (sensors.online, sensors.total_sensors) {
                (Some(online), Some(total)) => parts.push(format!("sensors {online}/{total} online")),
                (None, Some(total)) => parts.push(format!("sensors {total}")),
                (Some(online), None) => parts.push(format!("{online} online")),
                (None, None) => {}
            }
            if let Some(battery) = sensors.battery_critical.filter(|b| *b > 0) {
                parts.push(format!("{battery} low battery"));
            }
        }
        if let Some(signal) = reading.average_signal_quality {
            parts.push(format!("signal {signal:.0}"));
        }
        if let Some(status) = reading.gateway_status {
            parts.push(format!("gateway {status}"));
        }
    }
    if let Some(gateway) = u.gateway {
        if let Some(status) = gateway.status {
            parts.push(format!("gateway {status}"));
        }
        if let Some(signal) = gateway.signal_quality {
            parts.push(format!("signal {signal:.0}"));
        }
    }
    if let Some(ref alert) = u.alert {
        let severity = alert
            .severity
            .map(|s| format!("[{}] ", output::paint_severity(s, color)))
            .unwrap_or_default();
        let silo = alert.silo_name.as_deref().map(|s| format!("{s}: ")).unwrap_or_default();
        parts.push(format!(
            "{severity}{silo}{}",
            alert.message.as_deref().unwrap_or("(no message)")
        ));
    }
    if parts.is_empty() {
        "-".into()
    } else {
        parts.join(", ")
    }
}

fn print_alerts(list: &AlertList, global: &GlobalOpts, color: bool) -> Result<(), CliError> {
    let alerts = list.to_vec();
    let out = output::render_list(
        global.output,
        &alerts,
        |a| AlertRow::new(a, color),
        |a| a.id.clone(),
    )?;
    if global.output == OutputFormat::Table && !global.quiet {
        eprintln!("── alerts ({}) ──", alerts.len());
    }
    output::print_output(&out, global.quiet);
    Ok(())
}

fn report_stream(state: &StreamState, quiet: bool) {
    if quiet {
        return;
    }
    match state.status {
        StreamStatus::Open => eprintln!("● stream open"),
        StreamStatus::ReconnectScheduled { delay } => eprintln!(
            "○ stream lost ({}), retrying in {}s",
            state.error.as_deref().unwrap_or("unknown error"),
            delay.as_secs()
        ),
        StreamStatus::Error => eprintln!(
            "✗ stream unavailable: {}",
            state.error.as_deref().unwrap_or("unknown error")
        ),
        StreamStatus::Idle | StreamStatus::Connecting | StreamStatus::Closed => {}
    }
}

// ── Handler ─────────────────────────────────────────────────────────

pub async fn handle(args: &WatchArgs, resolved: Resolved, global: &GlobalOpts) -> Result<(), CliError> {
    let device = resolved.require_device()?;
    let mut monitor = resolved.monitor;
    if args.no_refresh {
        monitor.alert_refresh_interval_secs = 0;
    }

    let registry = DeviceRegistry::new(monitor).await?;
    registry.set_active_device(Some(device.clone())).await;
    if !global.quiet {
        eprintln!("Watching {device} (Ctrl-C to stop)");
    }

    let result = follow(&registry.session(), args, global).await;
    registry.shutdown().await;
    result
}

async fn follow(
    session: &DeviceSession,
    args: &WatchArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let color = output::should_color(global.color);
    let mut printer = UpdatePrinter::new(global.output, color, global.quiet);
    let mut updates = session.aggregator().subscribe();
    let mut alerts = session.alerts().subscribe_alerts();
    let mut stream = session.connection().subscribe();
    let mut last_status = stream.current().status;

    printer.print_new(updates.current())?;

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => break,
            state = updates.changed() => {
                let Some(state) = state else { break };
                printer.print_new(&state)?;
            }
            list = alerts.changed(), if args.alerts => {
                let Some(list) = list else { break };
                print_alerts(&list, global, color)?;
            }
            state = stream.changed() => {
                let Some(state) = state else { break };
                if state.status != last_status {
                    last_status = state.status;
                    report_stream(&state, global.quiet);
                }
            }
        }
    }

    if !global.quiet {
        eprintln!("Stopped watching.");
    }
    Ok(())
}
