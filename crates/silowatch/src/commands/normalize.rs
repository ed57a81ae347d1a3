//! Offline normalizer: turn one raw push-stream payload into its strict
//! form without contacting a server.

use std::io::Read;
use std::path::Path;

use silowatch_core::NormalizedDeviceUpdate;

use crate::cli::{GlobalOpts, NormalizeArgs};
use crate::error::CliError;
use crate::output;

fn read_payload(file: Option<&Path>) -> Result<String, CliError> {
    match file {
        Some(path) if path != Path::new("-") => Ok(std::fs::read_to_string(path)?),
        _ => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf)?;
            Ok(buf)
        }
    }
}

fn or_dash<T: ToString>(value: Option<T>) -> String {
    value.map_or_else(|| "-".into(), |v| v.to_string())
}

pub(crate) fn summary(u: &NormalizedDeviceUpdate) -> String {
    let mut pairs = vec![
        ("ID", u.id.clone()),
        ("Device", u.device_id.clone()),
        ("Timestamp", u.timestamp.to_rfc3339()),
        ("Type", u.kind.to_string()),
    ];
    if let Some(reading) = u.reading {
        let sensors = reading.sensor_status.unwrap_or_default();
        pairs.push((
            "Sensors",
            format!(
                "{} total, {} online, {} offline",
                or_dash(sensors.total_sensors),
                or_dash(sensors.online),
                or_dash(sensors.offline)
            ),
        ));
        pairs.push(("Signal", or_dash(reading.average_signal_quality)));
        pairs.push(("Gateway", or_dash(reading.gateway_status)));
    }
    if let Some(gateway) = u.gateway {
        pairs.push(("Gateway", or_dash(gateway.status)));
        pairs.push(("Signal", or_dash(gateway.signal_quality)));
    }
    if let Some(ref alert) = u.alert {
        pairs.push(("Alert", or_dash(alert.id.as_deref())));
        pairs.push(("Severity", or_dash(alert.severity)));
        pairs.push(("Message", or_dash(alert.message.as_deref())));
    }
    output::detail_lines(&pairs)
}

pub fn handle(args: &NormalizeArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let raw = read_payload(args.file.as_deref())?;
    let update = silowatch_core::normalize(
        raw.trim(),
        global.device.as_deref(),
        args.event_id.as_deref(),
    );
    tracing::debug!(id = %update.id, kind = %update.kind, "normalized payload");

    let out = output::render_single(global.output, &update, summary, |u| u.id.clone())?;
    output::print_output(&out, global.quiet);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_lists_reading_fields() {
        let update = silowatch_core::normalize(
            r#"{"type":"reading","deviceId":"dev-3","sensorStatus":{"total":12,"online":11}}"#,
            None,
            Some("evt-1"),
        );
        let text = summary(&update);
        assert!(text.contains("Device: dev-3"), "{text}");
        assert!(text.contains("Sensors: 12 total, 11 online, - offline"), "{text}");
        assert!(text.contains("Type: reading"), "{text}");
    }
}
