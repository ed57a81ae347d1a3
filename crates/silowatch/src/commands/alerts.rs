//! Critical alert command handlers.
//!
//! Each command runs against a one-shot device session: no live stream,
//! no background polling.

use tabled::Tabled;

use silowatch_core::{
    AcknowledgeRequest, ActionFeedback, AlertFilter, AlertSeverity, AlertStatus, CoreError,
    CriticalAlert, DeviceRegistry, ResolveRequest,
};

use crate::cli::{AlertsArgs, AlertsCommand, GlobalOpts, SeverityArg, StatusArg};
use crate::config::Resolved;
use crate::error::CliError;
use crate::output;

// ── Table row ───────────────────────────────────────────────────────

#[derive(Tabled)]
pub(crate) struct AlertRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Silo")]
    silo: String,
    #[tabled(rename = "Type")]
    alert_type: String,
    #[tabled(rename = "Severity")]
    severity: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Detected")]
    detected: String,
    #[tabled(rename = "Duration")]
    duration: String,
}

impl AlertRow {
    pub(crate) fn new(a: &CriticalAlert, color: bool) -> Self {
        Self {
            id: a.id.clone(),
            silo: a.silo_name.clone(),
            alert_type: a.alert_type.clone(),
            severity: output::paint_severity(a.severity, color),
            status: output::paint_status(a.status, color),
            detected: a.detected_at.format("%Y-%m-%d %H:%M:%S").to_string(),
            duration: format!("{}m", a.duration_minutes),
        }
    }
}

fn dash(s: &str) -> String {
    if s.is_empty() { "-".into() } else { s.to_owned() }
}

fn detail(a: &CriticalAlert, color: bool) -> String {
    output::detail_lines(&[
        ("ID", a.id.clone()),
        ("Silo", dash(&a.silo_name)),
        ("Type", dash(&a.alert_type)),
        ("Severity", output::paint_severity(a.severity, color)),
        ("Status", output::paint_status(a.status, color)),
        ("Detected", a.detected_at.to_rfc3339()),
        ("Duration", format!("{} min", a.duration_minutes)),
        ("Description", dash(&a.description)),
        ("Action", dash(&a.recommended_action)),
    ])
}

// ── Arg mapping ─────────────────────────────────────────────────────

fn status_of(arg: StatusArg) -> AlertStatus {
    match arg {
        StatusArg::Active => AlertStatus::Active,
        StatusArg::Acknowledged => AlertStatus::Acknowledged,
        StatusArg::Resolved => AlertStatus::Resolved,
    }
}

fn severity_of(arg: SeverityArg) -> AlertSeverity {
    match arg {
        SeverityArg::Critical => AlertSeverity::Critical,
        SeverityArg::Warning => AlertSeverity::Warning,
    }
}

/// Filters implied by the list flags, applied in order.
fn list_filters(
    status: Option<StatusArg>,
    severity: Option<SeverityArg>,
    open: bool,
) -> Vec<AlertFilter> {
    let mut filters = Vec::new();
    if open {
        filters.push(AlertFilter::Open);
    }
    if let Some(s) = status {
        filters.push(AlertFilter::ByStatus(status_of(s)));
    }
    if let Some(s) = severity {
        filters.push(AlertFilter::BySeverity(severity_of(s)));
    }
    filters
}

// ── Handler ─────────────────────────────────────────────────────────

pub async fn handle(args: AlertsArgs, resolved: Resolved, global: &GlobalOpts) -> Result<(), CliError> {
    let device = resolved.require_device()?;
    let color = output::should_color(global.color);

    match args.command {
        AlertsCommand::List {
            status,
            severity,
            open,
        } => {
            let list = DeviceRegistry::oneshot(resolved.monitor, &device, |session| async move {
                session.alerts().refetch().await?;
                Ok::<_, CoreError>(session.alerts().alerts())
            })
            .await?;

            let mut shown: Vec<&CriticalAlert> = list.iter().collect();
            for filter in list_filters(status, severity, open) {
                shown = filter.apply(shown);
            }

            let out = output::render_list(
                global.output,
                &shown,
                |a| AlertRow::new(a, color),
                |a| a.id.clone(),
            )?;
            output::print_output(&out, global.quiet);
            Ok(())
        }

        AlertsCommand::Ack { id, note, by } => {
            let request = AcknowledgeRequest {
                note,
                acknowledged_by: by,
            };
            let alert_id = id.clone();
            let (feedback, alert) =
                DeviceRegistry::oneshot(resolved.monitor, &device, |session| async move {
                    let feedback = session.alerts().acknowledge_alert_id(&id, request).await;
                    Ok::<_, CoreError>((feedback, session.alerts().alerts().get(&id).cloned()))
                })
                .await?;
            report("Acknowledge", &alert_id, &feedback, alert.as_ref(), color, global)
        }

        AlertsCommand::Resolve { id, note, by, code } => {
            let request = ResolveRequest {
                note,
                resolved_by: by,
                resolution_code: code,
            };
            let alert_id = id.clone();
            let (feedback, alert) =
                DeviceRegistry::oneshot(resolved.monitor, &device, |session| async move {
                    let feedback = session.alerts().resolve_alert_id(&id, request).await;
                    Ok::<_, CoreError>((feedback, session.alerts().alerts().get(&id).cloned()))
                })
                .await?;
            report("Resolve", &alert_id, &feedback, alert.as_ref(), color, global)
        }
    }
}

/// Print the action feedback, and the updated alert when the server sent
/// one back.
fn report(
    action: &str,
    alert_id: &str,
    feedback: &ActionFeedback,
    alert: Option<&CriticalAlert>,
    color: bool,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    if feedback.is_error() {
        return Err(CliError::ActionFailed {
            action: action.into(),
            alert_id: alert_id.into(),
            message: feedback.message.clone(),
        });
    }

    if !global.quiet {
        eprintln!("✓ {}", feedback.message);
    }
    if let Some(alert) = alert {
        let out = output::render_single(
            global.output,
            alert,
            |a| detail(a, color),
            |a| a.id.clone(),
        )?;
        output::print_output(&out, global.quiet);
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;

    fn alert(id: &str, severity: AlertSeverity, status: AlertStatus) -> CriticalAlert {
        CriticalAlert {
            id: id.into(),
            silo_name: "Silo 2".into(),
            alert_type: "temperature".into(),
            severity,
            detected_at: Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap(),
            duration_minutes: 12,
            status,
            description: String::new(),
            recommended_action: "Aerate".into(),
        }
    }

    #[test]
    fn list_flags_compose() {
        let alerts = [
            alert("a", AlertSeverity::Critical, AlertStatus::Active),
            alert("b", AlertSeverity::Warning, AlertStatus::Active),
            alert("c", AlertSeverity::Critical, AlertStatus::Resolved),
        ];
        let mut shown: Vec<&CriticalAlert> = alerts.iter().collect();
        for filter in list_filters(None, Some(SeverityArg::Critical), true) {
            shown = filter.apply(shown);
        }
        let ids: Vec<&str> = shown.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, ["a"]);
    }

    #[test]
    fn detail_marks_missing_text() {
        let text = detail(&alert("a", AlertSeverity::Critical, AlertStatus::Active), false);
        assert!(text.contains("Description: -"));
        assert!(text.contains("     Action: Aerate"));
        assert!(text.contains("Detected: 2024-03-01T10:00:00+00:00"));
    }
}
