//! Integration tests for the `silowatch` CLI binary.
//!
//! Argument parsing, local commands, and the one-shot alert commands
//! against a wiremock server. Nothing touches the user's configuration.
#![allow(clippy::unwrap_used)]

use std::io::Write;

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

// ── Helpers ─────────────────────────────────────────────────────────

/// Build a [`Command`] for the `silowatch` binary with env isolation.
///
/// Clears all `SILOWATCH_*` env vars and points config directories at a
/// nonexistent path so tests never touch the user's real configuration.
fn silowatch_cmd() -> assert_cmd::Command {
    let mut cmd = cargo_bin_cmd!("silowatch");
    cmd.env("HOME", "/tmp/silowatch-cli-test-nonexistent")
        .env("XDG_CONFIG_HOME", "/tmp/silowatch-cli-test-nonexistent")
        .env_remove("SILOWATCH_PROFILE")
        .env_remove("SILOWATCH_SERVER")
        .env_remove("SILOWATCH_DEVICE")
        .env_remove("SILOWATCH_TOKEN")
        .env_remove("SILOWATCH_TRANSPORT")
        .env_remove("SILOWATCH_OUTPUT")
        .env_remove("SILOWATCH_INSECURE")
        .env_remove("SILOWATCH_TIMEOUT")
        .env_remove("RUST_LOG");
    cmd
}

/// Concatenate stdout + stderr from a command output for flexible matching.
fn combined_output(output: &std::process::Output) -> String {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    format!("{stdout}{stderr}")
}

/// `silowatch` pointed at `server` for device `dev-1`.
fn against(server: &MockServer) -> assert_cmd::Command {
    let mut cmd = silowatch_cmd();
    cmd.args(["--server", &server.uri(), "-d", "dev-1", "--token", "t0ken"]);
    cmd
}

fn alert_json(id: &str, severity: &str, status: &str) -> serde_json::Value {
    json!({
        "id": id,
        "siloName": "Silo 4",
        "alertType": "temperature",
        "severity": severity,
        "detectedAt": "2024-03-01T10:00:00Z",
        "durationMinutes": 15,
        "status": status,
        "message": "Core temperature rising"
    })
}

// ── Basic invocation ────────────────────────────────────────────────

#[test]
fn test_no_args_shows_help() {
    let output = silowatch_cmd().output().unwrap();
    assert_eq!(output.status.code(), Some(2), "Expected exit code 2");
    let text = combined_output(&output);
    assert!(text.contains("Usage"), "Expected 'Usage' in output:\n{text}");
}

#[test]
fn test_help_flag() {
    silowatch_cmd().arg("--help").assert().success().stdout(
        predicate::str::contains("critical alerts")
            .and(predicate::str::contains("watch"))
            .and(predicate::str::contains("alerts"))
            .and(predicate::str::contains("normalize")),
    );
}

#[test]
fn test_version_flag() {
    silowatch_cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("silowatch"));
}

#[test]
fn test_completions_bash() {
    silowatch_cmd()
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("silowatch"));
}

#[test]
fn test_invalid_output_format_is_usage_error() {
    let output = silowatch_cmd()
        .args(["-o", "xml", "config", "path"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(2));
}

// ── Local commands ──────────────────────────────────────────────────

#[test]
fn test_config_path() {
    silowatch_cmd()
        .args(["config", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains("config.toml"));
}

#[test]
fn test_normalize_from_stdin() {
    let output = silowatch_cmd()
        .args(["normalize", "-d", "dev-9", "--event-id", "evt-7", "-o", "json-compact"])
        .write_stdin(r#"{"type":"reading","sensorStatus":{"total":10,"online":9}}"#)
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", combined_output(&output));

    let update: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(update["id"], "evt-7");
    assert_eq!(update["deviceId"], "dev-9");
    assert_eq!(update["type"], "reading");
    assert_eq!(update["reading"]["sensorStatus"]["totalSensors"], 10);
}

#[test]
fn test_normalize_garbage_file_is_unknown() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, "definitely not json").unwrap();

    silowatch_cmd()
        .arg("normalize")
        .arg(file.path())
        .args(["-o", "json-compact"])
        .assert()
        .success()
        .stdout(
            predicate::str::contains(r#""type":"unknown""#)
                .and(predicate::str::contains(r#""deviceId":"unknown-device""#)),
        );
}

// ── Configuration errors ────────────────────────────────────────────

#[test]
fn test_alerts_without_server_is_usage_error() {
    let output = silowatch_cmd()
        .args(["alerts", "list", "-d", "dev-1"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(2));
    assert!(combined_output(&output).contains("No server configured"));
}

#[test]
fn test_alerts_without_device_is_usage_error() {
    let output = silowatch_cmd()
        .args(["alerts", "list", "--server", "http://127.0.0.1:1", "--token", "x"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(2));
    assert!(combined_output(&output).contains("No device selected"));
}

#[test]
fn test_unknown_profile_is_usage_error() {
    let output = silowatch_cmd()
        .args(["-p", "ghost", "alerts", "list"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(2));
    assert!(combined_output(&output).contains("ghost"));
}

// ── Alerts against a mock server ────────────────────────────────────

#[tokio::test(flavor = "multi_thread")]
async fn test_alerts_list_filters_by_severity() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/devices/dev-1/alerts"))
        .and(header("authorization", "Bearer t0ken"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "alerts": [
                alert_json("a1", "critical", "active"),
                alert_json("a2", "warning", "active"),
                alert_json("a3", "CRIT", "resolved"),
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let output = against(&server)
        .args(["alerts", "list", "--severity", "critical", "-o", "plain"])
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", combined_output(&output));
    assert_eq!(String::from_utf8_lossy(&output.stdout), "a1\na3\n");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_alerts_list_open_as_json() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/devices/dev-1/alerts"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            alert_json("a1", "critical", "acknowledged"),
            alert_json("a2", "warning", "resolved"),
        ])))
        .mount(&server)
        .await;

    let output = against(&server)
        .args(["alerts", "list", "--open", "-o", "json-compact"])
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", combined_output(&output));

    let alerts: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(alerts.as_array().unwrap().len(), 1);
    assert_eq!(alerts[0]["id"], "a1");
    assert_eq!(alerts[0]["status"], "acknowledged");
    assert_eq!(alerts[0]["description"], "Core temperature rising");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_alerts_ack_prints_updated_alert() {
    let server = MockServer::start().await;
    Mock::given(method("PATCH"))
        .and(path("/devices/dev-1/alerts/a1"))
        .and(body_json(json!({"note": "checking", "acknowledgedBy": "sam"})))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"alert": alert_json("a1", "critical", "acknowledged")})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let output = against(&server)
        .args(["alerts", "ack", "a1", "--note", "checking", "--by", "sam", "-o", "plain"])
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", combined_output(&output));
    assert_eq!(String::from_utf8_lossy(&output.stdout), "a1\n");
    assert!(String::from_utf8_lossy(&output.stderr).contains("Alert acknowledged"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_alerts_resolve_failure_exits_with_action_code() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/devices/dev-1/alerts/a1/resolve"))
        .respond_with(
            ResponseTemplate::new(409)
                .set_body_json(json!({"message": "Alert must be acknowledged first"})),
        )
        .mount(&server)
        .await;

    let output = against(&server)
        .args(["alerts", "resolve", "a1", "--code", "FIXED"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(9));
    assert!(combined_output(&output).contains("Alert must be acknowledged first"));
}
