#![allow(clippy::unwrap_used)]
// Integration tests for `DeviceClient` using wiremock.

use serde_json::json;
use tokio_test::assert_ok;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use silowatch_api::{AcknowledgeRequest, DeviceClient, Error, ResolveRequest, TransportConfig};

// ── Helpers ─────────────────────────────────────────────────────────

async fn setup() -> (MockServer, DeviceClient) {
    let server = MockServer::start().await;
    let client = DeviceClient::with_client(&server.uri(), reqwest::Client::new()).unwrap();
    (server, client)
}

fn alert_json(id: &str) -> serde_json::Value {
    json!({
        "id": id,
        "siloName": "Silo 3",
        "alertType": "temperature",
        "severity": "critical",
        "detectedAt": "2024-03-01T10:00:00Z",
        "durationMinutes": 14,
        "status": "active",
        "description": "Core temperature above threshold",
        "recommendedAction": "Start aeration"
    })
}

// ── List tests ──────────────────────────────────────────────────────

#[tokio::test]
async fn test_list_alerts_bare_array() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/devices/dev-1/alerts"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!([alert_json("a1"), alert_json("a2")])),
        )
        .mount(&server)
        .await;

    let alerts = client.list_alerts("dev-1").await.unwrap();
    assert_eq!(alerts.len(), 2);
    assert_eq!(alerts[0].id, "a1");
    assert_eq!(alerts[0].silo_name.as_deref(), Some("Silo 3"));
    assert_eq!(alerts[1].recommended_action.as_deref(), Some("Start aeration"));
}

#[tokio::test]
async fn test_list_alerts_wrapped_and_snake_case() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/devices/dev-1/alerts"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [{
                "id": 17,
                "silo_name": "East",
                "alert_type": "humidity",
                "severity": "warning",
                "message": "Humidity rising",
                "duration_minutes": 3.6
            }]
        })))
        .mount(&server)
        .await;

    let alerts = client.list_alerts("dev-1").await.unwrap();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].id, "17");
    assert_eq!(alerts[0].text(), Some("Humidity rising"));
    assert_eq!(alerts[0].duration_minutes, Some(json!(3.6)));
}

#[tokio::test]
async fn test_list_alerts_keeps_loosely_typed_time_fields() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/devices/dev-1/alerts"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": "a1", "durationMinutes": "12", "detectedAt": "2024-03-01T10:00:00Z"},
            {"id": "a2", "durationMinutes": 4, "detectedAt": 1_700_000_000},
            {"id": "a3", "duration_minutes": "7.5", "detected_at": 1_700_000_000_000_i64}
        ])))
        .mount(&server)
        .await;

    let alerts = client.list_alerts("dev-1").await.unwrap();
    let ids: Vec<&str> = alerts.iter().map(|a| a.id.as_str()).collect();
    assert_eq!(ids, vec!["a1", "a2", "a3"]);
    assert_eq!(alerts[0].duration_minutes, Some(json!("12")));
    assert_eq!(alerts[1].detected_at, Some(json!(1_700_000_000)));
    assert_eq!(alerts[2].detected_at, Some(json!(1_700_000_000_000_i64)));
}

#[tokio::test]
async fn test_list_alerts_skips_malformed_elements() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/devices/dev-1/alerts"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "alerts": [alert_json("ok"), {"severity": "critical"}, "garbage"]
        })))
        .mount(&server)
        .await;

    let alerts = client.list_alerts("dev-1").await.unwrap();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].id, "ok");
}

#[tokio::test]
async fn test_bearer_token_is_sent() {
    let server = MockServer::start().await;
    let transport = TransportConfig {
        token: Some("s3cret".to_string().into()),
        ..TransportConfig::default()
    };
    let client = DeviceClient::new(&server.uri(), &transport).unwrap();

    Mock::given(method("GET"))
        .and(path("/devices/dev-1/alerts"))
        .and(header("authorization", "Bearer s3cret"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;

    assert_ok!(client.list_alerts("dev-1").await);
}

// ── Mutation tests ──────────────────────────────────────────────────

#[tokio::test]
async fn test_acknowledge_sends_camel_case_body() {
    let (server, client) = setup().await;

    Mock::given(method("PATCH"))
        .and(path("/devices/dev-1/alerts/a1"))
        .and(body_json(json!({"note": "on it", "acknowledgedBy": "ops"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "alert": { "id": "a1", "status": "acknowledged" }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let request = AcknowledgeRequest {
        note: Some("on it".into()),
        acknowledged_by: Some("ops".into()),
    };
    let updated = client
        .acknowledge_alert("dev-1", "a1", &request)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(updated.status.as_deref(), Some("acknowledged"));
}

#[tokio::test]
async fn test_resolve_unwraps_data_envelope() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/devices/dev-1/alerts/a1/resolve"))
        .and(body_json(json!({"resolutionCode": "fixed"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": { "id": "a1", "status": "resolved" }
        })))
        .mount(&server)
        .await;

    let request = ResolveRequest {
        resolution_code: Some("fixed".into()),
        ..ResolveRequest::default()
    };
    let updated = client
        .resolve_alert("dev-1", "a1", &request)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(updated.id, "a1");
    assert_eq!(updated.status.as_deref(), Some("resolved"));
}

#[tokio::test]
async fn test_mutation_with_empty_body_returns_none() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/devices/dev-1/alerts/a1/resolve"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;

    let updated = client
        .resolve_alert("dev-1", "a1", &ResolveRequest::default())
        .await
        .unwrap();
    assert!(updated.is_none());
}

// ── Error tests ─────────────────────────────────────────────────────

#[tokio::test]
async fn test_api_error_parses_message_and_code() {
    let (server, client) = setup().await;

    Mock::given(method("PATCH"))
        .and(path("/devices/dev-1/alerts/missing"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "message": "Alert not found",
            "code": "alert.not_found"
        })))
        .mount(&server)
        .await;

    let err = client
        .acknowledge_alert("dev-1", "missing", &AcknowledgeRequest::default())
        .await
        .unwrap_err();
    assert!(err.is_not_found());
    assert_eq!(err.api_error_code(), Some("alert.not_found"));
    assert_eq!(err.to_string(), "API error (HTTP 404): Alert not found");
}

#[tokio::test]
async fn test_server_error_falls_back_to_raw_text() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/devices/dev-1/alerts"))
        .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
        .mount(&server)
        .await;

    let err = client.list_alerts("dev-1").await.unwrap_err();
    assert!(err.is_transient());
    assert!(matches!(err, Error::Api { status: 502, ref message, .. } if message == "bad gateway"));
}

#[tokio::test]
async fn test_unauthorized_maps_to_authentication() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/devices/dev-1/alerts"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let result = client.list_alerts("dev-1").await;
    assert!(
        matches!(result, Err(Error::Authentication { .. })),
        "expected Authentication error, got: {result:?}"
    );
}

#[tokio::test]
async fn test_invalid_json_is_a_deserialization_error() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/devices/dev-1/alerts"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
        .mount(&server)
        .await;

    let result = client.list_alerts("dev-1").await;
    assert!(matches!(result, Err(Error::Deserialization { .. })));
}
