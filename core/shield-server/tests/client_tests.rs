use chrono::{TimeZone, Utc};
use shield_license::LicenseConfig;
use shield_server::{
    HttpLicenseServer, LicenseServer, ServerError, ServerRequest, APP_ID_HEADER,
};
use std::time::Duration;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn verify_request() -> ServerRequest {
    let now = Utc.with_ymd_and_hms(2026, 3, 1, 8, 0, 0).unwrap();
    ServerRequest::verify("device-1", "com.example.app", "com.example.app.runner", now)
}

fn client_for(server: &MockServer) -> HttpLicenseServer {
    HttpLicenseServer::with_timeout(&server.uri(), "com.example.app", Duration::from_secs(5))
        .unwrap()
}

// ── Construction ────────────────────────────────────────────────

#[test]
fn new_from_config_trims_trailing_slash() {
    let config = LicenseConfig {
        server_enabled: true,
        server_url: "https://licenses.example.com/api/".to_string(),
        ..Default::default()
    };
    let client = HttpLicenseServer::new(&config).unwrap();
    assert_eq!(client.base_url(), "https://licenses.example.com/api");
}

#[test]
fn invalid_url_is_rejected() {
    let result = HttpLicenseServer::with_timeout("not a url", "app", Duration::from_secs(1));
    assert!(matches!(result, Err(ServerError::InvalidUrl(_))));
}

// ── Verify ──────────────────────────────────────────────────────

#[tokio::test]
async fn verify_success_with_expiry() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/verify"))
        .and(header(APP_ID_HEADER, "com.example.app"))
        .and(body_partial_json(serde_json::json!({
            "device_id": "device-1",
            "app_id": "com.example.app",
            "bundle_id": "com.example.app.runner",
            "timestamp": "2026-03-01T08:00:00Z"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "success": true,
            "expiry_days": 15
        })))
        .expect(1)
        .mount(&server)
        .await;

    let response = client_for(&server).verify(verify_request()).await.unwrap();
    assert!(response.success);
    assert_eq!(response.requested_extension(), Some(15));
}

#[tokio::test]
async fn verify_without_license_key_field() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/verify"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "success": true
        })))
        .mount(&server)
        .await;

    client_for(&server).verify(verify_request()).await.unwrap();

    let received = server.received_requests().await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&received[0].body).unwrap();
    assert!(body.get("license_key").is_none());
    assert!(body.get("request_id").and_then(|v| v.as_str()).is_some());
}

#[tokio::test]
async fn explicit_failure_is_a_response_not_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/verify"))
        .respond_with(ResponseTemplate::new(403).set_body_json(serde_json::json!({
            "success": false,
            "message": "license revoked"
        })))
        .mount(&server)
        .await;

    let response = client_for(&server).verify(verify_request()).await.unwrap();
    assert!(!response.success);
    assert_eq!(response.reason(), "license revoked");
}

#[tokio::test]
async fn malformed_body_is_decode_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/verify"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>ok</html>"))
        .mount(&server)
        .await;

    let err = client_for(&server).verify(verify_request()).await.unwrap_err();
    assert!(matches!(err, ServerError::Decode(_)));
}

#[tokio::test]
async fn success_body_with_error_status_is_decode_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/verify"))
        .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
            "success": true
        })))
        .mount(&server)
        .await;

    let err = client_for(&server).verify(verify_request()).await.unwrap_err();
    assert!(matches!(err, ServerError::Decode(_)));
}

#[tokio::test]
async fn server_error_without_body_is_unreachable() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/verify"))
        .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
        .mount(&server)
        .await;

    let err = client_for(&server).verify(verify_request()).await.unwrap_err();
    assert!(matches!(err, ServerError::Unreachable(_)));
}

#[tokio::test]
async fn slow_server_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/verify"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({ "success": true }))
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&server)
        .await;

    let client =
        HttpLicenseServer::with_timeout(&server.uri(), "app", Duration::from_millis(200)).unwrap();
    let err = client.verify(verify_request()).await.unwrap_err();
    assert!(matches!(err, ServerError::Timeout), "got {err:?}");
}

#[tokio::test]
async fn refused_connection_is_unreachable() {
    let client =
        HttpLicenseServer::with_timeout("http://127.0.0.1:1", "app", Duration::from_secs(2))
            .unwrap();
    let err = client.verify(verify_request()).await.unwrap_err();
    assert!(
        matches!(err, ServerError::Unreachable(_) | ServerError::Timeout),
        "got {err:?}"
    );
}

// ── Activate ────────────────────────────────────────────────────

#[tokio::test]
async fn activate_sends_license_key() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/activate"))
        .and(body_partial_json(serde_json::json!({
            "license_key": "ABCD-1234",
            "device_id": "device-1"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "success": true,
            "expiry_days": 365,
            "message": "welcome"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let now = Utc.with_ymd_and_hms(2026, 3, 1, 8, 0, 0).unwrap();
    let request = ServerRequest::activate("device-1", "app", "bundle", "ABCD-1234", now);
    let response = client_for(&server).activate(request).await.unwrap();
    assert!(response.success);
    assert_eq!(response.expiry_days, Some(365));
    assert_eq!(response.message.as_deref(), Some("welcome"));
}
