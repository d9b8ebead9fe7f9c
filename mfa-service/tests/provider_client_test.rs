use mfa_service::config::ProviderConfig;
use mfa_service::models::TenantId;
use mfa_service::services::provider::{
    ApproveRequest, EnrollRequest, HttpMfaProvider, MfaProvider, ProviderClient, ProviderError,
    ProviderErrorKind,
};
use secrecy::Secret;
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn provider_for(base_url: &str, retry_max: u32) -> HttpMfaProvider {
    let config = ProviderConfig {
        base_url: base_url.to_string(),
        api_key: Secret::new("test-api-key".to_string()),
        timeout_ms: 2000,
        retry_max,
        retry_backoff_ms: 10,
    };
    HttpMfaProvider::new(ProviderClient::new(&config).unwrap())
}

fn enroll_request() -> EnrollRequest {
    EnrollRequest {
        tenant_id: "t1".to_string(),
        user_id: "u1".to_string(),
    }
}

fn approve_request() -> ApproveRequest {
    ApproveRequest {
        device_id: "d1".to_string(),
        signature: "sig".to_string(),
        payload: json!({"nonce": "n1"}),
        totp_code: None,
    }
}

#[tokio::test]
async fn test_sends_credentials_and_tenant_headers() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/enrollments/init"))
        .and(header("X-API-Key", "test-api-key"))
        .and(header("X-Tenant-ID", "t1"))
        .and(header("content-type", "application/json"))
        .and(body_json(json!({"tenant_id": "t1", "user_id": "u1"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "enrollment_id": "enr-1",
            "pairing_code": "PAIR-1",
            "expires_at": "2030-01-01T00:00:00Z",
        })))
        .expect(1)
        .mount(&server)
        .await;

    let provider = provider_for(&server.uri(), 2);
    let response = provider
        .enroll(&TenantId::new("t1"), &enroll_request())
        .await
        .unwrap();

    assert_eq!(response.enrollment_id, "enr-1");
    assert_eq!(response.pairing_code, "PAIR-1");
    assert_eq!(response.expires_at, "2030-01-01T00:00:00Z");
}

#[tokio::test]
async fn test_retries_503_until_success() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/enrollments/init"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/enrollments/init"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "enrollment_id": "enr-2",
            "pairing_code": "PAIR-2",
            "expires_at": "2030-01-01T00:00:00Z",
        })))
        .expect(1)
        .mount(&server)
        .await;

    let provider = provider_for(&server.uri(), 2);
    let response = provider
        .enroll(&TenantId::new("t1"), &enroll_request())
        .await
        .unwrap();

    assert_eq!(response.enrollment_id, "enr-2");
}

#[tokio::test]
async fn test_persistent_503_surfaces_as_push_failed_after_max_attempts() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/auth/challenges/chl-1/approve"))
        .respond_with(ResponseTemplate::new(503).set_body_string("push gateway down"))
        .expect(3)
        .mount(&server)
        .await;

    let provider = provider_for(&server.uri(), 2);
    let err = provider
        .approve(&TenantId::new("t1"), "chl-1", &approve_request())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), Some(ProviderErrorKind::PushFailed));
    match err {
        ProviderError::Status { status, body } => {
            assert_eq!(status, 503);
            assert_eq!(body, "push gateway down");
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn test_client_errors_are_not_retried() {
    for (status, kind) in [
        (400, ProviderErrorKind::BadRequest),
        (404, ProviderErrorKind::NotFound),
        (409, ProviderErrorKind::InvalidState),
        (410, ProviderErrorKind::Expired),
        (412, ProviderErrorKind::InvalidSignature),
        (429, ProviderErrorKind::RateLimited),
        (500, ProviderErrorKind::Upstream),
    ] {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/auth/challenges/chl-1/approve"))
            .respond_with(ResponseTemplate::new(status).set_body_string("nope"))
            .expect(1)
            .mount(&server)
            .await;

        let provider = provider_for(&server.uri(), 2);
        let err = provider
            .approve(&TenantId::new("t1"), "chl-1", &approve_request())
            .await
            .unwrap_err();

        assert_eq!(err.kind(), Some(kind), "status {}", status);
    }
}

#[tokio::test]
async fn test_empty_approve_body_is_accepted() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/auth/challenges/chl-1/approve"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;

    let provider = provider_for(&server.uri(), 0);
    let response = provider
        .approve(&TenantId::new("t1"), "chl-1", &approve_request())
        .await
        .unwrap();

    assert!(response.status.is_none());
}

#[tokio::test]
async fn test_invalid_success_payload_is_a_decode_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/enrollments/init"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
        .mount(&server)
        .await;

    let provider = provider_for(&server.uri(), 0);
    let err = provider
        .enroll(&TenantId::new("t1"), &enroll_request())
        .await
        .unwrap_err();

    assert!(matches!(err, ProviderError::Decode(_)));
}

#[tokio::test]
async fn test_transport_failures_exhaust_retries() {
    // Nothing listens on a port we bound and released.
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let uri = format!("http://{}", listener.local_addr().unwrap());
    drop(listener);

    let provider = provider_for(&uri, 1);
    let err = provider
        .enroll(&TenantId::new("t1"), &enroll_request())
        .await
        .unwrap_err();

    match err {
        ProviderError::RetryExhausted { attempts, .. } => assert_eq!(attempts, 2),
        other => panic!("unexpected error: {:?}", other),
    }
}
