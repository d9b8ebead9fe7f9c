mod common;

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::TestApp;
use mfa_service::models::{Session, TenantId};
use mfa_service::services::repository::{InMemorySessionRepository, SessionRepository, StoreError};
use mfa_service::services::{MockMfaProvider, Stores};
use serde_json::json;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Session store whose lookups can be switched to fail.
#[derive(Default)]
struct FlakySessions {
    inner: InMemorySessionRepository,
    down: AtomicBool,
}

#[async_trait]
impl SessionRepository for FlakySessions {
    async fn create(&self, session: &Session) -> Result<(), StoreError> {
        self.inner.create(session).await
    }

    async fn find_by_token_id(
        &self,
        tenant_id: &TenantId,
        token_id: &str,
    ) -> Result<Option<Session>, StoreError> {
        if self.down.load(Ordering::SeqCst) {
            return Err(StoreError::Backend(anyhow::anyhow!("connection refused")));
        }
        self.inner.find_by_token_id(tenant_id, token_id).await
    }

    async fn revoke_by_token_id(
        &self,
        tenant_id: &TenantId,
        token_id: &str,
        revoked_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.inner
            .revoke_by_token_id(tenant_id, token_id, revoked_at)
            .await
    }
}

fn login_request(body: String) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/auth/login")
        .header("content-type", "application/json")
        .body(Body::from(body))
        .unwrap()
}

#[tokio::test]
async fn test_login_returns_token_with_future_expiry() {
    let app = TestApp::spawn().await;

    let res = app
        .send(login_request(
            json!({"tenant_id": "t1", "username": "demo", "password": "x"}).to_string(),
        ))
        .await;

    assert_eq!(res.status, StatusCode::OK);
    let body = res.json();
    assert!(!body["access_token"].as_str().unwrap().is_empty());
    assert_eq!(body["token_type"], "Bearer");

    let expires_at: DateTime<Utc> = body["expires_at"].as_str().unwrap().parse().unwrap();
    assert!(expires_at > Utc::now());

    let claims = app
        .state
        .auth_service
        .jwt()
        .validate(body["access_token"].as_str().unwrap())
        .unwrap();
    assert_eq!(claims.tenant_id, "t1");
    assert_eq!(claims.sub, "u-demo");
}

#[tokio::test]
async fn test_login_is_tenant_scoped() {
    let app = TestApp::spawn().await;

    // bob exists only in t2.
    let res = app
        .send(login_request(
            json!({"tenant_id": "t1", "username": "bob", "password": "x"}).to_string(),
        ))
        .await;

    assert_eq!(res.status, StatusCode::UNAUTHORIZED);
    assert_eq!(res.code(), "invalid_credentials");
}

#[tokio::test]
async fn test_login_rejects_malformed_bodies() {
    let app = TestApp::spawn().await;

    let missing_field = app
        .send(login_request(
            json!({"tenant_id": "t1", "username": "demo"}).to_string(),
        ))
        .await;
    assert_eq!(missing_field.status, StatusCode::BAD_REQUEST);
    assert_eq!(missing_field.code(), "bad_request");

    let empty_password = app
        .send(login_request(
            json!({"tenant_id": "t1", "username": "demo", "password": ""}).to_string(),
        ))
        .await;
    assert_eq!(empty_password.status, StatusCode::BAD_REQUEST);
    assert_eq!(empty_password.code(), "bad_request");

    let not_json = app.send(login_request("{not json".to_string())).await;
    assert_eq!(not_json.status, StatusCode::BAD_REQUEST);
    assert_eq!(not_json.code(), "bad_request");
}

#[tokio::test]
async fn test_protected_routes_require_valid_token() {
    let app = TestApp::spawn().await;

    let no_token = app
        .send(
            Request::builder()
                .uri("/api/mfa/status/d1")
                .header("x-tenant-id", "t1")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(no_token.status, StatusCode::UNAUTHORIZED);
    assert_eq!(no_token.code(), "unauthorized");

    let forged = app.get("/api/mfa/status/d1", "not-a-jwt", "t1").await;
    assert_eq!(forged.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_tenant_header_must_match_token() {
    let app = TestApp::spawn().await;
    let token = app.login("t1", "demo").await;

    let mismatch = app.get("/api/mfa/status/d1", &token, "t2").await;
    assert_eq!(mismatch.status, StatusCode::FORBIDDEN);
    assert_eq!(mismatch.code(), "forbidden");

    let missing = app
        .send(
            Request::builder()
                .uri("/api/mfa/status/d1")
                .header("authorization", format!("Bearer {}", token))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(missing.status, StatusCode::FORBIDDEN);

    let matching = app.get("/api/mfa/status/d1", &token, " t1 ").await;
    assert_eq!(matching.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_logout_revokes_session() {
    let app = TestApp::spawn().await;
    let token = app.login("t1", "demo").await;

    let res = app.post("/api/auth/logout", &token, "t1", json!({})).await;
    assert_eq!(res.status, StatusCode::NO_CONTENT);

    let after = app.get("/api/mfa/status/d1", &token, "t1").await;
    assert_eq!(after.status, StatusCode::UNAUTHORIZED);

    // Other sessions of the same user are unaffected.
    let fresh = app.login("t1", "demo").await;
    let res = app.get("/api/mfa/status/d1", &fresh, "t1").await;
    assert_eq!(res.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_unverifiable_session_is_unauthorized() {
    let sessions = Arc::new(FlakySessions::default());
    let mut stores = Stores::in_memory();
    stores.sessions = sessions.clone() as Arc<dyn SessionRepository>;
    let app = TestApp::spawn_with_stores(MockMfaProvider::new(), stores).await;
    let token = app.login("t1", "demo").await;

    sessions.down.store(true, Ordering::SeqCst);
    let res = app.get("/api/mfa/status/d1", &token, "t1").await;
    assert_eq!(res.status, StatusCode::UNAUTHORIZED);
    assert_eq!(res.code(), "unauthorized");

    sessions.down.store(false, Ordering::SeqCst);
    let res = app.get("/api/mfa/status/d1", &token, "t1").await;
    assert_eq!(res.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_responses_carry_request_id() {
    let app = TestApp::spawn().await;

    let health = app
        .send(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await;
    assert_eq!(health.status, StatusCode::OK);
    assert!(health.headers.contains_key("x-request-id"));
    assert_eq!(health.json()["backend"], "memory");

    let error = app.get("/api/mfa/status/d1", "bad", "t1").await;
    assert!(error.headers.contains_key("x-request-id"));

    let echoed = app
        .send(
            Request::builder()
                .uri("/health")
                .header("x-request-id", "req-42")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(echoed.headers["x-request-id"], "req-42");
}

#[tokio::test]
async fn test_metrics_and_openapi_are_served() {
    mfa_service::services::metrics::init_metrics().unwrap();
    let app = TestApp::spawn().await;
    app.login("t1", "demo").await;

    let metrics = app
        .send(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await;
    assert_eq!(metrics.status, StatusCode::OK);
    let text = String::from_utf8(metrics.body).unwrap();
    assert!(text.contains("http_requests_total"));

    let openapi = app
        .send(
            Request::builder()
                .uri("/.well-known/openapi.json")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(openapi.status, StatusCode::OK);
    assert!(openapi.json()["paths"]["/api/mfa/approve"].is_object());
}
