//! Test helpers for mfa-service integration tests.
//!
//! Builds the full router over in-memory stores and a scripted provider.
#![allow(dead_code)]
use axum::{
    body::Body,
    http::{HeaderMap, Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use mfa_service::{
    build_router,
    config::{
        CredentialVerifierKind, DatabaseConfig, DemoConfig, Environment, JwtConfig, MfaConfig,
        MfaSettings, ProviderConfig, RedisConfig, SecurityConfig, SwaggerConfig,
    },
    models::{TenantId, User},
    services::{repository::UserRepository, JwtService, MfaProvider, MockMfaProvider, Stores},
    AppState,
};
use secrecy::Secret;
use serde_json::{json, Value};
use std::io::Write;
use std::sync::Arc;
use tempfile::NamedTempFile;
use tower::ServiceExt;

const TEST_PRIVATE_KEY: &str = include_str!("../fixtures/jwt_private.pem");
const TEST_PUBLIC_KEY: &str = include_str!("../fixtures/jwt_public.pem");

/// Any non-empty password logs in under the test verifier.
pub const TEST_PASSWORD: &str = "correct horse";

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub provider: Arc<MockMfaProvider>,
    _key_files: (NamedTempFile, NamedTempFile),
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl TestResponse {
    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.body).expect("response body is not JSON")
    }

    /// The `code` of an error body.
    pub fn code(&self) -> String {
        self.json()["code"].as_str().unwrap_or_default().to_string()
    }
}

impl TestApp {
    pub async fn spawn() -> Self {
        Self::spawn_with(MockMfaProvider::new()).await
    }

    pub async fn spawn_with(provider: MockMfaProvider) -> Self {
        Self::spawn_with_stores(provider, Stores::in_memory()).await
    }

    /// Build the app around a pre-scripted provider and the given stores.
    /// Users `demo`, `alice` (tenant `t1`) and `bob` (tenant `t2`) are seeded.
    pub async fn spawn_with_stores(provider: MockMfaProvider, stores: Stores) -> Self {
        let (private_file, public_file) = create_test_keys().expect("Failed to create test keys");
        let config = create_test_config(
            private_file.path().to_str().unwrap(),
            public_file.path().to_str().unwrap(),
        );

        for (id, tenant, username) in [
            ("u-demo", "t1", "demo"),
            ("u-alice", "t1", "alice"),
            ("u-bob", "t2", "bob"),
        ] {
            stores
                .users
                .create(&User::new(id, TenantId::new(tenant), username))
                .await
                .expect("Failed to seed user");
        }

        let provider = Arc::new(provider);
        let jwt = JwtService::new(&config.jwt).expect("Failed to create JWT service");
        let state = AppState::new(
            config,
            stores,
            provider.clone() as Arc<dyn MfaProvider>,
            jwt,
        );
        let router = build_router(state.clone()).expect("Failed to build router");

        TestApp {
            router,
            state,
            provider,
            _key_files: (private_file, public_file),
        }
    }

    pub async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let body = response
            .into_body()
            .collect()
            .await
            .unwrap()
            .to_bytes()
            .to_vec();
        TestResponse {
            status,
            headers,
            body,
        }
    }

    pub async fn login(&self, tenant: &str, username: &str) -> String {
        let res = self
            .send(
                Request::builder()
                    .method("POST")
                    .uri("/api/auth/login")
                    .header("content-type", "application/json")
                    .body(Body::from(
                        json!({
                            "tenant_id": tenant,
                            "username": username,
                            "password": TEST_PASSWORD,
                        })
                        .to_string(),
                    ))
                    .unwrap(),
            )
            .await;
        assert_eq!(res.status, StatusCode::OK, "login failed: {:?}", res.json());
        res.json()["access_token"].as_str().unwrap().to_string()
    }

    pub async fn post(&self, path: &str, token: &str, tenant: &str, body: Value) -> TestResponse {
        self.post_with_key(path, token, tenant, body, None).await
    }

    pub async fn post_with_key(
        &self,
        path: &str,
        token: &str,
        tenant: &str,
        body: Value,
        idempotency_key: Option<&str>,
    ) -> TestResponse {
        let mut builder = Request::builder()
            .method("POST")
            .uri(path)
            .header("authorization", format!("Bearer {}", token))
            .header("x-tenant-id", tenant)
            .header("content-type", "application/json");
        if let Some(key) = idempotency_key {
            builder = builder.header("idempotency-key", key);
        }
        self.send(builder.body(Body::from(body.to_string())).unwrap())
            .await
    }

    pub async fn get(&self, path: &str, token: &str, tenant: &str) -> TestResponse {
        self.send(
            Request::builder()
                .uri(path)
                .header("authorization", format!("Bearer {}", token))
                .header("x-tenant-id", tenant)
                .body(Body::empty())
                .unwrap(),
        )
        .await
    }

    /// Enroll and activate `device_id`, returning once it is ACTIVE.
    pub async fn activate_device(&self, token: &str, tenant: &str, device_id: &str) {
        let enrolled = self
            .post("/api/mfa/enroll", token, tenant, json!({ "device_id": device_id }))
            .await;
        assert_eq!(enrolled.status, StatusCode::OK, "{:?}", enrolled.json());
        let pairing_code = enrolled.json()["pairing_code"].as_str().unwrap().to_string();

        let activated = self
            .post(
                "/api/mfa/activate",
                token,
                tenant,
                json!({
                    "device_id": device_id,
                    "pairing_code": pairing_code,
                    "public_key": "pk-test",
                }),
            )
            .await;
        assert_eq!(activated.status, StatusCode::OK, "{:?}", activated.json());
    }

    /// Issue a challenge to an active device and return its id.
    pub async fn issue_challenge(&self, token: &str, tenant: &str, device_id: &str) -> String {
        let res = self
            .post(
                "/api/mfa/challenge",
                token,
                tenant,
                json!({ "device_id": device_id, "action": "login" }),
            )
            .await;
        assert_eq!(res.status, StatusCode::OK, "{:?}", res.json());
        res.json()["challenge_id"].as_str().unwrap().to_string()
    }
}

/// Create temporary JWT key files for testing.
pub fn create_test_keys() -> anyhow::Result<(NamedTempFile, NamedTempFile)> {
    let mut private_file = NamedTempFile::new()?;
    private_file.write_all(TEST_PRIVATE_KEY.as_bytes())?;

    let mut public_file = NamedTempFile::new()?;
    public_file.write_all(TEST_PUBLIC_KEY.as_bytes())?;

    Ok((private_file, public_file))
}

/// Create a test configuration.
pub fn create_test_config(private_key_path: &str, public_key_path: &str) -> MfaConfig {
    MfaConfig {
        common: service_core::config::Config::default(),
        environment: Environment::Dev,
        service_name: "mfa-service-test".to_string(),
        log_level: "error".to_string(),
        otlp_endpoint: None,
        database: DatabaseConfig {
            url: None,
            max_connections: 5,
        },
        redis: RedisConfig { url: None },
        jwt: JwtConfig {
            private_key_path: private_key_path.to_string(),
            public_key_path: public_key_path.to_string(),
            issuer: "trustpin".to_string(),
            audience: "mobile".to_string(),
            access_token_expiry_minutes: 15,
        },
        provider: ProviderConfig {
            base_url: "http://127.0.0.1:9".to_string(),
            api_key: Secret::new("test-api-key".to_string()),
            timeout_ms: 1000,
            retry_max: 0,
            retry_backoff_ms: 1,
        },
        mfa: MfaSettings::default(),
        credential_verifier: CredentialVerifierKind::NonEmpty,
        demo: DemoConfig {
            tenant_id: "t1".to_string(),
            username: "demo".to_string(),
            password: None,
        },
        security: SecurityConfig {
            allowed_origins: vec!["http://localhost:3000".to_string()],
        },
        swagger: SwaggerConfig { enabled: false },
    }
}
