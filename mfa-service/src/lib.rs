pub mod config;
pub mod db;
pub mod dtos;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod utils;

use axum::{
    extract::State,
    http::{header, HeaderName, HeaderValue, Method},
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
    Json, Router,
};
use service_core::error::AppError;
use service_core::middleware::tracing::request_id_middleware;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

use crate::config::{CredentialVerifierKind, DemoConfig, MfaConfig};
use crate::middleware::{auth_middleware, enforce_tenant_middleware, metrics_middleware};
use crate::models::{TenantId, User};
use crate::services::repository::{StoreError, UserRepository};
use crate::services::{
    Argon2Verifier, AuthService, ChallengeLifecycle, CredentialVerifier, DeviceLifecycle,
    HttpMfaProvider, JwtService, MfaProvider, MfaService, NonEmptyPasswordVerifier,
    ProviderClient, RedisService, Stores,
};
use crate::utils::{hash_password, Password};
use secrecy::ExposeSecret;

/// Id of the user seeded into in-memory stores.
pub const DEMO_USER_ID: &str = "demo-user";

#[derive(OpenApi)]
#[openapi(
    paths(
        health_check,
        handlers::auth::login,
        handlers::auth::logout,
        handlers::mfa::enroll,
        handlers::mfa::activate,
        handlers::mfa::create_challenge,
        handlers::mfa::approve,
        handlers::mfa::get_challenge,
        handlers::mfa::device_status,
    ),
    components(
        schemas(
            dtos::ErrorResponse,
            dtos::auth::LoginRequest,
            dtos::auth::LoginResponse,
            dtos::mfa::EnrollRequest,
            dtos::mfa::EnrollResponse,
            dtos::mfa::ActivateRequest,
            dtos::mfa::ActivateResponse,
            dtos::mfa::ChallengeRequest,
            dtos::mfa::ChallengeResponse,
            dtos::mfa::ApproveRequest,
            dtos::mfa::ApproveResponse,
            dtos::mfa::ChallengeStatusResponse,
            dtos::mfa::DeviceStatusResponse,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Authentication", description = "Login and session management"),
        (name = "MFA", description = "Device pairing and challenge approval"),
        (name = "Observability", description = "Service health and monitoring"),
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub config: MfaConfig,
    pub stores: Stores,
    pub auth_service: AuthService,
    pub mfa_service: MfaService,
}

impl AppState {
    /// Wire the services over `stores` and `provider`.
    pub fn new(
        config: MfaConfig,
        stores: Stores,
        provider: Arc<dyn MfaProvider>,
        jwt: JwtService,
    ) -> Self {
        let verifier: Arc<dyn CredentialVerifier> = match config.credential_verifier {
            CredentialVerifierKind::Argon2 => Arc::new(Argon2Verifier),
            CredentialVerifierKind::NonEmpty => Arc::new(NonEmptyPasswordVerifier),
        };

        let auth_service = AuthService::new(
            stores.users.clone(),
            stores.sessions.clone(),
            verifier,
            jwt,
        );

        let devices = DeviceLifecycle::new(stores.devices.clone(), provider.clone());
        let challenges = ChallengeLifecycle::new(
            stores.devices.clone(),
            stores.challenges.clone(),
            stores.nonces.clone(),
            provider,
            config.mfa.challenge_ttl(),
            config.mfa.nonce_ttl(),
        );

        Self {
            config,
            stores,
            auth_service,
            mfa_service: MfaService::new(devices, challenges),
        }
    }
}

/// Connect the configured stores and the HTTP provider client.
///
/// With both `DATABASE_URL` and `REDIS_URL` set the service runs on
/// PostgreSQL and Redis; otherwise it uses in-memory stores seeded with the
/// demo user.
pub async fn build_state(config: MfaConfig) -> Result<AppState, AppError> {
    let stores = match (&config.database.url, &config.redis.url) {
        (Some(database_url), Some(redis_url)) => {
            let pool = db::create_pool(database_url, &config.database).await?;
            db::run_migrations(&pool)
                .await
                .map_err(|e| AppError::DatabaseError(anyhow::Error::new(e)))?;
            let redis = RedisService::connect(redis_url)
                .await
                .map_err(AppError::InternalError)?;
            Stores::external(pool, redis)
        }
        _ => {
            tracing::warn!("DATABASE_URL or REDIS_URL not set; using in-memory stores");
            let stores = Stores::in_memory();
            seed_demo_user(stores.users.as_ref(), &config.demo).await?;
            stores
        }
    };
    tracing::info!(backend = stores.backend_name(), "Stores initialized");

    let jwt = JwtService::new(&config.jwt).map_err(AppError::ConfigError)?;
    tracing::info!("JWT service initialized");

    let client = ProviderClient::new(&config.provider).map_err(AppError::ConfigError)?;
    let provider: Arc<dyn MfaProvider> = Arc::new(HttpMfaProvider::new(client));
    tracing::info!(base_url = %config.provider.base_url, "MFA provider client initialized");

    Ok(AppState::new(config, stores, provider, jwt))
}

/// Create the demo user. With a demo password the user gets an Argon2 hash,
/// so it can also log in under the `argon2` verifier.
pub async fn seed_demo_user(users: &dyn UserRepository, demo: &DemoConfig) -> Result<(), AppError> {
    let mut user = User::new(
        DEMO_USER_ID,
        TenantId::new(demo.tenant_id.as_str()),
        demo.username.as_str(),
    );
    if let Some(password) = &demo.password {
        let hash = hash_password(&Password::new(password.expose_secret().as_str()))?;
        user = user.with_credential_hash(hash);
    }

    match users.create(&user).await {
        Ok(()) | Err(StoreError::AlreadyExists) => {
            tracing::info!(
                tenant_id = %user.tenant_id,
                username = %user.username,
                "Demo user ready"
            );
            Ok(())
        }
        Err(e) => Err(AppError::DatabaseError(anyhow::Error::new(e))),
    }
}

pub fn build_router(state: AppState) -> Result<Router, AppError> {
    let allowed_origins = state
        .config
        .security
        .allowed_origins
        .iter()
        .map(|o| {
            o.parse::<HeaderValue>().map_err(|e| {
                AppError::ConfigError(anyhow::anyhow!("Invalid CORS origin '{}': {}", o, e))
            })
        })
        .collect::<Result<Vec<HeaderValue>, AppError>>()?;

    // Authenticated routes: bearer token first, then the tenant header check.
    let protected = Router::new()
        .route("/api/auth/logout", post(handlers::logout))
        .route("/api/mfa/enroll", post(handlers::enroll))
        .route("/api/mfa/activate", post(handlers::activate))
        .route("/api/mfa/challenge", post(handlers::create_challenge))
        .route("/api/mfa/approve", post(handlers::approve))
        .route("/api/mfa/challenge/:id", get(handlers::get_challenge))
        .route("/api/mfa/status/:id", get(handlers::device_status))
        .layer(from_fn(enforce_tenant_middleware))
        .layer(from_fn_with_state(state.clone(), auth_middleware));

    let mut app = Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(handlers::metrics::metrics))
        .route("/api/auth/login", post(handlers::login))
        .merge(protected);

    if state.config.swagger.enabled {
        app = app.merge(
            SwaggerUi::new("/docs").url("/.well-known/openapi.json", ApiDoc::openapi()),
        );
    } else {
        app = app.route(
            "/.well-known/openapi.json",
            get(|| async { Json(ApiDoc::openapi()) }),
        );
    }

    let app = app
        .with_state(state)
        .layer(from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http().make_span_with(
            |request: &axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get("x-request-id")
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("-");

                tracing::info_span!(
                    "http_request",
                    request_id = %request_id,
                    method = %request.method(),
                    uri = %request.uri(),
                    version = ?request.version(),
                )
            },
        ))
        .layer(from_fn(request_id_middleware))
        .layer(
            CorsLayer::new()
                .allow_origin(allowed_origins)
                .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
                .allow_headers([
                    header::AUTHORIZATION,
                    header::CONTENT_TYPE,
                    HeaderName::from_static("x-tenant-id"),
                    HeaderName::from_static("idempotency-key"),
                    HeaderName::from_static("x-request-id"),
                ])
                .expose_headers([HeaderName::from_static("x-request-id")]),
        );

    Ok(app)
}

/// Service health check
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is healthy"),
        (status = 503, description = "A backing store is unreachable")
    ),
    tag = "Observability"
)]
pub async fn health_check(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, AppError> {
    state.stores.health_check().await.map_err(|e| {
        tracing::error!(error = %e, "Health check failed");
        AppError::ServiceUnavailable
    })?;

    Ok(Json(serde_json::json!({
        "status": "healthy",
        "service": state.config.service_name,
        "environment": format!("{:?}", state.config.environment),
        "backend": state.stores.backend_name(),
    })))
}
