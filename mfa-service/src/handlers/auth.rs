use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use service_core::error::AppError;

use crate::{
    dtos::auth::{LoginRequest, LoginResponse},
    middleware::AuthContext,
    models::TenantId,
    utils::{Password, ValidatedJson},
    AppState,
};

/// Login with tenant, username and password
#[utoipa::path(
    post,
    path = "/api/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = LoginResponse),
        (status = 400, description = "Malformed request", body = ErrorResponse),
        (status = 401, description = "Invalid credentials", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "Authentication"
)]
pub async fn login(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<LoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    let tenant_id = TenantId::new(req.tenant_id);
    let password = Password::new(req.password);

    let outcome = state
        .auth_service
        .login(&tenant_id, req.username.trim(), &password)
        .await?;

    Ok((
        StatusCode::OK,
        Json(LoginResponse {
            access_token: outcome.token.token,
            token_type: "Bearer".to_string(),
            expires_at: outcome.token.expires_at.to_rfc3339(),
        }),
    ))
}

/// Revoke the session behind the presented access token
#[utoipa::path(
    post,
    path = "/api/auth/logout",
    params(
        ("X-Tenant-ID" = String, Header, description = "Tenant the token was issued for")
    ),
    responses(
        (status = 204, description = "Logged out"),
        (status = 401, description = "Invalid token", body = ErrorResponse),
        (status = 403, description = "Tenant mismatch", body = ErrorResponse)
    ),
    tag = "Authentication",
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn logout(
    State(state): State<AppState>,
    ctx: AuthContext,
) -> Result<impl IntoResponse, AppError> {
    state.auth_service.logout(&ctx.tenant_id, &ctx.jti).await?;
    tracing::info!(user_id = %ctx.user_id, "Logged out");
    Ok(StatusCode::NO_CONTENT)
}
