use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts},
    middleware::Next,
    response::Response,
};
use service_core::error::AppError;

use crate::models::TenantId;
use crate::AppState;

/// Authenticated caller, taken from a validated access token.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub tenant_id: TenantId,
    pub user_id: String,
    pub jti: String,
    /// Token expiry (Unix timestamp).
    pub exp: i64,
}

fn unauthorized(message: &'static str) -> AppError {
    AppError::Unauthorized(anyhow::anyhow!(message))
}

/// Middleware to require a valid bearer token backed by a live session.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or_else(|| unauthorized("Missing or invalid Authorization header"))?;

    let claims = state.auth_service.jwt().validate(token).map_err(|e| {
        tracing::debug!(error = %e, "Rejected access token");
        unauthorized("Invalid or expired token")
    })?;

    let tenant_id = TenantId::new(claims.tenant_id);
    if tenant_id.is_empty() {
        return Err(unauthorized("Invalid or expired token"));
    }

    // Fail closed: a session that cannot be confirmed is treated as revoked.
    let active = state
        .auth_service
        .is_session_active(&tenant_id, &claims.jti)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Session lookup failed");
            unauthorized("Session could not be verified")
        })?;
    if !active {
        return Err(unauthorized("Session has been revoked"));
    }

    req.extensions_mut().insert(AuthContext {
        tenant_id,
        user_id: claims.sub,
        jti: claims.jti,
        exp: claims.exp,
    });

    Ok(next.run(req).await)
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for AuthContext
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthContext>()
            .cloned()
            .ok_or_else(|| unauthorized("Authentication required"))
    }
}
