//! Tenant enforcement for authenticated routes.

use axum::{extract::Request, middleware::Next, response::Response};
use service_core::error::AppError;

use super::AuthContext;

pub const TENANT_HEADER: &str = "x-tenant-id";

/// Require the `X-Tenant-ID` header to name the tenant the token was issued
/// for. Must run after `auth_middleware`.
pub async fn enforce_tenant_middleware(req: Request, next: Next) -> Result<Response, AppError> {
    let header_tenant = req
        .headers()
        .get(TENANT_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty());

    let token_tenant = req
        .extensions()
        .get::<AuthContext>()
        .map(|ctx| ctx.tenant_id.clone());

    match (header_tenant, token_tenant) {
        (Some(header), Some(token)) if header == token.as_str() => Ok(next.run(req).await),
        (None, _) => Err(AppError::Forbidden(anyhow::anyhow!(
            "Missing X-Tenant-ID header"
        ))),
        (Some(header), _) => {
            tracing::warn!(header_tenant = %header, "Tenant header does not match token");
            Err(AppError::Forbidden(anyhow::anyhow!("Tenant mismatch")))
        }
    }
}
