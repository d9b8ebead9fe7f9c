use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct LoginRequest {
    #[validate(length(min = 1, message = "Tenant is required"))]
    #[schema(example = "demo-tenant")]
    pub tenant_id: String,

    #[validate(length(min = 1, message = "Username is required"))]
    #[schema(example = "demo")]
    pub username: String,

    #[validate(length(min = 1, message = "Password is required"))]
    #[schema(example = "demo-password")]
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct LoginResponse {
    pub access_token: String,
    #[schema(example = "Bearer")]
    pub token_type: String,
    /// RFC 3339 expiry of the access token.
    #[schema(example = "2025-01-01T12:15:00Z")]
    pub expires_at: String,
}
