pub mod auth;
pub mod mfa;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Error body shared by every endpoint.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    #[schema(example = "invalid_state")]
    pub code: String,
    #[schema(example = "Invalid state")]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schema(example = "device is PENDING")]
    pub details: Option<String>,
}
