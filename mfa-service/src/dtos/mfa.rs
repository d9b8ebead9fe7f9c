use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct EnrollRequest {
    #[validate(length(min = 1, max = 128, message = "Device id is required"))]
    #[schema(example = "d1")]
    pub device_id: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct EnrollResponse {
    #[schema(example = "enr-1")]
    pub enrollment_id: String,
    #[schema(example = "PAIR-0001")]
    pub pairing_code: String,
    pub expires_at: String,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct ActivateRequest {
    #[validate(length(min = 1, max = 128, message = "Device id is required"))]
    #[schema(example = "d1")]
    pub device_id: String,

    #[validate(length(min = 1, message = "Pairing code is required"))]
    #[schema(example = "PAIR-0001")]
    pub pairing_code: String,

    #[validate(length(min = 1, message = "Public key is required"))]
    pub public_key: String,

    #[validate(length(max = 128))]
    #[schema(example = "Work phone")]
    pub label: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ActivateResponse {
    #[schema(example = "d1")]
    pub device_id: String,
    #[schema(example = "ACTIVE")]
    pub state: String,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct ChallengeRequest {
    #[validate(length(min = 1, max = 128, message = "Device id is required"))]
    #[schema(example = "d1")]
    pub device_id: String,

    #[validate(length(min = 1, message = "Action is required"))]
    #[schema(example = "login")]
    pub action: String,

    #[schema(value_type = Option<Object>)]
    pub context: Option<serde_json::Value>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ChallengeResponse {
    #[schema(example = "chl-1")]
    pub challenge_id: String,
    #[schema(example = "PUSH_SENT")]
    pub state: String,
    pub issued_at: String,
    pub expires_at: String,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct ApproveRequest {
    #[validate(length(min = 1, message = "Challenge id is required"))]
    #[schema(example = "chl-1")]
    pub challenge_id: String,

    #[validate(length(min = 1, message = "Device id is required"))]
    #[schema(example = "d1")]
    pub device_id: String,

    #[validate(length(min = 1, message = "Signature is required"))]
    pub signature: String,

    /// Signed payload; must carry a single-use `nonce`.
    #[schema(value_type = Object, example = json!({"nonce": "n1"}))]
    pub payload: serde_json::Value,

    pub totp_code: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ApproveResponse {
    pub challenge_id: String,
    #[schema(example = "APPROVED")]
    pub status: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ChallengeStatusResponse {
    pub challenge_id: String,
    #[schema(example = "PUSH_SENT")]
    pub status: String,
    pub updated_at: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct DeviceStatusResponse {
    pub device_id: String,
    #[schema(example = "ACTIVE")]
    pub status: String,
}
