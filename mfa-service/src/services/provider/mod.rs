//! Remote MFA provider: wire types, the `MfaProvider` seam and its HTTP
//! implementation.

pub mod client;
pub mod error;
pub mod http;
pub mod mock;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::models::TenantId;

pub use client::ProviderClient;
pub use error::{classify_status, ProviderError, ProviderErrorKind};
pub use http::HttpMfaProvider;
pub use mock::MockMfaProvider;

/// Endpoint labels used in logs and metrics.
pub mod endpoint {
    pub const ENROLL: &str = "enroll";
    pub const ACTIVATE: &str = "activate";
    pub const CHALLENGE_INIT: &str = "challenge_init";
    pub const APPROVE: &str = "approve";
}

#[derive(Debug, Clone, Serialize)]
pub struct EnrollRequest {
    pub tenant_id: String,
    pub user_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrollResponse {
    pub enrollment_id: String,
    pub pairing_code: String,
    /// Passed through to the client as reported.
    pub expires_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ActivateRequest {
    pub pairing_code: String,
    pub public_key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivateResponse {
    /// Canonical device id assigned by the provider; may differ from ours.
    #[serde(default)]
    pub device_id: String,
    #[serde(default)]
    pub state: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChallengeInitRequest {
    pub tenant_id: String,
    pub user_id: String,
    pub device_id: String,
    pub action: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChallengeInitResponse {
    pub challenge_id: String,
    pub state: String,
    #[serde(default)]
    pub issued_at: Option<String>,
    #[serde(default)]
    pub expires_at: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ApproveRequest {
    pub device_id: String,
    pub signature: String,
    pub payload: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub totp_code: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApproveResponse {
    /// Terminal status reported by the provider, when it sends one.
    #[serde(default, alias = "state")]
    pub status: Option<String>,
}

#[async_trait]
pub trait MfaProvider: Send + Sync {
    async fn enroll(
        &self,
        tenant_id: &TenantId,
        request: &EnrollRequest,
    ) -> Result<EnrollResponse, ProviderError>;

    async fn activate(
        &self,
        tenant_id: &TenantId,
        request: &ActivateRequest,
    ) -> Result<ActivateResponse, ProviderError>;

    async fn create_challenge(
        &self,
        tenant_id: &TenantId,
        request: &ChallengeInitRequest,
    ) -> Result<ChallengeInitResponse, ProviderError>;

    async fn approve(
        &self,
        tenant_id: &TenantId,
        challenge_id: &str,
        request: &ApproveRequest,
    ) -> Result<ApproveResponse, ProviderError>;
}
