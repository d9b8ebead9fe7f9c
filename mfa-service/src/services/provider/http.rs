use async_trait::async_trait;
use serde::de::DeserializeOwned;

use super::endpoint::{ACTIVATE, APPROVE, CHALLENGE_INIT, ENROLL};
use super::{
    ActivateRequest, ActivateResponse, ApproveRequest, ApproveResponse, ChallengeInitRequest,
    ChallengeInitResponse, EnrollRequest, EnrollResponse, MfaProvider, ProviderClient,
    ProviderError,
};
use crate::models::TenantId;

/// `MfaProvider` backed by the provider's REST API.
#[derive(Clone)]
pub struct HttpMfaProvider {
    client: ProviderClient,
}

impl HttpMfaProvider {
    pub fn new(client: ProviderClient) -> Self {
        Self { client }
    }
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, ProviderError> {
    Ok(serde_json::from_slice(bytes)?)
}

#[async_trait]
impl MfaProvider for HttpMfaProvider {
    async fn enroll(
        &self,
        tenant_id: &TenantId,
        request: &EnrollRequest,
    ) -> Result<EnrollResponse, ProviderError> {
        let bytes = self
            .client
            .post(ENROLL, "/v1/enrollments/init", tenant_id, request)
            .await?;
        decode(&bytes)
    }

    async fn activate(
        &self,
        tenant_id: &TenantId,
        request: &ActivateRequest,
    ) -> Result<ActivateResponse, ProviderError> {
        let bytes = self
            .client
            .post(ACTIVATE, "/v1/devices/activate", tenant_id, request)
            .await?;
        decode(&bytes)
    }

    async fn create_challenge(
        &self,
        tenant_id: &TenantId,
        request: &ChallengeInitRequest,
    ) -> Result<ChallengeInitResponse, ProviderError> {
        let bytes = self
            .client
            .post(CHALLENGE_INIT, "/v1/auth/challenges/init", tenant_id, request)
            .await?;
        decode(&bytes)
    }

    async fn approve(
        &self,
        tenant_id: &TenantId,
        challenge_id: &str,
        request: &ApproveRequest,
    ) -> Result<ApproveResponse, ProviderError> {
        let path = format!("/v1/auth/challenges/{}/approve", challenge_id);
        let bytes = self
            .client
            .post(APPROVE, &path, tenant_id, request)
            .await?;

        // The provider may acknowledge an approval with an empty body.
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(ApproveResponse::default());
        }
        decode(&bytes)
    }
}
