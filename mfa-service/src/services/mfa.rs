use tracing::instrument;

use super::challenges::{ApprovalDecision, ChallengeLifecycle};
use super::devices::{ActivationOutcome, DeviceLifecycle, EnrollmentOutcome};
use super::ServiceError;
use crate::models::{MfaChallenge, MfaDevice, TenantId};

/// Entry point for every MFA operation. Tenant and user are always explicit
/// arguments taken from the authenticated request.
#[derive(Clone)]
pub struct MfaService {
    devices: DeviceLifecycle,
    challenges: ChallengeLifecycle,
}

impl MfaService {
    pub fn new(devices: DeviceLifecycle, challenges: ChallengeLifecycle) -> Self {
        Self {
            devices,
            challenges,
        }
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id))]
    pub async fn enroll(
        &self,
        tenant_id: &TenantId,
        user_id: &str,
        device_id: &str,
    ) -> Result<EnrollmentOutcome, ServiceError> {
        self.devices.enroll(tenant_id, user_id, device_id).await
    }

    #[instrument(skip(self, pairing_code, public_key), fields(tenant_id = %tenant_id))]
    pub async fn activate(
        &self,
        tenant_id: &TenantId,
        user_id: &str,
        device_id: &str,
        pairing_code: &str,
        public_key: &str,
        label: Option<&str>,
    ) -> Result<ActivationOutcome, ServiceError> {
        self.devices
            .activate(tenant_id, user_id, device_id, pairing_code, public_key, label)
            .await
    }

    #[instrument(skip(self, context), fields(tenant_id = %tenant_id))]
    pub async fn create_challenge(
        &self,
        tenant_id: &TenantId,
        user_id: &str,
        device_id: &str,
        action: &str,
        context: Option<serde_json::Value>,
    ) -> Result<MfaChallenge, ServiceError> {
        self.challenges
            .create(tenant_id, user_id, device_id, action, context)
            .await
    }

    #[instrument(
        skip(self, decision),
        fields(tenant_id = %tenant_id, device_id = %decision.device_id)
    )]
    pub async fn approve(
        &self,
        tenant_id: &TenantId,
        user_id: &str,
        challenge_id: &str,
        decision: &ApprovalDecision,
    ) -> Result<MfaChallenge, ServiceError> {
        self.challenges
            .approve(tenant_id, user_id, challenge_id, decision)
            .await
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id))]
    pub async fn get_challenge(
        &self,
        tenant_id: &TenantId,
        challenge_id: &str,
    ) -> Result<MfaChallenge, ServiceError> {
        self.challenges.get(tenant_id, challenge_id).await
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id))]
    pub async fn device_status(
        &self,
        tenant_id: &TenantId,
        device_id: &str,
    ) -> Result<MfaDevice, ServiceError> {
        self.devices.status(tenant_id, device_id).await
    }
}
