use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;

use super::metrics;
use super::nonce::NonceGuard;
use super::provider::{ApproveRequest, ChallengeInitRequest, MfaProvider, ProviderError};
use super::repository::{ChallengeRepository, DeviceRepository, StoreError};
use super::{reconcile_required, ServiceError};
use crate::models::{ChallengeState, DeviceState, MfaChallenge, TenantId};

/// Decision submitted by the user's device.
#[derive(Debug, Clone)]
pub struct ApprovalDecision {
    pub device_id: String,
    pub signature: String,
    pub payload: serde_json::Value,
    pub totp_code: Option<String>,
}

impl ApprovalDecision {
    /// The `nonce` field of the payload, when it is a non-empty string.
    pub fn nonce(&self) -> Option<&str> {
        self.payload
            .get("nonce")
            .and_then(serde_json::Value::as_str)
            .filter(|n| !n.is_empty())
    }
}

/// Owns challenge issuance and the replay-protected approval.
#[derive(Clone)]
pub struct ChallengeLifecycle {
    devices: Arc<dyn DeviceRepository>,
    challenges: Arc<dyn ChallengeRepository>,
    nonces: Arc<dyn NonceGuard>,
    provider: Arc<dyn MfaProvider>,
    challenge_ttl: chrono::Duration,
    nonce_ttl: Duration,
}

impl ChallengeLifecycle {
    pub fn new(
        devices: Arc<dyn DeviceRepository>,
        challenges: Arc<dyn ChallengeRepository>,
        nonces: Arc<dyn NonceGuard>,
        provider: Arc<dyn MfaProvider>,
        challenge_ttl: chrono::Duration,
        nonce_ttl: Duration,
    ) -> Self {
        Self {
            devices,
            challenges,
            nonces,
            provider,
            challenge_ttl,
            nonce_ttl,
        }
    }

    pub async fn create(
        &self,
        tenant_id: &TenantId,
        user_id: &str,
        device_id: &str,
        action: &str,
        context: Option<serde_json::Value>,
    ) -> Result<MfaChallenge, ServiceError> {
        let device = self
            .devices
            .find_by_id(tenant_id, device_id)
            .await?
            .filter(|d| d.is_owned_by(user_id))
            .ok_or_else(|| ServiceError::InvalidState("device not enrolled".to_string()))?;

        if device.state != DeviceState::Active {
            return Err(ServiceError::InvalidState(format!(
                "device is {}",
                device.state
            )));
        }

        let response = self
            .provider
            .create_challenge(
                tenant_id,
                &ChallengeInitRequest {
                    tenant_id: tenant_id.to_string(),
                    user_id: user_id.to_string(),
                    device_id: device_id.to_string(),
                    action: action.to_string(),
                    context,
                },
            )
            .await?;

        if response.challenge_id.trim().is_empty() {
            return Err(ProviderError::UnexpectedState("missing challenge_id".to_string()).into());
        }
        let state: ChallengeState = response
            .state
            .parse()
            .map_err(|_| ProviderError::UnexpectedState(response.state.clone()))?;

        let challenge = MfaChallenge::issue(
            tenant_id.clone(),
            user_id,
            device_id,
            action,
            response.challenge_id,
            state,
            Utc::now(),
            self.challenge_ttl,
        );

        self.challenges
            .create(&challenge)
            .await
            .map_err(|e| reconcile_required("create_challenge", tenant_id, &challenge.id, e))?;

        tracing::info!(
            challenge_id = %challenge.id,
            device_id = %device_id,
            state = %challenge.state,
            "Challenge issued"
        );

        Ok(challenge)
    }

    /// Approve a challenge at most once.
    ///
    /// Every local rejection happens before the provider is contacted. A
    /// nonce is consumed only for a challenge that belongs to the caller and
    /// has not expired.
    ///
    /// The nonce is checked before the awaiting-decision state, so a
    /// replayed approval reports `nonce_reuse` even after its challenge has
    /// been decided.
    pub async fn approve(
        &self,
        tenant_id: &TenantId,
        user_id: &str,
        challenge_id: &str,
        decision: &ApprovalDecision,
    ) -> Result<MfaChallenge, ServiceError> {
        let challenge = self
            .challenges
            .find_by_id(tenant_id, challenge_id)
            .await?
            .filter(|c| c.user_id == user_id)
            .ok_or_else(|| ServiceError::InvalidState("challenge not found".to_string()))?;

        if challenge.device_id != decision.device_id {
            return Err(ServiceError::InvalidState(
                "challenge was issued to another device".to_string(),
            ));
        }

        if challenge.state.is_awaiting_decision() && challenge.is_expired_at(Utc::now()) {
            return Err(ServiceError::Expired);
        }

        let nonce = decision.nonce().ok_or(ServiceError::MissingNonce)?;
        let accepted = self
            .nonces
            .check_and_set(tenant_id, nonce, self.nonce_ttl)
            .await
            .map_err(ServiceError::Storage)?;
        if !accepted {
            metrics::record_nonce_rejection();
            tracing::warn!(challenge_id = %challenge_id, "Rejected replayed approval nonce");
            return Err(ServiceError::NonceReuse);
        }

        if !challenge.state.is_awaiting_decision() {
            return Err(ServiceError::InvalidState(format!(
                "challenge is {}",
                challenge.state
            )));
        }

        let response = self
            .provider
            .approve(
                tenant_id,
                &challenge.provider_challenge_id,
                &ApproveRequest {
                    device_id: decision.device_id.clone(),
                    signature: decision.signature.clone(),
                    payload: decision.payload.clone(),
                    totp_code: decision.totp_code.clone(),
                },
            )
            .await?;

        let status = match response.status {
            None => ChallengeState::Approved,
            Some(reported) => reported
                .parse::<ChallengeState>()
                .ok()
                .filter(ChallengeState::is_decided)
                .ok_or(ProviderError::UnexpectedState(reported))?,
        };

        let decided = self
            .challenges
            .transition(tenant_id, challenge_id, challenge.state, status)
            .await
            .map_err(|e| match e {
                StoreError::StateConflict { .. } => ServiceError::from(e),
                other => reconcile_required("approve", tenant_id, challenge_id, other),
            })?;

        tracing::info!(challenge_id = %challenge_id, status = %decided.state, "Challenge decided");

        Ok(decided)
    }

    pub async fn get(
        &self,
        tenant_id: &TenantId,
        challenge_id: &str,
    ) -> Result<MfaChallenge, ServiceError> {
        self.challenges
            .find_by_id(tenant_id, challenge_id)
            .await?
            .ok_or(ServiceError::NotFound("Challenge"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn decision(payload: serde_json::Value) -> ApprovalDecision {
        ApprovalDecision {
            device_id: "d1".to_string(),
            signature: "sig".to_string(),
            payload,
            totp_code: None,
        }
    }

    #[test]
    fn test_nonce_extraction() {
        assert_eq!(decision(json!({"nonce": "n1"})).nonce(), Some("n1"));
        assert_eq!(decision(json!({"nonce": ""})).nonce(), None);
        assert_eq!(decision(json!({"nonce": 7})).nonce(), None);
        assert_eq!(decision(json!({})).nonce(), None);
        assert_eq!(decision(json!(null)).nonce(), None);
    }
}
