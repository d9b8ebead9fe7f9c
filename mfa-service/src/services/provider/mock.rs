use async_trait::async_trait;
use chrono::{Duration, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

use super::{
    ActivateRequest, ActivateResponse, ApproveRequest, ApproveResponse, ChallengeInitRequest,
    ChallengeInitResponse, EnrollRequest, EnrollResponse, MfaProvider, ProviderError,
};
use super::endpoint::{ACTIVATE, APPROVE, CHALLENGE_INIT, ENROLL};
use crate::models::TenantId;

#[derive(Default)]
struct Script {
    canonical_device_id: Option<String>,
    challenge_state: Option<String>,
    approve_status: Option<String>,
    failures: HashMap<&'static str, (u16, String)>,
}

/// Scripted in-process provider for tests and local runs.
///
/// Counts calls per endpoint and fails an endpoint with a fixed status when
/// told to.
#[derive(Default)]
pub struct MockMfaProvider {
    calls: Mutex<HashMap<&'static str, u64>>,
    sequence: AtomicU64,
    script: Mutex<Script>,
}

impl MockMfaProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report `device_id` as the canonical id on activation.
    pub fn with_canonical_device_id(self, device_id: impl Into<String>) -> Self {
        self.script().canonical_device_id = Some(device_id.into());
        self
    }

    /// State reported for new challenges (default `PUSH_SENT`).
    pub fn with_challenge_state(self, state: impl Into<String>) -> Self {
        self.script().challenge_state = Some(state.into());
        self
    }

    /// Status reported on approval (default: none, an empty acknowledgement).
    pub fn with_approve_status(self, status: impl Into<String>) -> Self {
        self.script().approve_status = Some(status.into());
        self
    }

    pub fn fail(&self, endpoint: &'static str, status: u16, body: impl Into<String>) {
        self.script().failures.insert(endpoint, (status, body.into()));
    }

    pub fn clear_failures(&self) {
        self.script().failures.clear();
    }

    pub fn calls(&self, endpoint: &str) -> u64 {
        lock(&self.calls).get(endpoint).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> u64 {
        lock(&self.calls).values().sum()
    }

    fn script(&self) -> MutexGuard<'_, Script> {
        lock(&self.script)
    }

    fn record(&self, endpoint: &'static str) -> Result<u64, ProviderError> {
        *lock(&self.calls).entry(endpoint).or_insert(0) += 1;

        if let Some((status, body)) = self.script().failures.get(endpoint).cloned() {
            return Err(ProviderError::Status { status, body });
        }
        Ok(self.sequence.fetch_add(1, Ordering::SeqCst) + 1)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl MfaProvider for MockMfaProvider {
    async fn enroll(
        &self,
        _tenant_id: &TenantId,
        _request: &EnrollRequest,
    ) -> Result<EnrollResponse, ProviderError> {
        let n = self.record(ENROLL)?;
        Ok(EnrollResponse {
            enrollment_id: format!("enr-{}", n),
            pairing_code: format!("PAIR-{:04}", n),
            expires_at: (Utc::now() + Duration::minutes(10)).to_rfc3339(),
        })
    }

    async fn activate(
        &self,
        _tenant_id: &TenantId,
        _request: &ActivateRequest,
    ) -> Result<ActivateResponse, ProviderError> {
        self.record(ACTIVATE)?;
        Ok(ActivateResponse {
            device_id: self.script().canonical_device_id.clone().unwrap_or_default(),
            state: "ACTIVE".to_string(),
        })
    }

    async fn create_challenge(
        &self,
        _tenant_id: &TenantId,
        _request: &ChallengeInitRequest,
    ) -> Result<ChallengeInitResponse, ProviderError> {
        self.record(CHALLENGE_INIT)?;
        let now = Utc::now();
        Ok(ChallengeInitResponse {
            challenge_id: format!("chl-{}", Uuid::new_v4().simple()),
            state: self
                .script()
                .challenge_state
                .clone()
                .unwrap_or_else(|| "PUSH_SENT".to_string()),
            issued_at: Some(now.to_rfc3339()),
            expires_at: Some((now + Duration::minutes(2)).to_rfc3339()),
        })
    }

    async fn approve(
        &self,
        _tenant_id: &TenantId,
        _challenge_id: &str,
        _request: &ApproveRequest,
    ) -> Result<ApproveResponse, ProviderError> {
        self.record(APPROVE)?;
        Ok(ApproveResponse {
            status: self.script().approve_status.clone(),
        })
    }
}
