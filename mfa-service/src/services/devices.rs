use std::sync::Arc;

use super::provider::{ActivateRequest, EnrollRequest, MfaProvider};
use super::repository::{DeviceRepository, StoreError};
use super::{reconcile_required, ServiceError};
use crate::models::{DeviceChanges, DeviceState, MfaDevice, TenantId};

#[derive(Debug, Clone)]
pub struct EnrollmentOutcome {
    pub device: MfaDevice,
    pub enrollment_id: String,
    pub pairing_code: String,
    pub expires_at: String,
}

#[derive(Debug, Clone)]
pub struct ActivationOutcome {
    /// Provider's canonical device id when it reported one, else ours.
    pub device_id: String,
    pub state: DeviceState,
}

/// Owns device transitions PENDING -> PAIRING_PENDING -> ACTIVE.
#[derive(Clone)]
pub struct DeviceLifecycle {
    devices: Arc<dyn DeviceRepository>,
    provider: Arc<dyn MfaProvider>,
}

impl DeviceLifecycle {
    pub fn new(devices: Arc<dyn DeviceRepository>, provider: Arc<dyn MfaProvider>) -> Self {
        Self { devices, provider }
    }

    /// Create the device as PENDING, start enrollment with the provider and
    /// move it to PAIRING_PENDING.
    ///
    /// A provider failure leaves the device PENDING. Enrolling the same
    /// device again as its owner resumes from there; any other existing
    /// device is `DeviceExists`.
    pub async fn enroll(
        &self,
        tenant_id: &TenantId,
        user_id: &str,
        device_id: &str,
    ) -> Result<EnrollmentOutcome, ServiceError> {
        let device = MfaDevice::pending(tenant_id.clone(), user_id, device_id);
        match self.devices.create(&device).await {
            Ok(()) => {}
            Err(StoreError::AlreadyExists) => {
                let resumable = self
                    .devices
                    .find_by_id(tenant_id, device_id)
                    .await?
                    .is_some_and(|d| d.is_owned_by(user_id) && d.state == DeviceState::Pending);
                if !resumable {
                    return Err(ServiceError::DeviceExists);
                }
                tracing::info!(device_id = %device_id, "Resuming interrupted enrollment");
            }
            Err(e) => return Err(e.into()),
        }

        let response = self
            .provider
            .enroll(
                tenant_id,
                &EnrollRequest {
                    tenant_id: tenant_id.to_string(),
                    user_id: user_id.to_string(),
                },
            )
            .await?;

        let device = self
            .devices
            .transition(
                tenant_id,
                device_id,
                DeviceState::Pending,
                DeviceState::PairingPending,
                DeviceChanges {
                    provider_enrollment_id: Some(response.enrollment_id.clone()),
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| match e {
                // A concurrent resume completed first.
                StoreError::StateConflict { .. } => ServiceError::DeviceExists,
                other => reconcile_required("enroll", tenant_id, device_id, other),
            })?;

        tracing::info!(
            device_id = %device_id,
            enrollment_id = %response.enrollment_id,
            "Device enrollment started"
        );

        Ok(EnrollmentOutcome {
            device,
            enrollment_id: response.enrollment_id,
            pairing_code: response.pairing_code,
            expires_at: response.expires_at,
        })
    }

    /// Confirm pairing with the provider and activate the device.
    ///
    /// The device must belong to `user_id` and be PAIRING_PENDING; this is
    /// checked before the provider is contacted.
    pub async fn activate(
        &self,
        tenant_id: &TenantId,
        user_id: &str,
        device_id: &str,
        pairing_code: &str,
        public_key: &str,
        label: Option<&str>,
    ) -> Result<ActivationOutcome, ServiceError> {
        let device = self
            .devices
            .find_by_id(tenant_id, device_id)
            .await?
            .filter(|d| d.is_owned_by(user_id))
            .ok_or_else(|| ServiceError::InvalidState("device not enrolled".to_string()))?;

        if device.state != DeviceState::PairingPending {
            return Err(ServiceError::InvalidState(format!(
                "device is {}",
                device.state
            )));
        }

        let response = self
            .provider
            .activate(
                tenant_id,
                &ActivateRequest {
                    pairing_code: pairing_code.to_string(),
                    public_key: public_key.to_string(),
                    label: label.map(str::to_string),
                },
            )
            .await?;

        let activated = self
            .devices
            .transition(
                tenant_id,
                device_id,
                DeviceState::PairingPending,
                DeviceState::Active,
                DeviceChanges {
                    public_key: Some(public_key.to_string()),
                    display_name: label.map(str::to_string),
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| match e {
                // Another activation won the race.
                StoreError::StateConflict { .. } => ServiceError::from(e),
                other => reconcile_required("activate", tenant_id, device_id, other),
            })?;

        let canonical_id = response.device_id.trim();
        if !canonical_id.is_empty() && canonical_id != device_id {
            self.create_alias(&activated, canonical_id).await?;
        }

        tracing::info!(device_id = %device_id, "Device activated");

        Ok(ActivationOutcome {
            device_id: if canonical_id.is_empty() {
                device_id.to_string()
            } else {
                canonical_id.to_string()
            },
            state: DeviceState::Active,
        })
    }

    /// Record the provider's id for an activated device as a second ACTIVE
    /// record. An existing alias is accepted.
    async fn create_alias(&self, device: &MfaDevice, alias_id: &str) -> Result<(), ServiceError> {
        let mut alias = device.clone();
        alias.id = alias_id.to_string();

        match self.devices.create(&alias).await {
            Ok(()) => {
                tracing::info!(
                    device_id = %device.id,
                    alias_id = %alias_id,
                    "Recorded provider device alias"
                );
                Ok(())
            }
            Err(StoreError::AlreadyExists) => Ok(()),
            Err(e) => Err(reconcile_required(
                "activate_alias",
                &device.tenant_id,
                alias_id,
                e,
            )),
        }
    }

    pub async fn status(
        &self,
        tenant_id: &TenantId,
        device_id: &str,
    ) -> Result<MfaDevice, ServiceError> {
        self.devices
            .find_by_id(tenant_id, device_id)
            .await?
            .ok_or(ServiceError::NotFound("Device"))
    }
}
