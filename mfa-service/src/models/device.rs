//! MFA device model and its pairing lifecycle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use utoipa::ToSchema;

use super::TenantId;

/// Device lifecycle states.
///
/// The only legal path is `Pending -> PairingPending -> Active`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeviceState {
    Pending,
    PairingPending,
    Active,
}

impl DeviceState {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceState::Pending => "PENDING",
            DeviceState::PairingPending => "PAIRING_PENDING",
            DeviceState::Active => "ACTIVE",
        }
    }

    /// Whether `next` is the single state that may follow this one.
    pub fn can_transition_to(&self, next: DeviceState) -> bool {
        matches!(
            (self, next),
            (DeviceState::Pending, DeviceState::PairingPending)
                | (DeviceState::PairingPending, DeviceState::Active)
        )
    }
}

impl fmt::Display for DeviceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeviceState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(DeviceState::Pending),
            "PAIRING_PENDING" => Ok(DeviceState::PairingPending),
            "ACTIVE" => Ok(DeviceState::Active),
            _ => Err(format!("Invalid device state: {}", s)),
        }
    }
}

/// MFA device entity (tenant-scoped, never deleted).
#[derive(Debug, Clone)]
pub struct MfaDevice {
    pub id: String,
    pub tenant_id: TenantId,
    pub user_id: String,
    pub display_name: Option<String>,
    pub public_key: Option<String>,
    pub state: DeviceState,
    pub provider_enrollment_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MfaDevice {
    /// A freshly registered device awaiting enrollment at the provider.
    pub fn pending(tenant_id: TenantId, user_id: impl Into<String>, id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            tenant_id,
            user_id: user_id.into(),
            display_name: None,
            public_key: None,
            state: DeviceState::Pending,
            provider_enrollment_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_owned_by(&self, user_id: &str) -> bool {
        self.user_id == user_id
    }
}

/// Fields written alongside a state transition. `None` keeps the stored value.
#[derive(Debug, Clone, Default)]
pub struct DeviceChanges {
    pub provider_enrollment_id: Option<String>,
    pub public_key: Option<String>,
    pub display_name: Option<String>,
}

impl DeviceChanges {
    pub fn apply(self, device: &mut MfaDevice) {
        if let Some(enrollment_id) = self.provider_enrollment_id {
            device.provider_enrollment_id = Some(enrollment_id);
        }
        if let Some(public_key) = self.public_key {
            device.public_key = Some(public_key);
        }
        if let Some(display_name) = self.display_name {
            device.display_name = Some(display_name);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_forward_transitions_are_legal() {
        assert!(DeviceState::Pending.can_transition_to(DeviceState::PairingPending));
        assert!(DeviceState::PairingPending.can_transition_to(DeviceState::Active));

        assert!(!DeviceState::Pending.can_transition_to(DeviceState::Active));
        assert!(!DeviceState::Active.can_transition_to(DeviceState::PairingPending));
        assert!(!DeviceState::Active.can_transition_to(DeviceState::Active));
    }

    #[test]
    fn test_state_parsing() {
        assert_eq!(
            "PAIRING_PENDING".parse::<DeviceState>(),
            Ok(DeviceState::PairingPending)
        );
        assert!("pairing_pending".parse::<DeviceState>().is_err());
    }

    #[test]
    fn test_changes_keep_unset_fields() {
        let mut device = MfaDevice::pending(TenantId::new("t1"), "u1", "d1");
        device.display_name = Some("Phone".to_string());

        DeviceChanges {
            public_key: Some("pk".to_string()),
            ..Default::default()
        }
        .apply(&mut device);

        assert_eq!(device.public_key.as_deref(), Some("pk"));
        assert_eq!(device.display_name.as_deref(), Some("Phone"));
    }
}
