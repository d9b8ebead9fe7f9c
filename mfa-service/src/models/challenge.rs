//! MFA challenge model - one authentication ceremony on a device.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use utoipa::ToSchema;

use super::TenantId;

/// Challenge states as reported by the provider.
///
/// `Issued` and `PushSent` await a decision; the rest are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChallengeState {
    Issued,
    PushSent,
    Approved,
    Denied,
    Expired,
}

impl ChallengeState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChallengeState::Issued => "ISSUED",
            ChallengeState::PushSent => "PUSH_SENT",
            ChallengeState::Approved => "APPROVED",
            ChallengeState::Denied => "DENIED",
            ChallengeState::Expired => "EXPIRED",
        }
    }

    pub fn is_awaiting_decision(&self) -> bool {
        matches!(self, ChallengeState::Issued | ChallengeState::PushSent)
    }

    pub fn is_decided(&self) -> bool {
        !self.is_awaiting_decision()
    }
}

impl fmt::Display for ChallengeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChallengeState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "ISSUED" => Ok(ChallengeState::Issued),
            "PUSH_SENT" => Ok(ChallengeState::PushSent),
            "APPROVED" => Ok(ChallengeState::Approved),
            "DENIED" => Ok(ChallengeState::Denied),
            "EXPIRED" => Ok(ChallengeState::Expired),
            _ => Err(format!("Invalid challenge state: {}", s)),
        }
    }
}

/// MFA challenge entity (tenant-scoped, mutated once on decision).
#[derive(Debug, Clone)]
pub struct MfaChallenge {
    pub id: String,
    pub tenant_id: TenantId,
    pub user_id: String,
    pub device_id: String,
    pub action: String,
    pub state: ChallengeState,
    pub provider_challenge_id: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MfaChallenge {
    #[allow(clippy::too_many_arguments)]
    pub fn issue(
        tenant_id: TenantId,
        user_id: impl Into<String>,
        device_id: impl Into<String>,
        action: impl Into<String>,
        provider_challenge_id: impl Into<String>,
        state: ChallengeState,
        issued_at: DateTime<Utc>,
        ttl: Duration,
    ) -> Self {
        let provider_challenge_id = provider_challenge_id.into();
        Self {
            id: provider_challenge_id.clone(),
            tenant_id,
            user_id: user_id.into(),
            device_id: device_id.into(),
            action: action.into(),
            state,
            provider_challenge_id,
            issued_at,
            expires_at: issued_at + ttl,
            updated_at: issued_at,
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_awaiting_states() {
        assert!(ChallengeState::Issued.is_awaiting_decision());
        assert!(ChallengeState::PushSent.is_awaiting_decision());
        assert!(ChallengeState::Approved.is_decided());
        assert!(ChallengeState::Denied.is_decided());
        assert!(ChallengeState::Expired.is_decided());
    }

    #[test]
    fn test_provider_states_parse_case_insensitively() {
        assert_eq!("push_sent".parse::<ChallengeState>(), Ok(ChallengeState::PushSent));
        assert_eq!("APPROVED".parse::<ChallengeState>(), Ok(ChallengeState::Approved));
        assert!("WAITING".parse::<ChallengeState>().is_err());
    }

    #[test]
    fn test_expiry_window() {
        let now = Utc::now();
        let challenge = MfaChallenge::issue(
            TenantId::new("t1"),
            "u1",
            "d1",
            "login",
            "c1",
            ChallengeState::PushSent,
            now,
            Duration::minutes(2),
        );

        assert_eq!(challenge.id, "c1");
        assert!(!challenge.is_expired_at(now + Duration::seconds(119)));
        assert!(challenge.is_expired_at(now + Duration::minutes(2)));
    }
}
