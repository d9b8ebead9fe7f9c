use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::TenantId;

/// A login session, bound one-to-one to an issued access token.
///
/// Expiry is checked passively at validation time; the only mutation is
/// revocation.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: String,
    pub tenant_id: TenantId,
    pub user_id: String,
    /// `jti` of the access token issued for this session.
    pub token_id: String,
    pub expires_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
}

impl Session {
    pub fn new(
        tenant_id: TenantId,
        user_id: impl Into<String>,
        token_id: impl Into<String>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            tenant_id,
            user_id: user_id.into(),
            token_id: token_id.into(),
            expires_at,
            revoked_at: None,
        }
    }

    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.revoked_at.is_none() && now < self.expires_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_session_activity() {
        let now = Utc::now();
        let mut session = Session::new(
            TenantId::new("t1"),
            "u1",
            "jti-1",
            now + Duration::minutes(15),
        );
        assert!(session.is_active_at(now));
        assert!(!session.is_active_at(now + Duration::minutes(16)));

        session.revoked_at = Some(now);
        assert!(!session.is_active_at(now));
    }
}
