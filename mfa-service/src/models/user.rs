//! User model - tenant-scoped accounts that can log in.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::TenantId;

/// User state codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserState {
    Active,
    Suspended,
}

impl UserState {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserState::Active => "ACTIVE",
            UserState::Suspended => "SUSPENDED",
        }
    }
}

/// User entity (tenant-scoped).
#[derive(Debug, Clone)]
pub struct User {
    pub id: String,
    pub tenant_id: TenantId,
    pub username: String,
    pub status: String,
    /// PHC-formatted Argon2 hash; absent for accounts that never set one.
    pub credential_hash: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn new(id: impl Into<String>, tenant_id: TenantId, username: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            tenant_id,
            username: username.into(),
            status: UserState::Active.as_str().to_string(),
            credential_hash: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_credential_hash(mut self, hash: impl Into<String>) -> Self {
        self.credential_hash = Some(hash.into());
        self
    }

    pub fn is_active(&self) -> bool {
        self.status == UserState::Active.as_str()
    }
}
