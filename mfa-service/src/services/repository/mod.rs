//! Storage seams for users, sessions, devices and challenges.
//!
//! Every method takes the tenant explicitly; a record stored under another
//! tenant is indistinguishable from a missing one.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::models::{
    ChallengeState, DeviceChanges, DeviceState, MfaChallenge, MfaDevice, Session, TenantId, User,
};

pub use memory::{
    InMemoryChallengeRepository, InMemoryDeviceRepository, InMemorySessionRepository,
    InMemoryUserRepository,
};
pub use postgres::{
    PgChallengeRepository, PgDeviceRepository, PgSessionRepository, PgUserRepository,
};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Record already exists")]
    AlreadyExists,

    #[error("Record not found")]
    NotFound,

    /// Compare-and-set lost: the stored state was not the expected one.
    #[error("State conflict: expected {expected}, found {actual}")]
    StateConflict { expected: String, actual: String },

    #[error("Illegal transition from {from} to {to}")]
    IllegalTransition { from: String, to: String },

    #[error("Storage backend error: {0}")]
    Backend(#[from] anyhow::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            if db_err.is_unique_violation() {
                return StoreError::AlreadyExists;
            }
        }
        StoreError::Backend(anyhow::Error::new(err))
    }
}

/// Reject device transitions that skip or reverse a lifecycle step.
pub(crate) fn check_device_transition(
    from: DeviceState,
    to: DeviceState,
) -> Result<(), StoreError> {
    if from.can_transition_to(to) {
        Ok(())
    } else {
        Err(StoreError::IllegalTransition {
            from: from.to_string(),
            to: to.to_string(),
        })
    }
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn find_by_username(
        &self,
        tenant_id: &TenantId,
        username: &str,
    ) -> Result<Option<User>, StoreError>;

    async fn find_by_id(&self, tenant_id: &TenantId, id: &str)
        -> Result<Option<User>, StoreError>;

    async fn create(&self, user: &User) -> Result<(), StoreError>;
}

#[async_trait]
pub trait SessionRepository: Send + Sync {
    async fn create(&self, session: &Session) -> Result<(), StoreError>;

    async fn find_by_token_id(
        &self,
        tenant_id: &TenantId,
        token_id: &str,
    ) -> Result<Option<Session>, StoreError>;

    /// Mark the session revoked. Revoking twice keeps the first timestamp.
    async fn revoke_by_token_id(
        &self,
        tenant_id: &TenantId,
        token_id: &str,
        revoked_at: DateTime<Utc>,
    ) -> Result<(), StoreError>;
}

#[async_trait]
pub trait DeviceRepository: Send + Sync {
    /// Insert a new device; an existing `(tenant, id)` yields `AlreadyExists`.
    async fn create(&self, device: &MfaDevice) -> Result<(), StoreError>;

    async fn find_by_id(
        &self,
        tenant_id: &TenantId,
        id: &str,
    ) -> Result<Option<MfaDevice>, StoreError>;

    /// Atomically move the device from `from` to `to`, applying `changes`.
    ///
    /// Fails with `StateConflict` when the stored state is not `from`, so
    /// concurrent callers race to a single winner.
    async fn transition(
        &self,
        tenant_id: &TenantId,
        id: &str,
        from: DeviceState,
        to: DeviceState,
        changes: DeviceChanges,
    ) -> Result<MfaDevice, StoreError>;
}

#[async_trait]
pub trait ChallengeRepository: Send + Sync {
    async fn create(&self, challenge: &MfaChallenge) -> Result<(), StoreError>;

    async fn find_by_id(
        &self,
        tenant_id: &TenantId,
        id: &str,
    ) -> Result<Option<MfaChallenge>, StoreError>;

    /// Compare-and-set on the challenge state.
    async fn transition(
        &self,
        tenant_id: &TenantId,
        id: &str,
        from: ChallengeState,
        to: ChallengeState,
    ) -> Result<MfaChallenge, StoreError>;
}
