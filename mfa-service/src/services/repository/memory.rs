//! In-memory repositories used in development mode and tests.
//!
//! Records are keyed by `(tenant, id)`. Reads share the lock; creates and
//! transitions take it exclusively so a compare-and-set is atomic.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;

use super::{
    check_device_transition, ChallengeRepository, DeviceRepository, SessionRepository, StoreError,
    UserRepository,
};
use crate::models::{
    ChallengeState, DeviceChanges, DeviceState, MfaChallenge, MfaDevice, Session, TenantId, User,
};

type Key = (TenantId, String);

fn key(tenant_id: &TenantId, id: &str) -> Key {
    (tenant_id.clone(), id.to_string())
}

#[derive(Default)]
pub struct InMemoryUserRepository {
    users: RwLock<HashMap<Key, User>>,
}

impl InMemoryUserRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserRepository for InMemoryUserRepository {
    async fn find_by_username(
        &self,
        tenant_id: &TenantId,
        username: &str,
    ) -> Result<Option<User>, StoreError> {
        let users = self.users.read().await;
        Ok(users
            .values()
            .find(|u| &u.tenant_id == tenant_id && u.username == username)
            .cloned())
    }

    async fn find_by_id(&self, tenant_id: &TenantId, id: &str) -> Result<Option<User>, StoreError> {
        Ok(self.users.read().await.get(&key(tenant_id, id)).cloned())
    }

    async fn create(&self, user: &User) -> Result<(), StoreError> {
        let mut users = self.users.write().await;
        let taken = users
            .values()
            .any(|u| u.tenant_id == user.tenant_id && u.username == user.username);
        let k = key(&user.tenant_id, &user.id);
        if taken || users.contains_key(&k) {
            return Err(StoreError::AlreadyExists);
        }
        users.insert(k, user.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemorySessionRepository {
    sessions: RwLock<HashMap<Key, Session>>,
}

impl InMemorySessionRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionRepository for InMemorySessionRepository {
    async fn create(&self, session: &Session) -> Result<(), StoreError> {
        let mut sessions = self.sessions.write().await;
        let k = key(&session.tenant_id, &session.token_id);
        if sessions.contains_key(&k) {
            return Err(StoreError::AlreadyExists);
        }
        sessions.insert(k, session.clone());
        Ok(())
    }

    async fn find_by_token_id(
        &self,
        tenant_id: &TenantId,
        token_id: &str,
    ) -> Result<Option<Session>, StoreError> {
        Ok(self
            .sessions
            .read()
            .await
            .get(&key(tenant_id, token_id))
            .cloned())
    }

    async fn revoke_by_token_id(
        &self,
        tenant_id: &TenantId,
        token_id: &str,
        revoked_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .get_mut(&key(tenant_id, token_id))
            .ok_or(StoreError::NotFound)?;
        session.revoked_at.get_or_insert(revoked_at);
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryDeviceRepository {
    devices: RwLock<HashMap<Key, MfaDevice>>,
}

impl InMemoryDeviceRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DeviceRepository for InMemoryDeviceRepository {
    async fn create(&self, device: &MfaDevice) -> Result<(), StoreError> {
        let mut devices = self.devices.write().await;
        let k = key(&device.tenant_id, &device.id);
        if devices.contains_key(&k) {
            return Err(StoreError::AlreadyExists);
        }
        devices.insert(k, device.clone());
        Ok(())
    }

    async fn find_by_id(
        &self,
        tenant_id: &TenantId,
        id: &str,
    ) -> Result<Option<MfaDevice>, StoreError> {
        Ok(self.devices.read().await.get(&key(tenant_id, id)).cloned())
    }

    async fn transition(
        &self,
        tenant_id: &TenantId,
        id: &str,
        from: DeviceState,
        to: DeviceState,
        changes: DeviceChanges,
    ) -> Result<MfaDevice, StoreError> {
        check_device_transition(from, to)?;

        let mut devices = self.devices.write().await;
        let device = devices
            .get_mut(&key(tenant_id, id))
            .ok_or(StoreError::NotFound)?;

        if device.state != from {
            return Err(StoreError::StateConflict {
                expected: from.to_string(),
                actual: device.state.to_string(),
            });
        }

        device.state = to;
        device.updated_at = Utc::now();
        changes.apply(device);
        Ok(device.clone())
    }
}

#[derive(Default)]
pub struct InMemoryChallengeRepository {
    challenges: RwLock<HashMap<Key, MfaChallenge>>,
}

impl InMemoryChallengeRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ChallengeRepository for InMemoryChallengeRepository {
    async fn create(&self, challenge: &MfaChallenge) -> Result<(), StoreError> {
        let mut challenges = self.challenges.write().await;
        let k = key(&challenge.tenant_id, &challenge.id);
        if challenges.contains_key(&k) {
            return Err(StoreError::AlreadyExists);
        }
        challenges.insert(k, challenge.clone());
        Ok(())
    }

    async fn find_by_id(
        &self,
        tenant_id: &TenantId,
        id: &str,
    ) -> Result<Option<MfaChallenge>, StoreError> {
        Ok(self
            .challenges
            .read()
            .await
            .get(&key(tenant_id, id))
            .cloned())
    }

    async fn transition(
        &self,
        tenant_id: &TenantId,
        id: &str,
        from: ChallengeState,
        to: ChallengeState,
    ) -> Result<MfaChallenge, StoreError> {
        let mut challenges = self.challenges.write().await;
        let challenge = challenges
            .get_mut(&key(tenant_id, id))
            .ok_or(StoreError::NotFound)?;

        if challenge.state != from {
            return Err(StoreError::StateConflict {
                expected: from.to_string(),
                actual: challenge.state.to_string(),
            });
        }

        challenge.state = to;
        challenge.updated_at = Utc::now();
        Ok(challenge.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[tokio::test]
    async fn test_device_lookup_is_tenant_scoped() {
        let repo = InMemoryDeviceRepository::new();
        let t1 = TenantId::new("t1");
        let t2 = TenantId::new("t2");

        repo.create(&MfaDevice::pending(t1.clone(), "u1", "d1"))
            .await
            .unwrap();

        assert!(repo.find_by_id(&t1, "d1").await.unwrap().is_some());
        assert!(repo.find_by_id(&t2, "d1").await.unwrap().is_none());

        // Same id under another tenant is a distinct record.
        repo.create(&MfaDevice::pending(t2.clone(), "u9", "d1"))
            .await
            .unwrap();
        let other = repo.find_by_id(&t2, "d1").await.unwrap().unwrap();
        assert_eq!(other.user_id, "u9");
    }

    #[tokio::test]
    async fn test_duplicate_device_rejected() {
        let repo = InMemoryDeviceRepository::new();
        let t1 = TenantId::new("t1");
        repo.create(&MfaDevice::pending(t1.clone(), "u1", "d1"))
            .await
            .unwrap();

        let err = repo
            .create(&MfaDevice::pending(t1, "u1", "d1"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists));
    }

    #[tokio::test]
    async fn test_device_transition_is_compare_and_set() {
        let repo = InMemoryDeviceRepository::new();
        let t1 = TenantId::new("t1");
        repo.create(&MfaDevice::pending(t1.clone(), "u1", "d1"))
            .await
            .unwrap();

        let err = repo
            .transition(
                &t1,
                "d1",
                DeviceState::PairingPending,
                DeviceState::Active,
                DeviceChanges::default(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::StateConflict { .. }));

        let device = repo
            .transition(
                &t1,
                "d1",
                DeviceState::Pending,
                DeviceState::PairingPending,
                DeviceChanges {
                    provider_enrollment_id: Some("enr-1".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(device.state, DeviceState::PairingPending);
        assert_eq!(device.provider_enrollment_id.as_deref(), Some("enr-1"));
    }

    #[tokio::test]
    async fn test_device_transition_cannot_skip_pairing() {
        let repo = InMemoryDeviceRepository::new();
        let t1 = TenantId::new("t1");
        repo.create(&MfaDevice::pending(t1.clone(), "u1", "d1"))
            .await
            .unwrap();

        let err = repo
            .transition(
                &t1,
                "d1",
                DeviceState::Pending,
                DeviceState::Active,
                DeviceChanges::default(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::IllegalTransition { .. }));

        let device = repo.find_by_id(&t1, "d1").await.unwrap().unwrap();
        assert_eq!(device.state, DeviceState::Pending);
    }

    #[tokio::test]
    async fn test_concurrent_challenge_transitions_have_one_winner() {
        let repo = std::sync::Arc::new(InMemoryChallengeRepository::new());
        let t1 = TenantId::new("t1");
        repo.create(&MfaChallenge::issue(
            t1.clone(),
            "u1",
            "d1",
            "login",
            "c1",
            ChallengeState::PushSent,
            Utc::now(),
            Duration::minutes(2),
        ))
        .await
        .unwrap();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let repo = repo.clone();
            let t1 = t1.clone();
            handles.push(tokio::spawn(async move {
                repo.transition(&t1, "c1", ChallengeState::PushSent, ChallengeState::Approved)
                    .await
                    .is_ok()
            }));
        }

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }

    #[tokio::test]
    async fn test_revoke_keeps_first_timestamp() {
        let repo = InMemorySessionRepository::new();
        let t1 = TenantId::new("t1");
        let now = Utc::now();
        repo.create(&Session::new(t1.clone(), "u1", "jti-1", now + Duration::minutes(15)))
            .await
            .unwrap();

        repo.revoke_by_token_id(&t1, "jti-1", now).await.unwrap();
        repo.revoke_by_token_id(&t1, "jti-1", now + Duration::minutes(1))
            .await
            .unwrap();

        let session = repo.find_by_token_id(&t1, "jti-1").await.unwrap().unwrap();
        assert_eq!(session.revoked_at, Some(now));

        let err = repo
            .revoke_by_token_id(&TenantId::new("t2"), "jti-1", now)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound));
    }
}
