//! PostgreSQL repositories.
//!
//! State transitions are a single conditional `UPDATE ... WHERE state = $from`,
//! which makes the compare-and-set atomic without explicit locking.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgPool, FromRow};

use super::{
    check_device_transition, ChallengeRepository, DeviceRepository, SessionRepository, StoreError,
    UserRepository,
};
use crate::models::{
    ChallengeState, DeviceChanges, DeviceState, MfaChallenge, MfaDevice, Session, TenantId, User,
};

// ==================== Row types ====================

#[derive(Debug, FromRow)]
struct UserRow {
    tenant_id: String,
    user_id: String,
    username: String,
    status: String,
    credential_hash: Option<String>,
    created_at: DateTime<Utc>,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        User {
            id: row.user_id,
            tenant_id: TenantId::new(row.tenant_id),
            username: row.username,
            status: row.status,
            credential_hash: row.credential_hash,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct SessionRow {
    session_id: String,
    tenant_id: String,
    user_id: String,
    token_id: String,
    expires_at: DateTime<Utc>,
    revoked_at: Option<DateTime<Utc>>,
}

impl From<SessionRow> for Session {
    fn from(row: SessionRow) -> Self {
        Session {
            id: row.session_id,
            tenant_id: TenantId::new(row.tenant_id),
            user_id: row.user_id,
            token_id: row.token_id,
            expires_at: row.expires_at,
            revoked_at: row.revoked_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct DeviceRow {
    tenant_id: String,
    device_id: String,
    user_id: String,
    display_name: Option<String>,
    public_key: Option<String>,
    state: String,
    provider_enrollment_id: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<DeviceRow> for MfaDevice {
    type Error = StoreError;

    fn try_from(row: DeviceRow) -> Result<Self, Self::Error> {
        let state = row
            .state
            .parse::<DeviceState>()
            .map_err(|e| StoreError::Backend(anyhow::anyhow!(e)))?;
        Ok(MfaDevice {
            id: row.device_id,
            tenant_id: TenantId::new(row.tenant_id),
            user_id: row.user_id,
            display_name: row.display_name,
            public_key: row.public_key,
            state,
            provider_enrollment_id: row.provider_enrollment_id,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct ChallengeRow {
    tenant_id: String,
    challenge_id: String,
    user_id: String,
    device_id: String,
    action: String,
    state: String,
    provider_challenge_id: String,
    issued_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ChallengeRow> for MfaChallenge {
    type Error = StoreError;

    fn try_from(row: ChallengeRow) -> Result<Self, Self::Error> {
        let state = row
            .state
            .parse::<ChallengeState>()
            .map_err(|e| StoreError::Backend(anyhow::anyhow!(e)))?;
        Ok(MfaChallenge {
            id: row.challenge_id,
            tenant_id: TenantId::new(row.tenant_id),
            user_id: row.user_id,
            device_id: row.device_id,
            action: row.action,
            state,
            provider_challenge_id: row.provider_challenge_id,
            issued_at: row.issued_at,
            expires_at: row.expires_at,
            updated_at: row.updated_at,
        })
    }
}

// ==================== Users ====================

#[derive(Clone)]
pub struct PgUserRepository {
    pool: PgPool,
}

impl PgUserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserRepository for PgUserRepository {
    async fn find_by_username(
        &self,
        tenant_id: &TenantId,
        username: &str,
    ) -> Result<Option<User>, StoreError> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT * FROM users WHERE tenant_id = $1 AND username = $2",
        )
        .bind(tenant_id.as_str())
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(User::from))
    }

    async fn find_by_id(&self, tenant_id: &TenantId, id: &str) -> Result<Option<User>, StoreError> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT * FROM users WHERE tenant_id = $1 AND user_id = $2",
        )
        .bind(tenant_id.as_str())
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(User::from))
    }

    async fn create(&self, user: &User) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO users (tenant_id, user_id, username, status, credential_hash, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(user.tenant_id.as_str())
        .bind(&user.id)
        .bind(&user.username)
        .bind(&user.status)
        .bind(&user.credential_hash)
        .bind(user.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

// ==================== Sessions ====================

#[derive(Clone)]
pub struct PgSessionRepository {
    pool: PgPool,
}

impl PgSessionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SessionRepository for PgSessionRepository {
    async fn create(&self, session: &Session) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO sessions (session_id, tenant_id, user_id, token_id, expires_at, revoked_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(&session.id)
        .bind(session.tenant_id.as_str())
        .bind(&session.user_id)
        .bind(&session.token_id)
        .bind(session.expires_at)
        .bind(session.revoked_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_by_token_id(
        &self,
        tenant_id: &TenantId,
        token_id: &str,
    ) -> Result<Option<Session>, StoreError> {
        let row = sqlx::query_as::<_, SessionRow>(
            "SELECT * FROM sessions WHERE tenant_id = $1 AND token_id = $2",
        )
        .bind(tenant_id.as_str())
        .bind(token_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Session::from))
    }

    async fn revoke_by_token_id(
        &self,
        tenant_id: &TenantId,
        token_id: &str,
        revoked_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE sessions SET revoked_at = COALESCE(revoked_at, $3)
            WHERE tenant_id = $1 AND token_id = $2
            "#,
        )
        .bind(tenant_id.as_str())
        .bind(token_id)
        .bind(revoked_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }
}

// ==================== Devices ====================

#[derive(Clone)]
pub struct PgDeviceRepository {
    pool: PgPool,
}

impl PgDeviceRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DeviceRepository for PgDeviceRepository {
    async fn create(&self, device: &MfaDevice) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO mfa_devices (tenant_id, device_id, user_id, display_name, public_key,
                                     state, provider_enrollment_id, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(device.tenant_id.as_str())
        .bind(&device.id)
        .bind(&device.user_id)
        .bind(&device.display_name)
        .bind(&device.public_key)
        .bind(device.state.as_str())
        .bind(&device.provider_enrollment_id)
        .bind(device.created_at)
        .bind(device.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_by_id(
        &self,
        tenant_id: &TenantId,
        id: &str,
    ) -> Result<Option<MfaDevice>, StoreError> {
        sqlx::query_as::<_, DeviceRow>(
            "SELECT * FROM mfa_devices WHERE tenant_id = $1 AND device_id = $2",
        )
        .bind(tenant_id.as_str())
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .map(MfaDevice::try_from)
        .transpose()
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

        let updated = sqlx::query_as::<_, DeviceRow>(
            r#"
            UPDATE mfa_devices
            SET state = $4,
                provider_enrollment_id = COALESCE($5, provider_enrollment_id),
                public_key = COALESCE($6, public_key),
                display_name = COALESCE($7, display_name),
                updated_at = NOW()
            WHERE tenant_id = $1 AND device_id = $2 AND state = $3
            RETURNING *
            "#,
        )
        .bind(tenant_id.as_str())
        .bind(id)
        .bind(from.as_str())
        .bind(to.as_str())
        .bind(changes.provider_enrollment_id)
        .bind(changes.public_key)
        .bind(changes.display_name)
        .fetch_optional(&self.pool)
        .await?;

        match updated {
            Some(row) => MfaDevice::try_from(row),
            None => match self.find_by_id(tenant_id, id).await? {
                Some(current) => Err(StoreError::StateConflict {
                    expected: from.to_string(),
                    actual: current.state.to_string(),
                }),
                None => Err(StoreError::NotFound),
            },
        }
    }
}

// ==================== Challenges ====================

#[derive(Clone)]
pub struct PgChallengeRepository {
    pool: PgPool,
}

impl PgChallengeRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ChallengeRepository for PgChallengeRepository {
    async fn create(&self, challenge: &MfaChallenge) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO mfa_challenges (tenant_id, challenge_id, user_id, device_id, action, state,
                                        provider_challenge_id, issued_at, expires_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(challenge.tenant_id.as_str())
        .bind(&challenge.id)
        .bind(&challenge.user_id)
        .bind(&challenge.device_id)
        .bind(&challenge.action)
        .bind(challenge.state.as_str())
        .bind(&challenge.provider_challenge_id)
        .bind(challenge.issued_at)
        .bind(challenge.expires_at)
        .bind(challenge.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_by_id(
        &self,
        tenant_id: &TenantId,
        id: &str,
    ) -> Result<Option<MfaChallenge>, StoreError> {
        sqlx::query_as::<_, ChallengeRow>(
            "SELECT * FROM mfa_challenges WHERE tenant_id = $1 AND challenge_id = $2",
        )
        .bind(tenant_id.as_str())
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .map(MfaChallenge::try_from)
        .transpose()
    }

    async fn transition(
        &self,
        tenant_id: &TenantId,
        id: &str,
        from: ChallengeState,
        to: ChallengeState,
    ) -> Result<MfaChallenge, StoreError> {
        let updated = sqlx::query_as::<_, ChallengeRow>(
            r#"
            UPDATE mfa_challenges
            SET state = $4, updated_at = NOW()
            WHERE tenant_id = $1 AND challenge_id = $2 AND state = $3
            RETURNING *
            "#,
        )
        .bind(tenant_id.as_str())
        .bind(id)
        .bind(from.as_str())
        .bind(to.as_str())
        .fetch_optional(&self.pool)
        .await?;

        match updated {
            Some(row) => MfaChallenge::try_from(row),
            None => match self.find_by_id(tenant_id, id).await? {
                Some(current) => Err(StoreError::StateConflict {
                    expected: from.to_string(),
                    actual: current.state.to_string(),
                }),
                None => Err(StoreError::NotFound),
            },
        }
    }
}
