use chrono::Utc;
use std::sync::Arc;

use super::credentials::CredentialVerifier;
use super::jwt::{IssuedToken, JwtService};
use super::repository::{SessionRepository, StoreError, UserRepository};
use super::ServiceError;
use crate::models::{Session, TenantId};
use crate::utils::Password;

#[derive(Debug, Clone)]
pub struct LoginOutcome {
    pub session: Session,
    pub token: IssuedToken,
}

/// Login facade: primary-credential check and session issuance.
#[derive(Clone)]
pub struct AuthService {
    users: Arc<dyn UserRepository>,
    sessions: Arc<dyn SessionRepository>,
    verifier: Arc<dyn CredentialVerifier>,
    jwt: JwtService,
}

impl AuthService {
    pub fn new(
        users: Arc<dyn UserRepository>,
        sessions: Arc<dyn SessionRepository>,
        verifier: Arc<dyn CredentialVerifier>,
        jwt: JwtService,
    ) -> Self {
        Self {
            users,
            sessions,
            verifier,
            jwt,
        }
    }

    pub fn jwt(&self) -> &JwtService {
        &self.jwt
    }

    #[tracing::instrument(skip(self, password), fields(tenant_id = %tenant_id))]
    pub async fn login(
        &self,
        tenant_id: &TenantId,
        username: &str,
        password: &Password,
    ) -> Result<LoginOutcome, ServiceError> {
        let user = self
            .users
            .find_by_username(tenant_id, username)
            .await?
            .ok_or(ServiceError::InvalidCredentials)?;

        if !user.is_active() || !self.verifier.verify(&user, password) {
            tracing::info!(user_id = %user.id, "Login rejected");
            return Err(ServiceError::InvalidCredentials);
        }

        let token = self
            .jwt
            .issue(tenant_id, &user.id)
            .map_err(ServiceError::Token)?;

        let session = Session::new(
            tenant_id.clone(),
            user.id.clone(),
            token.jti.clone(),
            token.expires_at,
        );
        self.sessions.create(&session).await?;

        tracing::info!(user_id = %user.id, session_id = %session.id, "Session issued");

        Ok(LoginOutcome { session, token })
    }

    /// Revoke the session bound to `jti`. Revoking twice is not an error.
    #[tracing::instrument(skip(self), fields(tenant_id = %tenant_id))]
    pub async fn logout(&self, tenant_id: &TenantId, jti: &str) -> Result<(), ServiceError> {
        match self
            .sessions
            .revoke_by_token_id(tenant_id, jti, Utc::now())
            .await
        {
            Ok(()) => Ok(()),
            Err(StoreError::NotFound) => Err(ServiceError::NotFound("Session")),
            Err(e) => Err(e.into()),
        }
    }

    /// Whether the session for `jti` exists, is unrevoked and unexpired.
    pub async fn is_session_active(
        &self,
        tenant_id: &TenantId,
        jti: &str,
    ) -> Result<bool, ServiceError> {
        let session = self.sessions.find_by_token_id(tenant_id, jti).await?;
        Ok(session.is_some_and(|s| s.is_active_at(Utc::now())))
    }
}
