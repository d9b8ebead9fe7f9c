//! Services layer for mfa-service.
//!
//! Business logic for login, device pairing and challenge approval, plus the
//! stores and remote provider they sit on.

pub mod auth;
pub mod challenges;
pub mod credentials;
pub mod devices;
pub mod error;
pub mod idempotency;
mod jwt;
pub mod metrics;
pub mod mfa;
pub mod nonce;
pub mod provider;
pub mod redis;
pub mod repository;
pub mod stores;

pub use auth::{AuthService, LoginOutcome};
pub use challenges::{ApprovalDecision, ChallengeLifecycle};
pub use credentials::{Argon2Verifier, CredentialVerifier, NonEmptyPasswordVerifier};
pub use devices::{ActivationOutcome, DeviceLifecycle, EnrollmentOutcome};
pub use error::ServiceError;
pub use idempotency::{
    Begin, CachedResponse, IdempotencyCache, InMemoryIdempotencyCache, RedisIdempotencyCache,
};
pub use jwt::{AccessTokenClaims, IssuedToken, JwtService};
pub use mfa::MfaService;
pub use nonce::{InMemoryNonceGuard, NonceGuard, RedisNonceGuard};
pub use provider::{HttpMfaProvider, MfaProvider, MockMfaProvider, ProviderClient};
pub use redis::RedisService;
pub use stores::Stores;

use crate::models::TenantId;
use repository::StoreError;

/// A local write failed after the provider already accepted the operation.
///
/// Nothing is rolled back remotely; the event is logged for an operator to
/// reconcile and the client sees a 500.
pub(crate) fn reconcile_required(
    operation: &'static str,
    tenant_id: &TenantId,
    id: &str,
    err: StoreError,
) -> ServiceError {
    tracing::error!(
        reconcile_required = true,
        operation = operation,
        tenant_id = %tenant_id,
        id = %id,
        error = %err,
        "Local write failed after provider success"
    );
    ServiceError::Internal(anyhow::anyhow!(
        "{} succeeded remotely but could not be recorded: {}",
        operation,
        err
    ))
}
