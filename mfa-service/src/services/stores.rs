//! Store selection: PostgreSQL and Redis when configured, process memory
//! otherwise.

use sqlx::PgPool;
use std::sync::Arc;

use super::idempotency::{IdempotencyCache, InMemoryIdempotencyCache, RedisIdempotencyCache};
use super::nonce::{InMemoryNonceGuard, NonceGuard, RedisNonceGuard};
use super::redis::RedisService;
use super::repository::{
    ChallengeRepository, DeviceRepository, InMemoryChallengeRepository, InMemoryDeviceRepository,
    InMemorySessionRepository, InMemoryUserRepository, PgChallengeRepository, PgDeviceRepository,
    PgSessionRepository, PgUserRepository, SessionRepository, UserRepository,
};

#[derive(Clone)]
enum Backend {
    InMemory,
    External { pool: PgPool, redis: RedisService },
}

/// Every store the service uses, behind its trait.
#[derive(Clone)]
pub struct Stores {
    pub users: Arc<dyn UserRepository>,
    pub sessions: Arc<dyn SessionRepository>,
    pub devices: Arc<dyn DeviceRepository>,
    pub challenges: Arc<dyn ChallengeRepository>,
    pub nonces: Arc<dyn NonceGuard>,
    pub idempotency: Arc<dyn IdempotencyCache>,
    backend: Backend,
}

impl Stores {
    pub fn in_memory() -> Self {
        Self {
            users: Arc::new(InMemoryUserRepository::new()),
            sessions: Arc::new(InMemorySessionRepository::new()),
            devices: Arc::new(InMemoryDeviceRepository::new()),
            challenges: Arc::new(InMemoryChallengeRepository::new()),
            nonces: Arc::new(InMemoryNonceGuard::new()),
            idempotency: Arc::new(InMemoryIdempotencyCache::new()),
            backend: Backend::InMemory,
        }
    }

    pub fn external(pool: PgPool, redis: RedisService) -> Self {
        Self {
            users: Arc::new(PgUserRepository::new(pool.clone())),
            sessions: Arc::new(PgSessionRepository::new(pool.clone())),
            devices: Arc::new(PgDeviceRepository::new(pool.clone())),
            challenges: Arc::new(PgChallengeRepository::new(pool.clone())),
            nonces: Arc::new(RedisNonceGuard::new(redis.clone())),
            idempotency: Arc::new(RedisIdempotencyCache::new(redis.clone())),
            backend: Backend::External { pool, redis },
        }
    }

    pub fn backend_name(&self) -> &'static str {
        match self.backend {
            Backend::InMemory => "memory",
            Backend::External { .. } => "postgres+redis",
        }
    }

    /// Ping the external backends; in-memory stores are always healthy.
    pub async fn health_check(&self) -> Result<(), anyhow::Error> {
        match &self.backend {
            Backend::InMemory => Ok(()),
            Backend::External { pool, redis } => {
                crate::db::health_check(pool)
                    .await
                    .map_err(|e| anyhow::anyhow!("Database health check failed: {}", e))?;
                redis.health_check().await
            }
        }
    }
}
