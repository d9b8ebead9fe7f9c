//! Nonce guard: single-use approval nonces, scoped per tenant.

use async_trait::async_trait;
use dashmap::{mapref::entry::Entry, DashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use super::redis::RedisService;
use crate::models::TenantId;

#[async_trait]
pub trait NonceGuard: Send + Sync {
    /// Record `nonce` for `tenant_id` unless it was already seen within `ttl`.
    ///
    /// Returns `true` only for the first caller; concurrent callers with the
    /// same `(tenant, nonce)` observe exactly one `true`.
    async fn check_and_set(
        &self,
        tenant_id: &TenantId,
        nonce: &str,
        ttl: Duration,
    ) -> Result<bool, anyhow::Error>;
}

/// Accepted nonces between sweeps of expired entries.
const SWEEP_INTERVAL: u64 = 256;

/// Process-local guard. Expired entries count as never seen; they are
/// overwritten in place and swept every `SWEEP_INTERVAL` accepted nonces.
#[derive(Default)]
pub struct InMemoryNonceGuard {
    seen: DashMap<(TenantId, String), Instant>,
    accepted: AtomicU64,
}

impl InMemoryNonceGuard {
    pub fn new() -> Self {
        Self::default()
    }

    fn sweep_expired(&self, now: Instant) {
        let before = self.seen.len();
        self.seen.retain(|_, expires_at| *expires_at > now);
        tracing::debug!(removed = before.saturating_sub(self.seen.len()), "Swept expired nonces");
    }
}

#[async_trait]
impl NonceGuard for InMemoryNonceGuard {
    async fn check_and_set(
        &self,
        tenant_id: &TenantId,
        nonce: &str,
        ttl: Duration,
    ) -> Result<bool, anyhow::Error> {
        let now = Instant::now();
        // The entry holds the shard lock, so check and insert are one step.
        match self.seen.entry((tenant_id.clone(), nonce.to_string())) {
            Entry::Occupied(mut entry) => {
                if *entry.get() > now {
                    return Ok(false);
                }
                entry.insert(now + ttl);
            }
            Entry::Vacant(entry) => {
                entry.insert(now + ttl);
            }
        }

        // Sweep only after the entry guard is released.
        if (self.accepted.fetch_add(1, Ordering::Relaxed) + 1) % SWEEP_INTERVAL == 0 {
            self.sweep_expired(now);
        }
        Ok(true)
    }
}

/// Redis-backed guard using `SET key 1 NX PX ttl`.
pub struct RedisNonceGuard {
    redis: RedisService,
}

impl RedisNonceGuard {
    pub fn new(redis: RedisService) -> Self {
        Self { redis }
    }

    fn key(tenant_id: &TenantId, nonce: &str) -> String {
        format!("nonce:{}:{}", tenant_id, nonce)
    }
}

#[async_trait]
impl NonceGuard for RedisNonceGuard {
    async fn check_and_set(
        &self,
        tenant_id: &TenantId,
        nonce: &str,
        ttl: Duration,
    ) -> Result<bool, anyhow::Error> {
        let mut conn = self.redis.connection();
        let reply: Option<String> = redis::cmd("SET")
            .arg(Self::key(tenant_id, nonce))
            .arg(1)
            .arg("NX")
            .arg("PX")
            .arg(ttl.as_millis().max(1) as u64)
            .query_async(&mut conn)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to record nonce: {}", e))?;

        Ok(reply.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    const TTL: Duration = Duration::from_secs(300);

    #[tokio::test]
    async fn test_second_use_is_rejected() {
        let guard = InMemoryNonceGuard::new();
        let tenant = TenantId::new("t1");

        assert!(guard.check_and_set(&tenant, "n1", TTL).await.unwrap());
        assert!(!guard.check_and_set(&tenant, "n1", TTL).await.unwrap());
    }

    #[tokio::test]
    async fn test_nonces_are_scoped_by_tenant() {
        let guard = InMemoryNonceGuard::new();

        assert!(guard
            .check_and_set(&TenantId::new("t1"), "n1", TTL)
            .await
            .unwrap());
        assert!(guard
            .check_and_set(&TenantId::new("t2"), "n1", TTL)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_expired_nonce_is_accepted_again() {
        let guard = InMemoryNonceGuard::new();
        let tenant = TenantId::new("t1");

        assert!(guard
            .check_and_set(&tenant, "n1", Duration::from_millis(10))
            .await
            .unwrap());
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(guard.check_and_set(&tenant, "n1", TTL).await.unwrap());
    }

    #[tokio::test]
    async fn test_concurrent_check_and_set_has_one_winner() {
        let guard = Arc::new(InMemoryNonceGuard::new());
        let tenant = TenantId::new("t1");

        let mut handles = Vec::new();
        for _ in 0..32 {
            let guard = guard.clone();
            let tenant = tenant.clone();
            handles.push(tokio::spawn(async move {
                guard.check_and_set(&tenant, "n1", TTL).await.unwrap()
            }));
        }

        let mut accepted = 0;
        for handle in handles {
            if handle.await.unwrap() {
                accepted += 1;
            }
        }
        assert_eq!(accepted, 1);
    }

    #[tokio::test]
    async fn test_expired_nonces_are_swept() {
        let guard = InMemoryNonceGuard::new();
        let tenant = TenantId::new("t1");

        for i in 0..SWEEP_INTERVAL {
            guard
                .check_and_set(&tenant, &format!("old-{}", i), Duration::from_millis(1))
                .await
                .unwrap();
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
        for i in 0..SWEEP_INTERVAL {
            guard
                .check_and_set(&tenant, &format!("new-{}", i), TTL)
                .await
                .unwrap();
        }

        assert_eq!(guard.seen.len(), SWEEP_INTERVAL as usize);
        assert!(!guard.check_and_set(&tenant, "new-0", TTL).await.unwrap());
    }
}
