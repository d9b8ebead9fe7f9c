//! Idempotency cache: replays the stored response for a repeated
//! `(tenant, Idempotency-Key)` pair instead of re-executing the request.
//!
//! A key moves through two phases. `begin` reserves it while the first
//! request executes; `set` completes it with the response. A duplicate that
//! arrives during execution sees `InProgress`, one that arrives afterwards
//! gets a byte-identical `Replay`.

use async_trait::async_trait;
use dashmap::{mapref::entry::Entry, DashMap};
use redis::Script;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use super::redis::RedisService;
use crate::models::TenantId;

/// A response captured for replay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedResponse {
    pub status: u16,
    /// Serialized JSON body, replayed verbatim.
    pub body: Vec<u8>,
}

/// Outcome of reserving an idempotency key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Begin {
    /// The caller owns the key and must `set` or `abandon` it.
    Started,
    /// The key already completed; replay this response.
    Replay(CachedResponse),
    /// Another request holding the key is still executing.
    InProgress,
}

#[async_trait]
pub trait IdempotencyCache: Send + Sync {
    async fn get(
        &self,
        tenant_id: &TenantId,
        key: &str,
    ) -> Result<Option<CachedResponse>, anyhow::Error>;

    /// Store a completed response. The first completed response wins; later
    /// writes for a live key are ignored.
    async fn set(
        &self,
        tenant_id: &TenantId,
        key: &str,
        response: CachedResponse,
        ttl: Duration,
    ) -> Result<(), anyhow::Error>;

    async fn begin(
        &self,
        tenant_id: &TenantId,
        key: &str,
        ttl: Duration,
    ) -> Result<Begin, anyhow::Error>;

    /// Release a reservation whose request failed so the client may retry.
    async fn abandon(&self, tenant_id: &TenantId, key: &str) -> Result<(), anyhow::Error>;
}

// ==================== In-memory ====================

#[derive(Debug, Clone)]
enum Slot {
    Pending,
    Done(CachedResponse),
}

#[derive(Debug, Clone)]
struct Record {
    slot: Slot,
    expires_at: Instant,
}

impl Record {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at > now
    }
}

/// Reservations between sweeps of expired entries.
const SWEEP_INTERVAL: u64 = 256;

#[derive(Default)]
pub struct InMemoryIdempotencyCache {
    entries: DashMap<(TenantId, String), Record>,
    reservations: AtomicU64,
}

impl InMemoryIdempotencyCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn sweep_expired(&self, now: Instant) {
        let before = self.entries.len();
        self.entries.retain(|_, record| record.is_live(now));
        tracing::debug!(
            removed = before.saturating_sub(self.entries.len()),
            "Swept expired idempotency keys"
        );
    }
}

#[async_trait]
impl IdempotencyCache for InMemoryIdempotencyCache {
    async fn get(
        &self,
        tenant_id: &TenantId,
        key: &str,
    ) -> Result<Option<CachedResponse>, anyhow::Error> {
        let now = Instant::now();
        Ok(self
            .entries
            .get(&(tenant_id.clone(), key.to_string()))
            .filter(|e| e.is_live(now))
            .and_then(|e| match &e.slot {
                Slot::Done(response) => Some(response.clone()),
                Slot::Pending => None,
            }))
    }

    async fn set(
        &self,
        tenant_id: &TenantId,
        key: &str,
        response: CachedResponse,
        ttl: Duration,
    ) -> Result<(), anyhow::Error> {
        let now = Instant::now();
        let fresh = Record {
            slot: Slot::Done(response),
            expires_at: now + ttl,
        };
        match self.entries.entry((tenant_id.clone(), key.to_string())) {
            Entry::Occupied(mut entry) => {
                let keep = entry.get().is_live(now) && matches!(entry.get().slot, Slot::Done(_));
                if !keep {
                    entry.insert(fresh);
                }
            }
            Entry::Vacant(entry) => {
                entry.insert(fresh);
            }
        }
        Ok(())
    }

    async fn begin(
        &self,
        tenant_id: &TenantId,
        key: &str,
        ttl: Duration,
    ) -> Result<Begin, anyhow::Error> {
        let now = Instant::now();
        let reservation = Record {
            slot: Slot::Pending,
            expires_at: now + ttl,
        };
        match self.entries.entry((tenant_id.clone(), key.to_string())) {
            Entry::Occupied(mut entry) => {
                if entry.get().is_live(now) {
                    return Ok(match &entry.get().slot {
                        Slot::Done(response) => Begin::Replay(response.clone()),
                        Slot::Pending => Begin::InProgress,
                    });
                }
                entry.insert(reservation);
            }
            Entry::Vacant(entry) => {
                entry.insert(reservation);
            }
        }

        if (self.reservations.fetch_add(1, Ordering::Relaxed) + 1) % SWEEP_INTERVAL == 0 {
            self.sweep_expired(now);
        }
        Ok(Begin::Started)
    }

    async fn abandon(&self, tenant_id: &TenantId, key: &str) -> Result<(), anyhow::Error> {
        self.entries
            .remove_if(&(tenant_id.clone(), key.to_string()), |_, e| {
                matches!(e.slot, Slot::Pending)
            });
        Ok(())
    }
}

// ==================== Redis ====================

const PENDING_MARKER: &str = "pending";

/// Overwrites a reservation (or nothing) but never a completed response.
const COMPLETE_SCRIPT: &str = r#"
local current = redis.call('GET', KEYS[1])
if current and current ~= ARGV[3] then
    return 0
end
redis.call('SET', KEYS[1], ARGV[1], 'PX', ARGV[2])
return 1
"#;

/// Deletes the key only while it still holds the reservation marker.
const ABANDON_SCRIPT: &str = r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    return redis.call('DEL', KEYS[1])
end
return 0
"#;

#[derive(Serialize, Deserialize)]
struct Envelope {
    status: u16,
    body: String,
}

impl Envelope {
    fn encode(response: &CachedResponse) -> Result<String, anyhow::Error> {
        let envelope = Envelope {
            status: response.status,
            body: String::from_utf8(response.body.clone())?,
        };
        Ok(serde_json::to_string(&envelope)?)
    }

    fn decode(raw: &str) -> Result<CachedResponse, anyhow::Error> {
        let envelope: Envelope = serde_json::from_str(raw)?;
        Ok(CachedResponse {
            status: envelope.status,
            body: envelope.body.into_bytes(),
        })
    }
}

pub struct RedisIdempotencyCache {
    redis: RedisService,
    complete: Script,
    abandon: Script,
}

impl RedisIdempotencyCache {
    pub fn new(redis: RedisService) -> Self {
        Self {
            redis,
            complete: Script::new(COMPLETE_SCRIPT),
            abandon: Script::new(ABANDON_SCRIPT),
        }
    }

    fn key(tenant_id: &TenantId, key: &str) -> String {
        format!("idem:{}:{}", tenant_id, key)
    }

    fn ttl_millis(ttl: Duration) -> u64 {
        ttl.as_millis().max(1) as u64
    }
}

#[async_trait]
impl IdempotencyCache for RedisIdempotencyCache {
    async fn get(
        &self,
        tenant_id: &TenantId,
        key: &str,
    ) -> Result<Option<CachedResponse>, anyhow::Error> {
        let mut conn = self.redis.connection();
        let raw: Option<String> = redis::cmd("GET")
            .arg(Self::key(tenant_id, key))
            .query_async(&mut conn)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to read idempotency key: {}", e))?;

        match raw.as_deref() {
            None | Some(PENDING_MARKER) => Ok(None),
            Some(raw) => Ok(Some(Envelope::decode(raw)?)),
        }
    }

    async fn set(
        &self,
        tenant_id: &TenantId,
        key: &str,
        response: CachedResponse,
        ttl: Duration,
    ) -> Result<(), anyhow::Error> {
        let mut conn = self.redis.connection();
        let _: i32 = self
            .complete
            .key(Self::key(tenant_id, key))
            .arg(Envelope::encode(&response)?)
            .arg(Self::ttl_millis(ttl))
            .arg(PENDING_MARKER)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to store idempotent response: {}", e))?;
        Ok(())
    }

    async fn begin(
        &self,
        tenant_id: &TenantId,
        key: &str,
        ttl: Duration,
    ) -> Result<Begin, anyhow::Error> {
        let redis_key = Self::key(tenant_id, key);
        let mut conn = self.redis.connection();

        // A key can expire between SET NX and GET; one extra round settles it.
        for _ in 0..2 {
            let reserved: Option<String> = redis::cmd("SET")
                .arg(&redis_key)
                .arg(PENDING_MARKER)
                .arg("NX")
                .arg("PX")
                .arg(Self::ttl_millis(ttl))
                .query_async(&mut conn)
                .await
                .map_err(|e| anyhow::anyhow!("Failed to reserve idempotency key: {}", e))?;
            if reserved.is_some() {
                return Ok(Begin::Started);
            }

            let current: Option<String> = redis::cmd("GET")
                .arg(&redis_key)
                .query_async(&mut conn)
                .await
                .map_err(|e| anyhow::anyhow!("Failed to read idempotency key: {}", e))?;
            match current.as_deref() {
                Some(PENDING_MARKER) => return Ok(Begin::InProgress),
                Some(raw) => return Ok(Begin::Replay(Envelope::decode(raw)?)),
                None => continue,
            }
        }

        Ok(Begin::InProgress)
    }

    async fn abandon(&self, tenant_id: &TenantId, key: &str) -> Result<(), anyhow::Error> {
        let mut conn = self.redis.connection();
        let _: i32 = self
            .abandon
            .key(Self::key(tenant_id, key))
            .arg(PENDING_MARKER)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to release idempotency key: {}", e))?;
        Ok(())
    }
}
