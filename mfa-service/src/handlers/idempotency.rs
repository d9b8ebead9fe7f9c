//! `Idempotency-Key` handling for side-effecting POSTs.

use axum::{
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use service_core::error::AppError;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;

use crate::models::TenantId;
use crate::services::{metrics, Begin, CachedResponse, IdempotencyCache, ServiceError};
use crate::AppState;

pub const IDEMPOTENCY_KEY_HEADER: &str = "idempotency-key";

const MAX_KEY_LEN: usize = 255;

/// The trimmed `Idempotency-Key` header, if present.
pub fn idempotency_key(headers: &HeaderMap) -> Result<Option<String>, AppError> {
    let Some(value) = headers.get(IDEMPOTENCY_KEY_HEADER) else {
        return Ok(None);
    };

    let key = value
        .to_str()
        .map_err(|_| AppError::BadRequest(anyhow::anyhow!("Idempotency-Key must be ASCII")))?
        .trim();

    if key.is_empty() || key.len() > MAX_KEY_LEN {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "Idempotency-Key must be 1 to {} characters",
            MAX_KEY_LEN
        )));
    }
    Ok(Some(key.to_string()))
}

fn json_response(status: u16, body: Vec<u8>) -> Response {
    let status = StatusCode::from_u16(status).unwrap_or(StatusCode::OK);
    let mut res = (status, body).into_response();
    res.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    res
}

/// A reserved idempotency key, released on drop unless completed.
///
/// Dropping the request future mid-execution (client disconnect, deadline)
/// drops the reservation, so a retry with the same key can run.
struct Reservation {
    cache: Arc<dyn IdempotencyCache>,
    tenant_id: TenantId,
    key: String,
    held: bool,
}

impl Reservation {
    fn new(cache: Arc<dyn IdempotencyCache>, tenant_id: &TenantId, key: &str) -> Self {
        Self {
            cache,
            tenant_id: tenant_id.clone(),
            key: key.to_string(),
            held: true,
        }
    }

    async fn complete(mut self, response: CachedResponse, ttl: Duration) {
        let stored = self.cache.set(&self.tenant_id, &self.key, response, ttl).await;
        match stored {
            Ok(()) => self.held = false,
            // The side effect already happened; a retry will re-execute.
            Err(e) => {
                tracing::warn!(error = %e, idempotency_key = %self.key, "Failed to store response");
                self.release().await;
            }
        }
    }

    async fn release(mut self) {
        self.held = false;
        if let Err(e) = self.cache.abandon(&self.tenant_id, &self.key).await {
            tracing::warn!(error = %e, idempotency_key = %self.key, "Failed to release key");
        }
    }
}

impl Drop for Reservation {
    fn drop(&mut self) {
        if !self.held {
            return;
        }
        let Ok(runtime) = Handle::try_current() else {
            tracing::warn!(idempotency_key = %self.key, "No runtime to release key");
            return;
        };

        tracing::info!(idempotency_key = %self.key, "Request cancelled; releasing key");
        let cache = self.cache.clone();
        let tenant_id = self.tenant_id.clone();
        let key = std::mem::take(&mut self.key);
        runtime.spawn(async move {
            if let Err(e) = cache.abandon(&tenant_id, &key).await {
                tracing::warn!(error = %e, idempotency_key = %key, "Failed to release key");
            }
        });
    }
}

/// Run `execute` at most once per `(tenant, key)`.
///
/// Without a key the request simply executes. With one, a completed earlier
/// response is replayed byte for byte, a concurrent duplicate is refused
/// with `request_in_progress`, and only successful responses are stored.
pub async fn run_idempotent<T, F, Fut>(
    state: &AppState,
    tenant_id: &TenantId,
    key: Option<String>,
    execute: F,
) -> Result<Response, AppError>
where
    T: Serialize,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, AppError>>,
{
    let Some(key) = key else {
        let body = serialize(&execute().await?)?;
        return Ok(json_response(StatusCode::OK.as_u16(), body));
    };

    let cache = &state.stores.idempotency;
    let ttl = state.config.mfa.idempotency_ttl();

    match cache
        .begin(tenant_id, &key, ttl)
        .await
        .map_err(ServiceError::Storage)?
    {
        Begin::Replay(cached) => {
            metrics::record_idempotent_replay();
            tracing::info!(idempotency_key = %key, "Replaying stored response");
            return Ok(json_response(cached.status, cached.body));
        }
        Begin::InProgress => return Err(ServiceError::RequestInProgress.into()),
        Begin::Started => {}
    }

    let reservation = Reservation::new(cache.clone(), tenant_id, &key);
    let result = match execute().await {
        Ok(value) => serialize(&value),
        Err(e) => Err(e),
    };

    match result {
        Ok(body) => {
            let response = CachedResponse {
                status: StatusCode::OK.as_u16(),
                body,
            };
            reservation.complete(response.clone(), ttl).await;
            Ok(json_response(response.status, response.body))
        }
        Err(err) => {
            reservation.release().await;
            Err(err)
        }
    }
}

fn serialize<T: Serialize>(value: &T) -> Result<Vec<u8>, AppError> {
    serde_json::to_vec(value).map_err(|e| AppError::InternalError(anyhow::Error::new(e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(IDEMPOTENCY_KEY_HEADER, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn test_idempotency_key_parsing() {
        assert_eq!(idempotency_key(&HeaderMap::new()).unwrap(), None);
        assert_eq!(
            idempotency_key(&headers(" k1 ")).unwrap().as_deref(),
            Some("k1")
        );
        assert!(idempotency_key(&headers("   ")).is_err());
        assert!(idempotency_key(&headers(&"k".repeat(256))).is_err());
    }
}
