use reqwest::header::{HeaderMap, CONTENT_TYPE};
use reqwest::Client;
use secrecy::{ExposeSecret, Secret};
use serde::Serialize;
use service_core::observability::inject_trace_context;
use service_core::retry::{retry_with_backoff, RetryConfig, RetryError};
use std::fmt;

use super::ProviderError;
use crate::config::ProviderConfig;
use crate::models::TenantId;
use crate::services::metrics;

const API_KEY_HEADER: &str = "X-API-Key";
const TENANT_HEADER: &str = "X-Tenant-ID";

/// Failure of a single request attempt.
#[derive(Debug)]
enum AttemptError {
    Transport(reqwest::Error),
    Status { status: u16, body: String },
}

impl AttemptError {
    /// Transport failures and 503 (provider unavailable) are retried.
    fn is_transient(&self) -> bool {
        match self {
            AttemptError::Transport(_) => true,
            AttemptError::Status { status, .. } => *status == 503,
        }
    }
}

impl fmt::Display for AttemptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttemptError::Transport(e) => write!(f, "transport error: {}", e),
            AttemptError::Status { status, .. } => write!(f, "provider status {}", status),
        }
    }
}

/// JSON-over-HTTP client for the MFA provider.
#[derive(Clone)]
pub struct ProviderClient {
    client: Client,
    base_url: String,
    api_key: Secret<String>,
    retry: RetryConfig,
}

impl ProviderClient {
    pub fn new(config: &ProviderConfig) -> Result<Self, anyhow::Error> {
        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to build provider HTTP client: {}", e))?;

        tracing::info!(
            base_url = %config.base_url,
            timeout_ms = config.timeout_ms,
            retry_max = config.retry_max,
            "MFA provider client configured"
        );

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            retry: RetryConfig::new(config.retry_max, config.retry_backoff()),
        })
    }

    /// POST `body` to `path` and return the raw success body.
    ///
    /// `endpoint` labels logs and metrics.
    pub async fn post<B>(
        &self,
        endpoint: &'static str,
        path: &str,
        tenant_id: &TenantId,
        body: &B,
    ) -> Result<Vec<u8>, ProviderError>
    where
        B: Serialize + ?Sized,
    {
        let url = format!("{}{}", self.base_url, path);
        let payload = serde_json::to_vec(body)?;

        let result = retry_with_backoff(&self.retry, endpoint, AttemptError::is_transient, || {
            self.send_once(&url, tenant_id, &payload)
        })
        .await;

        let outcome = match &result {
            Ok(_) => "success",
            Err(RetryError::Permanent(_)) => "error",
            Err(RetryError::Exhausted { .. }) => "retry_exhausted",
        };
        metrics::record_provider_request(endpoint, outcome);

        result.map_err(|err| match err {
            RetryError::Permanent(AttemptError::Status { status, body })
            | RetryError::Exhausted {
                last: AttemptError::Status { status, body },
                ..
            } => ProviderError::Status { status, body },
            RetryError::Exhausted {
                attempts,
                last: AttemptError::Transport(e),
            } => ProviderError::RetryExhausted {
                attempts,
                message: e.to_string(),
            },
            RetryError::Permanent(AttemptError::Transport(e)) => ProviderError::RetryExhausted {
                attempts: 1,
                message: e.to_string(),
            },
        })
    }

    async fn send_once(
        &self,
        url: &str,
        tenant_id: &TenantId,
        payload: &[u8],
    ) -> Result<Vec<u8>, AttemptError> {
        let mut headers = HeaderMap::new();
        inject_trace_context(&mut headers);

        let response = self
            .client
            .post(url)
            .headers(headers)
            .header(API_KEY_HEADER, self.api_key.expose_secret().as_str())
            .header(TENANT_HEADER, tenant_id.as_str())
            .header(CONTENT_TYPE, "application/json")
            .body(payload.to_vec())
            .send()
            .await
            .map_err(AttemptError::Transport)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AttemptError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let bytes = response.bytes().await.map_err(AttemptError::Transport)?;
        Ok(bytes.to_vec())
    }
}
