use axum::http::StatusCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProviderError {
    /// Non-success response the provider returned; `body` is passed through
    /// verbatim as diagnostic detail.
    #[error("Provider returned status {status}")]
    Status { status: u16, body: String },

    #[error("Provider request failed after {attempts} attempts: {message}")]
    RetryExhausted { attempts: u32, message: String },

    #[error("Invalid provider payload: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Provider reported unexpected state: {0}")]
    UnexpectedState(String),
}

impl ProviderError {
    pub fn kind(&self) -> Option<ProviderErrorKind> {
        match self {
            ProviderError::Status { status, .. } => Some(classify_status(*status)),
            _ => None,
        }
    }
}

/// Closed set of provider failure kinds exposed to the rest of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderErrorKind {
    BadRequest,
    NotFound,
    InvalidState,
    Expired,
    InvalidSignature,
    RateLimited,
    PushFailed,
    Upstream,
}

impl ProviderErrorKind {
    pub fn code(&self) -> &'static str {
        match self {
            ProviderErrorKind::BadRequest => "bad_request",
            ProviderErrorKind::NotFound => "not_found",
            ProviderErrorKind::InvalidState => "invalid_state",
            ProviderErrorKind::Expired => "expired",
            ProviderErrorKind::InvalidSignature => "invalid_signature",
            ProviderErrorKind::RateLimited => "rate_limited",
            ProviderErrorKind::PushFailed => "push_failed",
            ProviderErrorKind::Upstream => "trustpin_error",
        }
    }

    pub fn http_status(&self) -> StatusCode {
        match self {
            ProviderErrorKind::BadRequest => StatusCode::BAD_REQUEST,
            ProviderErrorKind::NotFound => StatusCode::NOT_FOUND,
            ProviderErrorKind::InvalidState => StatusCode::CONFLICT,
            ProviderErrorKind::Expired => StatusCode::GONE,
            ProviderErrorKind::InvalidSignature => StatusCode::UNPROCESSABLE_ENTITY,
            ProviderErrorKind::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ProviderErrorKind::PushFailed => StatusCode::SERVICE_UNAVAILABLE,
            ProviderErrorKind::Upstream => StatusCode::BAD_GATEWAY,
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            ProviderErrorKind::BadRequest => "Invalid request",
            ProviderErrorKind::NotFound => "Resource not found",
            ProviderErrorKind::InvalidState => "Invalid state",
            ProviderErrorKind::Expired => "Resource expired",
            ProviderErrorKind::InvalidSignature => "Invalid signature",
            ProviderErrorKind::RateLimited => "Rate limited",
            ProviderErrorKind::PushFailed => "Push delivery failed",
            ProviderErrorKind::Upstream => "Unexpected upstream error",
        }
    }
}

/// Map a provider HTTP status to its error kind.
pub fn classify_status(status: u16) -> ProviderErrorKind {
    match status {
        400 => ProviderErrorKind::BadRequest,
        404 => ProviderErrorKind::NotFound,
        409 => ProviderErrorKind::InvalidState,
        410 => ProviderErrorKind::Expired,
        412 => ProviderErrorKind::InvalidSignature,
        429 => ProviderErrorKind::RateLimited,
        503 => ProviderErrorKind::PushFailed,
        _ => ProviderErrorKind::Upstream,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification_table() {
        let cases = [
            (400, "bad_request", 400),
            (404, "not_found", 404),
            (409, "invalid_state", 409),
            (410, "expired", 410),
            (412, "invalid_signature", 422),
            (429, "rate_limited", 429),
            (503, "push_failed", 503),
        ];
        for (status, code, http) in cases {
            let kind = classify_status(status);
            assert_eq!(kind.code(), code, "status {}", status);
            assert_eq!(kind.http_status().as_u16(), http, "status {}", status);
        }
    }

    #[test]
    fn test_unlisted_statuses_are_upstream_errors() {
        for status in [401, 403, 418, 500, 502, 504] {
            let kind = classify_status(status);
            assert_eq!(kind, ProviderErrorKind::Upstream);
            assert_eq!(kind.http_status(), StatusCode::BAD_GATEWAY);
        }
    }

    #[test]
    fn test_only_status_errors_have_a_kind() {
        let err = ProviderError::RetryExhausted {
            attempts: 3,
            message: "connection refused".to_string(),
        };
        assert!(err.kind().is_none());

        let err = ProviderError::Status {
            status: 409,
            body: "{}".to_string(),
        };
        assert_eq!(err.kind(), Some(ProviderErrorKind::InvalidState));
    }
}
