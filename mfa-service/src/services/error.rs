use axum::http::StatusCode;
use service_core::error::AppError;
use thiserror::Error;

use super::provider::{ProviderError, ProviderErrorKind};
use super::repository::StoreError;

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Device already exists")]
    DeviceExists,

    #[error("Nonce already used")]
    NonceReuse,

    #[error("Approval payload is missing a nonce")]
    MissingNonce,

    #[error("Challenge expired")]
    Expired,

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("A request with this idempotency key is in progress")]
    RequestInProgress,

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Token error: {0}")]
    Token(anyhow::Error),

    #[error("Storage error: {0}")]
    Storage(anyhow::Error),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<StoreError> for ServiceError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::StateConflict { expected, actual } => ServiceError::InvalidState(format!(
                "expected {}, found {}",
                expected, actual
            )),
            StoreError::IllegalTransition { from, to } => {
                ServiceError::InvalidState(format!("cannot move from {} to {}", from, to))
            }
            other => ServiceError::Storage(anyhow::Error::new(other)),
        }
    }
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::InvalidCredentials => AppError::coded(
                StatusCode::UNAUTHORIZED,
                "invalid_credentials",
                "Invalid credentials",
            ),
            ServiceError::InvalidState(reason) => {
                AppError::coded(StatusCode::CONFLICT, "invalid_state", "Invalid state")
                    .with_details(reason)
            }
            ServiceError::DeviceExists => AppError::coded(
                StatusCode::CONFLICT,
                "device_exists",
                "Device already exists",
            ),
            ServiceError::NonceReuse => {
                AppError::coded(StatusCode::CONFLICT, "nonce_reuse", "Nonce already used")
            }
            ServiceError::MissingNonce => AppError::coded(
                StatusCode::BAD_REQUEST,
                "missing_nonce",
                "Payload nonce is required",
            ),
            ServiceError::Expired => {
                AppError::coded(StatusCode::GONE, "expired", "Challenge expired")
            }
            ServiceError::NotFound(what) => AppError::coded(
                StatusCode::NOT_FOUND,
                "not_found",
                format!("{} not found", what),
            ),
            ServiceError::RequestInProgress => AppError::coded(
                StatusCode::CONFLICT,
                "request_in_progress",
                "A request with this idempotency key is in progress",
            ),
            ServiceError::Provider(ProviderError::Status { status, body }) => {
                let kind = super::provider::classify_status(status);
                let err = AppError::coded(kind.http_status(), kind.code(), kind.message());
                if body.is_empty() {
                    err
                } else {
                    err.with_details(body)
                }
            }
            ServiceError::Provider(ProviderError::UnexpectedState(state)) => {
                let kind = ProviderErrorKind::Upstream;
                AppError::coded(kind.http_status(), kind.code(), kind.message())
                    .with_details(format!("unexpected provider state: {}", state))
            }
            ServiceError::Provider(e) => AppError::InternalError(anyhow::Error::new(e)),
            ServiceError::Token(e) | ServiceError::Internal(e) => AppError::InternalError(e),
            ServiceError::Storage(e) => AppError::DatabaseError(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_errors_use_taxonomy_codes() {
        let cases: Vec<(ServiceError, u16, &str)> = vec![
            (ServiceError::InvalidCredentials, 401, "invalid_credentials"),
            (ServiceError::InvalidState("PENDING".into()), 409, "invalid_state"),
            (ServiceError::DeviceExists, 409, "device_exists"),
            (ServiceError::NonceReuse, 409, "nonce_reuse"),
            (ServiceError::MissingNonce, 400, "missing_nonce"),
            (ServiceError::Expired, 410, "expired"),
            (ServiceError::NotFound("Challenge"), 404, "not_found"),
            (ServiceError::RequestInProgress, 409, "request_in_progress"),
        ];
        for (err, status, code) in cases {
            let app: AppError = err.into();
            assert_eq!(app.status().as_u16(), status);
            assert_eq!(app.code(), code);
        }
    }

    #[test]
    fn test_provider_status_is_classified() {
        let app: AppError = ServiceError::Provider(ProviderError::Status {
            status: 412,
            body: r#"{"error":"bad sig"}"#.to_string(),
        })
        .into();
        assert_eq!(app.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(app.code(), "invalid_signature");
    }

    #[test]
    fn test_transport_exhaustion_is_internal() {
        let app: AppError = ServiceError::Provider(ProviderError::RetryExhausted {
            attempts: 3,
            message: "connection refused".to_string(),
        })
        .into();
        assert_eq!(app.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(app.code(), "server_error");
    }

    #[test]
    fn test_state_conflict_becomes_invalid_state() {
        let err: ServiceError = StoreError::StateConflict {
            expected: "PAIRING_PENDING".to_string(),
            actual: "ACTIVE".to_string(),
        }
        .into();
        assert!(matches!(err, ServiceError::InvalidState(_)));
    }
}
