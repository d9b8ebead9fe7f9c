use axum::{
    extract::{Path, State},
    http::HeaderMap,
    response::{IntoResponse, Response},
    Json,
};
use service_core::error::AppError;

use super::idempotency::{idempotency_key, run_idempotent};
use crate::{
    dtos::mfa::{
        ActivateRequest, ActivateResponse, ApproveRequest, ApproveResponse, ChallengeRequest,
        ChallengeResponse, ChallengeStatusResponse, DeviceStatusResponse, EnrollRequest,
        EnrollResponse,
    },
    middleware::AuthContext,
    services::ApprovalDecision,
    utils::ValidatedJson,
    AppState,
};

/// Start enrolling a device with the MFA provider
#[utoipa::path(
    post,
    path = "/api/mfa/enroll",
    request_body = EnrollRequest,
    params(
        ("X-Tenant-ID" = String, Header, description = "Tenant the token was issued for"),
        ("Idempotency-Key" = Option<String>, Header, description = "Replays the first success")
    ),
    responses(
        (status = 200, description = "Enrollment started", body = EnrollResponse),
        (status = 400, description = "Malformed request", body = ErrorResponse),
        (status = 401, description = "Missing or invalid token", body = ErrorResponse),
        (status = 403, description = "Tenant mismatch", body = ErrorResponse),
        (status = 409, description = "Device already exists", body = ErrorResponse),
        (status = 502, description = "Provider error", body = ErrorResponse)
    ),
    tag = "MFA",
    security(("bearer_auth" = []))
)]
pub async fn enroll(
    State(state): State<AppState>,
    ctx: AuthContext,
    headers: HeaderMap,
    ValidatedJson(req): ValidatedJson<EnrollRequest>,
) -> Result<Response, AppError> {
    let key = idempotency_key(&headers)?;
    let service = &state.mfa_service;
    let ctx = &ctx;
    run_idempotent(&state, &ctx.tenant_id, key, move || async move {
        let outcome = service
            .enroll(&ctx.tenant_id, &ctx.user_id, req.device_id.trim())
            .await?;
        Ok::<_, AppError>(EnrollResponse {
            enrollment_id: outcome.enrollment_id,
            pairing_code: outcome.pairing_code,
            expires_at: outcome.expires_at,
        })
    })
    .await
}

/// Confirm pairing and activate an enrolled device
#[utoipa::path(
    post,
    path = "/api/mfa/activate",
    request_body = ActivateRequest,
    params(
        ("X-Tenant-ID" = String, Header, description = "Tenant the token was issued for"),
        ("Idempotency-Key" = Option<String>, Header, description = "Replays the first success")
    ),
    responses(
        (status = 200, description = "Device activated", body = ActivateResponse),
        (status = 400, description = "Malformed request", body = ErrorResponse),
        (status = 401, description = "Missing or invalid token", body = ErrorResponse),
        (status = 403, description = "Tenant mismatch", body = ErrorResponse),
        (status = 409, description = "Device is not awaiting pairing", body = ErrorResponse),
        (status = 502, description = "Provider error", body = ErrorResponse)
    ),
    tag = "MFA",
    security(("bearer_auth" = []))
)]
pub async fn activate(
    State(state): State<AppState>,
    ctx: AuthContext,
    headers: HeaderMap,
    ValidatedJson(req): ValidatedJson<ActivateRequest>,
) -> Result<Response, AppError> {
    let key = idempotency_key(&headers)?;
    let service = &state.mfa_service;
    let ctx = &ctx;
    run_idempotent(&state, &ctx.tenant_id, key, move || async move {
        let outcome = service
            .activate(
                &ctx.tenant_id,
                &ctx.user_id,
                req.device_id.trim(),
                &req.pairing_code,
                &req.public_key,
                req.label.as_deref(),
            )
            .await?;
        Ok::<_, AppError>(ActivateResponse {
            device_id: outcome.device_id,
            state: outcome.state.to_string(),
        })
    })
    .await
}

/// Issue a challenge to an active device
#[utoipa::path(
    post,
    path = "/api/mfa/challenge",
    request_body = ChallengeRequest,
    params(
        ("X-Tenant-ID" = String, Header, description = "Tenant the token was issued for"),
        ("Idempotency-Key" = Option<String>, Header, description = "Replays the first success")
    ),
    responses(
        (status = 200, description = "Challenge issued", body = ChallengeResponse),
        (status = 400, description = "Malformed request", body = ErrorResponse),
        (status = 401, description = "Missing or invalid token", body = ErrorResponse),
        (status = 403, description = "Tenant mismatch", body = ErrorResponse),
        (status = 409, description = "Device is not active", body = ErrorResponse),
        (status = 502, description = "Provider error", body = ErrorResponse)
    ),
    tag = "MFA",
    security(("bearer_auth" = []))
)]
pub async fn create_challenge(
    State(state): State<AppState>,
    ctx: AuthContext,
    headers: HeaderMap,
    ValidatedJson(req): ValidatedJson<ChallengeRequest>,
) -> Result<Response, AppError> {
    let key = idempotency_key(&headers)?;
    let service = &state.mfa_service;
    let ctx = &ctx;
    run_idempotent(&state, &ctx.tenant_id, key, move || async move {
        let challenge = service
            .create_challenge(
                &ctx.tenant_id,
                &ctx.user_id,
                req.device_id.trim(),
                &req.action,
                req.context,
            )
            .await?;
        Ok::<_, AppError>(ChallengeResponse {
            challenge_id: challenge.id,
            state: challenge.state.to_string(),
            issued_at: challenge.issued_at.to_rfc3339(),
            expires_at: challenge.expires_at.to_rfc3339(),
        })
    })
    .await
}

/// Approve or deny a challenge with a signed, single-use payload
#[utoipa::path(
    post,
    path = "/api/mfa/approve",
    request_body = ApproveRequest,
    params(
        ("X-Tenant-ID" = String, Header, description = "Tenant the token was issued for"),
        ("Idempotency-Key" = Option<String>, Header, description = "Replays the first success")
    ),
    responses(
        (status = 200, description = "Challenge decided", body = ApproveResponse),
        (status = 400, description = "Malformed request or missing nonce", body = ErrorResponse),
        (status = 401, description = "Missing or invalid token", body = ErrorResponse),
        (status = 403, description = "Tenant mismatch", body = ErrorResponse),
        (status = 409, description = "Nonce reused or challenge decided", body = ErrorResponse),
        (status = 410, description = "Challenge expired", body = ErrorResponse),
        (status = 502, description = "Provider error", body = ErrorResponse)
    ),
    tag = "MFA",
    security(("bearer_auth" = []))
)]
pub async fn approve(
    State(state): State<AppState>,
    ctx: AuthContext,
    headers: HeaderMap,
    ValidatedJson(req): ValidatedJson<ApproveRequest>,
) -> Result<Response, AppError> {
    let key = idempotency_key(&headers)?;
    let decision = ApprovalDecision {
        device_id: req.device_id.trim().to_string(),
        signature: req.signature,
        payload: req.payload,
        totp_code: req.totp_code,
    };
    let challenge_id = req.challenge_id.trim().to_string();

    let service = &state.mfa_service;
    let ctx = &ctx;
    run_idempotent(&state, &ctx.tenant_id, key, move || async move {
        let decided = service
            .approve(&ctx.tenant_id, &ctx.user_id, &challenge_id, &decision)
            .await?;
        Ok::<_, AppError>(ApproveResponse {
            challenge_id: decided.id,
            status: decided.state.to_string(),
        })
    })
    .await
}

/// Read a challenge's current state
#[utoipa::path(
    get,
    path = "/api/mfa/challenge/{id}",
    params(
        ("id" = String, Path, description = "Challenge id"),
        ("X-Tenant-ID" = String, Header, description = "Tenant the token was issued for")
    ),
    responses(
        (status = 200, description = "Challenge found", body = ChallengeStatusResponse),
        (status = 401, description = "Missing or invalid token", body = ErrorResponse),
        (status = 403, description = "Tenant mismatch", body = ErrorResponse),
        (status = 404, description = "Challenge not found", body = ErrorResponse)
    ),
    tag = "MFA",
    security(("bearer_auth" = []))
)]
pub async fn get_challenge(
    State(state): State<AppState>,
    ctx: AuthContext,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let challenge = state.mfa_service.get_challenge(&ctx.tenant_id, &id).await?;
    Ok(Json(ChallengeStatusResponse {
        challenge_id: challenge.id,
        status: challenge.state.to_string(),
        updated_at: challenge.updated_at.to_rfc3339(),
    }))
}

/// Read a device's current state
#[utoipa::path(
    get,
    path = "/api/mfa/status/{id}",
    params(
        ("id" = String, Path, description = "Device id"),
        ("X-Tenant-ID" = String, Header, description = "Tenant the token was issued for")
    ),
    responses(
        (status = 200, description = "Device found", body = DeviceStatusResponse),
        (status = 401, description = "Missing or invalid token", body = ErrorResponse),
        (status = 403, description = "Tenant mismatch", body = ErrorResponse),
        (status = 404, description = "Device not found", body = ErrorResponse)
    ),
    tag = "MFA",
    security(("bearer_auth" = []))
)]
pub async fn device_status(
    State(state): State<AppState>,
    ctx: AuthContext,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let device = state.mfa_service.device_status(&ctx.tenant_id, &id).await?;
    Ok(Json(DeviceStatusResponse {
        device_id: device.id,
        status: device.state.to_string(),
    }))
}
