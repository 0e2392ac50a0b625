//! Code request, login, logout and session status.

use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    http::{HeaderMap, header::AUTHORIZATION},
};
use parley_protocol::auth::{AuthStatus, CodeRequest, CodeResponse, LoginRequest, LoginResponse};
use serde::Serialize;
use tracing::info;

use crate::api::error::ApiResult;
use crate::api::state::AppState;

/// Issue a verification code.
pub async fn request_code(
    State(state): State<AppState>,
    body: Result<Json<CodeRequest>, JsonRejection>,
) -> ApiResult<Json<CodeResponse>> {
    let Json(body) = body?;
    let issued = state
        .sessions
        .request_code(body.phone_number.as_deref())
        .await?;

    Ok(Json(CodeResponse {
        success: true,
        message: "Verification code sent".to_string(),
        code: state.sessions.exposes_codes().then_some(issued.code),
    }))
}

/// Verify a code and start a session.
pub async fn login(
    State(state): State<AppState>,
    body: Result<Json<LoginRequest>, JsonRejection>,
) -> ApiResult<Json<LoginResponse>> {
    let Json(body) = body?;
    let grant = state
        .sessions
        .verify_and_login(body.phone_number.as_deref(), body.code.as_deref())
        .await?;

    Ok(Json(LoginResponse {
        success: true,
        message: "Login successful".to_string(),
        user_id: Some(grant.user_id),
        token: Some(grant.token),
        token_type: Some("bearer".to_string()),
    }))
}

#[derive(Debug, Serialize)]
pub struct LogoutResponse {
    pub success: bool,
    pub message: String,
}

/// Acknowledge a logout. Sessions live in the client, so nothing is revoked here.
pub async fn logout(headers: HeaderMap) -> Json<LogoutResponse> {
    let has_token = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .is_some();
    info!(has_token, "logout");

    Json(LogoutResponse {
        success: true,
        message: "Logged out".to_string(),
    })
}

/// Whether the caller's bearer token is still a valid session.
pub async fn auth_status(State(state): State<AppState>, headers: HeaderMap) -> Json<AuthStatus> {
    let authorization = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok());

    match state.sessions.authenticate(authorization) {
        Ok(_) => Json(AuthStatus {
            is_authenticated: true,
            message: None,
        }),
        Err(e) => Json(AuthStatus {
            is_authenticated: false,
            message: Some(e.to_string()),
        }),
    }
}
