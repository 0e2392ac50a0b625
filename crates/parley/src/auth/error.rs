//! Session errors.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use parley_protocol::auth::FailureBody;
use thiserror::Error;

/// Errors from the code and login endpoints.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Missing field or malformed phone number.
    #[error("{0}")]
    InvalidInput(String),

    /// Phone number is not on the allow-list.
    #[error("phone number is not allowed")]
    NotAllowed,

    /// No code was requested for this phone number.
    #[error("verification code not found")]
    CodeNotFound,

    #[error("verification code expired")]
    CodeExpired,

    #[error("verification code mismatch")]
    CodeMismatch,

    #[error("missing authorization header")]
    MissingAuthHeader,

    #[error("invalid authorization header format")]
    InvalidAuthHeader,

    #[error("invalid token: {0}")]
    InvalidToken(String),

    #[error("token expired")]
    TokenExpired,

    #[error("internal auth error: {0}")]
    Internal(String),
}

impl AuthError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidInput(_) => StatusCode::BAD_REQUEST,
            Self::NotAllowed => StatusCode::FORBIDDEN,
            Self::CodeNotFound
            | Self::CodeExpired
            | Self::CodeMismatch
            | Self::MissingAuthHeader
            | Self::InvalidAuthHeader
            | Self::InvalidToken(_)
            | Self::TokenExpired => StatusCode::UNAUTHORIZED,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidInput(_) => "invalid_input",
            Self::NotAllowed => "not_allowed",
            Self::CodeNotFound => "code_not_found",
            Self::CodeExpired => "code_expired",
            Self::CodeMismatch => "code_mismatch",
            Self::MissingAuthHeader => "missing_auth_header",
            Self::InvalidAuthHeader => "invalid_auth_header",
            Self::InvalidToken(_) => "invalid_token",
            Self::TokenExpired => "token_expired",
            Self::Internal(_) => "internal_error",
        }
    }

    /// Text shown to the person logging in.
    pub fn user_message(&self) -> String {
        match self {
            Self::InvalidInput(message) => message.clone(),
            Self::NotAllowed => "This phone number is not allowed to log in".to_string(),
            Self::CodeNotFound => "Please request a verification code first".to_string(),
            Self::CodeExpired => {
                "Verification code has expired, please request a new one".to_string()
            }
            Self::CodeMismatch => "Incorrect verification code".to_string(),
            Self::MissingAuthHeader
            | Self::InvalidAuthHeader
            | Self::InvalidToken(_)
            | Self::TokenExpired => "Not authenticated".to_string(),
            Self::Internal(_) => "Internal server error".to_string(),
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!("session error: {}", self);
        } else {
            tracing::debug!("session request rejected: {}", self);
        }

        let body = Json(FailureBody {
            success: false,
            message: Some(self.user_message()),
            detail: None,
            code: Some(self.error_code().to_string()),
        });

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_error_status() {
        assert_eq!(
            AuthError::InvalidInput("x".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(AuthError::NotAllowed.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(AuthError::CodeExpired.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            AuthError::Internal("boom".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_auth_error_display() {
        assert_eq!(AuthError::CodeMismatch.to_string(), "verification code mismatch");
        assert_eq!(
            AuthError::InvalidToken("bad".into()).to_string(),
            "invalid token: bad"
        );
    }
}
