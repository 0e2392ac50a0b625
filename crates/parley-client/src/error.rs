//! Client error taxonomy.

use parley_protocol::auth::FailureBody;
use reqwest::StatusCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    /// Malformed phone number or code, or a missing field.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Code mismatch, expired or unknown code, or a rejected token.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Non-2xx response relayed from a backend.
    #[error("upstream returned {status}: {body}")]
    Upstream { status: u16, body: String },

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Interrupt payload is not a recognized human interrupt.
    #[error("interrupt payload is invalid: {0}")]
    SchemaInvalid(String),

    /// A run is already streaming on this controller.
    #[error("a run is already in progress")]
    Busy,

    #[error("storage error: {0}")]
    Storage(String),

    /// Error reported inside a run stream, or a broken stream.
    #[error("{0}")]
    Stream(String),
}

impl ClientError {
    /// Classify a failed HTTP response.
    pub async fn from_response(response: reqwest::Response) -> Self {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        Self::from_status(status, body)
    }

    pub fn from_status(status: StatusCode, body: String) -> Self {
        let reason = serde_json::from_str::<FailureBody>(&body)
            .ok()
            .and_then(|failure| failure.reason().map(String::from))
            .filter(|reason| !reason.is_empty())
            .unwrap_or_else(|| {
                status
                    .canonical_reason()
                    .unwrap_or("request failed")
                    .to_string()
            });

        match status {
            StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => Self::InvalidInput(reason),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Self::Unauthorized(reason),
            _ => Self::Upstream {
                status: status.as_u16(),
                body,
            },
        }
    }

    /// Transport failure rather than a server answer.
    pub fn is_network(&self) -> bool {
        matches!(self, Self::Network(_))
    }

    /// Text fit for showing to the user.
    pub fn user_message(&self) -> String {
        match self {
            Self::InvalidInput(reason) => format!("Invalid input: {reason}"),
            Self::Unauthorized(reason) => format!("Authentication failed: {reason}"),
            Self::Upstream { status, .. } => format!("The server returned an error ({status})"),
            Self::Network(_) => "Network error, please check your connection".to_string(),
            Self::SchemaInvalid(_) => "The agent is waiting for input this client cannot show".to_string(),
            Self::Busy => "Please wait for the current response to finish".to_string(),
            Self::Storage(_) => "Could not access local storage".to_string(),
            Self::Stream(message) => message.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        let err = ClientError::from_status(
            StatusCode::BAD_REQUEST,
            r#"{"success":false,"message":"Invalid phone number"}"#.to_string(),
        );
        assert!(matches!(err, ClientError::InvalidInput(ref r) if r == "Invalid phone number"));

        let err = ClientError::from_status(
            StatusCode::UNAUTHORIZED,
            r#"{"detail":"Verification code expired"}"#.to_string(),
        );
        assert!(matches!(err, ClientError::Unauthorized(ref r) if r == "Verification code expired"));

        let err = ClientError::from_status(StatusCode::SERVICE_UNAVAILABLE, "overloaded".into());
        assert!(matches!(err, ClientError::Upstream { status: 503, ref body } if body == "overloaded"));
    }

    #[test]
    fn test_reason_falls_back_to_status_text() {
        let err = ClientError::from_status(StatusCode::FORBIDDEN, String::new());
        assert_eq!(err.user_message(), "Authentication failed: Forbidden");
    }

    #[test]
    fn test_user_messages_are_distinct() {
        let messages = [
            ClientError::InvalidInput("x".into()).user_message(),
            ClientError::Unauthorized("x".into()).user_message(),
            ClientError::Upstream { status: 500, body: "trace".into() }.user_message(),
            ClientError::SchemaInvalid("x".into()).user_message(),
        ];
        assert!(!messages[2].contains("trace"));
        for (i, a) in messages.iter().enumerate() {
            for b in &messages[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }
}
