//! Request and response bodies of the session endpoints.

use serde::{Deserialize, Serialize};

/// `POST /code-request` body.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CodeRequest {
    #[serde(
        rename = "phoneNumber",
        alias = "phone_number",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub phone_number: Option<String>,
}

/// `POST /code-request` response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeResponse {
    pub success: bool,
    pub message: String,

    /// Only present when the server is configured to echo codes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

/// `POST /login` body.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoginRequest {
    #[serde(
        rename = "phoneNumber",
        alias = "phone_number",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub phone_number: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

/// `POST /login` response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoginResponse {
    pub success: bool,
    pub message: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,

    #[serde(default, alias = "access_token", skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
}

/// `GET /auth-status` response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthStatus {
    pub is_authenticated: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Error body returned by the session endpoints on failure. `detail` is
/// accepted for compatibility with external user services.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FailureBody {
    #[serde(default)]
    pub success: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl FailureBody {
    pub fn reason(&self) -> Option<&str> {
        self.detail.as_deref().or(self.message.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_phone_number_accepts_both_spellings() {
        let camel: CodeRequest =
            serde_json::from_value(json!({ "phoneNumber": "13800138000" })).unwrap();
        let snake: CodeRequest =
            serde_json::from_value(json!({ "phone_number": "13800138000" })).unwrap();
        assert_eq!(camel, snake);

        let missing: LoginRequest = serde_json::from_value(json!({})).unwrap();
        assert!(missing.phone_number.is_none() && missing.code.is_none());
    }

    #[test]
    fn test_login_response_accepts_access_token() {
        let response: LoginResponse = serde_json::from_value(json!({
            "success": true,
            "message": "ok",
            "access_token": "abc",
            "token_type": "bearer"
        }))
        .unwrap();
        assert_eq!(response.token.as_deref(), Some("abc"));
    }
}
