//! Human-in-the-loop interrupt payloads.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// What the agent wants to do and is asking permission for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionRequest {
    #[serde(default)]
    pub action: String,

    #[serde(default)]
    pub args: Value,
}

/// Which responses the agent accepts for an interrupt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HumanInterruptConfig {
    pub allow_ignore: bool,
    pub allow_respond: bool,
    pub allow_edit: bool,
    pub allow_accept: bool,
}

/// A paused run waiting for a human decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HumanInterrupt {
    pub action_request: ActionRequest,

    pub config: HumanInterruptConfig,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// The decision sent back to resume an interrupted run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "args", rename_all = "snake_case")]
pub enum HumanResponse {
    Accept,
    Ignore,
    /// Free-text reply.
    Response(String),
    /// Edited action to run instead.
    Edit(ActionRequest),
}

impl HumanResponse {
    /// Whether `config` permits this response.
    pub fn is_allowed_by(&self, config: &HumanInterruptConfig) -> bool {
        match self {
            Self::Accept => config.allow_accept,
            Self::Ignore => config.allow_ignore,
            Self::Response(_) => config.allow_respond,
            Self::Edit(_) => config.allow_edit,
        }
    }
}
