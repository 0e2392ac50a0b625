//! Recognizing human-approval interrupts.
//!
//! A paused run carries an arbitrary payload. Only payloads with the exact
//! human-interrupt shape get the interactive accept/edit/respond/ignore view;
//! anything else is shown as a generic paused state.

use parley_protocol::{ActionRequest, HumanInterrupt, HumanInterruptConfig};
use serde_json::Value;

use crate::error::ClientError;

pub const CONFIG_FLAGS: [&str; 4] = ["allow_respond", "allow_accept", "allow_edit", "allow_ignore"];

/// The authoritative payload: the first element of a list, or the value itself.
pub fn first_interrupt(value: &Value) -> Option<&Value> {
    match value {
        Value::Array(items) => items.first(),
        Value::Null => None,
        other => Some(other),
    }
}

/// Shape check only. Flag values are not inspected.
pub fn is_human_interrupt(value: &Value) -> bool {
    let Some(Value::Object(interrupt)) = first_interrupt(value) else {
        return false;
    };
    let has_action = matches!(interrupt.get("action_request"), Some(Value::Object(_)));
    let Some(Value::Object(config)) = interrupt.get("config") else {
        return false;
    };
    has_action && CONFIG_FLAGS.iter().all(|flag| config.contains_key(*flag))
}

/// Decode a payload that passed [`is_human_interrupt`].
pub fn validate_interrupt(value: &Value) -> Result<HumanInterrupt, ClientError> {
    if !is_human_interrupt(value) {
        return Err(ClientError::SchemaInvalid(
            "expected action_request and config with all allow_* flags".to_string(),
        ));
    }
    let Some(interrupt) = first_interrupt(value) else {
        return Err(ClientError::SchemaInvalid("empty interrupt".to_string()));
    };

    let action_request = &interrupt["action_request"];
    let config = &interrupt["config"];
    let flag = |name: &str| config[name].as_bool().unwrap_or(false);

    Ok(HumanInterrupt {
        action_request: ActionRequest {
            action: action_request["action"]
                .as_str()
                .unwrap_or_default()
                .to_string(),
            args: action_request
                .get("args")
                .cloned()
                .unwrap_or(Value::Null),
        },
        config: HumanInterruptConfig {
            allow_ignore: flag("allow_ignore"),
            allow_respond: flag("allow_respond"),
            allow_edit: flag("allow_edit"),
            allow_accept: flag("allow_accept"),
        },
        description: interrupt["description"].as_str().map(String::from),
    })
}

/// How a pending interrupt should be presented.
#[derive(Debug, Clone, PartialEq)]
pub enum InterruptView {
    Human(HumanInterrupt),
    /// Unrecognized payload, rendered read-only.
    Generic(Value),
}

impl InterruptView {
    pub fn from_value(value: &Value) -> Self {
        match validate_interrupt(value) {
            Ok(interrupt) => Self::Human(interrupt),
            Err(_) => Self::Generic(value.clone()),
        }
    }

    pub fn is_interactive(&self) -> bool {
        matches!(self, Self::Human(_))
    }
}
