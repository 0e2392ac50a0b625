//! Generative UI elements carried alongside the message list.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A UI element emitted by the agent, keyed by `id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UiMessage {
    pub id: String,

    /// Component name the renderer should use.
    pub name: String,

    #[serde(default)]
    pub props: Value,

    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
}

impl UiMessage {
    /// Id of the message this element is attached to.
    pub fn message_id(&self) -> Option<&str> {
        self.metadata.get("message_id").and_then(Value::as_str)
    }

    /// Id of the run that produced this element.
    pub fn run_id(&self) -> Option<&str> {
        self.metadata.get("run_id").and_then(Value::as_str)
    }

    /// When set, an upsert shallow-merges `props` into the existing element.
    pub fn merges(&self) -> bool {
        self.metadata
            .get("merge")
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }
}

/// An operation on the UI element list, as sent in custom stream events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum UiEvent {
    #[serde(rename = "ui")]
    Upsert(UiMessage),

    #[serde(rename = "remove-ui")]
    Remove { id: String },
}

impl UiEvent {
    pub fn id(&self) -> &str {
        match self {
            Self::Upsert(message) => &message.id,
            Self::Remove { id } => id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_ui_event_tags() {
        let upsert: UiEvent = serde_json::from_value(json!({
            "type": "ui",
            "id": "card-1",
            "name": "weather",
            "props": { "city": "Paris" },
            "metadata": { "message_id": "m1", "run_id": "r1" }
        }))
        .unwrap();
        match &upsert {
            UiEvent::Upsert(message) => {
                assert_eq!(message.message_id(), Some("m1"));
                assert_eq!(message.run_id(), Some("r1"));
                assert!(!message.merges());
            }
            other => panic!("expected upsert, got {:?}", other),
        }

        let remove: UiEvent =
            serde_json::from_value(json!({ "type": "remove-ui", "id": "card-1" })).unwrap();
        assert_eq!(remove.id(), "card-1");
        assert_eq!(serde_json::to_value(&remove).unwrap()["type"], "remove-ui");
    }

    #[test]
    fn test_non_ui_custom_payload_is_rejected() {
        let result = serde_json::from_value::<UiEvent>(json!({ "progress": 0.5 }));
        assert!(result.is_err());
    }
}
