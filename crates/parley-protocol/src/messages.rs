//! Conversation message types.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Messages whose id starts with this prefix are sent to the agent but never shown.
pub const DO_NOT_RENDER_ID_PREFIX: &str = "do-not-render-";

/// Who authored a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    Human,
    Ai,
    Tool,
    System,
    #[serde(other)]
    Other,
}

/// A single message in a thread.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(rename = "type")]
    pub kind: MessageType,

    #[serde(default)]
    pub content: MessageContent,

    /// Tool invocations requested by an ai message.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,

    /// The call this tool message answers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub additional_kwargs: Map<String, Value>,
}

impl Message {
    /// Create a human message with a fresh id.
    pub fn human(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            kind: MessageType::Human,
            content: MessageContent::Text(text.into()),
            tool_calls: Vec::new(),
            tool_call_id: None,
            name: None,
            additional_kwargs: Map::new(),
        }
    }

    /// Create an ai message.
    pub fn ai(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            kind: MessageType::Ai,
            ..Self::human(id, text)
        }
    }

    /// Create a tool message answering `tool_call_id`.
    pub fn tool(
        id: impl Into<String>,
        tool_call_id: impl Into<String>,
        name: Option<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            kind: MessageType::Tool,
            tool_call_id: Some(tool_call_id.into()),
            name,
            ..Self::human(id, text)
        }
    }

    pub fn with_tool_calls(mut self, tool_calls: Vec<ToolCall>) -> Self {
        self.tool_calls = tool_calls;
        self
    }

    /// Whether the rendering layer should skip this message.
    pub fn is_hidden(&self) -> bool {
        self.id
            .as_deref()
            .is_some_and(|id| id.starts_with(DO_NOT_RENDER_ID_PREFIX))
    }

    /// Flattened text content.
    pub fn text(&self) -> String {
        self.content.as_text()
    }

    /// Model reasoning carried in `additional_kwargs.reasoning_content`, if any.
    pub fn reasoning_content(&self) -> Option<&str> {
        self.additional_kwargs
            .get("reasoning_content")
            .and_then(Value::as_str)
    }
}

/// Message content: plain text or a list of typed parts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

impl Default for MessageContent {
    fn default() -> Self {
        Self::Text(String::new())
    }
}

impl MessageContent {
    /// Join all text parts with a single space.
    pub fn as_text(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Parts(parts) => parts
                .iter()
                .filter(|part| part.kind == "text")
                .filter_map(|part| part.text.as_deref())
                .collect::<Vec<_>>()
                .join(" "),
        }
    }
}

/// A typed content part. Unknown part fields are preserved in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentPart {
    #[serde(rename = "type")]
    pub kind: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A tool invocation requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    pub name: String,

    #[serde(default)]
    pub args: Value,
}
