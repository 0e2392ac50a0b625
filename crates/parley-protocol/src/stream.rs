//! Threads and run streaming.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::messages::Message;
use crate::ui::{UiEvent, UiMessage};

/// A server-side conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Thread {
    pub thread_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,

    #[serde(default)]
    pub metadata: Value,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub values: Option<Value>,
}

/// A point in a thread's history to resume from.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checkpoint_ns: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checkpoint_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checkpoint_map: Option<Value>,
}

/// One pending interrupt as reported in a state snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterruptEntry {
    #[serde(default)]
    pub value: Value,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resumable: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub when: Option<String>,
}

/// Thread state as streamed in `values` events.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ThreadValues {
    #[serde(default)]
    pub messages: Vec<Message>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ui: Vec<UiMessage>,

    #[serde(
        rename = "__interrupt__",
        default,
        skip_serializing_if = "Vec::is_empty"
    )]
    pub interrupts: Vec<InterruptEntry>,

    /// Graph-specific state keys.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ThreadValues {
    /// Value of the first pending interrupt.
    pub fn interrupt(&self) -> Option<&Value> {
        self.interrupts.first().map(|entry| &entry.value)
    }
}

/// Body of `POST /threads/{thread_id}/runs/stream`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRequest {
    pub assistant_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checkpoint: Option<Checkpoint>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<Value>,

    pub stream_mode: Vec<String>,
}

impl RunRequest {
    /// A run streaming full state snapshots and custom events.
    pub fn new(assistant_id: impl Into<String>) -> Self {
        Self {
            assistant_id: assistant_id.into(),
            input: None,
            command: None,
            checkpoint: None,
            config: None,
            stream_mode: vec!["values".to_string(), "custom".to_string()],
        }
    }

    /// Append `messages` to the thread's message channel.
    pub fn with_messages(mut self, messages: &[Message]) -> Self {
        self.input = Some(serde_json::json!({ "messages": messages }));
        self
    }

    pub fn with_checkpoint(mut self, checkpoint: Option<Checkpoint>) -> Self {
        self.checkpoint = checkpoint;
        self
    }

    /// Resume an interrupted run with `resume`.
    pub fn with_resume(mut self, resume: Value) -> Self {
        self.command = Some(serde_json::json!({ "resume": resume }));
        self
    }
}

/// A decoded SSE event from a run stream.
#[derive(Debug, Clone, PartialEq)]
pub enum RunStreamEvent {
    /// First event of every run.
    Metadata {
        run_id: String,
        thread_id: Option<String>,
    },
    /// Full state snapshot.
    Values(ThreadValues),
    /// Out-of-band payload; UI operations arrive here.
    Custom(Value),
    Error {
        error: Option<String>,
        message: Option<String>,
    },
    End,
    /// Stream modes the client does not interpret.
    Other { event: String, data: Value },
}

impl RunStreamEvent {
    /// Decode an SSE `event` name and `data` payload. Subgraph events are named
    /// `mode|namespace` and decode as their mode.
    pub fn parse(event: &str, data: &str) -> Result<Self, serde_json::Error> {
        let mode = event.split('|').next().unwrap_or(event);
        let data = if data.trim().is_empty() { "null" } else { data };

        match mode {
            "metadata" => {
                #[derive(Deserialize)]
                struct RunMetadata {
                    run_id: String,
                    #[serde(default)]
                    thread_id: Option<String>,
                }
                let meta: RunMetadata = serde_json::from_str(data)?;
                Ok(Self::Metadata {
                    run_id: meta.run_id,
                    thread_id: meta.thread_id,
                })
            }
            "values" => Ok(Self::Values(serde_json::from_str(data)?)),
            "custom" => Ok(Self::Custom(serde_json::from_str(data)?)),
            "error" => {
                let value: Value = serde_json::from_str(data)?;
                let field = |name: &str| value.get(name).and_then(Value::as_str).map(String::from);
                Ok(Self::Error {
                    error: field("error"),
                    message: field("message").or_else(|| value.as_str().map(String::from)),
                })
            }
            "end" => Ok(Self::End),
            _ => Ok(Self::Other {
                event: event.to_string(),
                data: serde_json::from_str(data).unwrap_or(Value::String(data.to_string())),
            }),
        }
    }

    /// The UI operation carried by a custom event, if it is one.
    pub fn ui_event(&self) -> Option<UiEvent> {
        match self {
            Self::Custom(value) => serde_json::from_value(value.clone()).ok(),
            _ => None,
        }
    }

    /// Human readable error text for `Error` events.
    pub fn error_text(&self) -> Option<String> {
        match self {
            Self::Error { error, message } => match (error, message) {
                (Some(error), Some(message)) => Some(format!("{error}: {message}")),
                (None, Some(message)) => Some(message.clone()),
                (Some(error), None) => Some(error.clone()),
                (None, None) => Some("Unknown stream error".to_string()),
            },
            _ => None,
        }
    }
}
