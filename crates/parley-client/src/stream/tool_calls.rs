//! Tool-call pairing before a turn is submitted.

use std::collections::HashSet;

use parley_protocol::{DO_NOT_RENDER_ID_PREFIX, Message, MessageType};
use uuid::Uuid;

pub const PLACEHOLDER_TOOL_CONTENT: &str = "Successfully handled tool call.";

/// Hidden tool responses for every tool call in `messages` that has no
/// answering tool message right after its ai message.
///
/// The agent server rejects a history with an unanswered tool call, which
/// happens when a run was stopped or interrupted mid-tool.
pub fn ensure_tool_calls_have_responses(messages: &[Message]) -> Vec<Message> {
    let mut placeholders = Vec::new();

    for (index, message) in messages.iter().enumerate() {
        if message.kind != MessageType::Ai || message.tool_calls.is_empty() {
            continue;
        }

        let answered: HashSet<&str> = messages[index + 1..]
            .iter()
            .take_while(|next| next.kind == MessageType::Tool)
            .filter_map(|next| next.tool_call_id.as_deref())
            .collect();

        for call in &message.tool_calls {
            let Some(call_id) = call.id.as_deref() else {
                continue;
            };
            if answered.contains(call_id) {
                continue;
            }
            placeholders.push(Message::tool(
                format!("{DO_NOT_RENDER_ID_PREFIX}{}", Uuid::new_v4()),
                call_id,
                Some(call.name.clone()),
                PLACEHOLDER_TOOL_CONTENT,
            ));
        }
    }

    placeholders
}
