//! What the rendering layer should show for a stream state.

use parley_protocol::{Message, MessageType};

use super::controller::{Phase, StreamState};
use crate::interrupt::InterruptView;

#[derive(Debug, Clone, PartialEq)]
pub struct ThreadView<'a> {
    /// Messages in order, minus hidden placeholders.
    pub messages: Vec<&'a Message>,
    pub interrupt: Option<InterruptView>,
    /// The interrupt has no ai or tool message to attach to and needs its own slot.
    pub standalone_interrupt: bool,
    /// Waiting for the first ai message of the run.
    pub show_loading: bool,
}

pub fn thread_view(state: &StreamState) -> ThreadView<'_> {
    let messages: Vec<&Message> = state
        .messages
        .iter()
        .filter(|message| !message.is_hidden())
        .collect();

    let interrupt = state.interrupt.as_ref().map(InterruptView::from_value);
    let has_agent_messages = messages
        .iter()
        .any(|message| matches!(message.kind, MessageType::Ai | MessageType::Tool));

    ThreadView {
        standalone_interrupt: interrupt.is_some() && !has_agent_messages,
        interrupt,
        messages,
        show_loading: state.phase == Phase::Streaming && !state.first_token_received,
    }
}
