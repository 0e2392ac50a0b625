//! UI element reducer.

use parley_protocol::{UiEvent, UiMessage};
use serde_json::Value;

/// Apply one operation. Ids keep the position where they were first seen;
/// upserting a known id replaces it in place.
pub fn reduce_ui(mut state: Vec<UiMessage>, event: &UiEvent) -> Vec<UiMessage> {
    match event {
        UiEvent::Upsert(incoming) => {
            match state.iter_mut().find(|existing| existing.id == incoming.id) {
                Some(existing) => *existing = merged(existing, incoming),
                None => state.push(incoming.clone()),
            }
            state
        }
        UiEvent::Remove { id } => {
            state.retain(|existing| &existing.id != id);
            state
        }
    }
}

pub fn reduce_all<'a>(
    state: Vec<UiMessage>,
    events: impl IntoIterator<Item = &'a UiEvent>,
) -> Vec<UiMessage> {
    events.into_iter().fold(state, reduce_ui)
}

fn merged(existing: &UiMessage, incoming: &UiMessage) -> UiMessage {
    if !incoming.merges() {
        return incoming.clone();
    }

    let mut next = incoming.clone();
    if let (Value::Object(old), Value::Object(new)) = (&existing.props, &incoming.props) {
        let mut props = old.clone();
        props.extend(new.iter().map(|(k, v)| (k.clone(), v.clone())));
        next.props = Value::Object(props);
    }
    next
}
