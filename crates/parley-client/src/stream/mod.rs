//! Conversation streaming against the agent server.

mod client;
mod controller;
mod threads;
pub mod tool_calls;
pub mod ui;
pub mod view;

pub use client::{AgentClient, RunStream};
pub use controller::{ControllerSettings, Notice, Phase, StreamController, StreamState};
pub use threads::{ThreadList, search_metadata};
pub use view::{ThreadView, thread_view};
