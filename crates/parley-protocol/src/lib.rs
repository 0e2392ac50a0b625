//! Wire types shared by the Parley gateway and client.
//!
//! ```text
//! Client <--[auth bodies]--> Gateway (session endpoints)
//! Client <--[run stream events]--> Gateway (proxy) <--> Agent server
//! ```
//!
//! The agent server speaks a threads/runs protocol: a run streams state snapshots
//! (`values`), run metadata, out-of-band custom events and errors as SSE. These
//! types mirror that protocol closely enough to round-trip the fields the client
//! needs while keeping unknown fields intact.

pub mod auth;
pub mod interrupt;
pub mod messages;
pub mod stream;
pub mod ui;

pub use interrupt::{ActionRequest, HumanInterrupt, HumanInterruptConfig, HumanResponse};
pub use messages::{DO_NOT_RENDER_ID_PREFIX, Message, MessageContent, MessageType, ToolCall};
pub use stream::{Checkpoint, InterruptEntry, RunRequest, RunStreamEvent, Thread, ThreadValues};
pub use ui::{UiEvent, UiMessage};
