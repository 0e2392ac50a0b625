//! Client half of Parley.
//!
//! ```text
//! SessionManager ──(code, login, auth-status)──> gateway session endpoints
//!      │ AuthState (watch)
//!      ├──> LivenessMonitor (periodic re-validation, forced logout)
//!      └──> AgentClient ──(threads, runs/stream)──> gateway /api ──> agent server
//!                 │
//!           StreamController (optimistic state, UI reducer, interrupts)
//! ```
//!
//! Everything here is UI-agnostic: state is published on `tokio::sync::watch`
//! channels and one-off notices on a broadcast channel, so a terminal client,
//! a desktop shell or tests can all consume the same services.

pub mod config;
pub mod error;
pub mod guard;
pub mod interrupt;
pub mod liveness;
pub mod session;
pub mod storage;
pub mod stream;

pub use config::ClientConfig;
pub use error::ClientError;
pub use guard::{RouteDecision, route_guard};
pub use interrupt::{InterruptView, is_human_interrupt, validate_interrupt};
pub use liveness::LivenessMonitor;
pub use session::{AuthState, Navigator, Session, SessionManager};
pub use storage::{JsonFileStorage, KeyValueStorage, MemoryStorage};
pub use stream::{AgentClient, Notice, Phase, StreamController, StreamState, ThreadList};
