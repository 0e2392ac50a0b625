//! Reverse proxy to the agent server and its sibling services.

mod error;
pub mod forward;
mod gateway;

pub use error::ProxyError;
pub use gateway::ProxyGateway;
