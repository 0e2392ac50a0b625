//! Parley gateway library
//!
//! Streaming reverse proxy in front of an agent server, plus the one-time-code
//! session endpoints used by chat clients.

pub mod api;
pub mod auth;
pub mod config;
pub mod proxy;
