//! HTTP API: session endpoints plus the catch-all proxy.

pub mod error;
pub mod handlers;
mod routes;
pub mod state;

pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use state::AppState;
