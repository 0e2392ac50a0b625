//! HTTP handlers.

pub mod session;

use axum::{
    Json,
    body::Body,
    extract::{Request, State},
    response::Response,
};
use serde::Serialize;

use super::error::ApiResult;
use super::state::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Forward anything not handled locally to its upstream.
pub async fn proxy(State(state): State<AppState>, req: Request) -> ApiResult<Response<Body>> {
    Ok(state.gateway.forward(req).await?)
}
