//! API route definitions.

use axum::{
    Router,
    http::{HeaderName, HeaderValue, Method},
    routing::{get, post},
};
use tower_http::cors::{AllowHeaders, AllowOrigin, CorsLayer};
use tower_http::trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::Level;

use super::handlers::{self, session};
use super::state::AppState;
use crate::config::CorsConfig;

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    let cors = build_cors_layer(&state.cors);

    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
        .on_request(DefaultOnRequest::new().level(Level::INFO))
        .on_response(DefaultOnResponse::new().level(Level::INFO));

    Router::new()
        .route("/health", get(handlers::health))
        .route("/code-request", post(session::request_code))
        .route("/login", post(session::login))
        .route("/logout", post(session::logout))
        .route("/auth-status", get(session::auth_status))
        .fallback(handlers::proxy)
        .layer(trace_layer)
        .layer(cors)
        .with_state(state)
}

fn build_cors_layer(config: &CorsConfig) -> CorsLayer {
    let methods: Vec<Method> = config
        .allow_methods
        .iter()
        .filter_map(|m| m.parse().ok())
        .collect();

    let headers: Vec<HeaderName> = config
        .allow_headers
        .iter()
        .filter_map(|h| h.parse().ok())
        .collect();

    let origins: Vec<HeaderValue> = config
        .allow_origins
        .iter()
        .filter_map(|o| o.parse().ok())
        .collect();

    let allow_origin = if origins.is_empty() {
        if config.allow_credentials {
            // Credentials cannot be combined with a wildcard origin.
            AllowOrigin::mirror_request()
        } else {
            AllowOrigin::any()
        }
    } else {
        tracing::info!("CORS: allowing origins {:?}", config.allow_origins);
        AllowOrigin::list(origins)
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods(methods)
        .allow_headers(AllowHeaders::list(headers))
        .allow_credentials(config.allow_credentials)
}
