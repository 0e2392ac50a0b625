use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("no proxy route for {0}")]
    NoRoute(String),

    #[error("invalid upstream request: {0}")]
    InvalidRequest(String),

    #[error("upstream request failed: {0}")]
    Network(#[from] reqwest::Error),

    /// Upstream answered with a non-success status.
    #[error("Backend error: {} {body}", .status.as_u16())]
    Upstream { status: StatusCode, body: String },
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        match self {
            Self::NoRoute(path) => {
                tracing::debug!("no proxy route for {}", path);
                (StatusCode::NOT_FOUND, "Not Found").into_response()
            }
            Self::Upstream { status, .. } => {
                tracing::warn!("{}", self);
                (status, self.to_string()).into_response()
            }
            Self::InvalidRequest(_) | Self::Network(_) => {
                tracing::error!("proxy error: {}", self);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal Server Error during proxy",
                )
                    .into_response()
            }
        }
    }
}
