//! Test utilities and common setup.
#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    Json, Router,
    body::{Body, Bytes},
    extract::{Path, State},
    http::{HeaderMap, Request, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{any, get, post},
};
use chrono::{Duration, Utc};
use parley::api::{AppState, create_router};
use parley::auth::{ManualClock, SessionService, SessionSettings, TokenIssuer};
use parley::config::{CorsConfig, ProxyConfig, ProxyRoute};
use parley::proxy::ProxyGateway;
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::sync::Notify;

pub const TEST_SECRET: &str = "test-secret-for-integration-tests-minimum-32-chars";

pub struct TestApp {
    pub router: Router,
    pub clock: Arc<ManualClock>,
}

/// Gateway with codes echoed and `/api` pointed at `upstream`.
pub fn test_app(upstream: &str) -> TestApp {
    test_app_with(upstream, SessionSettings {
        expose_code: true,
        ..SessionSettings::default()
    })
}

pub fn test_app_with(upstream: &str, settings: SessionSettings) -> TestApp {
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let sessions = SessionService::new(settings, TokenIssuer::new(TEST_SECRET, Duration::hours(1)))
        .with_clock(clock.clone());

    let gateway = ProxyGateway::new(&ProxyConfig {
        routes: vec![ProxyRoute::new("/api", upstream)],
        default_upstream: None,
        ..ProxyConfig::default()
    })
    .expect("gateway");

    let state = AppState::new(sessions, gateway, CorsConfig::default());
    TestApp {
        router: create_router(state),
        clock,
    }
}

/// Serve `router` on an ephemeral local port and return its base URL.
pub async fn spawn_server(router: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}

/// A local URL nothing is listening on.
pub async fn dead_upstream() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}")
}

/// Stand-in agent server.
///
/// `/runs/stream` emits a metadata event, then waits for `release` before
/// emitting a values event.
pub fn fake_agent(release: Arc<Notify>) -> Router {
    Router::new()
        .route("/info", get(|| async { Json(json!({ "version": "test" })) }))
        .route("/busy", any(|| async { (StatusCode::SERVICE_UNAVAILABLE, "overloaded") }))
        .route("/missing", get(|| async { (StatusCode::NOT_FOUND, "no such thread") }))
        .route("/echo", any(echo))
        .route("/threads/{thread_id}/runs/stream", post(run_stream))
        .with_state(release)
}

async fn echo(req: Request<Body>) -> Json<Value> {
    let (parts, body) = req.into_parts();
    let body = axum::body::to_bytes(body, 1024 * 1024).await.unwrap_or_default();
    let header = |name: &str| {
        parts
            .headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(String::from)
    };

    Json(json!({
        "method": parts.method.as_str(),
        "path": parts.uri.path(),
        "query": parts.uri.query(),
        "host": header("host"),
        "accept": header("accept"),
        "api_key": header("x-api-key"),
        "body": String::from_utf8_lossy(&body),
    }))
}

async fn run_stream(
    State(release): State<Arc<Notify>>,
    Path(thread_id): Path<String>,
) -> Response {
    let first = format!(
        "event: metadata\ndata: {}\n\n",
        json!({ "run_id": "run-1", "thread_id": thread_id })
    );
    let second = format!(
        "event: values\ndata: {}\n\n",
        json!({ "messages": [{ "id": "a1", "type": "ai", "content": "hello" }] })
    );

    let stream = futures::stream::unfold(0u8, move |step| {
        let release = release.clone();
        let first = first.clone();
        let second = second.clone();
        async move {
            match step {
                0 => Some((Ok::<_, std::io::Error>(Bytes::from(first)), 1)),
                1 => {
                    release.notified().await;
                    Some((Ok(Bytes::from(second)), 2))
                }
                _ => None,
            }
        }
    });

    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_TYPE, "text/event-stream".parse().unwrap());
    (headers, Body::from_stream(stream)).into_response()
}

pub fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .method("POST")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub fn get_request(uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .method("GET")
        .body(Body::empty())
        .unwrap()
}

pub async fn json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

pub async fn text_body(response: Response) -> String {
    let body = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .unwrap();
    String::from_utf8(body.to_vec()).unwrap()
}
