//! The client against a real Parley gateway in front of a scripted agent.

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use parley::api::{AppState, create_router};
use parley::auth::{SessionService, SessionSettings, TokenIssuer};
use parley::config::{CorsConfig, ProxyConfig, ProxyRoute};
use parley::proxy::ProxyGateway;
use parley_client::liveness::{CheckOutcome, check_once};
use parley_client::{AgentClient, AuthState, ClientError, Phase};
use parley_protocol::Message;

mod common;
use common::{FakeAgent, PHONE, settle, spawn_server, test_chat_with, test_session};

const SECRET: &str = "gateway-test-secret-at-least-32-characters";

fn gateway(agent_url: &str) -> Router {
    let sessions = SessionService::new(
        SessionSettings {
            expose_code: true,
            ..SessionSettings::default()
        },
        TokenIssuer::new(SECRET, chrono::Duration::hours(1)),
    );
    let proxy = ProxyGateway::new(&ProxyConfig {
        routes: vec![ProxyRoute::new("/api", agent_url)],
        default_upstream: None,
        ..ProxyConfig::default()
    })
    .unwrap();
    create_router(AppState::new(sessions, proxy, CorsConfig::default()))
}

#[tokio::test]
async fn test_login_through_gateway() {
    let agent = FakeAgent::new();
    let agent_url = agent.spawn().await;
    let gateway_url = spawn_server(gateway(&agent_url)).await;
    let session = test_session(&gateway_url);

    let err = session.manager.request_code("12345").await.unwrap_err();
    assert!(matches!(err, ClientError::InvalidInput(_)));

    let code = session.manager.request_code(PHONE).await.unwrap().code.unwrap();
    let err = session
        .manager
        .verify_and_login(PHONE, "0000")
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::Unauthorized(_)));

    let logged_in = session.manager.verify_and_login(PHONE, &code).await.unwrap();
    assert_eq!(logged_in.user_id, PHONE);
    assert!(logged_in.token.is_some());
    assert!(matches!(session.manager.state(), AuthState::LoggedIn(_)));

    // codes are single use
    let err = session
        .manager
        .verify_and_login(PHONE, &code)
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::Unauthorized(_)));

    let status = session.manager.check_auth_status().await.unwrap();
    assert!(status.is_authenticated);
    assert_eq!(
        check_once(&session.manager, session.manager.epoch()).await,
        CheckOutcome::Authenticated
    );
}

#[tokio::test]
async fn test_chat_through_gateway() {
    let agent = FakeAgent::new();
    let agent_url = agent.spawn().await;
    let gateway_url = spawn_server(gateway(&agent_url)).await;

    let session = test_session(&gateway_url);
    let code = session.manager.request_code(PHONE).await.unwrap().code.unwrap();
    let logged_in = session.manager.verify_and_login(PHONE, &code).await.unwrap();

    let client = AgentClient::new(format!("{gateway_url}/api"), Duration::from_secs(2))
        .unwrap()
        .with_session(session.manager.clone());
    let chat = test_chat_with(Arc::new(client));

    assert!(chat.controller.probe_health().await);

    chat.controller
        .submit(vec![Message::human("h1", "hello")])
        .await
        .unwrap();
    settle(&chat.controller).await;

    let state = chat.controller.state();
    assert_eq!(state.phase, Phase::Bound);
    assert_eq!(state.thread_id.as_deref(), Some("thread-1"));
    assert_eq!(state.messages.len(), 2);
    assert_eq!(state.messages[1].text(), "hi there");

    let headers = agent.last_run_headers();
    assert_eq!(
        headers["authorization"],
        format!("Bearer {}", logged_in.token.unwrap()).as_str()
    );
    assert_eq!(headers["accept"], "text/event-stream");
}

#[tokio::test]
async fn test_upstream_failure_through_gateway() {
    let agent = FakeAgent::new();
    let agent_url = agent.spawn().await;
    let gateway_url = spawn_server(gateway(&agent_url)).await;

    let client = AgentClient::new(format!("{gateway_url}/api"), Duration::from_secs(2)).unwrap();
    let chat = test_chat_with(Arc::new(client));

    chat.controller
        .submit(vec![Message::human("h1", "overload")])
        .await
        .unwrap();
    settle(&chat.controller).await;

    let state = chat.controller.state();
    assert_eq!(state.error.as_deref(), Some("The server returned an error (503)"));

    let err = chat.controller.load_thread("t-missing").await.unwrap_err();
    assert!(matches!(err, ClientError::Upstream { status: 404, .. }));
}
