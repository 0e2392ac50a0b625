//! Fake session and agent servers for client tests.
#![allow(dead_code)]

use std::collections::HashMap;
use std::convert::Infallible;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    Json, Router,
    body::{Body, Bytes},
    extract::{Path, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use futures::StreamExt;
use parley_client::session::Navigator;
use parley_client::stream::ControllerSettings;
use parley_client::{AgentClient, MemoryStorage, SessionManager, StreamController, ThreadList};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::sync::Notify;

pub const PHONE: &str = "13800138000";
pub const CODE: &str = "1234";
pub const TOKEN: &str = "tok-1";

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
pub async fn dead_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}")
}

/// Poll `check` until it holds or three seconds pass.
pub async fn eventually<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..300 {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

#[derive(Default)]
pub struct RecordingNavigator {
    pub redirects: Mutex<Vec<String>>,
}

impl RecordingNavigator {
    pub fn redirects(&self) -> Vec<String> {
        self.redirects.lock().unwrap().clone()
    }
}

impl Navigator for RecordingNavigator {
    fn hard_redirect(&self, path: &str) {
        self.redirects.lock().unwrap().push(path.to_string());
    }
}

pub struct TestSession {
    pub manager: Arc<SessionManager>,
    pub storage: Arc<MemoryStorage>,
    pub navigator: Arc<RecordingNavigator>,
}

pub fn test_session(base_url: &str) -> TestSession {
    let storage = Arc::new(MemoryStorage::new());
    let navigator = Arc::new(RecordingNavigator::default());
    let manager = SessionManager::new(base_url, storage.clone(), navigator.clone());
    manager.restore();
    TestSession {
        manager: Arc::new(manager),
        storage,
        navigator,
    }
}

// ---------------------------------------------------------------------------
// Session server
// ---------------------------------------------------------------------------

pub struct FakeSessionServer {
    pub authenticated: AtomicBool,
    pub status_calls: AtomicUsize,
    pub logout_calls: AtomicUsize,
    pub logout_authorization: Mutex<Option<String>>,
    /// When set, `/auth-status` holds its answer until notified.
    pub status_gate: Mutex<Option<Arc<Notify>>>,
}

impl FakeSessionServer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            authenticated: AtomicBool::new(true),
            status_calls: AtomicUsize::new(0),
            logout_calls: AtomicUsize::new(0),
            logout_authorization: Mutex::new(None),
            status_gate: Mutex::new(None),
        })
    }

    pub fn set_authenticated(&self, value: bool) {
        self.authenticated.store(value, Ordering::SeqCst);
    }

    pub fn status_calls(&self) -> usize {
        self.status_calls.load(Ordering::SeqCst)
    }

    pub fn gate_status(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.status_gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    /// Answer `/auth-status` immediately again. Requests already held stay held.
    pub fn open_status(&self) {
        *self.status_gate.lock().unwrap() = None;
    }

    pub async fn spawn(self: &Arc<Self>) -> String {
        let router = Router::new()
            .route("/code-request", post(code_request))
            .route("/login", post(login))
            .route("/logout", post(logout))
            .route("/auth-status", get(auth_status))
            .with_state(self.clone());
        spawn_server(router).await
    }
}

async fn code_request(Json(body): Json<Value>) -> Response {
    if body["phoneNumber"] != PHONE {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "success": false, "message": "Invalid phone number format" })),
        )
            .into_response();
    }
    Json(json!({ "success": true, "message": "Verification code sent", "code": CODE }))
        .into_response()
}

async fn login(Json(body): Json<Value>) -> Response {
    if body["code"] != CODE {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({
                "success": false,
                "message": "Verification code mismatch",
                "code": "code_mismatch"
            })),
        )
            .into_response();
    }
    Json(json!({
        "success": true,
        "message": "Login successful",
        "user_id": body["phoneNumber"],
        "token": TOKEN,
        "token_type": "bearer"
    }))
    .into_response()
}

async fn logout(State(server): State<Arc<FakeSessionServer>>, headers: HeaderMap) -> Json<Value> {
    *server.logout_authorization.lock().unwrap() = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(String::from);
    server.logout_calls.fetch_add(1, Ordering::SeqCst);
    Json(json!({ "success": true, "message": "Logged out" }))
}

async fn auth_status(State(server): State<Arc<FakeSessionServer>>) -> Json<Value> {
    server.status_calls.fetch_add(1, Ordering::SeqCst);
    let gate = server.status_gate.lock().unwrap().clone();
    if let Some(gate) = gate {
        gate.notified().await;
    }
    Json(json!({ "is_authenticated": server.authenticated.load(Ordering::SeqCst) }))
}

// ---------------------------------------------------------------------------
// Agent server
// ---------------------------------------------------------------------------

#[derive(Default, Clone)]
struct ThreadRecord {
    messages: Vec<Value>,
    interrupt: Option<Value>,
    ui: Vec<Value>,
}

impl ThreadRecord {
    fn values(&self) -> Value {
        let interrupts: Vec<Value> = self
            .interrupt
            .iter()
            .map(|value| json!({ "value": value, "resumable": true }))
            .collect();
        json!({ "messages": self.messages, "ui": self.ui, "__interrupt__": interrupts })
    }

    /// Keep the server-side `ui` list in step with an emitted custom event.
    fn record_ui(&mut self, event: &Value) {
        let id = event["id"].clone();
        match event["type"].as_str() {
            Some("remove-ui") => self.ui.retain(|ui| ui["id"] != id),
            Some("ui") => match self.ui.iter_mut().find(|ui| ui["id"] == id) {
                Some(existing) if event["metadata"]["merge"] == true => {
                    if let (Some(props), Some(update)) = (
                        existing["props"].as_object_mut(),
                        event["props"].as_object(),
                    ) {
                        props.extend(update.clone());
                    }
                }
                Some(existing) => *existing = event.clone(),
                None => self.ui.push(event.clone()),
            },
            _ => {}
        }
    }
}

/// Scripted agent server. The text of the last human message picks the script:
/// `hang` waits for `release` mid-run, `fail` emits an error event (`fail twice` two identical ones), `interrupt`
/// and `pause` pause the run, `ui` emits UI events (`clear ui` drops them), `overload` answers 503.
pub struct FakeAgent {
    pub healthy: AtomicBool,
    pub release: Notify,
    threads: Mutex<HashMap<String, ThreadRecord>>,
    created: AtomicUsize,
    pub searches: Mutex<Vec<Value>>,
    pub runs: Mutex<Vec<Value>>,
    pub run_headers: Mutex<Vec<HeaderMap>>,
    ai_counter: AtomicUsize,
}

impl FakeAgent {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            healthy: AtomicBool::new(true),
            release: Notify::new(),
            threads: Mutex::new(HashMap::new()),
            created: AtomicUsize::new(0),
            searches: Mutex::new(Vec::new()),
            runs: Mutex::new(Vec::new()),
            run_headers: Mutex::new(Vec::new()),
            ai_counter: AtomicUsize::new(0),
        })
    }

    pub async fn spawn(self: &Arc<Self>) -> String {
        spawn_server(self.router()).await
    }

    pub fn router(self: &Arc<Self>) -> Router {
        Router::new()
            .route("/info", get(info))
            .route("/threads", post(create_thread))
            .route("/threads/search", post(search_threads))
            .route("/threads/{thread_id}/state", get(thread_state))
            .route("/threads/{thread_id}/runs/stream", post(run_stream))
            .with_state(self.clone())
    }

    pub fn seed_thread(&self, thread_id: &str, messages: Vec<Value>, interrupt: Option<Value>) {
        self.threads.lock().unwrap().insert(
            thread_id.to_string(),
            ThreadRecord {
                messages,
                interrupt,
                ui: Vec::new(),
            },
        );
    }

    pub fn last_run(&self) -> Value {
        self.runs.lock().unwrap().last().cloned().unwrap_or(Value::Null)
    }

    pub fn run_count(&self) -> usize {
        self.runs.lock().unwrap().len()
    }

    pub fn last_run_headers(&self) -> HeaderMap {
        self.run_headers
            .lock()
            .unwrap()
            .last()
            .cloned()
            .unwrap_or_default()
    }

    pub fn search_count(&self) -> usize {
        self.searches.lock().unwrap().len()
    }

    fn next_ai(&self, text: &str) -> Value {
        let n = self.ai_counter.fetch_add(1, Ordering::SeqCst);
        json!({ "id": format!("ai-{n}"), "type": "ai", "content": text })
    }

    fn update<T>(&self, thread_id: &str, f: impl FnOnce(&mut ThreadRecord) -> T) -> T {
        let mut threads = self.threads.lock().unwrap();
        f(threads.entry(thread_id.to_string()).or_default())
    }

    fn values(&self, thread_id: &str) -> Value {
        self.update(thread_id, |record| record.values())
    }

    async fn play(
        self: Arc<Self>,
        thread_id: String,
        body: Value,
        tx: futures::channel::mpsc::UnboundedSender<String>,
    ) {
        let send = |event: &str, data: Value| {
            let _ = tx.unbounded_send(format!("event: {event}\ndata: {data}\n\n"));
        };
        send(
            "metadata",
            json!({ "run_id": format!("run-{}", self.run_count()), "thread_id": thread_id }),
        );

        let input: Vec<Value> = body["input"]["messages"]
            .as_array()
            .cloned()
            .unwrap_or_default();
        let text = input
            .iter()
            .rev()
            .find(|m| m["type"] == "human")
            .and_then(|m| m["content"].as_str())
            .unwrap_or_default()
            .to_string();
        self.update(&thread_id, |record| record.messages.extend(input.clone()));

        if let Some(resume) = body["command"]["resume"].as_array() {
            let kind = resume[0]["type"].as_str().unwrap_or("?").to_string();
            let ai = self.next_ai(&format!("resumed: {kind}"));
            self.update(&thread_id, |record| {
                record.interrupt = None;
                record.messages.push(ai);
            });
            send("values", self.values(&thread_id));
            return;
        }

        if input.is_empty() {
            let ai = self.next_ai("regenerated");
            self.update(&thread_id, |record| {
                if record.messages.last().is_some_and(|m| m["type"] == "ai") {
                    record.messages.pop();
                }
                send("values", record.values());
                record.messages.push(ai);
            });
            send("values", self.values(&thread_id));
            return;
        }

        match text.as_str() {
            "hang" => {
                send("values", self.values(&thread_id));
                self.release.notified().await;
                let ai = self.next_ai("too late");
                self.update(&thread_id, |record| record.messages.push(ai));
                send("values", self.values(&thread_id));
            }
            "fail" => {
                send("error", json!({ "error": "ValueError", "message": "boom" }));
            }
            "fail twice" => {
                send("error", json!({ "error": "ValueError", "message": "boom" }));
                send("error", json!({ "error": "ValueError", "message": "boom" }));
            }
            "interrupt" => {
                let ai = self.next_ai("I need approval first");
                self.update(&thread_id, |record| {
                    record.messages.push(ai);
                    record.interrupt = Some(json!({
                        "action_request": { "action": "send_email", "args": { "to": "a@b.c" } },
                        "config": {
                            "allow_respond": true,
                            "allow_accept": true,
                            "allow_edit": false,
                            "allow_ignore": true
                        },
                        "description": "Send the email?"
                    }));
                });
                send("values", self.values(&thread_id));
            }
            "pause" => {
                self.update(&thread_id, |record| {
                    record.interrupt = Some(json!({ "question": "Which day?" }));
                });
                send("values", self.values(&thread_id));
            }
            "ui" => {
                let ui = |id: &str, props: Value, merge: bool| {
                    json!({
                        "type": "ui", "id": id, "name": "card", "props": props,
                        "metadata": { "merge": merge }
                    })
                };
                let events = [
                    ui("card-1", json!({ "n": 1 }), false),
                    ui("card-2", json!({}), false),
                    json!({ "progress": 0.5 }),
                    ui("card-1", json!({ "m": 2 }), true),
                    json!({ "type": "remove-ui", "id": "card-2" }),
                ];
                for event in events {
                    self.update(&thread_id, |record| record.record_ui(&event));
                    send("custom", event);
                }
                let ai = self.next_ai("here is a card");
                self.update(&thread_id, |record| record.messages.push(ai));
                send("values", self.values(&thread_id));
            }
            "clear ui" => {
                let ai = self.next_ai("cleared");
                self.update(&thread_id, |record| {
                    record.ui.clear();
                    record.messages.push(ai);
                });
                send("values", self.values(&thread_id));
            }
            _ => {
                let ai = self.next_ai("hi there");
                self.update(&thread_id, |record| record.messages.push(ai));
                send("values", self.values(&thread_id));
            }
        }
    }
}

async fn info(State(agent): State<Arc<FakeAgent>>) -> Response {
    if agent.healthy.load(Ordering::SeqCst) {
        Json(json!({ "version": "fake" })).into_response()
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "starting").into_response()
    }
}

async fn create_thread(State(agent): State<Arc<FakeAgent>>) -> Json<Value> {
    let n = agent.created.fetch_add(1, Ordering::SeqCst) + 1;
    let thread_id = format!("thread-{n}");
    agent.seed_thread(&thread_id, Vec::new(), None);
    Json(json!({ "thread_id": thread_id, "metadata": {} }))
}

async fn search_threads(
    State(agent): State<Arc<FakeAgent>>,
    Json(body): Json<Value>,
) -> Json<Value> {
    agent.searches.lock().unwrap().push(body);
    let mut ids: Vec<String> = agent.threads.lock().unwrap().keys().cloned().collect();
    ids.sort();
    Json(Value::Array(
        ids.into_iter()
            .map(|id| json!({ "thread_id": id, "metadata": { "graph_id": "agent" } }))
            .collect(),
    ))
}

async fn thread_state(
    State(agent): State<Arc<FakeAgent>>,
    Path(thread_id): Path<String>,
) -> Response {
    let record = agent.threads.lock().unwrap().get(&thread_id).cloned();
    match record {
        Some(record) => Json(json!({ "values": record.values(), "next": [] })).into_response(),
        None => (StatusCode::NOT_FOUND, "thread not found").into_response(),
    }
}

async fn run_stream(
    State(agent): State<Arc<FakeAgent>>,
    Path(thread_id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    agent.runs.lock().unwrap().push(body.clone());
    agent.run_headers.lock().unwrap().push(headers);

    let overloaded = body["input"]["messages"]
        .as_array()
        .is_some_and(|messages| messages.iter().any(|m| m["content"] == "overload"));
    if overloaded {
        return (StatusCode::SERVICE_UNAVAILABLE, "overloaded").into_response();
    }

    let (tx, rx) = futures::channel::mpsc::unbounded::<String>();
    tokio::spawn(agent.clone().play(thread_id, body, tx));

    let stream = rx.map(|chunk| Ok::<_, Infallible>(Bytes::from(chunk)));
    (
        [(header::CONTENT_TYPE, "text/event-stream")],
        Body::from_stream(stream),
    )
        .into_response()
}

// ---------------------------------------------------------------------------
// Client wiring
// ---------------------------------------------------------------------------

pub struct TestChat {
    pub controller: StreamController,
    pub threads: Arc<ThreadList>,
    pub client: Arc<AgentClient>,
}

pub fn test_chat(api_url: &str) -> TestChat {
    let client = Arc::new(AgentClient::new(api_url, Duration::from_secs(2)).unwrap());
    test_chat_with(client)
}

pub fn test_chat_with(client: Arc<AgentClient>) -> TestChat {
    let threads = Arc::new(ThreadList::new(client.clone(), "agent"));
    let controller = StreamController::new(
        client.clone(),
        Some(threads.clone()),
        ControllerSettings {
            assistant_id: "agent".to_string(),
            settle_delay: Duration::from_millis(50),
        },
    );
    TestChat {
        controller,
        threads,
        client,
    }
}

/// Wait for the current run to finish, failing the test after five seconds.
pub async fn settle(controller: &StreamController) {
    tokio::time::timeout(Duration::from_secs(5), controller.wait_until_settled())
        .await
        .expect("run did not settle");
}
