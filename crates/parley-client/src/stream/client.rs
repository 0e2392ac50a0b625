//! HTTP access to the agent server's threads/runs API.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use log::debug;
use parley_protocol::{RunRequest, RunStreamEvent, Thread, ThreadValues};
use reqwest::header::{ACCEPT, HeaderMap, HeaderValue};
use reqwest_eventsource::{Event, EventSource, retry::Never};
use serde::{Deserialize, de::DeserializeOwned};
use serde_json::{Value, json};

use crate::error::ClientError;
use crate::session::SessionManager;

const API_KEY_HEADER: &str = "x-api-key";
const THREAD_SEARCH_LIMIT: usize = 100;

pub struct AgentClient {
    http: reqwest::Client,
    api_url: String,
    api_key: Option<String>,
    session: Option<Arc<SessionManager>>,
}

impl AgentClient {
    /// Only the connect phase is bounded; runs may stream for a long time.
    pub fn new(api_url: impl Into<String>, connect_timeout: Duration) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .build()?;

        Ok(Self {
            http,
            api_url: api_url.into().trim_end_matches('/').to_string(),
            api_key: None,
            session: None,
        })
    }

    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key.filter(|key| !key.trim().is_empty());
        self
    }

    /// Attach the session whose bearer token goes on every request.
    pub fn with_session(mut self, session: Arc<SessionManager>) -> Self {
        self.session = Some(session);
        self
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_url, path)
    }

    fn headers(&self) -> HeaderMap {
        let mut headers = match &self.session {
            Some(session) => session.auth_headers(),
            None => HeaderMap::new(),
        };
        if let Some(key) = &self.api_key
            && let Ok(value) = HeaderValue::from_str(key)
        {
            headers.insert(API_KEY_HEADER, value);
        }
        headers
    }

    async fn read_json<T: DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, ClientError> {
        if !response.status().is_success() {
            return Err(ClientError::from_response(response).await);
        }
        Ok(response.json().await?)
    }

    /// Server health and version.
    pub async fn info(&self) -> Result<Value, ClientError> {
        let response = self
            .http
            .get(self.url("/info"))
            .headers(self.headers())
            .send()
            .await?;
        Self::read_json(response).await
    }

    pub async fn create_thread(&self) -> Result<Thread, ClientError> {
        let response = self
            .http
            .post(self.url("/threads"))
            .headers(self.headers())
            .json(&json!({}))
            .send()
            .await?;
        Self::read_json(response).await
    }

    /// Threads belonging to `assistant_id`, most recent first.
    pub async fn search_threads(&self, assistant_id: &str) -> Result<Vec<Thread>, ClientError> {
        let body = json!({
            "metadata": super::search_metadata(assistant_id),
            "limit": THREAD_SEARCH_LIMIT,
        });
        let response = self
            .http
            .post(self.url("/threads/search"))
            .headers(self.headers())
            .json(&body)
            .send()
            .await?;
        Self::read_json(response).await
    }

    /// Current values of a thread.
    pub async fn thread_state(&self, thread_id: &str) -> Result<ThreadValues, ClientError> {
        #[derive(Deserialize)]
        struct ThreadState {
            #[serde(default)]
            values: Option<ThreadValues>,
        }

        let response = self
            .http
            .get(self.url(&format!("/threads/{thread_id}/state")))
            .headers(self.headers())
            .send()
            .await?;
        let state: ThreadState = Self::read_json(response).await?;
        Ok(state.values.unwrap_or_default())
    }

    /// Start a run. Nothing is sent until the returned stream is first polled.
    pub fn stream_run(&self, thread_id: &str, request: &RunRequest) -> Result<RunStream, ClientError> {
        let builder = self
            .http
            .post(self.url(&format!("/threads/{thread_id}/runs/stream")))
            .headers(self.headers())
            .header(ACCEPT, "text/event-stream")
            .json(request);

        let mut source =
            EventSource::new(builder).map_err(|e| ClientError::Stream(e.to_string()))?;
        // a dropped run is not resumable by reconnecting
        source.set_retry_policy(Box::new(Never));

        Ok(RunStream { source })
    }
}

/// Events of one run, decoded.
pub struct RunStream {
    source: EventSource,
}

impl RunStream {
    /// Next event, or `None` once the server closes the stream.
    pub async fn next_event(&mut self) -> Option<Result<RunStreamEvent, ClientError>> {
        loop {
            match self.source.next().await? {
                Ok(Event::Open) => debug!("Run stream opened"),
                Ok(Event::Message(msg)) => {
                    return Some(RunStreamEvent::parse(&msg.event, &msg.data).map_err(|e| {
                        ClientError::Stream(format!("malformed '{}' event: {e}", msg.event))
                    }));
                }
                Err(reqwest_eventsource::Error::StreamEnded) => {
                    self.source.close();
                    return None;
                }
                Err(reqwest_eventsource::Error::InvalidStatusCode(status, response)) => {
                    self.source.close();
                    let body = response.text().await.unwrap_or_default();
                    return Some(Err(ClientError::from_status(status, body)));
                }
                Err(reqwest_eventsource::Error::Transport(e)) => {
                    self.source.close();
                    return Some(Err(ClientError::Network(e)));
                }
                Err(e) => {
                    self.source.close();
                    return Some(Err(ClientError::Stream(e.to_string())));
                }
            }
        }
    }

    /// Abort the underlying request.
    pub fn close(&mut self) {
        self.source.close();
    }
}
