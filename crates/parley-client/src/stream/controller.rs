//! Per-conversation run state machine.
//!
//! `Idle` (no thread) -> `Bound` (thread known) -> `Streaming` (run in flight)
//! -> back to `Bound` when the run ends, fails or is stopped. State is
//! published on a watch channel; one-off notices (errors, new threads, health
//! warnings) on a broadcast channel.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::Duration;

use log::{debug, info, warn};
use parley_protocol::{
    Checkpoint, HumanResponse, Message, MessageType, RunRequest, RunStreamEvent, ThreadValues,
    UiMessage,
};
use serde_json::{Value, json};
use tokio::sync::{Mutex, broadcast, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::client::{AgentClient, RunStream};
use super::threads::ThreadList;
use super::tool_calls::ensure_tool_calls_have_responses;
use super::ui::reduce_ui;
use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::interrupt::validate_interrupt;

const NOTICE_CAPACITY: usize = 32;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Phase {
    #[default]
    Idle,
    Bound,
    Streaming,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StreamState {
    pub phase: Phase,
    pub thread_id: Option<String>,
    pub messages: Vec<Message>,
    pub ui: Vec<UiMessage>,
    /// Raw payload of the pending interrupt, if the run is paused.
    pub interrupt: Option<Value>,
    pub run_id: Option<String>,
    /// Last stream error, kept until the next run starts.
    pub error: Option<String>,
    /// An ai message arrived since the current run started.
    pub first_token_received: bool,
    /// Set when the agent server failed its health probe; cleared only by dismissal.
    pub health_warning: Option<String>,
}

impl StreamState {
    pub fn is_streaming(&self) -> bool {
        self.phase == Phase::Streaming
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    Error(String),
    ThreadCreated(String),
    HealthWarning(String),
}

#[derive(Debug, Clone)]
pub struct ControllerSettings {
    pub assistant_id: String,
    pub settle_delay: Duration,
}

impl ControllerSettings {
    pub fn from_config(config: &ClientConfig) -> Self {
        Self {
            assistant_id: config.assistant_id.clone(),
            settle_delay: config.thread_settle_delay(),
        }
    }
}

/// Suppresses a notice identical to the previous one until the error clears.
#[derive(Debug, Default)]
struct ErrorDeduper {
    last: Option<String>,
}

impl ErrorDeduper {
    fn should_show(&mut self, message: &str) -> bool {
        if self.last.as_deref() == Some(message) {
            return false;
        }
        self.last = Some(message.to_string());
        true
    }

    fn reset(&mut self) {
        self.last = None;
    }
}

/// Detects the first ai message of a run from the length of the message list.
#[derive(Debug, Default)]
struct FirstTokenTracker {
    prev_len: usize,
}

impl FirstTokenTracker {
    fn observe(&mut self, messages: &[Message]) -> bool {
        let arrived = messages.len() != self.prev_len
            && messages
                .last()
                .is_some_and(|last| last.kind == MessageType::Ai);
        self.prev_len = messages.len();
        arrived
    }

    fn rewind(&mut self) {
        self.prev_len = self.prev_len.saturating_sub(1);
    }
}

/// State reachable from run tasks.
struct Shared {
    state: watch::Sender<StreamState>,
    notices: broadcast::Sender<Notice>,
    /// Bumped whenever a run starts or is stopped; tasks of older runs go quiet.
    generation: AtomicU64,
    errors: StdMutex<ErrorDeduper>,
    tokens: StdMutex<FirstTokenTracker>,
    threads: Option<Arc<ThreadList>>,
    settle_delay: Duration,
}

impl Shared {
    fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
    }

    fn notify(&self, notice: Notice) {
        // no subscribers is fine
        let _ = self.notices.send(notice);
    }

    fn replace_messages(&self, state: &mut StreamState, messages: Vec<Message>) {
        let arrived = self
            .tokens
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .observe(&messages);
        if arrived {
            state.first_token_received = true;
        }
        state.messages = messages;
    }

    /// Clear the displayed error; the next failure is shown again.
    fn clear_error(&self, state: &mut StreamState) {
        self.errors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .reset();
        state.error = None;
    }

    fn surface_error(&self, message: String) {
        let show = self
            .errors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .should_show(&message);
        self.state.send_modify(|s| s.error = Some(message.clone()));
        if show {
            self.notify(Notice::Error(message));
        }
    }

    fn settle_phase(&self) {
        self.state.send_modify(|s| {
            s.phase = if s.thread_id.is_some() {
                Phase::Bound
            } else {
                Phase::Idle
            };
        });
    }

    /// Bind `thread_id` if it is new, then refresh the thread list once the
    /// server has had time to index it.
    fn record_thread(&self, thread_id: &str) {
        let is_new = self.state.send_if_modified(|s| {
            if s.thread_id.as_deref() == Some(thread_id) {
                return false;
            }
            s.thread_id = Some(thread_id.to_string());
            if s.phase == Phase::Idle {
                s.phase = Phase::Bound;
            }
            true
        });
        if !is_new {
            return;
        }

        info!("Bound to thread {}", thread_id);
        self.notify(Notice::ThreadCreated(thread_id.to_string()));

        if let Some(threads) = self.threads.clone() {
            let delay = self.settle_delay;
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                threads.refresh().await;
            });
        }
    }

    fn apply(&self, event: RunStreamEvent) {
        match event {
            RunStreamEvent::Metadata { run_id, thread_id } => {
                debug!("Run {} started", run_id);
                self.state.send_modify(|s| s.run_id = Some(run_id));
                if let Some(thread_id) = thread_id {
                    self.record_thread(&thread_id);
                }
            }
            RunStreamEvent::Values(values) => {
                let interrupt = values.interrupt().cloned();
                let ThreadValues { messages, ui, .. } = values;
                self.state.send_modify(|s| {
                    self.replace_messages(s, messages);
                    s.ui = ui;
                    s.interrupt = interrupt;
                });
            }
            event @ RunStreamEvent::Custom(_) => match event.ui_event() {
                Some(event) => self.state.send_modify(|s| {
                    s.ui = reduce_ui(std::mem::take(&mut s.ui), &event);
                }),
                None => debug!("Ignoring non-ui custom event"),
            },
            event @ RunStreamEvent::Error { .. } => {
                if let Some(text) = event.error_text() {
                    warn!("Run reported an error: {}", text);
                    self.surface_error(text);
                }
            }
            RunStreamEvent::End => debug!("Run ended"),
            RunStreamEvent::Other { .. } => {}
        }
    }
}

struct ActiveRun {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// Owns the live state of one conversation.
pub struct StreamController {
    client: Arc<AgentClient>,
    assistant_id: String,
    shared: Arc<Shared>,
    /// Serializes operations that start or stop runs.
    run: Mutex<Option<ActiveRun>>,
}

impl StreamController {
    pub fn new(
        client: Arc<AgentClient>,
        threads: Option<Arc<ThreadList>>,
        settings: ControllerSettings,
    ) -> Self {
        let (state, _) = watch::channel(StreamState::default());
        let (notices, _) = broadcast::channel(NOTICE_CAPACITY);

        Self {
            client,
            assistant_id: settings.assistant_id,
            shared: Arc::new(Shared {
                state,
                notices,
                generation: AtomicU64::new(0),
                errors: StdMutex::new(ErrorDeduper::default()),
                tokens: StdMutex::new(FirstTokenTracker::default()),
                threads,
                settle_delay: settings.settle_delay,
            }),
            run: Mutex::new(None),
        }
    }

    pub fn state(&self) -> StreamState {
        self.shared.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<StreamState> {
        self.shared.state.subscribe()
    }

    pub fn notices(&self) -> broadcast::Receiver<Notice> {
        self.shared.notices.subscribe()
    }

    pub fn phase(&self) -> Phase {
        self.shared.state.borrow().phase
    }

    fn ensure_not_streaming(&self) -> Result<(), ClientError> {
        if self.phase() == Phase::Streaming {
            return Err(ClientError::Busy);
        }
        Ok(())
    }

    /// Send a new turn.
    ///
    /// `messages` show up in the state immediately; the first `values` event
    /// replaces them with the server's copy. A thread is created first when
    /// none is bound.
    pub async fn submit(&self, messages: Vec<Message>) -> Result<(), ClientError> {
        let mut run = self.run.lock().await;
        self.ensure_not_streaming()?;

        let (history, thread_id) = {
            let state = self.shared.state.borrow();
            (state.messages.clone(), state.thread_id.clone())
        };
        let mut input = ensure_tool_calls_have_responses(&history);
        if !input.is_empty() {
            debug!("Answering {} orphaned tool calls", input.len());
        }
        input.extend(messages);

        let optimistic = input.clone();
        self.shared.state.send_modify(|s| {
            s.phase = Phase::Streaming;
            self.shared.clear_error(s);
            s.interrupt = None;
            s.first_token_received = false;
            let mut next = std::mem::take(&mut s.messages);
            next.extend(optimistic);
            self.shared.replace_messages(s, next);
        });

        let thread_id = match thread_id {
            Some(thread_id) => thread_id,
            None => match self.client.create_thread().await {
                Ok(thread) => {
                    self.shared.record_thread(&thread.thread_id);
                    thread.thread_id
                }
                Err(e) => {
                    warn!("Failed to create thread: {}", e);
                    self.shared.settle_phase();
                    self.shared.surface_error(e.user_message());
                    return Err(e);
                }
            },
        };

        let request = RunRequest::new(&self.assistant_id).with_messages(&input);
        self.start_run(&mut run, thread_id, request)
    }

    /// Re-run from `checkpoint`, typically the parent of the ai message being
    /// regenerated.
    pub async fn regenerate(&self, checkpoint: Option<Checkpoint>) -> Result<(), ClientError> {
        let mut run = self.run.lock().await;
        self.ensure_not_streaming()?;

        let Some(thread_id) = self.state().thread_id else {
            return Err(ClientError::InvalidInput(
                "no conversation to regenerate".to_string(),
            ));
        };

        self.shared
            .tokens
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .rewind();
        self.shared.state.send_modify(|s| {
            s.first_token_received = false;
            self.shared.clear_error(s);
        });

        let request = RunRequest::new(&self.assistant_id).with_checkpoint(checkpoint);
        self.start_run(&mut run, thread_id, request)
    }

    /// Answer the pending human interrupt and continue the run.
    pub async fn resume(&self, response: HumanResponse) -> Result<(), ClientError> {
        let mut run = self.run.lock().await;
        self.ensure_not_streaming()?;

        let StreamState {
            thread_id,
            interrupt,
            ..
        } = self.state();
        let Some(thread_id) = thread_id else {
            return Err(ClientError::InvalidInput(
                "no conversation to resume".to_string(),
            ));
        };
        let Some(interrupt) = interrupt else {
            return Err(ClientError::InvalidInput(
                "the conversation is not waiting for input".to_string(),
            ));
        };

        let interrupt = validate_interrupt(&interrupt)?;
        if !response.is_allowed_by(&interrupt.config) {
            return Err(ClientError::InvalidInput(
                "this kind of response is not allowed here".to_string(),
            ));
        }

        self.shared.state.send_modify(|s| {
            s.interrupt = None;
            self.shared.clear_error(s);
            s.first_token_received = false;
        });

        let request = RunRequest::new(&self.assistant_id).with_resume(json!([response]));
        self.start_run(&mut run, thread_id, request)
    }

    fn start_run(
        &self,
        run: &mut Option<ActiveRun>,
        thread_id: String,
        request: RunRequest,
    ) -> Result<(), ClientError> {
        let stream = match self.client.stream_run(&thread_id, &request) {
            Ok(stream) => stream,
            Err(e) => {
                self.shared.settle_phase();
                self.shared.surface_error(e.user_message());
                return Err(e);
            }
        };

        let generation = self.shared.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.shared.state.send_modify(|s| s.phase = Phase::Streaming);

        let cancel = CancellationToken::new();
        let task = tokio::spawn(consume(
            self.shared.clone(),
            stream,
            cancel.clone(),
            generation,
        ));
        *run = Some(ActiveRun { cancel, task });
        Ok(())
    }

    /// Abort the run in flight. Messages already received stay.
    pub async fn stop(&self) {
        let mut run = self.run.lock().await;
        self.halt(&mut run).await;
    }

    async fn halt(&self, run: &mut Option<ActiveRun>) {
        let Some(active) = run.take() else {
            return;
        };

        self.shared.generation.fetch_add(1, Ordering::SeqCst);
        active.cancel.cancel();
        if let Err(e) = active.task.await {
            warn!("Run task ended abnormally: {}", e);
        }

        if self.phase() == Phase::Streaming {
            info!("Run stopped");
            self.shared.settle_phase();
        }
    }

    /// Bind to an existing thread and load its current state.
    pub async fn load_thread(&self, thread_id: &str) -> Result<(), ClientError> {
        let mut run = self.run.lock().await;
        self.halt(&mut run).await;

        let values = self.client.thread_state(thread_id).await?;
        let interrupt = values.interrupt().cloned();
        let ThreadValues { messages, ui, .. } = values;

        self.shared.state.send_modify(|s| {
            s.phase = Phase::Bound;
            s.thread_id = Some(thread_id.to_string());
            s.ui = ui;
            s.interrupt = interrupt;
            s.run_id = None;
            self.shared.clear_error(s);
            self.shared.replace_messages(s, messages);
        });
        Ok(())
    }

    /// Forget the current thread; the next submit starts a new one.
    pub async fn new_thread(&self) {
        let mut run = self.run.lock().await;
        self.halt(&mut run).await;

        *self
            .shared
            .tokens
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = FirstTokenTracker::default();
        self.shared.state.send_modify(|s| {
            self.shared.clear_error(s);
            let health_warning = s.health_warning.take();
            *s = StreamState {
                health_warning,
                ..StreamState::default()
            };
        });
    }

    /// Resolve once no run is streaming.
    pub async fn wait_until_settled(&self) {
        let mut state = self.subscribe();
        let _ = state.wait_for(|s| s.phase != Phase::Streaming).await;
    }

    /// Check the agent server's `/info`. A failure leaves a warning in the
    /// state until dismissed but does not block anything.
    pub async fn probe_health(&self) -> bool {
        match self.client.info().await {
            Ok(_) => true,
            Err(e) => {
                warn!("Agent server health check failed: {}", e);
                let warning = format!(
                    "Failed to connect to the agent server at {}: {}",
                    self.client.api_url(),
                    e.user_message()
                );
                self.shared
                    .state
                    .send_modify(|s| s.health_warning = Some(warning.clone()));
                self.shared.notify(Notice::HealthWarning(warning));
                false
            }
        }
    }

    pub fn dismiss_health_warning(&self) {
        self.shared.state.send_modify(|s| s.health_warning = None);
    }
}

async fn consume(
    shared: Arc<Shared>,
    mut stream: RunStream,
    cancel: CancellationToken,
    generation: u64,
) {
    loop {
        let next = tokio::select! {
            _ = cancel.cancelled() => break,
            next = stream.next_event() => next,
        };
        if !shared.is_current(generation) {
            break;
        }

        match next {
            Some(Ok(event)) => shared.apply(event),
            Some(Err(e)) => {
                warn!("Run stream failed: {}", e);
                shared.surface_error(e.user_message());
                break;
            }
            None => break,
        }
    }

    stream.close();
    if shared.is_current(generation) {
        shared.settle_phase();
    }
}
