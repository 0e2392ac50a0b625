//! The user's thread history.

use std::sync::Arc;

use log::{debug, warn};
use parley_protocol::Thread;
use serde_json::{Value, json};
use tokio::sync::watch;
use uuid::Uuid;

use super::client::AgentClient;

/// Search filter for an assistant: deployed assistants are addressed by UUID,
/// graphs by name.
pub fn search_metadata(assistant_id: &str) -> Value {
    if Uuid::parse_str(assistant_id).is_ok() {
        json!({ "assistant_id": assistant_id })
    } else {
        json!({ "graph_id": assistant_id })
    }
}

pub struct ThreadList {
    client: Arc<AgentClient>,
    assistant_id: String,
    threads: watch::Sender<Vec<Thread>>,
}

impl ThreadList {
    pub fn new(client: Arc<AgentClient>, assistant_id: impl Into<String>) -> Self {
        let (threads, _) = watch::channel(Vec::new());
        Self {
            client,
            assistant_id: assistant_id.into(),
            threads,
        }
    }

    pub fn threads(&self) -> Vec<Thread> {
        self.threads.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Vec<Thread>> {
        self.threads.subscribe()
    }

    /// Reload from the server. A failure keeps the current list.
    pub async fn refresh(&self) -> bool {
        match self.client.search_threads(&self.assistant_id).await {
            Ok(threads) => {
                debug!("Loaded {} threads", threads.len());
                self.threads.send_replace(threads);
                true
            }
            Err(e) => {
                warn!("Failed to refresh thread list: {}", e);
                false
            }
        }
    }
}
