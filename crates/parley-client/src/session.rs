//! Client-held session: one-time-code login, durable credentials, logout.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use log::{debug, info, warn};
use parley_protocol::auth::{AuthStatus, CodeRequest, CodeResponse, LoginRequest, LoginResponse};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use tokio::sync::watch;

use crate::error::ClientError;
use crate::storage::{KeyValueStorage, keys};

pub const LOGIN_PATH: &str = "/login";

/// Upper bound for any single session request, liveness checks included.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub user_id: String,
    pub token: Option<String>,
}

/// Credential state. `Loading` means storage has not been read yet, which is
/// not the same as being logged out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthState {
    Loading,
    LoggedOut,
    LoggedIn(Session),
}

impl AuthState {
    pub fn session(&self) -> Option<&Session> {
        match self {
            Self::LoggedIn(session) => Some(session),
            _ => None,
        }
    }
}

/// Full navigation away from the current view, abandoning in-flight work.
pub trait Navigator: Send + Sync {
    fn hard_redirect(&self, path: &str);
}

/// Navigator for headless use.
#[derive(Debug, Default)]
pub struct LogNavigator;

impl Navigator for LogNavigator {
    fn hard_redirect(&self, path: &str) {
        info!("Session ended, redirecting to {}", path);
    }
}

pub struct SessionManager {
    http: reqwest::Client,
    base_url: String,
    storage: Arc<dyn KeyValueStorage>,
    navigator: Arc<dyn Navigator>,
    state: watch::Sender<AuthState>,
    /// Bumped on every login and logout so late responses can tell they are stale.
    epoch: AtomicU64,
}

impl SessionManager {
    pub fn new(
        base_url: impl Into<String>,
        storage: Arc<dyn KeyValueStorage>,
        navigator: Arc<dyn Navigator>,
    ) -> Self {
        let (state, _) = watch::channel(AuthState::Loading);
        Self {
            http: default_http(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            storage,
            navigator,
            state,
            epoch: AtomicU64::new(0),
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Result<Self, ClientError> {
        self.http = reqwest::Client::builder()
            .connect_timeout(timeout)
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(self)
    }

    /// Load the persisted session.
    pub fn restore(&self) -> AuthState {
        let stored = |key: &str| match self.storage.get(key) {
            Ok(value) => value,
            Err(e) => {
                warn!("Failed to read {} from storage: {}", key, e);
                None
            }
        };

        let state = match (
            stored(keys::IS_LOGGED_IN).as_deref(),
            stored(keys::USER_ID),
        ) {
            (Some("true"), Some(user_id)) => AuthState::LoggedIn(Session {
                user_id,
                token: stored(keys::AUTH_TOKEN),
            }),
            _ => AuthState::LoggedOut,
        };

        debug!("Restored auth state: logged_in={}", state.session().is_some());
        self.state.send_replace(state.clone());
        state
    }

    pub fn state(&self) -> AuthState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.state.subscribe()
    }

    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    pub fn is_logged_in(&self) -> bool {
        matches!(*self.state.borrow(), AuthState::LoggedIn(_))
    }

    pub fn token(&self) -> Option<String> {
        self.state
            .borrow()
            .session()
            .and_then(|session| session.token.clone())
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Ask the server to send a verification code to `phone_number`.
    pub async fn request_code(&self, phone_number: &str) -> Result<CodeResponse, ClientError> {
        let body = CodeRequest {
            phone_number: Some(phone_number.trim().to_string()),
        };
        let response = self
            .http
            .post(self.url("/code-request"))
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ClientError::from_response(response).await);
        }
        Ok(response.json().await?)
    }

    /// Exchange a code for a session and persist it.
    pub async fn verify_and_login(
        &self,
        phone_number: &str,
        code: &str,
    ) -> Result<Session, ClientError> {
        let phone_number = phone_number.trim();
        let code = code.trim();
        if phone_number.is_empty() || code.is_empty() {
            return Err(ClientError::InvalidInput(
                "phone number and code are required".to_string(),
            ));
        }

        let body = LoginRequest {
            phone_number: Some(phone_number.to_string()),
            code: Some(code.to_string()),
        };
        let response = self
            .http
            .post(self.url("/login"))
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ClientError::from_response(response).await);
        }
        let login: LoginResponse = response.json().await?;
        let user_id = login
            .user_id
            .unwrap_or_else(|| phone_number.to_string());

        self.login(&user_id, login.token.as_deref())?;
        Ok(Session {
            user_id,
            token: login.token,
        })
    }

    /// Persist a completed login and publish it.
    pub fn login(&self, user_id: &str, token: Option<&str>) -> Result<(), ClientError> {
        self.storage.set(keys::IS_LOGGED_IN, "true")?;
        self.storage.set(keys::USER_ID, user_id)?;
        match token {
            Some(token) => self.storage.set(keys::AUTH_TOKEN, token)?,
            None => self.storage.remove(keys::AUTH_TOKEN)?,
        }

        self.epoch.fetch_add(1, Ordering::SeqCst);
        self.state.send_replace(AuthState::LoggedIn(Session {
            user_id: user_id.to_string(),
            token: token.map(String::from),
        }));
        info!("Logged in as {}", user_id);
        Ok(())
    }

    /// Drop the session and force navigation to the login page.
    ///
    /// Credential state is cleared before this returns. The server is told
    /// afterwards on a detached task, and its answer is ignored.
    pub fn logout(&self) {
        let token = self.token();

        self.epoch.fetch_add(1, Ordering::SeqCst);
        self.state.send_replace(AuthState::LoggedOut);
        for key in [keys::IS_LOGGED_IN, keys::USER_ID, keys::AUTH_TOKEN] {
            if let Err(e) = self.storage.remove(key) {
                warn!("Failed to remove {} from storage: {}", key, e);
            }
        }

        self.navigator.hard_redirect(LOGIN_PATH);
        self.notify_logout(token);
    }

    fn notify_logout(&self, token: Option<String>) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            debug!("No runtime, skipping logout notification");
            return;
        };

        let mut request = self.http.post(self.url("/logout"));
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }
        handle.spawn(async move {
            if let Err(e) = request.send().await {
                debug!("Logout notification failed: {}", e);
            }
        });
    }

    /// Headers for authenticated calls: JSON content type, plus a bearer token
    /// when the session has one.
    pub fn auth_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(token) = self.token()
            && let Ok(value) = HeaderValue::from_str(&format!("Bearer {token}"))
        {
            headers.insert(AUTHORIZATION, value);
        }
        headers
    }

    /// Ask the server whether the stored credentials are still valid.
    pub async fn check_auth_status(&self) -> Result<AuthStatus, ClientError> {
        let response = self
            .http
            .get(self.url("/auth-status"))
            .headers(self.auth_headers())
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ClientError::from_response(response).await);
        }
        Ok(response.json().await?)
    }
}

fn default_http() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()
        .unwrap_or_else(|e| {
            warn!("Falling back to a default HTTP client: {}", e);
            reqwest::Client::new()
        })
}
