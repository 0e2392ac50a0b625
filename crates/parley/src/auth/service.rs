//! One-time-code login.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use log::{debug, info, warn};
use once_cell::sync::Lazy;
use rand::Rng;
use regex::Regex;

use super::clock::{Clock, SystemClock};
use super::delivery::{CodeSender, LogCodeSender};
use super::store::{InMemoryVerificationStore, VerificationEntry, VerificationStore};
use super::tokens::{Claims, TokenIssuer, bearer_token_from_header};
use super::AuthError;
use crate::config::{AuthConfig, ConfigError};

static PHONE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^1[3-9]\d{9}$").expect("phone pattern is valid"));

/// Mainland mobile number: 11 digits starting with 1, second digit 3-9.
pub fn is_valid_phone(phone: &str) -> bool {
    PHONE_PATTERN.is_match(phone)
}

/// Uniform four digit code in 1000..=9999.
pub fn generate_code() -> String {
    rand::rng().random_range(1000..=9999).to_string()
}

/// A freshly issued code.
#[derive(Debug, Clone)]
pub struct IssuedCode {
    pub phone: String,
    pub code: String,
    pub expires_at: DateTime<Utc>,
}

/// Result of a successful login.
#[derive(Debug, Clone)]
pub struct SessionGrant {
    pub user_id: String,
    pub token: String,
}

#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub code_ttl: Duration,
    /// `None` issues codes to any valid number.
    pub allowlist: Option<HashSet<String>>,
    pub expose_code: bool,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            code_ttl: Duration::minutes(5),
            allowlist: None,
            expose_code: false,
        }
    }
}

impl From<&AuthConfig> for SessionSettings {
    fn from(config: &AuthConfig) -> Self {
        Self {
            code_ttl: Duration::seconds(config.code_ttl_secs as i64),
            allowlist: config
                .allowlist_enabled
                .then(|| config.allowlist.iter().cloned().collect()),
            expose_code: config.expose_code,
        }
    }
}

/// Issues codes, verifies them, and hands out session tokens.
pub struct SessionService {
    settings: SessionSettings,
    tokens: TokenIssuer,
    store: Arc<dyn VerificationStore>,
    sender: Arc<dyn CodeSender>,
    clock: Arc<dyn Clock>,
}

impl SessionService {
    pub fn new(settings: SessionSettings, tokens: TokenIssuer) -> Self {
        Self {
            settings,
            tokens,
            store: Arc::new(InMemoryVerificationStore::new()),
            sender: Arc::new(LogCodeSender),
            clock: Arc::new(SystemClock),
        }
    }

    /// Service backed by the in-memory store and log delivery. Generates a
    /// token secret when none is configured.
    pub fn from_config(config: &AuthConfig) -> Result<Self, ConfigError> {
        let secret = match config.resolve_jwt_secret()? {
            Some(secret) => secret,
            None => {
                warn!("auth.jwt_secret not set, generating a random secret for this process");
                AuthConfig::generate_jwt_secret()
            }
        };
        let tokens = TokenIssuer::new(&secret, Duration::seconds(config.token_ttl_secs as i64));
        Ok(Self::new(SessionSettings::from(config), tokens))
    }

    pub fn with_store(mut self, store: Arc<dyn VerificationStore>) -> Self {
        self.store = store;
        self
    }

    pub fn with_sender(mut self, sender: Arc<dyn CodeSender>) -> Self {
        self.sender = sender;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn exposes_codes(&self) -> bool {
        self.settings.expose_code
    }

    /// Issue a new code for `phone`, replacing any pending one.
    pub async fn request_code(&self, phone: Option<&str>) -> Result<IssuedCode, AuthError> {
        let phone = non_empty(phone)
            .ok_or_else(|| AuthError::InvalidInput("Phone number is required".to_string()))?;
        if !is_valid_phone(phone) {
            return Err(AuthError::InvalidInput(
                "Invalid phone number format".to_string(),
            ));
        }
        if let Some(allowlist) = &self.settings.allowlist
            && !allowlist.contains(phone)
        {
            info!("Rejected code request for {} (not on allow-list)", phone);
            return Err(AuthError::NotAllowed);
        }

        let now = self.clock.now();
        let purged = self.store.purge_expired(now).await;
        if purged > 0 {
            debug!("Purged {} expired verification codes", purged);
        }

        let entry = VerificationEntry {
            code: generate_code(),
            issued_at: now,
            expires_at: now + self.settings.code_ttl,
        };
        if self.store.replace(phone, entry.clone()).await.is_some() {
            debug!("Replaced pending verification code for {}", phone);
        }

        self.sender
            .send(phone, &entry.code)
            .await
            .map_err(|e| AuthError::Internal(format!("delivering verification code: {e}")))?;

        Ok(IssuedCode {
            phone: phone.to_string(),
            code: entry.code,
            expires_at: entry.expires_at,
        })
    }

    /// Check `code` against the pending entry and consume it.
    pub async fn verify_and_login(
        &self,
        phone: Option<&str>,
        code: Option<&str>,
    ) -> Result<SessionGrant, AuthError> {
        let (Some(phone), Some(code)) = (non_empty(phone), non_empty(code)) else {
            return Err(AuthError::InvalidInput(
                "Phone number and verification code are required".to_string(),
            ));
        };
        if !is_valid_phone(phone) {
            return Err(AuthError::InvalidInput(
                "Invalid phone number format".to_string(),
            ));
        }

        let entry = self.store.get(phone).await.ok_or(AuthError::CodeNotFound)?;

        let now = self.clock.now();
        if entry.is_expired(now) {
            self.store.remove_if_current(phone, &entry).await;
            return Err(AuthError::CodeExpired);
        }

        if entry.code != code {
            return Err(AuthError::CodeMismatch);
        }

        // A concurrent login may have consumed or replaced the entry since `get`.
        if !self.store.remove_if_current(phone, &entry).await {
            return Err(AuthError::CodeNotFound);
        }

        let token = self.tokens.issue(phone, now)?;
        info!("User {} logged in", phone);

        Ok(SessionGrant {
            user_id: phone.to_string(),
            token,
        })
    }

    /// Validate the session carried by an Authorization header value.
    pub fn authenticate(&self, authorization: Option<&str>) -> Result<Claims, AuthError> {
        let header = authorization.ok_or(AuthError::MissingAuthHeader)?;
        let token = bearer_token_from_header(header)?;
        self.tokens.validate(token)
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}
