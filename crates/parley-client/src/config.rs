//! Client configuration.
//!
//! Built-in defaults, then an optional TOML file, then `PARLEY_CLIENT__*`
//! environment variables. `AUTH_CHECK_INTERVAL` (minutes) overrides the
//! liveness interval, and values the user picked at runtime (stored API URL,
//! assistant id and API key) win over all of it.

use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::storage::{KeyValueStorage, keys};

pub const ENV_PREFIX: &str = "PARLEY_CLIENT";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(transparent)]
    Load(#[from] config::ConfigError),

    #[error("AUTH_CHECK_INTERVAL must be a whole number of minutes (got '{0}')")]
    InvalidAuthInterval(String),

    #[error("auth_check_interval_secs must be greater than zero")]
    ZeroAuthInterval,

    #[error("{field} must not be empty")]
    Empty { field: &'static str },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Agent API base, normally the gateway's `/api` family.
    pub api_url: String,
    /// Base URL of the session endpoints.
    pub session_url: String,
    pub assistant_id: String,
    pub api_key: Option<String>,
    pub auth_check_interval_secs: u64,
    /// Delay before refreshing the thread list after a new thread appears.
    pub thread_settle_delay_ms: u64,
    pub connect_timeout_secs: u64,
    pub storage_path: Option<PathBuf>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:3000/api".to_string(),
            session_url: "http://localhost:3000".to_string(),
            assistant_id: "agent".to_string(),
            api_key: None,
            auth_check_interval_secs: 5 * 60,
            thread_settle_delay_ms: 4000,
            connect_timeout_secs: 10,
            storage_path: None,
        }
    }
}

impl ClientConfig {
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(
                File::from(path)
                    .format(FileFormat::Toml)
                    .required(false),
            );
        }
        let built = builder
            .add_source(Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()?;

        let mut config: ClientConfig = built.try_deserialize()?;
        if let Ok(minutes) = env::var("AUTH_CHECK_INTERVAL") {
            config.apply_auth_interval_minutes(&minutes)?;
        }
        config.validate()?;
        Ok(config)
    }

    fn apply_auth_interval_minutes(&mut self, minutes: &str) -> Result<(), ConfigError> {
        let invalid = || ConfigError::InvalidAuthInterval(minutes.to_string());
        self.auth_check_interval_secs = minutes
            .trim()
            .parse::<u64>()
            .map_err(|_| invalid())?
            .checked_mul(60)
            .ok_or_else(invalid)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.auth_check_interval_secs == 0 {
            return Err(ConfigError::ZeroAuthInterval);
        }
        if self.api_url.trim().is_empty() {
            return Err(ConfigError::Empty { field: "api_url" });
        }
        if self.session_url.trim().is_empty() {
            return Err(ConfigError::Empty {
                field: "session_url",
            });
        }
        if self.assistant_id.trim().is_empty() {
            return Err(ConfigError::Empty {
                field: "assistant_id",
            });
        }
        Ok(())
    }

    /// Overlay the API URL, assistant id and API key remembered in `storage`.
    pub fn apply_stored(&mut self, storage: &dyn KeyValueStorage) {
        let stored = |key: &str| {
            storage
                .get(key)
                .ok()
                .flatten()
                .filter(|value| !value.trim().is_empty())
        };

        if let Some(url) = stored(keys::API_URL) {
            self.api_url = url;
        }
        if let Some(assistant) = stored(keys::ASSISTANT_ID) {
            self.assistant_id = assistant;
        }
        if let Some(key) = stored(keys::API_KEY) {
            self.api_key = Some(key);
        }
    }

    pub fn auth_check_interval(&self) -> Duration {
        Duration::from_secs(self.auth_check_interval_secs)
    }

    pub fn thread_settle_delay(&self) -> Duration {
        Duration::from_millis(self.thread_settle_delay_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Storage file, defaulting to the platform data directory.
    pub fn resolved_storage_path(&self) -> Option<PathBuf> {
        self.storage_path
            .clone()
            .or_else(|| dirs::data_dir().map(|dir| dir.join("parley").join("client.json")))
    }
}
