//! Gateway configuration.
//!
//! Layered the usual way: built-in defaults, then the TOML config file, then
//! `PARLEY__*` environment variables.

use std::env;
use std::path::{Path, PathBuf};

use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const APP_NAME: &str = "parley";

/// Fallback agent server when neither the config nor `LANGGRAPH_API_URL` name one.
pub const DEFAULT_AGENT_URL: &str = "http://localhost:2024";

/// Smallest accepted total timeout for a forwarded exchange.
pub const MIN_TOTAL_TIMEOUT_SECS: u64 = 30 * 60;

/// Headers browsers may send cross-origin.
pub const DEFAULT_ALLOW_HEADERS: &[&str] = &[
    "X-CSRF-Token",
    "X-Requested-With",
    "Accept",
    "Accept-Version",
    "Content-Length",
    "Content-MD5",
    "Content-Type",
    "Date",
    "X-Api-Version",
    "X-Api-Key",
    "Authorization",
];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(transparent)]
    Load(#[from] config::ConfigError),

    #[error("proxy route prefix '{0}' must start with '/'")]
    InvalidPrefix(String),

    #[error("proxy route '{prefix}' has an invalid upstream URL '{upstream}'")]
    InvalidUpstream { prefix: String, upstream: String },

    #[error(
        "proxy.total_timeout_secs must be at least {MIN_TOTAL_TIMEOUT_SECS} seconds (got {0}); omit it to disable the total timeout"
    )]
    TotalTimeoutTooShort(u64),

    #[error("auth.code_ttl_secs must be greater than zero")]
    ZeroCodeTtl,

    #[error("environment variable '{0}' not found (referenced via env:{0} in config)")]
    EnvVarNotFound(String),

    #[error("environment variable '{0}' is empty (referenced via env:{0} in config)")]
    EnvVarEmpty(String),

    #[error("auth.jwt_secret must be at least 32 characters long")]
    JwtSecretTooShort,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub proxy: ProxyConfig,
    pub auth: AuthConfig,
    pub cors: CorsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
        }
    }
}

/// One family of forwarded paths.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyRoute {
    /// Path prefix matched on segment boundaries, e.g. `/api`.
    pub prefix: String,

    /// Base URL the remainder of the path is appended to.
    pub upstream: String,

    /// Path segments dropped from the remainder before forwarding. Defaults
    /// to the last segment of `prefix`, so `/api/api/threads` still reaches
    /// `/threads`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reserved_segments: Option<Vec<String>>,
}

impl ProxyRoute {
    pub fn new(prefix: impl Into<String>, upstream: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            upstream: upstream.into(),
            reserved_segments: None,
        }
    }

    pub fn with_reserved_segments(mut self, segments: Vec<String>) -> Self {
        self.reserved_segments = Some(segments);
        self
    }

    pub fn reserved(&self) -> Vec<String> {
        match &self.reserved_segments {
            Some(segments) => segments.clone(),
            None => self
                .prefix
                .trim_end_matches('/')
                .rsplit('/')
                .next()
                .filter(|segment| !segment.is_empty())
                .map(|segment| vec![segment.to_string()])
                .unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    /// Seconds allowed to establish the upstream connection.
    pub connect_timeout_secs: u64,

    /// Optional cap on a whole forwarded exchange. Unset means streams may
    /// stay open indefinitely.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_timeout_secs: Option<u64>,

    /// Upstream for paths no route claims. `api` segments are dropped the
    /// same way as under the `/api` route. Unset answers such paths with 404.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_upstream: Option<String>,

    /// Route families, longest prefix wins.
    pub routes: Vec<ProxyRoute>,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        let agent = agent_url_from_env();
        let assets = "http://localhost:8001";
        Self {
            connect_timeout_secs: 10,
            total_timeout_secs: None,
            default_upstream: Some(agent.clone()),
            routes: vec![
                ProxyRoute::new("/api", agent.clone()),
                ProxyRoute::new("/info", format!("{}/info", agent.trim_end_matches('/')))
                    .with_reserved_segments(Vec::new()),
                ProxyRoute::new("/user", "http://localhost:8000")
                    .with_reserved_segments(Vec::new()),
                ProxyRoute::new("/image", format!("{assets}/image"))
                    .with_reserved_segments(Vec::new()),
                ProxyRoute::new("/auth", format!("{assets}/auth"))
                    .with_reserved_segments(Vec::new()),
            ],
        }
    }
}

/// `LANGGRAPH_API_URL`, or the local default.
pub fn agent_url_from_env() -> String {
    env::var("LANGGRAPH_API_URL")
        .ok()
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_AGENT_URL.to_string())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// How long an issued code stays valid.
    pub code_ttl_secs: u64,

    /// Only issue codes to numbers in `allowlist`.
    pub allowlist_enabled: bool,

    pub allowlist: Vec<String>,

    /// Echo issued codes in the response body. Development only.
    pub expose_code: bool,

    /// HS256 secret for session tokens. Supports `env:VAR_NAME`. A random
    /// secret is generated at startup when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jwt_secret: Option<String>,

    /// Lifetime of issued session tokens.
    pub token_ttl_secs: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            code_ttl_secs: 300,
            allowlist_enabled: false,
            allowlist: vec!["13800138000".to_string(), "13900139000".to_string()],
            expose_code: false,
            jwt_secret: None,
            token_ttl_secs: 24 * 3600,
        }
    }
}

impl AuthConfig {
    /// Resolve the JWT secret, expanding `env:VAR_NAME` syntax.
    pub fn resolve_jwt_secret(&self) -> Result<Option<String>, ConfigError> {
        match &self.jwt_secret {
            None => Ok(None),
            Some(value) => match value.strip_prefix("env:") {
                Some(var_name) => match env::var(var_name) {
                    Ok(secret) if !secret.is_empty() => Ok(Some(secret)),
                    Ok(_) => Err(ConfigError::EnvVarEmpty(var_name.to_string())),
                    Err(_) => Err(ConfigError::EnvVarNotFound(var_name.to_string())),
                },
                None => Ok(Some(value.clone())),
            },
        }
    }

    /// Random 64 character secret for deployments that do not configure one.
    /// Tokens do not survive a restart in that case.
    pub fn generate_jwt_secret() -> String {
        use rand::Rng;

        const CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

        let mut rng = rand::rng();
        (0..64)
            .map(|_| CHARSET[rng.random_range(0..CHARSET.len())] as char)
            .collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CorsConfig {
    /// Allowed origins. Empty allows any origin.
    pub allow_origins: Vec<String>,
    pub allow_methods: Vec<String>,
    pub allow_headers: Vec<String>,
    pub allow_credentials: bool,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allow_origins: Vec::new(),
            allow_methods: ["GET", "POST", "PUT", "PATCH", "DELETE", "OPTIONS"]
                .into_iter()
                .map(String::from)
                .collect(),
            allow_headers: DEFAULT_ALLOW_HEADERS.iter().map(|h| h.to_string()).collect(),
            allow_credentials: true,
        }
    }
}

impl AppConfig {
    /// Load config from `path` (if it exists) and the environment.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let built = Config::builder()
            .set_default("server.port", 3000_i64)?
            .add_source(
                File::from(path)
                    .format(FileFormat::Toml)
                    .required(false),
            )
            .add_source(Environment::with_prefix(&env_prefix()).separator("__"))
            .build()?;

        let config: AppConfig = built.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(upstream) = &self.proxy.default_upstream
            && reqwest::Url::parse(upstream).is_err()
        {
            return Err(ConfigError::InvalidUpstream {
                prefix: "/".to_string(),
                upstream: upstream.clone(),
            });
        }

        for route in &self.proxy.routes {
            if !route.prefix.starts_with('/') {
                return Err(ConfigError::InvalidPrefix(route.prefix.clone()));
            }
            if reqwest::Url::parse(&route.upstream).is_err() {
                return Err(ConfigError::InvalidUpstream {
                    prefix: route.prefix.clone(),
                    upstream: route.upstream.clone(),
                });
            }
        }

        if let Some(total) = self.proxy.total_timeout_secs
            && total < MIN_TOTAL_TIMEOUT_SECS
        {
            return Err(ConfigError::TotalTimeoutTooShort(total));
        }

        if self.auth.code_ttl_secs == 0 {
            return Err(ConfigError::ZeroCodeTtl);
        }

        if let Some(secret) = self.auth.resolve_jwt_secret()?
            && secret.len() < 32
        {
            return Err(ConfigError::JwtSecretTooShort);
        }

        Ok(())
    }

    /// Render as TOML with a short header, as written by `config init`.
    pub fn to_toml_document(&self, path: &Path) -> Result<String, toml::ser::Error> {
        let mut body = format!("# Configuration for {APP_NAME}\n# File: {}\n\n", path.display());
        body.push_str(&toml::to_string_pretty(self)?);
        Ok(body)
    }
}

/// Environment variable prefix derived from the app name.
pub fn env_prefix() -> String {
    APP_NAME
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect()
}

/// `$XDG_CONFIG_HOME/parley`, falling back to the platform config dir.
pub fn default_config_dir() -> Option<PathBuf> {
    if let Some(dir) = env::var_os("XDG_CONFIG_HOME").filter(|v| !v.is_empty()) {
        return Some(PathBuf::from(dir).join(APP_NAME));
    }

    dirs::config_dir()
        .map(|dir| dir.join(APP_NAME))
        .or_else(|| dirs::home_dir().map(|home| home.join(".config").join(APP_NAME)))
}
