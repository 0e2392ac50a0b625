//! Application state shared across handlers.

use std::sync::Arc;

use crate::auth::SessionService;
use crate::config::{AppConfig, CorsConfig};
use crate::proxy::ProxyGateway;

#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<SessionService>,
    pub gateway: Arc<ProxyGateway>,
    pub cors: Arc<CorsConfig>,
}

impl AppState {
    pub fn new(sessions: SessionService, gateway: ProxyGateway, cors: CorsConfig) -> Self {
        Self {
            sessions: Arc::new(sessions),
            gateway: Arc::new(gateway),
            cors: Arc::new(cors),
        }
    }

    /// State wired from a loaded config with the default store and delivery.
    pub fn from_config(config: &AppConfig) -> anyhow::Result<Self> {
        let sessions = SessionService::from_config(&config.auth)?;
        let gateway = ProxyGateway::new(&config.proxy)?;
        Ok(Self::new(sessions, gateway, config.cors.clone()))
    }
}
