use axum::extract::FromRef;
use std::sync::Arc;

use crate::config::Settings;
use crate::security::ProxyTrust;
use crate::services::RelayService;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub relay: Arc<RelayService>,
    pub settings: Arc<Settings>,
}

impl FromRef<AppState> for Arc<RelayService> {
    fn from_ref(state: &AppState) -> Self {
        state.relay.clone()
    }
}

impl FromRef<AppState> for ProxyTrust {
    fn from_ref(state: &AppState) -> Self {
        ProxyTrust(state.settings.server.trust_forwarded_for)
    }
}
