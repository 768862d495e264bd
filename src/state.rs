//! Relay lifecycle state, published to subscribers over a watch channel

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

/// Address the relay is reachable on
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayEndpoint {
    pub port: u16,
    pub base_url: String,
    pub api_url: String,
}

impl RelayEndpoint {
    pub fn new(host: &str, port: u16, prefix: &str) -> Self {
        let base_url = format!("http://{}:{}", host, port);
        let api_url = format!("{}{}", base_url, prefix);
        Self {
            port,
            base_url,
            api_url,
        }
    }

    pub fn health_url(&self) -> String {
        format!("{}/health", self.base_url)
    }
}

/// `Unbound → Binding → Bound → ShuttingDown → Stopped`.
/// `Binding` repeats once per port tried; a failed scan goes straight to `Stopped`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayState {
    Unbound,
    Binding { port: u16 },
    Bound(RelayEndpoint),
    ShuttingDown { port: u16 },
    Stopped,
}

impl RelayState {
    pub fn endpoint(&self) -> Option<&RelayEndpoint> {
        match self {
            RelayState::Bound(endpoint) => Some(endpoint),
            _ => None,
        }
    }
}

/// Wait until the relay is bound and return its endpoint.
/// Returns `None` if it stopped (or was dropped) without ever binding.
pub async fn wait_for_endpoint(rx: &mut watch::Receiver<RelayState>) -> Option<RelayEndpoint> {
    let state = rx
        .wait_for(|s| matches!(s, RelayState::Bound(_) | RelayState::Stopped))
        .await
        .ok()?;
    let endpoint = state.endpoint().cloned();
    endpoint
}
