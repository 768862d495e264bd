//! Relay discovery
//! Sweeps the preferred port and then the fallback range for a live health probe

use crate::config::{candidate_ports, PortRange};
use crate::response::HealthReport;
use crate::state::RelayEndpoint;
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_millis(1500);

/// Outcome of a discovery sweep
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Discovery {
    Found(RelayEndpoint),
    NotFound { attempted: Vec<u16> },
}

/// Health-probe client, the authoritative way for a consumer to locate the relay
pub struct RelayProbe {
    client: reqwest::Client,
    host: String,
    prefix: String,
}

impl RelayProbe {
    pub fn new(host: &str, prefix: &str, timeout: Duration) -> reqwest::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            host: host.to_string(),
            prefix: prefix.to_string(),
        })
    }

    /// Whether a relay answers its health probe on `port`
    pub async fn check(&self, port: u16) -> bool {
        let endpoint = RelayEndpoint::new(&self.host, port, &self.prefix);

        let response = match self.client.get(endpoint.health_url()).send().await {
            Ok(r) if r.status().is_success() => r,
            Ok(r) => {
                debug!("Health probe on port {} answered {}", port, r.status());
                return false;
            }
            Err(e) => {
                debug!("Health probe on port {} failed: {}", port, e);
                return false;
            }
        };

        match response.json::<HealthReport>().await {
            Ok(report) => report.is_ok(),
            Err(e) => {
                debug!("Port {} answered with something other than a relay: {}", port, e);
                false
            }
        }
    }

    /// Try the preferred port, then sweep the fallback range ascending
    pub async fn discover(&self, preferred: u16, range: PortRange) -> Discovery {
        let candidates = candidate_ports(preferred, range);

        for &port in &candidates {
            if self.check(port).await {
                debug!("Found working relay on port {}", port);
                return Discovery::Found(RelayEndpoint::new(&self.host, port, &self.prefix));
            }
        }

        Discovery::NotFound {
            attempted: candidates,
        }
    }
}
