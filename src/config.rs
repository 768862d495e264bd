//! Relay configuration
//! Loaded once at startup from a JSON file; hardcoded defaults stand in when the file is absent

use serde::Deserialize;
use std::net::{IpAddr, Ipv4Addr};
use std::ops::RangeInclusive;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;
use url::Url;

pub const DEFAULT_UPSTREAM: &str = "https://your-private-webhook-service.com";
pub const DEFAULT_PREFERRED_PORT: u16 = 3002;
pub const DEFAULT_FALLBACK_PORTS: PortRange = PortRange { start: 3002, end: 3012 };
pub const DEFAULT_PATH_PREFIX: &str = "/api";
pub const DEFAULT_UPSTREAM_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid upstream origin '{origin}': {reason}")]
    InvalidUpstream { origin: String, reason: String },
    #[error("invalid fallback port range {start}-{end}")]
    InvalidRange { start: u16, end: u16 },
    #[error("port 0 is not allowed; the relay must announce a fixed port")]
    ZeroPort,
    #[error("invalid path prefix '{0}'")]
    InvalidPrefix(String),
}

/// Inclusive range of fallback ports, scanned in ascending order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct PortRange {
    pub start: u16,
    pub end: u16,
}

impl PortRange {
    pub fn ports(&self) -> RangeInclusive<u16> {
        self.start..=self.end
    }

    pub fn contains(&self, port: u16) -> bool {
        self.ports().contains(&port)
    }
}

/// Ports to try, in order: the preferred port, then the fallback range ascending.
/// The preferred port is not attempted twice when it lies inside the range.
pub fn candidate_ports(preferred: u16, range: PortRange) -> Vec<u16> {
    std::iter::once(preferred)
        .chain(range.ports().filter(move |&port| port != preferred))
        .collect()
}

/// Immutable relay configuration
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub upstream_origin: Url,
    pub preferred_port: u16,
    pub fallback_ports: PortRange,
    pub path_prefix: String,
    pub bind_address: IpAddr,
    pub upstream_timeout: Duration,
    pub shutdown_grace: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            upstream_origin: Url::parse(DEFAULT_UPSTREAM).expect("default upstream is a valid URL"),
            preferred_port: DEFAULT_PREFERRED_PORT,
            fallback_ports: DEFAULT_FALLBACK_PORTS,
            path_prefix: DEFAULT_PATH_PREFIX.to_string(),
            bind_address: IpAddr::V4(Ipv4Addr::LOCALHOST),
            upstream_timeout: DEFAULT_UPSTREAM_TIMEOUT,
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
        }
    }
}

/// On-disk shape. Keys follow the desktop app's config so both can share one file;
/// unknown keys (UI settings) are ignored.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConfigFile {
    #[serde(alias = "upstreamOrigin")]
    webhook_backend_url: Option<String>,
    #[serde(alias = "preferredPort")]
    proxy_port: Option<u16>,
    #[serde(alias = "fallbackPortRange")]
    proxy_port_range: Option<PortRange>,
    path_prefix: Option<String>,
    bind_address: Option<IpAddr>,
    upstream_timeout_secs: Option<u64>,
    shutdown_grace_secs: Option<u64>,
}

impl RelayConfig {
    /// Load configuration from `path`, substituting defaults if the file does not exist
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        if !path.exists() {
            warn!(
                "Config file {} not found, using fallback configuration (upstream {}, port {}, range {}-{})",
                path.display(),
                DEFAULT_UPSTREAM,
                DEFAULT_PREFERRED_PORT,
                DEFAULT_FALLBACK_PORTS.start,
                DEFAULT_FALLBACK_PORTS.end
            );
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;

        Self::from_json(&contents).map_err(|e| match e {
            ConfigError::Parse { source, .. } => ConfigError::Parse {
                path: path.display().to_string(),
                source,
            },
            other => other,
        })
    }

    /// Parse a JSON config document; absent keys keep their defaults
    pub fn from_json(contents: &str) -> Result<Self, ConfigError> {
        let file: ConfigFile = serde_json::from_str(contents).map_err(|source| ConfigError::Parse {
            path: "<inline>".to_string(),
            source,
        })?;

        let mut config = Self::default();

        if let Some(origin) = file.webhook_backend_url {
            config.upstream_origin = parse_upstream(&origin)?;
        }
        if let Some(port) = file.proxy_port {
            config.preferred_port = port;
        }
        if let Some(range) = file.proxy_port_range {
            config.fallback_ports = range;
        }
        if let Some(prefix) = file.path_prefix {
            config.path_prefix = prefix;
        }
        if let Some(addr) = file.bind_address {
            config.bind_address = addr;
        }
        if let Some(secs) = file.upstream_timeout_secs {
            config.upstream_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = file.shutdown_grace_secs {
            config.shutdown_grace = Duration::from_secs(secs);
        }

        config.validate()
    }

    /// Replace the upstream origin (command-line override)
    pub fn with_upstream(mut self, origin: &str) -> Result<Self, ConfigError> {
        self.upstream_origin = parse_upstream(origin)?;
        Ok(self)
    }

    /// Check invariants and normalize the path prefix
    pub fn validate(mut self) -> Result<Self, ConfigError> {
        if self.fallback_ports.start > self.fallback_ports.end {
            return Err(ConfigError::InvalidRange {
                start: self.fallback_ports.start,
                end: self.fallback_ports.end,
            });
        }

        if self.preferred_port == 0 || self.fallback_ports.start == 0 {
            return Err(ConfigError::ZeroPort);
        }

        self.path_prefix = normalize_prefix(&self.path_prefix)?;
        Ok(self)
    }

    pub fn candidate_ports(&self) -> Vec<u16> {
        candidate_ports(self.preferred_port, self.fallback_ports)
    }

    /// Host name under which the relay is announced to local consumers
    pub fn public_host(&self) -> String {
        if self.bind_address.is_loopback() || self.bind_address.is_unspecified() {
            "localhost".to_string()
        } else {
            match self.bind_address {
                IpAddr::V4(v4) => v4.to_string(),
                IpAddr::V6(v6) => format!("[{}]", v6),
            }
        }
    }
}

fn parse_upstream(origin: &str) -> Result<Url, ConfigError> {
    let invalid = |reason: &str| ConfigError::InvalidUpstream {
        origin: origin.to_string(),
        reason: reason.to_string(),
    };

    let url = Url::parse(origin).map_err(|e| invalid(&e.to_string()))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(invalid("scheme must be http or https"));
    }
    if url.host_str().is_none() {
        return Err(invalid("missing host"));
    }
    if url.query().is_some() || url.fragment().is_some() {
        return Err(invalid("query and fragment are not allowed"));
    }

    Ok(url)
}

fn normalize_prefix(prefix: &str) -> Result<String, ConfigError> {
    let trimmed = prefix.trim().trim_end_matches('/');
    let normalized = if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{}", trimmed)
    };

    // A root prefix would shadow /health
    if normalized == "/" || normalized.contains("//") || normalized.contains('?') {
        return Err(ConfigError::InvalidPrefix(prefix.to_string()));
    }

    Ok(normalized)
}
