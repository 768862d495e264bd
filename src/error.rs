//! Error types for the relay

use crate::config::ConfigError;
use std::time::Duration;
use thiserror::Error;

/// Errors that stop the relay from starting
#[derive(Debug, Error)]
pub enum RelayError {
    #[error(
        "could not start relay: preferred port {preferred} and fallback ports {start}-{end} are all unavailable"
    )]
    BindExhausted { preferred: u16, start: u16, end: u16 },

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Per-request forwarding failures, answered with a 500 and never fatal
#[derive(Debug, Error)]
pub enum ForwardError {
    #[error("upstream {target} is unreachable: {reason}")]
    UpstreamUnreachable { target: String, reason: String },

    #[error("upstream did not respond within {}ms", .0.as_millis())]
    UpstreamTimeout(Duration),

    #[error("upstream request failed: {0}")]
    Upstream(String),

    #[error("invalid upstream target '{0}'")]
    InvalidTarget(String),
}

/// Render an error with its full source chain, e.g. "client error (Connect): tcp connect error: Connection refused"
pub(crate) fn error_chain(err: &dyn std::error::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();

    while let Some(inner) = source {
        message.push_str(": ");
        message.push_str(&inner.to_string());
        source = inner.source();
    }

    message
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_chain_includes_sources() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "connection refused");
        let err = ConfigError::Read {
            path: "config.json".to_string(),
            source: io,
        };

        let rendered = error_chain(&err);
        assert!(rendered.starts_with("failed to read config file config.json"));
        assert!(rendered.ends_with(": connection refused"));
    }

    #[test]
    fn test_timeout_message() {
        let err = ForwardError::UpstreamTimeout(Duration::from_millis(250));
        assert_eq!(err.to_string(), "upstream did not respond within 250ms");
    }
}
