//! Webhook tokens and request-log retrieval through the relay

use crate::state::RelayEndpoint;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use url::Url;
use uuid::{Uuid, Variant};

pub const DEFAULT_LOG_COUNT: u32 = 50;

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("'{0}' is not a valid GUID (expected e.g. 123e4567-e89b-12d3-a456-426614174000)")]
    Invalid(String),
}

#[derive(Debug, Error)]
pub enum LogError {
    #[error("request to relay failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("relay answered {0}")]
    Status(reqwest::StatusCode),
}

/// Per-user webhook token: a hyphenated RFC 4122 GUID, version 1 to 5
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WebhookToken(Uuid);

impl WebhookToken {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Public webhook URL for this token on the given backend
    pub fn webhook_url(&self, backend: &Url) -> String {
        format!("{}/{}", backend.as_str().trim_end_matches('/'), self)
    }
}

impl FromStr for WebhookToken {
    type Err = TokenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || TokenError::Invalid(s.to_string());

        // Only the hyphenated form; Uuid also accepts simple, braced and urn forms
        if s.len() != 36 {
            return Err(invalid());
        }

        let uuid = Uuid::try_parse(s).map_err(|_| invalid())?;

        if !(1..=5).contains(&uuid.get_version_num()) || uuid.get_variant() != Variant::RFC4122 {
            return Err(invalid());
        }

        Ok(Self(uuid))
    }
}

impl fmt::Display for WebhookToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

/// Reads captured webhook requests from the backend, via the relay
pub struct WebhookClient {
    client: reqwest::Client,
    endpoint: RelayEndpoint,
}

impl WebhookClient {
    pub fn new(client: reqwest::Client, endpoint: RelayEndpoint) -> Self {
        Self { client, endpoint }
    }

    pub fn log_url(&self, token: &WebhookToken, count: u32) -> String {
        format!("{}/{}/log/{}", self.endpoint.api_url, token, count)
    }

    /// Fetch up to `count` captured requests for `token`.
    /// A 404 (nothing captured yet) or a non-array answer is an empty log.
    pub async fn fetch_log(
        &self,
        token: &WebhookToken,
        count: u32,
    ) -> Result<Vec<serde_json::Value>, LogError> {
        let response = self.client.get(self.log_url(token, count)).send().await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }
        if !response.status().is_success() {
            return Err(LogError::Status(response.status()));
        }

        match response.json::<serde_json::Value>().await? {
            serde_json::Value::Array(entries) => Ok(entries),
            _ => Ok(Vec::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_token_round_trips() {
        let token = WebhookToken::generate();
        let parsed: WebhookToken = token.to_string().parse().unwrap();
        assert_eq!(parsed, token);
    }

    #[test]
    fn test_accepts_versions_one_to_five() {
        assert!("123e4567-e89b-12d3-a456-426614174000".parse::<WebhookToken>().is_ok());
        assert!("6ba7b810-9dad-11d1-80b4-00c04fd430c8".parse::<WebhookToken>().is_ok());
        assert!("A8098C1A-F86E-41DA-BEEF-0123456789AB".parse::<WebhookToken>().is_ok());
    }

    #[test]
    fn test_rejects_other_forms() {
        // Version 0
        assert!("123e4567-e89b-02d3-a456-426614174000".parse::<WebhookToken>().is_err());
        // Wrong variant
        assert!("123e4567-e89b-42d3-c456-426614174000".parse::<WebhookToken>().is_err());
        // Not hyphenated
        assert!("123e4567e89b12d3a456426614174000".parse::<WebhookToken>().is_err());
        assert!("not-a-token".parse::<WebhookToken>().is_err());
        assert!("".parse::<WebhookToken>().is_err());
    }

    #[test]
    fn test_webhook_url() {
        let token: WebhookToken = "123e4567-e89b-12d3-a456-426614174000".parse().unwrap();
        let backend = Url::parse("https://hooks.example.com").unwrap();

        assert_eq!(
            token.webhook_url(&backend),
            "https://hooks.example.com/123e4567-e89b-12d3-a456-426614174000"
        );
    }

    #[test]
    fn test_log_url() {
        let token: WebhookToken = "123e4567-e89b-12d3-a456-426614174000".parse().unwrap();
        let client = WebhookClient::new(
            reqwest::Client::new(),
            RelayEndpoint::new("localhost", 3003, "/api"),
        );

        assert_eq!(
            client.log_url(&token, 25),
            "http://localhost:3003/api/123e4567-e89b-12d3-a456-426614174000/log/25"
        );
    }
}
