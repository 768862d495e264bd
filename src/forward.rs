//! Upstream forwarding
//! Strips the reserved prefix, rewrites Host to the upstream, and relays the response verbatim

use crate::config::RelayConfig;
use crate::error::{error_chain, ForwardError};
use crate::response::RelayBody;
use http_body_util::BodyExt;
use hyper::body::Incoming;
use hyper::header::{HeaderMap, HeaderName, HOST, TE, TRAILER, TRANSFER_ENCODING, UPGRADE};
use hyper::{Request, Response, Uri, Version};
use hyper_tls::HttpsConnector;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use std::time::Duration;
use tracing::info;
use url::{Position, Url};

type UpstreamClient = Client<HttpsConnector<HttpConnector>, RelayBody>;

/// Connection-scoped headers that never cross the relay
const HOP_BY_HOP: [&str; 3] = ["connection", "keep-alive", "proxy-connection"];

/// Forwards requests to the configured upstream origin
pub struct Forwarder {
    client: UpstreamClient,
    upstream: Url,
    prefix: String,
    timeout: Duration,
}

impl Forwarder {
    pub fn new(config: &RelayConfig) -> Self {
        let client = Client::builder(TokioExecutor::new())
            .http1_preserve_header_case(true)
            .build(HttpsConnector::new());

        Self {
            client,
            upstream: config.upstream_origin.clone(),
            prefix: config.path_prefix.clone(),
            timeout: config.upstream_timeout,
        }
    }

    pub fn upstream(&self) -> &Url {
        &self.upstream
    }

    /// Remainder of `path` after the reserved prefix, or `None` if the path is not under it.
    /// Matches only at a segment boundary: `/api` and `/api/x` match, `/apix` does not.
    pub fn strip_prefix<'a>(&self, path: &'a str) -> Option<&'a str> {
        let rest = path.strip_prefix(self.prefix.as_str())?;
        if rest.is_empty() || rest.starts_with('/') {
            Some(rest)
        } else {
            None
        }
    }

    /// Absolute upstream URI for a prefix-stripped path
    pub fn target_uri(&self, rest: &str, query: Option<&str>) -> Result<Uri, ForwardError> {
        let origin = &self.upstream[..Position::BeforePath];
        let base_path = self.upstream.path().trim_end_matches('/');
        let rest = if rest.is_empty() { "/" } else { rest };

        let mut target = format!("{}{}{}", origin, base_path, rest);
        if let Some(q) = query {
            target.push('?');
            target.push_str(q);
        }

        target
            .parse()
            .map_err(|_| ForwardError::InvalidTarget(target.clone()))
    }

    /// Send `req` to `target` and hand back the upstream's response as-is.
    ///
    /// Any upstream status, including 4xx/5xx, is a success here. Only transport
    /// failures and timeouts become errors.
    ///
    /// The timeout bounds connecting and receiving the response head. The body is
    /// streamed afterwards without a deadline, so an upstream that stalls mid-body
    /// holds the client until it closes the connection or the client disconnects.
    pub async fn forward(
        &self,
        req: Request<Incoming>,
        target: Uri,
    ) -> Result<Response<RelayBody>, ForwardError> {
        let (mut parts, body) = req.into_parts();

        info!("[PROXY] {} {} -> {}", parts.method, parts.uri, target);

        strip_hop_by_hop(&mut parts.headers);
        // The client fills Host from the target URI
        parts.headers.remove(HOST);
        parts.uri = target.clone();
        parts.version = Version::HTTP_11;

        let upstream_req = Request::from_parts(parts, body.boxed());

        let response = match tokio::time::timeout(self.timeout, self.client.request(upstream_req)).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) if e.is_connect() => {
                return Err(ForwardError::UpstreamUnreachable {
                    target: target.to_string(),
                    reason: error_chain(&e),
                });
            }
            Ok(Err(e)) => return Err(ForwardError::Upstream(error_chain(&e))),
            Err(_) => return Err(ForwardError::UpstreamTimeout(self.timeout)),
        };

        let (mut parts, body) = response.into_parts();
        strip_hop_by_hop(&mut parts.headers);

        Ok(Response::from_parts(parts, body.boxed()))
    }
}

fn strip_hop_by_hop(headers: &mut HeaderMap) {
    // Headers named by Connection are connection-scoped as well
    let named: Vec<HeaderName> = headers
        .get_all(hyper::header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();

    for name in named {
        headers.remove(name);
    }
    for name in HOP_BY_HOP {
        headers.remove(name);
    }
    for name in [TE, TRAILER, TRANSFER_ENCODING, UPGRADE] {
        headers.remove(name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hyper::header::HeaderValue;

    fn forwarder(upstream: &str, prefix: &str) -> Forwarder {
        let config = RelayConfig {
            path_prefix: prefix.to_string(),
            ..RelayConfig::default()
        }
        .with_upstream(upstream)
        .unwrap()
        .validate()
        .unwrap();
        Forwarder::new(&config)
    }

    #[tokio::test]
    async fn test_strip_prefix_at_segment_boundary() {
        let f = forwarder("http://backend.test", "/api");

        assert_eq!(f.strip_prefix("/api/hooks/abc"), Some("/hooks/abc"));
        assert_eq!(f.strip_prefix("/api"), Some(""));
        assert_eq!(f.strip_prefix("/api/"), Some("/"));
        assert_eq!(f.strip_prefix("/apix/hooks"), None);
        assert_eq!(f.strip_prefix("/health"), None);
    }

    #[tokio::test]
    async fn test_target_uri() {
        let f = forwarder("http://backend.test", "/api");

        assert_eq!(
            f.target_uri("/hooks/abc", None).unwrap().to_string(),
            "http://backend.test/hooks/abc"
        );
        assert_eq!(f.target_uri("", None).unwrap().to_string(), "http://backend.test/");
        assert_eq!(
            f.target_uri("/abc/log/50", Some("a=1&b=2")).unwrap().to_string(),
            "http://backend.test/abc/log/50?a=1&b=2"
        );
    }

    #[tokio::test]
    async fn test_target_uri_keeps_port_and_base_path() {
        let f = forwarder("https://hooks.example.com:8443/v1/", "/api");

        assert_eq!(
            f.target_uri("/abc", None).unwrap().to_string(),
            "https://hooks.example.com:8443/v1/abc"
        );
    }

    #[tokio::test]
    async fn test_custom_prefix() {
        let f = forwarder("http://backend.test", "/relay");

        assert_eq!(f.strip_prefix("/relay/x"), Some("/x"));
        assert_eq!(f.strip_prefix("/api/x"), None);
    }

    #[test]
    fn test_strip_hop_by_hop() {
        let mut headers = HeaderMap::new();
        headers.insert("connection", HeaderValue::from_static("keep-alive, x-session-hint"));
        headers.insert("keep-alive", HeaderValue::from_static("timeout=5"));
        headers.insert("x-session-hint", HeaderValue::from_static("1"));
        headers.insert("transfer-encoding", HeaderValue::from_static("chunked"));
        headers.insert("authorization", HeaderValue::from_static("Bearer t"));
        headers.insert("content-type", HeaderValue::from_static("application/json"));

        strip_hop_by_hop(&mut headers);

        assert!(headers.get("connection").is_none());
        assert!(headers.get("keep-alive").is_none());
        assert!(headers.get("x-session-hint").is_none());
        assert!(headers.get("transfer-encoding").is_none());
        assert_eq!(headers["authorization"], "Bearer t");
        assert_eq!(headers["content-type"], "application/json");
    }
}
