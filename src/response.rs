//! Response construction shared by the relay routes

use crate::error::ForwardError;
use bytes::Bytes;
use http_body_util::{combinators::BoxBody, BodyExt, Empty, Full};
use hyper::header::{
    HeaderMap, HeaderValue, ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS,
    ACCESS_CONTROL_ALLOW_ORIGIN, CONTENT_TYPE,
};
use hyper::{Response, StatusCode};
use serde::{Deserialize, Serialize};

/// Body type for everything the relay sends back
pub type RelayBody = BoxBody<Bytes, hyper::Error>;

pub const CORS_ALLOW_ORIGIN: &str = "*";
pub const CORS_ALLOW_METHODS: &str = "GET, POST, PUT, DELETE, PATCH, OPTIONS";
pub const CORS_ALLOW_HEADERS: &str = "Content-Type, Authorization, X-Requested-With";

/// Payload of the liveness probe
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: String,
    pub message: String,
}

impl HealthReport {
    pub fn ok() -> Self {
        Self {
            status: "ok".to_string(),
            message: "Proxy server is running".to_string(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == "ok"
    }
}

/// Add the permissive CORS headers. Values the upstream already set are kept.
pub fn apply_cors(headers: &mut HeaderMap) {
    headers
        .entry(ACCESS_CONTROL_ALLOW_ORIGIN)
        .or_insert(HeaderValue::from_static(CORS_ALLOW_ORIGIN));
    headers
        .entry(ACCESS_CONTROL_ALLOW_METHODS)
        .or_insert(HeaderValue::from_static(CORS_ALLOW_METHODS));
    headers
        .entry(ACCESS_CONTROL_ALLOW_HEADERS)
        .or_insert(HeaderValue::from_static(CORS_ALLOW_HEADERS));
}

pub fn health_response() -> Response<RelayBody> {
    json_response(StatusCode::OK, &HealthReport::ok())
}

/// 500 answer for a forwarding failure
pub fn proxy_error_response(err: &ForwardError) -> Response<RelayBody> {
    json_response(
        StatusCode::INTERNAL_SERVER_ERROR,
        &serde_json::json!({
            "error": "Proxy error",
            "message": err.to_string(),
        }),
    )
}

/// Answer to a CORS preflight
pub fn preflight_response() -> Response<RelayBody> {
    let mut response = Response::new(empty_body());
    *response.status_mut() = StatusCode::NO_CONTENT;
    response
}

pub fn text_response(status: StatusCode, body: &str) -> Response<RelayBody> {
    let mut response = Response::new(full_body(Bytes::from(body.to_string())));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("text/plain; charset=utf-8"));
    response
}

pub fn json_response<T: Serialize>(status: StatusCode, value: &T) -> Response<RelayBody> {
    // Serializing plain structs and json! values cannot fail
    let body = serde_json::to_vec(value).unwrap_or_default();
    let mut response = Response::new(full_body(Bytes::from(body)));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json; charset=utf-8"));
    response
}

pub fn full_body(bytes: Bytes) -> RelayBody {
    Full::new(bytes).map_err(|never| match never {}).boxed()
}

pub fn empty_body() -> RelayBody {
    Empty::<Bytes>::new().map_err(|never| match never {}).boxed()
}
