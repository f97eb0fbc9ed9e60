//! Transports used to reach issuers, origins and the local harness.
//!
//! Browsers cannot call most issuers directly, so every outbound request can
//! be routed through the harness proxy:
//!
//! - **HttpTransport** - direct `reqwest` client
//! - **ProxyRelay** - rewrites each request to `<relay>/proxy?target=<url>`
//! - **MockTransport** - scripted responses for tests
//!
//! ## Quick Start
//!
//! ```no_run
//! use pepe_core::relay::{build_transport, ClientConfig, RelayRequest, Transport};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let transport = build_transport(&ClientConfig::from_env())?;
//! let response = transport
//!     .send(RelayRequest::get("https://issuer.example/.well-known/private-token-issuer-directory"))
//!     .await?;
//! println!("status {}", response.status);
//! # Ok(())
//! # }
//! ```

mod http_client;
mod mock;
mod proxy;

pub use http_client::{is_transient_error, is_transient_status, send_idempotent, HttpTransport};
pub use mock::MockTransport;
pub use proxy::ProxyRelay;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{
    AsHeaderName, HeaderMap, HeaderName, HeaderValue, IntoHeaderName, CONTENT_LENGTH,
    CONTENT_TYPE, HOST, ORIGIN,
};
use reqwest::Method;

use crate::error::Result;

/// Header carrying the replay relay ticket.
pub const RELAY_TICKET_HEADER: HeaderName = HeaderName::from_static("relay-ticket");

/// Headers removed from a request before the proxy forwards it.
pub const STRIPPED_RELAY_HEADERS: [HeaderName; 3] = [HOST, ORIGIN, CONTENT_LENGTH];

/// Remove every `Host`, `Origin` and `Content-Length` value.
pub fn strip_relay_headers(mut headers: HeaderMap) -> HeaderMap {
    for name in STRIPPED_RELAY_HEADERS {
        headers.remove(name);
    }
    headers
}

/// First value of `name`, if it is visible ASCII.
fn text_value<K: AsHeaderName>(headers: &HeaderMap, name: K) -> Option<&str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

/// An outbound HTTP request.
#[derive(Debug, Clone, PartialEq)]
pub struct RelayRequest {
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl RelayRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: HeaderMap::new(),
            body: Vec::new(),
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self::new(Method::POST, url)
    }

    /// Append a value; earlier values of the same name are kept.
    pub fn header<K: IntoHeaderName>(mut self, name: K, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }

    pub fn body(mut self, body: Vec<u8>) -> Self {
        self.body = body;
        self
    }

    pub fn header_value<K: AsHeaderName>(&self, name: K) -> Option<&str> {
        text_value(&self.headers, name)
    }
}

/// Response to a [`RelayRequest`], whatever its status.
#[derive(Debug, Clone, PartialEq)]
pub struct RelayResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl RelayResponse {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: Vec::new(),
        }
    }

    /// Append a value; earlier values of the same name are kept.
    pub fn header<K: IntoHeaderName>(mut self, name: K, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }

    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn header_value<K: AsHeaderName>(&self, name: K) -> Option<&str> {
        text_value(&self.headers, name)
    }

    /// Whether the `Content-Type` matches `expected`, ignoring parameters and case.
    pub fn content_type_is(&self, expected: &str) -> bool {
        self.header_value(CONTENT_TYPE)
            .and_then(|ct| ct.split(';').next())
            .is_some_and(|ct| ct.trim().eq_ignore_ascii_case(expected))
    }
}

/// Anything that can carry a request to its target.
///
/// Non-2xx statuses are returned as responses; only failures to obtain a
/// response at all are errors.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: RelayRequest) -> Result<RelayResponse>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Box<T> {
    async fn send(&self, request: RelayRequest) -> Result<RelayResponse> {
        (**self).send(request).await
    }
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    async fn send(&self, request: RelayRequest) -> Result<RelayResponse> {
        (**self).send(request).await
    }
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for &T {
    async fn send(&self, request: RelayRequest) -> Result<RelayResponse> {
        (**self).send(request).await
    }
}

/// Configuration for outbound HTTP.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Per-request timeout.
    pub timeout: Duration,
    /// Maximum retry attempts for transient errors on idempotent requests.
    pub max_retries: u32,
    /// Initial retry interval.
    pub initial_interval: Duration,
    /// Maximum retry interval.
    pub max_interval: Duration,
    /// Base URL of the proxy relay; requests go direct when unset.
    pub relay_url: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            max_retries: 3,
            initial_interval: Duration::from_millis(200),
            max_interval: Duration::from_secs(2),
            relay_url: None,
        }
    }
}

impl ClientConfig {
    /// Load from `PEPE_RELAY_URL` and `PEPE_HTTP_TIMEOUT_SECS`.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let timeout = std::env::var("PEPE_HTTP_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(defaults.timeout);

        let relay_url = std::env::var("PEPE_RELAY_URL")
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty());

        Self {
            timeout,
            relay_url,
            ..defaults
        }
    }

    pub fn with_relay(mut self, relay_url: impl Into<String>) -> Self {
        self.relay_url = Some(relay_url.into());
        self
    }
}

/// Direct transport, wrapped in a [`ProxyRelay`] when a relay is configured.
pub fn build_transport(config: &ClientConfig) -> Result<Box<dyn Transport>> {
    let http = HttpTransport::new(config)?;
    match &config.relay_url {
        Some(relay) => Ok(Box::new(ProxyRelay::new(relay, http)?)),
        None => Ok(Box::new(http)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::{ACCEPT, AUTHORIZATION, WWW_AUTHENTICATE};

    #[test]
    fn test_strip_relay_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(HOST, HeaderValue::from_static("localhost:8787"));
        headers.insert(ORIGIN, HeaderValue::from_static("http://localhost:8787"));
        headers.insert(CONTENT_LENGTH, HeaderValue::from_static("12"));
        headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static("application/private-token-request"),
        );
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_static("PrivateToken token=abc"),
        );

        let stripped = strip_relay_headers(headers);
        assert_eq!(stripped.len(), 2);
        assert_eq!(
            stripped.get(CONTENT_TYPE).unwrap(),
            "application/private-token-request"
        );
        assert_eq!(stripped.get(AUTHORIZATION).unwrap(), "PrivateToken token=abc");
    }

    #[test]
    fn test_strip_keeps_lookalike_names() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-host", HeaderValue::from_static("a"));
        headers.insert("origin-trial", HeaderValue::from_static("b"));
        assert_eq!(strip_relay_headers(headers).len(), 2);
    }

    #[test]
    fn test_content_type_ignores_parameters() {
        let response = RelayResponse::new(200).header(
            CONTENT_TYPE,
            HeaderValue::from_static("Application/Private-Token-Response; charset=binary"),
        );
        assert!(response.content_type_is("application/private-token-response"));
        assert!(!response.content_type_is("message/token-response"));
        assert!(!RelayResponse::new(200).content_type_is("message/token-response"));
    }

    #[test]
    fn test_header_lookup_case_insensitive() {
        let request = RelayRequest::post("http://x")
            .header(WWW_AUTHENTICATE, HeaderValue::from_static("PrivateToken a=b"));
        assert_eq!(
            request.header_value("WWW-Authenticate"),
            Some("PrivateToken a=b")
        );
        assert_eq!(request.header_value(AUTHORIZATION), None);
    }

    #[test]
    fn test_opaque_header_bytes_are_kept() {
        let value = HeaderValue::from_bytes(&[0x61, 0xFF, 0x62]).unwrap();
        let request = RelayRequest::get("http://x").header(ACCEPT, value.clone());
        assert_eq!(request.headers.get(ACCEPT), Some(&value));
        assert_eq!(request.header_value(ACCEPT), None);
    }

    #[test]
    fn test_repeated_header_values_are_appended() {
        let response = RelayResponse::new(200)
            .header("x-issuer", HeaderValue::from_static("a"))
            .header("x-issuer", HeaderValue::from_static("b"));
        assert_eq!(response.headers.get_all("x-issuer").iter().count(), 2);
        assert_eq!(response.header_value("x-issuer"), Some("a"));
    }

    #[test]
    fn test_default_client_config() {
        let config = ClientConfig::default();
        assert_eq!(config.max_retries, 3);
        assert!(config.relay_url.is_none());
        let config = config.with_relay("http://localhost:8787");
        assert_eq!(config.relay_url.as_deref(), Some("http://localhost:8787"));
    }
}
