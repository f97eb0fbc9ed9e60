//! Issuer directory retrieval.
//!
//! ```json
//! {
//!   "issuer-request-uri": "/token-request",
//!   "token-keys": [{ "token-type": 2, "token-key": "MIIB...", "not-before": 1700000000 }]
//! }
//! ```

use base64::Engine;
use reqwest::header::{HeaderValue, ACCEPT, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::error::{PepeError, Result};
use crate::key::IssuerPublicKey;
use crate::protocol::{TokenType, BASE64URL, ISSUER_DIRECTORY_MEDIA_TYPE};
use crate::relay::{send_idempotent, ClientConfig, RelayRequest, Transport};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuerDirectory {
    #[serde(rename = "issuer-request-uri")]
    pub issuer_request_uri: String,
    #[serde(rename = "token-keys")]
    pub token_keys: Vec<TokenKeyInfo>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenKeyInfo {
    #[serde(rename = "token-type")]
    pub token_type: u16,
    /// base64url SPKI.
    #[serde(rename = "token-key")]
    pub token_key: String,
    #[serde(
        rename = "not-before",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub not_before: Option<u64>,
}

/// A directory key resolved against the host that published it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuerTokenKey {
    pub token_type: TokenType,
    pub raw_key: Vec<u8>,
    pub issuer_request_uri: String,
    pub issuer_host: String,
}

impl IssuerTokenKey {
    /// Absolute request URIs are used as-is; relative ones resolve against
    /// `https://<issuer_host>`.
    pub fn request_url(&self) -> String {
        if Url::parse(&self.issuer_request_uri).is_ok() {
            return self.issuer_request_uri.clone();
        }
        let path = if self.issuer_request_uri.starts_with('/') {
            self.issuer_request_uri.clone()
        } else {
            format!("/{}", self.issuer_request_uri)
        };
        format!("https://{}{}", self.issuer_host, path)
    }

    pub fn public_key(&self) -> Result<IssuerPublicKey> {
        IssuerPublicKey::from_spki(&self.raw_key)
    }
}

/// Directory plus the diagnostics gathered while fetching it.
#[derive(Debug, Clone)]
pub struct DirectoryReport {
    pub directory: IssuerDirectory,
    /// Keys with a supported token type and a non-empty key, in directory order.
    pub keys: Vec<IssuerTokenKey>,
    pub content_type: Option<String>,
    pub content_type_matched: bool,
}

impl IssuerDirectory {
    /// Resolve the listed keys for an issuer at `issuer_host`.
    ///
    /// Entries with an unknown token type or an undecodable key are skipped.
    pub fn token_keys_for(&self, issuer_host: &str) -> Vec<IssuerTokenKey> {
        self.token_keys
            .iter()
            .filter(|info| !info.token_key.is_empty())
            .filter_map(|info| {
                let token_type = match TokenType::try_from(info.token_type) {
                    Ok(token_type) => token_type,
                    Err(_) => {
                        debug!(token_type = info.token_type, "Skipping unsupported key entry");
                        return None;
                    }
                };
                let raw_key = match BASE64URL.decode(info.token_key.trim()) {
                    Ok(raw) => raw,
                    Err(e) => {
                        warn!(error = %e, "Skipping key entry with invalid base64url");
                        return None;
                    }
                };
                Some(IssuerTokenKey {
                    token_type,
                    raw_key,
                    issuer_request_uri: self.issuer_request_uri.clone(),
                    issuer_host: issuer_host.to_string(),
                })
            })
            .collect()
    }
}

/// Fetch and parse an issuer directory.
///
/// A wrong `Content-Type` is reported in the result rather than failing.
#[instrument(skip(transport, config))]
pub async fn fetch_directory<T: Transport + ?Sized>(
    transport: &T,
    url: &str,
    config: &ClientConfig,
) -> Result<DirectoryReport> {
    let parsed = Url::parse(url)
        .map_err(|e| PepeError::Directory(format!("invalid directory URL `{url}`: {e}")))?;
    let host = match (parsed.host_str(), parsed.port()) {
        (Some(host), Some(port)) => format!("{host}:{port}"),
        (Some(host), None) => host.to_string(),
        (None, _) => {
            return Err(PepeError::Directory(format!(
                "directory URL `{url}` has no host"
            )))
        }
    };

    let request = RelayRequest::get(url).header(
        ACCEPT,
        HeaderValue::from_static(ISSUER_DIRECTORY_MEDIA_TYPE),
    );
    let response = send_idempotent(transport, &request, config).await?;
    if !response.is_success() {
        return Err(PepeError::Network(format!(
            "issuer directory returned status {}",
            response.status
        )));
    }

    let content_type = response.header_value(CONTENT_TYPE).map(str::to_string);
    let content_type_matched = response.content_type_is(ISSUER_DIRECTORY_MEDIA_TYPE);
    if !content_type_matched {
        warn!(
            content_type = content_type.as_deref().unwrap_or("<none>"),
            expected = ISSUER_DIRECTORY_MEDIA_TYPE,
            "Issuer directory content type mismatch"
        );
    }

    let directory: IssuerDirectory = serde_json::from_slice(&response.body)
        .map_err(|e| PepeError::Directory(format!("invalid directory document: {e}")))?;
    let keys = directory.token_keys_for(&host);
    info!(host = %host, keys = keys.len(), "Fetched issuer directory");

    Ok(DirectoryReport {
        directory,
        keys,
        content_type,
        content_type_matched,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::{MockTransport, RelayResponse};
    use std::time::Duration;

    const DIRECTORY: &str = r#"{
        "issuer-request-uri": "/token-request",
        "token-keys": [
            {"token-type": 2, "token-key": "AQID", "not-before": 1700000000},
            {"token-type": 3, "token-key": "BAUG"},
            {"token-type": 55930, "token-key": ""},
            {"token-type": 55930, "token-key": "BwgJ"}
        ]
    }"#;

    fn config() -> ClientConfig {
        ClientConfig {
            timeout: Duration::from_millis(200),
            max_retries: 1,
            initial_interval: Duration::from_millis(1),
            max_interval: Duration::from_millis(2),
            relay_url: None,
        }
    }

    #[test]
    fn test_request_url_resolution() {
        let mut key = IssuerTokenKey {
            token_type: TokenType::Public,
            raw_key: vec![1],
            issuer_request_uri: "/token-request".into(),
            issuer_host: "issuer.example".into(),
        };
        assert_eq!(key.request_url(), "https://issuer.example/token-request");

        key.issuer_request_uri = "https://other.example/issue".into();
        assert_eq!(key.request_url(), "https://other.example/issue");
    }

    #[test]
    fn test_directory_serde_names() {
        let directory: IssuerDirectory = serde_json::from_str(DIRECTORY).unwrap();
        assert_eq!(directory.token_keys.len(), 4);
        assert_eq!(directory.token_keys[0].not_before, Some(1700000000));

        let json = serde_json::to_value(&directory).unwrap();
        assert_eq!(json["token-keys"][1]["token-type"], 3);
        assert!(json["token-keys"][1].get("not-before").is_none());
    }

    #[tokio::test]
    async fn test_fetch_filters_keys_and_reports_content_type() {
        let transport = MockTransport::new();
        transport.push_response(
            RelayResponse::new(200)
                .header(CONTENT_TYPE, HeaderValue::from_static("application/json"))
                .body(DIRECTORY),
        );

        let report = fetch_directory(
            &transport,
            "https://issuer.example/.well-known/private-token-issuer-directory",
            &config(),
        )
        .await
        .unwrap();

        assert!(!report.content_type_matched);
        assert_eq!(report.content_type.as_deref(), Some("application/json"));
        assert_eq!(report.keys.len(), 2);
        assert_eq!(report.keys[0].raw_key, vec![1, 2, 3]);
        assert_eq!(report.keys[1].token_type, TokenType::PublicMetadata);
        assert_eq!(report.keys[1].issuer_host, "issuer.example");
    }

    #[tokio::test]
    async fn test_fetch_keeps_port_in_host() {
        let transport = MockTransport::new();
        transport.push_response(
            RelayResponse::new(200)
                .header(
                    CONTENT_TYPE,
                    HeaderValue::from_static(ISSUER_DIRECTORY_MEDIA_TYPE),
                )
                .body(DIRECTORY),
        );
        let report = fetch_directory(&transport, "http://localhost:8787/dir", &config())
            .await
            .unwrap();
        assert!(report.content_type_matched);
        assert_eq!(report.keys[0].issuer_host, "localhost:8787");
    }

    #[tokio::test]
    async fn test_fetch_rejects_error_status_and_bad_json() {
        let transport = MockTransport::new();
        transport.push_response(RelayResponse::new(404));
        transport.push_response(RelayResponse::new(200).body("not json"));

        let url = "https://issuer.example/dir";
        let err = fetch_directory(&transport, url, &config()).await.unwrap_err();
        assert!(matches!(err, PepeError::Network(_)));
        let err = fetch_directory(&transport, url, &config()).await.unwrap_err();
        assert!(matches!(err, PepeError::Directory(_)));
    }
}
