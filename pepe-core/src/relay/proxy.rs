//! Routes requests through the harness `/proxy` endpoint.

use async_trait::async_trait;
use tracing::debug;
use url::Url;

use super::{RelayRequest, RelayResponse, Transport};
use crate::error::{PepeError, Result};

/// Wraps a transport, sending every request to `<relay>/proxy?target=<url>`.
///
/// Method, headers and body are kept; the relay strips the headers it must
/// not forward.
pub struct ProxyRelay<T> {
    relay: Url,
    inner: T,
}

impl<T: Transport> ProxyRelay<T> {
    pub fn new(relay_url: &str, inner: T) -> Result<Self> {
        let relay = Url::parse(relay_url)
            .map_err(|e| PepeError::Network(format!("invalid relay URL `{relay_url}`: {e}")))?;
        Ok(Self { relay, inner })
    }

    /// URL the relay is asked to fetch `target` through.
    pub fn proxy_url(&self, target: &str) -> String {
        let mut url = self.relay.clone();
        let path = format!("{}/proxy", url.path().trim_end_matches('/'));
        url.set_path(&path);
        url.set_query(None);
        url.query_pairs_mut().append_pair("target", target);
        url.to_string()
    }
}

#[async_trait]
impl<T: Transport> Transport for ProxyRelay<T> {
    async fn send(&self, mut request: RelayRequest) -> Result<RelayResponse> {
        let proxied = self.proxy_url(&request.url);
        debug!(upstream = %request.url, via = %proxied, "Relaying request");
        request.url = proxied;
        self.inner.send(request).await
    }
}
