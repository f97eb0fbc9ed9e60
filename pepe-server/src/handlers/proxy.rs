//! Proxy relay handler
//!
//! Forwards a request to `?target=` on behalf of a client that cannot reach
//! the issuer directly (browser CORS, split networks).

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{HeaderMap, Method},
    response::Response,
};
use pepe_core::relay::strip_relay_headers;
use pepe_core::RelayRequest;
use serde::Deserialize;
use tracing::{info, instrument};
use url::Url;

use super::into_http_response;
use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ProxyQuery {
    pub target: Option<String>,
}

/// GET|POST /proxy?target=<url> - Relay a request upstream
///
/// Method, body and headers are forwarded, except `Host`, `Origin` and
/// `Content-Length`. The upstream status, headers and body come back as-is,
/// minus connection framing headers.
#[instrument(skip_all, fields(method = %method))]
pub async fn proxy_handler(
    State(state): State<AppState>,
    method: Method,
    Query(query): Query<ProxyQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    let target = query
        .target
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| ApiError::bad_request("Missing `target` URL in query parameters"))?;
    let url = Url::parse(&target)
        .map_err(|e| ApiError::bad_request(format!("Invalid target URL: {e}")))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ApiError::bad_request(format!(
            "Unsupported target scheme: {}",
            url.scheme()
        )));
    }

    let mut request = RelayRequest::new(method, url.as_str()).body(body.to_vec());
    request.headers = strip_relay_headers(headers);

    let response = state.transport.send(request).await?;
    info!(upstream = %url, status = response.status, "Relayed request");

    into_http_response(response)
}
