//! Test issuer handlers
//!
//! Mounted only when the test issuer is enabled. Requests are handed to the
//! core issuer transport unchanged, so the server and in-process tests share
//! one issuer behavior.

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, Method, Uri},
    response::Response,
};
use pepe_core::{IssuerTransport, RelayRequest, Transport};

use super::into_http_response;
use crate::error::ApiError;
use crate::state::AppState;

/// GET /.well-known/private-token-issuer-directory and POST /token-request
pub async fn issuer_handler(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    let issuer = state
        .test_issuer
        .ok_or_else(|| ApiError::service_unavailable("Test issuer is disabled"))?;

    let mut request = RelayRequest::new(method, uri.path()).body(body.to_vec());
    request.headers = headers;

    let response = IssuerTransport::new(issuer).send(request).await?;
    tracing::debug!(path = %uri.path(), status = response.status, "Test issuer answered");

    into_http_response(response)
}
