//! HTTP request handlers
//!
//! This module contains all the request handlers for the API endpoints, plus
//! the conversion from relayed responses back to axum responses.

pub mod echo;
pub mod health;
pub mod issuer;
pub mod proxy;
pub mod relay;

use axum::{
    http::{
        header::{CONNECTION, CONTENT_LENGTH, TRANSFER_ENCODING, UPGRADE},
        HeaderName, StatusCode,
    },
    response::{IntoResponse, Response},
};
use pepe_core::RelayResponse;

use crate::error::ApiError;

pub use crate::state::AppState;
pub use echo::echo_handler;
pub use health::{health, ready, HealthResponse, ReadyResponse};
pub use issuer::issuer_handler;
pub use proxy::{proxy_handler, ProxyQuery};
pub use relay::{resolve_ticket_handler, ticket_status_handler, TicketStatus};

/// Framing headers that describe a connection rather than a message.
pub const HOP_BY_HOP_HEADERS: [HeaderName; 5] = [
    CONNECTION,
    HeaderName::from_static("keep-alive"),
    TRANSFER_ENCODING,
    CONTENT_LENGTH,
    UPGRADE,
];

/// Turn a relayed response back into an HTTP response, without framing headers.
pub fn into_http_response(response: RelayResponse) -> Result<Response, ApiError> {
    let status = StatusCode::from_u16(response.status)
        .map_err(|e| ApiError::internal(format!("invalid upstream status: {e}")))?;

    let mut headers = response.headers;
    for name in HOP_BY_HOP_HEADERS {
        headers.remove(name);
    }

    Ok((status, headers, response.body).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{header::CONTENT_TYPE, HeaderValue};

    #[test]
    fn test_into_http_response_drops_framing() {
        let upstream = RelayResponse::new(201)
            .header(
                CONTENT_TYPE,
                HeaderValue::from_static("application/private-token-response"),
            )
            .header(CONTENT_LENGTH, HeaderValue::from_static("3"))
            .header(TRANSFER_ENCODING, HeaderValue::from_static("chunked"))
            .header("x-issuer", HeaderValue::from_static("a"))
            .header("x-issuer", HeaderValue::from_static("b"))
            .body(vec![1, 2, 3]);

        let response = into_http_response(upstream).unwrap();

        assert_eq!(response.status(), StatusCode::CREATED);
        let headers = response.headers();
        assert_eq!(
            headers.get("content-type").unwrap(),
            "application/private-token-response"
        );
        assert!(headers.get("transfer-encoding").is_none());
        assert_eq!(headers.get_all("x-issuer").iter().count(), 2);
    }

    #[test]
    fn test_into_http_response_keeps_opaque_values() {
        let opaque = HeaderValue::from_bytes(b"caf\xe9").unwrap();
        let upstream = RelayResponse::new(200).header("x-note", opaque.clone());

        let response = into_http_response(upstream).unwrap();

        assert_eq!(response.headers().get("x-note"), Some(&opaque));
    }
}
