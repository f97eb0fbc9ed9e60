//! Echo harness handler
//!
//! Stands in for an origin: it answers with whatever authentication headers
//! it was sent, so a challenge can be triggered and observed locally.

use axum::{
    extract::State,
    http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use pepe_core::relay::RELAY_TICKET_HEADER;
use tracing::{debug, info, instrument};

use crate::error::ApiError;
use crate::state::{AppState, Collection};

/// Request headers never copied onto the echo response.
const NOT_REFLECTED: [HeaderName; 4] = [
    header::HOST,
    header::CONTENT_LENGTH,
    header::CONNECTION,
    header::TRANSFER_ENCODING,
];

/// Copy of `headers` suitable for sending back.
pub fn reflect(headers: &HeaderMap) -> HeaderMap {
    let mut reflected = headers.clone();
    for name in &NOT_REFLECTED {
        reflected.remove(name);
    }
    reflected
}

fn header_str<'a>(headers: &'a HeaderMap, name: &HeaderName) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
}

/// POST /echo - Reflect request headers
///
/// Answers 200 with the `Authorization` value as body when one is present,
/// 401 otherwise. With replay enabled, an unanswered `WWW-Authenticate`
/// opens a relay ticket, and a request presenting a resolved ticket is
/// answered with the authorization stored on it. Expired tickets are 404.
#[instrument(skip_all)]
pub async fn echo_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let mut reflected = reflect(&headers);

    if state.replay_enabled {
        if let Some(ticket) = header_str(&headers, &RELAY_TICKET_HEADER) {
            return answer_ticket(&state, ticket, reflected);
        }
    }

    if let Some(authorization) = header_str(&headers, &header::AUTHORIZATION) {
        debug!("Authorization present");
        return Ok((StatusCode::OK, reflected, authorization.to_string()).into_response());
    }

    if state.replay_enabled {
        if let Some(challenge) = header_str(&headers, &header::WWW_AUTHENTICATE) {
            let ticket = state.tickets.open(challenge);
            let value = HeaderValue::from_str(&ticket)
                .map_err(|e| ApiError::internal(format!("invalid ticket header: {e}")))?;
            info!(ticket = %ticket, "Opened relay ticket");
            reflected.insert(RELAY_TICKET_HEADER, value);
        }
    }

    Ok((StatusCode::UNAUTHORIZED, reflected).into_response())
}

fn answer_ticket(
    state: &AppState,
    ticket: &str,
    reflected: HeaderMap,
) -> Result<Response, ApiError> {
    match state.tickets.collect(ticket) {
        Collection::Authorized(authorization) => {
            info!(ticket = %ticket, "Relay ticket collected");
            Ok((StatusCode::OK, reflected, authorization).into_response())
        }
        Collection::Pending => {
            debug!(ticket = %ticket, "Relay ticket still pending");
            Ok((StatusCode::UNAUTHORIZED, reflected).into_response())
        }
        Collection::Unknown => Err(ApiError::not_found(format!("relay ticket {ticket}"))),
    }
}
