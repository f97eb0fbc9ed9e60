//! Replay relay ticket handlers

use axum::{
    extract::{Path, State},
    http::{header, HeaderMap},
    Json,
};
use serde::Serialize;
use tracing::info;

use crate::error::ApiError;
use crate::state::AppState;

/// Ticket status as polled by replay clients.
#[derive(Debug, Serialize)]
pub struct TicketStatus {
    pub ticket: String,
    /// "pending" or "resolved"
    pub state: &'static str,
    /// The challenge waiting for an answer
    pub challenge: String,
}

/// GET /relay/{ticket} - Ticket status
pub async fn ticket_status_handler(
    State(state): State<AppState>,
    Path(ticket): Path<String>,
) -> Result<Json<TicketStatus>, ApiError> {
    let entry = state
        .tickets
        .get(&ticket)
        .ok_or_else(|| ApiError::not_found(format!("relay ticket {ticket}")))?;

    Ok(Json(TicketStatus {
        state: entry.state(),
        challenge: entry.challenge.clone(),
        ticket,
    }))
}

/// POST /relay/{ticket} - Resolve a ticket with the request's `Authorization`
pub async fn resolve_ticket_handler(
    State(state): State<AppState>,
    Path(ticket): Path<String>,
    headers: HeaderMap,
) -> Result<Json<TicketStatus>, ApiError> {
    let authorization = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ApiError::bad_request("Missing Authorization header"))?;

    let entry = state
        .tickets
        .resolve(&ticket, authorization)
        .ok_or_else(|| ApiError::not_found(format!("relay ticket {ticket}")))?;
    info!(ticket = %ticket, "Relay ticket resolved");

    Ok(Json(TicketStatus {
        state: entry.state(),
        challenge: entry.challenge.clone(),
        ticket,
    }))
}
