//! Challenge trigger and replay relay polling.
//!
//! The echo harness answers a challenge either directly or with a
//! `Relay-Ticket`, in which case the ticket is polled on the relay until an
//! authorization has been posted for it, and the original request is sent
//! once more carrying the ticket.

use std::time::Duration;

use reqwest::header::{HeaderValue, WWW_AUTHENTICATE};
use serde::Deserialize;
use tracing::{debug, info, instrument, warn};

use crate::error::{PepeError, Result};
use crate::relay::{RelayRequest, RelayResponse, Transport, RELAY_TICKET_HEADER};

/// Relay state for a ticket still waiting on an authorization.
pub const PENDING_STATE: &str = "pending";

#[derive(Debug, Clone)]
pub struct ReplayConfig {
    /// Delay between two status queries.
    pub interval: Duration,
    /// Status queries before giving up; `None` polls until resolution.
    pub max_polls: Option<u32>,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(100),
            max_polls: Some(300),
        }
    }
}

impl ReplayConfig {
    pub fn unbounded() -> Self {
        Self {
            max_polls: None,
            ..Self::default()
        }
    }
}

/// Final classification of a triggered challenge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerOutcome {
    /// 2xx; the body carries the authorization the origin accepted.
    Authorized(String),
    /// Non-2xx that reflected a `WWW-Authenticate` challenge.
    ReflectedChallenge(String),
}

#[derive(Debug, Deserialize)]
struct TicketStatus {
    state: String,
}

pub struct ReplayPoller<T> {
    transport: T,
    echo_url: String,
    relay_url: String,
    config: ReplayConfig,
}

impl<T: Transport> ReplayPoller<T> {
    /// `relay_url` is the base the `/relay/<ticket>` status path hangs off.
    pub fn new(
        transport: T,
        echo_url: impl Into<String>,
        relay_url: impl Into<String>,
        config: ReplayConfig,
    ) -> Self {
        Self {
            transport,
            echo_url: echo_url.into(),
            relay_url: relay_url.into(),
            config,
        }
    }

    fn status_url(&self, ticket: &str) -> String {
        format!("{}/relay/{}", self.relay_url.trim_end_matches('/'), ticket)
    }

    /// Submit `challenge` to the echo harness and classify the final answer.
    #[instrument(skip_all, fields(echo_url = %self.echo_url))]
    pub async fn trigger(&self, challenge: &str) -> Result<TriggerOutcome> {
        let challenge = HeaderValue::from_str(challenge).map_err(|e| {
            PepeError::ChallengeParse(format!("challenge is not a valid header value: {e}"))
        })?;
        let request = RelayRequest::post(&self.echo_url).header(WWW_AUTHENTICATE, challenge);
        let response = self.send(request.clone()).await?;

        let final_response = match response.headers.get(RELAY_TICKET_HEADER).cloned() {
            None => {
                debug!("No relay ticket, response is final");
                response
            }
            Some(ticket) => {
                let id = ticket
                    .to_str()
                    .map_err(|_| PepeError::Network("relay ticket is not printable".into()))?
                    .to_string();
                info!(ticket = %id, "Challenge deferred to relay");
                self.wait_for_resolution(&id).await?;
                self.send(request.header(RELAY_TICKET_HEADER, ticket)).await?
            }
        };

        classify(final_response)
    }

    async fn wait_for_resolution(&self, ticket: &str) -> Result<()> {
        let url = self.status_url(ticket);
        let mut polls = 0u32;
        loop {
            if self.config.max_polls.is_some_and(|max| polls >= max) {
                warn!(ticket, polls, "Relay ticket not resolved in time");
                return Err(PepeError::ReplayTimeout {
                    ticket: ticket.to_string(),
                    polls,
                });
            }
            polls += 1;

            let response = self.send(RelayRequest::get(&url)).await?;
            if !response.is_success() {
                return Err(PepeError::Network(format!(
                    "relay status for ticket {ticket} returned {}",
                    response.status
                )));
            }
            let status: TicketStatus = serde_json::from_slice(&response.body).map_err(|e| {
                PepeError::Network(format!("invalid relay status document: {e}"))
            })?;

            if status.state != PENDING_STATE {
                debug!(ticket, polls, state = %status.state, "Relay ticket resolved");
                return Ok(());
            }
            tokio::time::sleep(self.config.interval).await;
        }
    }

    async fn send(&self, request: RelayRequest) -> Result<RelayResponse> {
        self.transport.send(request).await.map_err(|e| match e {
            PepeError::Network(_) | PepeError::HttpError(_) => e,
            other => PepeError::Network(other.to_string()),
        })
    }
}

fn classify(response: RelayResponse) -> Result<TriggerOutcome> {
    if response.is_success() {
        return Ok(TriggerOutcome::Authorized(
            String::from_utf8_lossy(&response.body).into_owned(),
        ));
    }
    match response.header_value(WWW_AUTHENTICATE) {
        Some(challenge) => Ok(TriggerOutcome::ReflectedChallenge(challenge.to_string())),
        None => Err(PepeError::ChallengeTrigger {
            status: response.status,
        }),
    }
}

/// Whether the local echo harness is up: it must reflect a `test: 1` header.
pub async fn probe_echo<T: Transport + ?Sized>(transport: &T, echo_url: &str) -> bool {
    match transport
        .send(RelayRequest::post(echo_url).header("test", HeaderValue::from_static("1")))
        .await
    {
        Ok(response) => response.header_value("test") == Some("1"),
        Err(e) => {
            debug!(error = %e, "Echo harness unreachable");
            false
        }
    }
}
