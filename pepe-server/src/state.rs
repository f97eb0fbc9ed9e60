//! Application state module
//!
//! Defines shared state accessible across all request handlers.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use pepe_core::{ClientConfig, HttpTransport, TestIssuer, Transport};
use uuid::Uuid;

use crate::config::Config;

/// Ticket lifecycle states as reported by `GET /relay/{ticket}`.
pub const TICKET_PENDING: &str = pepe_core::replay::PENDING_STATE;
pub const TICKET_RESOLVED: &str = "resolved";

/// Lifetime of a relay ticket (5 minutes)
pub const TICKET_EXPIRY_SECS: u64 = 300;

/// A challenge parked on the replay relay until someone answers it.
#[derive(Debug, Clone)]
pub struct TicketEntry {
    /// The `WWW-Authenticate` value that opened the ticket.
    pub challenge: String,
    /// Set once an authorization has been posted for the ticket.
    pub authorization: Option<String>,
    pub expires_at: Instant,
}

impl TicketEntry {
    pub fn pending(challenge: impl Into<String>, ttl: Duration) -> Self {
        Self {
            challenge: challenge.into(),
            authorization: None,
            expires_at: Instant::now() + ttl,
        }
    }

    pub fn state(&self) -> &'static str {
        if self.authorization.is_some() {
            TICKET_RESOLVED
        } else {
            TICKET_PENDING
        }
    }

    fn is_live(&self, now: Instant) -> bool {
        self.expires_at > now
    }
}

/// What presenting a ticket on `/echo` yields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Collection {
    /// The ticket was resolved; it is consumed and its authorization returned.
    Authorized(String),
    Pending,
    Unknown,
}

/// Relay tickets with expiry. Expired tickets read as unknown.
pub struct TicketStore {
    tickets: DashMap<String, TicketEntry>,
    ttl: Duration,
}

impl Default for TicketStore {
    fn default() -> Self {
        Self::new(Duration::from_secs(TICKET_EXPIRY_SECS))
    }
}

impl TicketStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            tickets: DashMap::new(),
            ttl,
        }
    }

    /// Open a ticket for `challenge` and return its id. Expired tickets are
    /// swept first.
    pub fn open(&self, challenge: impl Into<String>) -> String {
        self.cleanup_expired();
        let ticket = Uuid::new_v4().to_string();
        self.tickets
            .insert(ticket.clone(), TicketEntry::pending(challenge, self.ttl));
        ticket
    }

    pub fn get(&self, ticket: &str) -> Option<TicketEntry> {
        self.drop_if_expired(ticket);
        self.tickets.get(ticket).map(|entry| entry.clone())
    }

    /// Store `authorization` on a live ticket.
    pub fn resolve(&self, ticket: &str, authorization: &str) -> Option<TicketEntry> {
        self.drop_if_expired(ticket);
        let mut entry = self.tickets.get_mut(ticket)?;
        entry.authorization = Some(authorization.to_string());
        Some(entry.clone())
    }

    pub fn collect(&self, ticket: &str) -> Collection {
        self.drop_if_expired(ticket);
        match self
            .tickets
            .remove_if(ticket, |_, entry| entry.authorization.is_some())
        {
            Some((_, entry)) => Collection::Authorized(entry.authorization.unwrap_or_default()),
            None if self.tickets.contains_key(ticket) => Collection::Pending,
            None => Collection::Unknown,
        }
    }

    fn drop_if_expired(&self, ticket: &str) {
        let now = Instant::now();
        self.tickets.remove_if(ticket, |_, entry| !entry.is_live(now));
    }

    /// Remove expired tickets
    pub fn cleanup_expired(&self) {
        let now = Instant::now();
        self.tickets.retain(|_, entry| entry.is_live(now));
    }

    /// Ids of live tickets
    pub fn ids(&self) -> Vec<String> {
        let now = Instant::now();
        self.tickets
            .iter()
            .filter(|entry| entry.is_live(now))
            .map(|entry| entry.key().clone())
            .collect()
    }

    /// Number of live tickets
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.tickets.iter().filter(|entry| entry.is_live(now)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for TicketStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TicketStore")
            .field("tickets", &self.tickets.len())
            .field("ttl", &self.ttl)
            .finish()
    }
}

/// Application state containing shared resources.
#[derive(Clone)]
pub struct AppState {
    /// Open relay tickets, keyed by ticket id
    pub tickets: Arc<TicketStore>,
    /// Outbound transport used by `/proxy`
    pub transport: Arc<dyn Transport>,
    /// Whether `/echo` opens relay tickets
    pub replay_enabled: bool,
    /// Issuer answering the test issuer routes, when enabled
    pub test_issuer: Option<&'static TestIssuer>,
}

impl AppState {
    pub fn new(transport: Arc<dyn Transport>, replay_enabled: bool) -> Self {
        Self {
            tickets: Arc::new(TicketStore::default()),
            transport,
            replay_enabled,
            test_issuer: None,
        }
    }

    /// Build state with a direct HTTP transport, generating the test issuer
    /// key if the configuration enables it.
    pub fn from_config(config: &Config) -> pepe_core::Result<Self> {
        let client = ClientConfig {
            timeout: Duration::from_secs(config.timeout_secs),
            ..ClientConfig::default()
        };
        let mut state = Self::new(Arc::new(HttpTransport::new(&client)?), config.replay_enabled)
            .with_ticket_ttl(Duration::from_secs(config.ticket_ttl_secs));
        if config.test_issuer_enabled {
            state.test_issuer = Some(TestIssuer::shared()?);
        }
        Ok(state)
    }

    /// Replace the ticket store with an empty one using `ttl`.
    pub fn with_ticket_ttl(mut self, ttl: Duration) -> Self {
        self.tickets = Arc::new(TicketStore::new(ttl));
        self
    }

    pub fn with_test_issuer(mut self, issuer: &'static TestIssuer) -> Self {
        self.test_issuer = Some(issuer);
        self
    }
}
