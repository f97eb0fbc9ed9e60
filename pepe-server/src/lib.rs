//! Pépé Server Library - local harness for Privacy Pass debugging
//!
//! Serves the echo harness, the proxy relay, the replay relay and an optional
//! test issuer. This library exposes the server components for use in
//! integration tests; the main binary uses these same components.

pub mod config;
pub mod error;
pub mod handlers;
pub mod routes;
pub mod state;

pub use config::Config;
pub use error::ApiError;
pub use routes::{create_router, create_router_with_config, create_router_with_state};
pub use state::{AppState, Collection, TicketEntry, TicketStore};
