//! Router configuration module
//!
//! Configures all routes, middleware layers, and creates the application router.

use std::{sync::Arc, time::Duration};

use axum::{
    http::{header, HeaderName, Method, StatusCode},
    routing::{get, post},
    Router,
};
use pepe_core::issuer::TOKEN_REQUEST_PATH;
use pepe_core::protocol::ISSUER_DIRECTORY_PATH;
use pepe_core::relay::RELAY_TICKET_HEADER;
use tower_governor::{governor::GovernorConfigBuilder, GovernorLayer};
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::services::ServeDir;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::handlers::{
    echo_handler, health, issuer_handler, proxy_handler, ready, resolve_ticket_handler,
    ticket_status_handler,
};
use crate::state::AppState;

/// Create the application router with default config (for testing)
pub fn create_router() -> pepe_core::Result<Router> {
    create_router_with_config(&Config::default())
}

/// Create the application router with custom configuration
pub fn create_router_with_config(config: &Config) -> pepe_core::Result<Router> {
    let state = AppState::from_config(config)?;
    Ok(create_router_with_state(config, state))
}

/// Create the application router around prepared state
pub fn create_router_with_state(config: &Config, state: AppState) -> Router {
    // The harness is read from browsers, which only see exposed headers
    let exposed: [HeaderName; 3] = [
        header::WWW_AUTHENTICATE,
        header::AUTHORIZATION,
        RELAY_TICKET_HEADER,
    ];

    // Configure CORS based on allowed_origins
    let cors = match &config.allowed_origins {
        Some(origins) if !origins.is_empty() => {
            let origins: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();
            tracing::info!("CORS: Restricting to {} origin(s)", origins.len());
            CorsLayer::new()
                .allow_origin(origins)
                .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
                .allow_headers([
                    header::CONTENT_TYPE,
                    header::ACCEPT,
                    header::AUTHORIZATION,
                    header::WWW_AUTHENTICATE,
                    RELAY_TICKET_HEADER,
                ])
                .expose_headers(exposed)
        }
        _ => {
            tracing::warn!("CORS: Allowing all origins (dev mode)");
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
                .expose_headers(exposed)
        }
    };

    // Request body limit
    let body_limit = RequestBodyLimitLayer::new(config.body_limit_mb * 1024 * 1024);

    // Request timeout
    let timeout = TimeoutLayer::with_status_code(
        StatusCode::REQUEST_TIMEOUT,
        Duration::from_secs(config.timeout_secs),
    );

    let mut router = Router::new()
        .route("/echo", post(echo_handler))
        .route("/proxy", get(proxy_handler).post(proxy_handler))
        .route(
            "/relay/{ticket}",
            get(ticket_status_handler).post(resolve_ticket_handler),
        )
        .route("/health", get(health))
        .route("/ready", get(ready));

    if state.test_issuer.is_some() {
        tracing::info!("Test issuer: mounted at {}", TOKEN_REQUEST_PATH);
        router = router
            .route(ISSUER_DIRECTORY_PATH, get(issuer_handler))
            .route(TOKEN_REQUEST_PATH, post(issuer_handler));
    }

    if let Some(dir) = &config.static_dir {
        tracing::info!("Static files: serving {}", dir.display());
        router = router.fallback_service(ServeDir::new(dir));
    }

    let router = router
        .with_state(state)
        .layer(cors)
        .layer(body_limit)
        .layer(timeout);

    // Conditionally apply rate limiting (disabled in tests, enabled in production)
    if !config.rate_limit_enabled {
        tracing::warn!("Rate limiting: DISABLED");
        return router.layer(TraceLayer::new_for_http());
    }

    let governor_conf = GovernorConfigBuilder::default()
        .per_second(config.rate_limit_per_sec)
        .burst_size(config.rate_limit_burst)
        .finish();

    match governor_conf {
        Some(governor_conf) => {
            tracing::info!(
                "Rate limiting: {} req/s (burst: {})",
                config.rate_limit_per_sec,
                config.rate_limit_burst
            );
            router
                .layer(GovernorLayer::new(Arc::new(governor_conf)))
                .layer(TraceLayer::new_for_http())
        }
        None => {
            tracing::warn!("Rate limiting: invalid configuration, DISABLED");
            router.layer(TraceLayer::new_for_http())
        }
    }
}
