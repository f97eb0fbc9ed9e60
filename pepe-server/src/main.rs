//! Pépé Server - local harness for Privacy Pass debugging
//!
//! - POST /echo - Reflect authentication headers, opening relay tickets
//! - GET|POST /proxy?target=<url> - Relay a request upstream
//! - GET|POST /relay/{ticket} - Poll or resolve a relay ticket
//! - GET /health, GET /ready

use std::net::SocketAddr;

use pepe_server::{create_router_with_config, Config};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    if let Err(e) = run(Config::from_env()).await {
        error!(error = %e, "Server failed");
        std::process::exit(1);
    }
}

async fn run(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let addr = config.socket_addr();
    let app = create_router_with_config(&config)?;

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(
        addr = %addr,
        replay = config.replay_enabled,
        test_issuer = config.test_issuer_enabled,
        "Pépé debug server listening"
    );

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
