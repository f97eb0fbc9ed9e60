//! Example showing the tracing output of one issuance attempt.
//!
//! Run with: cargo run -p pepe-core --example issuance_tracing

use pepe_core::{challenge, IssuanceExecutor, IssuerTransport, TestIssuer, TokenType};
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() {
    fmt()
        .with_env_filter(EnvFilter::new("pepe_core=debug,info"))
        .with_target(true)
        .with_thread_ids(false)
        .init();

    println!("=== Issuance Tracing Demo ===\n");

    let issuer = match TestIssuer::shared() {
        Ok(issuer) => issuer,
        Err(e) => {
            eprintln!("Failed to generate issuer key: {}", e);
            return;
        }
    };
    let key = issuer.token_key(TokenType::Public, "https://issuer.example/token-request");
    let header = match challenge::create_challenge_header(
        TokenType::Public,
        &[(key.raw_key.clone(), issuer.name().to_string())],
        &["origin.example".to_string()],
    ) {
        Ok(header) => header,
        Err(e) => {
            eprintln!("Failed to build challenge: {}", e);
            return;
        }
    };
    println!("WWW-Authenticate: {}\n", header);

    let executor = IssuanceExecutor::new(IssuerTransport::new(issuer));
    match executor.run(&header, &key, None).await {
        Ok(report) => {
            println!();
            for line in report.messages() {
                println!("   {}", line);
            }
            match report.authorization_header() {
                Ok(value) => println!("   Authorization: {}", value),
                Err(e) => println!("   Authorization unavailable: {}", e),
            }
        }
        Err(e) => println!("\nFailed: {} ({:?})", e, e.kind()),
    }
}
