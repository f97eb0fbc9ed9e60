//! Issue command implementation.

use anyhow::{bail, Context, Result};
use base64::Engine;
use colored::Colorize;
use pepe_core::issuer::TOKEN_REQUEST_PATH;
use pepe_core::protocol::BASE64URL;
use pepe_core::{
    challenge, Extensions, GenerationVerdict, IssuanceExecutor, IssuanceReport, IssuerTokenKey,
    IssuerTransport, PepeError, TestIssuer, TokenType, Transport,
};
use tracing::info;
use url::Url;

use crate::utils;

/// Run the first challenge of `header` against a remote issuer.
pub async fn execute(
    header: &str,
    issuer_url: &str,
    key: Option<&str>,
    extensions: Option<&Extensions>,
    relay: Option<String>,
) -> Result<()> {
    let challenges = challenge::parse(header).context("Failed to parse challenge")?;
    let Some(first) = challenges.first() else {
        bail!(PepeError::ChallengeParse("header carries no challenge".into()));
    };

    let raw_key = match key {
        Some(encoded) => pepe_core::decode_public_key(encoded)
            .context("Failed to decode issuer key")?
            .raw_bytes()
            .to_vec(),
        None => first.token_key.clone(),
    };
    let parsed = Url::parse(issuer_url)
        .with_context(|| format!("Invalid issuer URL: {issuer_url}"))?;
    let issuer = IssuerTokenKey {
        token_type: first.challenge.token_type(),
        raw_key,
        issuer_request_uri: issuer_url.to_string(),
        issuer_host: parsed.host_str().unwrap_or_default().to_string(),
    };

    let config = utils::client_config(relay);
    if let Some(relay) = &config.relay_url {
        info!(relay = %relay, "Routing issuer traffic through relay");
    }
    let transport = pepe_core::build_transport(&config)?;

    run(transport, &challenges, &issuer, extensions).await
}

/// Run a fresh challenge against the built-in test issuer.
pub async fn execute_test_issuer(
    token_type: TokenType,
    extensions: Option<&Extensions>,
) -> Result<()> {
    let issuer = TestIssuer::shared().context("Failed to generate test issuer key")?;
    let request_url = format!("https://{}{}", issuer.name(), TOKEN_REQUEST_PATH);
    let key = issuer.token_key(token_type, &request_url);
    let header = challenge::create_challenge_header(
        token_type,
        &[(key.raw_key.clone(), issuer.name().to_string())],
        &["localhost".to_string()],
    )?;
    let challenges = challenge::parse(&header)?;

    run(IssuerTransport::new(issuer), &challenges, &key, extensions).await
}

async fn run<T: Transport>(
    transport: T,
    challenges: &[pepe_core::WwwAuthenticateChallenge],
    issuer: &IssuerTokenKey,
    extensions: Option<&Extensions>,
) -> Result<()> {
    let executor = IssuanceExecutor::new(transport);
    let report = executor
        .run_first(challenges, issuer, extensions)
        .await
        .context("Issuance failed")?;

    print_report(&report)?;

    if !report.primary.valid() {
        bail!("Token verification failed");
    }
    Ok(())
}

fn print_verdict(verdict: &GenerationVerdict) {
    let line = verdict.to_string();
    if verdict.valid() {
        println!("   {}", line.green());
    } else {
        println!("   {}", line.red().bold());
        if !verdict.content_type_matched {
            println!("     {}", "response Content-Type did not match".dimmed());
        }
    }
}

fn print_report(report: &IssuanceReport) -> Result<()> {
    let challenge = &report.challenge.challenge;
    println!(
        "{} {} ({})",
        "Issuer:".dimmed(),
        challenge.issuer_name(),
        challenge.token_type()
    );
    println!(
        "{} {}",
        "Token key ID:".dimmed(),
        hex::encode(report.token.token_key_id())
    );

    print_verdict(&report.primary);
    match &report.legacy {
        Some(verdict) => print_verdict(verdict),
        None => println!("   {}", "Legacy probe failed".yellow()),
    }

    println!();
    println!("Token key: {}", BASE64URL.encode(&report.challenge.token_key));
    println!("Authorization: {}", report.authorization_header()?);
    Ok(())
}
