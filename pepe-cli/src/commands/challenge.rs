//! Challenge command implementations.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use base64::Engine;
use colored::Colorize;
use pepe_core::protocol::BASE64URL;
use pepe_core::{
    challenge, PepeError, ReplayConfig, ReplayPoller, TestIssuer, TokenType, TriggerOutcome,
};
use tracing::debug;

use crate::utils;

/// Print a header value with one challenge per `NAME=KEY` issuer.
pub fn create(
    issuers: &[String],
    origins: &[String],
    token_type: TokenType,
    test_issuer: bool,
) -> Result<()> {
    let mut pairs = Vec::with_capacity(issuers.len() + 1);
    for issuer in issuers {
        let Some((name, key)) = issuer.split_once('=') else {
            bail!("Issuer `{issuer}` must be written as NAME=KEY");
        };
        if name.is_empty() {
            bail!("Issuer `{issuer}` has an empty name");
        }
        let raw = if key.is_empty() {
            Vec::new()
        } else {
            BASE64URL
                .decode(key.trim())
                .map_err(|e| PepeError::KeyDecode(format!("invalid base64url key: {e}")))
                .with_context(|| format!("Failed to decode key for issuer {name}"))?
        };
        pairs.push((raw, name.to_string()));
    }
    if test_issuer {
        let issuer = TestIssuer::shared().context("Failed to generate test issuer key")?;
        pairs.push((issuer.public_key().raw_bytes().to_vec(), issuer.name().to_string()));
    }

    let header = challenge::create_challenge_header(token_type, &pairs, origins)?;
    if header.is_empty() {
        bail!("No issuer with a key was given");
    }
    println!("{header}");
    Ok(())
}

/// Print the challenges of a header as JSON.
pub fn parse(header: &str) -> Result<()> {
    let challenges = challenge::parse(header).context("Failed to parse challenge")?;
    debug!(count = challenges.len(), "Parsed challenges");
    println!("{}", challenge::describe(&challenges)?);
    Ok(())
}

/// Hand a challenge to the echo harness and wait for the authorization.
pub async fn trigger(
    header: &str,
    echo_url: &str,
    replay_url: Option<String>,
    max_polls: Option<u32>,
    interval_ms: u64,
) -> Result<()> {
    let relay_base = match replay_url {
        Some(url) => url,
        None => utils::origin_of(echo_url)?,
    };
    let transport = pepe_core::HttpTransport::new(&pepe_core::ClientConfig::from_env())?;
    let config = ReplayConfig {
        interval: Duration::from_millis(interval_ms),
        max_polls,
    };

    let poller = ReplayPoller::new(transport, echo_url, relay_base, config);
    match poller.trigger(header).await.context("Challenge trigger failed")? {
        TriggerOutcome::Authorized(authorization) => {
            println!("{}", "Authorized".green().bold());
            println!("Authorization: {authorization}");
        }
        TriggerOutcome::ReflectedChallenge(challenge) => {
            println!("{}", "Challenge reflected".yellow().bold());
            println!("WWW-Authenticate: {challenge}");
        }
    }
    Ok(())
}
