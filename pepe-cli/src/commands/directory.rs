//! Directory command implementation.

use anyhow::{Context, Result};
use colored::Colorize;

use crate::utils;

pub async fn execute(url: &str, json: bool, relay: Option<String>) -> Result<()> {
    let url = utils::directory_url(url)?;
    let config = utils::client_config(relay);
    let transport = pepe_core::build_transport(&config)?;

    let report = pepe_core::fetch_directory(&transport, &url, &config)
        .await
        .with_context(|| format!("Failed to fetch issuer directory from {url}"))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report.directory)?);
        return Ok(());
    }

    let content_type = report.content_type.as_deref().unwrap_or("<none>");
    if report.content_type_matched {
        println!("{} {}", "Content-Type:".dimmed(), content_type.green());
    } else {
        println!("{} {}", "Content-Type:".dimmed(), content_type.red());
    }
    println!(
        "{} {}",
        "Request URI:".dimmed(),
        report.directory.issuer_request_uri
    );
    println!(
        "{} {} listed, {} usable",
        "Keys:".dimmed(),
        report.directory.token_keys.len(),
        report.keys.len()
    );

    for key in &report.keys {
        let status = match key.public_key() {
            Ok(public_key) => format!("Valid, key ID {}", hex::encode(public_key.token_key_id()))
                .green()
                .to_string(),
            Err(e) => e.to_string().red().to_string(),
        };
        println!("   {} {}", key.token_type, status);
        println!("     {} {}", "POST".dimmed(), key.request_url());
    }
    Ok(())
}
