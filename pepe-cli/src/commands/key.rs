//! Key validate command implementation.

use anyhow::{Context, Result};
use colored::Colorize;
use tracing::info;

pub fn validate(encoded: &str) -> Result<()> {
    let key = pepe_core::decode_public_key(encoded).context("Issuer key rejected")?;
    let key_id = key.token_key_id();
    info!(key_id = %hex::encode(key_id), bytes = key.raw_bytes().len(), "Decoded issuer key");

    println!("{}", "Valid".green().bold());
    println!("   {} {}", "Key ID:".dimmed(), hex::encode(key_id));
    println!("   {} {}", "Truncated ID:".dimmed(), key_id[31]);
    println!("   {} {} bytes", "SPKI:".dimmed(), key.raw_bytes().len());
    Ok(())
}
