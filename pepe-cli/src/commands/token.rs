//! Token parse command implementation.

use anyhow::{bail, Context, Result};
use colored::Colorize;
use pepe_core::Token;

pub fn parse(authorization: &str, key: Option<&str>) -> Result<()> {
    let (token, extensions) =
        Token::from_authorization_header(authorization).context("Failed to parse token")?;

    println!("{} {}", "Token type:".dimmed(), token.token_type());
    println!("{} {}", "Nonce:".dimmed(), hex::encode(token.nonce()));
    println!(
        "{} {}",
        "Challenge digest:".dimmed(),
        hex::encode(token.challenge_digest())
    );
    println!(
        "{} {}",
        "Token key ID:".dimmed(),
        hex::encode(token.token_key_id())
    );
    println!(
        "{} {} bytes",
        "Authenticator:".dimmed(),
        token.authenticator().len()
    );
    if let Some(extensions) = &extensions {
        for ext in extensions.iter() {
            println!(
                "{} {:#06x} = {}",
                "Extension:".dimmed(),
                ext.extension_type,
                hex::encode(&ext.extension_data)
            );
        }
    }

    let Some(key) = key else {
        return Ok(());
    };
    let key = pepe_core::decode_public_key(key).context("Failed to decode issuer key")?;
    let valid = pepe_core::verify(&token, &key, extensions.as_ref())?;
    println!();
    if valid {
        println!("{}", "Valid: true".green().bold());
        Ok(())
    } else {
        println!("{}", "Valid: false".red().bold());
        bail!("Token verification failed")
    }
}
