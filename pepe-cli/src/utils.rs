//! Common utility functions shared across CLI commands.

use anyhow::{bail, Context, Result};
use pepe_core::protocol::ISSUER_DIRECTORY_PATH;
use pepe_core::{ClientConfig, Extensions, TokenType};
use tracing_subscriber::EnvFilter;
use url::Url;

/// Echo endpoint of a locally running `pepe-server`.
pub const DEFAULT_ECHO_URL: &str = "http://localhost:8787/echo";

/// Log to stderr so stdout stays machine-readable.
pub fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Parse a token type given as decimal or `0x` hex.
pub fn parse_token_type(value: &str) -> std::result::Result<TokenType, String> {
    let value = value.trim();
    let raw = match value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
    {
        Some(hex) => u16::from_str_radix(hex, 16),
        None => value.parse::<u16>(),
    }
    .map_err(|_| format!("`{value}` is not a token type"))?;
    TokenType::try_from(raw).map_err(|e| e.to_string())
}

/// Collect `TYPE:HEX` arguments; `None` when none were given.
pub fn parse_extensions(args: &[String]) -> Result<Option<Extensions>> {
    if args.is_empty() {
        return Ok(None);
    }
    let mut slots = Vec::with_capacity(args.len());
    for arg in args {
        let Some((ty, data)) = arg.split_once(':') else {
            bail!("Extension `{arg}` must be written as TYPE:HEX");
        };
        slots.push((ty, data));
    }
    let extensions = Extensions::from_sparse(&slots).context("Failed to parse extensions")?;
    Ok((!extensions.is_empty()).then_some(extensions))
}

/// Client configuration from the environment, with `--relay` taking precedence.
pub fn client_config(relay: Option<String>) -> ClientConfig {
    let config = ClientConfig::from_env();
    match relay {
        Some(relay) => config.with_relay(relay),
        None => config,
    }
}

/// Append the well-known directory path to a bare issuer origin.
pub fn directory_url(input: &str) -> Result<String> {
    let mut url = Url::parse(input).with_context(|| format!("Invalid directory URL: {input}"))?;
    if url.path() == "/" || url.path().is_empty() {
        url.set_path(ISSUER_DIRECTORY_PATH);
    }
    Ok(url.to_string())
}

/// Origin of `url`, the default base for replay relay status queries.
pub fn origin_of(url: &str) -> Result<String> {
    let parsed = Url::parse(url).with_context(|| format!("Invalid URL: {url}"))?;
    Ok(parsed.origin().ascii_serialization())
}
