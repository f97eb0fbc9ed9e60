//! Probe command implementation.

use anyhow::{bail, Result};
use colored::Colorize;

pub async fn execute(echo_url: &str) -> Result<()> {
    // The echo harness is local; it is never reached through a relay.
    let transport = pepe_core::HttpTransport::new(&pepe_core::ClientConfig::from_env())?;

    if pepe_core::probe_echo(&transport, echo_url).await {
        println!("{} {}", "Echo harness available:".green(), echo_url);
        Ok(())
    } else {
        println!("{} {}", "Echo harness unavailable:".red(), echo_url);
        bail!(pepe_core::PepeError::Network(format!(
            "echo harness at {echo_url} did not reflect the probe header"
        )))
    }
}
