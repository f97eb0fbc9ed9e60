//! Pépé CLI - Privacy Pass issuance debugging tool.

use anyhow::Result;
use clap::{Parser, Subcommand};
use pepe_core::TokenType;

mod commands;
mod exit_codes;
mod utils;

use exit_codes::ExitCode;

const EXIT_CODES_HELP: &str = "\
Exit codes:
  0   Success
  1   General error
  64  Usage error (metadata token type without extensions)
  65  Data error (malformed challenge, key or token; failed verification)
  66  Input not found
  69  Service unavailable (issuer, relay or echo harness)
  74  I/O error";

#[derive(Parser)]
#[command(name = "pepe")]
#[command(author, version, about = "Privacy Pass issuance debugger", long_about = None)]
#[command(after_help = EXIT_CODES_HELP)]
struct Cli {
    /// Route issuer traffic through a proxy relay (overrides PEPE_RELAY_URL)
    #[arg(long, global = true, value_name = "URL")]
    relay: Option<String>,

    /// Enable debug logging on stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Inspect issuer public keys
    Key {
        #[command(subcommand)]
        command: KeyCommands,
    },

    /// Fetch and check an issuer directory
    Directory {
        /// Directory URL or issuer origin (the well-known path is appended to bare origins)
        #[arg(value_name = "URL")]
        url: String,

        /// Print the raw directory document as JSON
        #[arg(long)]
        json: bool,
    },

    /// Create, parse and trigger WWW-Authenticate challenges
    Challenge {
        #[command(subcommand)]
        command: ChallengeCommands,
    },

    /// Run one issuance: request, finalize, verify, then probe the legacy media types
    Issue {
        /// WWW-Authenticate header value; only the first challenge is used
        #[arg(long, value_name = "HEADER", required_unless_present = "test_issuer")]
        challenge: Option<String>,

        /// Issuer request URL (token requests are POSTed here)
        #[arg(long, value_name = "URL", required_unless_present = "test_issuer")]
        issuer_url: Option<String>,

        /// base64url issuer key; defaults to the challenge's token-key
        #[arg(long, value_name = "KEY")]
        key: Option<String>,

        /// Extension as TYPE:HEX (repeatable), required for 0xda7a tokens
        #[arg(long = "extension", value_name = "TYPE:HEX")]
        extensions: Vec<String>,

        /// Issue against the built-in test issuer without touching the network
        #[arg(long, conflicts_with_all = ["challenge", "issuer_url", "key"])]
        test_issuer: bool,

        /// Token type for --test-issuer challenges
        #[arg(long, default_value = "2", value_parser = utils::parse_token_type)]
        token_type: TokenType,
    },

    /// Decode PrivateToken credentials
    Token {
        #[command(subcommand)]
        command: TokenCommands,
    },

    /// Check whether the local echo harness is reachable
    Probe {
        /// Echo endpoint URL
        #[arg(long, default_value = utils::DEFAULT_ECHO_URL)]
        echo: String,
    },
}

#[derive(Subcommand)]
enum KeyCommands {
    /// Decode a base64url token-key and report whether it is usable
    Validate {
        #[arg(value_name = "KEY")]
        key: String,
    },
}

#[derive(Subcommand)]
enum ChallengeCommands {
    /// Build a WWW-Authenticate header, one challenge per issuer
    Create {
        /// Issuer as NAME=KEY (repeatable)
        #[arg(long = "issuer", value_name = "NAME=KEY")]
        issuers: Vec<String>,

        /// Origin allowed to redeem (repeatable)
        #[arg(long = "origin", value_name = "HOST")]
        origins: Vec<String>,

        /// Token type
        #[arg(long, default_value = "2", value_parser = utils::parse_token_type)]
        token_type: TokenType,

        /// Add a challenge for the built-in test issuer
        #[arg(long)]
        test_issuer: bool,
    },

    /// Parse a WWW-Authenticate header and print its challenges as JSON
    Parse {
        #[arg(value_name = "HEADER")]
        header: String,
    },

    /// Send a challenge to the echo harness and wait for an authorization
    Trigger {
        #[arg(value_name = "HEADER")]
        header: String,

        /// Echo endpoint URL
        #[arg(long, default_value = utils::DEFAULT_ECHO_URL)]
        echo: String,

        /// Base URL of the replay relay; defaults to the echo endpoint's origin
        #[arg(long, value_name = "URL")]
        replay_url: Option<String>,

        /// Ticket status queries before giving up
        #[arg(long, default_value_t = 300, conflicts_with = "unbounded")]
        max_polls: u32,

        /// Poll until the ticket resolves
        #[arg(long)]
        unbounded: bool,

        /// Delay between status queries, in milliseconds
        #[arg(long, default_value_t = 100)]
        interval_ms: u64,
    },
}

#[derive(Subcommand)]
enum TokenCommands {
    /// Decode an Authorization header value and optionally verify it
    Parse {
        #[arg(value_name = "AUTHORIZATION")]
        authorization: String,

        /// base64url issuer key to verify against
        #[arg(long, value_name = "KEY")]
        key: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    utils::init_tracing(cli.verbose);

    let exit = match run(cli).await {
        Ok(()) => ExitCode::success(),
        Err(err) => ExitCode::from_anyhow(&err),
    };

    if let Some(message) = &exit.message {
        eprintln!("Error: {message}");
    }
    std::process::exit(exit.code);
}

async fn run(cli: Cli) -> Result<()> {
    let relay = cli.relay;

    match cli.command {
        Commands::Key {
            command: KeyCommands::Validate { key },
        } => commands::key::validate(&key),
        Commands::Directory { url, json } => {
            commands::directory::execute(&url, json, relay).await
        }
        Commands::Challenge { command } => match command {
            ChallengeCommands::Create {
                issuers,
                origins,
                token_type,
                test_issuer,
            } => commands::challenge::create(&issuers, &origins, token_type, test_issuer),
            ChallengeCommands::Parse { header } => commands::challenge::parse(&header),
            ChallengeCommands::Trigger {
                header,
                echo,
                replay_url,
                max_polls,
                unbounded,
                interval_ms,
            } => {
                let polls = (!unbounded).then_some(max_polls);
                commands::challenge::trigger(&header, &echo, replay_url, polls, interval_ms).await
            }
        },
        Commands::Issue {
            challenge,
            issuer_url,
            key,
            extensions,
            test_issuer,
            token_type,
        } => {
            let extensions = utils::parse_extensions(&extensions)?;
            if test_issuer {
                commands::issue::execute_test_issuer(token_type, extensions.as_ref()).await
            } else {
                commands::issue::execute(
                    challenge.as_deref().unwrap_or_default(),
                    issuer_url.as_deref().unwrap_or_default(),
                    key.as_deref(),
                    extensions.as_ref(),
                    relay,
                )
                .await
            }
        }
        Commands::Token {
            command: TokenCommands::Parse { authorization, key },
        } => commands::token::parse(&authorization, key.as_deref()),
        Commands::Probe { echo } => commands::probe::execute(&echo).await,
    }
}
