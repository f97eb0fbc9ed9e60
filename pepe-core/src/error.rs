use thiserror::Error;

use crate::protocol::TokenType;

#[derive(Error, Debug)]
pub enum PepeError {
    #[error("Challenge parse error: {0}")]
    ChallengeParse(String),

    #[error("Key decode error: {0}")]
    KeyDecode(String),

    #[error("Extension decode error: {0}")]
    ExtensionDecode(String),

    #[error("Token decode error: {0}")]
    TokenDecode(String),

    #[error("Unsupported token type {0:#06x}: private verifiable tokens are not implemented")]
    UnsupportedTokenType(u16),

    #[error("Token type {0} requires extensions but none were supplied")]
    MissingExtensions(TokenType),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Finalize error: {0}")]
    Finalize(String),

    #[error("Challenge trigger failed with status {status}: no WWW-Authenticate header in response")]
    ChallengeTrigger { status: u16 },

    #[error("Relay ticket {ticket} still pending after {polls} polls")]
    ReplayTimeout { ticket: String, polls: u32 },

    #[error("Issuer directory error: {0}")]
    Directory(String),

    #[error("HTTP request error: {0}")]
    HttpError(#[from] reqwest::Error),
}

/// Coarse classification of [`PepeError`], used by callers that report
/// failures (exit codes, API status codes) rather than inspect them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    ChallengeParse,
    KeyDecode,
    UnsupportedTokenType,
    MissingExtension,
    Network,
    Finalize,
    ChallengeTrigger,
}

impl PepeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ChallengeParse(_) | Self::ExtensionDecode(_) | Self::TokenDecode(_) => {
                ErrorKind::ChallengeParse
            }
            Self::KeyDecode(_) => ErrorKind::KeyDecode,
            Self::UnsupportedTokenType(_) => ErrorKind::UnsupportedTokenType,
            Self::MissingExtensions(_) => ErrorKind::MissingExtension,
            Self::Network(_)
            | Self::HttpError(_)
            | Self::ReplayTimeout { .. }
            | Self::Directory(_) => ErrorKind::Network,
            Self::Finalize(_) => ErrorKind::Finalize,
            Self::ChallengeTrigger { .. } => ErrorKind::ChallengeTrigger,
        }
    }
}

pub type Result<T> = std::result::Result<T, PepeError>;
