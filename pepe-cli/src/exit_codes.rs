//! Exit codes following sysexits.h conventions.
//!
//! Scripts driving the harness can tell a malformed challenge from an
//! unreachable issuer without parsing stderr.

use pepe_core::{ErrorKind, PepeError};

/// Successful execution.
pub const SUCCESS: i32 = 0;

/// General error (catch-all).
pub const GENERAL_ERROR: i32 = 1;

/// Command line usage error, including a metadata token type requested
/// without extensions.
/// Maps to EX_USAGE from sysexits.h.
pub const USAGE_ERROR: i32 = 64;

/// Data format error (malformed challenge or key, failed verification).
/// Maps to EX_DATAERR from sysexits.h.
pub const DATA_ERROR: i32 = 65;

/// Cannot open input file.
/// Maps to EX_NOINPUT from sysexits.h.
pub const INPUT_ERROR: i32 = 66;

/// Service unavailable (issuer, relay, echo harness).
/// Maps to EX_UNAVAILABLE from sysexits.h.
pub const NETWORK_ERROR: i32 = 69;

/// I/O error.
/// Maps to EX_IOERR from sysexits.h.
pub const IO_ERROR: i32 = 74;

/// Represents an exit code with optional error context.
pub struct ExitCode {
    pub code: i32,
    pub message: Option<String>,
}

impl ExitCode {
    pub const fn success() -> Self {
        Self {
            code: SUCCESS,
            message: None,
        }
    }

    pub fn from_anyhow(err: &anyhow::Error) -> Self {
        let message = format!("{err:#}");

        let core_error = err.chain().find_map(|e| e.downcast_ref::<PepeError>());
        let io_error = err.chain().find_map(|e| e.downcast_ref::<std::io::Error>());

        let code = match (core_error, io_error) {
            (Some(e), _) => code_for_kind(e.kind()),
            (None, Some(e)) if e.kind() == std::io::ErrorKind::NotFound => INPUT_ERROR,
            (None, Some(_)) => IO_ERROR,
            (None, None) if message.contains("verification failed") => DATA_ERROR,
            (None, None) => GENERAL_ERROR,
        };

        Self {
            code,
            message: Some(message),
        }
    }
}

pub fn code_for_kind(kind: ErrorKind) -> i32 {
    match kind {
        ErrorKind::ChallengeParse
        | ErrorKind::KeyDecode
        | ErrorKind::UnsupportedTokenType
        | ErrorKind::Finalize => DATA_ERROR,
        ErrorKind::MissingExtension => USAGE_ERROR,
        ErrorKind::Network | ErrorKind::ChallengeTrigger => NETWORK_ERROR,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn test_core_errors_found_through_context() {
        let err = Err::<(), _>(PepeError::KeyDecode("bad".into()))
            .context("Failed to decode issuer key")
            .unwrap_err();
        let exit = ExitCode::from_anyhow(&err);
        assert_eq!(exit.code, DATA_ERROR);
        assert!(exit.message.unwrap().contains("Failed to decode issuer key"));
    }

    #[test]
    fn test_kind_mapping() {
        assert_eq!(code_for_kind(ErrorKind::MissingExtension), USAGE_ERROR);
        assert_eq!(code_for_kind(ErrorKind::ChallengeTrigger), NETWORK_ERROR);
        assert_eq!(code_for_kind(ErrorKind::Finalize), DATA_ERROR);
    }

    #[test]
    fn test_fallbacks() {
        let err = anyhow::anyhow!("Token verification failed");
        assert_eq!(ExitCode::from_anyhow(&err).code, DATA_ERROR);
        let err = anyhow::anyhow!("something else");
        assert_eq!(ExitCode::from_anyhow(&err).code, GENERAL_ERROR);
        assert_eq!(ExitCode::success().code, SUCCESS);
    }
}
