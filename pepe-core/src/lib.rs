//! Pépé Core - Privacy Pass issuance debugging library
//!
//! This crate drives a Privacy Pass token through its whole life: a
//! `WWW-Authenticate` challenge is parsed, a blind token request is built and
//! relayed to an issuer, the response is finalized into a token, and the token
//! is verified the way an origin would.
//!
//! # Features
//!
//! - Challenge, extension and token codecs (RFC 9577)
//! - Blind RSA issuance for `0x0002` and metadata-bound `0xDA7A` tokens
//! - Current and legacy media type probing
//! - Proxy relay transport and replay relay polling
//! - In-process test issuer
//!
//! # Example
//!
//! ```no_run
//! use pepe_core::{challenge, IssuanceExecutor, IssuerTransport, TestIssuer, TokenType};
//!
//! # async fn example() -> pepe_core::Result<()> {
//! let issuer = TestIssuer::shared()?;
//! let key = issuer.token_key(TokenType::Public, "https://issuer.example/token-request");
//!
//! let header = challenge::create_challenge_header(
//!     TokenType::Public,
//!     &[(key.raw_key.clone(), issuer.name().to_string())],
//!     &["origin.example".to_string()],
//! )?;
//!
//! let executor = IssuanceExecutor::new(IssuerTransport::new(issuer));
//! let report = executor.run(&header, &key, None).await?;
//! println!("{}", report.primary);
//! # Ok(())
//! # }
//! ```

pub mod challenge;
pub mod directory;
pub mod error;
pub mod executor;
pub mod extensions;
pub mod issuer;
pub mod key;
pub mod protocol;
pub mod relay;
pub mod replay;
pub mod strategy;
pub mod token;
pub mod verifier;


// Re-export main types for convenience
pub use challenge::{TokenChallenge, WwwAuthenticateChallenge};
pub use directory::{fetch_directory, DirectoryReport, IssuerDirectory, IssuerTokenKey};
pub use error::{ErrorKind, PepeError, Result};
pub use executor::{AttemptState, GenerationVerdict, IssuanceExecutor, IssuanceReport};
pub use extensions::{Extension, Extensions};
pub use issuer::{IssuerTransport, TestIssuer};
pub use key::{decode_public_key, validate_public_key, IssuerPublicKey};
pub use protocol::{ProtocolGeneration, TokenType};
pub use relay::{
    build_transport, ClientConfig, HttpTransport, MockTransport, ProxyRelay, RelayRequest,
    RelayResponse, Transport,
};
pub use replay::{probe_echo, ReplayConfig, ReplayPoller, TriggerOutcome};
pub use strategy::TokenStrategy;
pub use token::Token;
pub use verifier::verify;

#[cfg(test)]
mod tests {
    use super::*;

    /// Integration test: challenge, issuance, header round trip, verification.
    #[tokio::test]
    async fn test_full_issuance_workflow() {
        let issuer = TestIssuer::shared().unwrap();
        let key = issuer.token_key(TokenType::Public, "https://issuer.example/token-request");

        let header = challenge::create_challenge_header(
            TokenType::Public,
            &[(key.raw_key.clone(), issuer.name().to_string())],
            &["origin.example".to_string()],
        )
        .unwrap();

        let executor = IssuanceExecutor::new(IssuerTransport::new(issuer));
        let report = executor.run(&header, &key, None).await.unwrap();
        assert!(report.primary.valid());

        let (token, _) = Token::from_authorization_header(&report.authorization_header().unwrap()).unwrap();
        assert_eq!(token.challenge_digest(), &report.challenge.challenge.digest().unwrap());
        assert!(verify(&token, issuer.public_key(), None).unwrap());
    }
}
