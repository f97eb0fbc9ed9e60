//! Issuance flow: challenge to verified token.
//!
//! Each attempt walks `Built → Sent → ResponseReceived → Finalized → Verified`;
//! any error aborts the attempt. After a successful attempt with the current
//! media types, the same issuer is probed again with the legacy ones. The
//! probe is diagnostic: its failures are logged and dropped.

use std::fmt;

use reqwest::header::{HeaderValue, ACCEPT, CONTENT_TYPE};
use sha2::{Digest, Sha256};
use tracing::{debug, info, instrument, warn};

use crate::challenge::{self, WwwAuthenticateChallenge};
use crate::directory::IssuerTokenKey;
use crate::error::{PepeError, Result};
use crate::extensions::Extensions;
use crate::key::IssuerPublicKey;
use crate::protocol::ProtocolGeneration;
use crate::relay::{RelayRequest, Transport};
use crate::strategy::TokenStrategy;
use crate::token::{Token, TokenResponse};
use crate::verifier;

/// Steps of one issuance attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptState {
    Built,
    Sent,
    ResponseReceived,
    Finalized,
    Verified,
}

impl fmt::Display for AttemptState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Built => "built",
            Self::Sent => "sent",
            Self::ResponseReceived => "response_received",
            Self::Finalized => "finalized",
            Self::Verified => "verified",
        };
        f.write_str(name)
    }
}

/// Outcome of one protocol generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationVerdict {
    pub generation: ProtocolGeneration,
    pub signature_valid: bool,
    pub content_type_matched: bool,
}

impl GenerationVerdict {
    /// Valid only if the signature verified and the response was labelled correctly.
    pub fn valid(&self) -> bool {
        self.signature_valid && self.content_type_matched
    }
}

impl fmt::Display for GenerationVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} Valid: {}", self.generation, self.valid())
    }
}

/// Result of running one challenge.
#[derive(Debug, Clone)]
pub struct IssuanceReport {
    pub challenge: WwwAuthenticateChallenge,
    pub token: Token,
    pub extensions: Option<Extensions>,
    pub primary: GenerationVerdict,
    /// Absent when the legacy probe failed.
    pub legacy: Option<GenerationVerdict>,
}

impl IssuanceReport {
    /// `Authorization` header value for the primary token.
    pub fn authorization_header(&self) -> Result<String> {
        self.token.to_authorization_header(self.extensions.as_ref())
    }

    /// One line per generation that completed.
    pub fn messages(&self) -> Vec<String> {
        std::iter::once(&self.primary)
            .chain(self.legacy.as_ref())
            .map(ToString::to_string)
            .collect()
    }
}

struct Attempt {
    token: Token,
    verdict: GenerationVerdict,
}

/// Drives issuance against one issuer through a [`Transport`].
pub struct IssuanceExecutor<T> {
    transport: T,
}

impl<T: Transport> IssuanceExecutor<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Parse `header` and run its first challenge.
    pub async fn run(
        &self,
        header: &str,
        issuer: &IssuerTokenKey,
        extensions: Option<&Extensions>,
    ) -> Result<IssuanceReport> {
        let challenges = challenge::parse(header)?;
        self.run_first(&challenges, issuer, extensions).await
    }

    /// Run the first challenge of an already parsed set.
    ///
    /// Later challenges are left for the caller to submit individually.
    pub async fn run_first(
        &self,
        challenges: &[WwwAuthenticateChallenge],
        issuer: &IssuerTokenKey,
        extensions: Option<&Extensions>,
    ) -> Result<IssuanceReport> {
        let first = challenges
            .first()
            .ok_or_else(|| PepeError::ChallengeParse("no challenge to process".into()))?;
        if challenges.len() > 1 {
            debug!(
                skipped = challenges.len() - 1,
                "Processing first challenge only"
            );
        }
        self.run_challenge(first, issuer, extensions).await
    }

    #[instrument(skip_all, fields(token_type = %challenge.challenge.token_type(), issuer = %challenge.challenge.issuer_name()))]
    pub async fn run_challenge(
        &self,
        challenge: &WwwAuthenticateChallenge,
        issuer: &IssuerTokenKey,
        extensions: Option<&Extensions>,
    ) -> Result<IssuanceReport> {
        let strategy = TokenStrategy::for_token_type(challenge.challenge.token_type());
        strategy.check(extensions)?;
        let challenge_key_id = challenge.token_key_id();
        let expected_key_id = issuer_key_id(issuer);
        if challenge_key_id != expected_key_id {
            return Err(PepeError::Finalize(format!(
                "challenge token-key {} does not match issuer key digest {}",
                hex::encode(challenge_key_id),
                hex::encode(expected_key_id)
            )));
        }
        let public_key = issuer.public_key()?;
        let extensions = if strategy.requires_extensions() {
            extensions
        } else {
            None
        };

        let primary = self
            .attempt(
                ProtocolGeneration::Current,
                strategy,
                challenge,
                issuer,
                &public_key,
                extensions,
            )
            .await?;
        info!(verdict = %primary.verdict, "Primary generation completed");

        let legacy = match self
            .probe_legacy(strategy, challenge, issuer, &public_key, extensions)
            .await
        {
            Ok(verdict) => Some(verdict),
            Err(e) => {
                warn!(error = %e, "Legacy generation probe failed");
                None
            }
        };

        Ok(IssuanceReport {
            challenge: challenge.clone(),
            token: primary.token,
            extensions: extensions.cloned(),
            primary: primary.verdict,
            legacy,
        })
    }

    /// Repeat the attempt with legacy media types against the same endpoint.
    pub async fn probe_legacy(
        &self,
        strategy: TokenStrategy,
        challenge: &WwwAuthenticateChallenge,
        issuer: &IssuerTokenKey,
        public_key: &IssuerPublicKey,
        extensions: Option<&Extensions>,
    ) -> Result<GenerationVerdict> {
        self.attempt(
            ProtocolGeneration::Legacy,
            strategy,
            challenge,
            issuer,
            public_key,
            extensions,
        )
        .await
        .map(|attempt| attempt.verdict)
    }

    async fn attempt(
        &self,
        generation: ProtocolGeneration,
        strategy: TokenStrategy,
        challenge: &WwwAuthenticateChallenge,
        issuer: &IssuerTokenKey,
        public_key: &IssuerPublicKey,
        extensions: Option<&Extensions>,
    ) -> Result<Attempt> {
        let (request, pending) =
            strategy.build_request(&challenge.challenge, public_key, extensions)?;
        debug!(state = %AttemptState::Built, %generation, "Attempt transition");

        let url = issuer.request_url();
        let outbound = RelayRequest::post(&url)
            .header(
                CONTENT_TYPE,
                HeaderValue::from_static(generation.request_media_type()),
            )
            .header(
                ACCEPT,
                HeaderValue::from_static(generation.response_media_type()),
            )
            .body(request.serialize()?);
        let response = self.transport.send(outbound).await.map_err(|e| match e {
            PepeError::Network(_) | PepeError::HttpError(_) => e,
            other => PepeError::Network(other.to_string()),
        })?;
        debug!(state = %AttemptState::Sent, %generation, status = response.status, "Attempt transition");

        if !response.is_success() {
            return Err(PepeError::Network(format!(
                "issuer at {url} returned status {}",
                response.status
            )));
        }

        let content_type_matched = response.content_type_is(generation.response_media_type());
        if !content_type_matched {
            warn!(
                %generation,
                content_type = response.header_value(CONTENT_TYPE).unwrap_or("<none>"),
                expected = generation.response_media_type(),
                "Token response content type mismatch"
            );
        }
        let token_response = TokenResponse::deserialize(&response.body)?;
        debug!(state = %AttemptState::ResponseReceived, %generation, "Attempt transition");

        let token = strategy.finalize(pending, &token_response, public_key)?;
        let expected_key_id = issuer_key_id(issuer);
        if token.token_key_id() != &expected_key_id {
            return Err(PepeError::Finalize(format!(
                "token key id {} does not match issuer key digest {}",
                hex::encode(token.token_key_id()),
                hex::encode(expected_key_id)
            )));
        }
        debug!(state = %AttemptState::Finalized, %generation, "Attempt transition");

        let signature_valid = verifier::verify(&token, public_key, extensions)?;
        let verdict = GenerationVerdict {
            generation,
            signature_valid,
            content_type_matched,
        };
        debug!(state = %AttemptState::Verified, %generation, valid = verdict.valid(), "Attempt transition");

        Ok(Attempt { token, verdict })
    }
}

fn issuer_key_id(issuer: &IssuerTokenKey) -> [u8; 32] {
    Sha256::digest(&issuer.raw_key).into()
}
