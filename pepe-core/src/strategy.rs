//! Per-token-type request building and finalization.

use blind_rsa_signatures::{BlindSignature, MessageRandomizer, Options, Secret};
use rand::rngs::OsRng;
use rand::RngCore;
use zeroize::Zeroizing;

use crate::challenge::TokenChallenge;
use crate::error::{PepeError, Result};
use crate::extensions::Extensions;
use crate::key::IssuerPublicKey;
use crate::protocol::TokenType;
use crate::token::{signed_message, token_input, Token, TokenRequest, TokenResponse, NONCE_LEN};

/// Closed set of issuance strategies, selected by token type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenStrategy {
    /// `0x0002`: Blind RSA over the token input.
    PlainPublicVerifiable,
    /// `0xDA7A`: Blind RSA over the token input bound to extensions.
    MetadataPublicVerifiable,
    /// Recognized, not implemented.
    PrivateVerifiable(TokenType),
}

/// Client state kept between request and finalization.
pub struct PendingToken {
    token_type: TokenType,
    nonce: [u8; NONCE_LEN],
    challenge_digest: [u8; 32],
    token_key_id: [u8; 32],
    message: Vec<u8>,
    secret: Zeroizing<Vec<u8>>,
    msg_randomizer: Option<MessageRandomizer>,
}

impl PendingToken {
    pub fn nonce(&self) -> &[u8; NONCE_LEN] {
        &self.nonce
    }

    pub fn token_key_id(&self) -> &[u8; 32] {
        &self.token_key_id
    }
}

impl TokenStrategy {
    pub fn for_token_type(token_type: TokenType) -> Self {
        match token_type {
            TokenType::Public => Self::PlainPublicVerifiable,
            TokenType::PublicMetadata => Self::MetadataPublicVerifiable,
            other => Self::PrivateVerifiable(other),
        }
    }

    pub fn requires_extensions(self) -> bool {
        matches!(self, Self::MetadataPublicVerifiable)
    }

    /// Fail on unsupported types and on missing extensions, without side effects.
    pub fn check(self, extensions: Option<&Extensions>) -> Result<()> {
        match self {
            Self::PrivateVerifiable(token_type) => {
                Err(PepeError::UnsupportedTokenType(token_type.as_u16()))
            }
            Self::MetadataPublicVerifiable if extensions.is_none() => {
                Err(PepeError::MissingExtensions(TokenType::PublicMetadata))
            }
            _ => Ok(()),
        }
    }

    /// Blind a fresh token input for `challenge`.
    pub fn build_request(
        self,
        challenge: &TokenChallenge,
        public_key: &IssuerPublicKey,
        extensions: Option<&Extensions>,
    ) -> Result<(TokenRequest, PendingToken)> {
        self.check(extensions)?;
        let token_type = challenge.token_type();
        let bound = if self.requires_extensions() {
            extensions
        } else {
            None
        };

        let mut nonce = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce);
        let challenge_digest = challenge.digest()?;
        let token_key_id = public_key.token_key_id();

        let input = token_input(token_type, &nonce, &challenge_digest, &token_key_id);
        let message = signed_message(&input, bound)?;

        let options = Options::default();
        let blinding = public_key
            .public_key()
            .blind(&mut OsRng, &message, false, &options)
            .map_err(|e| PepeError::KeyDecode(format!("failed to blind token input: {e}")))?;

        let request = TokenRequest {
            token_type,
            truncated_token_key_id: token_key_id[31],
            blinded_msg: blinding.blind_msg.0.clone(),
            extensions: bound.cloned(),
        };
        let pending = PendingToken {
            token_type,
            nonce,
            challenge_digest,
            token_key_id,
            message,
            secret: Zeroizing::new(blinding.secret.0.clone()),
            msg_randomizer: blinding.msg_randomizer,
        };
        Ok((request, pending))
    }

    /// Unblind the issuer signature into a token.
    pub fn finalize(
        self,
        pending: PendingToken,
        response: &TokenResponse,
        public_key: &IssuerPublicKey,
    ) -> Result<Token> {
        if let Self::PrivateVerifiable(token_type) = self {
            return Err(PepeError::UnsupportedTokenType(token_type.as_u16()));
        }

        let secret = Secret(pending.secret.to_vec());
        let signature = public_key
            .public_key()
            .finalize(
                &BlindSignature(response.blind_sig.clone()),
                &secret,
                pending.msg_randomizer,
                &pending.message,
                &Options::default(),
            )
            .map_err(|e| PepeError::Finalize(format!("signature finalization rejected: {e}")))?;

        Ok(Token::new(
            pending.token_type,
            pending.nonce,
            pending.challenge_digest,
            pending.token_key_id,
            signature.0.clone(),
        ))
    }
}
