//! Token, TokenRequest and TokenResponse wire formats.
//!
//! ```text
//! struct {
//!     uint16_t token_type;
//!     uint8_t nonce[32];
//!     uint8_t challenge_digest[32];
//!     uint8_t token_key_id[32];
//!     uint8_t authenticator[Nk];
//! } Token;
//! ```

use base64::Engine;
use bytes::BufMut;
use tls_codec::{Deserialize, Serialize};
use tls_codec_derive::{TlsDeserialize, TlsSerialize, TlsSize};

use crate::error::{PepeError, Result};
use crate::extensions::Extensions;
use crate::protocol::{TokenType, AUTH_SCHEME, BASE64URL};

/// `Nk` for the 2048-bit Blind RSA token types.
pub const RSA_MODULUS_BYTES: usize = 256;

/// Length of the client nonce.
pub const NONCE_LEN: usize = 32;

fn authenticator_len(token_type: TokenType) -> Result<usize> {
    match token_type {
        TokenType::Public | TokenType::PublicMetadata => Ok(RSA_MODULUS_BYTES),
        other => Err(PepeError::UnsupportedTokenType(other.as_u16())),
    }
}

#[derive(TlsSize, TlsSerialize, TlsDeserialize)]
struct TokenWire {
    token_type: u16,
    nonce: [u8; NONCE_LEN],
    challenge_digest: [u8; 32],
    token_key_id: [u8; 32],
    authenticator: [u8; RSA_MODULUS_BYTES],
}

#[derive(TlsSize, TlsSerialize, TlsDeserialize)]
struct TokenRequestWire {
    token_type: u16,
    truncated_token_key_id: u8,
    blinded_msg: [u8; RSA_MODULUS_BYTES],
}

/// Read the leading token type without consuming `bytes`.
fn peek_token_type(bytes: &[u8]) -> Result<TokenType> {
    let mut buf = bytes;
    let raw = u16::tls_deserialize(&mut buf)
        .map_err(|e| PepeError::TokenDecode(format!("truncated token_type: {e:?}")))?;
    TokenType::try_from(raw).map_err(|e| PepeError::TokenDecode(e.to_string()))
}

fn fixed<const N: usize>(bytes: &[u8], field: &str) -> Result<[u8; N]> {
    bytes.try_into().map_err(|_| {
        PepeError::TokenDecode(format!("{field} must be {N} bytes, got {}", bytes.len()))
    })
}

/// The bytes the authenticator signs (without metadata framing).
pub fn token_input(
    token_type: TokenType,
    nonce: &[u8; NONCE_LEN],
    challenge_digest: &[u8; 32],
    token_key_id: &[u8; 32],
) -> Vec<u8> {
    let mut out = Vec::with_capacity(2 + NONCE_LEN + 64);
    out.put_u16(token_type.as_u16());
    out.put_slice(nonce);
    out.put_slice(challenge_digest);
    out.put_slice(token_key_id);
    out
}

/// Message signed for a token: the token input, prefixed by the serialized
/// extensions when metadata is bound.
///
/// ```text
/// "msg" || len(info) as u32 || info || token_input
/// ```
pub fn signed_message(token_input: &[u8], extensions: Option<&Extensions>) -> Result<Vec<u8>> {
    let Some(extensions) = extensions else {
        return Ok(token_input.to_vec());
    };
    let info = extensions.serialize()?;
    let info_len = u32::try_from(info.len())
        .map_err(|_| PepeError::ExtensionDecode("extensions too long to bind".into()))?;
    let mut out = Vec::with_capacity(7 + info.len() + token_input.len());
    out.put_slice(b"msg");
    out.put_u32(info_len);
    out.put_slice(&info);
    out.put_slice(token_input);
    Ok(out)
}

/// A finalized token. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    token_type: TokenType,
    nonce: [u8; NONCE_LEN],
    challenge_digest: [u8; 32],
    token_key_id: [u8; 32],
    authenticator: Vec<u8>,
}

impl Token {
    pub fn new(
        token_type: TokenType,
        nonce: [u8; NONCE_LEN],
        challenge_digest: [u8; 32],
        token_key_id: [u8; 32],
        authenticator: Vec<u8>,
    ) -> Self {
        Self {
            token_type,
            nonce,
            challenge_digest,
            token_key_id,
            authenticator,
        }
    }

    pub fn token_type(&self) -> TokenType {
        self.token_type
    }

    pub fn nonce(&self) -> &[u8; NONCE_LEN] {
        &self.nonce
    }

    pub fn challenge_digest(&self) -> &[u8; 32] {
        &self.challenge_digest
    }

    pub fn token_key_id(&self) -> &[u8; 32] {
        &self.token_key_id
    }

    pub fn authenticator(&self) -> &[u8] {
        &self.authenticator
    }

    pub fn token_input(&self) -> Vec<u8> {
        token_input(
            self.token_type,
            &self.nonce,
            &self.challenge_digest,
            &self.token_key_id,
        )
    }

    pub fn serialize(&self) -> Result<Vec<u8>> {
        let wire = TokenWire {
            token_type: self.token_type.as_u16(),
            nonce: self.nonce,
            challenge_digest: self.challenge_digest,
            token_key_id: self.token_key_id,
            authenticator: fixed(&self.authenticator, "authenticator")?,
        };
        wire.tls_serialize_detached()
            .map_err(|e| PepeError::TokenDecode(format!("cannot encode token: {e:?}")))
    }

    pub fn deserialize(bytes: &[u8]) -> Result<Self> {
        let token_type = peek_token_type(bytes)?;
        authenticator_len(token_type)?;

        let mut buf = bytes;
        let wire = TokenWire::tls_deserialize(&mut buf)
            .map_err(|e| PepeError::TokenDecode(format!("malformed token: {e:?}")))?;
        if !buf.is_empty() {
            return Err(PepeError::TokenDecode(format!(
                "{} trailing bytes after token",
                buf.len()
            )));
        }

        Ok(Self::new(
            token_type,
            wire.nonce,
            wire.challenge_digest,
            wire.token_key_id,
            wire.authenticator.to_vec(),
        ))
    }

    /// Render as an `Authorization` header value.
    pub fn to_authorization_header(&self, extensions: Option<&Extensions>) -> Result<String> {
        let mut out = format!(
            "{AUTH_SCHEME} token={}",
            BASE64URL.encode(self.serialize()?)
        );
        if let Some(extensions) = extensions {
            out.push_str(", extensions=");
            out.push_str(&BASE64URL.encode(extensions.serialize()?));
        }
        Ok(out)
    }

    /// Parse an `Authorization: PrivateToken token=...[, extensions=...]` value.
    pub fn from_authorization_header(header: &str) -> Result<(Self, Option<Extensions>)> {
        let header = header.trim();
        let params = header
            .split_once(char::is_whitespace)
            .filter(|(scheme, _)| scheme.eq_ignore_ascii_case(AUTH_SCHEME))
            .map(|(_, params)| params)
            .ok_or_else(|| {
                PepeError::TokenDecode(format!("expected {AUTH_SCHEME} authorization"))
            })?;

        let mut token = None;
        let mut extensions = None;
        for param in params.split(',') {
            let Some((name, value)) = param.trim().split_once('=') else {
                continue;
            };
            let value = value.trim().trim_matches('"');
            match name.trim().to_ascii_lowercase().as_str() {
                "token" => token = Some(value.to_string()),
                "extensions" => extensions = Some(value.to_string()),
                _ => {}
            }
        }

        let token = token
            .ok_or_else(|| PepeError::TokenDecode("missing `token` parameter".into()))?;
        let token = BASE64URL
            .decode(token)
            .map_err(|e| PepeError::TokenDecode(format!("invalid base64url token: {e}")))?;
        let token = Self::deserialize(&token)?;

        let extensions = extensions
            .map(|value| {
                BASE64URL
                    .decode(value)
                    .map_err(|e| {
                        PepeError::ExtensionDecode(format!("invalid base64url extensions: {e}"))
                    })
                    .and_then(|bytes| Extensions::parse(&bytes))
            })
            .transpose()?;

        Ok((token, extensions))
    }
}

/// Blind token request sent to the issuer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenRequest {
    pub token_type: TokenType,
    pub truncated_token_key_id: u8,
    pub blinded_msg: Vec<u8>,
    pub extensions: Option<Extensions>,
}

impl TokenRequest {
    pub fn serialize(&self) -> Result<Vec<u8>> {
        let wire = TokenRequestWire {
            token_type: self.token_type.as_u16(),
            truncated_token_key_id: self.truncated_token_key_id,
            blinded_msg: fixed(&self.blinded_msg, "blinded_msg")?,
        };
        let mut out = wire
            .tls_serialize_detached()
            .map_err(|e| PepeError::TokenDecode(format!("cannot encode token request: {e:?}")))?;
        if let Some(extensions) = &self.extensions {
            out.extend_from_slice(&extensions.serialize()?);
        }
        Ok(out)
    }

    pub fn deserialize(bytes: &[u8]) -> Result<Self> {
        let token_type = peek_token_type(bytes)?;
        authenticator_len(token_type)?;

        let mut buf = bytes;
        let wire = TokenRequestWire::tls_deserialize(&mut buf)
            .map_err(|e| PepeError::TokenDecode(format!("malformed token request: {e:?}")))?;

        let extensions = if token_type.requires_extensions() {
            Some(Extensions::parse(buf)?)
        } else if buf.is_empty() {
            None
        } else {
            return Err(PepeError::TokenDecode(format!(
                "{} trailing bytes after request",
                buf.len()
            )));
        };

        Ok(Self {
            token_type,
            truncated_token_key_id: wire.truncated_token_key_id,
            blinded_msg: wire.blinded_msg.to_vec(),
            extensions,
        })
    }
}

/// Issuer answer to a [`TokenRequest`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenResponse {
    pub blind_sig: Vec<u8>,
}

impl TokenResponse {
    pub fn serialize(&self) -> Vec<u8> {
        self.blind_sig.clone()
    }

    /// Malformed responses surface as finalization failures.
    pub fn deserialize(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != RSA_MODULUS_BYTES {
            return Err(PepeError::Finalize(format!(
                "token response must be {RSA_MODULUS_BYTES} bytes, got {}",
                bytes.len()
            )));
        }
        Ok(Self {
            blind_sig: bytes.to_vec(),
        })
    }
}
