//! Issuer public key transcoding.
//!
//! Issuers publish their keys as base64url-encoded SubjectPublicKeyInfo using
//! the RSASSA-PSS algorithm identifier. Verification needs the key as a Blind
//! RSA public key; both directions go through `blind-rsa-signatures`.

use base64::Engine;
use blind_rsa_signatures::{Options, PublicKey};
use sha2::{Digest, Sha256};

use crate::error::{PepeError, Result};
use crate::protocol::BASE64URL;

/// An issuer public key usable for blinding and verification.
///
/// Keeps the exact SPKI bytes it was decoded from, since the token key ID is
/// a digest over those bytes rather than over a re-encoding.
#[derive(Clone, Debug)]
pub struct IssuerPublicKey {
    key: PublicKey,
    spki: Vec<u8>,
}

impl IssuerPublicKey {
    /// Decode SPKI DER bytes.
    pub fn from_spki(spki: &[u8]) -> Result<Self> {
        let key = PublicKey::from_spki(spki, Some(&Options::default()))
            .map_err(|e| PepeError::KeyDecode(format!("invalid SPKI key: {e}")))?;
        Ok(Self {
            key,
            spki: spki.to_vec(),
        })
    }

    /// Wrap a Blind RSA public key, encoding it the way issuers publish it.
    pub fn from_public_key(key: PublicKey) -> Result<Self> {
        let spki = key
            .to_spki(Some(&Options::default()))
            .map_err(|e| PepeError::KeyDecode(format!("failed to encode SPKI: {e}")))?;
        Ok(Self { key, spki })
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.key
    }

    /// The raw key bytes as carried in `token-key` fields.
    pub fn raw_bytes(&self) -> &[u8] {
        &self.spki
    }

    /// SHA-256 over the raw key bytes.
    pub fn token_key_id(&self) -> [u8; 32] {
        Sha256::digest(&self.spki).into()
    }

    /// Encode for an issuer directory `token-key` field.
    ///
    /// Re-encodes from the parsed key, so it reproduces the input of
    /// [`decode_public_key`] for any key this codec produced.
    pub fn encode_for_issuer_directory(&self) -> Result<String> {
        let spki = self
            .key
            .to_spki(Some(&Options::default()))
            .map_err(|e| PepeError::KeyDecode(format!("failed to encode SPKI: {e}")))?;
        Ok(BASE64URL.encode(spki))
    }
}

impl PartialEq for IssuerPublicKey {
    fn eq(&self, other: &Self) -> bool {
        self.spki == other.spki
    }
}

impl Eq for IssuerPublicKey {}

/// Decode a base64url `token-key` into a verification key.
pub fn decode_public_key(encoded: &str) -> Result<IssuerPublicKey> {
    let spki = BASE64URL
        .decode(encoded.trim())
        .map_err(|e| PepeError::KeyDecode(format!("invalid base64url key: {e}")))?;
    IssuerPublicKey::from_spki(&spki)
}

/// Check a `token-key`, returning `"Valid"` or the reason it was rejected.
pub fn validate_public_key(encoded: &str) -> String {
    match decode_public_key(encoded) {
        Ok(_) => "Valid".to_string(),
        Err(e) => e.to_string(),
    }
}
