//! Protocol constants: token types, wire generations and media types.

use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};

use crate::error::{PepeError, Result};

/// HTTP authentication scheme for Privacy Pass challenges and credentials.
pub const AUTH_SCHEME: &str = "PrivateToken";

/// Media type of the issuer directory document.
pub const ISSUER_DIRECTORY_MEDIA_TYPE: &str = "application/private-token-issuer-directory";

/// Well-known path of the issuer directory.
pub const ISSUER_DIRECTORY_PATH: &str = "/.well-known/private-token-issuer-directory";

/// base64url without padding on encode, padding-indifferent on decode.
///
/// Issuers and browsers disagree on padding; both forms are accepted.
pub const BASE64URL: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new()
        .with_encode_padding(false)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Token type tag carried by challenges, requests and tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum TokenType {
    /// Privately verifiable, VOPRF(P-384, SHA-384).
    PrivateP384 = 0x0001,
    /// Publicly verifiable, Blind RSA (2048-bit).
    Public = 0x0002,
    /// Privately verifiable, VOPRF(ristretto255, SHA-512).
    PrivateRistretto255 = 0x0005,
    /// Publicly verifiable with public metadata carried as extensions.
    PublicMetadata = 0xDA7A,
}

impl TokenType {
    pub fn as_u16(self) -> u16 {
        self as u16
    }

    /// Whether the token type binds public metadata, making extensions mandatory.
    pub fn requires_extensions(self) -> bool {
        matches!(self, Self::PublicMetadata)
    }

    pub fn is_publicly_verifiable(self) -> bool {
        matches!(self, Self::Public | Self::PublicMetadata)
    }
}

impl TryFrom<u16> for TokenType {
    type Error = PepeError;

    fn try_from(value: u16) -> Result<Self> {
        match value {
            0x0001 => Ok(Self::PrivateP384),
            0x0002 => Ok(Self::Public),
            0x0005 => Ok(Self::PrivateRistretto255),
            0xDA7A => Ok(Self::PublicMetadata),
            other => Err(PepeError::ChallengeParse(format!(
                "token type {other:#06x} is not supported"
            ))),
        }
    }
}

impl std::fmt::Display for TokenType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#06x}", self.as_u16())
    }
}

/// Wire generation of the token request/response media types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolGeneration {
    /// Registered `application/private-token-*` media types.
    Current,
    /// Draft-era `message/token-*` media types.
    Legacy,
}

impl ProtocolGeneration {
    pub fn request_media_type(self) -> &'static str {
        match self {
            Self::Current => "application/private-token-request",
            Self::Legacy => "message/token-request",
        }
    }

    pub fn response_media_type(self) -> &'static str {
        match self {
            Self::Current => "application/private-token-response",
            Self::Legacy => "message/token-response",
        }
    }
}

impl std::fmt::Display for ProtocolGeneration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Current => write!(f, "Current"),
            Self::Legacy => write!(f, "Legacy"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::Engine;

    #[test]
    fn test_token_type_supported_set() {
        assert_eq!(TokenType::try_from(0x0002).unwrap(), TokenType::Public);
        assert_eq!(
            TokenType::try_from(0xDA7A).unwrap(),
            TokenType::PublicMetadata
        );
        assert_eq!(TokenType::try_from(0x0001).unwrap(), TokenType::PrivateP384);
        assert!(TokenType::try_from(0x0003).is_err());
        assert!(TokenType::try_from(0xF91A).is_err());
    }

    #[test]
    fn test_token_type_capabilities() {
        assert!(TokenType::PublicMetadata.requires_extensions());
        assert!(!TokenType::Public.requires_extensions());
        assert!(!TokenType::PrivateRistretto255.is_publicly_verifiable());
        assert_eq!(TokenType::PublicMetadata.to_string(), "0xda7a");
    }

    #[test]
    fn test_generation_media_types() {
        assert_eq!(
            ProtocolGeneration::Current.request_media_type(),
            "application/private-token-request"
        );
        assert_eq!(
            ProtocolGeneration::Legacy.response_media_type(),
            "message/token-response"
        );
        assert_eq!(ProtocolGeneration::Legacy.to_string(), "Legacy");
    }

    #[test]
    fn test_base64url_accepts_padding() {
        let padded = BASE64URL.decode("-_8=").unwrap();
        let bare = BASE64URL.decode("-_8").unwrap();
        assert_eq!(padded, bare);
        assert_eq!(BASE64URL.encode(&bare), "-_8");
    }
}
