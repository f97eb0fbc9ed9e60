//! In-process Blind RSA issuer for tests and the local harness.
//!
//! Signs any well-formed request for `0x0002` or `0xDA7A`. Both types share
//! one key pair.

use std::sync::OnceLock;

use async_trait::async_trait;
use blind_rsa_signatures::{KeyPair, Options};
use rand::rngs::OsRng;
use reqwest::header::{HeaderValue, CONTENT_TYPE};
use tracing::{debug, info};

use crate::directory::{IssuerDirectory, IssuerTokenKey, TokenKeyInfo};
use crate::error::{PepeError, Result};
use crate::key::IssuerPublicKey;
use crate::protocol::{
    ProtocolGeneration, TokenType, ISSUER_DIRECTORY_MEDIA_TYPE, ISSUER_DIRECTORY_PATH,
};
use crate::relay::{RelayRequest, RelayResponse, Transport};
use crate::token::{TokenRequest, TokenResponse};

/// Modulus size of generated issuer keys.
pub const TEST_ISSUER_MODULUS_BITS: usize = 2048;

/// Default issuer name.
pub const TEST_ISSUER_NAME: &str = "issuer.example";

/// Default token request path.
pub const TOKEN_REQUEST_PATH: &str = "/token-request";

static SHARED: OnceLock<TestIssuer> = OnceLock::new();

pub struct TestIssuer {
    name: String,
    keypair: KeyPair,
    public_key: IssuerPublicKey,
}

impl TestIssuer {
    /// Generate a fresh key pair.
    pub fn generate(name: impl Into<String>) -> Result<Self> {
        let keypair = KeyPair::generate(&mut OsRng, TEST_ISSUER_MODULUS_BITS)
            .map_err(|e| PepeError::KeyDecode(format!("key generation failed: {e}")))?;
        let public_key = IssuerPublicKey::from_public_key(keypair.pk.clone())?;
        let name = name.into();
        info!(issuer = %name, "Generated test issuer key pair");
        Ok(Self {
            name,
            keypair,
            public_key,
        })
    }

    /// Process-wide issuer named [`TEST_ISSUER_NAME`], generated on first use.
    pub fn shared() -> Result<&'static TestIssuer> {
        if let Some(issuer) = SHARED.get() {
            return Ok(issuer);
        }
        let issuer = Self::generate(TEST_ISSUER_NAME)?;
        Ok(SHARED.get_or_init(|| issuer))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn public_key(&self) -> &IssuerPublicKey {
        &self.public_key
    }

    /// Directory document advertising the key for both supported types.
    pub fn directory(&self, issuer_request_uri: &str) -> Result<IssuerDirectory> {
        let token_key = self.public_key.encode_for_issuer_directory()?;
        let token_keys = [TokenType::Public, TokenType::PublicMetadata]
            .into_iter()
            .map(|token_type| TokenKeyInfo {
                token_type: token_type.as_u16(),
                token_key: token_key.clone(),
                not_before: None,
            })
            .collect();
        Ok(IssuerDirectory {
            issuer_request_uri: issuer_request_uri.to_string(),
            token_keys,
        })
    }

    /// Key descriptor pointing at `request_url`.
    pub fn token_key(&self, token_type: TokenType, request_url: &str) -> IssuerTokenKey {
        IssuerTokenKey {
            token_type,
            raw_key: self.public_key.raw_bytes().to_vec(),
            issuer_request_uri: request_url.to_string(),
            issuer_host: self.name.clone(),
        }
    }

    /// Answer a serialized token request with a serialized token response.
    pub fn issue(&self, request: &[u8]) -> Result<Vec<u8>> {
        let request = TokenRequest::deserialize(request)?;
        if !request.token_type.is_publicly_verifiable() {
            return Err(PepeError::UnsupportedTokenType(request.token_type.as_u16()));
        }

        let key_id = self.public_key.token_key_id();
        if request.truncated_token_key_id != key_id[31] {
            return Err(PepeError::TokenDecode(format!(
                "truncated key id {:#04x} does not match issuer key",
                request.truncated_token_key_id
            )));
        }

        let blind_sig = self
            .keypair
            .sk
            .blind_sign(&mut OsRng, &request.blinded_msg, &Options::default())
            .map_err(|e| PepeError::Finalize(format!("issuer failed to sign: {e}")))?;

        debug!(
            token_type = %request.token_type,
            extensions = request.extensions.as_ref().map_or(0, |e| e.len()),
            "Issued blind signature"
        );
        Ok(TokenResponse {
            blind_sig: blind_sig.0.clone(),
        }
        .serialize())
    }
}

/// Serves a [`TestIssuer`] over the [`Transport`] interface.
///
/// `POST` requests are answered as token requests, echoing back the media
/// type generation the request declared. `GET` on the well-known path returns
/// the directory.
pub struct IssuerTransport<'a> {
    issuer: &'a TestIssuer,
}

impl<'a> IssuerTransport<'a> {
    pub fn new(issuer: &'a TestIssuer) -> Self {
        Self { issuer }
    }
}

#[async_trait]
impl Transport for IssuerTransport<'_> {
    async fn send(&self, request: RelayRequest) -> Result<RelayResponse> {
        if request.method == reqwest::Method::GET {
            if !request.url.ends_with(ISSUER_DIRECTORY_PATH) {
                return Ok(RelayResponse::new(404));
            }
            let directory = self.issuer.directory(TOKEN_REQUEST_PATH)?;
            let body = serde_json::to_vec(&directory)
                .map_err(|e| PepeError::Directory(e.to_string()))?;
            return Ok(RelayResponse::new(200)
                .header(
                    CONTENT_TYPE,
                    HeaderValue::from_static(ISSUER_DIRECTORY_MEDIA_TYPE),
                )
                .body(body));
        }

        let generation = [ProtocolGeneration::Current, ProtocolGeneration::Legacy]
            .into_iter()
            .find(|g| {
                request
                    .header_value(CONTENT_TYPE)
                    .is_some_and(|ct| ct.eq_ignore_ascii_case(g.request_media_type()))
            });
        let Some(generation) = generation else {
            return Ok(RelayResponse::new(415));
        };

        match self.issuer.issue(&request.body) {
            Ok(body) => Ok(RelayResponse::new(200)
                .header(
                    CONTENT_TYPE,
                    HeaderValue::from_static(generation.response_media_type()),
                )
                .body(body)),
            Err(e) => Ok(RelayResponse::new(400).body(e.to_string())),
        }
    }
}
