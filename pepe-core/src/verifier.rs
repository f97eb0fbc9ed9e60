//! Origin-side token verification.

use blind_rsa_signatures::{Options, Signature};
use tracing::debug;

use crate::error::{PepeError, Result};
use crate::extensions::Extensions;
use crate::key::IssuerPublicKey;
use crate::token::{signed_message, Token};

/// Check a token against an issuer key.
///
/// A cryptographically invalid token is `Ok(false)`. Errors are reserved for
/// input the check cannot be applied to: a token type this key cannot verify,
/// or a metadata token presented without its extensions.
pub fn verify(
    token: &Token,
    public_key: &IssuerPublicKey,
    extensions: Option<&Extensions>,
) -> Result<bool> {
    let token_type = token.token_type();
    if !token_type.is_publicly_verifiable() {
        return Err(PepeError::UnsupportedTokenType(token_type.as_u16()));
    }
    let bound = if token_type.requires_extensions() {
        Some(extensions.ok_or(PepeError::MissingExtensions(token_type))?)
    } else {
        None
    };

    if token.token_key_id() != &public_key.token_key_id() {
        debug!(token_type = %token_type, "Token key id does not match verification key");
        return Ok(false);
    }

    let message = signed_message(&token.token_input(), bound)?;
    let signature = Signature(token.authenticator().to_vec());
    let valid = signature
        .verify(public_key.public_key(), None, &message, &Options::default())
        .is_ok();
    debug!(token_type = %token_type, valid, "Verified token");
    Ok(valid)
}
