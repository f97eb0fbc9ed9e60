//! TokenChallenge construction and `WWW-Authenticate` header codec.
//!
//! A header value may carry several challenges:
//!
//! ```text
//! PrivateToken challenge=<b64url>, token-key=<b64url>, max-age=10,
//! PrivateToken challenge=<b64url>, token-key=<b64url>
//! ```
//!
//! The binary challenge follows RFC 9577 §2.1:
//!
//! ```text
//! struct {
//!     uint16_t token_type;
//!     opaque issuer_name<1..2^16-1>;
//!     opaque redemption_context<0..32>;
//!     opaque origin_info<0..2^16-1>;
//! } TokenChallenge;
//! ```

use base64::Engine;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};
use tls_codec::{Deserialize, Serialize, TlsByteVecU16, TlsByteVecU8};
use tls_codec_derive::{TlsDeserialize, TlsSerialize, TlsSize};
use tracing::debug;

use crate::error::{PepeError, Result};
use crate::protocol::{TokenType, AUTH_SCHEME, BASE64URL};

/// Length of a non-empty redemption context.
pub const REDEMPTION_CONTEXT_LEN: usize = 32;

#[derive(Debug, TlsSize, TlsSerialize, TlsDeserialize)]
struct ChallengeWire {
    token_type: u16,
    issuer_name: TlsByteVecU16,
    redemption_context: TlsByteVecU8,
    origin_info: TlsByteVecU16,
}

/// A challenge issued by an origin naming the issuer it trusts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenChallenge {
    token_type: TokenType,
    issuer_name: String,
    redemption_context: Option<[u8; REDEMPTION_CONTEXT_LEN]>,
    origin_info: Vec<String>,
}

impl TokenChallenge {
    pub fn new(
        token_type: TokenType,
        issuer_name: impl Into<String>,
        redemption_context: Option<[u8; REDEMPTION_CONTEXT_LEN]>,
        origin_info: Vec<String>,
    ) -> Self {
        Self {
            token_type,
            issuer_name: issuer_name.into(),
            redemption_context,
            origin_info,
        }
    }

    /// Build a challenge bound to a fresh redemption context from the OS CSPRNG.
    pub fn generate(
        token_type: TokenType,
        issuer_name: impl Into<String>,
        origin_info: Vec<String>,
    ) -> Self {
        let mut context = [0u8; REDEMPTION_CONTEXT_LEN];
        OsRng.fill_bytes(&mut context);
        Self::new(token_type, issuer_name, Some(context), origin_info)
    }

    pub fn token_type(&self) -> TokenType {
        self.token_type
    }

    pub fn issuer_name(&self) -> &str {
        &self.issuer_name
    }

    pub fn redemption_context(&self) -> Option<&[u8; REDEMPTION_CONTEXT_LEN]> {
        self.redemption_context.as_ref()
    }

    pub fn origin_info(&self) -> &[String] {
        &self.origin_info
    }

    /// Fails when the issuer name or the joined origin list outgrows its
    /// 16-bit length prefix.
    pub fn serialize(&self) -> Result<Vec<u8>> {
        let wire = ChallengeWire {
            token_type: self.token_type.as_u16(),
            issuer_name: TlsByteVecU16::new(self.issuer_name.as_bytes().to_vec()),
            redemption_context: TlsByteVecU8::new(
                self.redemption_context.map(|c| c.to_vec()).unwrap_or_default(),
            ),
            origin_info: TlsByteVecU16::new(self.origin_info.join(",").into_bytes()),
        };
        wire.tls_serialize_detached()
            .map_err(|e| PepeError::ChallengeParse(format!("cannot encode challenge: {e:?}")))
    }

    pub fn deserialize(bytes: &[u8]) -> Result<Self> {
        let err = PepeError::ChallengeParse;
        let mut buf = bytes;
        let wire = ChallengeWire::tls_deserialize(&mut buf)
            .map_err(|e| err(format!("malformed challenge: {e:?}")))?;
        if !buf.is_empty() {
            return Err(err(format!("{} trailing bytes after challenge", buf.len())));
        }

        let token_type = TokenType::try_from(wire.token_type)?;

        let issuer_name = wire.issuer_name.as_slice();
        if issuer_name.is_empty() {
            return Err(err("issuer_name must not be empty".into()));
        }
        let issuer_name = String::from_utf8(issuer_name.to_vec())
            .map_err(|_| err("issuer_name is not valid UTF-8".into()))?;

        let context = wire.redemption_context.as_slice();
        let redemption_context = match context.len() {
            0 => None,
            REDEMPTION_CONTEXT_LEN => {
                let mut out = [0u8; REDEMPTION_CONTEXT_LEN];
                out.copy_from_slice(context);
                Some(out)
            }
            n => {
                return Err(err(format!(
                    "redemption_context must be 0 or 32 bytes, got {n}"
                )))
            }
        };

        let origin_info = String::from_utf8(wire.origin_info.as_slice().to_vec())
            .map_err(|_| err("origin_info is not valid UTF-8".into()))?;
        let origin_info = if origin_info.is_empty() {
            Vec::new()
        } else {
            origin_info.split(',').map(str::to_string).collect()
        };

        Ok(Self {
            token_type,
            issuer_name,
            redemption_context,
            origin_info,
        })
    }

    /// SHA-256 over the serialized challenge, bound into every token.
    pub fn digest(&self) -> Result<[u8; 32]> {
        Ok(Sha256::digest(self.serialize()?).into())
    }
}

/// One `PrivateToken` challenge as carried in a `WWW-Authenticate` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WwwAuthenticateChallenge {
    pub challenge: TokenChallenge,
    pub token_key: Vec<u8>,
    pub max_age: Option<u64>,
}

impl WwwAuthenticateChallenge {
    pub fn new(challenge: TokenChallenge, token_key: Vec<u8>, max_age: Option<u64>) -> Self {
        Self {
            challenge,
            token_key,
            max_age,
        }
    }

    /// SHA-256 of the token key.
    ///
    /// Recomputed on every call: `token_key` is a public field.
    pub fn token_key_id(&self) -> [u8; 32] {
        Sha256::digest(&self.token_key).into()
    }

    /// Render the challenge; `for_header` prefixes the `PrivateToken` scheme.
    pub fn serialize(&self, for_header: bool) -> Result<String> {
        let mut out = String::new();
        if for_header {
            out.push_str(AUTH_SCHEME);
            out.push(' ');
        }
        out.push_str("challenge=");
        out.push_str(&BASE64URL.encode(self.challenge.serialize()?));
        out.push_str(", token-key=");
        out.push_str(&BASE64URL.encode(&self.token_key));
        if let Some(max_age) = self.max_age {
            out.push_str(&format!(", max-age={max_age}"));
        }
        Ok(out)
    }
}

/// Serialize several challenges into a single header value.
pub fn serialize_all(challenges: &[WwwAuthenticateChallenge]) -> Result<String> {
    let rendered = challenges
        .iter()
        .map(|c| c.serialize(true))
        .collect::<Result<Vec<_>>>()?;
    Ok(rendered.join(", "))
}

#[derive(Default)]
struct PendingEntry {
    challenge: Option<String>,
    token_key: Option<String>,
    max_age: Option<String>,
}

impl PendingEntry {
    fn finish(self, index: usize) -> Result<WwwAuthenticateChallenge> {
        let challenge = self.challenge.ok_or_else(|| {
            PepeError::ChallengeParse(format!("challenge #{index} is missing `challenge`"))
        })?;
        let token_key = self.token_key.ok_or_else(|| {
            PepeError::ChallengeParse(format!("challenge #{index} is missing `token-key`"))
        })?;

        let challenge_bytes = BASE64URL.decode(&challenge).map_err(|e| {
            PepeError::ChallengeParse(format!("challenge #{index}: invalid base64url challenge: {e}"))
        })?;
        let token_key = BASE64URL.decode(&token_key).map_err(|e| {
            PepeError::ChallengeParse(format!("challenge #{index}: invalid base64url token-key: {e}"))
        })?;
        let max_age = self
            .max_age
            .map(|v| {
                v.parse::<u64>().map_err(|_| {
                    PepeError::ChallengeParse(format!("challenge #{index}: invalid max-age `{v}`"))
                })
            })
            .transpose()?;

        let challenge = TokenChallenge::deserialize(&challenge_bytes)?;
        Ok(WwwAuthenticateChallenge::new(challenge, token_key, max_age))
    }
}

/// Split on commas outside quoted strings.
fn split_items(header: &str) -> Vec<&str> {
    let mut items = Vec::new();
    let mut start = 0;
    let mut quoted = false;
    for (i, c) in header.char_indices() {
        match c {
            '"' => quoted = !quoted,
            ',' if !quoted => {
                items.push(header[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    items.push(header[start..].trim());
    items
}

fn unquote(value: &str) -> &str {
    value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value)
}

/// Parse every `PrivateToken` challenge in a `WWW-Authenticate` value, in order.
///
/// Challenges for other schemes are skipped. Any malformed `PrivateToken`
/// entry fails the whole parse.
pub fn parse(header: &str) -> Result<Vec<WwwAuthenticateChallenge>> {
    if header.trim().is_empty() {
        return Err(PepeError::ChallengeParse("empty header value".into()));
    }

    let mut current: Option<PendingEntry> = None;
    let mut in_foreign = false;
    let mut out = Vec::new();

    for item in split_items(header) {
        if item.is_empty() {
            continue;
        }

        // A new challenge starts with a scheme token followed by whitespace,
        // or is a bare scheme token without parameters. `name = value` is a
        // parameter with optional whitespace around `=`.
        let (scheme, param) = match item.split_once(char::is_whitespace) {
            Some((head, rest)) if !head.contains('=') && !rest.trim_start().starts_with('=') => {
                (Some(head), rest.trim())
            }
            None if !item.contains('=') => (Some(item), ""),
            _ => (None, item),
        };

        if let Some(scheme) = scheme {
            if let Some(entry) = current.take() {
                out.push(entry.finish(out.len())?);
            }
            in_foreign = !scheme.eq_ignore_ascii_case(AUTH_SCHEME);
            if !in_foreign {
                current = Some(PendingEntry::default());
            } else {
                debug!(scheme, "Skipping foreign authentication scheme");
            }
        }

        if param.is_empty() || in_foreign {
            continue;
        }

        let entry = current.as_mut().ok_or_else(|| {
            PepeError::ChallengeParse(format!("parameter `{param}` outside of a challenge"))
        })?;
        let (name, value) = param.split_once('=').ok_or_else(|| {
            PepeError::ChallengeParse(format!("malformed parameter `{param}`"))
        })?;
        let value = unquote(value.trim()).to_string();
        match name.trim().to_ascii_lowercase().as_str() {
            "challenge" => entry.challenge = Some(value),
            "token-key" => entry.token_key = Some(value),
            "max-age" => entry.max_age = Some(value),
            other => debug!(parameter = other, "Ignoring unknown challenge parameter"),
        }
    }

    if let Some(entry) = current.take() {
        out.push(entry.finish(out.len())?);
    }

    if out.is_empty() {
        return Err(PepeError::ChallengeParse(format!(
            "no {AUTH_SCHEME} challenge in header value"
        )));
    }

    debug!(count = out.len(), "Parsed challenges");
    Ok(out)
}

/// Build one challenge per `(raw token key, issuer name)` pair and join them
/// into a single header value. Pairs with an empty key are skipped.
pub fn create_challenge_header(
    token_type: TokenType,
    issuers: &[(Vec<u8>, String)],
    origin_info: &[String],
) -> Result<String> {
    let challenges: Vec<_> = issuers
        .iter()
        .filter(|(key, _)| !key.is_empty())
        .map(|(key, name)| {
            let challenge = TokenChallenge::generate(token_type, name.clone(), origin_info.to_vec());
            WwwAuthenticateChallenge::new(challenge, key.clone(), None)
        })
        .collect();
    serialize_all(&challenges)
}

#[derive(serde::Serialize)]
#[serde(rename_all = "camelCase")]
struct ChallengeSummary<'a> {
    challenge: ChallengeFields<'a>,
    token_key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_age: Option<u64>,
}

#[derive(serde::Serialize)]
#[serde(rename_all = "camelCase")]
struct ChallengeFields<'a> {
    token_type: u16,
    name: &'a str,
    origin: &'a [String],
}

/// Pretty JSON summary of parsed challenges.
pub fn describe(challenges: &[WwwAuthenticateChallenge]) -> Result<String> {
    let summaries: Vec<_> = challenges
        .iter()
        .map(|c| ChallengeSummary {
            challenge: ChallengeFields {
                token_type: c.challenge.token_type().as_u16(),
                name: c.challenge.issuer_name(),
                origin: c.challenge.origin_info(),
            },
            token_key: BASE64URL.encode(&c.token_key),
            max_age: c.max_age,
        })
        .collect();
    serde_json::to_string_pretty(&summaries)
        .map_err(|e| PepeError::ChallengeParse(format!("cannot render challenges: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(issuer: &str, context: Option<[u8; 32]>) -> WwwAuthenticateChallenge {
        let challenge = TokenChallenge::new(
            TokenType::Public,
            issuer,
            context,
            vec!["origin.example".to_string()],
        );
        WwwAuthenticateChallenge::new(challenge, vec![1, 2, 3, 4], Some(10))
    }

    #[test]
    fn test_challenge_bytes_roundtrip() {
        let challenge = TokenChallenge::new(
            TokenType::PublicMetadata,
            "issuer.example",
            Some([0x42; 32]),
            vec!["a.example".into(), "b.example".into()],
        );
        let decoded = TokenChallenge::deserialize(&challenge.serialize().unwrap()).unwrap();
        assert_eq!(decoded, challenge);
    }

    #[test]
    fn test_challenge_wire_layout() {
        let challenge = TokenChallenge::new(TokenType::Public, "ab", None, vec![]);
        assert_eq!(
            challenge.serialize().unwrap(),
            vec![0x00, 0x02, 0x00, 0x02, b'a', b'b', 0x00, 0x00, 0x00]
        );
    }

    #[test]
    fn test_generated_contexts_are_fresh() {
        let a = TokenChallenge::generate(TokenType::Public, "issuer.example", vec![]);
        let b = TokenChallenge::generate(TokenType::Public, "issuer.example", vec![]);
        assert!(a.redemption_context().is_some());
        assert_ne!(a.redemption_context(), b.redemption_context());
        assert_ne!(a.digest().unwrap(), b.digest().unwrap());
    }

    #[test]
    fn test_parse_multiple_preserves_order() {
        let challenges = vec![
            sample("one.example", None),
            sample("two.example", Some([1; 32])),
            sample("three.example", Some([2; 32])),
        ];
        let header = serialize_all(&challenges).unwrap();

        let parsed = parse(&header).unwrap();
        assert_eq!(parsed.len(), 3);
        assert_eq!(parsed, challenges);
        assert_eq!(serialize_all(&parsed).unwrap(), header);
    }

    #[test]
    fn test_parse_quoted_padded_values() {
        let c = sample("issuer.example", None);
        let header = format!(
            "PrivateToken challenge=\"{}\", token-key=\"{}==\", max-age=\"10\"",
            BASE64URL.encode(c.challenge.serialize().unwrap()),
            BASE64URL.encode(&c.token_key),
        );
        assert_eq!(parse(&header).unwrap(), vec![c]);
    }

    #[test]
    fn test_parse_skips_foreign_scheme() {
        let c = sample("issuer.example", None);
        let header = format!("Basic realm=\"x\", {}", c.serialize(true).unwrap());
        assert_eq!(parse(&header).unwrap(), vec![c]);
    }

    #[test]
    fn test_parse_rejects_empty() {
        assert!(matches!(parse("  "), Err(PepeError::ChallengeParse(_))));
        assert!(matches!(
            parse("Basic realm=\"x\""),
            Err(PepeError::ChallengeParse(_))
        ));
    }

    #[test]
    fn test_one_malformed_entry_fails_whole_parse() {
        let good = sample("issuer.example", None).serialize(true).unwrap();
        let header = format!("{good}, PrivateToken token-key=AQID");
        let err = parse(&header).unwrap_err();
        assert!(matches!(err, PepeError::ChallengeParse(msg) if msg.contains("challenge #1")));
    }

    #[test]
    fn test_parse_rejects_unsupported_token_type() {
        let mut bytes = sample("issuer.example", None)
            .challenge
            .serialize()
            .unwrap();
        bytes[0] = 0x00;
        bytes[1] = 0x03;
        let header = format!(
            "PrivateToken challenge={}, token-key=AQID",
            BASE64URL.encode(bytes)
        );
        assert!(matches!(parse(&header), Err(PepeError::ChallengeParse(_))));
    }

    #[test]
    fn test_serialize_without_scheme() {
        let c = sample("issuer.example", None);
        assert!(c.serialize(true).unwrap().starts_with("PrivateToken challenge="));
        assert!(c.serialize(false).unwrap().starts_with("challenge="));
    }

    #[test]
    fn test_token_key_id_tracks_key_bytes() {
        let mut c = sample("issuer.example", None);
        let before = c.token_key_id();
        c.token_key.push(0xFF);
        assert_ne!(c.token_key_id(), before);
    }

    #[test]
    fn test_create_header_skips_empty_keys() {
        let issuers = vec![
            (vec![9, 9, 9], "a.example".to_string()),
            (Vec::new(), "skipped.example".to_string()),
            (vec![8, 8], "b.example".to_string()),
        ];
        let header =
            create_challenge_header(TokenType::Public, &issuers, &["localhost".to_string()])
                .unwrap();

        let parsed = parse(&header).unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].challenge.issuer_name(), "a.example");
        assert_eq!(parsed[1].challenge.issuer_name(), "b.example");
        assert_eq!(parsed[1].challenge.origin_info(), ["localhost".to_string()]);
        assert_ne!(
            parsed[0].challenge.redemption_context(),
            parsed[1].challenge.redemption_context()
        );
    }

    #[test]
    fn test_describe_lists_fields() {
        let json = describe(&[sample("issuer.example", None)]).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value[0]["challenge"]["tokenType"], 2);
        assert_eq!(value[0]["challenge"]["name"], "issuer.example");
        assert_eq!(value[0]["tokenKey"], "AQIDBA");
        assert_eq!(value[0]["maxAge"], 10);
    }

    #[test]
    fn test_parse_allows_whitespace_around_equals() {
        let c = sample("issuer.example", Some([3; 32]));
        let header = format!(
            "PrivateToken challenge = \"{}\", token-key = {} , max-age =10",
            BASE64URL.encode(c.challenge.serialize().unwrap()),
            BASE64URL.encode(&c.token_key),
        );
        assert_eq!(parse(&header).unwrap(), vec![c]);
    }

    #[test]
    fn test_oversized_origin_list_is_rejected_not_wrapped() {
        let origins = (0..7000).map(|i| format!("o{i:05}.example")).collect();
        let challenge = TokenChallenge::new(TokenType::Public, "issuer.example", None, origins);
        assert!(matches!(
            challenge.serialize(),
            Err(PepeError::ChallengeParse(_))
        ));
        assert!(challenge.digest().is_err());

        let header = create_challenge_header(
            TokenType::Public,
            &[(vec![1, 2, 3], "issuer.example".to_string())],
            challenge.origin_info(),
        );
        assert!(matches!(header, Err(PepeError::ChallengeParse(_))));
    }
}
