//! Public metadata extensions.
//!
//! ```text
//! struct {
//!     ExtensionType extension_type;
//!     opaque extension_data<0..2^16-1>;
//! } Extension;
//!
//! Extension extensions<0..2^16-1>;
//! ```

use tls_codec::{Deserialize, Serialize, TlsByteVecU16, TlsVecU16};
use tls_codec_derive::{TlsDeserialize, TlsSerialize, TlsSize};

use crate::error::{PepeError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extension {
    pub extension_type: u16,
    pub extension_data: Vec<u8>,
}

impl Extension {
    pub fn new(extension_type: u16, extension_data: Vec<u8>) -> Self {
        Self {
            extension_type,
            extension_data,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, TlsSize, TlsSerialize, TlsDeserialize)]
struct ExtensionWire {
    extension_type: u16,
    extension_data: TlsByteVecU16,
}

/// Ordered list of extensions; order is significant on the wire.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Extensions(Vec<Extension>);

impl Extensions {
    pub fn new(extensions: Vec<Extension>) -> Self {
        Self(extensions)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Extension> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let mut buf = bytes;
        let wire = TlsVecU16::<ExtensionWire>::tls_deserialize(&mut buf)
            .map_err(|e| PepeError::ExtensionDecode(format!("malformed extensions: {e:?}")))?;
        if !buf.is_empty() {
            return Err(PepeError::ExtensionDecode(format!(
                "{} trailing bytes after extensions",
                buf.len()
            )));
        }

        Ok(wire
            .as_slice()
            .iter()
            .map(|ext| Extension::new(ext.extension_type, ext.extension_data.as_slice().to_vec()))
            .collect())
    }

    /// Fails when an entry or the whole list exceeds its 16-bit length prefix.
    pub fn serialize(&self) -> Result<Vec<u8>> {
        let wire: Vec<_> = self
            .0
            .iter()
            .map(|ext| ExtensionWire {
                extension_type: ext.extension_type,
                extension_data: TlsByteVecU16::new(ext.extension_data.clone()),
            })
            .collect();
        TlsVecU16::new(wire)
            .tls_serialize_detached()
            .map_err(|e| PepeError::ExtensionDecode(format!("cannot encode extensions: {e:?}")))
    }

    /// Build from operator-entered `(type, hex data)` slots.
    ///
    /// A slot is skipped when either field is empty. Types are decimal or
    /// `0x`-prefixed hex.
    pub fn from_sparse<S: AsRef<str>>(slots: &[(S, S)]) -> Result<Self> {
        let mut entries = Vec::new();
        for (ty, data) in slots {
            let (ty, data) = (ty.as_ref().trim(), data.as_ref().trim());
            if ty.is_empty() || data.is_empty() {
                continue;
            }
            let extension_type = parse_extension_type(ty)?;
            let extension_data = hex::decode(data.trim_start_matches("0x")).map_err(|e| {
                PepeError::ExtensionDecode(format!("extension data `{data}` is not hex: {e}"))
            })?;
            entries.push(Extension::new(extension_type, extension_data));
        }
        Ok(Self(entries))
    }
}

fn parse_extension_type(value: &str) -> Result<u16> {
    let parsed = match value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
    {
        Some(hex) => u16::from_str_radix(hex, 16),
        None => value.parse::<u16>(),
    };
    parsed.map_err(|_| PepeError::ExtensionDecode(format!("invalid extension type `{value}`")))
}

impl FromIterator<Extension> for Extensions {
    fn from_iter<I: IntoIterator<Item = Extension>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
