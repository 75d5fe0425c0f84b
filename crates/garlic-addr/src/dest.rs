//! Overlay destination identities

use crate::encoding::{b64_decode, is_b32};
use crate::error::AddrError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Minimum decoded size of a full-form destination: public key material
/// plus the smallest possible trailing certificate.
pub const MIN_DEST_BYTES: usize = 387;

/// Length of a hash-form destination (base32 of a 32-byte digest)
pub const SHORT_HASH_CHARS: usize = 52;

/// Minimum length of the encrypted hash-form variant
pub const SHORT_ENCRYPTED_MIN_CHARS: usize = 55;

/// DNS-style suffix hash-form destinations may carry
pub const SHORT_SUFFIX: &str = ".b32.i2p";

/// Which textual encoding a destination was parsed from
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DestForm {
    /// Full key-material encoding; the form the router issues and the
    /// only form this transport advertises for itself
    Full,
    /// Hash encoding; accepted on input, resolved by the router by name
    Short,
}

/// A validated overlay destination, immutable once parsed
///
/// `as_str` returns the exact text the destination was parsed from, so a
/// parse/render cycle never rewrites an address.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Destination {
    text: String,
    form: DestForm,
}

impl Destination {
    /// Parse and validate destination text in either encoding
    pub fn parse(text: &str) -> Result<Self, AddrError> {
        let bare = text.strip_suffix(SHORT_SUFFIX).unwrap_or(text);
        if bare.len() < MIN_DEST_BYTES && is_b32(bare) {
            if bare.len() != SHORT_HASH_CHARS && bare.len() < SHORT_ENCRYPTED_MIN_CHARS {
                return Err(AddrError::Malformed(format!(
                    "hash-form destination has invalid length {}",
                    bare.len()
                )));
            }
            return Ok(Self {
                text: text.to_string(),
                form: DestForm::Short,
            });
        }

        let decoded = b64_decode(text)?;
        if decoded.len() < MIN_DEST_BYTES {
            return Err(AddrError::Malformed(format!(
                "destination truncated: {} bytes, expected at least {}",
                decoded.len(),
                MIN_DEST_BYTES
            )));
        }
        Ok(Self {
            text: text.to_string(),
            form: DestForm::Full,
        })
    }

    /// The destination exactly as it was parsed
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Which encoding this destination uses
    pub fn form(&self) -> DestForm {
        self.form
    }

    /// Hash-form payload without the DNS-style suffix
    ///
    /// Returns `None` for full-form destinations.
    pub fn short_payload(&self) -> Option<&str> {
        match self.form {
            DestForm::Full => None,
            DestForm::Short => Some(self.text.strip_suffix(SHORT_SUFFIX).unwrap_or(&self.text)),
        }
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

impl FromStr for Destination {
    type Err = AddrError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Destination {
    type Error = AddrError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Destination> for String {
    fn from(value: Destination) -> Self {
        value.text
    }
}
