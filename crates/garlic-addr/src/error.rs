//! Error types for the address layer

use thiserror::Error;

/// Address parsing and translation errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddrError {
    /// Input is not a syntactically valid destination encoding
    #[error("malformed destination: {0}")]
    Malformed(String),

    /// Address carries a protocol tag this transport does not speak
    #[error("unsupported address family: {0}")]
    UnsupportedFamily(String),
}
