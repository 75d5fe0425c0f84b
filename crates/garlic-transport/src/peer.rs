//! Peer identity of the surrounding stack

use serde::{Deserialize, Serialize};

/// Opaque identifier of a remote peer
///
/// The transport never interprets this; it is handed to the upgrade
/// pipeline, which verifies the dialed peer actually holds the identity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PeerId(pub [u8; 32]);

impl PeerId {
    /// Get as bytes
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl std::fmt::Display for PeerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", hex::encode(&self.0[..8]))
    }
}
