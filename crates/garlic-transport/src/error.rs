//! Transport error taxonomy
//!
//! Every failure is returned to the immediate caller, annotated with the
//! operation and the remote destination where one is known. The
//! transport never retries internally; `DialFailed` in particular is the
//! transient "route not established yet" case callers are expected to
//! retry themselves.

use crate::provider::ProviderError;
use crate::rcmgr::ResourceError;
use crate::upgrade::UpgradeError;
use garlic_addr::{AddrError, LayeredAddr};
use thiserror::Error;

/// Transport errors
#[derive(Debug, Error)]
pub enum TransportError {
    /// The address does not name an overlay destination
    #[error("cannot dial {addr}: not an overlay destination")]
    NotDialable { addr: LayeredAddr },

    /// A destination/address conversion failed
    #[error("address translation failed ({op}): {source}")]
    AddressTranslation {
        op: &'static str,
        #[source]
        source: AddrError,
    },

    /// The provider could not create a session
    #[error("failed to create {which} session: {source}")]
    SessionCreation {
        which: &'static str,
        #[source]
        source: ProviderError,
    },

    /// The caller cancelled while a dial was pending or just finished
    #[error("dial to {dest} cancelled")]
    DialCancelled { dest: String },

    /// The raw dial failed; commonly transient while the overlay route
    /// between the peers is still being established
    #[error("dial to {dest} failed (route may not be established yet): {source}")]
    DialFailed {
        dest: String,
        #[source]
        source: ProviderError,
    },

    /// A raw object reported an address the adapter cannot parse
    #[error("failed to wrap raw connection: {source}")]
    AdapterConstruction {
        #[source]
        source: AddrError,
    },

    /// The resource manager refused the connection
    #[error("resource manager refused connection to {addr}: {source}")]
    ResourceLimit {
        addr: LayeredAddr,
        #[source]
        source: ResourceError,
    },

    /// The upgrade pipeline failed
    #[error("upgrade of connection to {dest} failed: {source}")]
    UpgradeFailed {
        dest: String,
        #[source]
        source: UpgradeError,
    },

    /// The caller cancelled while the upgrade was in flight
    #[error("upgrade of connection to {dest} cancelled")]
    UpgradeCancelled { dest: String },

    /// The provider could not bind the listener
    #[error("failed to open listener: {source}")]
    ListenFailed {
        #[source]
        source: ProviderError,
    },

    /// The listener failed while waiting for a connection
    #[error("failed to accept connection: {source}")]
    AcceptFailed {
        #[source]
        source: ProviderError,
    },
}
