//! Anonymous overlay transport for a peer-to-peer stack
//!
//! This crate adapts an already-running anonymity router, reached through
//! a SAM-style control-protocol client, into a dialable/listenable
//! transport:
//! - Session lifecycle against the router (one primary session, derived
//!   inbound/outbound sub-sessions)
//! - Adapters presenting raw overlay streams as generically-addressed
//!   connections
//! - The dial/listen/upgrade state machine, with checkpointed
//!   cancellation and cleanup-on-error on every path
//!
//! The router client, the secure-channel/muxer upgrade pipeline, and
//! resource accounting are injected collaborators; their contracts live
//! in [`provider`], [`upgrade`], and [`rcmgr`]. An in-memory provider
//! backed by byte pipes is included for hermetic tests.

pub mod conn;
pub mod error;
pub mod memory;
pub mod peer;
pub mod provider;
pub mod rcmgr;
pub mod session;
pub mod transport;
pub mod upgrade;

#[cfg(test)]
pub(crate) mod testutil;

pub use conn::{StreamConn, StreamListener, WrapRejected};
pub use error::TransportError;
pub use memory::MemoryRouter;
pub use peer::PeerId;
pub use provider::{
    BoxFuture, BoxRawConn, BoxRawListener, DestinationKeys, PrimarySession, ProviderError,
    RawConn, RawListener, Session, SessionOptions, SessionProvider,
};
pub use rcmgr::{ConnScope, ResourceError, ResourceManager, ScopeHandle};
pub use session::{create_sessions, SessionBundle};
pub use transport::{GarlicTransport, TransportConfig, TRANSPORT_NAME};
pub use upgrade::{Direction, UpgradeError, Upgrader};
