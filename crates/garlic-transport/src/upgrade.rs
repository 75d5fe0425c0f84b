//! Contract for the connection upgrade pipeline
//!
//! The upgrader negotiates a secure channel and a stream multiplexer on
//! top of a raw connection, turning it into whatever capability-complete
//! connection type the surrounding stack works with. This transport only
//! drives it; the handshake itself is the collaborator's business.

use crate::conn::{StreamConn, StreamListener};
use crate::peer::PeerId;
use crate::rcmgr::ScopeHandle;
use std::future::Future;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Direction of a connection, as seen from this node
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Inbound,
    Outbound,
}

/// Failure reported by the upgrade pipeline
#[derive(Debug, Error)]
#[error("{0}")]
pub struct UpgradeError(pub String);

/// The upgrade pipeline contract
pub trait Upgrader: Send + Sync {
    /// Capability-complete connection the pipeline produces
    type Conn: Send + 'static;
    /// Listener wrapper that upgrades each accepted connection
    type Listener: Send + 'static;

    /// Upgrade a single raw connection
    ///
    /// On success the pipeline takes over the scope handle and releases
    /// it when the upgraded connection ends. On failure the connection
    /// is dropped (which closes it); the caller releases the scope.
    fn upgrade(
        &self,
        cancel: &CancellationToken,
        transport: &'static str,
        conn: StreamConn,
        direction: Direction,
        expected_peer: Option<PeerId>,
        scope: Option<ScopeHandle>,
    ) -> impl Future<Output = Result<Self::Conn, UpgradeError>> + Send;

    /// Wrap a listener so every accepted connection is upgraded as it
    /// arrives
    fn upgrade_listener(&self, transport: &'static str, listener: StreamListener)
        -> Self::Listener;
}
