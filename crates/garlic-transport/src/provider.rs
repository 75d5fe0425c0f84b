//! Contracts for the session provider
//!
//! The session provider is the client library speaking the router's
//! control protocol. This transport treats it as opaque: it creates
//! sessions, dials, listens, and accepts, and every raw object reports
//! its endpoints as destination text. The wire syntax, key formats, and
//! the router process itself all live behind these traits.
//!
//! Raw connections and listeners cross the seam as boxed trait objects
//! so the rest of the crate (and the upgrade contract in particular)
//! stays non-generic.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};

/// Boxed future used where trait objects need async methods
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Errors surfaced by the session provider
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Transport-level failure talking to the router
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// The router answered with a refusal
    #[error("router refused the request: {reason}")]
    Refused { reason: String },

    /// Operation on a session that has been torn down
    #[error("session closed")]
    SessionClosed,
}

/// Refusal reasons the router is known to reply with
pub mod refusal {
    /// Session or sub-session name already in use
    pub const DUPLICATED_ID: &str = "DUPLICATED_ID";
    /// Destination already bound by another primary session
    pub const DUPLICATED_DEST: &str = "DUPLICATED_DEST";
    /// Protocol+port pair already bound under the same primary
    pub const DUPLICATED_PORT: &str = "DUPLICATED_PORT";
    /// No route to the destination; commonly transient while tunnels
    /// are still being established
    pub const CANT_REACH_PEER: &str = "CANT_REACH_PEER";
    /// A listener is already accepting on this session's destination
    pub const ALREADY_ACCEPTING: &str = "ALREADY_ACCEPTING";
}

/// Identity key material issued by the router
///
/// Both halves are opaque text in the provider's own encoding; the
/// transport only ever forwards them back to the provider, except for
/// the destination, which it advertises as its listening address.
#[derive(Clone)]
pub struct DestinationKeys {
    destination: String,
    private_key: String,
}

impl DestinationKeys {
    pub fn new(destination: String, private_key: String) -> Self {
        Self {
            destination,
            private_key,
        }
    }

    /// Public destination text (full form)
    pub fn destination(&self) -> &str {
        &self.destination
    }

    /// Private key blob in the provider's encoding
    pub fn private_key(&self) -> &str {
        &self.private_key
    }
}

impl fmt::Debug for DestinationKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DestinationKeys")
            .field("destination", &self.destination)
            .field("private_key", &"<redacted>")
            .finish()
    }
}

/// Tunnel parameters applied when a primary session is created
///
/// Defaults match the router's own: three hops per tunnel, two tunnels
/// per direction.
#[derive(Clone, Copy, Debug)]
pub struct SessionOptions {
    /// Hops per tunnel
    pub tunnel_length: u8,
    /// Tunnels built per direction
    pub tunnel_count: u8,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            tunnel_length: 3,
            tunnel_count: 2,
        }
    }
}

/// An established duplex overlay stream
pub trait RawConn: AsyncRead + AsyncWrite + Send + Unpin + std::fmt::Debug {
    /// Destination text of the local endpoint
    fn local_destination(&self) -> String;
    /// Destination text of the remote endpoint
    fn remote_destination(&self) -> String;
}

pub type BoxRawConn = Box<dyn RawConn>;

/// A pending-accept socket bound to one destination
pub trait RawListener: Send + std::fmt::Debug {
    /// Destination text this listener is reachable at
    fn local_destination(&self) -> String;
    /// Wait for the next incoming stream
    fn accept(&mut self) -> BoxFuture<'_, Result<BoxRawConn, ProviderError>>;
}

pub type BoxRawListener = Box<dyn RawListener>;

/// A sub-session capable of stream I/O
///
/// Dial and listen block for as long as the underlying router needs;
/// neither is preemptible once issued. Timeout and cancellation policy
/// belong to callers.
pub trait Session: Send + Sync + 'static {
    /// Destination this session acts as (shared with its primary)
    fn destination(&self) -> String;

    /// Open a stream to `dest` (destination text in either form)
    fn dial(&self, dest: &str) -> impl Future<Output = Result<BoxRawConn, ProviderError>> + Send;

    /// Bind a listener on this session's destination
    fn listen(&self) -> impl Future<Output = Result<BoxRawListener, ProviderError>> + Send;
}

/// The parent session owning key material and sub-sessions
///
/// Closing the primary tears down every sub-session derived from it at
/// the router; sub-sessions never close themselves independently.
pub trait PrimarySession: Send + Sync + 'static {
    type Sub: Session;

    /// Destination this primary (and all its children) acts as
    fn destination(&self) -> String;

    /// Derive a sub-session on the default protocol/port pair
    fn new_sub_session(
        &self,
        name: &str,
    ) -> impl Future<Output = Result<Self::Sub, ProviderError>> + Send;

    /// Derive a sub-session bound to explicit ports
    ///
    /// The router rejects duplicate protocol+port pairs across the
    /// sub-sessions of one primary.
    fn new_sub_session_with_ports(
        &self,
        name: &str,
        from_port: &str,
        to_port: &str,
    ) -> impl Future<Output = Result<Self::Sub, ProviderError>> + Send;

    /// Tear down this session and all of its sub-sessions
    fn close(&self) -> impl Future<Output = Result<(), ProviderError>> + Send;
}

/// Entry point into the router's control protocol
pub trait SessionProvider: Send + Sync {
    type Primary: PrimarySession;

    /// Ask the router to mint fresh destination key material
    fn generate_destination(
        &self,
    ) -> impl Future<Output = Result<DestinationKeys, ProviderError>> + Send;

    /// Create a primary session bound to `keys`
    ///
    /// Real routers build tunnels here; expect seconds to tens of
    /// seconds of latency.
    fn new_primary_session(
        &self,
        name: &str,
        keys: &DestinationKeys,
        options: &SessionOptions,
    ) -> impl Future<Output = Result<Self::Primary, ProviderError>> + Send;
}

impl ProviderError {
    /// Shorthand for a router refusal
    pub fn refused(reason: &str) -> Self {
        Self::Refused {
            reason: reason.to_string(),
        }
    }
}
