//! The transport façade
//!
//! The one entry point the surrounding stack uses: validates
//! dialability, translates addresses, drives the raw dial/listen
//! primitives, wraps the results, acquires resource scopes, and hands
//! everything to the upgrade pipeline. Every failure path releases what
//! it acquired before returning.

use crate::conn::{StreamConn, StreamListener, WrapRejected};
use crate::error::TransportError;
use crate::peer::PeerId;
use crate::provider::{
    BoxRawConn, DestinationKeys, PrimarySession, ProviderError, Session, SessionOptions,
    SessionProvider,
};
use crate::rcmgr::{ResourceManager, ScopeHandle};
use crate::session;
use crate::upgrade::{Direction, Upgrader};
use garlic_addr::{translate, LayeredAddr, Protocol};
use std::fmt;
use std::io;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Human-readable transport name, also handed to the upgrade pipeline
/// as the transport identity
pub const TRANSPORT_NAME: &str = "i2p";

/// Address families this transport can dial
const DIALABLE: [Protocol; 2] = [Protocol::Garlic64, Protocol::Garlic32];

/// Construction parameters
#[derive(Clone, Copy, Debug, Default)]
pub struct TransportConfig {
    /// Seed for the randomized session-name suffix; distinct transports
    /// sharing a router must pass distinct seeds
    pub name_seed: u64,
    /// Tunnel parameters forwarded to the provider
    pub session: SessionOptions,
}

/// Overlay transport bound to one router-issued destination
///
/// Construction performs the session handshakes and is expensive (tens
/// of seconds under real network conditions). The instance is unusable
/// after [`close`](Self::close); sessions are never recreated.
pub struct GarlicTransport<P: PrimarySession, U> {
    upgrader: U,
    resources: Option<Arc<dyn ResourceManager>>,
    primary: Arc<P>,
    inbound: Arc<P::Sub>,
    outbound: Arc<P::Sub>,
    listen_addr: LayeredAddr,
}

impl<P: PrimarySession, U: Upgrader> GarlicTransport<P, U> {
    /// Create the session bundle and the transport around it
    pub async fn new<S>(
        provider: &S,
        keys: &DestinationKeys,
        config: TransportConfig,
        upgrader: U,
        resources: Option<Arc<dyn ResourceManager>>,
    ) -> Result<Self, TransportError>
    where
        S: SessionProvider<Primary = P>,
    {
        let bundle =
            session::create_sessions(provider, keys, &config.session, config.name_seed).await?;
        Ok(Self {
            upgrader,
            resources,
            primary: bundle.primary,
            inbound: bundle.inbound,
            outbound: bundle.outbound,
            listen_addr: bundle.listen_addr,
        })
    }

    /// The address this transport advertises for inbound connections
    pub fn listen_addr(&self) -> &LayeredAddr {
        &self.listen_addr
    }

    /// Whether this transport believes it can dial `addr`
    ///
    /// Pure and cheap, so callers probing several transports can skip
    /// this one quickly.
    pub fn can_dial(&self, addr: &LayeredAddr) -> bool {
        DIALABLE.contains(&addr.first().protocol())
    }

    /// Address families this transport dials
    pub fn protocols(&self) -> &'static [Protocol] {
        &DIALABLE
    }

    /// Dial `remote` and upgrade the resulting connection
    ///
    /// Cancellation is honored at checkpoints before and immediately
    /// after the raw dial, never during it: the provider primitive is
    /// not preemptible, so a cancelled dial still pays the full
    /// underlying latency before cleanup runs. A connection established
    /// after cancellation is closed and reported as cancelled, never
    /// returned.
    pub async fn dial(
        &self,
        cancel: &CancellationToken,
        remote: &LayeredAddr,
        expected_peer: Option<PeerId>,
    ) -> Result<U::Conn, TransportError> {
        if !self.can_dial(remote) {
            return Err(TransportError::NotDialable {
                addr: remote.clone(),
            });
        }

        let dest = translate::to_destination(remote)
            .map_err(|source| TransportError::AddressTranslation {
                op: "dial remote",
                source,
            })?
            .as_str()
            .to_string();

        if cancel.is_cancelled() {
            return Err(TransportError::DialCancelled { dest });
        }

        debug!(dest = %dest, "dialing overlay destination");
        let mut raw = self.raw_dial(cancel, &dest).await?;

        if cancel.is_cancelled() {
            let _ = raw.shutdown().await;
            return Err(TransportError::DialCancelled { dest });
        }

        let local = match translate::to_overlay_addr(&self.outbound.destination()) {
            Ok(addr) => addr,
            Err(source) => {
                let _ = raw.shutdown().await;
                return Err(TransportError::AddressTranslation {
                    op: "dial local",
                    source,
                });
            }
        };

        let mut conn = match StreamConn::new(raw, local, remote.clone()) {
            Ok(conn) => conn,
            Err(WrapRejected { mut raw, source }) => {
                let _ = raw.shutdown().await;
                return Err(TransportError::AdapterConstruction { source });
            }
        };

        let scope = match &self.resources {
            None => None,
            Some(manager) => {
                match manager.open_connection(Direction::Outbound, false, remote) {
                    Ok(scope) => Some(ScopeHandle::new(scope)),
                    Err(source) => {
                        let _ = conn.close().await;
                        return Err(TransportError::ResourceLimit {
                            addr: remote.clone(),
                            source,
                        });
                    }
                }
            }
        };

        if cancel.is_cancelled() {
            let _ = conn.close().await;
            if let Some(scope) = &scope {
                scope.release();
            }
            return Err(TransportError::DialCancelled { dest });
        }

        match self
            .upgrader
            .upgrade(
                cancel,
                TRANSPORT_NAME,
                conn,
                Direction::Outbound,
                expected_peer,
                scope.clone(),
            )
            .await
        {
            Ok(upgraded) => {
                debug!(dest = %dest, "outbound connection established");
                Ok(upgraded)
            }
            Err(source) => {
                if let Some(scope) = &scope {
                    scope.release();
                }
                if cancel.is_cancelled() {
                    Err(TransportError::UpgradeCancelled { dest })
                } else {
                    Err(TransportError::UpgradeFailed { dest, source })
                }
            }
        }
    }

    /// Issue the non-preemptible raw dial and race it against the token
    async fn raw_dial(
        &self,
        cancel: &CancellationToken,
        dest: &str,
    ) -> Result<BoxRawConn, TransportError> {
        let outbound = Arc::clone(&self.outbound);
        let dial_dest = dest.to_string();
        let mut attempt = tokio::spawn(async move { outbound.dial(&dial_dest).await });

        enum Outcome {
            Joined(Result<Result<BoxRawConn, ProviderError>, JoinError>),
            Cancelled,
        }

        let outcome = tokio::select! {
            biased;
            joined = &mut attempt => Outcome::Joined(joined),
            () = cancel.cancelled() => Outcome::Cancelled,
        };

        match outcome {
            Outcome::Joined(Ok(Ok(conn))) => Ok(conn),
            Outcome::Joined(Ok(Err(source))) => {
                if cancel.is_cancelled() {
                    return Err(TransportError::DialCancelled {
                        dest: dest.to_string(),
                    });
                }
                Err(TransportError::DialFailed {
                    dest: dest.to_string(),
                    source,
                })
            }
            Outcome::Joined(Err(join_error)) => Err(TransportError::DialFailed {
                dest: dest.to_string(),
                source: ProviderError::Io(io::Error::other(join_error)),
            }),
            Outcome::Cancelled => {
                // The attempt cannot be stopped early; reap whatever it
                // eventually yields so no connection leaks.
                let reap_dest = dest.to_string();
                tokio::spawn(async move {
                    if let Ok(Ok(mut conn)) = attempt.await {
                        warn!(dest = %reap_dest, "closing connection established after cancellation");
                        let _ = conn.shutdown().await;
                    }
                });
                Err(TransportError::DialCancelled {
                    dest: dest.to_string(),
                })
            }
        }
    }

    /// Bind the listener and hand it to the upgrade pipeline
    ///
    /// The address argument is ignored: this transport can only listen
    /// on the one destination the router issued it, so `addr` exists
    /// purely for interface compatibility with transports that bind
    /// arbitrary addresses.
    pub async fn listen(&self, _addr: &LayeredAddr) -> Result<U::Listener, TransportError> {
        let raw = self
            .inbound
            .listen()
            .await
            .map_err(|source| TransportError::ListenFailed { source })?;
        let listener = StreamListener::wrap(raw)?;
        info!(addr = %listener.local_addr(), "listening on overlay destination");
        Ok(self.upgrader.upgrade_listener(TRANSPORT_NAME, listener))
    }

    /// Tear down all sessions by closing the primary
    ///
    /// Sub-sessions are torn down transitively at the provider. Errors
    /// are logged, not returned; whether a second close is tolerated is
    /// the provider's business. No other operation may be invoked
    /// concurrently with, or after, this one.
    pub async fn close(&self) {
        if let Err(error) = self.primary.close().await {
            warn!(%error, "failed to close primary session");
        }
    }
}

impl<P: PrimarySession, U> fmt::Display for GarlicTransport<P, U> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(TRANSPORT_NAME)
    }
}
