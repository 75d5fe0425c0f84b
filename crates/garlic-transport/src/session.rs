//! Session lifecycle against the router
//!
//! One primary session plus two derived sub-sessions are created
//! together when the transport is constructed and torn down together
//! when it closes. Nothing is recreated on transient failure; a
//! transport whose sessions are gone is finished.

use crate::error::TransportError;
use crate::provider::{DestinationKeys, PrimarySession, SessionOptions, SessionProvider};
use garlic_addr::{translate, LayeredAddr};
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::sync::Arc;
use tracing::{info, warn};

/// Default port the inbound sub-session accepts on
pub const INBOUND_FROM_PORT: &str = "0";

/// Reserved alternate port the outbound sub-session binds
///
/// The router rejects duplicate protocol+port pairs across the
/// sub-sessions of one primary, so the two constants must differ.
pub const OUTBOUND_FROM_PORT: &str = "1";

/// Destination-side port outbound streams target
pub const OUTBOUND_TO_PORT: &str = "0";

/// The three sessions a transport runs on, plus its advertised address
pub struct SessionBundle<P: PrimarySession> {
    pub primary: Arc<P>,
    pub inbound: Arc<P::Sub>,
    pub outbound: Arc<P::Sub>,
    /// The address the transport reports as its own listening address:
    /// the primary's destination in full form, independent of which
    /// sub-session actually accepts
    pub listen_addr: LayeredAddr,
}

impl<P: PrimarySession> std::fmt::Debug for SessionBundle<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionBundle")
            .field("listen_addr", &self.listen_addr)
            .finish_non_exhaustive()
    }
}

/// Derive the randomized session-name suffix from a caller seed
///
/// The seed is explicit so collision behavior is deterministic under
/// test; distinct transports sharing one router pass distinct seeds.
fn session_suffix(name_seed: u64) -> u32 {
    StdRng::seed_from_u64(name_seed).gen()
}

/// Create the primary and both sub-sessions
///
/// Blocking and slow: the router establishes tunnels here, which takes
/// seconds to tens of seconds depending on network conditions. No
/// internal timeout is applied; cancellation policy belongs to callers.
///
/// On sub-session failure the primary is closed before the error
/// returns, so no session outlives a failed construction.
pub async fn create_sessions<S: SessionProvider>(
    provider: &S,
    keys: &DestinationKeys,
    options: &SessionOptions,
    name_seed: u64,
) -> Result<SessionBundle<S::Primary>, TransportError> {
    let suffix = session_suffix(name_seed);

    let primary_name = format!("primary-{suffix}");
    info!(name = %primary_name, "creating primary session; tunnel establishment may take tens of seconds");
    let primary = provider
        .new_primary_session(&primary_name, keys, options)
        .await
        .map_err(|source| TransportError::SessionCreation {
            which: "primary",
            source,
        })?;

    let inbound = match primary.new_sub_session(&format!("inbound-{suffix}")).await {
        Ok(session) => session,
        Err(source) => {
            close_for_cleanup(&primary).await;
            return Err(TransportError::SessionCreation {
                which: "inbound",
                source,
            });
        }
    };

    let outbound = match primary
        .new_sub_session_with_ports(
            &format!("outbound-{suffix}"),
            OUTBOUND_FROM_PORT,
            OUTBOUND_TO_PORT,
        )
        .await
    {
        Ok(session) => session,
        Err(source) => {
            close_for_cleanup(&primary).await;
            return Err(TransportError::SessionCreation {
                which: "outbound",
                source,
            });
        }
    };

    let listen_addr = match translate::to_overlay_addr(&primary.destination()) {
        Ok(addr) => addr,
        Err(source) => {
            close_for_cleanup(&primary).await;
            return Err(TransportError::AddressTranslation {
                op: "listen address",
                source,
            });
        }
    };
    info!(addr = %listen_addr, "sessions established");

    Ok(SessionBundle {
        primary: Arc::new(primary),
        inbound: Arc::new(inbound),
        outbound: Arc::new(outbound),
        listen_addr,
    })
}

async fn close_for_cleanup<P: PrimarySession>(primary: &P) {
    if let Err(error) = primary.close().await {
        warn!(%error, "failed to close primary session during cleanup");
    }
}
