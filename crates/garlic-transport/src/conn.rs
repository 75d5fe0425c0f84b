//! Connection and listener adapters
//!
//! These wrap the provider's raw objects so they expose generic layered
//! addresses and behave as the connection type the upgrade pipeline
//! negotiates over. Wrapping performs no network I/O of its own; it only
//! reads the endpoint text the raw object already carries.

use crate::error::TransportError;
use crate::provider::{BoxRawConn, BoxRawListener};
use garlic_addr::{translate, AddrError, LayeredAddr};
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, ReadBuf};

/// A raw connection handed back because wrapping was refused
///
/// Returning the connection alongside the error keeps cleanup in the
/// caller's hands; nothing is closed behind its back.
pub struct WrapRejected {
    pub raw: BoxRawConn,
    pub source: AddrError,
}

impl std::fmt::Debug for WrapRejected {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WrapRejected")
            .field("source", &self.source)
            .finish_non_exhaustive()
    }
}

fn require_overlay(addr: &LayeredAddr) -> Result<(), AddrError> {
    if addr.is_overlay() {
        Ok(())
    } else {
        Err(AddrError::UnsupportedFamily(
            addr.first().protocol().to_string(),
        ))
    }
}

/// A raw overlay stream presented with generic addresses
///
/// Does not multiplex; stream capabilities appear only after the
/// upgrade pipeline has processed it. Dropping the connection closes the
/// underlying raw stream.
pub struct StreamConn {
    raw: BoxRawConn,
    local: LayeredAddr,
    remote: LayeredAddr,
}

impl std::fmt::Debug for StreamConn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamConn")
            .field("local", &self.local)
            .field("remote", &self.remote)
            .finish_non_exhaustive()
    }
}

impl StreamConn {
    /// Wrap a raw connection under the given addresses
    ///
    /// Both must be overlay addresses; otherwise the raw connection is
    /// handed back untouched.
    pub fn new(
        raw: BoxRawConn,
        local: LayeredAddr,
        remote: LayeredAddr,
    ) -> Result<Self, WrapRejected> {
        if let Err(source) = require_overlay(&local).and_then(|()| require_overlay(&remote)) {
            return Err(WrapRejected { raw, source });
        }
        Ok(Self { raw, local, remote })
    }

    /// Address this end is reachable at
    pub fn local_addr(&self) -> &LayeredAddr {
        &self.local
    }

    /// Address of the remote end
    pub fn remote_addr(&self) -> &LayeredAddr {
        &self.remote
    }

    /// Flush and shut down the underlying stream
    pub async fn close(&mut self) -> io::Result<()> {
        self.raw.shutdown().await
    }
}

impl AsyncRead for StreamConn {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.raw).poll_read(cx, buf)
    }
}

impl AsyncWrite for StreamConn {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.raw).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.raw).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.raw).poll_shutdown(cx)
    }
}

/// A raw overlay listener presented with a generic local address
pub struct StreamListener {
    raw: BoxRawListener,
    local: LayeredAddr,
}

impl StreamListener {
    /// Wrap a raw listener, deriving the local address from the
    /// destination it reports
    pub fn wrap(raw: BoxRawListener) -> Result<Self, TransportError> {
        let local = translate::to_overlay_addr(&raw.local_destination())
            .map_err(|source| TransportError::AdapterConstruction { source })?;
        Ok(Self { raw, local })
    }

    /// Address this listener is reachable at
    pub fn local_addr(&self) -> &LayeredAddr {
        &self.local
    }

    /// Wait for the next connection and wrap it
    ///
    /// The remote address is derived from the destination the raw
    /// connection reports for its far end.
    pub async fn accept(&mut self) -> Result<StreamConn, TransportError> {
        let mut raw = self
            .raw
            .accept()
            .await
            .map_err(|source| TransportError::AcceptFailed { source })?;

        let remote = match translate::to_overlay_addr(&raw.remote_destination()) {
            Ok(addr) => addr,
            Err(source) => {
                let _ = raw.shutdown().await;
                return Err(TransportError::AdapterConstruction { source });
            }
        };

        match StreamConn::new(raw, self.local.clone(), remote) {
            Ok(conn) => Ok(conn),
            Err(WrapRejected { mut raw, source }) => {
                let _ = raw.shutdown().await;
                Err(TransportError::AdapterConstruction { source })
            }
        }
    }
}
