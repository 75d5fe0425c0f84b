//! In-memory session provider
//!
//! A provider backed by an in-process router object and byte pipes,
//! for hermetic tests and embedders that want to exercise the full
//! transport path without a real router. It enforces the same refusals
//! a real router would: duplicate session names, duplicate destinations,
//! and duplicate protocol+port pairs under one primary.
//!
//! Name resolution is out of scope: dials match listening destinations
//! by exact text, so hash-form lookups are answered with the same
//! refusal as an unreachable peer.

use crate::provider::{
    refusal, BoxFuture, BoxRawConn, BoxRawListener, DestinationKeys, PrimarySession,
    ProviderError, RawConn, RawListener, Session, SessionOptions, SessionProvider,
};
use garlic_addr::dest::MIN_DEST_BYTES;
use garlic_addr::encoding::b64_encode;
use parking_lot::Mutex;
use rand::{rngs::StdRng, RngCore, SeedableRng};
use std::collections::{HashMap, HashSet};
use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, DuplexStream, ReadBuf};
use tokio::sync::mpsc;

/// Stream protocol tag sessions bind under
const STREAM_PROTOCOL: &str = "STREAM";

/// Capacity of each direction of an in-memory stream
const PIPE_CAPACITY: usize = 64 * 1024;

/// Accept queue depth per listener
const BACKLOG: usize = 16;

struct PendingConn {
    stream: DuplexStream,
    remote_destination: String,
}

struct RouterInner {
    rng: Mutex<StdRng>,
    names: Mutex<HashSet<String>>,
    destinations: Mutex<HashSet<String>>,
    listeners: Mutex<HashMap<String, mpsc::Sender<PendingConn>>>,
}

/// Shared in-process router all sessions of a test talk to
#[derive(Clone)]
pub struct MemoryRouter {
    inner: Arc<RouterInner>,
}

impl MemoryRouter {
    /// Create a router whose minted destinations derive from `seed`
    pub fn new(seed: u64) -> Self {
        Self {
            inner: Arc::new(RouterInner {
                rng: Mutex::new(StdRng::seed_from_u64(seed)),
                names: Mutex::new(HashSet::new()),
                destinations: Mutex::new(HashSet::new()),
                listeners: Mutex::new(HashMap::new()),
            }),
        }
    }
}

impl SessionProvider for MemoryRouter {
    type Primary = MemoryPrimary;

    async fn generate_destination(&self) -> Result<DestinationKeys, ProviderError> {
        let (destination, private_key) = {
            let mut rng = self.inner.rng.lock();
            let mut dest_bytes = vec![0u8; MIN_DEST_BYTES];
            rng.fill_bytes(&mut dest_bytes);
            let mut key_bytes = [0u8; 32];
            rng.fill_bytes(&mut key_bytes);
            (b64_encode(&dest_bytes), b64_encode(&key_bytes))
        };
        Ok(DestinationKeys::new(destination, private_key))
    }

    async fn new_primary_session(
        &self,
        name: &str,
        keys: &DestinationKeys,
        _options: &SessionOptions,
    ) -> Result<MemoryPrimary, ProviderError> {
        if !self.inner.names.lock().insert(name.to_string()) {
            return Err(ProviderError::refused(refusal::DUPLICATED_ID));
        }
        if !self
            .inner
            .destinations
            .lock()
            .insert(keys.destination().to_string())
        {
            self.inner.names.lock().remove(name);
            return Err(ProviderError::refused(refusal::DUPLICATED_DEST));
        }
        Ok(MemoryPrimary {
            router: Arc::clone(&self.inner),
            shared: Arc::new(PrimaryShared {
                destination: keys.destination().to_string(),
                closed: AtomicBool::new(false),
                names: Mutex::new(vec![name.to_string()]),
                ports: Mutex::new(HashSet::new()),
            }),
        })
    }
}

struct PrimaryShared {
    destination: String,
    closed: AtomicBool,
    names: Mutex<Vec<String>>,
    ports: Mutex<HashSet<(String, String)>>,
}

impl PrimaryShared {
    fn check_open(&self) -> Result<(), ProviderError> {
        if self.closed.load(Ordering::SeqCst) {
            Err(ProviderError::SessionClosed)
        } else {
            Ok(())
        }
    }
}

/// Primary session of the in-memory provider
pub struct MemoryPrimary {
    router: Arc<RouterInner>,
    shared: Arc<PrimaryShared>,
}

impl std::fmt::Debug for MemoryPrimary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryPrimary").finish_non_exhaustive()
    }
}

impl MemoryPrimary {
    fn sub(&self, name: &str, from_port: &str) -> Result<MemorySession, ProviderError> {
        self.shared.check_open()?;
        if !self.router.names.lock().insert(name.to_string()) {
            return Err(ProviderError::refused(refusal::DUPLICATED_ID));
        }
        let port_key = (STREAM_PROTOCOL.to_string(), from_port.to_string());
        if !self.shared.ports.lock().insert(port_key) {
            self.router.names.lock().remove(name);
            return Err(ProviderError::refused(refusal::DUPLICATED_PORT));
        }
        self.shared.names.lock().push(name.to_string());
        Ok(MemorySession {
            router: Arc::clone(&self.router),
            shared: Arc::clone(&self.shared),
        })
    }
}

impl PrimarySession for MemoryPrimary {
    type Sub = MemorySession;

    fn destination(&self) -> String {
        self.shared.destination.clone()
    }

    async fn new_sub_session(&self, name: &str) -> Result<MemorySession, ProviderError> {
        self.sub(name, "0")
    }

    async fn new_sub_session_with_ports(
        &self,
        name: &str,
        from_port: &str,
        _to_port: &str,
    ) -> Result<MemorySession, ProviderError> {
        self.sub(name, from_port)
    }

    async fn close(&self) -> Result<(), ProviderError> {
        if self.shared.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.router.listeners.lock().remove(&self.shared.destination);
        self.router
            .destinations
            .lock()
            .remove(&self.shared.destination);
        let names: Vec<String> = self.shared.names.lock().drain(..).collect();
        let mut registry = self.router.names.lock();
        for name in names {
            registry.remove(&name);
        }
        Ok(())
    }
}

/// Sub-session of the in-memory provider
pub struct MemorySession {
    router: Arc<RouterInner>,
    shared: Arc<PrimaryShared>,
}

impl std::fmt::Debug for MemorySession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemorySession").finish_non_exhaustive()
    }
}

impl Session for MemorySession {
    fn destination(&self) -> String {
        self.shared.destination.clone()
    }

    async fn dial(&self, dest: &str) -> Result<BoxRawConn, ProviderError> {
        self.shared.check_open()?;
        let sender = self.router.listeners.lock().get(dest).cloned();
        let Some(sender) = sender else {
            return Err(ProviderError::refused(refusal::CANT_REACH_PEER));
        };

        let (near, far) = tokio::io::duplex(PIPE_CAPACITY);
        sender
            .send(PendingConn {
                stream: far,
                remote_destination: self.shared.destination.clone(),
            })
            .await
            .map_err(|_| ProviderError::refused(refusal::CANT_REACH_PEER))?;

        Ok(Box::new(MemoryConn {
            stream: near,
            local: self.shared.destination.clone(),
            remote: dest.to_string(),
        }))
    }

    async fn listen(&self) -> Result<BoxRawListener, ProviderError> {
        self.shared.check_open()?;
        let (sender, receiver) = mpsc::channel(BACKLOG);
        {
            let mut listeners = self.router.listeners.lock();
            if listeners.contains_key(&self.shared.destination) {
                return Err(ProviderError::refused(refusal::ALREADY_ACCEPTING));
            }
            listeners.insert(self.shared.destination.clone(), sender);
        }
        Ok(Box::new(MemoryListener {
            destination: self.shared.destination.clone(),
            receiver,
        }))
    }
}

struct MemoryListener {
    destination: String,
    receiver: mpsc::Receiver<PendingConn>,
}

impl std::fmt::Debug for MemoryListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryListener")
            .field("destination", &self.destination)
            .finish_non_exhaustive()
    }
}

impl RawListener for MemoryListener {
    fn local_destination(&self) -> String {
        self.destination.clone()
    }

    fn accept(&mut self) -> BoxFuture<'_, Result<BoxRawConn, ProviderError>> {
        Box::pin(async move {
            match self.receiver.recv().await {
                Some(pending) => Ok(Box::new(MemoryConn {
                    stream: pending.stream,
                    local: self.destination.clone(),
                    remote: pending.remote_destination,
                }) as BoxRawConn),
                None => Err(ProviderError::SessionClosed),
            }
        })
    }
}

struct MemoryConn {
    stream: DuplexStream,
    local: String,
    remote: String,
}

impl std::fmt::Debug for MemoryConn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryConn")
            .field("local", &self.local)
            .field("remote", &self.remote)
            .finish_non_exhaustive()
    }
}

impl RawConn for MemoryConn {
    fn local_destination(&self) -> String {
        self.local.clone()
    }

    fn remote_destination(&self) -> String {
        self.remote.clone()
    }
}

impl AsyncRead for MemoryConn {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.stream).poll_read(cx, buf)
    }
}

impl AsyncWrite for MemoryConn {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.stream).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.stream).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.stream).poll_shutdown(cx)
    }
}
