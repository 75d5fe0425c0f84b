//! Shared fakes for unit tests
//!
//! A scriptable session provider, a counting resource manager, and a
//! pass-through upgrader, instrumented so tests can assert that every
//! acquired resource is released exactly once.

use crate::conn::{StreamConn, StreamListener};
use crate::peer::PeerId;
use crate::provider::{
    refusal, BoxFuture, BoxRawConn, BoxRawListener, DestinationKeys, PrimarySession,
    ProviderError, RawConn, RawListener, Session, SessionOptions, SessionProvider,
};
use crate::rcmgr::{ConnScope, ResourceError, ResourceManager, ScopeHandle};
use crate::upgrade::{Direction, UpgradeError, Upgrader};
use garlic_addr::dest::MIN_DEST_BYTES;
use garlic_addr::encoding::b64_encode;
use garlic_addr::LayeredAddr;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, DuplexStream, ReadBuf};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

/// Deterministic full-form destination text
pub fn full_dest(tag: u8) -> String {
    b64_encode(&[tag; MIN_DEST_BYTES])
}

/// Raw connection whose closure is observable through a shared flag
pub struct FakeConn {
    stream: DuplexStream,
    local: String,
    remote: String,
    closed: Arc<AtomicBool>,
}

impl FakeConn {
    pub fn over(stream: DuplexStream, local: &str, remote: &str) -> (Self, Arc<AtomicBool>) {
        let closed = Arc::new(AtomicBool::new(false));
        (
            Self {
                stream,
                local: local.to_string(),
                remote: remote.to_string(),
                closed: closed.clone(),
            },
            closed,
        )
    }

    /// A connection whose far end is already gone (reads yield EOF)
    pub fn pair_end(local: &str, remote: &str) -> (Self, Arc<AtomicBool>) {
        let (near, far) = tokio::io::duplex(1024);
        drop(far);
        Self::over(near, local, remote)
    }
}

impl AsyncRead for FakeConn {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.stream).poll_read(cx, buf)
    }
}

impl AsyncWrite for FakeConn {
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
        self.closed.store(true, Ordering::SeqCst);
        Pin::new(&mut self.stream).poll_shutdown(cx)
    }
}

impl std::fmt::Debug for FakeConn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FakeConn")
            .field("local", &self.local)
            .field("remote", &self.remote)
            .finish_non_exhaustive()
    }
}

impl RawConn for FakeConn {
    fn local_destination(&self) -> String {
        self.local.clone()
    }

    fn remote_destination(&self) -> String {
        self.remote.clone()
    }
}

impl Drop for FakeConn {
    fn drop(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// Raw listener yielding a scripted queue of connections
pub struct FakeListener {
    dest: String,
    queue: VecDeque<FakeConn>,
}

impl FakeListener {
    pub fn queue(dest: &str, conns: Vec<FakeConn>) -> Self {
        Self {
            dest: dest.to_string(),
            queue: conns.into(),
        }
    }
}

impl std::fmt::Debug for FakeListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FakeListener")
            .field("dest", &self.dest)
            .finish_non_exhaustive()
    }
}

impl RawListener for FakeListener {
    fn local_destination(&self) -> String {
        self.dest.clone()
    }

    fn accept(&mut self) -> BoxFuture<'_, Result<BoxRawConn, ProviderError>> {
        Box::pin(async move {
            match self.queue.pop_front() {
                Some(conn) => Ok(Box::new(conn) as BoxRawConn),
                None => Err(ProviderError::SessionClosed),
            }
        })
    }
}

/// Which provider operation the fake should fail
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailPoint {
    None,
    Primary,
    InboundSub,
    OutboundSub,
    Listen,
}

/// How the fake session answers a dial
#[derive(Clone, Default)]
pub enum DialPlan {
    #[default]
    Succeed,
    Fail,
    /// Cancel the given token, then succeed anyway: the "connection
    /// established after cancellation" case
    CancelThenSucceed(CancellationToken),
    /// Park until notified, then succeed: the in-flight case
    WaitThenSucceed(Arc<Notify>),
}

pub struct FakeState {
    dest: String,
    fail_at: Mutex<FailPoint>,
    dial_plan: Mutex<DialPlan>,
    created_names: Mutex<Vec<String>>,
    bound_ports: Mutex<Vec<(String, String)>>,
    dials: AtomicUsize,
    listens: AtomicUsize,
    primary_closes: AtomicUsize,
    conns: Mutex<Vec<Arc<AtomicBool>>>,
}

/// Scriptable session provider
#[derive(Clone)]
pub struct FakeNet {
    state: Arc<FakeState>,
}

impl FakeNet {
    pub fn new() -> Self {
        Self {
            state: Arc::new(FakeState {
                dest: full_dest(9),
                fail_at: Mutex::new(FailPoint::None),
                dial_plan: Mutex::new(DialPlan::Succeed),
                created_names: Mutex::new(Vec::new()),
                bound_ports: Mutex::new(Vec::new()),
                dials: AtomicUsize::new(0),
                listens: AtomicUsize::new(0),
                primary_closes: AtomicUsize::new(0),
                conns: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn failing_at(self, point: FailPoint) -> Self {
        *self.state.fail_at.lock() = point;
        self
    }

    pub fn set_dial_plan(&self, plan: DialPlan) {
        *self.state.dial_plan.lock() = plan;
    }

    pub fn keys(&self) -> DestinationKeys {
        DestinationKeys::new(self.state.dest.clone(), "fake-private-key".to_string())
    }

    pub fn created_names(&self) -> Vec<String> {
        self.state.created_names.lock().clone()
    }

    pub fn bound_ports(&self) -> Vec<(String, String)> {
        self.state.bound_ports.lock().clone()
    }

    pub fn dial_count(&self) -> usize {
        self.state.dials.load(Ordering::SeqCst)
    }

    pub fn listen_count(&self) -> usize {
        self.state.listens.load(Ordering::SeqCst)
    }

    pub fn primary_close_count(&self) -> usize {
        self.state.primary_closes.load(Ordering::SeqCst)
    }

    pub fn conn_count(&self) -> usize {
        self.state.conns.lock().len()
    }

    pub fn open_conn_count(&self) -> usize {
        self.state
            .conns
            .lock()
            .iter()
            .filter(|closed| !closed.load(Ordering::SeqCst))
            .count()
    }
}

impl SessionProvider for FakeNet {
    type Primary = FakePrimary;

    async fn generate_destination(&self) -> Result<DestinationKeys, ProviderError> {
        Ok(self.keys())
    }

    async fn new_primary_session(
        &self,
        name: &str,
        keys: &DestinationKeys,
        _options: &SessionOptions,
    ) -> Result<FakePrimary, ProviderError> {
        if *self.state.fail_at.lock() == FailPoint::Primary {
            return Err(ProviderError::refused(refusal::DUPLICATED_ID));
        }
        self.state.created_names.lock().push(name.to_string());
        Ok(FakePrimary {
            state: self.state.clone(),
            dest: keys.destination().to_string(),
        })
    }
}

pub struct FakePrimary {
    state: Arc<FakeState>,
    dest: String,
}

impl FakePrimary {
    fn sub(
        &self,
        name: &str,
        from_port: &str,
        to_port: &str,
        point: FailPoint,
    ) -> Result<FakeSession, ProviderError> {
        if *self.state.fail_at.lock() == point {
            return Err(ProviderError::refused(refusal::DUPLICATED_PORT));
        }
        self.state.created_names.lock().push(name.to_string());
        self.state
            .bound_ports
            .lock()
            .push((from_port.to_string(), to_port.to_string()));
        Ok(FakeSession {
            state: self.state.clone(),
            dest: self.dest.clone(),
        })
    }
}

impl PrimarySession for FakePrimary {
    type Sub = FakeSession;

    fn destination(&self) -> String {
        self.dest.clone()
    }

    async fn new_sub_session(&self, name: &str) -> Result<FakeSession, ProviderError> {
        self.sub(name, "0", "0", FailPoint::InboundSub)
    }

    async fn new_sub_session_with_ports(
        &self,
        name: &str,
        from_port: &str,
        to_port: &str,
    ) -> Result<FakeSession, ProviderError> {
        self.sub(name, from_port, to_port, FailPoint::OutboundSub)
    }

    async fn close(&self) -> Result<(), ProviderError> {
        self.state.primary_closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub struct FakeSession {
    state: Arc<FakeState>,
    dest: String,
}

impl FakeSession {
    fn make_conn(&self, remote: &str) -> BoxRawConn {
        let (conn, closed) = FakeConn::pair_end(&self.dest, remote);
        self.state.conns.lock().push(closed);
        Box::new(conn)
    }
}

impl Session for FakeSession {
    fn destination(&self) -> String {
        self.dest.clone()
    }

    async fn dial(&self, dest: &str) -> Result<BoxRawConn, ProviderError> {
        self.state.dials.fetch_add(1, Ordering::SeqCst);
        let plan = self.state.dial_plan.lock().clone();
        match plan {
            DialPlan::Succeed => Ok(self.make_conn(dest)),
            DialPlan::Fail => Err(ProviderError::refused(refusal::CANT_REACH_PEER)),
            DialPlan::CancelThenSucceed(token) => {
                token.cancel();
                Ok(self.make_conn(dest))
            }
            DialPlan::WaitThenSucceed(notify) => {
                notify.notified().await;
                Ok(self.make_conn(dest))
            }
        }
    }

    async fn listen(&self) -> Result<BoxRawListener, ProviderError> {
        self.state.listens.fetch_add(1, Ordering::SeqCst);
        if *self.state.fail_at.lock() == FailPoint::Listen {
            return Err(ProviderError::SessionClosed);
        }
        Ok(Box::new(FakeListener::queue(&self.dest, vec![])))
    }
}

/// Resource manager counting scope opens and releases
pub struct CountingRcmgr {
    refuse: bool,
    opened: AtomicUsize,
    released: Arc<AtomicUsize>,
}

impl CountingRcmgr {
    pub fn admitting() -> Arc<Self> {
        Arc::new(Self {
            refuse: false,
            opened: AtomicUsize::new(0),
            released: Arc::new(AtomicUsize::new(0)),
        })
    }

    pub fn refusing() -> Arc<Self> {
        Arc::new(Self {
            refuse: true,
            opened: AtomicUsize::new(0),
            released: Arc::new(AtomicUsize::new(0)),
        })
    }

    pub fn open_count(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn release_count(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }
}

struct CountingScope {
    released: Arc<AtomicUsize>,
    done: bool,
}

impl ConnScope for CountingScope {
    fn done(&mut self) {
        if !self.done {
            self.done = true;
            self.released.fetch_add(1, Ordering::SeqCst);
        }
    }
}

impl ResourceManager for CountingRcmgr {
    fn open_connection(
        &self,
        _direction: Direction,
        _privileged: bool,
        _remote: &LayeredAddr,
    ) -> Result<Box<dyn ConnScope>, ResourceError> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        if self.refuse {
            return Err(ResourceError("connection limit exceeded".to_string()));
        }
        Ok(Box::new(CountingScope {
            released: self.released.clone(),
            done: false,
        }))
    }
}

/// How the fake upgrader answers
#[derive(Clone, Copy)]
pub enum UpgradePlan {
    Succeed,
    Fail,
    /// Cancel the token mid-upgrade, then fail: the cancelled-during-
    /// upgrade case
    CancelThenFail,
}

/// Pass-through upgrader with scriptable failure
pub struct FakeUpgrader {
    plan: UpgradePlan,
}

impl FakeUpgrader {
    pub fn succeeding() -> Self {
        Self {
            plan: UpgradePlan::Succeed,
        }
    }

    pub fn failing() -> Self {
        Self {
            plan: UpgradePlan::Fail,
        }
    }

    pub fn cancelling() -> Self {
        Self {
            plan: UpgradePlan::CancelThenFail,
        }
    }
}

impl Upgrader for FakeUpgrader {
    type Conn = StreamConn;
    type Listener = FakeUpgradedListener;

    async fn upgrade(
        &self,
        cancel: &CancellationToken,
        _transport: &'static str,
        conn: StreamConn,
        _direction: Direction,
        _expected_peer: Option<PeerId>,
        _scope: Option<ScopeHandle>,
    ) -> Result<StreamConn, UpgradeError> {
        match self.plan {
            UpgradePlan::Succeed => Ok(conn),
            UpgradePlan::Fail => Err(UpgradeError("security handshake failed".to_string())),
            UpgradePlan::CancelThenFail => {
                cancel.cancel();
                Err(UpgradeError("security handshake aborted".to_string()))
            }
        }
    }

    fn upgrade_listener(
        &self,
        _transport: &'static str,
        listener: StreamListener,
    ) -> FakeUpgradedListener {
        FakeUpgradedListener { inner: listener }
    }
}

pub struct FakeUpgradedListener {
    pub inner: StreamListener,
}

impl std::fmt::Debug for FakeUpgradedListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FakeUpgradedListener").finish_non_exhaustive()
    }
}
