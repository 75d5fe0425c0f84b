//! Contract for resource accounting
//!
//! The resource manager is an optional capability: a transport built
//! without one simply skips scope acquisition. When present, every dial
//! opens a connection scope that is released exactly once: on the
//! failure path by the transport, on success by whoever ends up owning
//! the upgraded connection.

use crate::upgrade::Direction;
use garlic_addr::LayeredAddr;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Refusal reported by the resource manager
#[derive(Debug, Error)]
#[error("{0}")]
pub struct ResourceError(pub String);

/// An accounting handle for one admitted connection
pub trait ConnScope: Send {
    /// Release the admission
    fn done(&mut self);
}

/// Admission control for new connections
pub trait ResourceManager: Send + Sync {
    fn open_connection(
        &self,
        direction: Direction,
        privileged: bool,
        remote: &LayeredAddr,
    ) -> Result<Box<dyn ConnScope>, ResourceError>;
}

/// Shared, at-most-once wrapper around a connection scope
///
/// Both the transport's failure paths and the upgrade pipeline may try
/// to release the same scope; whichever calls first wins and the scope's
/// `done` runs exactly once.
#[derive(Clone)]
pub struct ScopeHandle {
    inner: Arc<Mutex<Option<Box<dyn ConnScope>>>>,
}

impl ScopeHandle {
    pub fn new(scope: Box<dyn ConnScope>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Some(scope))),
        }
    }

    /// Release the underlying scope; later calls are no-ops
    pub fn release(&self) {
        if let Some(mut scope) = self.inner.lock().take() {
            scope.done();
        }
    }

    /// Whether the scope is still held
    pub fn is_held(&self) -> bool {
        self.inner.lock().is_some()
    }
}

impl fmt::Debug for ScopeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopeHandle")
            .field("held", &self.is_held())
            .finish()
    }
}
