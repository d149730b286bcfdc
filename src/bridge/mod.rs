//! The blocking binding surface.
//!
//! Mirrors the native API's functional groups:
//! - `database`: open and close in every mode
//! - `connection`: connect, direct execute/query, connection state
//! - `statement`: prepare, bind, execute, query, reset, free
//! - `rows`: cursor consumption, column metadata, typed row access, buffers
//!
//! Replication sync lives in `crate::sync`.

pub(crate) mod resources;

mod connection;
mod database;
mod rows;
mod statement;

use std::future::Future;
use std::sync::Arc;

use tokio::runtime::Runtime;
use tracing::debug;

use crate::config::BridgeConfig;
use crate::error::{BridgeError, Result};
use crate::registry::{
    BufferHandle, ConnectionHandle, DatabaseHandle, Handle, Registry, RowHandle, RowsHandle,
    StatementHandle, SyncHandle, Token,
};
use crate::sync::SyncEntry;

pub use resources::{BufferKind, StatementState};
use resources::{
    BridgeResource, BufferEntry, ConnectionEntry, DatabaseEntry, RowEntry, RowsEntry,
    StatementEntry,
};

/// Safe front door to the native library.
///
/// Every native object is reached through a registry token, so a host that
/// holds on to a released handle gets `StaleHandle` instead of touching freed
/// memory. The bridge is cheap to clone and can be shared across threads.
///
/// All operations block the calling thread. Calls made from a thread that
/// has a tokio runtime context (including `spawn_blocking` workers) fail with
/// `RuntimeError`; async hosts should call from a plain `std::thread`.
///
/// ```no_run
/// use libsql_bridge::{Bridge, OpenMode, Value};
///
/// # fn main() -> Result<(), libsql_bridge::BridgeError> {
/// let bridge = Bridge::new()?;
/// let db = bridge.open(":memory:", OpenMode::Memory)?;
/// let conn = bridge.connect(db)?;
/// bridge.execute(conn, "CREATE TABLE t(a INTEGER)", &[])?;
/// bridge.execute(conn, "INSERT INTO t VALUES (?)", &[Value::Integer(1)])?;
/// bridge.close_database(db)?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Bridge {
    inner: Arc<BridgeInner>,
}

struct BridgeInner {
    registry: Registry<BridgeResource>,
    runtime: Option<Runtime>,
    config: BridgeConfig,
}

impl Drop for BridgeInner {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

impl std::fmt::Debug for Bridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bridge")
            .field("config", &self.inner.config)
            .field("live_handles", &self.live_handles())
            .finish()
    }
}

macro_rules! lookup {
    ($fn_name:ident, $handle:ty, $variant:ident, $entry:ty) => {
        pub(crate) fn $fn_name(&self, handle: $handle) -> Result<Arc<$entry>> {
            match self.inner.registry.get(handle.token())? {
                BridgeResource::$variant(entry) => Ok(entry),
                _ => Err(BridgeError::StaleHandle(format!(
                    "{handle} does not name a {}",
                    <$handle>::KIND
                ))),
            }
        }
    };
}

impl Bridge {
    /// Bridge with the default configuration.
    ///
    /// # Errors
    /// Returns `BridgeError::RuntimeError` if the internal runtime cannot start.
    pub fn new() -> Result<Self> {
        Self::with_config(BridgeConfig::default())
    }

    /// # Errors
    /// Returns `BridgeError::ConfigError` for an invalid config and
    /// `BridgeError::RuntimeError` if the internal runtime cannot start.
    pub fn with_config(config: BridgeConfig) -> Result<Self> {
        config.validate()?;
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(config.worker_threads)
            .thread_name(config.thread_name.clone())
            .enable_all()
            .build()
            .map_err(|e| BridgeError::RuntimeError(format!("Failed to start runtime: {e}")))?;
        debug!(workers = config.worker_threads, "bridge started");
        Ok(Self {
            inner: Arc::new(BridgeInner {
                registry: Registry::new(),
                runtime: Some(runtime),
                config,
            }),
        })
    }

    #[must_use]
    pub fn config(&self) -> &BridgeConfig {
        &self.inner.config
    }

    /// Number of live handles of every kind.
    #[must_use]
    pub fn live_handles(&self) -> usize {
        self.inner.registry.live_count()
    }

    /// Release any handle, cascading to everything it owns.
    ///
    /// # Errors
    /// `StaleHandle` if the handle was already released.
    pub fn release<H: Handle>(&self, handle: H) -> Result<()> {
        self.release_token(handle.token())
    }

    /// Tie `handle` to a scope: it is released when the guard drops.
    #[must_use]
    pub fn guard<H: Handle>(&self, handle: H) -> HandleGuard<H> {
        HandleGuard {
            bridge: self.clone(),
            handle,
            armed: true,
        }
    }

    /// Handles directly owned by `handle`.
    ///
    /// # Errors
    /// `StaleHandle` if the handle is not live.
    pub fn children<H: Handle>(&self, handle: H) -> Result<Vec<Token>> {
        self.inner.registry.children(handle.token())
    }

    pub(crate) fn runtime(&self) -> Result<&Runtime> {
        self.inner
            .runtime
            .as_ref()
            .ok_or_else(|| BridgeError::RuntimeError("runtime already shut down".to_string()))
    }

    /// Drive a native future to completion on the bridge runtime.
    pub(crate) fn block_on<F: Future>(&self, fut: F) -> Result<F::Output> {
        if tokio::runtime::Handle::try_current().is_ok() {
            return Err(BridgeError::RuntimeError(
                "blocking bridge call made from inside an async runtime".to_string(),
            ));
        }
        Ok(self.runtime()?.block_on(fut))
    }

    pub(crate) fn register<H: Handle>(
        &self,
        parent: Option<Token>,
        resource: BridgeResource,
    ) -> Result<H> {
        let token = self.inner.registry.insert(parent, resource)?;
        Ok(H::from_token(token))
    }

    pub(crate) fn release_token(&self, token: Token) -> Result<()> {
        let released = self.inner.registry.release(token)?;
        self.dispose(released);
        Ok(())
    }

    /// Release the `kind` children of `parent`, keeping `parent` itself.
    pub(crate) fn release_children(
        &self,
        parent: Token,
        kind: crate::registry::HandleKind,
    ) -> Result<()> {
        let released = self.inner.registry.release_children(parent, kind)?;
        self.dispose(released);
        Ok(())
    }

    /// Run release side effects, then drop the native objects inside the
    /// runtime context. The registry lock is not held here.
    fn dispose(&self, released: Vec<BridgeResource>) {
        for resource in &released {
            resource.on_release();
        }
        match self.runtime() {
            Ok(runtime) => {
                let _ctx = runtime.enter();
                drop(released);
            }
            Err(_) => drop(released),
        }
    }

    lookup!(database, DatabaseHandle, Database, DatabaseEntry);
    lookup!(connection, ConnectionHandle, Connection, ConnectionEntry);
    lookup!(statement, StatementHandle, Statement, StatementEntry);
    lookup!(rows, RowsHandle, Rows, RowsEntry);
    lookup!(row, RowHandle, Row, RowEntry);
    lookup!(buffer, BufferHandle, Buffer, BufferEntry);
    lookup!(sync_future, SyncHandle, Sync, SyncEntry);
}

/// Releases its handle when dropped, on every exit path.
///
/// A handle already released through another route is ignored.
pub struct HandleGuard<H: Handle> {
    bridge: Bridge,
    handle: H,
    armed: bool,
}

impl<H: Handle> HandleGuard<H> {
    #[must_use]
    pub fn handle(&self) -> H {
        self.handle
    }

    /// Stop guarding and hand the handle back to the caller.
    #[must_use]
    pub fn into_inner(mut self) -> H {
        self.armed = false;
        self.handle
    }
}

impl<H: Handle> std::ops::Deref for HandleGuard<H> {
    type Target = H;

    fn deref(&self) -> &H {
        &self.handle
    }
}

impl<H: Handle> Drop for HandleGuard<H> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        if let Err(e) = self.bridge.release(self.handle) {
            debug!(handle = %self.handle, error = %e, "guarded handle was already released");
        }
    }
}
