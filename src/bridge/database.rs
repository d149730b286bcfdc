use std::sync::Arc;

use libsql::Builder;
use tracing::{debug, info};

use crate::config::{OpenMode, OpenOptions};
use crate::error::{BridgeError, Result};
use crate::registry::{DatabaseHandle, Handle};
use crate::sync::{NoReplication, ReplicaSync, SyncDriver, SyncState};

use super::Bridge;
use super::resources::{BridgeResource, DatabaseEntry};

impl Bridge {
    /// Open a database with default options for `mode`.
    ///
    /// `target` is a file path for `File`, a URL for `Remote`, and ignored for
    /// `Memory`. Embedded replicas need a local path, so use `open_with`.
    ///
    /// # Errors
    /// `OpenFailed` when the native library cannot open the target.
    pub fn open(&self, target: &str, mode: OpenMode) -> Result<DatabaseHandle> {
        self.open_with(OpenOptions::new(target, mode))
    }

    /// Open a database from fully specified options.
    ///
    /// # Errors
    /// `OpenFailed` for invalid option combinations and native failures (bad
    /// path, auth failure, unreachable remote, failed initial sync).
    pub fn open_with(&self, opts: OpenOptions) -> Result<DatabaseHandle> {
        opts.validate()?;
        let db = self.block_on(open_native(&opts))??;
        let driver: Arc<dyn SyncDriver> = match opts.mode {
            OpenMode::EmbeddedReplica => Arc::new(ReplicaSync::new(Arc::clone(&db))),
            mode => Arc::new(NoReplication::new(mode)),
        };
        let handle = self.adopt_database(db, opts.mode, driver)?;
        info!(%handle, mode = ?opts.mode, "database opened");
        Ok(handle)
    }

    /// Register an already opened native database.
    pub(crate) fn adopt_database(
        &self,
        db: Arc<libsql::Database>,
        mode: OpenMode,
        driver: Arc<dyn SyncDriver>,
    ) -> Result<DatabaseHandle> {
        let entry = DatabaseEntry {
            db,
            mode,
            sync: SyncState::new(driver),
        };
        self.register(None, BridgeResource::Database(Arc::new(entry)))
    }

    /// Close a database and everything opened from it. An in-flight sync is
    /// cancelled. Background sync handles report `Cancelled` once; free them
    /// with `free_sync` to give their slots back.
    ///
    /// # Errors
    /// `StaleHandle` if the database was already closed.
    pub fn close_database(&self, db: DatabaseHandle) -> Result<()> {
        self.release_token(db.token())?;
        debug!(%db, "database closed");
        Ok(())
    }

    /// The mode a database was opened in.
    ///
    /// # Errors
    /// `StaleHandle` if the database was closed.
    pub fn database_mode(&self, db: DatabaseHandle) -> Result<OpenMode> {
        Ok(self.database(db)?.mode)
    }
}

async fn open_native(opts: &OpenOptions) -> Result<Arc<libsql::Database>> {
    let auth_token = opts.auth_token.clone().unwrap_or_default();
    let built = match opts.mode {
        OpenMode::Memory => Builder::new_local(":memory:").build().await,
        OpenMode::File => Builder::new_local(&opts.target).build().await,
        OpenMode::Remote => {
            Builder::new_remote(opts.target.clone(), auth_token)
                .build()
                .await
        }
        OpenMode::EmbeddedReplica => {
            let replica_path = opts.replica_path.clone().unwrap_or_default();
            let mut builder =
                Builder::new_remote_replica(replica_path, opts.target.clone(), auth_token);
            if let Some(read_your_writes) = opts.read_your_writes {
                builder = builder.read_your_writes(read_your_writes);
            }
            if let Some(interval) = opts.sync_interval {
                builder = builder.sync_interval(interval);
            }
            builder.build().await
        }
    };
    let db = built.map_err(|e| BridgeError::OpenFailed {
        reason: format!("Failed to open {:?} database '{}': {e}", opts.mode, opts.target),
    })?;

    // Local opens are lazy in the native library; probe once so a bad path
    // fails here rather than on the first connect.
    if matches!(opts.mode, OpenMode::Memory | OpenMode::File) {
        db.connect().map_err(|e| BridgeError::OpenFailed {
            reason: format!("Failed to open '{}': {e}", opts.target),
        })?;
    }

    if opts.sync_on_open {
        db.sync().await.map_err(|e| BridgeError::OpenFailed {
            reason: format!("Initial sync from '{}' failed: {e}", opts.target),
        })?;
    }

    Ok(Arc::new(db))
}
