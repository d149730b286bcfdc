//! Replication sync for embedded replicas.
//!
//! A database allows one sync in flight at a time, whether it was started with
//! the blocking `Bridge::sync` or the non-blocking `Bridge::sync_async`. A
//! second request while one is outstanding fails with `SyncInProgress`.
//! Closing the database cancels the in-flight sync.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::bridge::Bridge;
use crate::bridge::resources::BridgeResource;
use crate::config::OpenMode;
use crate::error::{BridgeError, Result};
use crate::registry::{DatabaseHandle, Handle, SyncHandle};

/// Outcome of one successful sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SyncResult {
    /// Replication frame the replica is now at, if it has one.
    pub frame_no: Option<u64>,
    pub frames_synced: u64,
}

/// Knobs for `Bridge::sync_with`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SyncOptions {
    /// Stop once the replica reaches this frame instead of syncing fully.
    pub until_frame: Option<u64>,
}

/// The native replication calls a database can make.
#[async_trait]
pub trait SyncDriver: Send + Sync {
    async fn sync(&self) -> Result<SyncResult>;

    async fn sync_until(&self, frame_no: u64) -> Result<SyncResult>;
}

/// Sync through the native embedded-replica machinery.
pub(crate) struct ReplicaSync {
    db: Arc<libsql::Database>,
}

impl ReplicaSync {
    pub(crate) fn new(db: Arc<libsql::Database>) -> Self {
        Self { db }
    }
}

fn sync_failed(err: &libsql::Error) -> BridgeError {
    BridgeError::SyncFailed {
        reason: err.to_string(),
    }
}

fn frames(frames_synced: usize) -> u64 {
    u64::try_from(frames_synced).unwrap_or(u64::MAX)
}

#[async_trait]
impl SyncDriver for ReplicaSync {
    async fn sync(&self) -> Result<SyncResult> {
        let replicated = self.db.sync().await.map_err(|e| sync_failed(&e))?;
        Ok(SyncResult {
            frame_no: replicated.frame_no(),
            frames_synced: frames(replicated.frames_synced()),
        })
    }

    async fn sync_until(&self, frame_no: u64) -> Result<SyncResult> {
        let replicated = self
            .db
            .sync_until(frame_no)
            .await
            .map_err(|e| sync_failed(&e))?;
        Ok(SyncResult {
            frame_no: replicated.frame_no(),
            frames_synced: frames(replicated.frames_synced()),
        })
    }
}

/// Databases opened without a replica have nothing to sync.
pub(crate) struct NoReplication {
    mode: OpenMode,
}

impl NoReplication {
    pub(crate) fn new(mode: OpenMode) -> Self {
        Self { mode }
    }

    fn refuse(&self) -> BridgeError {
        BridgeError::SyncFailed {
            reason: format!("{:?} databases have no replica to sync", self.mode),
        }
    }
}

#[async_trait]
impl SyncDriver for NoReplication {
    async fn sync(&self) -> Result<SyncResult> {
        Err(self.refuse())
    }

    async fn sync_until(&self, _frame_no: u64) -> Result<SyncResult> {
        Err(self.refuse())
    }
}

/// Per-database sync bookkeeping.
pub(crate) struct SyncState {
    driver: Arc<dyn SyncDriver>,
    in_flight: Arc<AtomicBool>,
    cancel: CancellationToken,
}

impl SyncState {
    pub(crate) fn new(driver: Arc<dyn SyncDriver>) -> Self {
        Self {
            driver,
            in_flight: Arc::new(AtomicBool::new(false)),
            cancel: CancellationToken::new(),
        }
    }

    fn begin(&self, db: DatabaseHandle) -> Result<InFlight> {
        self.in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| BridgeError::SyncInProgress(db.to_string()))?;
        Ok(InFlight {
            flag: Arc::clone(&self.in_flight),
        })
    }

    pub(crate) fn is_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    pub(crate) fn cancel_in_flight(&self) {
        self.cancel.cancel();
    }
}

/// Holds a database's single sync slot until dropped.
struct InFlight {
    flag: Arc<AtomicBool>,
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

async fn run_sync(
    driver: Arc<dyn SyncDriver>,
    cancel: CancellationToken,
    options: SyncOptions,
) -> Result<SyncResult> {
    tokio::select! {
        () = cancel.cancelled() => Err(BridgeError::Cancelled(
            "database closed while a sync was in flight".to_string(),
        )),
        result = async {
            match options.until_frame {
                Some(frame_no) => driver.sync_until(frame_no).await,
                None => driver.sync().await,
            }
        } => result,
    }
}

enum SyncTask {
    Running(JoinHandle<Result<SyncResult>>),
    Done(Result<SyncResult>),
}

/// Registry resource behind a `SyncHandle`. Dropping it while the task runs
/// detaches the task; the sync still finishes and frees the database's slot.
pub(crate) struct SyncEntry {
    task: tokio::sync::Mutex<SyncTask>,
}

impl Bridge {
    /// Sync an embedded replica with its remote, blocking until done.
    ///
    /// # Errors
    /// `SyncInProgress` if another sync on this database is outstanding,
    /// `SyncFailed` if the remote or network rejects it (the database stays
    /// usable), `Cancelled` if the database is closed meanwhile.
    pub fn sync(&self, db: DatabaseHandle) -> Result<SyncResult> {
        self.sync_with(db, SyncOptions::default())
    }

    /// # Errors
    /// As `sync`.
    pub fn sync_with(&self, db: DatabaseHandle, options: SyncOptions) -> Result<SyncResult> {
        let entry = self.database(db)?;
        let slot = entry.sync.begin(db)?;
        debug!(%db, ?options, "sync started");
        let driver = Arc::clone(&entry.sync.driver);
        let cancel = entry.sync.cancel.clone();
        drop(entry);
        let result = self.block_on(run_sync(driver, cancel, options));
        drop(slot);
        log_outcome(db, result?)
    }

    /// Start a sync in the background and return a handle to wait on.
    ///
    /// # Errors
    /// `SyncInProgress` if another sync on this database is outstanding.
    pub fn sync_async(&self, db: DatabaseHandle) -> Result<SyncHandle> {
        self.sync_async_with(db, SyncOptions::default())
    }

    /// # Errors
    /// As `sync_async`.
    pub fn sync_async_with(&self, db: DatabaseHandle, options: SyncOptions) -> Result<SyncHandle> {
        let entry = self.database(db)?;
        let slot = entry.sync.begin(db)?;
        let driver = Arc::clone(&entry.sync.driver);
        let cancel = entry.sync.cancel.clone();
        drop(entry);

        let task = self.runtime()?.spawn(async move {
            let _slot = slot;
            run_sync(driver, cancel, options).await
        });
        let handle: SyncHandle = self.register(
            Some(db.token()),
            BridgeResource::Sync(Arc::new(SyncEntry {
                task: tokio::sync::Mutex::new(SyncTask::Running(task)),
            })),
        )?;
        debug!(%db, sync = %handle, ?options, "background sync started");
        Ok(handle)
    }

    /// Block until a background sync finishes. The outcome is kept, so waiting
    /// again returns the same result until the handle is freed.
    ///
    /// # Errors
    /// The sync's own error; `Cancelled` (once) if the database was closed
    /// while it ran; `StaleHandle` once the handle is freed.
    pub fn wait(&self, sync: SyncHandle) -> Result<SyncResult> {
        let entry = self.sync_future(sync)?;
        let result = self.block_on(async {
            let mut task = entry.task.lock().await;
            match &mut *task {
                SyncTask::Done(result) => result.clone(),
                SyncTask::Running(join) => {
                    let result = match join.await {
                        Ok(result) => result,
                        Err(e) if e.is_cancelled() => Err(BridgeError::Cancelled(format!(
                            "sync task aborted: {e}"
                        ))),
                        Err(e) => Err(BridgeError::RuntimeError(format!("sync task failed: {e}"))),
                    };
                    *task = SyncTask::Done(result.clone());
                    result
                }
            }
        })?;
        log_outcome(sync, result)
    }

    /// True once the background sync has finished.
    ///
    /// # Errors
    /// `StaleHandle` once the handle is freed.
    pub fn sync_is_finished(&self, sync: SyncHandle) -> Result<bool> {
        let entry = self.sync_future(sync)?;
        self.block_on(async {
            match &*entry.task.lock().await {
                SyncTask::Done(_) => true,
                SyncTask::Running(join) => join.is_finished(),
            }
        })
    }

    /// Release a sync handle. An unfinished sync is detached, not aborted: it
    /// runs to completion and keeps the database's sync slot until then.
    /// Freeing a handle cancelled by `close_database` succeeds once.
    ///
    /// # Errors
    /// `StaleHandle` if it was already freed.
    pub fn free_sync(&self, sync: SyncHandle) -> Result<()> {
        self.release_token(sync.token())
    }

    /// Whether a sync is currently outstanding on `db`.
    ///
    /// # Errors
    /// `StaleHandle` if the database was closed.
    pub fn sync_in_progress(&self, db: DatabaseHandle) -> Result<bool> {
        Ok(self.database(db)?.sync.is_in_flight())
    }
}

fn log_outcome(source: impl std::fmt::Display, result: Result<SyncResult>) -> Result<SyncResult> {
    match &result {
        Ok(done) => debug!(%source, frame_no = ?done.frame_no, frames = done.frames_synced, "sync finished"),
        Err(e) => warn!(%source, error = %e, "sync failed"),
    }
    result
}
