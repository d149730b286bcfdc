use std::sync::Arc;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

use crate::config::OpenMode;
use crate::marshal::{BoundParams, ColumnMeta};
use crate::registry::{HandleKind, Resource};
use crate::sync::{SyncEntry, SyncState};
use crate::types::Value;

/// What a registry slot owns. Each variant is an `Arc` so lookups clone
/// cheaply and an in-flight call keeps its native object alive after release.
#[derive(Clone)]
pub(crate) enum BridgeResource {
    Database(Arc<DatabaseEntry>),
    Connection(Arc<ConnectionEntry>),
    Statement(Arc<StatementEntry>),
    Rows(Arc<RowsEntry>),
    Row(Arc<RowEntry>),
    Buffer(Arc<BufferEntry>),
    Sync(Arc<SyncEntry>),
}

impl Resource for BridgeResource {
    fn kind(&self) -> HandleKind {
        match self {
            BridgeResource::Database(_) => HandleKind::Database,
            BridgeResource::Connection(_) => HandleKind::Connection,
            BridgeResource::Statement(_) => HandleKind::Statement,
            BridgeResource::Rows(_) => HandleKind::Rows,
            BridgeResource::Row(_) => HandleKind::Row,
            BridgeResource::Buffer(_) => HandleKind::Buffer,
            BridgeResource::Sync(_) => HandleKind::SyncFuture,
        }
    }
}

impl BridgeResource {
    /// Side effects of leaving the registry, run before the native drop.
    pub(crate) fn on_release(&self) {
        if let BridgeResource::Database(db) = self {
            db.sync.cancel_in_flight();
        }
    }
}

pub(crate) struct DatabaseEntry {
    pub(crate) db: Arc<libsql::Database>,
    pub(crate) mode: OpenMode,
    pub(crate) sync: SyncState,
}

pub(crate) struct ConnectionEntry {
    pub(crate) conn: libsql::Connection,
    changes: AtomicU64,
    last_insert_rowid: AtomicI64,
}

impl ConnectionEntry {
    pub(crate) fn new(conn: libsql::Connection) -> Self {
        Self {
            conn,
            changes: AtomicU64::new(0),
            last_insert_rowid: AtomicI64::new(0),
        }
    }

    /// Snapshot the native counters. Only execute paths call this.
    pub(crate) fn record_counters(&self) {
        self.changes.store(self.conn.changes(), Ordering::Release);
        self.last_insert_rowid
            .store(self.conn.last_insert_rowid(), Ordering::Release);
    }

    pub(crate) fn clear_counters(&self) {
        self.changes.store(0, Ordering::Release);
        self.last_insert_rowid.store(0, Ordering::Release);
    }

    pub(crate) fn changes(&self) -> u64 {
        self.changes.load(Ordering::Acquire)
    }

    pub(crate) fn last_insert_rowid(&self) -> i64 {
        self.last_insert_rowid.load(Ordering::Acquire)
    }
}

/// Where a statement is in its lifecycle. A freed statement has no state: its
/// handle is simply stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementState {
    Created,
    Bound,
    Executed,
    Reset,
}

pub(crate) struct StatementEntry {
    pub(crate) sql: String,
    pub(crate) parameter_count: usize,
    pub(crate) columns: Arc<[ColumnMeta]>,
    pub(crate) conn: Arc<ConnectionEntry>,
    pub(crate) core: tokio::sync::Mutex<StatementCore>,
}

pub(crate) struct StatementCore {
    pub(crate) native: libsql::Statement,
    pub(crate) params: BoundParams,
    pub(crate) state: StatementState,
    /// Bumped by every execute, query and reset. A cursor from an older
    /// epoch must not step the native statement again.
    pub(crate) epoch: u64,
}

impl StatementCore {
    pub(crate) fn next_epoch(&mut self) -> u64 {
        self.epoch = self.epoch.wrapping_add(1);
        self.epoch
    }
}

pub(crate) struct RowsEntry {
    pub(crate) columns: Arc<[ColumnMeta]>,
    /// Set for cursors produced by `query_statement`; they share the
    /// statement's native handle.
    pub(crate) source: Option<StatementLease>,
    pub(crate) cursor: tokio::sync::Mutex<Cursor>,
}

/// The statement a cursor steps, and the execution it belongs to.
pub(crate) struct StatementLease {
    pub(crate) statement: Arc<StatementEntry>,
    pub(crate) epoch: u64,
}

pub(crate) struct Cursor {
    pub(crate) native: Option<libsql::Rows>,
    /// Statement compiled for a direct connection query; kept for the
    /// cursor's lifetime.
    pub(crate) statement: Option<libsql::Statement>,
    pub(crate) fetched: u64,
}

impl Cursor {
    pub(crate) fn new(native: libsql::Rows, statement: Option<libsql::Statement>) -> Self {
        Self {
            native: Some(native),
            statement,
            fetched: 0,
        }
    }

    /// Drop the native cursor once it reports the end.
    pub(crate) fn finish(&mut self) {
        self.native = None;
        drop(self.statement.take());
    }
}

pub(crate) struct RowEntry {
    pub(crate) columns: Arc<[ColumnMeta]>,
    pub(crate) values: Vec<Value>,
}

/// Whether a buffer was extracted from a TEXT or a BLOB column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferKind {
    Text,
    Blob,
}

pub(crate) struct BufferEntry {
    pub(crate) kind: BufferKind,
    pub(crate) bytes: Vec<u8>,
}
