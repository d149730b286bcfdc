//! Safe handle-based bindings over libsql.
//!
//! Native databases, connections, statements, result cursors, rows, extracted
//! buffers and background syncs are never handed out directly. The host gets
//! small copyable handles instead, resolved through a registry on every call:
//! a handle that was released, or whose owner was released, reports
//! `BridgeError::StaleHandle` rather than touching freed memory.
//!
//! Start with [`Bridge`]:
//!
//! ```no_run
//! use libsql_bridge::{Bridge, OpenMode, Value};
//!
//! # fn main() -> Result<(), libsql_bridge::BridgeError> {
//! let bridge = Bridge::new()?;
//! let db = bridge.open(":memory:", OpenMode::Memory)?;
//! let conn = bridge.connect(db)?;
//! bridge.execute(conn, "CREATE TABLE t(a INTEGER, b TEXT)", &[])?;
//! bridge.execute(conn, "INSERT INTO t VALUES (?, ?)", &[Value::Integer(42), Value::from("x")])?;
//!
//! let stmt = bridge.prepare(conn, "SELECT a, b FROM t")?;
//! let rows = bridge.query_statement(stmt, &[])?;
//! while let Some(row) = bridge.next_row(rows)? {
//!     assert_eq!(bridge.get_int(row, 0)?, 42);
//! }
//! bridge.close_database(db)?;
//! # Ok(())
//! # }
//! ```

pub mod bridge;
pub mod config;
pub mod error;
pub mod marshal;
pub mod registry;
pub mod results;
pub mod sync;
pub mod types;

pub use bridge::{Bridge, BufferKind, HandleGuard, StatementState};
pub use config::{BridgeConfig, BridgeConfigBuilder, OpenMode, OpenOptions, OpenOptionsBuilder};
pub use error::{BridgeError, Result};
pub use marshal::ColumnMeta;
pub use registry::{
    BufferHandle, ConnectionHandle, DatabaseHandle, Handle, HandleKind, RowHandle, RowsHandle,
    StatementHandle, SyncHandle, Token,
};
pub use results::{ResultRow, ResultSet};
pub use sync::{SyncDriver, SyncOptions, SyncResult};
pub use types::{Value, ValueType};

/// Route this crate's `tracing` events (and libsql's) to stderr at `level`.
///
/// Calling it again, or after the host installed its own subscriber, is a
/// no-op.
pub fn enable_internal_tracing(level: tracing::Level) {
    if tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(true)
        .with_writer(std::io::stderr)
        .try_init()
        .is_err()
    {
        tracing::debug!("a global tracing subscriber is already installed");
    }
}
