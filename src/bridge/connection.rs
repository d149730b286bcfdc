use std::path::Path;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::debug;

use crate::error::{BridgeError, Result};
use crate::marshal::{column_metadata, to_native_params};
use crate::registry::{ConnectionHandle, DatabaseHandle, Handle, HandleKind, RowsHandle};
use crate::types::Value;

use super::Bridge;
use super::resources::{BridgeResource, ConnectionEntry, Cursor, RowsEntry};
use super::rows::result_columns;
use super::statement::reject_blank;

impl Bridge {
    /// Open a connection on `db`.
    ///
    /// # Errors
    /// `StaleHandle` if the database was closed; `NativeError` if the native
    /// library refuses the connection.
    pub fn connect(&self, db: DatabaseHandle) -> Result<ConnectionHandle> {
        let entry = self.database(db)?;
        let conn = entry.db.connect()?;
        let handle = self.register(
            Some(db.token()),
            BridgeResource::Connection(Arc::new(ConnectionEntry::new(conn))),
        )?;
        debug!(%db, conn = %handle, "connected");
        Ok(handle)
    }

    /// Close a connection and every statement and result opened on it.
    ///
    /// # Errors
    /// `StaleHandle` if the connection was already closed.
    pub fn disconnect(&self, conn: ConnectionHandle) -> Result<()> {
        self.release_token(conn.token())
    }

    /// Release the connection's statements and results and reset the native
    /// connection state. The connection handle itself stays valid.
    ///
    /// # Errors
    /// `StaleHandle` if the connection was closed.
    pub fn reset_connection(&self, conn: ConnectionHandle) -> Result<()> {
        let entry = self.connection(conn)?;
        self.release_children(conn.token(), HandleKind::Statement)?;
        self.release_children(conn.token(), HandleKind::Rows)?;
        self.block_on(entry.conn.reset())?;
        entry.clear_counters();
        Ok(())
    }

    /// Load a native extension into the connection.
    ///
    /// # Errors
    /// `ConfigError` unless the bridge was configured with `allow_extensions`;
    /// `NativeError` if the library cannot be loaded.
    pub fn load_extension(
        &self,
        conn: ConnectionHandle,
        path: impl AsRef<Path>,
        entry_point: Option<&str>,
    ) -> Result<()> {
        if !self.config().allow_extensions {
            return Err(BridgeError::ConfigError(
                "extension loading is disabled for this bridge".to_string(),
            ));
        }
        let entry = self.connection(conn)?;
        entry.conn.load_extension_enable()?;
        let loaded = entry.conn.load_extension(path, entry_point);
        entry.conn.load_extension_disable()?;
        loaded.map_err(BridgeError::from)
    }

    /// Rows changed by the last execute on this connection.
    ///
    /// # Errors
    /// `StaleHandle` if the connection was closed.
    pub fn changes(&self, conn: ConnectionHandle) -> Result<u64> {
        Ok(self.connection(conn)?.changes())
    }

    /// Rowid of the last insert executed on this connection.
    ///
    /// # Errors
    /// `StaleHandle` if the connection was closed.
    pub fn last_insert_rowid(&self, conn: ConnectionHandle) -> Result<i64> {
        Ok(self.connection(conn)?.last_insert_rowid())
    }

    /// Run one INSERT/UPDATE/DELETE/DDL statement directly and return the
    /// affected row count.
    ///
    /// # Errors
    /// `SyntaxError` for malformed SQL, `NativeError` for execution failures.
    pub fn execute(&self, conn: ConnectionHandle, sql: &str, params: &[Value]) -> Result<u64> {
        let entry = self.connection(conn)?;
        reject_blank(sql)?;
        let native_params = to_native_params(params);
        let affected = self.block_on(async {
            let statement = entry
                .conn
                .prepare(sql)
                .await
                .map_err(BridgeError::from_prepare)?;
            Ok::<_, BridgeError>(statement.execute(native_params).await?)
        })??;
        entry.record_counters();
        u64::try_from(affected)
            .map_err(|e| BridgeError::RuntimeError(format!("affected row count overflow: {e}")))
    }

    /// Run a semicolon-separated batch of statements, discarding any rows.
    /// An empty batch does nothing.
    ///
    /// # Errors
    /// `SyntaxError` when a statement fails to compile, `NativeError` for
    /// execution failures.
    pub fn execute_batch(&self, conn: ConnectionHandle, sql: &str) -> Result<()> {
        let entry = self.connection(conn)?;
        self.block_on(entry.conn.execute_batch(sql))?
            .map_err(BridgeError::from_batch)?;
        entry.record_counters();
        Ok(())
    }

    /// Run a SELECT directly and return a cursor owned by the connection.
    /// Row counters are not touched.
    ///
    /// # Errors
    /// `SyntaxError` for malformed SQL, `NativeError` for execution failures,
    /// `Cancelled` if the connection was closed while the query ran.
    pub fn query(&self, conn: ConnectionHandle, sql: &str, params: &[Value]) -> Result<RowsHandle> {
        let entry = self.connection(conn)?;
        reject_blank(sql)?;
        let native_params = to_native_params(params);
        let (rows, statement, declared) = self.block_on(async {
            let mut statement = entry
                .conn
                .prepare(sql)
                .await
                .map_err(BridgeError::from_prepare)?;
            let declared = column_metadata(&statement);
            let rows = statement.query(native_params).await?;
            Ok::<_, BridgeError>((rows, statement, declared))
        })??;
        let columns = result_columns(&rows, &declared);
        self.register(
            Some(conn.token()),
            BridgeResource::Rows(Arc::new(RowsEntry {
                columns,
                source: None,
                cursor: Mutex::new(Cursor::new(rows, Some(statement))),
            })),
        )
    }
}
