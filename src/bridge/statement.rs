use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::debug;

use crate::error::{BridgeError, Result};
use crate::marshal::{BoundParams, ColumnMeta, column_metadata};
use crate::registry::{ConnectionHandle, Handle, HandleKind, RowsHandle, StatementHandle};
use crate::types::Value;

use super::Bridge;
use super::resources::{
    BridgeResource, Cursor, RowsEntry, StatementCore, StatementEntry, StatementLease,
    StatementState,
};
use super::rows::result_columns;

impl Bridge {
    /// Compile `sql` on a connection.
    ///
    /// # Arguments
    ///
    /// * `conn` - The connection that will own the statement
    /// * `sql` - One SQL statement, with `?` or `?N` placeholders
    ///
    /// # Returns
    ///
    /// A statement handle in the `Created` state, released with its connection
    ///
    /// # Errors
    /// `SyntaxError` (with the native message) for malformed SQL or SQL with
    /// no statement in it, `StaleHandle` if the connection was closed.
    pub fn prepare(&self, conn: ConnectionHandle, sql: &str) -> Result<StatementHandle> {
        let conn_entry = self.connection(conn)?;
        reject_blank(sql)?;
        let native = self
            .block_on(conn_entry.conn.prepare(sql))?
            .map_err(BridgeError::from_prepare)?;
        let parameter_count = native.parameter_count();
        let columns = column_metadata(&native).into();
        let entry = StatementEntry {
            sql: sql.to_string(),
            parameter_count,
            columns,
            conn: conn_entry,
            core: Mutex::new(StatementCore {
                native,
                params: BoundParams::new(parameter_count),
                state: StatementState::Created,
                epoch: 0,
            }),
        };
        let handle = self.register(
            Some(conn.token()),
            BridgeResource::Statement(Arc::new(entry)),
        )?;
        debug!(%conn, stmt = %handle, parameter_count, "statement prepared");
        Ok(handle)
    }

    /// Bind `value` at a 1-based `position`, replacing any earlier binding
    /// there. Bindings persist across executions until `reset`.
    ///
    /// # Arguments
    ///
    /// * `stmt` - The prepared statement
    /// * `position` - Parameter position, starting at 1
    /// * `value` - The value to send for that position
    ///
    /// # Errors
    /// `BindError` for position 0 or beyond the statement's parameter count.
    pub fn bind(&self, stmt: StatementHandle, position: usize, value: Value) -> Result<()> {
        let entry = self.statement(stmt)?;
        self.block_on(async {
            let mut core = entry.core.lock().await;
            core.params.set(position, value)?;
            core.state = StatementState::Bound;
            Ok::<_, BridgeError>(())
        })?
    }

    /// # Errors
    /// As `bind`.
    pub fn bind_int(&self, stmt: StatementHandle, position: usize, value: i64) -> Result<()> {
        self.bind(stmt, position, Value::Integer(value))
    }

    /// # Errors
    /// As `bind`.
    pub fn bind_float(&self, stmt: StatementHandle, position: usize, value: f64) -> Result<()> {
        self.bind(stmt, position, Value::Float(value))
    }

    /// # Errors
    /// As `bind`.
    pub fn bind_text(&self, stmt: StatementHandle, position: usize, value: &str) -> Result<()> {
        self.bind(stmt, position, Value::Text(value.to_owned()))
    }

    /// # Errors
    /// As `bind`.
    pub fn bind_blob(&self, stmt: StatementHandle, position: usize, value: &[u8]) -> Result<()> {
        self.bind(stmt, position, Value::Blob(value.to_vec()))
    }

    /// # Errors
    /// As `bind`.
    pub fn bind_null(&self, stmt: StatementHandle, position: usize) -> Result<()> {
        self.bind(stmt, position, Value::Null)
    }

    /// Execute the statement and return the affected row count. A non-empty
    /// `params` replaces all bindings first; an empty one uses the current
    /// bindings. Results from earlier queries on this statement are released.
    ///
    /// # Errors
    /// `BindError` for too many parameters, `NativeError` for execution failures.
    pub fn execute_statement(&self, stmt: StatementHandle, params: &[Value]) -> Result<u64> {
        let entry = self.statement(stmt)?;
        self.release_children(stmt.token(), HandleKind::Rows)?;
        let affected = self.block_on(async {
            let mut core = entry.core.lock().await;
            if !params.is_empty() {
                core.params.replace_all(params)?;
            }
            let native_params = core.params.resolve();
            core.next_epoch();
            core.native.reset();
            let affected = core.native.execute(native_params).await;
            core.native.reset();
            core.state = StatementState::Executed;
            Ok::<_, BridgeError>(affected?)
        })??;
        entry.conn.record_counters();
        u64::try_from(affected)
            .map_err(|e| BridgeError::RuntimeError(format!("affected row count overflow: {e}")))
    }

    /// Run the statement as a query. The cursor is owned by the statement and
    /// is released when the statement is executed again, reset or freed.
    ///
    /// # Arguments
    ///
    /// * `stmt` - The prepared statement
    /// * `params` - Replaces all bindings when non-empty
    ///
    /// # Returns
    ///
    /// A cursor positioned before the first row
    ///
    /// # Errors
    /// `BindError` for too many parameters, `NativeError` for execution failures,
    /// `Cancelled` if the statement was freed while the query ran.
    pub fn query_statement(&self, stmt: StatementHandle, params: &[Value]) -> Result<RowsHandle> {
        let entry = self.statement(stmt)?;
        self.release_children(stmt.token(), HandleKind::Rows)?;
        let (rows, epoch) = self.block_on(async {
            let mut core = entry.core.lock().await;
            if !params.is_empty() {
                core.params.replace_all(params)?;
            }
            let native_params = core.params.resolve();
            let epoch = core.next_epoch();
            core.native.reset();
            let rows = core.native.query(native_params).await?;
            core.state = StatementState::Executed;
            Ok::<_, BridgeError>((rows, epoch))
        })??;
        let columns = result_columns(&rows, &entry.columns);
        self.register(
            Some(stmt.token()),
            BridgeResource::Rows(Arc::new(RowsEntry {
                columns,
                source: Some(StatementLease {
                    statement: entry,
                    epoch,
                }),
                cursor: Mutex::new(Cursor::new(rows, None)),
            })),
        )
    }

    /// Clear bindings and cursor state so the statement can be reused.
    ///
    /// # Errors
    /// `StaleHandle` if the statement was freed.
    pub fn reset(&self, stmt: StatementHandle) -> Result<()> {
        let entry = self.statement(stmt)?;
        self.release_children(stmt.token(), HandleKind::Rows)?;
        self.block_on(async {
            let mut core = entry.core.lock().await;
            core.next_epoch();
            core.native.reset();
            core.params.clear();
            core.state = StatementState::Reset;
        })
    }

    /// Free the statement and any result it still owns.
    ///
    /// # Errors
    /// `StaleHandle` if it was already freed.
    pub fn free_statement(&self, stmt: StatementHandle) -> Result<()> {
        self.release_token(stmt.token())
    }

    /// # Errors
    /// `StaleHandle` if the statement was freed.
    pub fn parameter_count(&self, stmt: StatementHandle) -> Result<usize> {
        Ok(self.statement(stmt)?.parameter_count)
    }

    /// Result columns the statement will produce; empty for statements that
    /// return no rows.
    ///
    /// # Errors
    /// `StaleHandle` if the statement was freed.
    pub fn statement_columns(&self, stmt: StatementHandle) -> Result<Vec<ColumnMeta>> {
        Ok(self.statement(stmt)?.columns.to_vec())
    }

    /// # Errors
    /// `StaleHandle` if the statement was freed.
    pub fn statement_sql(&self, stmt: StatementHandle) -> Result<String> {
        Ok(self.statement(stmt)?.sql.clone())
    }

    /// # Errors
    /// `StaleHandle` if the statement was freed.
    pub fn statement_state(&self, stmt: StatementHandle) -> Result<StatementState> {
        let entry = self.statement(stmt)?;
        self.block_on(async { entry.core.lock().await.state })
    }

    /// Current binding at a 1-based position, if any.
    ///
    /// # Errors
    /// `StaleHandle` if the statement was freed.
    pub fn bound_value(&self, stmt: StatementHandle, position: usize) -> Result<Option<Value>> {
        let entry = self.statement(stmt)?;
        self.block_on(async { entry.core.lock().await.params.get(position).cloned() })
    }
}

/// Reject SQL holding nothing but whitespace, `;` and comments. The native
/// library accepts it and then fails every step with "not an error".
pub(super) fn reject_blank(sql: &str) -> Result<()> {
    let mut rest = sql.trim_start_matches(|c: char| c.is_whitespace() || c == ';');
    loop {
        if let Some(line) = rest.strip_prefix("--") {
            rest = line.split_once('\n').map_or("", |(_, tail)| tail);
        } else if let Some(block) = rest.strip_prefix("/*") {
            rest = block.split_once("*/").map_or("", |(_, tail)| tail);
        } else if rest.is_empty() {
            return Err(BridgeError::SyntaxError {
                code: 1,
                native_message: "no SQL statement to prepare".to_string(),
            });
        } else {
            return Ok(());
        }
        rest = rest.trim_start_matches(|c: char| c.is_whitespace() || c == ';');
    }
}

#[cfg(test)]
mod tests {
    use super::reject_blank;

    #[test]
    fn blank_sql_is_rejected() {
        for sql in ["", "   ", ";;", "-- only a comment", "/* block */ ;\n-- and a line\n"] {
            assert!(reject_blank(sql).is_err(), "{sql:?}");
        }
        for sql in ["SELECT 1", "-- lead\nSELECT 1", "/* x */ VALUES (1)"] {
            assert!(reject_blank(sql).is_ok(), "{sql:?}");
        }
    }
}
