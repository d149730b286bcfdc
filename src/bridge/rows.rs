use std::sync::Arc;

use tracing::trace;

use crate::error::{BridgeError, Result};
use crate::marshal::{ColumnMeta, extract_row};
use crate::registry::{BufferHandle, Handle, RowHandle, RowsHandle};
use crate::results::ResultSet;
use crate::types::{Value, ValueType};

use super::Bridge;
use super::resources::{BridgeResource, BufferEntry, BufferKind, RowEntry, RowsEntry};

/// Column metadata for a fresh native cursor. Names come from the cursor,
/// declared types from the statement that produced it.
pub(super) fn result_columns(rows: &libsql::Rows, declared: &[ColumnMeta]) -> Arc<[ColumnMeta]> {
    let count = rows.column_count().max(0);
    (0..count)
        .map(|i| {
            let idx = usize::try_from(i).unwrap_or_default();
            let name = rows
                .column_name(i)
                .map(str::to_string)
                .or_else(|| declared.get(idx).map(|c| c.name.clone()))
                .unwrap_or_else(|| format!("column_{i}"));
            ColumnMeta {
                name,
                decl_type: declared.get(idx).and_then(|c| c.decl_type.clone()),
            }
        })
        .collect()
}

fn column<'a, T>(items: &'a [T], index: usize) -> Result<&'a T> {
    items.get(index).ok_or(BridgeError::ColumnOutOfRange {
        index,
        count: items.len(),
    })
}

impl Bridge {
    /// Advance the cursor. `None` means end of rows; once reached, every
    /// further call returns `None` again.
    ///
    /// # Returns
    ///
    /// A row handle owned by the cursor, or `None` at the end
    ///
    /// # Errors
    /// `StaleHandle` if the result was released, `NativeError` if the native
    /// cursor fails, `TypeMismatch` if a TEXT value is not UTF-8 (that row is
    /// skipped), `Cancelled` if the owning statement was run again meanwhile.
    pub fn next_row(&self, rows: RowsHandle) -> Result<Option<RowHandle>> {
        let Some(values) = self.advance(rows)? else {
            return Ok(None);
        };
        let entry = self.rows(rows)?;
        let row = RowEntry {
            columns: Arc::clone(&entry.columns),
            values,
        };
        self.register(Some(rows.token()), BridgeResource::Row(Arc::new(row)))
            .map(Some)
    }

    /// Pull the next row's values from the native cursor.
    fn advance(&self, rows: RowsHandle) -> Result<Option<Vec<Value>>> {
        let entry = self.rows(rows)?;
        self.block_on(advance_cursor(&entry, rows))?
    }

    /// Drain the remaining rows into an in-memory `ResultSet`. No row handles
    /// are created; the cursor is left at its end.
    ///
    /// # Errors
    /// As `next_row`.
    pub fn fetch_all(&self, rows: RowsHandle) -> Result<ResultSet> {
        let entry = self.rows(rows)?;
        let names = entry.columns.iter().map(|c| c.name.clone()).collect();
        let mut result_set = ResultSet::with_capacity(names, 16);
        while let Some(values) = self.advance(rows)? {
            result_set.add_row_values(values);
        }
        Ok(result_set)
    }

    /// Release a result cursor and the rows fetched from it.
    ///
    /// # Errors
    /// `StaleHandle` if it was already released.
    pub fn free_rows(&self, rows: RowsHandle) -> Result<()> {
        self.release_token(rows.token())
    }

    /// # Errors
    /// `StaleHandle` if the result was released.
    pub fn column_count(&self, rows: RowsHandle) -> Result<usize> {
        Ok(self.rows(rows)?.columns.len())
    }

    /// # Errors
    /// `StaleHandle` if the result was released, `ColumnOutOfRange` for a bad index.
    pub fn column_name(&self, rows: RowsHandle, index: usize) -> Result<String> {
        let entry = self.rows(rows)?;
        Ok(column(&entry.columns, index)?.name.clone())
    }

    /// Declared type of a result column, if it has one.
    ///
    /// # Errors
    /// `StaleHandle` if the result was released, `ColumnOutOfRange` for a bad index.
    pub fn column_decltype(&self, rows: RowsHandle, index: usize) -> Result<Option<String>> {
        let entry = self.rows(rows)?;
        Ok(column(&entry.columns, index)?.decl_type.clone())
    }

    /// All column metadata of a result.
    ///
    /// # Errors
    /// `StaleHandle` if the result was released.
    pub fn columns(&self, rows: RowsHandle) -> Result<Vec<ColumnMeta>> {
        Ok(self.rows(rows)?.columns.to_vec())
    }

    /// # Errors
    /// `StaleHandle` if the row was released.
    pub fn row_column_count(&self, row: RowHandle) -> Result<usize> {
        Ok(self.row(row)?.values.len())
    }

    /// # Errors
    /// `StaleHandle` if the row was released, `ColumnOutOfRange` for a bad index.
    pub fn row_column_name(&self, row: RowHandle, index: usize) -> Result<String> {
        let entry = self.row(row)?;
        column(&entry.values, index)?;
        Ok(column(&entry.columns, index)
            .map(|c| c.name.clone())
            .unwrap_or_else(|_| format!("column_{index}")))
    }

    /// A copy of one column value.
    ///
    /// # Errors
    /// `StaleHandle` if the row was released, `ColumnOutOfRange` for a bad index.
    pub fn row_value(&self, row: RowHandle, index: usize) -> Result<Value> {
        let entry = self.row(row)?;
        Ok(column(&entry.values, index)?.clone())
    }

    /// Native type code of the value stored in this row's column.
    ///
    /// # Errors
    /// `StaleHandle` if the row was released, `ColumnOutOfRange` for a bad index.
    pub fn row_column_type(&self, row: RowHandle, index: usize) -> Result<ValueType> {
        let entry = self.row(row)?;
        Ok(column(&entry.values, index)?.value_type())
    }

    /// # Errors
    /// `TypeMismatch` unless the column holds an INTEGER; floats are not truncated.
    pub fn get_int(&self, row: RowHandle, index: usize) -> Result<i64> {
        let entry = self.row(row)?;
        let value = column(&entry.values, index)?;
        value
            .as_integer()
            .ok_or_else(|| mismatch(ValueType::Integer, value))
    }

    /// # Errors
    /// `TypeMismatch` unless the column holds a FLOAT.
    pub fn get_float(&self, row: RowHandle, index: usize) -> Result<f64> {
        let entry = self.row(row)?;
        let value = column(&entry.values, index)?;
        value
            .as_float()
            .ok_or_else(|| mismatch(ValueType::Float, value))
    }

    /// Copy a TEXT column into a caller-owned buffer. The buffer outlives the
    /// row and must be freed with `free_buffer`.
    ///
    /// # Errors
    /// `TypeMismatch` unless the column holds TEXT.
    pub fn get_string(&self, row: RowHandle, index: usize) -> Result<BufferHandle> {
        let entry = self.row(row)?;
        let value = column(&entry.values, index)?;
        let text = value
            .as_text()
            .ok_or_else(|| mismatch(ValueType::Text, value))?;
        self.new_buffer(BufferKind::Text, text.as_bytes().to_vec())
    }

    /// Copy a BLOB column into a caller-owned buffer.
    ///
    /// # Errors
    /// `TypeMismatch` unless the column holds a BLOB.
    pub fn get_blob(&self, row: RowHandle, index: usize) -> Result<BufferHandle> {
        let entry = self.row(row)?;
        let value = column(&entry.values, index)?;
        let bytes = value
            .as_blob()
            .ok_or_else(|| mismatch(ValueType::Blob, value))?;
        self.new_buffer(BufferKind::Blob, bytes.to_vec())
    }

    /// # Errors
    /// `StaleHandle` if the row was already released.
    pub fn free_row(&self, row: RowHandle) -> Result<()> {
        self.release_token(row.token())
    }

    fn new_buffer(&self, kind: BufferKind, bytes: Vec<u8>) -> Result<BufferHandle> {
        self.register(
            None,
            BridgeResource::Buffer(Arc::new(BufferEntry { kind, bytes })),
        )
    }

    /// # Errors
    /// `StaleHandle` if the buffer was released.
    pub fn buffer_kind(&self, buffer: BufferHandle) -> Result<BufferKind> {
        Ok(self.buffer(buffer)?.kind)
    }

    /// # Errors
    /// `StaleHandle` if the buffer was released.
    pub fn buffer_bytes(&self, buffer: BufferHandle) -> Result<Vec<u8>> {
        Ok(self.buffer(buffer)?.bytes.clone())
    }

    /// # Errors
    /// `StaleHandle` if the buffer was released, `TypeMismatch` for a blob buffer.
    pub fn buffer_text(&self, buffer: BufferHandle) -> Result<String> {
        let entry = self.buffer(buffer)?;
        if entry.kind != BufferKind::Text {
            return Err(BridgeError::type_mismatch("TEXT buffer", "BLOB buffer"));
        }
        String::from_utf8(entry.bytes.clone())
            .map_err(|e| BridgeError::type_mismatch("UTF-8 text", e.to_string()))
    }

    /// # Errors
    /// `StaleHandle` if the buffer was already released.
    pub fn free_buffer(&self, buffer: BufferHandle) -> Result<()> {
        self.release_token(buffer.token())
    }
}

async fn advance_cursor(entry: &RowsEntry, rows: RowsHandle) -> Result<Option<Vec<Value>>> {
    // A statement's cursor steps the statement's native handle, so it holds
    // the statement lock while stepping. Lock order: statement, then cursor.
    let core = match &entry.source {
        Some(lease) => {
            let core = lease.statement.core.lock().await;
            if core.epoch != lease.epoch {
                entry.cursor.lock().await.finish();
                return Err(BridgeError::Cancelled(format!(
                    "{rows} belongs to an earlier execution of its statement"
                )));
            }
            Some(core)
        }
        None => None,
    };
    let mut cursor = entry.cursor.lock().await;
    let Some(native) = cursor.native.as_mut() else {
        return Ok(None);
    };
    let step = match native.next().await? {
        Some(row) => {
            cursor.fetched += 1;
            Some(extract_row(&row, entry.columns.len())?)
        }
        None => {
            trace!(%rows, fetched = cursor.fetched, "end of rows");
            cursor.finish();
            None
        }
    };
    drop(core);
    Ok(step)
}

fn mismatch(expected: ValueType, found: &Value) -> BridgeError {
    BridgeError::type_mismatch(expected.to_string(), found.value_type().to_string())
}
