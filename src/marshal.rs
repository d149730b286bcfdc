//! Conversion between host `Value`s and the native library's typed values.

use std::panic::AssertUnwindSafe;

use libsql::Value as NativeValue;
use tracing::warn;

use crate::error::{BridgeError, Result};
use crate::types::Value;

impl From<NativeValue> for Value {
    fn from(value: NativeValue) -> Self {
        match value {
            NativeValue::Null => Value::Null,
            NativeValue::Integer(i) => Value::Integer(i),
            NativeValue::Real(f) => Value::Float(f),
            NativeValue::Text(s) => Value::Text(s),
            NativeValue::Blob(bytes) => Value::Blob(bytes),
        }
    }
}

impl From<Value> for NativeValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Integer(i) => NativeValue::Integer(i),
            Value::Float(f) => NativeValue::Real(f),
            Value::Text(s) => NativeValue::Text(s),
            Value::Blob(bytes) => NativeValue::Blob(bytes),
            Value::Null => NativeValue::Null,
        }
    }
}

/// Metadata for one result column. Fixed once the result exists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMeta {
    pub name: String,
    /// Declared type from the table schema, if the column has one.
    pub decl_type: Option<String>,
}

pub(crate) fn column_metadata(stmt: &libsql::Statement) -> Vec<ColumnMeta> {
    stmt.columns()
        .iter()
        .map(|col| ColumnMeta {
            name: col.name().to_string(),
            decl_type: col.decl_type().map(str::to_string),
        })
        .collect()
}

/// Pull every column of a native row into host values.
///
/// # Errors
/// `TypeMismatch` for a TEXT column whose stored bytes are not UTF-8. The
/// cursor has already moved past that row.
pub(crate) fn extract_row(row: &libsql::Row, column_count: usize) -> Result<Vec<Value>> {
    let mut values = Vec::with_capacity(column_count);
    for idx in 0..column_count {
        let native_idx = i32::try_from(idx).map_err(|_| BridgeError::ColumnOutOfRange {
            index: idx,
            count: column_count,
        })?;
        let value = if matches!(row.column_type(native_idx)?, libsql::ValueType::Text) {
            extract_text(row, native_idx, idx)?
        } else {
            row.get_value(native_idx)?
        };
        values.push(Value::from(value));
    }
    Ok(values)
}

/// The local driver decodes TEXT with `str::from_utf8(..).unwrap()` and
/// offers no raw-bytes path, so a bad column panics inside the call. The panic
/// is contained here and reported as a mismatch.
fn extract_text(row: &libsql::Row, native_idx: i32, idx: usize) -> Result<NativeValue> {
    match std::panic::catch_unwind(AssertUnwindSafe(|| row.get_value(native_idx))) {
        Ok(value) => Ok(value?),
        Err(_) => {
            warn!(column = idx, "TEXT column holds bytes that are not UTF-8");
            Err(BridgeError::type_mismatch(
                "UTF-8 TEXT",
                format!("invalid UTF-8 in column {idx}"),
            ))
        }
    }
}

/// Positional parameter store for one prepared statement.
///
/// Positions are 1-based, the way the native bind calls number them. A
/// position left unbound is sent as NULL.
#[derive(Debug, Clone, Default)]
pub(crate) struct BoundParams {
    slots: Vec<Option<Value>>,
}

impl BoundParams {
    pub(crate) fn new(parameter_count: usize) -> Self {
        Self {
            slots: vec![None; parameter_count],
        }
    }

    pub(crate) fn set(&mut self, position: usize, value: Value) -> Result<()> {
        let count = self.slots.len();
        if position == 0 || position > count {
            return Err(BridgeError::BindError(format!(
                "position {position} out of range 1..={count}"
            )));
        }
        self.slots[position - 1] = Some(value);
        Ok(())
    }

    /// Replace every binding with `params`, in order starting at position 1.
    pub(crate) fn replace_all(&mut self, params: &[Value]) -> Result<()> {
        if params.len() > self.slots.len() {
            return Err(BridgeError::BindError(format!(
                "{} parameters supplied, statement takes {}",
                params.len(),
                self.slots.len()
            )));
        }
        self.clear();
        for (idx, value) in params.iter().enumerate() {
            self.slots[idx] = Some(value.clone());
        }
        Ok(())
    }

    pub(crate) fn clear(&mut self) {
        self.slots.iter_mut().for_each(|slot| *slot = None);
    }

    pub(crate) fn get(&self, position: usize) -> Option<&Value> {
        position
            .checked_sub(1)
            .and_then(|idx| self.slots.get(idx))
            .and_then(Option::as_ref)
    }

    pub(crate) fn resolve(&self) -> Vec<NativeValue> {
        self.slots
            .iter()
            .map(|slot| slot.clone().map_or(NativeValue::Null, NativeValue::from))
            .collect()
    }
}

/// Convert a host parameter list for a direct (unprepared) call.
pub(crate) fn to_native_params(params: &[Value]) -> Vec<NativeValue> {
    params.iter().cloned().map(NativeValue::from).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positions_are_one_based_and_bounded() {
        let mut params = BoundParams::new(2);
        assert!(matches!(
            params.set(0, Value::Null),
            Err(BridgeError::BindError(_))
        ));
        assert!(matches!(
            params.set(3, Value::Null),
            Err(BridgeError::BindError(_))
        ));
        params.set(2, Value::Integer(7)).unwrap();
        assert_eq!(
            params.resolve(),
            vec![NativeValue::Null, NativeValue::Integer(7)]
        );
    }

    #[test]
    fn rebinding_overwrites_the_position() {
        let mut params = BoundParams::new(1);
        params.set(1, Value::Text("first".into())).unwrap();
        params.set(1, Value::Text("second".into())).unwrap();
        assert_eq!(params.get(1), Some(&Value::Text("second".into())));
    }

    #[test]
    fn replace_all_rejects_too_many() {
        let mut params = BoundParams::new(1);
        let err = params
            .replace_all(&[Value::Integer(1), Value::Integer(2)])
            .unwrap_err();
        assert!(matches!(err, BridgeError::BindError(_)));
    }

    #[test]
    fn clear_unbinds_everything() {
        let mut params = BoundParams::new(2);
        params.replace_all(&[Value::Integer(1), Value::Integer(2)]).unwrap();
        params.clear();
        assert_eq!(params.get(1), None);
        assert_eq!(params.resolve(), vec![NativeValue::Null, NativeValue::Null]);
    }

    #[test]
    fn native_text_and_blob_round_trip_bytes() {
        let text = "héllo ✓".to_string();
        let back = Value::from(NativeValue::from(Value::Text(text.clone())));
        assert_eq!(back.as_text().unwrap().as_bytes(), text.as_bytes());

        let blob = vec![0u8, 255, 10];
        let back = Value::from(NativeValue::from(Value::Blob(blob.clone())));
        assert_eq!(back.as_blob().unwrap(), blob.as_slice());
    }
}
