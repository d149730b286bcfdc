use std::fmt;

use serde_json::Value as JsonValue;

use crate::error::{BridgeError, Result};

/// Values that can be bound as parameters or read back from a row.
///
/// Each variant has exactly one native counterpart, so binding never needs to
/// guess:
/// ```rust
/// use libsql_bridge::Value;
///
/// let params = vec![Value::Integer(1), Value::Text("alice".into()), Value::Null];
/// # let _ = params;
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Integer value (64-bit)
    Integer(i64),
    /// Floating point value (64-bit)
    Float(f64),
    /// UTF-8 text
    Text(String),
    /// Binary data
    Blob(Vec<u8>),
    /// NULL value
    Null,
}

/// Native column type codes, numbered the way the native library reports them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    Integer = 1,
    Float = 2,
    Text = 3,
    Blob = 4,
    Null = 5,
}

impl ValueType {
    #[must_use]
    pub fn code(self) -> i32 {
        self as i32
    }

    /// Map a native type code back to a `ValueType`.
    ///
    /// # Errors
    /// Returns `BridgeError::TypeMismatch` for codes outside 1..=5.
    pub fn from_code(code: i32) -> Result<Self> {
        match code {
            1 => Ok(ValueType::Integer),
            2 => Ok(ValueType::Float),
            3 => Ok(ValueType::Text),
            4 => Ok(ValueType::Blob),
            5 => Ok(ValueType::Null),
            other => Err(BridgeError::type_mismatch(
                "native type code 1..=5",
                format!("code {other}"),
            )),
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueType::Integer => "INTEGER",
            ValueType::Float => "FLOAT",
            ValueType::Text => "TEXT",
            ValueType::Blob => "BLOB",
            ValueType::Null => "NULL",
        };
        f.write_str(name)
    }
}

impl Value {
    #[must_use]
    pub fn value_type(&self) -> ValueType {
        match self {
            Value::Integer(_) => ValueType::Integer,
            Value::Float(_) => ValueType::Float,
            Value::Text(_) => ValueType::Text,
            Value::Blob(_) => ValueType::Blob,
            Value::Null => ValueType::Null,
        }
    }

    /// Check if this value is NULL
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    #[must_use]
    pub fn as_integer(&self) -> Option<i64> {
        if let Value::Integer(value) = self {
            Some(*value)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_float(&self) -> Option<f64> {
        if let Value::Float(value) = self {
            Some(*value)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        if let Value::Text(value) = self {
            Some(value)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_blob(&self) -> Option<&[u8]> {
        if let Value::Blob(bytes) = self {
            Some(bytes)
        } else {
            None
        }
    }

    /// Explicit float-to-integer conversion, truncating toward zero.
    ///
    /// Integers pass through unchanged. This is the only numeric narrowing the
    /// crate performs, and only when asked.
    ///
    /// # Errors
    /// Returns `BridgeError::TypeMismatch` for non-numeric values and for floats
    /// that are NaN or outside the `i64` range.
    #[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
    pub fn truncate_to_integer(&self) -> Result<i64> {
        match self {
            Value::Integer(i) => Ok(*i),
            Value::Float(f) if f.is_finite() && *f >= i64::MIN as f64 && *f < i64::MAX as f64 => {
                Ok(f.trunc() as i64)
            }
            Value::Float(f) => Err(BridgeError::type_mismatch(
                "float within i64 range",
                f.to_string(),
            )),
            other => Err(BridgeError::type_mismatch(
                "INTEGER or FLOAT",
                other.value_type().to_string(),
            )),
        }
    }

    /// Render for display; blobs become arrays of byte values.
    #[must_use]
    pub fn to_json(&self) -> JsonValue {
        match self {
            Value::Integer(i) => JsonValue::from(*i),
            Value::Float(f) => JsonValue::from(*f),
            Value::Text(s) => JsonValue::String(s.clone()),
            Value::Blob(bytes) => JsonValue::from(bytes.clone()),
            Value::Null => JsonValue::Null,
        }
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Integer(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_owned())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl From<Vec<u8>> for Value {
    fn from(value: Vec<u8>) -> Self {
        Value::Blob(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}

/// Host values arriving as JSON. Tags without a native counterpart are
/// rejected rather than coerced.
impl TryFrom<JsonValue> for Value {
    type Error = BridgeError;

    fn try_from(json: JsonValue) -> Result<Self> {
        match json {
            JsonValue::Null => Ok(Value::Null),
            JsonValue::String(s) => Ok(Value::Text(s)),
            JsonValue::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Ok(Value::Integer(i))
                } else if n.is_u64() {
                    Err(BridgeError::type_mismatch("INTEGER within i64 range", n.to_string()))
                } else if let Some(f) = n.as_f64() {
                    Ok(Value::Float(f))
                } else {
                    Err(BridgeError::type_mismatch("number", n.to_string()))
                }
            }
            JsonValue::Bool(b) => Err(BridgeError::type_mismatch(
                "INTEGER, FLOAT, TEXT, BLOB or NULL",
                format!("boolean {b}"),
            )),
            JsonValue::Array(_) => Err(BridgeError::type_mismatch(
                "INTEGER, FLOAT, TEXT, BLOB or NULL",
                "array",
            )),
            JsonValue::Object(_) => Err(BridgeError::type_mismatch(
                "INTEGER, FLOAT, TEXT, BLOB or NULL",
                "object",
            )),
        }
    }
}
