use thiserror::Error;

/// SQLite's generic error code, reported by the native library for parse failures.
const SQLITE_ERROR: i32 = 1;

/// Every failure the binding surface can report.
///
/// Native codes and messages are carried in the payload unchanged; nothing is
/// retried by this layer.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BridgeError {
    #[error("Stale handle: {0}")]
    StaleHandle(String),

    #[error("Type mismatch: expected {expected}, found {found}")]
    TypeMismatch { expected: String, found: String },

    #[error("Open failed: {reason}")]
    OpenFailed { reason: String },

    #[error("Syntax error ({code}): {native_message}")]
    SyntaxError { code: i32, native_message: String },

    #[error("Bind error: {0}")]
    BindError(String),

    #[error("Column index {index} out of range (column count {count})")]
    ColumnOutOfRange { index: usize, count: usize },

    #[error("Sync failed: {reason}")]
    SyncFailed { reason: String },

    #[error("Sync already in progress for {0}")]
    SyncInProgress(String),

    #[error("Operation cancelled: {0}")]
    Cancelled(String),

    #[error("Native error ({code}): {message}")]
    NativeError { code: i32, message: String },

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Runtime error: {0}")]
    RuntimeError(String),
}

pub type Result<T, E = BridgeError> = std::result::Result<T, E>;

impl BridgeError {
    pub(crate) fn type_mismatch(expected: impl Into<String>, found: impl Into<String>) -> Self {
        BridgeError::TypeMismatch {
            expected: expected.into(),
            found: found.into(),
        }
    }

    /// Classify a failure raised while compiling SQL.
    pub(crate) fn from_prepare(err: libsql::Error) -> Self {
        match err {
            libsql::Error::SqliteFailure(code, native_message) if code == SQLITE_ERROR => {
                BridgeError::SyntaxError {
                    code,
                    native_message,
                }
            }
            other => {
                let message = other.to_string();
                // Remote (hrana) parse errors come back without a sqlite code.
                if message.contains("syntax error") || message.contains("SQL_PARSE_ERROR") {
                    BridgeError::SyntaxError {
                        code: SQLITE_ERROR,
                        native_message: message,
                    }
                } else {
                    BridgeError::from(other)
                }
            }
        }
    }

    /// A batch reports compile and step failures with the same code, so only
    /// messages SQLite raises while compiling count as syntax errors.
    pub(crate) fn from_batch(err: libsql::Error) -> Self {
        match err {
            libsql::Error::SqliteFailure(code, message)
                if code == SQLITE_ERROR && !is_compile_message(&message) =>
            {
                BridgeError::from(libsql::Error::SqliteFailure(code, message))
            }
            other => BridgeError::from_prepare(other),
        }
    }

    /// True for errors meaning "this token no longer names a live handle".
    #[must_use]
    pub fn is_stale(&self) -> bool {
        matches!(self, BridgeError::StaleHandle(_))
    }
}

impl From<libsql::Error> for BridgeError {
    fn from(err: libsql::Error) -> Self {
        match err {
            libsql::Error::SqliteFailure(code, message) => BridgeError::NativeError { code, message },
            other => BridgeError::NativeError {
                code: -1,
                message: other.to_string(),
            },
        }
    }
}

fn is_compile_message(message: &str) -> bool {
    const COMPILE_MESSAGES: [&str; 6] = [
        "syntax error",
        "incomplete input",
        "unrecognized token",
        "no such ",
        "already exists",
        "no tables specified",
    ];
    COMPILE_MESSAGES.iter().any(|m| message.contains(m))
}

impl From<serde_json::Error> for BridgeError {
    fn from(err: serde_json::Error) -> Self {
        BridgeError::ConfigError(format!("JSON error: {err}"))
    }
}
