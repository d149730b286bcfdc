use std::fmt;

/// The kinds of native resource the registry tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandleKind {
    Database,
    Connection,
    Statement,
    Rows,
    Row,
    Buffer,
    SyncFuture,
}

impl fmt::Display for HandleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HandleKind::Database => "database",
            HandleKind::Connection => "connection",
            HandleKind::Statement => "statement",
            HandleKind::Rows => "rows",
            HandleKind::Row => "row",
            HandleKind::Buffer => "buffer",
            HandleKind::SyncFuture => "sync future",
        };
        f.write_str(name)
    }
}

/// Opaque reference issued by a registry.
///
/// Carries the issuing registry's id so tokens from another bridge are
/// rejected, and a generation so a token never aliases a reused slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Token {
    pub(crate) registry: u32,
    pub(crate) index: u32,
    pub(crate) generation: u32,
    pub(crate) kind: HandleKind,
}

impl Token {
    #[must_use]
    pub fn kind(&self) -> HandleKind {
        self.kind
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}#{}.{}@{}",
            self.kind, self.index, self.generation, self.registry
        )
    }
}

/// A typed token. Implemented by one wrapper per `HandleKind`.
pub trait Handle: Copy + fmt::Debug + fmt::Display + Send + Sync + 'static {
    const KIND: HandleKind;

    fn token(&self) -> Token;

    #[doc(hidden)]
    fn from_token(token: Token) -> Self;
}

macro_rules! typed_handle {
    ($(#[$meta:meta])* $name:ident => $kind:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub struct $name(Token);

        impl Handle for $name {
            const KIND: HandleKind = HandleKind::$kind;

            fn token(&self) -> Token {
                self.0
            }

            fn from_token(token: Token) -> Self {
                debug_assert_eq!(token.kind, HandleKind::$kind);
                Self(token)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Display::fmt(&self.0, f)
            }
        }

        impl From<$name> for Token {
            fn from(handle: $name) -> Token {
                handle.0
            }
        }
    };
}

typed_handle!(
    /// An opened database.
    DatabaseHandle => Database
);
typed_handle!(
    /// A connection owned by one database.
    ConnectionHandle => Connection
);
typed_handle!(
    /// A prepared statement owned by one connection.
    StatementHandle => Statement
);
typed_handle!(
    /// A forward-only result cursor.
    RowsHandle => Rows
);
typed_handle!(
    /// One fetched row of a result.
    RowHandle => Row
);
typed_handle!(
    /// Caller-owned copy of a text or blob value.
    BufferHandle => Buffer
);
typed_handle!(
    /// A non-blocking sync started with `Bridge::sync_async`.
    SyncHandle => SyncFuture
);
