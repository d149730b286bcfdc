//! Handle registry: opaque tokens for native resources.
//!
//! - `token`: the token type and its typed wrappers
//! - `table`: the arena, ownership tree and release policy

pub mod token;
pub(crate) mod table;

pub use token::{
    BufferHandle, ConnectionHandle, DatabaseHandle, Handle, HandleKind, RowHandle, RowsHandle,
    StatementHandle, SyncHandle, Token,
};
pub(crate) use table::{Registry, Resource};
