//! The durable-storage boundary.

use std::fmt;

use crate::engine::LedgerSnapshot;

#[derive(Debug)]
pub enum PersistError {
    Io(String),
    Encode(String),
}

impl fmt::Display for PersistError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PersistError::Io(msg) => write!(f, "I/O error: {msg}"),
            PersistError::Encode(msg) => write!(f, "encode error: {msg}"),
        }
    }
}

impl std::error::Error for PersistError {}

/// Durable, atomic sink for ledger snapshots.
///
/// Implementations must guarantee the previous snapshot is never
/// observably truncated on crash — write-then-rename semantics or better.
#[allow(async_fn_in_trait)]
pub trait PersistenceGateway {
    async fn write_snapshot(&mut self, snapshot: &LedgerSnapshot) -> Result<(), PersistError>;
}
