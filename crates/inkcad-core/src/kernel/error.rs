//! Kernel error taxonomy.

use crate::entities::EntityId;
use crate::storage::StorageError;
use thiserror::Error;

/// Errors surfaced by the kernel and the stores it drives.
#[derive(Debug, Error)]
pub enum KernelError {
    /// Backend I/O or constraint failure. The operation was rolled back and
    /// may be retried once the backend recovers.
    #[error("Storage failure: {0}")]
    Storage(#[from] StorageError),
    #[error("Nothing to undo")]
    UndoExhausted,
    #[error("Nothing to redo")]
    RedoExhausted,
    #[error("Unsupported entity kind: {0}")]
    UnsupportedEntityKind(String),
    #[error("Unknown entity: {0}")]
    UnknownEntity(EntityId),
    #[error("Invalid entity payload: {0}")]
    Payload(#[from] serde_json::Error),
    #[error("A bulk transaction is already open")]
    BulkAlreadyOpen,
    #[error("No bulk transaction is open")]
    NoBulkOpen,
    #[error("Configuration error: {0}")]
    Config(String),
}

impl KernelError {
    /// Expected end-of-history conditions, reported rather than raised.
    pub fn is_boundary(&self) -> bool {
        matches!(self, KernelError::UndoExhausted | KernelError::RedoExhausted)
    }
}

impl From<rusqlite::Error> for KernelError {
    fn from(e: rusqlite::Error) -> Self {
        KernelError::Storage(StorageError::Sqlite(e))
    }
}

/// Result type for kernel operations.
pub type KernelResult<T> = Result<T, KernelError>;
