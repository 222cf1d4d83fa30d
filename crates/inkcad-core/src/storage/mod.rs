//! Persistence layer: backend connection, entity version store and undo log.

mod backend;
mod entity_store;
mod schema;
mod undo_log;

pub use backend::Backend;
pub use entity_store::{BoundingBox, EntityState, EntityStore, NewVersion, VersionId, VersionRow};
pub use schema::{ENTITY_VERSIONS_TABLE, UNDO_LOG_TABLE};
pub use undo_log::{Generation, UndoCheckpoint, UndoLog};

use thiserror::Error;

/// Storage errors.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("IO error: {0}")]
    Io(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;
