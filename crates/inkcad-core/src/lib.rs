//! InkCAD Core Library
//!
//! Versioned persistence for InkCAD drawings: an append-only entity version
//! store, a sparse undo generation log, and the kernel that binds them into
//! atomic save, delete, undo and redo operations.

pub mod config;
pub mod entities;
pub mod kernel;
pub mod storage;

pub use config::KernelConfig;
pub use entities::{Entity, EntityId, EntityKind, EntityTrait, Layer, Point, Segment, Settings, Style};
pub use kernel::{
    HandlerResult, HistoryStep, Kernel, KernelError, KernelEvent, KernelObserver, KernelResult,
    ObserverId,
};
pub use storage::{EntityState, Generation, StorageError, VersionId, VersionRow};
