//! Undo generation log.
//!
//! Generations are allocated one per logical save point. The persisted log
//! records every generation that was created or re-entered, in visitation
//! order; a generation "exists" when it appears in the log at least once.
//! Stepping backward or forward skips numbers that never made it into the
//! log, so an unallocated slot is never treated as an undo target.
//!
//! Saving while the pointer sits below the newest generation abandons the
//! generations above it. Abandonment is appended to the same log and those
//! generations are never stepping targets again.

use super::{Backend, StorageResult};
use rusqlite::OptionalExtension;

/// Undo/redo checkpoint number.
pub type Generation = i64;

/// Log entry recording a visit.
const VISIT: &str = "visit";
/// Log entry recording that a generation was cut off by a later save.
const ABANDON: &str = "abandon";

/// Logged, non-abandoned generations.
const REACHABLE: &str = "action = 'visit' AND generation NOT IN \
    (SELECT generation FROM undo_log WHERE action = 'abandon')";

/// In-memory pointer state, restorable when a transaction is rolled back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UndoCheckpoint {
    last_generation: Generation,
    active_generation: Generation,
}

/// Tracks the highest allocated generation and the active pointer.
#[derive(Debug, Default)]
pub struct UndoLog {
    last_generation: Generation,
    active_generation: Generation,
}

impl UndoLog {
    /// Create a log for a fresh drawing.
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild the pointer state of a reopened drawing.
    ///
    /// `floor` is the highest generation referenced by any stored version, so
    /// a cleared log never leads to a generation number being handed out twice.
    pub fn load(backend: &Backend, floor: Generation) -> StorageResult<Self> {
        let logged: Generation = backend.conn().query_row(
            "SELECT COALESCE(MAX(generation), 0) FROM undo_log",
            [],
            |row| row.get(0),
        )?;
        let last_generation = logged.max(floor);
        let last_visited: Option<Generation> = backend
            .conn()
            .query_row(
                "SELECT generation FROM undo_log WHERE action = ?1
                 ORDER BY visit_id DESC LIMIT 1",
                [VISIT],
                |row| row.get(0),
            )
            .optional()?;

        Ok(Self {
            last_generation,
            active_generation: last_visited.unwrap_or(last_generation),
        })
    }

    /// Allocate the next generation and make it active.
    ///
    /// Generations above the active pointer are abandoned first.
    pub fn new_generation(&mut self, backend: &Backend) -> StorageResult<Generation> {
        if self.active_generation < self.last_generation {
            let abandoned = self.abandon_above_active(backend)?;
            if abandoned > 0 {
                log::debug!(
                    "abandoned {} generations above {}",
                    abandoned,
                    self.active_generation
                );
            }
        }
        let generation = self.last_generation + 1;
        self.record(backend, generation, VISIT)?;
        self.last_generation = generation;
        self.active_generation = generation;
        log::debug!("new generation {}", generation);
        Ok(generation)
    }

    /// Step the active pointer back to the nearest earlier reachable
    /// generation. `None` when there is nothing to undo.
    pub fn undo(&mut self, backend: &Backend) -> StorageResult<Option<Generation>> {
        let Some(target) = self.previous_generation(backend)? else {
            return Ok(None);
        };
        self.record(backend, target, VISIT)?;
        log::debug!("undo {} -> {}", self.active_generation, target);
        self.active_generation = target;
        Ok(Some(target))
    }

    /// Step the active pointer forward to the nearest later reachable
    /// generation. `None` when there is nothing to redo.
    pub fn redo(&mut self, backend: &Backend) -> StorageResult<Option<Generation>> {
        let Some(target) = self.next_generation(backend)? else {
            return Ok(None);
        };
        self.record(backend, target, VISIT)?;
        log::debug!("redo {} -> {}", self.active_generation, target);
        self.active_generation = target;
        Ok(Some(target))
    }

    /// Whether an undo step is available.
    pub fn can_undo(&self, backend: &Backend) -> StorageResult<bool> {
        Ok(self.previous_generation(backend)?.is_some())
    }

    /// Whether a redo step is available.
    pub fn can_redo(&self, backend: &Backend) -> StorageResult<bool> {
        Ok(self.next_generation(backend)?.is_some())
    }

    /// Whether `generation` was visited and has not been abandoned.
    pub fn generation_exists(&self, backend: &Backend, generation: Generation) -> StorageResult<bool> {
        let sql = format!("SELECT 1 FROM undo_log WHERE generation = ?1 AND {REACHABLE} LIMIT 1");
        let found: Option<i64> = backend
            .conn()
            .query_row(&sql, [generation], |row| row.get(0))
            .optional()?;
        Ok(found.is_some())
    }

    /// Whether a later save cut `generation` off the undo line.
    pub fn is_abandoned(&self, backend: &Backend, generation: Generation) -> StorageResult<bool> {
        let found: Option<i64> = backend
            .conn()
            .query_row(
                "SELECT 1 FROM undo_log WHERE generation = ?1 AND action = ?2 LIMIT 1",
                rusqlite::params![generation, ABANDON],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// Drop every recorded visit. Generation numbering continues where it
    /// was and abandoned generations stay abandoned.
    pub fn clear_history(&mut self, backend: &Backend) -> StorageResult<()> {
        backend.execute("DELETE FROM undo_log WHERE action = ?1", [VISIT])?;
        Ok(())
    }

    pub fn active_generation(&self) -> Generation {
        self.active_generation
    }

    pub fn max_generation(&self) -> Generation {
        self.last_generation
    }

    pub fn checkpoint(&self) -> UndoCheckpoint {
        UndoCheckpoint {
            last_generation: self.last_generation,
            active_generation: self.active_generation,
        }
    }

    pub fn restore(&mut self, checkpoint: UndoCheckpoint) {
        self.last_generation = checkpoint.last_generation;
        self.active_generation = checkpoint.active_generation;
    }

    fn record(&self, backend: &Backend, generation: Generation, action: &str) -> StorageResult<()> {
        backend.execute(
            "INSERT INTO undo_log (generation, action) VALUES (?1, ?2)",
            rusqlite::params![generation, action],
        )?;
        Ok(())
    }

    fn abandon_above_active(&self, backend: &Backend) -> StorageResult<usize> {
        let sql = format!(
            "INSERT INTO undo_log (generation, action)
             SELECT DISTINCT generation, '{ABANDON}' FROM undo_log
             WHERE generation > ?1 AND generation <= ?2 AND {REACHABLE}
             ORDER BY generation"
        );
        backend.execute(&sql, [self.active_generation, self.last_generation])
    }

    /// First reachable generation scanning down from `active - 1` to 1.
    fn previous_generation(&self, backend: &Backend) -> StorageResult<Option<Generation>> {
        let sql = format!(
            "SELECT MAX(generation) FROM undo_log
             WHERE generation >= 1 AND generation < ?1 AND {REACHABLE}"
        );
        let found = backend
            .conn()
            .query_row(&sql, [self.active_generation], |row| row.get(0))?;
        Ok(found)
    }

    /// First reachable generation scanning up from `active + 1` to `last`.
    fn next_generation(&self, backend: &Backend) -> StorageResult<Option<Generation>> {
        let sql = format!(
            "SELECT MIN(generation) FROM undo_log
             WHERE generation > ?1 AND generation <= ?2 AND {REACHABLE}"
        );
        let found = backend.conn().query_row(
            &sql,
            [self.active_generation, self.last_generation],
            |row| row.get(0),
        )?;
        Ok(found)
    }
}
