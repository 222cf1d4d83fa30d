//! SQLite-backed transactional storage primitive.

use super::{StorageError, StorageResult, schema};
use rusqlite::{Connection, Params};
use std::path::Path;

/// Connection to the relational store backing one drawing session.
///
/// Transactions are explicit: [`Backend::begin`] opens one if none is
/// active, [`Backend::commit`] closes it unless commits are suspended.
/// While suspended, commits are deferred until the caller resumes and
/// commits explicitly, which is how bulk imports share one transaction.
pub struct Backend {
    conn: Connection,
    commit_suspended: bool,
}

impl Backend {
    /// Open (or create) a drawing database at `path`.
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    StorageError::Io(format!("Failed to create {}: {}", parent.display(), e))
                })?;
            }
        }
        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    /// Open a private in-memory database.
    pub fn open_in_memory() -> StorageResult<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> StorageResult<Self> {
        schema::init_schema(&conn)?;
        Ok(Self {
            conn,
            commit_suspended: false,
        })
    }

    /// Borrow the raw connection for prepared statements.
    pub(crate) fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Execute a parametrized statement, returning the number of changed rows.
    pub fn execute<P: Params>(&self, sql: &str, params: P) -> StorageResult<usize> {
        Ok(self.conn.execute(sql, params)?)
    }

    /// Execute one or more statements without parameters.
    pub fn execute_batch(&self, sql: &str) -> StorageResult<()> {
        Ok(self.conn.execute_batch(sql)?)
    }

    /// Whether a transaction is currently open.
    pub fn in_transaction(&self) -> bool {
        !self.conn.is_autocommit()
    }

    /// Open a transaction unless one is already open.
    pub fn begin(&self) -> StorageResult<()> {
        if !self.in_transaction() {
            self.conn.execute_batch("BEGIN IMMEDIATE")?;
        }
        Ok(())
    }

    /// Commit the open transaction, unless commits are suspended.
    pub fn commit(&self) -> StorageResult<()> {
        if self.commit_suspended {
            log::trace!("commit deferred while suspended");
            return Ok(());
        }
        if self.in_transaction() {
            self.conn.execute_batch("COMMIT")?;
        }
        Ok(())
    }

    /// Discard everything written since the last commit.
    pub fn rollback(&self) -> StorageResult<()> {
        if self.in_transaction() {
            self.conn.execute_batch("ROLLBACK")?;
        }
        Ok(())
    }

    /// Defer commits until [`Backend::resume_commit`].
    pub fn suspend_commit(&mut self) {
        self.commit_suspended = true;
    }

    /// Allow commits again. Does not commit by itself.
    pub fn resume_commit(&mut self) {
        self.commit_suspended = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn count_log_rows(backend: &Backend) -> i64 {
        backend
            .conn()
            .query_row("SELECT COUNT(*) FROM undo_log", [], |row| row.get(0))
            .unwrap()
    }

    #[test]
    fn test_commit_persists() {
        let backend = Backend::open_in_memory().unwrap();
        backend.begin().unwrap();
        backend
            .execute("INSERT INTO undo_log (generation) VALUES (?1)", [1])
            .unwrap();
        assert!(backend.in_transaction());
        backend.commit().unwrap();
        assert!(!backend.in_transaction());
        assert_eq!(count_log_rows(&backend), 1);
    }

    #[test]
    fn test_rollback_discards() {
        let backend = Backend::open_in_memory().unwrap();
        backend.begin().unwrap();
        backend
            .execute("INSERT INTO undo_log (generation) VALUES (?1)", [1])
            .unwrap();
        backend.rollback().unwrap();
        assert_eq!(count_log_rows(&backend), 0);
    }

    #[test]
    fn test_suspended_commit_is_deferred() {
        let mut backend = Backend::open_in_memory().unwrap();
        backend.suspend_commit();
        backend.begin().unwrap();
        backend
            .execute("INSERT INTO undo_log (generation) VALUES (?1)", [1])
            .unwrap();
        backend.commit().unwrap();
        assert!(backend.in_transaction());

        backend.resume_commit();
        backend.commit().unwrap();
        assert!(!backend.in_transaction());
        assert_eq!(count_log_rows(&backend), 1);
    }

    #[test]
    fn test_begin_is_reentrant() {
        let backend = Backend::open_in_memory().unwrap();
        backend.begin().unwrap();
        backend.begin().unwrap();
        backend.commit().unwrap();
        assert!(!backend.in_transaction());
    }

    #[test]
    fn test_open_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("drawing.sqlite");
        Backend::open(&path).unwrap();
        assert!(path.exists());
    }
}
