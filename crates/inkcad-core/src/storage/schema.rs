//! Table layout for a drawing database.
//!
//! ```text
//! entity_versions   one immutable row per saved version
//! undo_log          generation visits in order, plus abandonment markers
//! ```

use super::StorageResult;
use rusqlite::Connection;

pub const ENTITY_VERSIONS_TABLE: &str = "entity_versions";
pub const UNDO_LOG_TABLE: &str = "undo_log";

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS entity_versions (
    version_id   INTEGER PRIMARY KEY AUTOINCREMENT,
    entity_id    INTEGER NOT NULL,
    kind         TEXT    NOT NULL,
    payload      BLOB    NOT NULL,
    style_ref    INTEGER,
    generation   INTEGER NOT NULL,
    state        TEXT    NOT NULL DEFAULT 'active',
    visible      INTEGER NOT NULL DEFAULT 1,
    locked       INTEGER NOT NULL DEFAULT 0,
    bbox_xmin    REAL    NOT NULL DEFAULT 0,
    bbox_ymin    REAL    NOT NULL DEFAULT 0,
    bbox_xmax    REAL    NOT NULL DEFAULT 0,
    bbox_ymax    REAL    NOT NULL DEFAULT 0
);
CREATE INDEX IF NOT EXISTS idx_entity_versions_entity ON entity_versions (entity_id, version_id);
CREATE INDEX IF NOT EXISTS idx_entity_versions_generation ON entity_versions (generation);
CREATE INDEX IF NOT EXISTS idx_entity_versions_kind ON entity_versions (kind);
CREATE INDEX IF NOT EXISTS idx_entity_versions_style ON entity_versions (style_ref);
CREATE INDEX IF NOT EXISTS idx_entity_versions_bbox
    ON entity_versions (bbox_xmin, bbox_xmax, bbox_ymin, bbox_ymax);

CREATE TABLE IF NOT EXISTS undo_log (
    visit_id     INTEGER PRIMARY KEY AUTOINCREMENT,
    generation   INTEGER NOT NULL,
    action       TEXT    NOT NULL DEFAULT 'visit' CHECK (action IN ('visit', 'abandon'))
);
CREATE INDEX IF NOT EXISTS idx_undo_log_generation ON undo_log (generation, action);
";

/// Create both tables and their indexes if they do not exist yet.
pub fn init_schema(conn: &Connection) -> StorageResult<()> {
    conn.execute_batch(SCHEMA)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table_exists(conn: &Connection, name: &str) -> bool {
        conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
            [name],
            |row| row.get::<_, i64>(0),
        )
        .unwrap()
            == 1
    }

    #[test]
    fn test_init_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        init_schema(&conn).unwrap();
        assert!(table_exists(&conn, ENTITY_VERSIONS_TABLE));
        assert!(table_exists(&conn, UNDO_LOG_TABLE));
    }
}
