//! Append-only store of entity versions.
//!
//! Every save appends an immutable row. Payload and generation are
//! write-once; only the `visible` flag is ever updated, which is what undo
//! and redo flip. The current value of an entity is its latest visible row
//! whose generation is reachable from the active generation.

use super::{Backend, Generation, StorageError, StorageResult};
use crate::entities::{EntityId, EntityKind};
use kurbo::Rect;
use rusqlite::{OptionalExtension, Params, Row, params};
use std::collections::BTreeMap;

/// Primary key of a version row; defines arrival order.
pub type VersionId = i64;

/// Bounding box cached with each version, `(x0, y0)` to `(x1, y1)`.
pub type BoundingBox = Rect;

/// Column list shared across queries.
const COLUMNS: &str = "version_id, entity_id, kind, payload, style_ref, generation, \
    state, visible, locked, bbox_xmin, bbox_ymin, bbox_xmax, bbox_ymax";

/// Restricts a query to the latest reachable visible row of each entity.
const CURRENT_VERSIONS: &str = "SELECT MAX(version_id) FROM entity_versions \
    WHERE visible = 1 AND generation <= ?1 GROUP BY entity_id";

/// Lifecycle state recorded on each version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EntityState {
    #[default]
    Active,
    /// Tombstone: the entity was deleted by this version.
    Deleted,
}

impl EntityState {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityState::Active => "active",
            EntityState::Deleted => "deleted",
        }
    }

    fn parse(s: &str) -> Result<Self, StorageError> {
        match s {
            "active" => Ok(EntityState::Active),
            "deleted" => Ok(EntityState::Deleted),
            other => Err(StorageError::Serialization(format!(
                "unknown entity state '{}'",
                other
            ))),
        }
    }
}

/// One immutable saved version of a logical entity.
#[derive(Debug, Clone, PartialEq)]
pub struct VersionRow {
    pub version_id: VersionId,
    pub entity_id: EntityId,
    pub kind: EntityKind,
    /// Serialized construction data; never inspected by the store.
    pub payload: Vec<u8>,
    pub style_ref: Option<EntityId>,
    pub generation: Generation,
    pub state: EntityState,
    pub visible: bool,
    /// Reserved for entity locking; always false.
    pub locked: bool,
    pub bbox: BoundingBox,
}

impl VersionRow {
    pub fn is_tombstone(&self) -> bool {
        self.state == EntityState::Deleted
    }
}

/// Values for a row about to be appended.
#[derive(Debug, Clone)]
pub struct NewVersion<'a> {
    pub entity_id: EntityId,
    pub kind: EntityKind,
    pub payload: &'a [u8],
    pub style_ref: Option<EntityId>,
    pub generation: Generation,
    pub bbox: BoundingBox,
}

/// Row as stored, before the text columns are validated.
struct RawRow {
    version_id: VersionId,
    entity_id: EntityId,
    kind: String,
    payload: Vec<u8>,
    style_ref: Option<EntityId>,
    generation: Generation,
    state: String,
    visible: bool,
    locked: bool,
    bbox: [f64; 4],
}

impl RawRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            version_id: row.get(0)?,
            entity_id: row.get(1)?,
            kind: row.get(2)?,
            payload: row.get(3)?,
            style_ref: row.get(4)?,
            generation: row.get(5)?,
            state: row.get(6)?,
            visible: row.get(7)?,
            locked: row.get(8)?,
            bbox: [row.get(9)?, row.get(10)?, row.get(11)?, row.get(12)?],
        })
    }

    fn into_version(self) -> StorageResult<VersionRow> {
        let [x0, y0, x1, y1] = self.bbox;
        Ok(VersionRow {
            version_id: self.version_id,
            entity_id: self.entity_id,
            kind: self
                .kind
                .parse()
                .map_err(|_| StorageError::Serialization(format!("unknown entity kind '{}'", self.kind)))?,
            payload: self.payload,
            style_ref: self.style_ref,
            generation: self.generation,
            state: EntityState::parse(&self.state)?,
            visible: self.visible,
            locked: self.locked,
            bbox: Rect::new(x0, y0, x1, y1),
        })
    }
}

/// Entity version store. Holds no connection of its own; every call runs on
/// the session's [`Backend`].
#[derive(Debug, Default, Clone, Copy)]
pub struct EntityStore;

impl EntityStore {
    pub fn new() -> Self {
        Self
    }

    /// Append a live version. The new row is always visible.
    pub fn append_version(&self, backend: &Backend, version: &NewVersion<'_>) -> StorageResult<VersionId> {
        self.insert(backend, version, EntityState::Active)
    }

    /// Append a tombstone marking the entity as deleted.
    pub fn append_tombstone(&self, backend: &Backend, version: &NewVersion<'_>) -> StorageResult<VersionId> {
        self.insert(backend, version, EntityState::Deleted)
    }

    fn insert(&self, backend: &Backend, version: &NewVersion<'_>, state: EntityState) -> StorageResult<VersionId> {
        let mut stmt = backend.conn().prepare_cached(
            "INSERT INTO entity_versions
                (entity_id, kind, payload, style_ref, generation, state, visible, locked,
                 bbox_xmin, bbox_ymin, bbox_xmax, bbox_ymax)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, 1, 0, ?7, ?8, ?9, ?10)",
        )?;
        let bbox = version.bbox.abs();
        stmt.execute(params![
            version.entity_id,
            version.kind.as_str(),
            version.payload,
            version.style_ref,
            version.generation,
            state.as_str(),
            bbox.x0,
            bbox.y0,
            bbox.x1,
            bbox.y1,
        ])?;
        Ok(backend.conn().last_insert_rowid())
    }

    /// Look up one row by its version id.
    pub fn get_version(&self, backend: &Backend, version_id: VersionId) -> StorageResult<Option<VersionRow>> {
        let sql = format!("SELECT {COLUMNS} FROM entity_versions WHERE version_id = ?1");
        query_one(backend, &sql, [version_id])
    }

    /// Complete timeline of one entity, oldest first. Empty for unknown ids.
    pub fn get_history(&self, backend: &Backend, entity_id: EntityId) -> StorageResult<Vec<VersionRow>> {
        let sql = format!(
            "SELECT {COLUMNS} FROM entity_versions WHERE entity_id = ?1 ORDER BY version_id"
        );
        query_rows(backend, &sql, [entity_id])
    }

    /// Every row of one kind, keyed by version id. Not reduced to current.
    pub fn get_by_kind(&self, backend: &Backend, kind: EntityKind) -> StorageResult<BTreeMap<VersionId, VersionRow>> {
        let sql = format!("SELECT {COLUMNS} FROM entity_versions WHERE kind = ?1");
        keyed(query_rows(backend, &sql, [kind.as_str()])?)
    }

    /// Every row written while `style_ref` was the active style.
    pub fn get_by_style(&self, backend: &Backend, style_ref: EntityId) -> StorageResult<BTreeMap<VersionId, VersionRow>> {
        let sql = format!("SELECT {COLUMNS} FROM entity_versions WHERE style_ref = ?1");
        keyed(query_rows(backend, &sql, [style_ref])?)
    }

    /// Rows produced by one generation, in arrival order.
    pub fn get_by_generation(&self, backend: &Backend, generation: Generation) -> StorageResult<Vec<VersionRow>> {
        let sql = format!(
            "SELECT {COLUMNS} FROM entity_versions WHERE generation = ?1 ORDER BY version_id"
        );
        query_rows(backend, &sql, [generation])
    }

    /// Current row of one entity as seen from `active`. May be a tombstone.
    pub fn get_current(
        &self,
        backend: &Backend,
        entity_id: EntityId,
        active: Generation,
    ) -> StorageResult<Option<VersionRow>> {
        let sql = format!(
            "SELECT {COLUMNS} FROM entity_versions
             WHERE entity_id = ?1 AND visible = 1 AND generation <= ?2
             ORDER BY version_id DESC LIMIT 1"
        );
        query_one(backend, &sql, params![entity_id, active])
    }

    /// Current row of every live entity of one kind, ordered by entity id.
    pub fn current_of_kind(
        &self,
        backend: &Backend,
        kind: EntityKind,
        active: Generation,
    ) -> StorageResult<Vec<VersionRow>> {
        let sql = format!(
            "SELECT {COLUMNS} FROM entity_versions
             WHERE version_id IN ({CURRENT_VERSIONS}) AND kind = ?2 AND state = 'active'
             ORDER BY entity_id"
        );
        query_rows(backend, &sql, params![active, kind.as_str()])
    }

    /// Current live rows with geometry whose bounding box touches `area`.
    pub fn intersecting(&self, backend: &Backend, area: Rect, active: Generation) -> StorageResult<Vec<VersionRow>> {
        let area = area.abs();
        let sql = format!(
            "SELECT {COLUMNS} FROM entity_versions
             WHERE version_id IN ({CURRENT_VERSIONS}) AND state = 'active'
               AND bbox_xmax >= ?2 AND bbox_xmin <= ?3
               AND bbox_ymax >= ?4 AND bbox_ymin <= ?5
             ORDER BY entity_id"
        );
        let rows = query_rows(backend, &sql, params![active, area.x0, area.x1, area.y0, area.y1])?;
        Ok(rows.into_iter().filter(|row| row.kind.has_geometry()).collect())
    }

    /// Flip `visible` on every row of one generation in a single statement.
    /// Returns the number of rows flipped.
    pub fn mark_generation_visibility(
        &self,
        backend: &Backend,
        generation: Generation,
        visible: bool,
    ) -> StorageResult<usize> {
        let changed = backend.execute(
            "UPDATE entity_versions SET visible = ?1 WHERE generation = ?2",
            params![visible, generation],
        )?;
        Ok(changed)
    }

    /// Rows of one entity reachable from `active`, newest first, whatever
    /// their visibility.
    pub fn reachable_history(
        &self,
        backend: &Backend,
        entity_id: EntityId,
        active: Generation,
    ) -> StorageResult<Vec<VersionRow>> {
        let sql = format!(
            "SELECT {COLUMNS} FROM entity_versions
             WHERE entity_id = ?1 AND generation <= ?2
             ORDER BY version_id DESC"
        );
        query_rows(backend, &sql, params![entity_id, active])
    }

    /// Flip `visible` on a single row. Returns false if no such row exists.
    pub fn mark_version_visibility(
        &self,
        backend: &Backend,
        version_id: VersionId,
        visible: bool,
    ) -> StorageResult<bool> {
        let changed = backend.execute(
            "UPDATE entity_versions SET visible = ?1 WHERE version_id = ?2",
            params![visible, version_id],
        )?;
        Ok(changed == 1)
    }

    /// One past the greatest entity id ever stored, or zero when empty.
    pub fn next_available_entity_id(&self, backend: &Backend) -> StorageResult<EntityId> {
        let max: Option<EntityId> = backend.conn().query_row(
            "SELECT MAX(entity_id) FROM entity_versions",
            [],
            |row| row.get(0),
        )?;
        Ok(max.map_or(0, |id| id + 1))
    }

    /// Highest generation referenced by any row, zero when empty.
    pub fn max_generation(&self, backend: &Backend) -> StorageResult<Generation> {
        let max: Generation = backend.conn().query_row(
            "SELECT COALESCE(MAX(generation), 0) FROM entity_versions",
            [],
            |row| row.get(0),
        )?;
        Ok(max)
    }
}

fn query_rows<P: Params>(backend: &Backend, sql: &str, params: P) -> StorageResult<Vec<VersionRow>> {
    let mut stmt = backend.conn().prepare_cached(sql)?;
    let raw = stmt
        .query_map(params, RawRow::read)?
        .collect::<Result<Vec<_>, _>>()?;
    raw.into_iter().map(RawRow::into_version).collect()
}

fn query_one<P: Params>(backend: &Backend, sql: &str, params: P) -> StorageResult<Option<VersionRow>> {
    let mut stmt = backend.conn().prepare_cached(sql)?;
    let raw = stmt.query_row(params, RawRow::read).optional()?;
    raw.map(RawRow::into_version).transpose()
}

fn keyed(rows: Vec<VersionRow>) -> StorageResult<BTreeMap<VersionId, VersionRow>> {
    Ok(rows.into_iter().map(|row| (row.version_id, row)).collect())
}
