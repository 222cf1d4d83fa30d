//! Drawing kernel: binds the entity version store and the undo log into
//! atomic save, delete, undo and redo operations.

mod error;
mod events;

pub use error::{KernelError, KernelResult};
pub use events::{HandlerResult, KernelEvent, KernelObserver, ObserverId};

use crate::config::KernelConfig;
use crate::entities::{Entity, EntityId, EntityKind, Layer, Settings, Style};
use crate::storage::{
    Backend, BoundingBox, EntityState, EntityStore, Generation, NewVersion, UndoCheckpoint,
    UndoLog, VersionRow,
};
use events::Observers;
use kurbo::Rect;

/// Result of an undo or redo request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryStep {
    /// The active pointer moved.
    Moved { from: Generation, to: Generation },
    /// Nothing left to step to.
    Exhausted,
}

impl HistoryStep {
    pub fn moved(&self) -> bool {
        matches!(self, HistoryStep::Moved { .. })
    }
}

/// An open bulk transaction.
struct BulkState {
    generation: Generation,
    checkpoint: UndoCheckpoint,
    /// Notifications held back until the batch commits.
    pending: Vec<(KernelEvent, VersionRow)>,
}

/// A row about to be written, before its generation is known.
struct PendingWrite {
    entity_id: EntityId,
    kind: EntityKind,
    payload: Vec<u8>,
    style_ref: Option<EntityId>,
    bbox: BoundingBox,
    state: EntityState,
}

/// Single-writer session over one drawing.
///
/// The kernel owns the backend connection exclusively; the stores borrow it
/// for the duration of one call.
pub struct Kernel {
    backend: Backend,
    store: EntityStore,
    undo_log: UndoLog,
    observers: Observers,
    config: KernelConfig,
    next_entity_id: EntityId,
    active_style: Option<EntityId>,
    bulk: Option<BulkState>,
}

impl Kernel {
    /// Open the drawing described by `config`, creating it if needed.
    pub fn open(config: KernelConfig) -> KernelResult<Self> {
        let backend = match &config.database {
            Some(path) => Backend::open(path)?,
            None => Backend::open_in_memory()?,
        };
        let store = EntityStore::new();
        let undo_log = UndoLog::load(&backend, store.max_generation(&backend)?)?;
        let next_entity_id = store.next_available_entity_id(&backend)?;

        log::info!(
            "Opened drawing {} (generation {}/{}, next entity {})",
            config
                .database
                .as_ref()
                .map_or_else(|| ":memory:".to_string(), |p| p.display().to_string()),
            undo_log.active_generation(),
            undo_log.max_generation(),
            next_entity_id
        );

        Ok(Self {
            backend,
            store,
            undo_log,
            observers: Observers::default(),
            config,
            next_entity_id,
            active_style: None,
            bulk: None,
        })
    }

    /// Open a private in-memory drawing.
    pub fn open_in_memory() -> KernelResult<Self> {
        Self::open(KernelConfig::in_memory())
    }

    pub fn config(&self) -> &KernelConfig {
        &self.config
    }

    /// The storage backend owned by this session.
    pub fn backend(&self) -> &Backend {
        &self.backend
    }

    pub fn active_generation(&self) -> Generation {
        self.undo_log.active_generation()
    }

    pub fn max_generation(&self) -> Generation {
        self.undo_log.max_generation()
    }

    /// Persist a new version of `entity`.
    ///
    /// The first save allocates a logical id and writes it back into
    /// `entity`; later saves append versions under the same id. Outside a
    /// bulk transaction the save gets its own generation and is committed
    /// before `Saved` and `Shown` fire.
    pub fn save(&mut self, entity: &mut Entity) -> KernelResult<VersionRow> {
        let payload = entity.to_payload()?;
        let entity_id = match entity.id() {
            Some(id) => id,
            None => self.allocate_entity_id()?,
        };
        log::debug!("save {} {}", entity.kind(), entity_id);

        let row = self.write(PendingWrite {
            entity_id,
            kind: entity.kind(),
            payload,
            style_ref: if entity.uses_style() { self.active_style } else { None },
            bbox: entity.bounds(),
            state: EntityState::Active,
        })?;
        entity.assign_id(entity_id);
        Ok(row)
    }

    /// Append a tombstone for `entity_id` under a fresh generation, or under
    /// the open bulk generation so the batch still undoes as one step.
    ///
    /// The tombstone keeps the kind and payload of the current row, so undo
    /// brings the entity back exactly as it was.
    pub fn delete_entity(&mut self, entity_id: EntityId) -> KernelResult<VersionRow> {
        let current = self
            .get_entity(entity_id)?
            .ok_or(KernelError::UnknownEntity(entity_id))?;
        if current.is_tombstone() {
            log::debug!("entity {} already deleted", entity_id);
            return Ok(current);
        }
        log::debug!("delete {} {}", current.kind, entity_id);

        self.write(PendingWrite {
            entity_id,
            kind: current.kind,
            payload: current.payload,
            style_ref: current.style_ref,
            bbox: current.bbox,
            state: EntityState::Deleted,
        })
    }

    fn write(&mut self, write: PendingWrite) -> KernelResult<VersionRow> {
        let bulk_generation = self.bulk.as_ref().map(|bulk| bulk.generation);
        let row = self.transaction(|kernel| {
            let generation = match bulk_generation {
                Some(generation) => generation,
                None => kernel.undo_log.new_generation(&kernel.backend)?,
            };
            kernel.append(&write, generation)
        })?;

        match row.state {
            EntityState::Active => {
                self.emit(KernelEvent::Saved, &row);
                self.emit(KernelEvent::Shown, &row);
            }
            EntityState::Deleted => {
                self.emit(KernelEvent::Deleted, &row);
                self.emit(KernelEvent::Hidden, &row);
            }
        }
        Ok(row)
    }

    fn append(&self, write: &PendingWrite, generation: Generation) -> KernelResult<VersionRow> {
        let version = NewVersion {
            entity_id: write.entity_id,
            kind: write.kind,
            payload: &write.payload,
            style_ref: write.style_ref,
            generation,
            bbox: write.bbox,
        };
        let version_id = match write.state {
            EntityState::Active => self.store.append_version(&self.backend, &version)?,
            EntityState::Deleted => self.store.append_tombstone(&self.backend, &version)?,
        };

        Ok(VersionRow {
            version_id,
            entity_id: write.entity_id,
            kind: write.kind,
            payload: write.payload.clone(),
            style_ref: write.style_ref,
            generation,
            state: write.state,
            visible: true,
            locked: false,
            bbox: write.bbox.abs(),
        })
    }

    fn allocate_entity_id(&mut self) -> KernelResult<EntityId> {
        let stored = self.store.next_available_entity_id(&self.backend)?;
        let id = self.next_entity_id.max(stored);
        self.next_entity_id = id + 1;
        Ok(id)
    }

    /// Open a bulk transaction: every save until [`Kernel::end_bulk`]
    /// shares one generation and one commit.
    pub fn start_bulk(&mut self) -> KernelResult<Generation> {
        if self.bulk.is_some() {
            return Err(KernelError::BulkAlreadyOpen);
        }
        let checkpoint = self.undo_log.checkpoint();
        self.backend.begin()?;
        self.backend.suspend_commit();

        match self.undo_log.new_generation(&self.backend) {
            Ok(generation) => {
                log::debug!("bulk transaction opened with generation {}", generation);
                self.bulk = Some(BulkState {
                    generation,
                    checkpoint,
                    pending: Vec::new(),
                });
                Ok(generation)
            }
            Err(e) => {
                self.backend.resume_commit();
                self.rollback(checkpoint);
                Err(e.into())
            }
        }
    }

    /// Commit the open bulk transaction and deliver its notifications.
    ///
    /// Returns the rows written by the batch in save order. An empty batch is
    /// rolled back so it leaves no undo step behind.
    pub fn end_bulk(&mut self) -> KernelResult<Vec<VersionRow>> {
        let bulk = self.bulk.take().ok_or(KernelError::NoBulkOpen)?;
        self.backend.resume_commit();

        if bulk.pending.is_empty() {
            log::debug!("bulk transaction {} was empty", bulk.generation);
            self.rollback(bulk.checkpoint);
            return Ok(Vec::new());
        }
        if let Err(e) = self.backend.commit() {
            self.rollback(bulk.checkpoint);
            return Err(e.into());
        }
        log::debug!(
            "bulk transaction {} committed ({} notifications)",
            bulk.generation,
            bulk.pending.len()
        );

        let mut written = Vec::new();
        for (event, row) in bulk.pending {
            self.notify(event, &row);
            if matches!(event, KernelEvent::Saved | KernelEvent::Deleted) {
                written.push(row);
            }
        }
        Ok(written)
    }

    /// Discard the open bulk transaction.
    pub fn abort_bulk(&mut self) -> KernelResult<()> {
        if self.bulk.is_none() {
            return Err(KernelError::NoBulkOpen);
        }
        self.discard_bulk();
        Ok(())
    }

    pub fn is_bulk_open(&self) -> bool {
        self.bulk.is_some()
    }

    fn discard_bulk(&mut self) {
        if let Some(bulk) = self.bulk.take() {
            log::warn!(
                "Discarding bulk transaction {} ({} pending notifications)",
                bulk.generation,
                bulk.pending.len()
            );
            self.backend.resume_commit();
            self.rollback(bulk.checkpoint);
        }
    }

    /// Step back one generation: hide the generation being left and show the
    /// one that becomes active.
    pub fn undo(&mut self) -> KernelResult<HistoryStep> {
        self.ensure_no_bulk()?;
        let left = self.undo_log.active_generation();
        let stepped = self.transaction(|kernel| {
            let target = kernel
                .undo_log
                .undo(&kernel.backend)?
                .ok_or(KernelError::UndoExhausted)?;
            kernel.store.mark_generation_visibility(&kernel.backend, left, false)?;
            kernel.store.mark_generation_visibility(&kernel.backend, target, true)?;
            Ok(target)
        });

        match stepped {
            Ok(target) => {
                self.notify_generation(left, KernelEvent::Hidden);
                self.notify_generation(target, KernelEvent::Shown);
                Ok(HistoryStep::Moved {
                    from: left,
                    to: target,
                })
            }
            Err(KernelError::UndoExhausted) => {
                log::info!("Nothing to undo");
                Ok(HistoryStep::Exhausted)
            }
            Err(e) => Err(e),
        }
    }

    /// Step forward one generation and show it.
    pub fn redo(&mut self) -> KernelResult<HistoryStep> {
        self.ensure_no_bulk()?;
        let left = self.undo_log.active_generation();
        let stepped = self.transaction(|kernel| {
            let target = kernel
                .undo_log
                .redo(&kernel.backend)?
                .ok_or(KernelError::RedoExhausted)?;
            kernel.store.mark_generation_visibility(&kernel.backend, target, true)?;
            Ok(target)
        });

        match stepped {
            Ok(target) => {
                self.notify_generation(target, KernelEvent::Shown);
                Ok(HistoryStep::Moved {
                    from: left,
                    to: target,
                })
            }
            Err(KernelError::RedoExhausted) => {
                log::info!("Nothing to redo");
                Ok(HistoryStep::Exhausted)
            }
            Err(e) => Err(e),
        }
    }

    pub fn can_undo(&self) -> KernelResult<bool> {
        Ok(self.undo_log.can_undo(&self.backend)?)
    }

    pub fn can_redo(&self) -> KernelResult<bool> {
        Ok(self.undo_log.can_redo(&self.backend)?)
    }

    /// Forget every undo step. Stored versions are kept.
    pub fn clear_history(&mut self) -> KernelResult<()> {
        self.ensure_no_bulk()?;
        self.transaction(|kernel| Ok(kernel.undo_log.clear_history(&kernel.backend)?))?;
        log::info!("Undo history cleared at generation {}", self.max_generation());
        Ok(())
    }

    fn ensure_no_bulk(&self) -> KernelResult<()> {
        if self.bulk.is_some() {
            return Err(KernelError::BulkAlreadyOpen);
        }
        Ok(())
    }

    /// Bring back a version hidden with [`Kernel::hide_entity`].
    ///
    /// Targets the newest version reachable from the active generation,
    /// skipping abandoned generations. Showing an already visible version
    /// changes nothing and fires nothing. Deleted and unknown entities fail
    /// with `UnknownEntity`.
    pub fn show_entity(&mut self, entity_id: EntityId) -> KernelResult<VersionRow> {
        let mut row = self
            .latest_reachable(entity_id)?
            .ok_or(KernelError::UnknownEntity(entity_id))?;
        if row.is_tombstone() {
            return Err(KernelError::UnknownEntity(entity_id));
        }
        if row.visible {
            return Ok(row);
        }
        self.set_version_visibility(&mut row, true)?;
        self.emit(KernelEvent::Shown, &row);
        Ok(row)
    }

    /// Hide the current version of one entity, independent of the undo line.
    ///
    /// Only a live version can be hidden: deleted, hidden and unknown
    /// entities fail with `UnknownEntity`.
    pub fn hide_entity(&mut self, entity_id: EntityId) -> KernelResult<VersionRow> {
        let mut row = self
            .get_entity(entity_id)?
            .filter(|row| !row.is_tombstone())
            .ok_or(KernelError::UnknownEntity(entity_id))?;
        self.set_version_visibility(&mut row, false)?;
        self.emit(KernelEvent::Hidden, &row);
        Ok(row)
    }

    fn latest_reachable(&self, entity_id: EntityId) -> KernelResult<Option<VersionRow>> {
        let rows = self
            .store
            .reachable_history(&self.backend, entity_id, self.active_generation())?;
        for row in rows {
            if !self.undo_log.is_abandoned(&self.backend, row.generation)? {
                return Ok(Some(row));
            }
        }
        Ok(None)
    }

    fn set_version_visibility(&mut self, row: &mut VersionRow, visible: bool) -> KernelResult<()> {
        let version_id = row.version_id;
        let entity_id = row.entity_id;
        self.transaction(|kernel| {
            if kernel
                .store
                .mark_version_visibility(&kernel.backend, version_id, visible)?
            {
                Ok(())
            } else {
                Err(KernelError::UnknownEntity(entity_id))
            }
        })?;
        row.visible = visible;
        Ok(())
    }

    /// Current version of an entity, which may be a tombstone.
    pub fn get_entity(&self, entity_id: EntityId) -> KernelResult<Option<VersionRow>> {
        Ok(self
            .store
            .get_current(&self.backend, entity_id, self.active_generation())?)
    }

    /// Current value of an entity decoded into its domain type. `None` for
    /// unknown, hidden or deleted entities.
    pub fn load_entity(&self, entity_id: EntityId) -> KernelResult<Option<Entity>> {
        match self.get_entity(entity_id)? {
            Some(row) if !row.is_tombstone() => Ok(Some(row.decode()?)),
            _ => Ok(None),
        }
    }

    /// Complete stored timeline of one entity.
    pub fn history(&self, entity_id: EntityId) -> KernelResult<Vec<VersionRow>> {
        Ok(self.store.get_history(&self.backend, entity_id)?)
    }

    /// Current rows of every live entity of one kind.
    pub fn entities_of_kind(&self, kind: EntityKind) -> KernelResult<Vec<VersionRow>> {
        Ok(self
            .store
            .current_of_kind(&self.backend, kind, self.active_generation())?)
    }

    /// Current live geometry whose bounding box touches `area`.
    pub fn entities_in(&self, area: Rect) -> KernelResult<Vec<VersionRow>> {
        Ok(self
            .store
            .intersecting(&self.backend, area, self.active_generation())?)
    }

    /// Every version written while `style_id` was active.
    pub fn versions_with_style(&self, style_id: EntityId) -> KernelResult<Vec<VersionRow>> {
        Ok(self
            .store
            .get_by_style(&self.backend, style_id)?
            .into_values()
            .collect())
    }

    fn find_current<T>(
        &self,
        kind: EntityKind,
        pick: impl Fn(Entity) -> Option<T>,
    ) -> KernelResult<Option<T>> {
        for row in self.entities_of_kind(kind)? {
            if let Some(found) = pick(row.decode()?) {
                return Ok(Some(found));
            }
        }
        Ok(None)
    }

    /// Style recorded on new versions of styled entities.
    pub fn active_style(&self) -> Option<EntityId> {
        self.active_style
    }

    /// Make a stored style active. Fails with `UnknownEntity` unless
    /// `style_id` is a live style.
    pub fn set_active_style(&mut self, style_id: EntityId) -> KernelResult<()> {
        match self.load_entity(style_id)? {
            Some(Entity::Style(_)) => {
                self.active_style = Some(style_id);
                Ok(())
            }
            _ => Err(KernelError::UnknownEntity(style_id)),
        }
    }

    /// All live styles.
    pub fn styles(&self) -> KernelResult<Vec<Style>> {
        self.find_all(EntityKind::Style, |entity| match entity {
            Entity::Style(style) => Some(style),
            _ => None,
        })
    }

    /// All live layers.
    pub fn layers(&self) -> KernelResult<Vec<Layer>> {
        self.find_all(EntityKind::Layer, |entity| match entity {
            Entity::Layer(layer) => Some(layer),
            _ => None,
        })
    }

    fn find_all<T>(&self, kind: EntityKind, pick: impl Fn(Entity) -> Option<T>) -> KernelResult<Vec<T>> {
        let mut found = Vec::new();
        for row in self.entities_of_kind(kind)? {
            found.extend(pick(row.decode()?));
        }
        Ok(found)
    }

    /// The drawing's settings, created and saved on first request.
    pub fn settings(&mut self) -> KernelResult<Settings> {
        let name = self.config.settings_name.clone();
        let existing = self.find_current(EntityKind::Settings, |entity| match entity {
            Entity::Settings(settings) if settings.name == name => Some(settings),
            _ => None,
        })?;
        if let Some(settings) = existing {
            return Ok(settings);
        }

        let mut settings = Settings::new(name);
        settings.layer_name = self.config.main_layer.clone();
        let row = self.save(&mut Entity::from(settings.clone()))?;
        settings.id = Some(row.entity_id);
        Ok(settings)
    }

    /// The layer named by the settings, falling back to the main layer.
    /// The main layer is created when neither exists.
    pub fn active_layer(&mut self) -> KernelResult<Layer> {
        let wanted = self.settings()?.layer_name;
        let main = self.config.main_layer.clone();

        for name in [&wanted, &main] {
            let found = self.find_current(EntityKind::Layer, |entity| match entity {
                Entity::Layer(layer) if &layer.name == name => Some(layer),
                _ => None,
            })?;
            if let Some(layer) = found {
                return Ok(layer);
            }
        }

        log::info!("Layer {} not found, creating {}", wanted, main);
        let mut layer = Layer::new(main);
        let row = self.save(&mut Entity::from(layer.clone()))?;
        layer.id = Some(row.entity_id);
        Ok(layer)
    }

    /// Register an observer for every event.
    pub fn subscribe(&mut self, observer: impl KernelObserver + 'static) -> ObserverId {
        self.observers.register(None, Box::new(observer))
    }

    /// Remove an observer. Returns false if it was not registered.
    pub fn unsubscribe(&mut self, id: ObserverId) -> bool {
        self.observers.remove(id)
    }

    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }

    pub fn on_saved(
        &mut self,
        handler: impl FnMut(&Kernel, &VersionRow) -> HandlerResult + 'static,
    ) -> ObserverId {
        self.on_event(KernelEvent::Saved, handler)
    }

    pub fn on_deleted(
        &mut self,
        handler: impl FnMut(&Kernel, &VersionRow) -> HandlerResult + 'static,
    ) -> ObserverId {
        self.on_event(KernelEvent::Deleted, handler)
    }

    pub fn on_shown(
        &mut self,
        handler: impl FnMut(&Kernel, &VersionRow) -> HandlerResult + 'static,
    ) -> ObserverId {
        self.on_event(KernelEvent::Shown, handler)
    }

    pub fn on_hidden(
        &mut self,
        handler: impl FnMut(&Kernel, &VersionRow) -> HandlerResult + 'static,
    ) -> ObserverId {
        self.on_event(KernelEvent::Hidden, handler)
    }

    fn on_event(
        &mut self,
        event: KernelEvent,
        mut handler: impl FnMut(&Kernel, &VersionRow) -> HandlerResult + 'static,
    ) -> ObserverId {
        let observer = move |kernel: &Kernel, _: KernelEvent, row: &VersionRow| handler(kernel, row);
        self.observers.register(Some(event), Box::new(observer))
    }

    /// Deliver now, or hold until the open bulk transaction commits.
    fn emit(&mut self, event: KernelEvent, row: &VersionRow) {
        match self.bulk.as_mut() {
            Some(bulk) => bulk.pending.push((event, row.clone())),
            None => self.notify(event, row),
        }
    }

    fn notify(&mut self, event: KernelEvent, row: &VersionRow) {
        // Handlers only see `&Kernel`, so they cannot register while dispatching.
        let mut observers = std::mem::take(&mut self.observers);
        observers.dispatch(self, event, row);
        self.observers = observers;
    }

    fn notify_generation(&mut self, generation: Generation, event: KernelEvent) {
        if self.observers.is_empty() {
            return;
        }
        match self.store.get_by_generation(&self.backend, generation) {
            Ok(rows) => {
                for row in &rows {
                    self.notify(event, row);
                }
            }
            Err(e) => log::warn!(
                "Could not load generation {} for {:?} notifications: {}",
                generation,
                event,
                e
            ),
        }
    }

    /// Run `op` inside a backend transaction.
    ///
    /// On failure everything `op` wrote is rolled back and the undo pointer
    /// is restored. Inside a bulk transaction a failure discards the whole
    /// batch.
    fn transaction<T>(&mut self, op: impl FnOnce(&mut Self) -> KernelResult<T>) -> KernelResult<T> {
        let checkpoint = self.undo_log.checkpoint();
        self.backend.begin()?;

        let result = op(self).and_then(|value| {
            self.backend.commit()?;
            Ok(value)
        });

        if let Err(e) = &result {
            if !e.is_boundary() {
                log::warn!("Rolling back: {}", e);
            }
            if self.bulk.is_some() && !e.is_boundary() {
                self.discard_bulk();
            } else {
                self.rollback(checkpoint);
            }
        }
        result
    }

    fn rollback(&mut self, checkpoint: UndoCheckpoint) {
        if let Err(e) = self.backend.rollback() {
            log::error!("Rollback failed: {}", e);
        }
        self.undo_log.restore(checkpoint);
    }
}
