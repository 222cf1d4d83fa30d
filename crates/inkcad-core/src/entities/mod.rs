//! Entity definitions persisted by the kernel.

mod layer;
mod point;
mod segment;
mod settings;
mod style;

pub use layer::Layer;
pub use point::Point;
pub use segment::Segment;
pub use settings::{MAIN_LAYER, MAIN_SETTINGS, Settings};
pub use style::{SerializableColor, Style};

use crate::kernel::{KernelError, KernelResult};
use crate::storage::VersionRow;
use kurbo::Rect;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Stable identifier of a logical drawing entity across its whole history.
pub type EntityId = i64;

/// Semantic type tag stored with every version row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Point,
    Segment,
    Style,
    Layer,
    Settings,
}

impl EntityKind {
    pub const ALL: [EntityKind; 5] = [
        EntityKind::Point,
        EntityKind::Segment,
        EntityKind::Style,
        EntityKind::Layer,
        EntityKind::Settings,
    ];

    /// Tag written to the `kind` column.
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Point => "point",
            EntityKind::Segment => "segment",
            EntityKind::Style => "style",
            EntityKind::Layer => "layer",
            EntityKind::Settings => "settings",
        }
    }

    /// Whether rows of this kind carry a meaningful bounding box.
    pub fn has_geometry(&self) -> bool {
        matches!(self, EntityKind::Point | EntityKind::Segment)
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = KernelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EntityKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| KernelError::UnsupportedEntityKind(s.to_string()))
    }
}

/// Common trait for all entities.
pub trait EntityTrait {
    /// Logical id, `None` until the entity has been saved once.
    fn id(&self) -> Option<EntityId>;

    /// Semantic type of this entity.
    fn kind(&self) -> EntityKind;

    /// Bounding box cached with each saved version.
    fn bounds(&self) -> Rect;

    /// Whether versions of this entity record the active style.
    fn uses_style(&self) -> bool {
        true
    }
}

/// Closed set of entity types the kernel knows how to store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Entity {
    Point(Point),
    Segment(Segment),
    Style(Style),
    Layer(Layer),
    Settings(Settings),
}

impl Entity {
    pub fn id(&self) -> Option<EntityId> {
        match self {
            Entity::Point(e) => e.id(),
            Entity::Segment(e) => e.id(),
            Entity::Style(e) => e.id(),
            Entity::Layer(e) => e.id(),
            Entity::Settings(e) => e.id(),
        }
    }

    pub fn kind(&self) -> EntityKind {
        match self {
            Entity::Point(e) => e.kind(),
            Entity::Segment(e) => e.kind(),
            Entity::Style(e) => e.kind(),
            Entity::Layer(e) => e.kind(),
            Entity::Settings(e) => e.kind(),
        }
    }

    pub fn bounds(&self) -> Rect {
        match self {
            Entity::Point(e) => e.bounds(),
            Entity::Segment(e) => e.bounds(),
            Entity::Style(e) => e.bounds(),
            Entity::Layer(e) => e.bounds(),
            Entity::Settings(e) => e.bounds(),
        }
    }

    pub fn uses_style(&self) -> bool {
        match self {
            Entity::Point(e) => e.uses_style(),
            Entity::Segment(e) => e.uses_style(),
            Entity::Style(e) => e.uses_style(),
            Entity::Layer(e) => e.uses_style(),
            Entity::Settings(e) => e.uses_style(),
        }
    }

    /// Bind this entity to its logical id after the first save.
    pub(crate) fn assign_id(&mut self, id: EntityId) {
        match self {
            Entity::Point(e) => e.id = Some(id),
            Entity::Segment(e) => e.id = Some(id),
            Entity::Style(e) => e.id = Some(id),
            Entity::Layer(e) => e.id = Some(id),
            Entity::Settings(e) => e.id = Some(id),
        }
    }

    /// Serialize the construction data stored in the `payload` column.
    ///
    /// The logical id is not part of the payload; it lives in its own column.
    pub fn to_payload(&self) -> KernelResult<Vec<u8>> {
        let bytes = match self {
            Entity::Point(e) => serde_json::to_vec(e)?,
            Entity::Segment(e) => serde_json::to_vec(e)?,
            Entity::Style(e) => serde_json::to_vec(e)?,
            Entity::Layer(e) => serde_json::to_vec(e)?,
            Entity::Settings(e) => serde_json::to_vec(e)?,
        };
        Ok(bytes)
    }

    /// Rebuild an entity from a stored payload.
    pub fn from_payload(kind: EntityKind, id: EntityId, payload: &[u8]) -> KernelResult<Self> {
        let mut entity = match kind {
            EntityKind::Point => Entity::Point(serde_json::from_slice(payload)?),
            EntityKind::Segment => Entity::Segment(serde_json::from_slice(payload)?),
            EntityKind::Style => Entity::Style(serde_json::from_slice(payload)?),
            EntityKind::Layer => Entity::Layer(serde_json::from_slice(payload)?),
            EntityKind::Settings => Entity::Settings(serde_json::from_slice(payload)?),
        };
        entity.assign_id(id);
        Ok(entity)
    }

    pub fn as_point(&self) -> Option<&Point> {
        match self {
            Entity::Point(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_segment(&self) -> Option<&Segment> {
        match self {
            Entity::Segment(s) => Some(s),
            _ => None,
        }
    }
}

impl VersionRow {
    /// Decode the payload back into the domain entity.
    pub fn decode(&self) -> KernelResult<Entity> {
        Entity::from_payload(self.kind, self.entity_id, &self.payload)
    }
}

impl From<Point> for Entity {
    fn from(value: Point) -> Self {
        Entity::Point(value)
    }
}

impl From<Segment> for Entity {
    fn from(value: Segment) -> Self {
        Entity::Segment(value)
    }
}

impl From<Style> for Entity {
    fn from(value: Style) -> Self {
        Entity::Style(value)
    }
}

impl From<Layer> for Entity {
    fn from(value: Layer) -> Self {
        Entity::Layer(value)
    }
}

impl From<Settings> for Entity {
    fn from(value: Settings) -> Self {
        Entity::Settings(value)
    }
}
