//! Layer entity.

use super::{EntityId, EntityKind, EntityTrait};
use kurbo::Rect;
use serde::{Deserialize, Serialize};

/// A named layer, optionally nested under a parent layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Layer {
    #[serde(skip)]
    pub(crate) id: Option<EntityId>,
    pub name: String,
    /// Logical id of the parent layer.
    #[serde(default)]
    pub parent: Option<EntityId>,
}

impl Layer {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
            parent: None,
        }
    }

    pub fn with_parent(mut self, parent: EntityId) -> Self {
        self.parent = Some(parent);
        self
    }
}

impl EntityTrait for Layer {
    fn id(&self) -> Option<EntityId> {
        self.id
    }

    fn kind(&self) -> EntityKind {
        EntityKind::Layer
    }

    fn bounds(&self) -> Rect {
        Rect::ZERO
    }
}
