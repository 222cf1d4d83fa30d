//! Drawing settings singleton.

use super::{EntityId, EntityKind, EntityTrait};
use kurbo::Rect;
use serde::{Deserialize, Serialize};

/// Default settings entity name.
pub const MAIN_SETTINGS: &str = "MAIN_SETTING";

/// Default layer name.
pub const MAIN_LAYER: &str = "MAIN_LAYER";

fn default_layer_name() -> String {
    MAIN_LAYER.to_string()
}

/// Per-drawing settings persisted like any other entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(skip)]
    pub(crate) id: Option<EntityId>,
    pub name: String,
    /// Name of the layer new entities are drawn on.
    #[serde(default = "default_layer_name")]
    pub layer_name: String,
}

impl Settings {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
            layer_name: default_layer_name(),
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self::new(MAIN_SETTINGS)
    }
}

impl EntityTrait for Settings {
    fn id(&self) -> Option<EntityId> {
        self.id
    }

    fn kind(&self) -> EntityKind {
        EntityKind::Settings
    }

    fn bounds(&self) -> Rect {
        Rect::ZERO
    }

    fn uses_style(&self) -> bool {
        false
    }
}
