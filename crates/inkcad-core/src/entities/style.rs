//! Style entity.

use super::{EntityId, EntityKind, EntityTrait};
use kurbo::Rect;
use peniko::Color;
use serde::{Deserialize, Serialize};

/// Serializable color representation (RGBA8).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializableColor {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl SerializableColor {
    pub fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    pub fn black() -> Self {
        Self::new(0, 0, 0, 255)
    }

    pub fn white() -> Self {
        Self::new(255, 255, 255, 255)
    }
}

impl Default for SerializableColor {
    fn default() -> Self {
        Self::black()
    }
}

impl From<Color> for SerializableColor {
    fn from(color: Color) -> Self {
        let rgba = color.to_rgba8();
        Self {
            r: rgba.r,
            g: rgba.g,
            b: rgba.b,
            a: rgba.a,
        }
    }
}

impl From<SerializableColor> for Color {
    fn from(color: SerializableColor) -> Self {
        Color::from_rgba8(color.r, color.g, color.b, color.a)
    }
}

fn default_line_width() -> f64 {
    1.0
}

/// Named drawing style referenced by the versions written while it is active.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Style {
    #[serde(skip)]
    pub(crate) id: Option<EntityId>,
    pub name: String,
    #[serde(default)]
    pub color: SerializableColor,
    #[serde(default = "default_line_width")]
    pub line_width: f64,
}

impl Style {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
            color: SerializableColor::default(),
            line_width: default_line_width(),
        }
    }

    pub fn with_color(mut self, color: impl Into<SerializableColor>) -> Self {
        self.color = color.into();
        self
    }

    pub fn with_line_width(mut self, width: f64) -> Self {
        self.line_width = width;
        self
    }

    /// Get the color as a peniko Color.
    pub fn color(&self) -> Color {
        self.color.into()
    }
}

impl EntityTrait for Style {
    fn id(&self) -> Option<EntityId> {
        self.id
    }

    fn kind(&self) -> EntityKind {
        EntityKind::Style
    }

    fn bounds(&self) -> Rect {
        Rect::ZERO
    }

    fn uses_style(&self) -> bool {
        false
    }
}
