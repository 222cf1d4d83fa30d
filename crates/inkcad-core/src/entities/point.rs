//! Point entity.

use super::{EntityId, EntityKind, EntityTrait};
use kurbo::{Point as KurboPoint, Rect};
use serde::{Deserialize, Serialize};

/// A single point in drawing coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Point {
    #[serde(skip)]
    pub(crate) id: Option<EntityId>,
    pub x: f64,
    pub y: f64,
}

impl Point {
    /// Create a new, not yet saved point.
    pub fn new(x: f64, y: f64) -> Self {
        Self { id: None, x, y }
    }

    /// Get the position as a kurbo Point.
    pub fn position(&self) -> KurboPoint {
        KurboPoint::new(self.x, self.y)
    }

    /// Distance to another point.
    pub fn distance(&self, other: &Point) -> f64 {
        self.position().distance(other.position())
    }
}

impl From<KurboPoint> for Point {
    fn from(p: KurboPoint) -> Self {
        Self::new(p.x, p.y)
    }
}

impl EntityTrait for Point {
    fn id(&self) -> Option<EntityId> {
        self.id
    }

    fn kind(&self) -> EntityKind {
        EntityKind::Point
    }

    fn bounds(&self) -> Rect {
        Rect::from_points(self.position(), self.position())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_point_bounds_are_degenerate() {
        let p = Point::new(3.0, -2.0);
        let b = p.bounds();
        assert!((b.x0 - 3.0).abs() < f64::EPSILON);
        assert!((b.x1 - 3.0).abs() < f64::EPSILON);
        assert!((b.y0 + 2.0).abs() < f64::EPSILON);
        assert!((b.y1 + 2.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_distance() {
        let a = Point::new(0.0, 0.0);
        let b = Point::new(3.0, 4.0);
        assert!((a.distance(&b) - 5.0).abs() < f64::EPSILON);
    }
}
