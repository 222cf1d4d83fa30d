//! Segment entity.

use super::{EntityId, EntityKind, EntityTrait};
use kurbo::{Line as KurboLine, Point, Rect};
use serde::{Deserialize, Serialize};

/// A straight segment between two endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    #[serde(skip)]
    pub(crate) id: Option<EntityId>,
    /// Start point.
    pub start: Point,
    /// End point.
    pub end: Point,
}

impl Segment {
    /// Create a new, not yet saved segment.
    pub fn new(start: Point, end: Point) -> Self {
        Self {
            id: None,
            start,
            end,
        }
    }

    /// Both endpoints, start first.
    pub fn endpoints(&self) -> (Point, Point) {
        (self.start, self.end)
    }

    /// Get the length of the segment.
    pub fn length(&self) -> f64 {
        (self.end - self.start).hypot()
    }

    /// Get the midpoint of the segment.
    pub fn midpoint(&self) -> Point {
        self.start.midpoint(self.end)
    }

    /// Get as a kurbo Line.
    pub fn as_kurbo(&self) -> KurboLine {
        KurboLine::new(self.start, self.end)
    }
}

impl EntityTrait for Segment {
    fn id(&self) -> Option<EntityId> {
        self.id
    }

    fn kind(&self) -> EntityKind {
        EntityKind::Segment
    }

    fn bounds(&self) -> Rect {
        Rect::from_points(self.start, self.end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounds_normalized() {
        let seg = Segment::new(Point::new(10.0, 5.0), Point::new(-2.0, 8.0));
        let b = seg.bounds();
        assert!((b.x0 + 2.0).abs() < f64::EPSILON);
        assert!((b.y0 - 5.0).abs() < f64::EPSILON);
        assert!((b.x1 - 10.0).abs() < f64::EPSILON);
        assert!((b.y1 - 8.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_length_and_midpoint() {
        let seg = Segment::new(Point::new(0.0, 0.0), Point::new(6.0, 8.0));
        assert!((seg.length() - 10.0).abs() < 1e-9);
        assert_eq!(seg.midpoint(), Point::new(3.0, 4.0));
    }
}
