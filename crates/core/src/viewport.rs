//! Camera state and viewport culling.

use geo::{Coord, Rect};

/// What the host map engine reports about its camera, once per frame.
///
/// `corners` are the geographic positions of the screen corners. With the
/// camera pitched they form a trapezoid rather than a rectangle.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CameraState {
    pub corners: [Coord; 4],
    pub zoom: f64,
    pub pitch: f64,
}

impl CameraState {
    /// Flat camera looking straight down at `bounds`
    pub fn from_bounds(bounds: Rect, zoom: f64) -> Self {
        let (min, max) = (bounds.min(), bounds.max());
        Self {
            corners: [
                Coord { x: min.x, y: min.y },
                Coord { x: max.x, y: min.y },
                Coord { x: max.x, y: max.y },
                Coord { x: min.x, y: max.y },
            ],
            zoom,
            pitch: 0.0,
        }
    }

    pub fn visible_area(&self, padding: f64) -> VisibleArea {
        VisibleArea::from_corners(&self.corners).padded(padding)
    }
}

/// Axis-aligned geographic box used for culling. Bounds are inclusive.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct VisibleArea {
    min_x: f64,
    min_y: f64,
    max_x: f64,
    max_y: f64,
}

impl VisibleArea {
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    /// Smallest box containing every corner
    pub fn from_corners(corners: &[Coord]) -> Self {
        corners.iter().fold(
            Self::new(f64::INFINITY, f64::INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY),
            |area, c| Self {
                min_x: area.min_x.min(c.x),
                min_y: area.min_y.min(c.y),
                max_x: area.max_x.max(c.x),
                max_y: area.max_y.max(c.y),
            },
        )
    }

    /// Grow by `fraction` of the width and height on every side
    pub fn padded(self, fraction: f64) -> Self {
        let dx = (self.max_x - self.min_x) * fraction;
        let dy = (self.max_y - self.min_y) * fraction;
        Self {
            min_x: self.min_x - dx,
            min_y: self.min_y - dy,
            max_x: self.max_x + dx,
            max_y: self.max_y + dy,
        }
    }

    pub fn contains(&self, c: Coord) -> bool {
        c.x >= self.min_x && c.x <= self.max_x && c.y >= self.min_y && c.y <= self.max_y
    }

    pub fn min(&self) -> Coord {
        Coord { x: self.min_x, y: self.min_y }
    }

    pub fn max(&self) -> Coord {
        Coord { x: self.max_x, y: self.max_y }
    }
}
