//! R-tree nodes for spatial indexing.
//!
//! Wraps network entities with geometric data for efficient spatial queries.
//!
//! ## Two-Stage Filtering
//!
//! Radius queries first filter with the R-tree using Euclidean distance in
//! degrees, then apply the haversine distance to the survivors. Bearing
//! lookups stay planar throughout: they only compare nearby candidates.

use std::sync::Arc;

use geo::{Coord, Line, Point};
use rstar::{PointDistance, RTreeObject, AABB};

use crate::provider::static_provider::{RouteRecord, StopImpl};
use crate::spatial::geometry::closest_point_on_segment;

// ============================================================================
// Stop Spatial Node
// ============================================================================

#[derive(Clone)]
pub struct StopNode {
    pub stop: Arc<StopImpl>,
    point: [f64; 2],
}

impl StopNode {
    pub fn new(location: Point, stop: Arc<StopImpl>) -> Self {
        Self {
            stop,
            point: [location.x(), location.y()],
        }
    }
}

impl RTreeObject for StopNode {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_point(self.point)
    }
}

impl PointDistance for StopNode {
    fn distance_2(&self, point: &[f64; 2]) -> f64 {
        let dx = self.point[0] - point[0];
        let dy = self.point[1] - point[1];
        dx * dx + dy * dy
    }
}

// ============================================================================
// Route Segment Spatial Node
// ============================================================================

#[derive(Clone)]
pub struct RouteSegmentNode {
    pub route: Arc<RouteRecord>,
    pub segment: Line,
    aabb: AABB<[f64; 2]>,
}

impl RouteSegmentNode {
    pub fn new(segment: Line, route: Arc<RouteRecord>) -> Self {
        let start = [segment.start.x, segment.start.y];
        let end = [segment.end.x, segment.end.y];

        Self {
            route,
            segment,
            aabb: AABB::from_corners(start, end),
        }
    }
}

impl RTreeObject for RouteSegmentNode {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.aabb
    }
}

impl PointDistance for RouteSegmentNode {
    fn distance_2(&self, point: &[f64; 2]) -> f64 {
        let p = Coord { x: point[0], y: point[1] };
        let closest = closest_point_on_segment(p, self.segment.start, self.segment.end);
        let dx = p.x - closest.x;
        let dy = p.y - closest.y;

        dx * dx + dy * dy
    }
}

// ============================================================================
// Segment Start Spatial Node
// ============================================================================

/// A route segment keyed by its start point, for nearest-start lookups
#[derive(Clone)]
pub struct SegmentStartNode {
    /// Index of the owning route in the network's route table
    pub route_index: usize,
    pub segment: Line,
}

impl SegmentStartNode {
    pub fn new(route_index: usize, segment: Line) -> Self {
        Self {
            route_index,
            segment,
        }
    }
}

impl RTreeObject for SegmentStartNode {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_point([self.segment.start.x, self.segment.start.y])
    }
}

impl PointDistance for SegmentStartNode {
    fn distance_2(&self, point: &[f64; 2]) -> f64 {
        let dx = self.segment.start.x - point[0];
        let dy = self.segment.start.y - point[1];
        dx * dx + dy * dy
    }
}
