//! Core traits for transit entities.
//!
//! These traits define the public interface the tracker reads through.
//! The in-memory [`StaticNetwork`](crate::provider::StaticNetwork) is the
//! production implementation.

use std::sync::Arc;

use geo::{Coord, LineString, Point};

use crate::identifiers::*;
use crate::models::types::*;

// ============================================================================
// Core Entity Traits
// ============================================================================

/// A named line with one authoritative display geometry
pub trait Route: Send + Sync {
    fn id(&self) -> &RouteIdentifier;

    fn vehicle_class(&self) -> VehicleClass;

    /// Short name (e.g., "96", "Sandringham")
    fn short_name(&self) -> &str;

    /// Long name (e.g., "East Brunswick - St Kilda Beach")
    fn long_name(&self) -> &str;

    fn color(&self) -> Rgb;

    fn text_color(&self) -> Option<Rgb> {
        None
    }

    /// Display geometry, already offset for shared corridors
    fn geometry(&self) -> &LineString;

    /// Perpendicular display offset in meters (0 = centered)
    fn offset_meters(&self) -> f64 {
        0.0
    }

    /// Whether a vehicle reporting this route id, or this line name within
    /// the same class, runs on this route
    fn serves(&self, route_id: &RouteIdentifier, class: VehicleClass, line_name: &str) -> bool;
}

/// A stop or platform
pub trait TransitStop: Send + Sync {
    fn id(&self) -> &StopIdentifier;
    fn name(&self) -> &str;
    fn location(&self) -> Point;
}

/// Capabilities every tracked vehicle exposes, whatever its class
pub trait TransitVehicle {
    fn trip_id(&self) -> &TripIdentifier;
    fn vehicle_class(&self) -> VehicleClass;
    fn color(&self) -> Rgb;
    fn line_name(&self) -> &str;

    /// Heading in compass degrees from telemetry, or derived from movement
    fn telemetry_bearing(&self) -> f64;
}

// ============================================================================
// Network Trait
// ============================================================================

/// Read-only view of the static network
pub trait NetworkLookup: Send + Sync {
    fn get_route(&self, id: &RouteIdentifier) -> Option<Arc<dyn Route>>;
    fn get_stop(&self, id: &StopIdentifier) -> Option<Arc<dyn TransitStop>>;

    /// Direction of the segment, across all routes serving this vehicle,
    /// whose start point is nearest `position`. Planar comparison.
    ///
    /// Returns the segment's `(start, end)`, or `None` when no route matches.
    fn nearest_route_segment(
        &self,
        route_id: &RouteIdentifier,
        class: VehicleClass,
        line_name: &str,
        position: Coord,
    ) -> Option<(Coord, Coord)>;
}
