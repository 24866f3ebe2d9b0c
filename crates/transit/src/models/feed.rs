//! Normalized shapes of the realtime feed.
//!
//! The wire format is decoded elsewhere; these are the only shapes the
//! tracker consumes.

use chrono::{DateTime, Utc};
use geo::Point;

use crate::identifiers::*;
use crate::models::types::{Occupancy, VehicleClass};

/// One raw position report for a vehicle
#[derive(Clone, Debug, PartialEq)]
pub struct VehicleObservation {
    pub trip_id: TripIdentifier,
    pub vehicle_id: VehicleIdentifier,
    pub route_id: RouteIdentifier,
    /// x = longitude, y = latitude
    pub position: Point,
    /// Compass degrees as reported; `0.0` when the feed has no heading
    pub bearing: f64,
    /// Meters per second
    pub speed: Option<f64>,
    pub timestamp: Option<DateTime<Utc>>,
    pub occupancy: Option<Occupancy>,
}

impl VehicleObservation {
    pub fn new(
        trip_id: impl Into<TripIdentifier>,
        vehicle_id: impl Into<VehicleIdentifier>,
        route_id: impl Into<RouteIdentifier>,
        position: Point,
    ) -> Self {
        Self {
            trip_id: trip_id.into(),
            vehicle_id: vehicle_id.into(),
            route_id: route_id.into(),
            position,
            bearing: 0.0,
            speed: None,
            timestamp: None,
            occupancy: None,
        }
    }

    pub fn with_bearing(mut self, bearing: f64) -> Self {
        self.bearing = bearing;
        self
    }

    /// Decode the raw occupancy code; out-of-range codes are treated as absent
    pub fn with_occupancy_code(mut self, code: Option<u8>) -> Self {
        self.occupancy = code.and_then(Occupancy::from_code);
        self
    }
}

/// Schedule progress of a trip, reported separately from positions
#[derive(Clone, Debug, PartialEq)]
pub struct TripUpdate {
    pub trip_id: TripIdentifier,
    pub next_stop_id: Option<StopIdentifier>,
    pub next_stop_arrival: Option<DateTime<Utc>>,
    pub delay_seconds: Option<i32>,
}

impl TripUpdate {
    /// Build from the feed's epoch-second arrival field
    pub fn from_epoch(
        trip_id: impl Into<TripIdentifier>,
        next_stop_id: Option<StopIdentifier>,
        arrival_epoch: Option<i64>,
        delay_seconds: Option<i32>,
    ) -> Self {
        Self {
            trip_id: trip_id.into(),
            next_stop_id,
            next_stop_arrival: arrival_epoch.and_then(|secs| DateTime::from_timestamp(secs, 0)),
            delay_seconds,
        }
    }
}

/// One fetch of upstream vehicle positions for a single vehicle class
#[derive(Clone, Debug)]
pub struct FeedSnapshot {
    pub class: VehicleClass,
    pub observations: Vec<VehicleObservation>,
    pub trip_updates: Vec<TripUpdate>,
}

impl FeedSnapshot {
    pub fn new(class: VehicleClass, observations: Vec<VehicleObservation>) -> Self {
        Self {
            class,
            observations,
            trip_updates: Vec::new(),
        }
    }

    pub fn with_trip_updates(mut self, trip_updates: Vec<TripUpdate>) -> Self {
        self.trip_updates = trip_updates;
        self
    }
}
