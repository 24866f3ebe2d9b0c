//! Tracked vehicles and their position animations.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use geo::Coord;
use livetrack_transit::spatial::geometry::lerp_coordinate;
use livetrack_transit::{
    Occupancy, Rgb, RouteIdentifier, StopIdentifier, TransitVehicle, TripIdentifier,
    VehicleClass, VehicleIdentifier,
};

/// Ease-in-out quadratic curve over `t` in `[0, 1]`
pub fn ease_in_out_quad(t: f64) -> f64 {
    if t < 0.5 {
        2.0 * t * t
    } else {
        1.0 - (-2.0 * t + 2.0).powi(2) / 2.0
    }
}

/// Motion from one reported position to the next.
///
/// Driven by the frame clock: the position is evaluated on demand rather
/// than stepped by a timer.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Animation {
    pub start: Coord,
    pub target: Coord,
    pub started_at: Instant,
    pub duration: Duration,
}

impl Animation {
    /// Zero-length animation resting at `position`
    pub fn stationary(position: Coord, now: Instant) -> Self {
        Self {
            start: position,
            target: position,
            started_at: now,
            duration: Duration::ZERO,
        }
    }

    pub fn new(start: Coord, target: Coord, started_at: Instant, duration: Duration) -> Self {
        Self {
            start,
            target,
            started_at,
            duration,
        }
    }

    /// Linear progress in `[0, 1]`
    pub fn progress(&self, now: Instant) -> f64 {
        if self.duration.is_zero() {
            return 1.0;
        }

        let elapsed = now.saturating_duration_since(self.started_at);
        (elapsed.as_secs_f64() / self.duration.as_secs_f64()).clamp(0.0, 1.0)
    }

    pub fn position_at(&self, now: Instant) -> Coord {
        let t = self.progress(now);
        if t >= 1.0 {
            return self.target;
        }
        lerp_coordinate(self.start, self.target, ease_in_out_quad(t))
    }

    pub fn is_active(&self, now: Instant) -> bool {
        self.progress(now) < 1.0
    }

    /// Stop where the vehicle currently is
    pub fn cancelled(&self, now: Instant) -> Self {
        Self::stationary(self.position_at(now), now)
    }
}

/// Identity, schedule context and presentation of a vehicle
#[derive(Clone, Debug, PartialEq)]
pub struct Vehicle {
    pub trip_id: TripIdentifier,
    pub vehicle_id: VehicleIdentifier,
    pub route_id: RouteIdentifier,
    pub class: VehicleClass,
    pub line_name: Arc<str>,
    pub color: Rgb,
    /// Compass degrees, from telemetry or derived from movement
    pub bearing: f64,
    pub speed: Option<f64>,
    pub next_stop_id: Option<StopIdentifier>,
    pub next_stop: Option<Arc<str>>,
    pub next_stop_arrival: Option<DateTime<Utc>>,
    pub delay_seconds: Option<i32>,
    pub occupancy: Option<Occupancy>,
    pub observed_at: Option<DateTime<Utc>>,
}

/// A vehicle together with its in-flight animation
#[derive(Clone, Debug, PartialEq)]
pub struct TrackedVehicle {
    pub vehicle: Vehicle,
    pub animation: Animation,
}

impl TrackedVehicle {
    pub fn position_at(&self, now: Instant) -> Coord {
        self.animation.position_at(now)
    }
}

impl TransitVehicle for TrackedVehicle {
    fn trip_id(&self) -> &TripIdentifier {
        &self.vehicle.trip_id
    }

    fn vehicle_class(&self) -> VehicleClass {
        self.vehicle.class
    }

    fn color(&self) -> Rgb {
        self.vehicle.color
    }

    fn line_name(&self) -> &str {
        &self.vehicle.line_name
    }

    fn telemetry_bearing(&self) -> f64 {
        self.vehicle.bearing
    }
}
