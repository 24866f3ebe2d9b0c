//! Per-frame render scheduling.
//!
//! Each frame takes the currently published [`VehicleSet`] and the host's
//! camera, and produces one oriented rectangle per visible vehicle:
//!
//! 1. footprint scale from the zoom level
//! 2. viewport cull against the padded camera bounds
//! 3. per-class zoom LOD
//! 4. route-aligned bearing, falling back to telemetry
//! 5. rotated footprint corners
//!
//! A vehicle whose footprint cannot be built is skipped for that frame.

use std::sync::Arc;
use std::time::Instant;

use geo::{Coord, LineString, Polygon};
use glam::{DVec2, FloatExt};
use livetrack_transit::spatial::geometry::{meters_to_degrees, normalize_bearing};
use livetrack_transit::{
    NetworkLookup, Rgb, RouteIdentifier, TransitVehicle, TripIdentifier, VehicleClass,
    VehicleIdentifier,
};

use crate::bearing::BearingResolver;
use crate::config::{FootprintSize, ScalePoint, TrackerConfig};
use crate::error::{Result, TrackerError};
use crate::store::VehicleSet;
use crate::vehicle::TrackedVehicle;
use crate::viewport::CameraState;

/// Footprint scale at `zoom`, linear between control points and clamped
/// outside them. `curve` must be sorted by zoom.
pub fn scale_at(curve: &[ScalePoint], zoom: f64) -> f64 {
    let (Some(first), Some(last)) = (curve.first(), curve.last()) else {
        return 1.0;
    };

    if zoom <= first.zoom {
        return first.scale;
    }
    if zoom >= last.zoom {
        return last.scale;
    }

    curve
        .windows(2)
        .find(|w| zoom >= w[0].zoom && zoom <= w[1].zoom)
        .map(|w| {
            let t = (zoom - w[0].zoom) / (w[1].zoom - w[0].zoom);
            w[0].scale.lerp(w[1].scale, t)
        })
        .unwrap_or(last.scale)
}

/// Corners of a `size` rectangle centered on `center`, its length along
/// compass `bearing`. Returned as a closed polygon in lon/lat.
pub fn footprint_polygon(center: Coord, bearing: f64, size: FootprintSize, scale: f64) -> Result<Polygon> {
    if !bearing.is_finite() || !center.x.is_finite() || !center.y.is_finite() {
        return Err(TrackerError::Geometry(format!(
            "non-finite footprint input at ({}, {}) bearing {bearing}",
            center.x, center.y
        )));
    }

    // Compass degrees are clockwise from north; glam angles are
    // counter-clockwise from east
    let heading = DVec2::from_angle((90.0 - bearing).to_radians());
    let along = heading * (size.length_m * scale / 2.0);
    let across = heading.perp() * (size.width_m * scale / 2.0);

    let corners = [along + across, -along + across, -along - across, along - across]
        .into_iter()
        .map(|offset| {
            let (d_lon, d_lat) = meters_to_degrees(offset.x, offset.y, center.y);
            Coord { x: center.x + d_lon, y: center.y + d_lat }
        })
        .collect::<Vec<_>>();

    if corners.iter().any(|c| !c.x.is_finite() || !c.y.is_finite()) {
        return Err(TrackerError::Geometry(format!(
            "footprint at ({}, {}) does not project",
            center.x, center.y
        )));
    }

    Ok(Polygon::new(LineString::from(corners), Vec::new()))
}

/// One rendered vehicle, with the metadata needed to inspect it on click
#[derive(Clone, Debug, PartialEq)]
pub struct VehicleFootprint {
    pub trip_id: TripIdentifier,
    pub vehicle_id: VehicleIdentifier,
    pub route_id: RouteIdentifier,
    pub class: VehicleClass,
    pub line_name: Arc<str>,
    pub color: Rgb,
    pub position: Coord,
    /// Telemetry or movement bearing
    pub raw_bearing: f64,
    /// Bearing the footprint is drawn at
    pub bearing: f64,
    pub polygon: Polygon,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub considered: usize,
    pub culled_viewport: usize,
    pub culled_lod: usize,
    pub skipped: usize,
}

/// Everything handed to the host for one frame
#[derive(Clone, Debug, PartialEq)]
pub struct RenderFrame {
    /// Generation of the vehicle set this frame was built from
    pub generation: u64,
    pub zoom: f64,
    pub scale: f64,
    pub footprints: Vec<VehicleFootprint>,
    pub stats: FrameStats,
}

impl RenderFrame {
    pub fn find(&self, trip_id: &TripIdentifier) -> Option<&VehicleFootprint> {
        self.footprints.iter().find(|f| &f.trip_id == trip_id)
    }
}

pub struct RenderScheduler {
    config: TrackerConfig,
    bearings: BearingResolver,
    last_generation: Option<u64>,
}

impl RenderScheduler {
    pub fn new(config: TrackerConfig) -> Self {
        let bearings = BearingResolver::new(config.bearing.clone());
        Self {
            config,
            bearings,
            last_generation: None,
        }
    }

    pub fn bearings(&self) -> &BearingResolver {
        &self.bearings
    }

    pub fn is_lod_visible(&self, class: VehicleClass, zoom: f64) -> bool {
        match *self.config.lod.get(class) {
            Some(threshold) => zoom >= threshold,
            None => true,
        }
    }

    pub fn frame(
        &mut self,
        set: &VehicleSet,
        camera: &CameraState,
        network: &dyn NetworkLookup,
        now: Instant,
    ) -> RenderFrame {
        if self.last_generation != Some(set.generation()) {
            self.bearings.prune(set);
            self.last_generation = Some(set.generation());
        }

        let zoom = camera.zoom;
        let scale = scale_at(&self.config.scale_curve, zoom);
        let area = camera.visible_area(self.config.viewport_padding);

        let mut stats = FrameStats::default();
        let mut footprints = Vec::with_capacity(set.len());

        for tracked in set.iter() {
            stats.considered += 1;

            let position = tracked.position_at(now);
            if !area.contains(position) {
                stats.culled_viewport += 1;
                continue;
            }

            if !self.is_lod_visible(tracked.vehicle_class(), zoom) {
                stats.culled_lod += 1;
                continue;
            }

            match self.footprint(tracked, position, scale, network) {
                Ok(footprint) => footprints.push(footprint),
                Err(err) => {
                    tracing::trace!(trip = %tracked.trip_id(), %err, "skipped vehicle this frame");
                    stats.skipped += 1;
                }
            }
        }

        footprints.sort_by(|a, b| a.trip_id.cmp(&b.trip_id));

        RenderFrame {
            generation: set.generation(),
            zoom,
            scale,
            footprints,
            stats,
        }
    }

    fn footprint(
        &mut self,
        tracked: &TrackedVehicle,
        position: Coord,
        scale: f64,
        network: &dyn NetworkLookup,
    ) -> Result<VehicleFootprint> {
        let raw_bearing = tracked.telemetry_bearing();
        let resolved = self.bearings.resolve(tracked, position, network).unwrap_or(raw_bearing);
        let bearing = normalize_bearing(resolved + self.config.bearing.offset_deg);

        let size = *self.config.footprints.get(tracked.vehicle_class());
        let polygon = footprint_polygon(position, bearing, size, scale)?;

        let vehicle = &tracked.vehicle;
        Ok(VehicleFootprint {
            trip_id: vehicle.trip_id.clone(),
            vehicle_id: vehicle.vehicle_id.clone(),
            route_id: vehicle.route_id.clone(),
            class: vehicle.class,
            line_name: vehicle.line_name.clone(),
            color: vehicle.color,
            position,
            raw_bearing,
            bearing,
            polygon,
        })
    }
}
