//! Route-aligned vehicle bearings.
//!
//! A vehicle is drawn pointing along the route segment it is on rather than
//! along its raw telemetry heading, which is often missing or noisy. Finding
//! that segment is a spatial query, so results are kept in a side table and
//! reused for a few frames while the vehicle stays put.

use std::collections::HashMap;

use geo::Coord;
use livetrack_transit::spatial::geometry::{compass_bearing, planar_distance};
use livetrack_transit::{NetworkLookup, TripIdentifier};

use crate::config::BearingConfig;
use crate::store::VehicleSet;
use crate::vehicle::TrackedVehicle;

#[derive(Clone, Copy, Debug)]
struct BearingCacheEntry {
    bearing: Option<f64>,
    /// Frames served from the cache since the last computation
    frame_count: u32,
    last_position: Coord,
}

/// Per-vehicle bearing cache in front of a [`NetworkLookup`]
#[derive(Debug)]
pub struct BearingResolver {
    config: BearingConfig,
    cache: HashMap<TripIdentifier, BearingCacheEntry>,
    recomputations: u64,
}

impl BearingResolver {
    pub fn new(config: BearingConfig) -> Self {
        Self {
            config,
            cache: HashMap::new(),
            recomputations: 0,
        }
    }

    /// Bearing of the route segment nearest the vehicle, or `None` when the
    /// vehicle's route is unknown to the network.
    ///
    /// The cached value is reused until the vehicle moves more than the
    /// configured epsilon or `cache_frames` frames have passed.
    pub fn resolve(
        &mut self,
        tracked: &TrackedVehicle,
        position: Coord,
        network: &dyn NetworkLookup,
    ) -> Option<f64> {
        let trip_id = &tracked.vehicle.trip_id;

        if let Some(entry) = self.cache.get_mut(trip_id) {
            let moved = planar_distance(entry.last_position, position) > self.config.movement_epsilon_deg;
            let stale = entry.frame_count + 1 >= self.config.cache_frames;
            if !moved && !stale {
                entry.frame_count += 1;
                return entry.bearing;
            }
        }

        let bearing = network
            .nearest_route_segment(
                &tracked.vehicle.route_id,
                tracked.vehicle.class,
                &tracked.vehicle.line_name,
                position,
            )
            .and_then(|(start, end)| compass_bearing(start, end));
        self.recomputations += 1;

        self.cache.insert(
            trip_id.clone(),
            BearingCacheEntry {
                bearing,
                frame_count: 0,
                last_position: position,
            },
        );

        bearing
    }

    /// Drop entries for vehicles no longer tracked
    pub fn prune(&mut self, set: &VehicleSet) {
        self.cache.retain(|trip_id, _| set.contains(trip_id));
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    /// Spatial lookups performed so far
    pub fn recomputations(&self) -> u64 {
        self.recomputations
    }
}
