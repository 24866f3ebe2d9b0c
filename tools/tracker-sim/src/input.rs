//! JSON inputs: the static network and recorded feed snapshots.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::DateTime;
use geo::{LineString, Point};
use livetrack_transit::{
    FeedSnapshot, Rgb, RouteIdentifier, RouteRow, StaticFeed, StopIdentifier, StopImpl,
    TripUpdate, VehicleClass, VehicleObservation,
};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct StaticFile {
    pub routes: Vec<RouteEntry>,
    #[serde(default)]
    pub stops: Vec<StopEntry>,
    /// Raw shape variants per route id, each a list of `[lon, lat]`
    #[serde(default)]
    pub shapes: HashMap<String, Vec<Vec<[f64; 2]>>>,
    /// Per-class fallback colors as hex
    #[serde(default)]
    pub class_colors: HashMap<VehicleClass, String>,
}

#[derive(Debug, Deserialize)]
pub struct RouteEntry {
    pub id: String,
    pub class: VehicleClass,
    pub short_name: String,
    #[serde(default)]
    pub long_name: String,
    pub color: Option<String>,
    pub text_color: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct StopEntry {
    pub id: String,
    pub name: String,
    pub lat: f64,
    pub lon: f64,
}

#[derive(Debug, Deserialize)]
pub struct SnapshotFile {
    pub class: VehicleClass,
    pub vehicles: Vec<VehicleEntry>,
    #[serde(default)]
    pub trip_updates: Vec<TripUpdateEntry>,
}

#[derive(Debug, Deserialize)]
pub struct VehicleEntry {
    pub trip_id: String,
    pub vehicle_id: String,
    pub route_id: String,
    pub lat: f64,
    pub lon: f64,
    #[serde(default)]
    pub bearing: f64,
    pub speed: Option<f64>,
    /// Epoch seconds
    pub timestamp: Option<i64>,
    pub occupancy: Option<u8>,
}

#[derive(Debug, Deserialize)]
pub struct TripUpdateEntry {
    pub trip_id: String,
    pub next_stop_id: Option<String>,
    /// Epoch seconds
    pub next_stop_arrival: Option<i64>,
    pub delay_seconds: Option<i32>,
}

impl StaticFile {
    pub fn into_feed(self) -> StaticFeed {
        let routes = self
            .routes
            .into_iter()
            .map(|r| RouteRow {
                id: RouteIdentifier::new(r.id),
                class: r.class,
                short_name: r.short_name.into(),
                long_name: r.long_name.into(),
                color: r.color.map(Into::into),
                text_color: r.text_color.map(Into::into),
            })
            .collect();

        let stops = self
            .stops
            .into_iter()
            .map(|s| StopImpl {
                id: StopIdentifier::new(s.id),
                name: s.name.into(),
                location: Point::new(s.lon, s.lat),
            })
            .collect();

        let shapes = self
            .shapes
            .into_iter()
            .map(|(route_id, variants)| {
                let lines = variants
                    .into_iter()
                    .map(|points| LineString::from(points.into_iter().map(|[x, y]| (x, y)).collect::<Vec<_>>()))
                    .collect();
                (RouteIdentifier::new(route_id), lines)
            })
            .collect();

        let class_colors = self
            .class_colors
            .into_iter()
            .filter_map(|(class, hex)| {
                let color = Rgb::from_hex(&hex);
                if color.is_none() {
                    tracing::warn!(%class, hex = %hex, "ignoring malformed class color");
                }
                color.map(|c| (class, c))
            })
            .collect();

        StaticFeed {
            routes,
            stops,
            shapes,
            class_colors,
        }
    }
}

impl SnapshotFile {
    pub fn into_snapshot(self) -> FeedSnapshot {
        let observations = self
            .vehicles
            .into_iter()
            .map(|v| {
                let mut observation = VehicleObservation::new(v.trip_id, v.vehicle_id, v.route_id, Point::new(v.lon, v.lat))
                    .with_bearing(v.bearing)
                    .with_occupancy_code(v.occupancy);
                observation.speed = v.speed;
                observation.timestamp = v.timestamp.and_then(|secs| DateTime::from_timestamp(secs, 0));
                observation
            })
            .collect();

        let trip_updates = self
            .trip_updates
            .into_iter()
            .map(|u| {
                TripUpdate::from_epoch(
                    u.trip_id,
                    u.next_stop_id.map(StopIdentifier::new),
                    u.next_stop_arrival,
                    u.delay_seconds,
                )
            })
            .collect();

        FeedSnapshot::new(self.class, observations).with_trip_updates(trip_updates)
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("Failed to parse {}", path.display()))
}

pub fn read_static(path: &Path) -> Result<StaticFeed> {
    read_json::<StaticFile>(path).map(StaticFile::into_feed)
}

pub fn read_snapshot(path: &Path) -> Result<FeedSnapshot> {
    read_json::<SnapshotFile>(path).map(SnapshotFile::into_snapshot)
}
