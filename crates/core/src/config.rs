//! Tracker configuration.
//!
//! Every field has a default, so a JSON document only needs the keys it
//! overrides:
//!
//! ```
//! use livetrack_core::config::TrackerConfig;
//!
//! let config = TrackerConfig::from_json_str(r#"{ "refresh_interval_ms": 10000 }"#).unwrap();
//! assert_eq!(config.refresh_interval_ms, 10_000);
//! assert_eq!(config.animation_duration_ms, 5_000);
//! ```

use std::time::Duration;

use livetrack_transit::{ServiceBounds, VehicleClass};
use serde::{Deserialize, Serialize};

use crate::error::{Result, TrackerError};

/// One value per vehicle class
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClassTable<T> {
    pub metro: T,
    pub regional: T,
    pub tram: T,
    pub bus: T,
}

impl<T> ClassTable<T> {
    pub fn get(&self, class: VehicleClass) -> &T {
        match class {
            VehicleClass::Metro => &self.metro,
            VehicleClass::Regional => &self.regional,
            VehicleClass::Tram => &self.tram,
            VehicleClass::Bus => &self.bus,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (VehicleClass, &T)> {
        VehicleClass::ALL.into_iter().map(move |class| (class, self.get(class)))
    }
}

/// Update a class every N refresh cycles
pub type RefreshCadence = ClassTable<u32>;

/// Minimum zoom at which a class is drawn; `None` draws at every zoom
pub type LodThresholds = ClassTable<Option<f64>>;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct FootprintSize {
    /// Along the direction of travel, meters at scale 1
    pub length_m: f64,
    pub width_m: f64,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScalePoint {
    pub zoom: f64,
    pub scale: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BearingConfig {
    /// Frames a cached bearing stays valid for a stationary vehicle
    pub cache_frames: u32,
    /// Movement (degrees) that invalidates a cached bearing
    pub movement_epsilon_deg: f64,
    /// Added to every rendered bearing, to match the footprint artwork
    pub offset_deg: f64,
}

impl Default for BearingConfig {
    fn default() -> Self {
        Self {
            cache_frames: 10,
            movement_epsilon_deg: 1e-6,
            offset_deg: 0.0,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OffsetConfig {
    /// Spacing between parallel lines on a shared corridor
    pub base_offset_m: f64,
    /// Classes whose routes may be displaced
    pub eligible_classes: Vec<VehicleClass>,
    /// Resolved offsets smaller than this leave the route untouched
    pub negligible_m: f64,
    /// Decimal places kept in segment signatures
    pub signature_precision: u32,
    /// Duplicate-point tolerance applied before offsetting
    pub clean_epsilon_deg: f64,
}

impl Default for OffsetConfig {
    fn default() -> Self {
        Self {
            base_offset_m: 8.0,
            eligible_classes: vec![VehicleClass::Metro, VehicleClass::Tram],
            negligible_m: 0.1,
            signature_precision: 5,
            clean_epsilon_deg: livetrack_transit::spatial::geometry::DUPLICATE_EPSILON_DEG,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    pub refresh_interval_ms: u64,
    pub animation_duration_ms: u64,
    pub frame_interval_ms: u64,
    pub refresh_cadence: RefreshCadence,
    pub bearing: BearingConfig,
    pub offsets: OffsetConfig,
    pub lod: LodThresholds,
    /// Zoom to footprint scale control points, ascending by zoom
    pub scale_curve: Vec<ScalePoint>,
    pub footprints: ClassTable<FootprintSize>,
    /// Fraction by which the visible area is grown on every side
    pub viewport_padding: f64,
    pub service_bounds: ServiceBounds,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            refresh_interval_ms: 5_000,
            animation_duration_ms: 5_000,
            frame_interval_ms: 16,
            refresh_cadence: ClassTable {
                metro: 1,
                regional: 1,
                tram: 2,
                bus: 3,
            },
            bearing: BearingConfig::default(),
            offsets: OffsetConfig::default(),
            lod: ClassTable {
                metro: None,
                regional: Some(10.0),
                tram: Some(12.0),
                bus: Some(14.0),
            },
            scale_curve: vec![
                ScalePoint { zoom: 10.0, scale: 6.0 },
                ScalePoint { zoom: 13.0, scale: 2.5 },
                ScalePoint { zoom: 16.0, scale: 1.0 },
            ],
            footprints: ClassTable {
                metro: FootprintSize { length_m: 40.0, width_m: 8.0 },
                regional: FootprintSize { length_m: 45.0, width_m: 8.0 },
                tram: FootprintSize { length_m: 30.0, width_m: 6.0 },
                bus: FootprintSize { length_m: 14.0, width_m: 5.0 },
            },
            viewport_padding: 0.1,
            service_bounds: ServiceBounds::VICTORIA,
        }
    }
}

impl TrackerConfig {
    /// Parse and validate a JSON configuration document
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_interval_ms)
    }

    pub fn animation_duration(&self) -> Duration {
        Duration::from_millis(self.animation_duration_ms)
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.refresh_interval_ms == 0 || self.frame_interval_ms == 0 {
            return Err(TrackerError::InvalidConfig(
                "refresh and frame intervals must be positive".to_owned(),
            ));
        }

        if let Some((class, _)) = self.refresh_cadence.iter().find(|(_, every)| **every == 0) {
            return Err(TrackerError::InvalidConfig(format!(
                "refresh cadence for {class} must be at least 1"
            )));
        }

        if self.scale_curve.is_empty() {
            return Err(TrackerError::InvalidConfig("scale curve is empty".to_owned()));
        }

        if self.scale_curve.windows(2).any(|w| w[0].zoom >= w[1].zoom) {
            return Err(TrackerError::InvalidConfig(
                "scale curve zoom levels must be strictly ascending".to_owned(),
            ));
        }

        if self.scale_curve.iter().any(|p| !(p.scale > 0.0) || !p.zoom.is_finite()) {
            return Err(TrackerError::InvalidConfig(
                "scale curve points must have finite zoom and positive scale".to_owned(),
            ));
        }

        if let Some((class, _)) = self
            .footprints
            .iter()
            .find(|(_, size)| !(size.length_m > 0.0) || !(size.width_m > 0.0))
        {
            return Err(TrackerError::InvalidConfig(format!(
                "footprint for {class} must have positive length and width"
            )));
        }

        if !(self.offsets.base_offset_m >= 0.0) || self.offsets.signature_precision > 12 {
            return Err(TrackerError::InvalidConfig(
                "offset spacing must be non-negative and precision at most 12".to_owned(),
            ));
        }

        if self.service_bounds.is_inverted() {
            return Err(TrackerError::InvalidConfig(
                "service bounds are inverted".to_owned(),
            ));
        }

        Ok(())
    }
}
