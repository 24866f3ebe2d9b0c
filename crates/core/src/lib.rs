//! # livetrack-core
//!
//! The live tracking pipeline: offsets shared track at load time, reconciles
//! feed snapshots into animated vehicles, and builds one frame of oriented
//! vehicle footprints per tick for a host map engine to draw.
//!
//! ```
//! use std::time::Instant;
//!
//! use geo::{LineString, Point, Rect};
//! use livetrack_core::prelude::*;
//!
//! let mut feed = StaticFeed::default();
//! feed.routes.push(RouteRow {
//!     id: RouteIdentifier::new("R1"),
//!     class: VehicleClass::Tram,
//!     short_name: "1".into(),
//!     long_name: "East Coburg - South Melbourne Beach".into(),
//!     color: None,
//!     text_color: None,
//! });
//! feed.shapes.insert(
//!     RouteIdentifier::new("R1"),
//!     vec![LineString::from(vec![(144.95, -37.81), (144.97, -37.81)])],
//! );
//!
//! let config = TrackerConfig::default();
//! let (network, _) = apply_offsets(&StaticNetwork::from_feed(&feed), &config.offsets, config.service_bounds);
//! let network = std::sync::Arc::new(network);
//!
//! let store = VehicleStore::new(network.clone(), &config);
//! let now = Instant::now();
//! let tram = VehicleObservation::new("t1", "v1", "R1", Point::new(144.96, -37.81));
//! store.reconcile(&FeedSnapshot::new(VehicleClass::Tram, vec![tram]), now);
//!
//! let camera = CameraState::from_bounds(Rect::new((144.9, -37.9), (145.0, -37.7)), 15.0);
//! let frame = RenderScheduler::new(config).frame(&store.current(), &camera, network.as_ref(), now);
//! assert_eq!(frame.footprints.len(), 1);
//! assert_eq!(frame.footprints[0].bearing.round(), 90.0);
//! ```

pub mod bearing;
pub mod config;
pub mod error;
pub mod export;
pub mod host;
pub mod offset;
pub mod render;
pub mod runtime;
pub mod source;
pub mod store;
pub mod vehicle;
pub mod viewport;

// Re-export transit from the transit crate
pub use livetrack_transit as transit;

pub mod prelude {
    pub use crate::bearing::BearingResolver;
    pub use crate::config::TrackerConfig;
    pub use crate::error::{Result, TrackerError};
    pub use crate::host::{MapHost, RecordingHost};
    pub use crate::offset::{apply_offsets, OffsetStatus, RouteOffsetDiagnostic, TrackOffsetResolver};
    pub use crate::render::{RenderFrame, RenderScheduler, VehicleFootprint};
    pub use crate::runtime::{refresh_cycle, Tracker};
    pub use crate::source::{FeedSource, ReplayFeed};
    pub use crate::store::{RefreshPolicy, VehicleSet, VehicleSetReader, VehicleStore};
    pub use crate::vehicle::{Animation, TrackedVehicle, Vehicle};
    pub use crate::viewport::CameraState;
    pub use livetrack_transit::prelude::*;
}
