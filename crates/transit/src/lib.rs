//! # livetrack-transit
//!
//! Static network and realtime feed models for live vehicle tracking.
//!
//! ## Features
//!
//! - **Typed identifiers**: cheap-to-clone ids for trips, vehicles, routes and stops
//! - **Static network**: one authoritative geometry per line, chosen from raw shape variants
//! - **Spatial queries**: R-tree indices for stops, route segments and segment starts
//! - **Geometry utilities**: haversine distance, interpolation, validation,
//!   polyline cleaning, projection and perpendicular offsetting
//!
//! ## Example
//!
//! ```
//! use livetrack_transit::prelude::*;
//! use geo::{Coord, LineString};
//!
//! let mut feed = StaticFeed::default();
//! feed.routes.push(RouteRow {
//!     id: RouteIdentifier::new("R1"),
//!     class: VehicleClass::Tram,
//!     short_name: "96".into(),
//!     long_name: "East Brunswick - St Kilda Beach".into(),
//!     color: None,
//!     text_color: None,
//! });
//! feed.shapes.insert(
//!     RouteIdentifier::new("R1"),
//!     vec![LineString::from(vec![(144.95, -37.81), (144.97, -37.81)])],
//! );
//!
//! let network = StaticNetwork::from_feed(&feed);
//! let (start, end) = network
//!     .nearest_route_segment(&RouteIdentifier::new("R1"), VehicleClass::Tram, "96", Coord { x: 144.96, y: -37.81 })
//!     .unwrap();
//! assert_eq!(compass_bearing(start, end).map(f64::round), Some(90.0));
//! ```

pub mod identifiers;
pub mod models;
pub mod provider;
pub mod spatial;

// Re-exports for convenience
pub mod prelude {
    pub use crate::identifiers::*;
    pub use crate::models::{feed::*, traits::*, types::*};
    pub use crate::provider::static_provider::{
        RouteRecord, RouteRow, StaticFeed, StaticNetwork, StopImpl,
    };
    pub use crate::spatial::geometry::*;
}

pub use prelude::*;
