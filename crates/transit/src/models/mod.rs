//! Transit data models, types, and traits.

pub mod feed;
pub mod traits;
pub mod types;

// Re-exports for convenience
pub use feed::{FeedSnapshot, TripUpdate, VehicleObservation};
pub use traits::{NetworkLookup, Route, TransitStop, TransitVehicle};
pub use types::{Occupancy, Result, Rgb, TransitError, VehicleClass};
