//! Static network providers.

pub mod static_provider;

pub use static_provider::{
    build_routes, select_authoritative_geometry, RouteRecord, RouteRow, StaticFeed, StaticNetwork,
    StopImpl,
};
