//! Geometry utilities and spatial indexing.

pub mod geometry;
pub mod index;

pub use geometry::{
    clean_polyline, compass_bearing, distance_meters, is_valid_coordinate, is_valid_polyline,
    lerp, lerp_coordinate, offset_polyline, ServiceBounds,
};
