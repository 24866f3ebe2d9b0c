//! Geometry utilities shared by the offset resolver, the vehicle store and
//! the render scheduler.
//!
//! Coordinates follow the `geo` convention: `x` is longitude, `y` is
//! latitude, both in degrees. Bearings are compass degrees (0 = north,
//! 90 = east).

use geo::{coord, Closest, ClosestPoint, Coord, EuclideanDistance, Line, LineString, Point};

use crate::models::types::{Result, TransitError};

/// Mean Earth radius used for haversine distances
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Meters per degree of latitude (and of longitude at the equator)
pub const METERS_PER_DEGREE: f64 = 111_320.0;

/// Two points closer than this (in degrees, about 0.1 m) are duplicates
pub const DUPLICATE_EPSILON_DEG: f64 = 1e-6;

/// Longest allowed miter at a polyline joint, as a multiple of the offset
const MITER_LIMIT: f64 = 2.0;

// ============================================================================
// Distances and interpolation
// ============================================================================

/// Great-circle distance in meters (haversine)
pub fn distance_meters(p1: Point, p2: Point) -> f64 {
    let lat1 = p1.y().to_radians();
    let lat2 = p2.y().to_radians();
    let d_lat = lat2 - lat1;
    let d_lon = (p2.x() - p1.x()).to_radians();

    let a = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * a.sqrt().atan2((1.0 - a).sqrt())
}

/// Linear interpolation. Callers clamp `t` to `[0, 1]`.
pub fn lerp(a: f64, b: f64, t: f64) -> f64 {
    a + (b - a) * t
}

pub fn lerp_coordinate(c1: Coord, c2: Coord, t: f64) -> Coord {
    coord! { x: lerp(c1.x, c2.x, t), y: lerp(c1.y, c2.y, t) }
}

/// Convert a local displacement in meters into a displacement in degrees at
/// the given latitude. Returns `(d_lon, d_lat)`.
pub fn meters_to_degrees(east_m: f64, north_m: f64, at_lat: f64) -> (f64, f64) {
    let lon_scale = at_lat.to_radians().cos() * METERS_PER_DEGREE;
    (east_m / lon_scale, north_m / METERS_PER_DEGREE)
}

// ============================================================================
// Validation
// ============================================================================

/// Plausible bounding box for the service region.
///
/// Upstream data outside it is treated as corrupt.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ServiceBounds {
    pub min_lon: f64,
    pub min_lat: f64,
    pub max_lon: f64,
    pub max_lat: f64,
}

impl ServiceBounds {
    pub const WORLD: ServiceBounds = ServiceBounds {
        min_lon: -180.0,
        min_lat: -90.0,
        max_lon: 180.0,
        max_lat: 90.0,
    };

    /// The state of Victoria, Australia
    pub const VICTORIA: ServiceBounds = ServiceBounds {
        min_lon: 140.9,
        min_lat: -39.2,
        max_lon: 150.0,
        max_lat: -33.9,
    };

    pub fn contains(&self, lon: f64, lat: f64) -> bool {
        lon >= self.min_lon && lon <= self.max_lon && lat >= self.min_lat && lat <= self.max_lat
    }

    pub fn is_inverted(&self) -> bool {
        self.min_lon > self.max_lon || self.min_lat > self.max_lat
    }
}

impl Default for ServiceBounds {
    fn default() -> Self {
        Self::VICTORIA
    }
}

/// Reject non-finite coordinates and coordinates outside the service region
pub fn is_valid_coordinate(lon: f64, lat: f64, bounds: &ServiceBounds) -> bool {
    lon.is_finite() && lat.is_finite() && bounds.contains(lon, lat)
}

/// At least two points, all of them valid
pub fn is_valid_polyline(line: &LineString, bounds: &ServiceBounds) -> bool {
    line.0.len() >= 2 && line.0.iter().all(|c| is_valid_coordinate(c.x, c.y, bounds))
}

/// Drop consecutive points that lie within `epsilon` degrees of the last
/// kept point.
///
/// Duplicate vertices give zero-length segments, which have no normal and
/// break perpendicular offsetting.
pub fn clean_polyline(coords: &[Coord], epsilon: f64) -> Vec<Coord> {
    let mut cleaned: Vec<Coord> = Vec::with_capacity(coords.len());

    for &c in coords {
        match cleaned.last() {
            Some(last) if planar_distance(*last, c) <= epsilon => {}
            _ => cleaned.push(c),
        }
    }

    cleaned
}

// ============================================================================
// Projection and direction
// ============================================================================

pub fn planar_distance(a: Coord, b: Coord) -> f64 {
    Point::from(a).euclidean_distance(&Point::from(b))
}

/// Closest point to `p` on segment `a..b`, in planar degree space
pub fn closest_point_on_segment(p: Coord, a: Coord, b: Coord) -> Coord {
    match Line::new(a, b).closest_point(&Point::from(p)) {
        Closest::Intersection(closest) | Closest::SinglePoint(closest) => closest.0,
        // Zero-length segment
        Closest::Indeterminate => a,
    }
}

/// Index of the segment of `line` nearest to `p`, and the projection of `p`
/// onto it
pub fn nearest_segment(line: &LineString, p: Coord) -> Option<(usize, Coord)> {
    let target = Point::from(p);
    line.lines()
        .enumerate()
        .map(|(i, seg)| (i, closest_point_on_segment(p, seg.start, seg.end)))
        .min_by(|(_, a), (_, b)| {
            Point::from(*a)
                .euclidean_distance(&target)
                .total_cmp(&Point::from(*b).euclidean_distance(&target))
        })
}

/// Normalize any angle in degrees to `[0, 360)`
pub fn normalize_bearing(degrees: f64) -> f64 {
    let b = degrees.rem_euclid(360.0);
    // rem_euclid can round up to exactly 360 for tiny negative inputs
    if b >= 360.0 {
        0.0
    } else {
        b
    }
}

/// Compass bearing of the vector `from -> to`, treating degrees as planar.
///
/// `None` for a zero-length vector.
pub fn compass_bearing(from: Coord, to: Coord) -> Option<f64> {
    let dx = to.x - from.x;
    let dy = to.y - from.y;

    if dx == 0.0 && dy == 0.0 {
        return None;
    }

    Some(normalize_bearing(90.0 - dy.atan2(dx).to_degrees()))
}

// ============================================================================
// Offsetting
// ============================================================================

/// Shift a polyline sideways by `distance_m` meters.
///
/// Positive distances move the line to the left of its direction of
/// travel. Joints are mitered, capped at [`MITER_LIMIT`] times the
/// distance. The input must already be free of duplicate points (see
/// [`clean_polyline`]).
pub fn offset_polyline(line: &LineString, distance_m: f64) -> Result<LineString> {
    let coords = &line.0;

    if coords.len() < 2 {
        return Err(TransitError::InvalidGeometry(format!(
            "cannot offset a polyline of {} point(s)",
            coords.len()
        )));
    }

    if !distance_m.is_finite() {
        return Err(TransitError::InvalidGeometry(format!(
            "offset distance {distance_m} is not finite"
        )));
    }

    // Local equirectangular frame in meters, anchored at the first point
    let origin = coords[0];
    let lon_scale = origin.y.to_radians().cos() * METERS_PER_DEGREE;
    if lon_scale.abs() < 1e-6 {
        return Err(TransitError::InvalidGeometry(
            "polyline starts at a pole".to_owned(),
        ));
    }

    let local: Vec<Coord> = coords
        .iter()
        .map(|c| coord! { x: (c.x - origin.x) * lon_scale, y: (c.y - origin.y) * METERS_PER_DEGREE })
        .collect();

    let normals = local
        .windows(2)
        .map(|w| {
            let d = w[1] - w[0];
            let len = d.x.hypot(d.y);
            if len < 1e-9 {
                Err(TransitError::InvalidGeometry(
                    "zero-length segment".to_owned(),
                ))
            } else {
                Ok(coord! { x: -d.y / len, y: d.x / len })
            }
        })
        .collect::<Result<Vec<_>>>()?;

    let last = local.len() - 1;
    let shifted: Vec<Coord> = local
        .iter()
        .enumerate()
        .map(|(i, &p)| {
            let shift = if i == 0 {
                normals[0]
            } else if i == last {
                normals[last - 1]
            } else {
                miter(normals[i - 1], normals[i])
            };

            let moved = p + shift * distance_m;
            coord! { x: origin.x + moved.x / lon_scale, y: origin.y + moved.y / METERS_PER_DEGREE }
        })
        .collect();

    if shifted.iter().any(|c| !c.x.is_finite() || !c.y.is_finite()) {
        return Err(TransitError::InvalidGeometry(
            "offset produced non-finite coordinates".to_owned(),
        ));
    }

    Ok(LineString::new(shifted))
}

/// Joint direction for two unit normals, scaled so both adjacent edges end
/// up at the full offset distance
fn miter(incoming: Coord, outgoing: Coord) -> Coord {
    let sum = incoming + outgoing;
    let len = sum.x.hypot(sum.y);

    // The line doubles back on itself; no meaningful joint
    if len < 1e-9 {
        return outgoing;
    }

    let direction = sum / len;
    let cos_half = direction.x * outgoing.x + direction.y * outgoing.y;
    let scale = (1.0 / cos_half.max(1e-9)).min(MITER_LIMIT);
    direction * scale
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_distance_meters() {
        // Flinders Street to Southern Cross is roughly 1.2 km
        let flinders = Point::new(144.9671, -37.8183);
        let southern_cross = Point::new(144.9525, -37.8184);

        let dist = distance_meters(flinders, southern_cross);
        assert!((dist - 1_283.0).abs() < 50.0, "got {dist}");
        assert_eq!(distance_meters(flinders, flinders), 0.0);
    }

    #[test]
    fn test_lerp_coordinate() {
        let a = coord! { x: 0.0, y: 0.0 };
        let b = coord! { x: 2.0, y: -4.0 };

        assert_eq!(lerp_coordinate(a, b, 0.0), a);
        assert_eq!(lerp_coordinate(a, b, 1.0), b);
        assert_eq!(lerp_coordinate(a, b, 0.5), coord! { x: 1.0, y: -2.0 });
    }

    #[test]
    fn test_is_valid_coordinate() {
        let bounds = ServiceBounds::VICTORIA;

        assert!(is_valid_coordinate(144.96, -37.81, &bounds));
        assert!(!is_valid_coordinate(f64::NAN, -37.81, &bounds));
        assert!(!is_valid_coordinate(144.96, f64::INFINITY, &bounds));
        // Null island is a classic corrupt-feed artifact
        assert!(!is_valid_coordinate(0.0, 0.0, &bounds));
        assert!(is_valid_coordinate(0.0, 0.0, &ServiceBounds::WORLD));
    }

    #[test]
    fn test_clean_polyline() {
        let coords = vec![
            coord! { x: 144.0, y: -37.0 },
            coord! { x: 144.0, y: -37.0 },
            coord! { x: 144.0000005, y: -37.0 },
            coord! { x: 144.001, y: -37.0 },
            coord! { x: 144.001, y: -37.0 },
            coord! { x: 144.002, y: -37.0 },
        ];

        let cleaned = clean_polyline(&coords, DUPLICATE_EPSILON_DEG);
        assert_eq!(cleaned.len(), 3);
        assert!(cleaned.len() <= coords.len());
        for pair in cleaned.windows(2) {
            assert!(planar_distance(pair[0], pair[1]) > DUPLICATE_EPSILON_DEG);
        }
    }

    #[test]
    fn test_clean_polyline_never_leaves_close_neighbours() {
        // Zigzag with jitter of every size around the epsilon
        let steps = [0.0, 2e-7, 5e-7, 1e-6, 1.5e-6, 3e-6, 1e-5, 0.0, 9e-7, 2e-6];
        let mut x = 144.96;
        let mut coords = Vec::new();
        for (i, step) in steps.iter().cycle().take(60).enumerate() {
            x += step;
            let y = if i % 7 == 0 { -37.81 + step } else { -37.81 };
            coords.push(coord! { x: x, y: y });
        }

        for epsilon in [DUPLICATE_EPSILON_DEG, 5e-6, 1e-4] {
            let cleaned = clean_polyline(&coords, epsilon);
            assert!(cleaned.len() <= coords.len());
            assert_eq!(cleaned.first(), coords.first());
            for pair in cleaned.windows(2) {
                assert!(planar_distance(pair[0], pair[1]) > epsilon);
            }
        }
    }

    #[test]
    fn test_closest_point_on_degenerate_segment() {
        let a = coord! { x: 1.0, y: 1.0 };
        assert_eq!(closest_point_on_segment(coord! { x: 5.0, y: 3.0 }, a, a), a);
    }

    #[test]
    fn test_clean_polyline_empty() {
        assert!(clean_polyline(&[], DUPLICATE_EPSILON_DEG).is_empty());
    }

    #[test]
    fn test_closest_point_on_segment() {
        let a = coord! { x: 0.0, y: 0.0 };
        let b = coord! { x: 10.0, y: 0.0 };

        assert_eq!(closest_point_on_segment(coord! { x: 5.0, y: 3.0 }, a, b), coord! { x: 5.0, y: 0.0 });
        assert_eq!(closest_point_on_segment(coord! { x: -5.0, y: 1.0 }, a, b), a);
        assert_eq!(closest_point_on_segment(coord! { x: 15.0, y: 1.0 }, a, b), b);
    }

    #[test]
    fn test_nearest_segment() {
        let line = LineString::from(vec![(0.0, 0.0), (10.0, 0.0), (10.0, 10.0)]);

        let (index, projected) = nearest_segment(&line, coord! { x: 11.0, y: 6.0 }).unwrap();
        assert_eq!(index, 1);
        assert_eq!(projected, coord! { x: 10.0, y: 6.0 });

        assert!(nearest_segment(&LineString::new(vec![]), coord! { x: 0.0, y: 0.0 }).is_none());
    }

    #[test]
    fn test_compass_bearing() {
        let origin = coord! { x: 144.96, y: -37.81 };

        let east = compass_bearing(origin, coord! { x: 144.97, y: -37.81 }).unwrap();
        let north = compass_bearing(origin, coord! { x: 144.96, y: -37.80 }).unwrap();
        let west = compass_bearing(origin, coord! { x: 144.95, y: -37.81 }).unwrap();
        let south = compass_bearing(origin, coord! { x: 144.96, y: -37.82 }).unwrap();

        assert_abs_diff_eq!(east, 90.0, epsilon = 1e-9);
        assert_abs_diff_eq!(north, 0.0, epsilon = 1e-9);
        assert_abs_diff_eq!(west, 270.0, epsilon = 1e-9);
        assert_abs_diff_eq!(south, 180.0, epsilon = 1e-9);
        assert!(compass_bearing(origin, origin).is_none());
    }

    #[test]
    fn test_normalize_bearing() {
        assert_eq!(normalize_bearing(-90.0), 270.0);
        assert_eq!(normalize_bearing(360.0), 0.0);
        assert_eq!(normalize_bearing(725.0), 5.0);
    }

    #[test]
    fn test_offset_polyline_straight() {
        // Due east; left of travel is north
        let line = LineString::from(vec![(144.96, -37.81), (144.97, -37.81), (144.98, -37.81)]);
        let shifted = offset_polyline(&line, 10.0).unwrap();

        assert_eq!(shifted.0.len(), 3);
        for (orig, moved) in line.0.iter().zip(shifted.0.iter()) {
            assert_abs_diff_eq!(moved.x, orig.x, epsilon = 1e-9);
            let north_m = (moved.y - orig.y) * METERS_PER_DEGREE;
            assert_abs_diff_eq!(north_m, 10.0, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_offset_polyline_corner_keeps_distance() {
        let line = LineString::from(vec![(144.96, -37.81), (144.97, -37.81), (144.97, -37.80)]);
        let shifted = offset_polyline(&line, -5.0).unwrap();

        // Each shifted segment stays parallel to its source, 5 m away
        let first = Point::from(line.0[0]);
        let moved_first = Point::from(shifted.0[0]);
        assert_abs_diff_eq!(distance_meters(first, moved_first), 5.0, epsilon = 0.05);

        let last = Point::from(line.0[2]);
        let moved_last = Point::from(shifted.0[2]);
        assert_abs_diff_eq!(distance_meters(last, moved_last), 5.0, epsilon = 0.05);
    }

    #[test]
    fn test_offset_polyline_rejects_degenerate() {
        let single = LineString::from(vec![(144.96, -37.81)]);
        assert!(offset_polyline(&single, 4.0).is_err());

        let duplicate = LineString::from(vec![(144.96, -37.81), (144.96, -37.81)]);
        assert!(offset_polyline(&duplicate, 4.0).is_err());

        let line = LineString::from(vec![(144.96, -37.81), (144.97, -37.81)]);
        assert!(offset_polyline(&line, f64::NAN).is_err());
    }
}
