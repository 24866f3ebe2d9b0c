//! Shared-track offset resolution.
//!
//! When several routes run over the same corridor their strokes overlap
//! and only the topmost is visible. The resolver finds segments shared by
//! two or more eligible routes and fans the routes out sideways so they
//! draw as parallel lines.
//!
//! Runs once per static-data load. Offsets are recomputed from scratch
//! each time, so a route's offset sign is only stable for a given route set.

use std::collections::BTreeMap;
use std::sync::Arc;

use geo::{Coord, LineString};
use itertools::Itertools;
use livetrack_transit::spatial::geometry::{clean_polyline, is_valid_polyline, offset_polyline};
use livetrack_transit::{RouteIdentifier, RouteRecord, ServiceBounds, StaticNetwork};

use crate::config::OffsetConfig;

/// Direction-independent key of a polyline edge.
///
/// Endpoints are rounded to a fixed number of decimal places and stored in
/// ascending order, so `a -> b` and `b -> a` produce the same signature.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SegmentSignature {
    low: (i64, i64),
    high: (i64, i64),
}

impl SegmentSignature {
    /// `None` for non-finite endpoints or when both round to the same point
    pub fn new(start: Coord, end: Coord, precision: u32) -> Option<Self> {
        Self::oriented(start, end, precision).map(|(signature, _)| signature)
    }

    /// Signature plus whether `start -> end` runs from `low` to `high`
    pub fn oriented(start: Coord, end: Coord, precision: u32) -> Option<(Self, bool)> {
        let factor = 10f64.powi(precision as i32);
        let round = |c: Coord| -> Option<(i64, i64)> {
            let x = (c.x * factor).round();
            let y = (c.y * factor).round();
            (x.is_finite() && y.is_finite()).then_some((x as i64, y as i64))
        };

        let a = round(start)?;
        let b = round(end)?;
        if a == b {
            return None;
        }

        let signature = Self {
            low: a.min(b),
            high: a.max(b),
        };
        Some((signature, a < b))
    }
}

/// Signatures of segments that appear in two or more routes, with the
/// routes (by index) that contain them.
///
/// Each contributor carries whether it runs the segment from `low` to
/// `high`. Left and right are judged on that canonical direction, so a
/// route digitized the other way gets its offset negated.
#[derive(Debug, Default)]
pub struct SharedSegmentIndex {
    segments: BTreeMap<SegmentSignature, BTreeMap<usize, bool>>,
}

impl SharedSegmentIndex {
    pub fn build<'a>(
        routes: impl IntoIterator<Item = (usize, &'a LineString)>,
        precision: u32,
    ) -> Self {
        let mut segments: BTreeMap<SegmentSignature, BTreeMap<usize, bool>> = BTreeMap::new();

        for (route, geometry) in routes {
            for line in geometry.lines() {
                if let Some((signature, forward)) = SegmentSignature::oriented(line.start, line.end, precision) {
                    // A route passing the same edge twice keeps its first direction
                    segments.entry(signature).or_default().entry(route).or_insert(forward);
                }
            }
        }

        segments.retain(|_, contributors| contributors.len() >= 2);
        Self { segments }
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&SegmentSignature, &BTreeMap<usize, bool>)> {
        self.segments.iter()
    }
}

/// Offset of the route at `rank` among `n` routes sharing one segment:
/// a fan symmetric around zero
pub fn fan_offset(rank: usize, n: usize, base_offset_m: f64) -> f64 {
    let center = (n as f64 - 1.0) / 2.0;
    (rank as f64 - center) * base_offset_m
}

#[derive(Clone, Copy, Debug, Default)]
struct RunningMean {
    mean: f64,
    count: usize,
}

impl RunningMean {
    fn push(&mut self, value: f64) {
        self.mean = (self.mean * self.count as f64 + value) / (self.count as f64 + 1.0);
        self.count += 1;
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, strum::Display, strum::IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum OffsetStatus {
    /// Class is not in the allow-list
    Ineligible,
    NoSharedSegments,
    /// Resolved offset below the negligible threshold
    Negligible,
    Applied,
    /// Source geometry failed validation; original kept
    InvalidInput,
    /// Offset geometry failed validation; original kept
    InvalidOutput,
}

#[derive(Clone, Debug)]
pub struct RouteOffsetDiagnostic {
    pub route_id: RouteIdentifier,
    pub short_name: Arc<str>,
    /// Mean of the route's per-segment offsets
    pub resolved_offset_m: f64,
    pub shared_segments: usize,
    pub status: OffsetStatus,
}

#[derive(Clone, Debug)]
pub struct OffsetResolution {
    /// Same order as the input
    pub routes: Vec<RouteRecord>,
    pub diagnostics: Vec<RouteOffsetDiagnostic>,
}

impl OffsetResolution {
    pub fn applied_count(&self) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.status == OffsetStatus::Applied)
            .count()
    }
}

pub struct TrackOffsetResolver {
    config: OffsetConfig,
    bounds: ServiceBounds,
}

impl TrackOffsetResolver {
    pub fn new(config: OffsetConfig, bounds: ServiceBounds) -> Self {
        Self { config, bounds }
    }

    /// Compute display offsets for every route.
    ///
    /// Pure: returns new route records and leaves the input untouched.
    pub fn resolve(&self, routes: &[Arc<RouteRecord>]) -> OffsetResolution {
        let cleaned: Vec<Option<LineString>> = routes
            .iter()
            .map(|route| {
                self.config.eligible_classes.contains(&route.class).then(|| {
                    LineString::new(clean_polyline(&route.geometry.0, self.config.clean_epsilon_deg))
                })
            })
            .collect();

        let index = SharedSegmentIndex::build(
            cleaned
                .iter()
                .enumerate()
                .filter_map(|(i, geometry)| geometry.as_ref().map(|g| (i, g))),
            self.config.signature_precision,
        );

        let mut means = vec![RunningMean::default(); routes.len()];
        for (_, contributors) in index.iter() {
            let ordered = contributors
                .iter()
                .map(|(&route, &forward)| (route, forward))
                .sorted_by(|&(a, _), &(b, _)| {
                    (&routes[a].short_name, &routes[a].id).cmp(&(&routes[b].short_name, &routes[b].id))
                })
                .collect_vec();

            let n = ordered.len();
            for (rank, (route, forward)) in ordered.into_iter().enumerate() {
                let offset = fan_offset(rank, n, self.config.base_offset_m);
                // Offsets apply to the left of each route's own travel direction
                means[route].push(if forward { offset } else { -offset });
            }
        }

        let (routes, diagnostics): (Vec<_>, Vec<_>) = routes
            .iter()
            .zip(cleaned)
            .zip(means)
            .map(|((route, cleaned), mean)| self.apply(route, cleaned, mean))
            .unzip();

        let resolution = OffsetResolution {
            routes,
            diagnostics,
        };

        tracing::info!(
            routes = resolution.routes.len(),
            shared_segments = index.len(),
            applied = resolution.applied_count(),
            "resolved shared-track offsets"
        );

        resolution
    }

    fn apply(
        &self,
        route: &RouteRecord,
        cleaned: Option<LineString>,
        mean: RunningMean,
    ) -> (RouteRecord, RouteOffsetDiagnostic) {
        let diagnostic = |status: OffsetStatus| RouteOffsetDiagnostic {
            route_id: route.id.clone(),
            short_name: route.short_name.clone(),
            resolved_offset_m: mean.mean,
            shared_segments: mean.count,
            status,
        };

        let Some(cleaned) = cleaned else {
            return (route.clone(), diagnostic(OffsetStatus::Ineligible));
        };

        if mean.count == 0 {
            return (route.clone(), diagnostic(OffsetStatus::NoSharedSegments));
        }

        if mean.mean.abs() < self.config.negligible_m {
            return (route.clone(), diagnostic(OffsetStatus::Negligible));
        }

        if !is_valid_polyline(&cleaned, &self.bounds) {
            tracing::warn!(route = %route.id, "route geometry failed validation, keeping it un-offset");
            return (route.clone(), diagnostic(OffsetStatus::InvalidInput));
        }

        match offset_polyline(&cleaned, mean.mean) {
            Ok(shifted) if is_valid_polyline(&shifted, &self.bounds) => (
                route.with_offset(shifted, mean.mean),
                diagnostic(OffsetStatus::Applied),
            ),
            Ok(_) => {
                tracing::warn!(route = %route.id, offset_m = mean.mean, "offset geometry left the service bounds");
                (route.clone(), diagnostic(OffsetStatus::InvalidOutput))
            }
            Err(err) => {
                tracing::warn!(route = %route.id, %err, "could not offset route geometry");
                (route.clone(), diagnostic(OffsetStatus::InvalidOutput))
            }
        }
    }
}

/// Resolve offsets for a network and build the network used for rendering
pub fn apply_offsets(
    network: &StaticNetwork,
    config: &OffsetConfig,
    bounds: ServiceBounds,
) -> (StaticNetwork, Vec<RouteOffsetDiagnostic>) {
    let resolution = TrackOffsetResolver::new(config.clone(), bounds).resolve(network.routes());
    (network.with_routes(resolution.routes), resolution.diagnostics)
}
