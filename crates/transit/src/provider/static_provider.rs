//! In-memory static network built once per static-data load.
//!
//! Stores the route table (one authoritative geometry per line) and the stop
//! table, with spatial indices for fast queries.

use std::collections::HashMap;
use std::sync::Arc;

use geo::{BoundingRect, Coord, LineString, Point, Rect};
use rstar::RTree;

use crate::identifiers::*;
use crate::models::{traits::*, types::*};
use crate::spatial::geometry::{distance_meters, METERS_PER_DEGREE};
use crate::spatial::index::{RouteSegmentNode, SegmentStartNode, StopNode};

// ============================================================================
// Static data rows
// ============================================================================

#[derive(Clone, Debug)]
pub struct StopImpl {
    pub id: StopIdentifier,
    pub name: Arc<str>,
    pub location: Point,
}

impl TransitStop for StopImpl {
    fn id(&self) -> &StopIdentifier {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn location(&self) -> Point {
        self.location
    }
}

/// One row of the route table, before shapes are merged
#[derive(Clone, Debug)]
pub struct RouteRow {
    pub id: RouteIdentifier,
    pub class: VehicleClass,
    pub short_name: Arc<str>,
    pub long_name: Arc<str>,
    /// Hex RGB, e.g. "FF0000"
    pub color: Option<Arc<str>>,
    pub text_color: Option<Arc<str>>,
}

/// Everything the static-data collaborator supplies
#[derive(Clone, Debug, Default)]
pub struct StaticFeed {
    pub routes: Vec<RouteRow>,
    pub stops: Vec<StopImpl>,
    /// Raw shape variants, grouped by route id
    pub shapes: HashMap<RouteIdentifier, Vec<LineString>>,
    /// Per-class fallback colors from the static feed
    pub class_colors: HashMap<VehicleClass, Rgb>,
}

// ============================================================================
// Route record
// ============================================================================

#[derive(Clone, Debug)]
pub struct RouteRecord {
    pub id: RouteIdentifier,
    /// Every route id merged into this line, `id` included
    pub member_ids: Vec<RouteIdentifier>,
    pub class: VehicleClass,
    pub short_name: Arc<str>,
    pub long_name: Arc<str>,
    pub color: Rgb,
    pub text_color: Option<Rgb>,
    pub geometry: LineString,
    /// Signed display offset in meters, 0 = centered
    pub offset_m: f64,
    /// Number of raw shape variants this geometry was chosen from
    pub shape_variations: usize,
}

impl RouteRecord {
    /// Copy of this route with replaced display geometry
    pub fn with_offset(&self, geometry: LineString, offset_m: f64) -> Self {
        Self {
            geometry,
            offset_m,
            ..self.clone()
        }
    }
}

impl Route for RouteRecord {
    fn id(&self) -> &RouteIdentifier {
        &self.id
    }

    fn vehicle_class(&self) -> VehicleClass {
        self.class
    }

    fn short_name(&self) -> &str {
        &self.short_name
    }

    fn long_name(&self) -> &str {
        &self.long_name
    }

    fn color(&self) -> Rgb {
        self.color
    }

    fn text_color(&self) -> Option<Rgb> {
        self.text_color
    }

    fn geometry(&self) -> &LineString {
        &self.geometry
    }

    fn offset_meters(&self) -> f64 {
        self.offset_m
    }

    fn serves(&self, route_id: &RouteIdentifier, class: VehicleClass, line_name: &str) -> bool {
        self.member_ids.contains(route_id) || (self.class == class && &*self.short_name == line_name)
    }
}

/// Pick the variant whose bounding box best covers the union of all
/// variants' bounding boxes.
///
/// Express or short-working variants cover less of the line's full extent
/// and lose. Equal coverage is broken by point count, then by input order.
pub fn select_authoritative_geometry(variants: &[LineString]) -> Option<usize> {
    let rects: Vec<(usize, Rect)> = variants
        .iter()
        .enumerate()
        .filter(|(_, line)| line.0.len() >= 2)
        .filter_map(|(i, line)| line.bounding_rect().map(|rect| (i, rect)))
        .collect();

    let (_, first) = rects.first()?;
    let union = rects.iter().fold(*first, |acc, (_, rect)| {
        Rect::new(
            Coord { x: acc.min().x.min(rect.min().x), y: acc.min().y.min(rect.min().y) },
            Coord { x: acc.max().x.max(rect.max().x), y: acc.max().y.max(rect.max().y) },
        )
    });

    let axis_ratio = |part: f64, whole: f64| if whole > 0.0 { part / whole } else { 1.0 };
    let coverage = |rect: &Rect| {
        (axis_ratio(rect.width(), union.width()) + axis_ratio(rect.height(), union.height())) / 2.0
    };

    let mut best: Option<(usize, f64, usize)> = None;
    for (i, rect) in &rects {
        let score = coverage(rect);
        let points = variants[*i].0.len();

        let better = match best {
            None => true,
            Some((_, best_score, best_points)) => {
                score > best_score + 1e-12
                    || ((score - best_score).abs() <= 1e-12 && points > best_points)
            }
        };
        if better {
            best = Some((*i, score, points));
        }
    }

    best.map(|(i, _, _)| i)
}

/// Merge route rows sharing a class and short name into single route records
pub fn build_routes(feed: &StaticFeed) -> Vec<RouteRecord> {
    let mut groups: Vec<Vec<&RouteRow>> = Vec::new();
    let mut group_index: HashMap<(VehicleClass, &str), usize> = HashMap::new();

    for row in &feed.routes {
        let key = (row.class, &*row.short_name);
        match group_index.get(&key) {
            Some(&i) => groups[i].push(row),
            None => {
                group_index.insert(key, groups.len());
                groups.push(vec![row]);
            }
        }
    }

    groups
        .into_iter()
        .map(|rows| {
            let head = rows[0];

            let variants: Vec<LineString> = rows
                .iter()
                .filter_map(|row| feed.shapes.get(&row.id))
                .flat_map(|shapes| shapes.iter().cloned())
                .collect();

            let geometry = select_authoritative_geometry(&variants)
                .map(|i| variants[i].clone())
                .unwrap_or_else(|| LineString::new(Vec::new()));

            let color = rows
                .iter()
                .find_map(|row| row.color.as_deref().and_then(Rgb::from_hex))
                .or_else(|| feed.class_colors.get(&head.class).copied())
                .unwrap_or_else(|| head.class.default_color());

            RouteRecord {
                id: head.id.clone(),
                member_ids: rows.iter().map(|row| row.id.clone()).collect(),
                class: head.class,
                short_name: head.short_name.clone(),
                long_name: head.long_name.clone(),
                color,
                text_color: head.text_color.as_deref().and_then(Rgb::from_hex),
                geometry,
                offset_m: 0.0,
                shape_variations: variants.len(),
            }
        })
        .collect()
}

// ============================================================================
// Static Network
// ============================================================================

/// In-memory static network with spatial indexing
///
/// Immutable once built. Applying display offsets produces a new network
/// through [`StaticNetwork::with_routes`].
#[derive(Clone)]
pub struct StaticNetwork {
    // Core data
    routes: Vec<Arc<RouteRecord>>,
    stops: Vec<Arc<StopImpl>>,

    // Lookup maps
    route_map: HashMap<RouteIdentifier, usize>,
    line_map: HashMap<Arc<str>, Vec<usize>>,
    stop_map: HashMap<StopIdentifier, Arc<StopImpl>>,

    // Spatial indices
    stop_tree: RTree<StopNode>,
    route_tree: RTree<RouteSegmentNode>,
    segment_starts: RTree<SegmentStartNode>,
}

impl StaticNetwork {
    /// Create a new empty network
    pub fn new() -> Self {
        Self::from_parts(Vec::new(), Vec::new())
    }

    /// Build from static data, merging shape variants per line
    pub fn from_feed(feed: &StaticFeed) -> Self {
        Self::from_parts(build_routes(feed), feed.stops.clone())
    }

    /// Build from finished route records and stops
    pub fn from_parts(routes: Vec<RouteRecord>, stops: Vec<StopImpl>) -> Self {
        let routes: Vec<Arc<RouteRecord>> = routes.into_iter().map(Arc::new).collect();
        let stops: Vec<Arc<StopImpl>> = stops.into_iter().map(Arc::new).collect();

        // Build lookup maps
        let mut route_map = HashMap::new();
        let mut line_map: HashMap<Arc<str>, Vec<usize>> = HashMap::new();
        for (i, route) in routes.iter().enumerate() {
            for id in &route.member_ids {
                route_map.insert(id.clone(), i);
            }
            route_map.insert(route.id.clone(), i);
            line_map.entry(route.short_name.clone()).or_default().push(i);
        }

        let stop_map: HashMap<_, _> = stops.iter().map(|s| (s.id.clone(), s.clone())).collect();

        // Build spatial indices
        let stop_tree = RTree::bulk_load(
            stops
                .iter()
                .map(|s| StopNode::new(s.location, s.clone()))
                .collect(),
        );

        let mut route_segments = Vec::new();
        let mut starts = Vec::new();
        for (i, route) in routes.iter().enumerate() {
            for segment in route.geometry.lines() {
                route_segments.push(RouteSegmentNode::new(segment, route.clone()));
                starts.push(SegmentStartNode::new(i, segment));
            }
        }

        Self {
            routes,
            stops,
            route_map,
            line_map,
            stop_map,
            stop_tree,
            route_tree: RTree::bulk_load(route_segments),
            segment_starts: RTree::bulk_load(starts),
        }
    }

    /// New network with the same stops and a replaced route table
    pub fn with_routes(&self, routes: Vec<RouteRecord>) -> Self {
        Self::from_parts(routes, self.stops.iter().map(|s| (**s).clone()).collect())
    }

    pub fn routes(&self) -> &[Arc<RouteRecord>] {
        &self.routes
    }

    pub fn stops(&self) -> &[Arc<StopImpl>] {
        &self.stops
    }

    pub fn route_record(&self, id: &RouteIdentifier) -> Option<&Arc<RouteRecord>> {
        self.route_map.get(id).map(|&i| &self.routes[i])
    }

    pub fn stop_record(&self, id: &StopIdentifier) -> Option<&Arc<StopImpl>> {
        self.stop_map.get(id)
    }

    /// Route a vehicle runs on: by route id first, then by line name within
    /// the vehicle's class
    pub fn route_for_vehicle(
        &self,
        route_id: &RouteIdentifier,
        class: VehicleClass,
        line_name: &str,
    ) -> Option<&Arc<RouteRecord>> {
        self.route_record(route_id)
            .or_else(|| self.serving_routes(route_id, class, line_name).first().map(|&i| &self.routes[i]))
    }

    /// Indices of every route serving a vehicle, in route table order
    fn serving_routes(&self, route_id: &RouteIdentifier, class: VehicleClass, line_name: &str) -> Vec<usize> {
        let mut matching: Vec<usize> = self
            .route_map
            .get(route_id)
            .into_iter()
            .chain(self.line_map.get(line_name).into_iter().flatten())
            .copied()
            .filter(|&i| self.routes[i].serves(route_id, class, line_name))
            .collect();
        matching.sort_unstable();
        matching.dedup();
        matching
    }

    /// Find stops within radius (meters)
    pub fn stops_near(&self, point: Point, radius_m: f64) -> Vec<Arc<StopImpl>> {
        // Validate radius is positive
        if radius_m <= 0.0 || !radius_m.is_finite() {
            return Vec::new();
        }

        let radius_deg = degree_radius(point, radius_m);
        self.stop_tree
            .locate_within_distance([point.x(), point.y()], radius_deg * radius_deg)
            .filter(|node| distance_meters(point, node.stop.location) <= radius_m)
            .map(|node| node.stop.clone())
            .collect()
    }

    /// Find the N nearest stops to a point
    pub fn nearest_stops(&self, point: Point, n: usize) -> Vec<Arc<StopImpl>> {
        self.stop_tree
            .nearest_neighbor_iter(&[point.x(), point.y()])
            .take(n)
            .map(|node| node.stop.clone())
            .collect()
    }

    /// Find routes whose geometry passes within radius (meters)
    pub fn routes_near(&self, point: Point, radius_m: f64) -> Vec<Arc<RouteRecord>> {
        if radius_m <= 0.0 || !radius_m.is_finite() {
            return Vec::new();
        }

        let radius_deg = degree_radius(point, radius_m);
        let mut seen = std::collections::HashSet::new();
        self.route_tree
            .locate_within_distance([point.x(), point.y()], radius_deg * radius_deg)
            .filter(|node| {
                let closest = crate::spatial::geometry::closest_point_on_segment(
                    point.0,
                    node.segment.start,
                    node.segment.end,
                );
                distance_meters(point, Point::from(closest)) <= radius_m
            })
            .filter(|node| seen.insert(node.route.id.clone()))
            .map(|node| node.route.clone())
            .collect()
    }
}

/// Radius in degrees that is guaranteed to contain `radius_m` meters around
/// `point` along both axes
fn degree_radius(point: Point, radius_m: f64) -> f64 {
    let lon_shrink = point.y().to_radians().cos().abs().max(0.01);
    radius_m / (METERS_PER_DEGREE * lon_shrink) * 1.01
}

impl Default for StaticNetwork {
    fn default() -> Self {
        Self::new()
    }
}

impl NetworkLookup for StaticNetwork {
    fn get_route(&self, id: &RouteIdentifier) -> Option<Arc<dyn Route>> {
        self.route_record(id).map(|r| r.clone() as Arc<dyn Route>)
    }

    fn get_stop(&self, id: &StopIdentifier) -> Option<Arc<dyn TransitStop>> {
        self.stop_map.get(id).map(|s| s.clone() as Arc<dyn TransitStop>)
    }

    fn nearest_route_segment(
        &self,
        route_id: &RouteIdentifier,
        class: VehicleClass,
        line_name: &str,
        position: Coord,
    ) -> Option<(Coord, Coord)> {
        let matching = self.serving_routes(route_id, class, line_name);
        if matching.is_empty() {
            return None;
        }

        self.segment_starts
            .nearest_neighbor_iter(&[position.x, position.y])
            .find(|node| matching.contains(&node.route_index))
            .map(|node| (node.segment.start, node.segment.end))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spatial::geometry::compass_bearing;

    fn row(id: &str, class: VehicleClass, short_name: &str, color: Option<&str>) -> RouteRow {
        RouteRow {
            id: RouteIdentifier::new(id),
            class,
            short_name: short_name.into(),
            long_name: format!("Line {short_name}").into(),
            color: color.map(Into::into),
            text_color: None,
        }
    }

    fn stop(id: &str, name: &str, lon: f64, lat: f64) -> StopImpl {
        StopImpl {
            id: StopIdentifier::new(id),
            name: name.into(),
            location: Point::new(lon, lat),
        }
    }

    #[test]
    fn test_empty_network() {
        let network = StaticNetwork::new();
        assert_eq!(network.routes().len(), 0);
        assert_eq!(network.stops().len(), 0);
    }

    #[test]
    fn test_select_geometry_prefers_full_extent() {
        let full = LineString::from(vec![(144.90, -37.80), (144.95, -37.80), (145.00, -37.80)]);
        // Express variant with more points but a truncated extent
        let express = LineString::from(vec![
            (144.95, -37.80),
            (144.96, -37.80),
            (144.97, -37.80),
            (144.98, -37.80),
            (145.00, -37.80),
        ]);

        assert_eq!(select_authoritative_geometry(&[express.clone(), full.clone()]), Some(1));
    }

    #[test]
    fn test_select_geometry_tie_breaks_on_points() {
        let sparse = LineString::from(vec![(144.90, -37.80), (145.00, -37.90)]);
        let dense = LineString::from(vec![(144.90, -37.80), (144.95, -37.85), (145.00, -37.90)]);

        assert_eq!(select_authoritative_geometry(&[sparse, dense]), Some(1));
        assert_eq!(select_authoritative_geometry(&[]), None);
    }

    #[test]
    fn test_build_routes_merges_short_names() {
        let mut feed = StaticFeed::default();
        feed.routes = vec![
            row("tram-96-a", VehicleClass::Tram, "96", Some("ED1C24")),
            row("tram-96-b", VehicleClass::Tram, "96", None),
            row("bus-96", VehicleClass::Bus, "96", None),
        ];
        feed.shapes.insert(
            RouteIdentifier::new("tram-96-a"),
            vec![LineString::from(vec![(144.96, -37.80), (144.97, -37.80)])],
        );
        feed.shapes.insert(
            RouteIdentifier::new("tram-96-b"),
            vec![LineString::from(vec![(144.95, -37.80), (144.98, -37.80)])],
        );
        feed.class_colors.insert(VehicleClass::Bus, Rgb::new(1, 2, 3));

        let routes = build_routes(&feed);
        assert_eq!(routes.len(), 2);

        let tram = &routes[0];
        assert_eq!(tram.member_ids.len(), 2);
        assert_eq!(tram.shape_variations, 2);
        assert_eq!(tram.color, Rgb::new(237, 28, 36));
        assert_eq!(tram.geometry.0[0].x, 144.95);

        let bus = &routes[1];
        assert_eq!(bus.class, VehicleClass::Bus);
        assert_eq!(bus.color, Rgb::new(1, 2, 3));
        assert!(bus.geometry.0.is_empty());
    }

    #[test]
    fn test_network_lookups() {
        let mut feed = StaticFeed::default();
        feed.routes = vec![row("r1", VehicleClass::Metro, "Sandringham", None)];
        feed.stops = vec![
            stop("s1", "Flinders Street", 144.9671, -37.8183),
            stop("s2", "Richmond", 144.9901, -37.8240),
        ];

        let network = StaticNetwork::from_feed(&feed);

        assert!(network.get_route(&RouteIdentifier::new("r1")).is_some());
        assert!(network.get_stop(&StopIdentifier::new("s2")).is_some());
        assert!(network.get_stop(&StopIdentifier::new("missing")).is_none());
        assert_eq!(
            network
                .route_for_vehicle(&RouteIdentifier::new("other"), VehicleClass::Metro, "Sandringham")
                .map(|r| r.id.as_str()),
            Some("r1")
        );
        assert!(network
            .route_for_vehicle(&RouteIdentifier::new("other"), VehicleClass::Bus, "Sandringham")
            .is_none());
        assert_eq!(network.routes()[0].color, VehicleClass::Metro.default_color());
    }

    #[test]
    fn test_stops_near() {
        let network = StaticNetwork::from_parts(
            Vec::new(),
            vec![
                stop("s1", "Flinders Street", 144.9671, -37.8183),
                stop("s2", "Richmond", 144.9901, -37.8240),
            ],
        );

        let near = network.stops_near(Point::new(144.9675, -37.8180), 500.0);
        assert_eq!(near.len(), 1);
        assert_eq!(&*near[0].name, "Flinders Street");

        assert!(network.stops_near(Point::new(144.9675, -37.8180), -1.0).is_empty());
        assert_eq!(network.nearest_stops(Point::new(144.99, -37.824), 1)[0].id.as_str(), "s2");
    }

    #[test]
    fn test_nearest_route_segment() {
        let mut feed = StaticFeed::default();
        feed.routes = vec![
            row("r1", VehicleClass::Tram, "96", None),
            row("r2", VehicleClass::Tram, "11", None),
        ];
        feed.shapes.insert(
            RouteIdentifier::new("r1"),
            vec![LineString::from(vec![(144.95, -37.81), (144.96, -37.81), (144.97, -37.81)])],
        );
        // Closer to the query point, but a different line
        feed.shapes.insert(
            RouteIdentifier::new("r2"),
            vec![LineString::from(vec![(144.9651, -37.8101), (144.9651, -37.80)])],
        );

        let network = StaticNetwork::from_feed(&feed);
        let position = Coord { x: 144.965, y: -37.81 };

        let (start, end) = network
            .nearest_route_segment(&RouteIdentifier::new("r1"), VehicleClass::Tram, "96", position)
            .unwrap();
        assert_eq!(start, Coord { x: 144.96, y: -37.81 });
        assert_eq!(end, Coord { x: 144.97, y: -37.81 });

        assert!(network
            .nearest_route_segment(&RouteIdentifier::new("nope"), VehicleClass::Tram, "nope", position)
            .is_none());
    }

    #[test]
    fn test_line_name_match_stays_within_class() {
        let mut feed = StaticFeed::default();
        feed.routes = vec![
            row("tram96", VehicleClass::Tram, "96", None),
            row("bus96", VehicleClass::Bus, "96", None),
        ];
        // Tram runs east, the bus with the same number runs north right beside it
        feed.shapes.insert(
            RouteIdentifier::new("tram96"),
            vec![LineString::from(vec![(144.95, -37.81), (144.96, -37.81), (144.97, -37.81)])],
        );
        feed.shapes.insert(
            RouteIdentifier::new("bus96"),
            vec![LineString::from(vec![(144.965, -37.8101), (144.965, -37.80)])],
        );

        let network = StaticNetwork::from_feed(&feed);
        let position = Coord { x: 144.965, y: -37.81 };
        let unknown = RouteIdentifier::new("unlisted");

        let (start, end) = network
            .nearest_route_segment(&unknown, VehicleClass::Tram, "96", position)
            .unwrap();
        assert_eq!(compass_bearing(start, end).map(f64::round), Some(90.0));

        let (start, end) = network
            .nearest_route_segment(&unknown, VehicleClass::Bus, "96", position)
            .unwrap();
        assert_eq!(compass_bearing(start, end).map(f64::round), Some(0.0));

        assert_eq!(
            network.route_for_vehicle(&unknown, VehicleClass::Bus, "96").map(|r| r.id.as_str()),
            Some("bus96")
        );
        // A direct route id wins regardless of the line name
        assert_eq!(
            network
                .route_for_vehicle(&RouteIdentifier::new("tram96"), VehicleClass::Bus, "96")
                .map(|r| r.id.as_str()),
            Some("tram96")
        );
    }

    #[test]
    fn test_routes_near() {
        let mut feed = StaticFeed::default();
        feed.routes = vec![row("r1", VehicleClass::Tram, "96", None)];
        feed.shapes.insert(
            RouteIdentifier::new("r1"),
            vec![LineString::from(vec![(144.95, -37.81), (144.97, -37.81)])],
        );
        let network = StaticNetwork::from_feed(&feed);

        assert_eq!(network.routes_near(Point::new(144.96, -37.8101), 50.0).len(), 1);
        assert!(network.routes_near(Point::new(144.96, -37.80), 50.0).is_empty());
    }
}
