//! GeoJSON export of routes and rendered frames.

use geo::{LineString, Polygon};
use geojson::{Feature, FeatureCollection, GeoJson, Geometry, Value};
use livetrack_transit::{RouteRecord, StaticNetwork};
use serde_json::{Map, json};

use crate::offset::RouteOffsetDiagnostic;
use crate::render::{RenderFrame, VehicleFootprint};

fn line_to_geojson(line: &LineString) -> Value {
    Value::LineString(line.0.iter().map(|c| vec![c.x, c.y]).collect())
}

fn polygon_to_geojson(poly: &Polygon) -> Value {
    let mut rings = vec![poly.exterior().0.iter().map(|c| vec![c.x, c.y]).collect::<Vec<_>>()];

    for interior in poly.interiors() {
        rings.push(interior.0.iter().map(|c| vec![c.x, c.y]).collect());
    }

    Value::Polygon(rings)
}

fn feature(value: Value, properties: Map<String, serde_json::Value>) -> Feature {
    Feature {
        bbox: None,
        geometry: Some(Geometry::new(value)),
        id: None,
        properties: Some(properties),
        foreign_members: None,
    }
}

pub fn route_feature(route: &RouteRecord) -> Feature {
    let mut properties = Map::new();
    properties.insert("kind".to_string(), json!("route"));
    properties.insert("route_id".to_string(), json!(route.id.as_str()));
    properties.insert("class".to_string(), json!(route.class.as_str()));
    properties.insert("short_name".to_string(), json!(&*route.short_name));
    properties.insert("long_name".to_string(), json!(&*route.long_name));
    properties.insert("color".to_string(), json!(format!("#{}", route.color.to_hex())));
    properties.insert("offset_m".to_string(), json!(route.offset_m));
    properties.insert("shape_variations".to_string(), json!(route.shape_variations));

    feature(line_to_geojson(&route.geometry), properties)
}

pub fn footprint_feature(footprint: &VehicleFootprint) -> Feature {
    let mut properties = Map::new();
    properties.insert("kind".to_string(), json!("vehicle"));
    properties.insert("trip_id".to_string(), json!(footprint.trip_id.as_str()));
    properties.insert("vehicle_id".to_string(), json!(footprint.vehicle_id.as_str()));
    properties.insert("route_id".to_string(), json!(footprint.route_id.as_str()));
    properties.insert("class".to_string(), json!(footprint.class.as_str()));
    properties.insert("line_name".to_string(), json!(&*footprint.line_name));
    properties.insert("color".to_string(), json!(format!("#{}", footprint.color.to_hex())));
    properties.insert("raw_bearing".to_string(), json!(footprint.raw_bearing));
    properties.insert("bearing".to_string(), json!(footprint.bearing));

    feature(polygon_to_geojson(&footprint.polygon), properties)
}

/// Routes of `network` followed by the footprints of `frame`
pub fn snapshot_collection(network: &StaticNetwork, frame: Option<&RenderFrame>) -> FeatureCollection {
    let routes = network.routes().iter().map(|route| route_feature(route));
    let vehicles = frame
        .into_iter()
        .flat_map(|frame| frame.footprints.iter().map(footprint_feature));

    FeatureCollection {
        bbox: None,
        features: routes.chain(vehicles).collect(),
        foreign_members: None,
    }
}

/// Offset diagnostics as a foreign member, so they travel with the map data
pub fn with_diagnostics(mut collection: FeatureCollection, diagnostics: &[RouteOffsetDiagnostic]) -> FeatureCollection {
    let entries: Vec<_> = diagnostics
        .iter()
        .map(|d| {
            json!({
                "route_id": d.route_id.as_str(),
                "short_name": &*d.short_name,
                "offset_m": d.resolved_offset_m,
                "shared_segments": d.shared_segments,
                "status": <&'static str>::from(d.status),
            })
        })
        .collect();

    collection
        .foreign_members
        .get_or_insert_with(Map::new)
        .insert("offset_diagnostics".to_string(), json!(entries));
    collection
}

pub fn to_geojson_string(collection: FeatureCollection) -> serde_json::Result<String> {
    serde_json::to_string_pretty(&GeoJson::from(collection))
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::Coord;
    use livetrack_transit::{RouteIdentifier, RouteRow, StaticFeed, VehicleClass};

    fn network() -> StaticNetwork {
        let mut feed = StaticFeed::default();
        feed.routes.push(RouteRow {
            id: RouteIdentifier::new("R1"),
            class: VehicleClass::Tram,
            short_name: "1".into(),
            long_name: "East Coburg - South Melbourne Beach".into(),
            color: Some("78BE20".into()),
            text_color: None,
        });
        feed.shapes.insert(
            RouteIdentifier::new("R1"),
            vec![LineString::from(vec![(144.95, -37.81), (144.97, -37.81)])],
        );
        StaticNetwork::from_feed(&feed)
    }

    #[test]
    fn test_route_feature_properties() {
        let network = network();
        let collection = snapshot_collection(&network, None);

        assert_eq!(collection.features.len(), 1);
        let feature = &collection.features[0];
        assert_eq!(feature.property("color"), Some(&json!("#78BE20")));
        assert_eq!(feature.property("short_name"), Some(&json!("1")));

        match &feature.geometry.as_ref().unwrap().value {
            Value::LineString(points) => assert_eq!(points.len(), 2),
            other => panic!("Expected LineString, got {other:?}"),
        }
    }

    #[test]
    fn test_polygon_ring_is_closed() {
        let poly = Polygon::new(
            LineString::new(vec![
                Coord { x: 0.0, y: 0.0 },
                Coord { x: 1.0, y: 0.0 },
                Coord { x: 1.0, y: 1.0 },
            ]),
            vec![],
        );

        match polygon_to_geojson(&poly) {
            Value::Polygon(rings) => {
                assert_eq!(rings.len(), 1);
                assert_eq!(rings[0].first(), rings[0].last());
            }
            _ => panic!("Expected Polygon value"),
        }
    }

    #[test]
    fn test_diagnostics_travel_as_foreign_member() {
        let network = network();
        let collection = with_diagnostics(snapshot_collection(&network, None), &[]);
        let text = to_geojson_string(collection).unwrap();

        assert!(text.contains("\"offset_diagnostics\""));
        assert!(text.contains("\"FeatureCollection\""));
    }
}
