//! Overpass interpreter client and OSM element to GeoJSON conversion.

use std::collections::BTreeMap;

use geojson::{feature::Id, Feature, FeatureCollection, GeoJson, Geometry, JsonObject, Value};
use serde::{Deserialize, Serialize};

pub const OVERPASS_URL: &str = "https://overpass-api.de/api/interpreter";

// Tag keys whose presence marks a closed way as an area rather than a loop
// road. An explicit area=no wins either way.
const AREA_KEYS: [&str; 7] = [
    "building", "landuse", "natural", "leisure", "amenity", "tourism", "boundary",
];

#[derive(Serialize, Deserialize)]
struct OverpassForm {
    data: String,
}

#[derive(Debug, Deserialize)]
pub struct OverpassResponse {
    pub elements: Vec<OverpassElement>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum OverpassElement {
    Node {
        id: i64,
        lat: f64,
        lon: f64,
        #[serde(default)]
        tags: BTreeMap<String, String>,
    },
    Way {
        id: i64,
        #[serde(default)]
        geometry: Vec<LatLon>,
        #[serde(default)]
        tags: BTreeMap<String, String>,
    },
    Relation {
        id: i64,
        #[serde(default)]
        members: Vec<OverpassMember>,
        #[serde(default)]
        tags: BTreeMap<String, String>,
    },
}

#[derive(Debug, Deserialize)]
pub struct OverpassMember {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(rename = "ref")]
    pub id: i64,
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub geometry: Vec<LatLon>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct LatLon {
    pub lat: f64,
    pub lon: f64,
}

impl LatLon {
    fn position(&self) -> Vec<f64> {
        vec![self.lon, self.lat]
    }
}

/// Runs an Overpass QL query, passed verbatim; the caller (or the translation
/// step) is responsible for `[out:json]` framing.
pub async fn run_query(query: &str) -> reqwest::Result<OverpassResponse> {
    log::debug!("running overpass query: {query}");

    reqwest::Client::new()
        .post(OVERPASS_URL)
        .form(&OverpassForm {
            data: query.to_string(),
        })
        .send()
        .await?
        .error_for_status()?
        .json()
        .await
}

/// Converts an Overpass response into a GeoJSON feature collection.
///
/// Tagged nodes become points, ways become lines or area polygons, and
/// multipolygon relations become multi-polygons. Untagged elements are the
/// skeleton output of `>; out skel qt;` recursion and are skipped.
pub fn to_geojson(response: OverpassResponse) -> GeoJson {
    let mut features = Vec::new();

    for element in response.elements {
        let converted = match element {
            OverpassElement::Node { id, lat, lon, tags } => {
                Some((format!("node/{id}"), Value::Point(vec![lon, lat]), tags))
            }
            OverpassElement::Way { id, geometry, tags } => {
                way_value(&geometry, &tags).map(|v| (format!("way/{id}"), v, tags))
            }
            OverpassElement::Relation { id, members, tags } => {
                relation_value(&members, &tags).map(|v| (format!("relation/{id}"), v, tags))
            }
        };

        let (id, value, tags) = match converted {
            Some(c) => c,
            None => continue,
        };
        if tags.is_empty() {
            continue;
        }

        features.push(Feature {
            bbox: None,
            geometry: Some(Geometry::new(value)),
            id: Some(Id::String(id)),
            properties: Some(tag_properties(tags)),
            foreign_members: None,
        });
    }

    GeoJson::FeatureCollection(FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    })
}

fn tag_properties(tags: BTreeMap<String, String>) -> JsonObject {
    let mut properties = JsonObject::new();
    for (key, value) in tags {
        properties.insert(key, serde_json::Value::String(value));
    }
    properties
}

fn is_area(tags: &BTreeMap<String, String>) -> bool {
    match tags.get("area").map(String::as_str) {
        Some("no") => false,
        Some(_) => true,
        None => AREA_KEYS.iter().any(|key| tags.contains_key(*key)),
    }
}

fn way_value(geometry: &[LatLon], tags: &BTreeMap<String, String>) -> Option<Value> {
    if geometry.len() < 2 {
        return None;
    }

    let ring: Vec<Vec<f64>> = geometry.iter().map(LatLon::position).collect();
    let closed = ring.len() >= 4 && ring.first() == ring.last();

    if closed && is_area(tags) {
        Some(Value::Polygon(vec![ring]))
    } else {
        Some(Value::LineString(ring))
    }
}

fn relation_value(members: &[OverpassMember], tags: &BTreeMap<String, String>) -> Option<Value> {
    let rings = |role: &str| -> Vec<Vec<Vec<f64>>> {
        members
            .iter()
            .filter(|m| m.kind == "way" && m.role == role && m.geometry.len() >= 2)
            .map(|m| m.geometry.iter().map(LatLon::position).collect())
            .collect()
    };

    if tags.get("type").map(String::as_str) == Some("multipolygon") {
        let outers = rings("outer");
        if outers.is_empty() {
            return None;
        }

        let mut polygons: Vec<Vec<Vec<Vec<f64>>>> = outers.into_iter().map(|r| vec![r]).collect();
        // inner rings are not matched to their enclosing outer ring; they all
        // attach to the first polygon
        for inner in rings("inner") {
            polygons[0].push(inner);
        }

        return Some(Value::MultiPolygon(polygons));
    }

    // route-like relations: every member geometry becomes one line
    let lines: Vec<Vec<Vec<f64>>> = members
        .iter()
        .filter(|m| m.kind == "way" && m.geometry.len() >= 2)
        .map(|m| m.geometry.iter().map(LatLon::position).collect())
        .collect();

    if lines.is_empty() {
        None
    } else {
        Some(Value::MultiLineString(lines))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn convert(json: &str) -> Vec<Feature> {
        let response: OverpassResponse = serde_json::from_str(json).unwrap();
        match to_geojson(response) {
            GeoJson::FeatureCollection(fc) => fc.features,
            other => panic!("expected a feature collection, got {other:?}"),
        }
    }

    #[test]
    fn tagged_node_becomes_point() {
        let features = convert(
            r#"{"elements": [
                {"type": "node", "id": 42, "lat": 48.86, "lon": 2.35,
                 "tags": {"tourism": "museum", "name": "Louvre"}}
            ]}"#,
        );

        assert_eq!(features.len(), 1);
        assert_eq!(features[0].id, Some(Id::String("node/42".to_string())));
        assert!(matches!(
            &features[0].geometry.as_ref().unwrap().value,
            Value::Point(p) if p == &vec![2.35, 48.86]
        ));
        assert_eq!(
            features[0].property("name").and_then(|v| v.as_str()),
            Some("Louvre")
        );
    }

    #[test]
    fn untagged_skeleton_elements_are_skipped() {
        let features = convert(
            r#"{"elements": [
                {"type": "node", "id": 1, "lat": 0.0, "lon": 0.0},
                {"type": "node", "id": 2, "lat": 1.0, "lon": 1.0}
            ]}"#,
        );
        assert!(features.is_empty());
    }

    #[test]
    fn open_way_becomes_line_string() {
        let features = convert(
            r#"{"elements": [
                {"type": "way", "id": 7, "tags": {"highway": "residential"},
                 "geometry": [{"lat": 0.0, "lon": 0.0}, {"lat": 0.0, "lon": 1.0}]}
            ]}"#,
        );

        assert_eq!(features[0].id, Some(Id::String("way/7".to_string())));
        assert!(matches!(
            &features[0].geometry.as_ref().unwrap().value,
            Value::LineString(ps) if ps.len() == 2
        ));
    }

    #[test]
    fn closed_area_way_becomes_polygon() {
        let features = convert(
            r#"{"elements": [
                {"type": "way", "id": 9, "tags": {"building": "yes"},
                 "geometry": [
                    {"lat": 0.0, "lon": 0.0}, {"lat": 0.0, "lon": 1.0},
                    {"lat": 1.0, "lon": 1.0}, {"lat": 0.0, "lon": 0.0}
                 ]}
            ]}"#,
        );

        assert!(matches!(
            &features[0].geometry.as_ref().unwrap().value,
            Value::Polygon(rings) if rings.len() == 1 && rings[0].len() == 4
        ));
    }

    #[test]
    fn area_no_forces_closed_way_to_line() {
        let features = convert(
            r#"{"elements": [
                {"type": "way", "id": 9, "tags": {"building": "yes", "area": "no"},
                 "geometry": [
                    {"lat": 0.0, "lon": 0.0}, {"lat": 0.0, "lon": 1.0},
                    {"lat": 1.0, "lon": 1.0}, {"lat": 0.0, "lon": 0.0}
                 ]}
            ]}"#,
        );

        assert!(matches!(
            &features[0].geometry.as_ref().unwrap().value,
            Value::LineString(_)
        ));
    }

    #[test]
    fn multipolygon_relation_keeps_inner_rings_as_holes() {
        let features = convert(
            r#"{"elements": [
                {"type": "relation", "id": 3,
                 "tags": {"type": "multipolygon", "landuse": "forest"},
                 "members": [
                    {"type": "way", "ref": 10, "role": "outer",
                     "geometry": [
                        {"lat": 0.0, "lon": 0.0}, {"lat": 0.0, "lon": 4.0},
                        {"lat": 4.0, "lon": 4.0}, {"lat": 0.0, "lon": 0.0}
                     ]},
                    {"type": "way", "ref": 11, "role": "inner",
                     "geometry": [
                        {"lat": 1.0, "lon": 1.0}, {"lat": 1.0, "lon": 2.0},
                        {"lat": 2.0, "lon": 2.0}, {"lat": 1.0, "lon": 1.0}
                     ]}
                 ]}
            ]}"#,
        );

        assert_eq!(features[0].id, Some(Id::String("relation/3".to_string())));
        assert!(matches!(
            &features[0].geometry.as_ref().unwrap().value,
            Value::MultiPolygon(polygons) if polygons.len() == 1 && polygons[0].len() == 2
        ));
    }

    #[test]
    fn degenerate_way_is_dropped() {
        let features = convert(
            r#"{"elements": [
                {"type": "way", "id": 9, "tags": {"highway": "residential"},
                 "geometry": [{"lat": 0.0, "lon": 0.0}]}
            ]}"#,
        );
        assert!(features.is_empty());
    }
}
