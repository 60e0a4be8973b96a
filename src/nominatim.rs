//! Geocoding through the public Nominatim instance.

use geojson::GeoJson;

pub const NOMINATIM_URL: &str = "https://nominatim.openstreetmap.org/search";

#[derive(Debug, Clone)]
pub struct SearchParams<'a> {
    pub query: &'a str,
    /// Ask for full polygon outlines instead of just center points.
    pub polygon_geojson: bool,
    /// Restrict results to a `[west, south, east, north]` view box.
    pub viewbox: Option<[f64; 4]>,
}

impl<'a> SearchParams<'a> {
    pub fn new(query: &'a str) -> Self {
        SearchParams {
            query,
            polygon_geojson: true,
            viewbox: None,
        }
    }
}

/// Geocodes a free-form query, returning the results as a GeoJSON feature
/// collection. Nominatim's usage policy requires an identifying User-Agent.
pub async fn search(params: &SearchParams<'_>) -> reqwest::Result<GeoJson> {
    let mut request = reqwest::Client::new()
        .get(NOMINATIM_URL)
        .query(&[("q", params.query), ("format", "geojson")])
        .header(
            reqwest::header::USER_AGENT,
            format!("overmap/{}", env!("CARGO_PKG_VERSION")),
        );

    if params.polygon_geojson {
        request = request.query(&[("polygon_geojson", "1")]);
    }
    if let Some([w, s, e, n]) = params.viewbox {
        request = request.query(&[
            ("viewbox", format!("{w},{s},{e},{n}")),
            ("bounded", "1".to_string()),
        ]);
    }

    request.send().await?.error_for_status()?.json().await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn geojson_response_decodes() {
        // trimmed from a live format=geojson&polygon_geojson=1 response
        let body = r#"{
            "type": "FeatureCollection",
            "licence": "Data © OpenStreetMap contributors, ODbL 1.0",
            "features": [{
                "type": "Feature",
                "properties": {
                    "place_id": 115462575,
                    "osm_type": "relation",
                    "osm_id": 71525,
                    "display_name": "Paris, Île-de-France, France",
                    "category": "boundary",
                    "type": "administrative",
                    "importance": 0.88
                },
                "bbox": [2.224, 48.815, 2.469, 48.902],
                "geometry": {
                    "type": "Polygon",
                    "coordinates": [[[2.224, 48.854], [2.25, 48.88], [2.3, 48.9], [2.224, 48.854]]]
                }
            }]
        }"#;

        let geojson: GeoJson = body.parse().unwrap();
        match geojson {
            GeoJson::FeatureCollection(fc) => {
                assert_eq!(fc.features.len(), 1);
                assert_eq!(
                    fc.features[0].property("display_name").and_then(|v| v.as_str()),
                    Some("Paris, Île-de-France, France")
                );
            }
            other => panic!("expected a feature collection, got {other:?}"),
        }
    }

    #[test]
    fn default_params_ask_for_polygons() {
        let params = SearchParams::new("paris");
        assert!(params.polygon_geojson);
        assert!(params.viewbox.is_none());
    }
}
