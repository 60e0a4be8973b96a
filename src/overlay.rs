//! GeoJSON feature partitioning and overlay layer synchronization.
//!
//! Features are bucketed by geometry kind and each bucket maps to at most one
//! source/layer pair on the map view. Updating an overlay always tears the
//! old pair down before building the new one (layer first, then source).

use geojson::{Feature, FeatureCollection, GeoJson, Value};

use crate::map::{LayerSpec, MapError, MapView, PIN_IMAGE};

/// Rendering bucket derived from a feature's geometry tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeatureKind {
    Points,
    Lines,
    Polygons,
}

impl FeatureKind {
    /// Kind of a geometry value. `GeometryCollection` belongs to no bucket.
    pub fn of(value: &Value) -> Option<FeatureKind> {
        match value {
            Value::Point(_) | Value::MultiPoint(_) => Some(FeatureKind::Points),
            Value::LineString(_) | Value::MultiLineString(_) => Some(FeatureKind::Lines),
            Value::Polygon(_) | Value::MultiPolygon(_) => Some(FeatureKind::Polygons),
            Value::GeometryCollection(_) => None,
        }
    }
}

fn kind_of(feature: &Feature) -> Option<FeatureKind> {
    feature.geometry.as_ref().and_then(|g| FeatureKind::of(&g.value))
}

/// Features of the given kind, in their original relative order.
///
/// Absent input, or input that is not a feature collection, yields an empty
/// bucket rather than an error.
pub fn features_of_kind(geojson: Option<&GeoJson>, kind: FeatureKind) -> Vec<Feature> {
    let fc = match geojson {
        Some(GeoJson::FeatureCollection(fc)) => fc,
        _ => return Vec::new(),
    };

    fc.features
        .iter()
        .filter(|f| kind_of(f) == Some(kind))
        .cloned()
        .collect()
}

/// Per-kind feature counts. `GeometryCollection` features are counted here
/// even though no bucket renders them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FeatureStats {
    pub features: usize,
    pub points: usize,
    pub lines: usize,
    pub polygons: usize,
    pub geometry_collections: usize,
}

pub fn feature_stats(geojson: Option<&GeoJson>) -> FeatureStats {
    let fc = match geojson {
        Some(GeoJson::FeatureCollection(fc)) => fc,
        _ => return FeatureStats::default(),
    };

    let mut stats = FeatureStats {
        features: fc.features.len(),
        ..FeatureStats::default()
    };

    for feature in &fc.features {
        match kind_of(feature) {
            Some(FeatureKind::Points) => stats.points += 1,
            Some(FeatureKind::Lines) => stats.lines += 1,
            Some(FeatureKind::Polygons) => stats.polygons += 1,
            None => {
                if let Some(Value::GeometryCollection(_)) =
                    feature.geometry.as_ref().map(|g| &g.value)
                {
                    stats.geometry_collections += 1;
                }
            }
        }
    }

    stats
}

/// Makes the map reflect exactly `features` under `source_name`.
///
/// The old layer is removed before the old source (a source cannot go away
/// while a layer references it), and both are gone before the new pair is
/// registered. An empty bucket just clears the overlay.
///
/// # Panics
///
/// If the bucket's kind cannot be derived; the classifier never produces
/// such a bucket, so reaching that state means caller and classifier have
/// fallen out of sync.
pub fn sync_layer(
    map: &mut MapView,
    source_name: &str,
    features: Vec<Feature>,
) -> Result<(), MapError> {
    let layer_name = format!("{source_name}-layer");

    if map.get_layer(&layer_name).is_some() {
        map.remove_layer(&layer_name)?;
    }
    if map.get_source(source_name).is_some() {
        map.remove_source(source_name)?;
    }

    if features.is_empty() {
        return Ok(());
    }

    let kind = kind_of(&features[0]);

    map.add_source(
        source_name,
        FeatureCollection {
            bbox: None,
            features,
            foreign_members: None,
        },
    )?;

    match kind {
        Some(FeatureKind::Points) => {
            let icon = map.load_marker_icon()?;
            map.add_image(PIN_IMAGE, icon)?;
            map.add_layer(LayerSpec::symbol(&layer_name, source_name, PIN_IMAGE))?;
        }
        Some(FeatureKind::Lines) => {
            map.add_layer(LayerSpec::line(&layer_name, source_name))?;
        }
        Some(FeatureKind::Polygons) => {
            map.add_layer(LayerSpec::fill(&layer_name, source_name))?;
        }
        None => panic!("unknown feature kind for layer {layer_name}"),
    }

    Ok(())
}

/// Splits a collection into the three kind buckets and synchronizes each one
/// under a kind-qualified name. Kinds absent from the new collection are
/// cleared through the empty-bucket branch of [`sync_layer`].
pub fn set_overlay(map: &mut MapView, name: &str, geojson: &GeoJson) -> Result<(), MapError> {
    let points = features_of_kind(Some(geojson), FeatureKind::Points);
    let lines = features_of_kind(Some(geojson), FeatureKind::Lines);
    let polygons = features_of_kind(Some(geojson), FeatureKind::Polygons);

    sync_layer(map, &format!("{name}-points"), points)?;
    sync_layer(map, &format!("{name}-polygons"), polygons)?;
    sync_layer(map, &format!("{name}-lines"), lines)
}
