//! In-process model of the basemap surface: named GeoJSON sources, styled
//! layers drawing from them, registered images and a one-way readiness flag.

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};

use geojson::FeatureCollection;

/// Name under which the point marker image is registered.
pub const PIN_IMAGE: &str = "pin";

const DEFAULT_MARKER_ICON: &str = "assets/pin-marker.png";

#[derive(Debug, thiserror::Error)]
pub enum MapError {
    #[error("map is not ready yet")]
    NotReady,
    #[error("source {0:?} already exists")]
    DuplicateSource(String),
    #[error("layer {0:?} already exists")]
    DuplicateLayer(String),
    #[error("no such source {0:?}")]
    NoSuchSource(String),
    #[error("no such layer {0:?}")]
    NoSuchLayer(String),
    #[error("source {source_name:?} is still referenced by layer {layer:?}")]
    SourceInUse { source_name: String, layer: String },
    #[error("layer {layer:?} references missing source {source_name:?}")]
    MissingSource { layer: String, source_name: String },
    #[error("failed to load marker icon {path:?}")]
    Icon {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// How a layer draws the features of its source.
#[derive(Debug, Clone, PartialEq)]
pub enum LayerStyle {
    /// Icon placed at each point. The pixel offset lifts the icon so the pin
    /// tip touches the coordinate.
    Symbol { icon: String, offset: [f64; 2] },
    /// Stroke with round caps and joins.
    Line { color: String, width: f64 },
    /// Semi-transparent fill with a contrasting outline.
    Fill {
        color: String,
        outline: String,
        opacity: f64,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct LayerSpec {
    pub id: String,
    pub source: String,
    pub style: LayerStyle,
}

impl LayerSpec {
    pub fn symbol(id: &str, source: &str, icon: &str) -> Self {
        LayerSpec {
            id: id.to_string(),
            source: source.to_string(),
            style: LayerStyle::Symbol {
                icon: icon.to_string(),
                offset: [0.0, -15.0],
            },
        }
    }

    pub fn line(id: &str, source: &str) -> Self {
        LayerSpec {
            id: id.to_string(),
            source: source.to_string(),
            style: LayerStyle::Line {
                color: "#5555bb".to_string(),
                width: 4.0,
            },
        }
    }

    pub fn fill(id: &str, source: &str) -> Self {
        LayerSpec {
            id: id.to_string(),
            source: source.to_string(),
            style: LayerStyle::Fill {
                color: "#927792".to_string(),
                outline: "#d27070".to_string(),
                opacity: 0.7,
            },
        }
    }
}

/// The single shared mutable map resource. Layer order is draw order.
///
/// Mutations are rejected until [`MapView::finish_loading`] flips the
/// readiness flag; the flag never reverts short of dropping the view.
#[derive(Debug)]
pub struct MapView {
    ready: bool,
    sources: BTreeMap<String, FeatureCollection>,
    layers: Vec<LayerSpec>,
    images: BTreeMap<String, Vec<u8>>,
    marker_icon: PathBuf,
}

impl MapView {
    pub fn new() -> Self {
        MapView {
            ready: false,
            sources: BTreeMap::new(),
            layers: Vec::new(),
            images: BTreeMap::new(),
            marker_icon: PathBuf::from(DEFAULT_MARKER_ICON),
        }
    }

    pub fn finish_loading(&mut self) {
        self.ready = true;
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    fn ensure_ready(&self) -> Result<(), MapError> {
        if self.ready {
            Ok(())
        } else {
            Err(MapError::NotReady)
        }
    }

    pub fn add_source(&mut self, name: &str, data: FeatureCollection) -> Result<(), MapError> {
        self.ensure_ready()?;

        if self.sources.contains_key(name) {
            return Err(MapError::DuplicateSource(name.to_string()));
        }

        self.sources.insert(name.to_string(), data);
        Ok(())
    }

    pub fn remove_source(&mut self, name: &str) -> Result<(), MapError> {
        self.ensure_ready()?;

        if let Some(layer) = self.layers.iter().find(|l| l.source == name) {
            return Err(MapError::SourceInUse {
                source_name: name.to_string(),
                layer: layer.id.clone(),
            });
        }

        self.sources
            .remove(name)
            .map(drop)
            .ok_or_else(|| MapError::NoSuchSource(name.to_string()))
    }

    pub fn get_source(&self, name: &str) -> Option<&FeatureCollection> {
        self.sources.get(name)
    }

    pub fn add_layer(&mut self, spec: LayerSpec) -> Result<(), MapError> {
        self.ensure_ready()?;

        if self.layers.iter().any(|l| l.id == spec.id) {
            return Err(MapError::DuplicateLayer(spec.id));
        }
        if !self.sources.contains_key(&spec.source) {
            return Err(MapError::MissingSource {
                layer: spec.id,
                source_name: spec.source,
            });
        }

        self.layers.push(spec);
        Ok(())
    }

    pub fn remove_layer(&mut self, id: &str) -> Result<(), MapError> {
        self.ensure_ready()?;

        match self.layers.iter().position(|l| l.id == id) {
            Some(ix) => {
                self.layers.remove(ix);
                Ok(())
            }
            None => Err(MapError::NoSuchLayer(id.to_string())),
        }
    }

    pub fn get_layer(&self, id: &str) -> Option<&LayerSpec> {
        self.layers.iter().find(|l| l.id == id)
    }

    pub fn layers(&self) -> &[LayerSpec] {
        &self.layers
    }

    /// Registers an image, replacing any previous one with the same name.
    pub fn add_image(&mut self, name: &str, data: Vec<u8>) -> Result<(), MapError> {
        self.ensure_ready()?;
        self.images.insert(name.to_string(), data);
        Ok(())
    }

    pub fn get_image(&self, name: &str) -> Option<&[u8]> {
        self.images.get(name).map(Vec::as_slice)
    }

    pub fn set_marker_icon<P: AsRef<Path>>(&mut self, path: P) {
        self.marker_icon = path.as_ref().to_path_buf();
    }

    pub fn load_marker_icon(&self) -> Result<Vec<u8>, MapError> {
        std::fs::read(&self.marker_icon).map_err(|source| MapError::Icon {
            path: self.marker_icon.clone(),
            source,
        })
    }
}

impl Default for MapView {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty_collection() -> FeatureCollection {
        FeatureCollection {
            bbox: None,
            features: vec![],
            foreign_members: None,
        }
    }

    fn ready_map() -> MapView {
        let mut map = MapView::new();
        map.finish_loading();
        map
    }

    #[test]
    fn mutations_require_readiness() {
        let mut map = MapView::new();
        assert!(matches!(
            map.add_source("a", empty_collection()),
            Err(MapError::NotReady)
        ));
        assert!(matches!(map.remove_layer("a"), Err(MapError::NotReady)));

        map.finish_loading();
        map.add_source("a", empty_collection()).unwrap();

        // the flag only ever goes one way
        map.finish_loading();
        assert!(map.is_ready());
    }

    #[test]
    fn duplicate_source_is_rejected() {
        let mut map = ready_map();
        map.add_source("a", empty_collection()).unwrap();
        assert!(matches!(
            map.add_source("a", empty_collection()),
            Err(MapError::DuplicateSource(_))
        ));
    }

    #[test]
    fn source_cannot_be_removed_while_layer_references_it() {
        let mut map = ready_map();
        map.add_source("a", empty_collection()).unwrap();
        map.add_layer(LayerSpec::line("a-layer", "a")).unwrap();

        assert!(matches!(
            map.remove_source("a"),
            Err(MapError::SourceInUse { .. })
        ));

        map.remove_layer("a-layer").unwrap();
        map.remove_source("a").unwrap();
        assert!(map.get_source("a").is_none());
    }

    #[test]
    fn layer_requires_existing_source() {
        let mut map = ready_map();
        assert!(matches!(
            map.add_layer(LayerSpec::fill("a-layer", "a")),
            Err(MapError::MissingSource { .. })
        ));
    }

    #[test]
    fn removing_missing_names_errors() {
        let mut map = ready_map();
        assert!(matches!(
            map.remove_source("nope"),
            Err(MapError::NoSuchSource(_))
        ));
        assert!(matches!(
            map.remove_layer("nope"),
            Err(MapError::NoSuchLayer(_))
        ));
    }

    #[test]
    fn image_registration_replaces() {
        let mut map = ready_map();
        map.add_image("pin", vec![1]).unwrap();
        map.add_image("pin", vec![2]).unwrap();
        assert_eq!(map.get_image("pin"), Some(&[2u8][..]));
    }
}
