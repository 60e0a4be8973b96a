//! SVG export of the map view, the screenshot path of the shell.

use std::fs;
use std::io::{self, Write};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use geojson::Value;

use crate::map::{LayerStyle, MapView};

/// Earth radius in meters.
const EARTH_RADIUS: f64 = 6378137.0;

/// Rendered size of the marker icon in pixels.
const ICON_SIZE: f64 = 30.0;

pub fn to_xy(lon: f64, lat: f64) -> (f64, f64) {
    // https://wiki.openstreetmap.org/wiki/Mercator

    use std::f64::consts::FRAC_PI_4;

    let x = lon.to_radians() * EARTH_RADIUS;
    let y = f64::ln(f64::tan(lat.to_radians() / 2.0 + FRAC_PI_4)) * EARTH_RADIUS;

    (x, y)
}

fn for_each_position(value: &Value, f: &mut impl FnMut(&[f64])) {
    match value {
        Value::Point(p) => f(p),
        Value::MultiPoint(ps) | Value::LineString(ps) => {
            for p in ps {
                f(p);
            }
        }
        Value::MultiLineString(lines) | Value::Polygon(lines) => {
            for line in lines {
                for p in line {
                    f(p);
                }
            }
        }
        Value::MultiPolygon(polygons) => {
            for rings in polygons {
                for ring in rings {
                    for p in ring {
                        f(p);
                    }
                }
            }
        }
        Value::GeometryCollection(geometries) => {
            for g in geometries {
                for_each_position(&g.value, f);
            }
        }
    }
}

struct Projector {
    min_x: f64,
    min_y: f64,
    sf: f64,
}

impl Projector {
    /// Fits everything reachable from the map's layers into `w`×`h` pixels.
    /// Returns the projector plus the scaled extent, or `None` for an empty
    /// view.
    fn fit(map: &MapView, (w, h): (f64, f64)) -> Option<(Projector, f64, f64)> {
        use std::f64::{INFINITY, NEG_INFINITY};

        let mut min_x = INFINITY;
        let mut min_y = INFINITY;
        let mut max_x = NEG_INFINITY;
        let mut max_y = NEG_INFINITY;

        for layer in map.layers() {
            let fc = match map.get_source(&layer.source) {
                Some(fc) => fc,
                None => continue,
            };

            for feature in &fc.features {
                if let Some(g) = &feature.geometry {
                    for_each_position(&g.value, &mut |p| {
                        let (x, y) = to_xy(p[0], p[1]);
                        let y = -y;

                        min_x = x.min(min_x);
                        min_y = y.min(min_y);
                        max_x = x.max(max_x);
                        max_y = y.max(max_y);
                    });
                }
            }
        }

        if min_x > max_x || min_y > max_y {
            return None;
        }

        let sf = f64::min(w / (max_x - min_x), h / (max_y - min_y));
        // a single marker has no extent to scale
        let sf = if sf.is_finite() { sf } else { 1.0 };

        let projector = Projector { min_x, min_y, sf };
        Some((projector, (max_x - min_x) * sf, (max_y - min_y) * sf))
    }

    fn project(&self, p: &[f64]) -> (f64, f64) {
        let (x, y) = to_xy(p[0], p[1]);
        ((x - self.min_x) * self.sf, (-y - self.min_y) * self.sf)
    }
}

fn ring_path(d: &mut String, ring: &[Vec<f64>], projector: &Projector) {
    for (i, p) in ring.iter().enumerate() {
        let (x, y) = projector.project(p);
        let op = if i == 0 { 'M' } else { 'L' };
        d.push_str(&format!("{op}{x:.2},{y:.2} "));
    }
    d.push('Z');
}

fn polyline_points(line: &[Vec<f64>], projector: &Projector) -> String {
    let mut points = String::new();
    for p in line {
        let (x, y) = projector.project(p);
        points.push_str(&format!("{x:.2},{y:.2} "));
    }
    points
}

/// Writes the map view as an SVG screenshot, layers in draw order. An empty
/// view writes nothing.
pub fn dump_svg(
    path: &str,
    (w, h): (f64, f64),
    background_color: &str,
    map: &MapView,
) -> io::Result<()> {
    let (projector, vw, vh) = match Projector::fit(map, (w, h)) {
        Some(fit) => fit,
        None => return Ok(()),
    };

    let f = fs::File::create(path)?;
    let mut f = io::BufWriter::new(f);

    writeln!(
        f,
        r#"<?xml version="1.0" encoding="UTF-8"?>
<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 {vw:.2} {vh:.2}">
<rect x="0" y="0" width="{vw:.2}" height="{vh:.2}" fill="{background_color}" stroke="none"/>"#,
    )?;

    for layer in map.layers() {
        let fc = match map.get_source(&layer.source) {
            Some(fc) => fc,
            None => continue,
        };

        match &layer.style {
            LayerStyle::Fill {
                color,
                outline,
                opacity,
            } => {
                writeln!(
                    f,
                    r#"<g fill="{color}" fill-opacity="{opacity}" stroke="{outline}" fill-rule="evenodd">"#,
                )?;
                for feature in &fc.features {
                    let value = match &feature.geometry {
                        Some(g) => &g.value,
                        None => continue,
                    };

                    let mut d = String::new();
                    match value {
                        Value::Polygon(rings) => {
                            for ring in rings {
                                ring_path(&mut d, ring, &projector);
                            }
                        }
                        Value::MultiPolygon(polygons) => {
                            for rings in polygons {
                                for ring in rings {
                                    ring_path(&mut d, ring, &projector);
                                }
                            }
                        }
                        _ => continue,
                    }
                    writeln!(f, r#"<path d="{}" />"#, d.trim_end())?;
                }
                writeln!(f, "</g>")?;
            }

            LayerStyle::Line { color, width } => {
                writeln!(
                    f,
                    r#"<g stroke="{color}" stroke-width="{width}" stroke-linecap="round" stroke-linejoin="round" fill="none">"#,
                )?;
                for feature in &fc.features {
                    let value = match &feature.geometry {
                        Some(g) => &g.value,
                        None => continue,
                    };

                    match value {
                        Value::LineString(line) => {
                            writeln!(
                                f,
                                r#"<polyline points="{}" />"#,
                                polyline_points(line, &projector).trim_end()
                            )?;
                        }
                        Value::MultiLineString(lines) => {
                            for line in lines {
                                writeln!(
                                    f,
                                    r#"<polyline points="{}" />"#,
                                    polyline_points(line, &projector).trim_end()
                                )?;
                            }
                        }
                        _ => continue,
                    }
                }
                writeln!(f, "</g>")?;
            }

            LayerStyle::Symbol { icon, offset } => {
                let href = match map.get_image(icon) {
                    Some(bytes) => format!("data:image/png;base64,{}", BASE64.encode(bytes)),
                    None => continue,
                };

                let mut place = |f: &mut io::BufWriter<fs::File>, p: &[f64]| -> io::Result<()> {
                    let (px, py) = projector.project(p);
                    let x = px - ICON_SIZE / 2.0 + offset[0];
                    let y = py - ICON_SIZE / 2.0 + offset[1];
                    writeln!(
                        f,
                        r#"<image x="{x:.2}" y="{y:.2}" width="{ICON_SIZE}" height="{ICON_SIZE}" href="{href}" />"#,
                    )
                };

                for feature in &fc.features {
                    let value = match &feature.geometry {
                        Some(g) => &g.value,
                        None => continue,
                    };

                    match value {
                        Value::Point(p) => place(&mut f, p)?,
                        Value::MultiPoint(ps) => {
                            for p in ps {
                                place(&mut f, p)?;
                            }
                        }
                        _ => continue,
                    }
                }
            }
        }
    }

    writeln!(f, "</svg>")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::overlay::sync_layer;
    use geojson::{Feature, Geometry};

    fn feature(value: Value) -> Feature {
        Feature {
            bbox: None,
            geometry: Some(Geometry::new(value)),
            id: None,
            properties: None,
            foreign_members: None,
        }
    }

    fn populated_map() -> (MapView, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let icon = dir.path().join("pin-marker.png");
        std::fs::write(&icon, b"\x89PNG\r\n\x1a\n").unwrap();

        let mut map = MapView::new();
        map.set_marker_icon(&icon);
        map.finish_loading();

        sync_layer(
            &mut map,
            "x-polygons",
            vec![feature(Value::Polygon(vec![vec![
                vec![2.0, 48.0],
                vec![2.5, 48.0],
                vec![2.5, 48.5],
                vec![2.0, 48.0],
            ]]))],
        )
        .unwrap();
        sync_layer(
            &mut map,
            "x-lines",
            vec![feature(Value::LineString(vec![
                vec![2.0, 48.0],
                vec![2.5, 48.5],
            ]))],
        )
        .unwrap();
        sync_layer(&mut map, "x-points", vec![feature(Value::Point(vec![2.2, 48.2]))]).unwrap();

        (map, dir)
    }

    #[test]
    fn export_styles_every_layer_kind() {
        let (map, dir) = populated_map();
        let path = dir.path().join("screenshot.svg");

        dump_svg(path.to_str().unwrap(), (800.0, 600.0), "none", &map).unwrap();

        let svg = std::fs::read_to_string(&path).unwrap();
        assert!(svg.contains(r#"fill-rule="evenodd""#));
        assert!(svg.contains(r#"fill-opacity="0.7""#));
        assert!(svg.contains(r#"stroke-linecap="round""#));
        assert!(svg.contains(r#"stroke-linejoin="round""#));
        assert!(svg.contains("data:image/png;base64,"));
        assert!(svg.contains("<polyline"));
    }

    #[test]
    fn empty_view_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("screenshot.svg");

        let mut map = MapView::new();
        map.finish_loading();

        dump_svg(path.to_str().unwrap(), (800.0, 600.0), "none", &map).unwrap();
        assert!(!path.exists());
    }
}
