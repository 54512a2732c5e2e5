//! Tagged union of the geometry encodings the backend hands back.
//!
//! Classification looks at the JSON shape once; each variant then has its
//! own decoder.

use std::sync::LazyLock;

use regex::Regex;

use crate::{Coordinates, ewkb};

/// Matches `POINT(lon lat)` with an optional `SRID=n;` prefix, applied to
/// upper-cased text.
static WKT_POINT: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(
        r"^\s*(?:SRID=\d+\s*;\s*)?POINT\s*\(\s*([-+]?[\d.]+(?:E[-+]?\d+)?)\s+([-+]?[\d.]+(?:E[-+]?\d+)?)\s*\)\s*$",
    )
    .map_err(|e| log::error!("Invalid WKT point pattern: {e}"))
    .ok()
});

/// A geometry value whose encoding has been identified.
#[derive(Debug, Clone, PartialEq)]
pub enum RawGeometry {
    /// Well-known text, e.g. `SRID=4326;POINT(-117.8265 33.6846)`.
    WktPoint(String),
    /// A GeoJSON geometry object with `"type": "Point"`.
    GeoJsonPoint(geojson::Geometry),
    /// Any other object carrying a `[lon, lat]` pair under `coordinates`.
    StructuredPoint([f64; 2]),
    /// Hex-encoded (E)WKB as returned for `PostGIS` geometry columns.
    EwkbPoint(Vec<u8>),
}

impl RawGeometry {
    /// Identifies the encoding of `value`, or `None` if it matches no known
    /// shape.
    #[must_use]
    pub fn classify(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::String(text) => Self::classify_text(text),
            serde_json::Value::Object(object) => {
                if object.get("type").and_then(serde_json::Value::as_str) == Some("Point") {
                    return serde_json::from_value(value.clone())
                        .ok()
                        .map(Self::GeoJsonPoint);
                }
                let pair = object.get("coordinates")?.as_array()?;
                match pair.as_slice() {
                    [lon, lat] => Some(Self::StructuredPoint([lon.as_f64()?, lat.as_f64()?])),
                    _ => None,
                }
            }
            _ => None,
        }
    }

    fn classify_text(text: &str) -> Option<Self> {
        if text.to_ascii_uppercase().contains("POINT") {
            return Some(Self::WktPoint(text.to_string()));
        }
        if text.len() >= ewkb::MIN_POINT_HEX_LEN && text.bytes().all(|b| b.is_ascii_hexdigit()) {
            return hex::decode(text).ok().map(Self::EwkbPoint);
        }
        None
    }

    /// Decodes this geometry into coordinates.
    ///
    /// Values that parse but fall outside the valid WGS84 range decode to
    /// `None`.
    #[must_use]
    pub fn decode(&self) -> Option<Coordinates> {
        match self {
            Self::WktPoint(text) => decode_wkt(text),
            Self::GeoJsonPoint(geometry) => decode_geojson(geometry),
            Self::StructuredPoint([lon, lat]) => Coordinates::new(*lat, *lon).ok(),
            Self::EwkbPoint(bytes) => ewkb::decode_point(bytes),
        }
    }
}

fn decode_wkt(text: &str) -> Option<Coordinates> {
    let text = text.to_ascii_uppercase();
    let captures = WKT_POINT.as_ref()?.captures(&text)?;
    let lon: f64 = captures.get(1)?.as_str().parse().ok()?;
    let lat: f64 = captures.get(2)?.as_str().parse().ok()?;
    Coordinates::new(lat, lon).ok()
}

fn decode_geojson(geometry: &geojson::Geometry) -> Option<Coordinates> {
    match &geometry.value {
        geojson::Value::Point(position) => {
            let lon = *position.first()?;
            let lat = *position.get(1)?;
            Coordinates::new(lat, lon).ok()
        }
        _ => None,
    }
}
