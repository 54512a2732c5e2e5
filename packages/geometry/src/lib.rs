#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Point geometry codec for report locations.
//!
//! Report locations are persisted in whatever geometry encoding the backend
//! uses natively. This crate translates between raw latitude/longitude input
//! and that storage representation:
//!
//! - [`encode`] validates a coordinate pair and asks a [`PointEncoder`] (the
//!   backend's `create_point` procedure) to build the storage token.
//! - [`decode`] parses any of the encodings observed coming back from the
//!   backend into [`Coordinates`], returning `None` for anything it does not
//!   recognize so callers can render "no location" instead of failing.

pub mod ewkb;
pub mod raw;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use raw::RawGeometry;

/// Spatial reference identifier for WGS84 longitude/latitude.
pub const WGS84_SRID: u32 = 4326;

/// Which half of a coordinate pair a value belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    /// North/south position, valid in `[-90, 90]`.
    Latitude,
    /// East/west position, valid in `[-180, 180]`.
    Longitude,
}

impl Axis {
    /// Inclusive magnitude limit for this axis.
    #[must_use]
    pub const fn limit(self) -> f64 {
        match self {
            Self::Latitude => 90.0,
            Self::Longitude => 180.0,
        }
    }
}

impl std::fmt::Display for Axis {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Latitude => "latitude",
            Self::Longitude => "longitude",
        })
    }
}

/// Errors from geometry encoding.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GeometryError {
    /// A coordinate was non-finite or outside its valid range.
    #[error("Invalid {axis}: {value} (expected a finite value within ±{})", axis.limit())]
    InvalidCoordinate {
        /// Which coordinate was rejected.
        axis: Axis,
        /// The rejected value.
        value: f64,
    },

    /// The storage collaborator failed to build a geometry token.
    #[error("Geometry encoder failed: {message}")]
    Encoder {
        /// Message reported by the encoder.
        message: String,
    },
}

/// A validated WGS84 point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    /// Latitude in degrees.
    pub latitude: f64,
    /// Longitude in degrees.
    pub longitude: f64,
}

impl Coordinates {
    /// Creates a coordinate pair, rejecting non-finite or out-of-range
    /// values.
    ///
    /// # Errors
    ///
    /// Returns [`GeometryError::InvalidCoordinate`] naming the first axis
    /// that failed validation.
    pub fn new(latitude: f64, longitude: f64) -> Result<Self, GeometryError> {
        check_axis(Axis::Latitude, latitude)?;
        check_axis(Axis::Longitude, longitude)?;
        Ok(Self {
            latitude,
            longitude,
        })
    }

    /// Returns `true` if both values are within `tolerance` of `other`.
    #[must_use]
    pub fn approx_eq(&self, other: &Self, tolerance: f64) -> bool {
        (self.latitude - other.latitude).abs() <= tolerance
            && (self.longitude - other.longitude).abs() <= tolerance
    }
}

impl std::fmt::Display for Coordinates {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.4}, {:.4}", self.latitude, self.longitude)
    }
}

fn check_axis(axis: Axis, value: f64) -> Result<(), GeometryError> {
    if value.is_finite() && value.abs() <= axis.limit() {
        Ok(())
    } else {
        Err(GeometryError::InvalidCoordinate { axis, value })
    }
}

/// Opaque backend geometry encoding, persisted as-is in the `geom` column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GeometryToken(pub serde_json::Value);

impl GeometryToken {
    /// Borrows the raw JSON value.
    #[must_use]
    pub const fn as_value(&self) -> &serde_json::Value {
        &self.0
    }

    /// Decodes this token back into coordinates.
    #[must_use]
    pub fn decode(&self) -> Option<Coordinates> {
        decode(&self.0)
    }
}

/// Builds backend geometry tokens from validated coordinates.
///
/// Implemented by the backend adapter on top of its `create_point` remote
/// procedure.
#[async_trait::async_trait]
pub trait PointEncoder: Send + Sync {
    /// Encodes the point into the backend's native geometry representation.
    ///
    /// # Errors
    ///
    /// Returns [`GeometryError::Encoder`] if the backend rejects the request.
    async fn encode_point(&self, point: Coordinates) -> Result<GeometryToken, GeometryError>;
}

/// Validates a coordinate pair and delegates encoding to `encoder`.
///
/// # Errors
///
/// Returns [`GeometryError::InvalidCoordinate`] without calling the encoder
/// if either value is invalid, or whatever error the encoder reports.
pub async fn encode(
    latitude: f64,
    longitude: f64,
    encoder: &dyn PointEncoder,
) -> Result<GeometryToken, GeometryError> {
    let point = Coordinates::new(latitude, longitude)?;
    encoder.encode_point(point).await
}

/// Decodes a stored geometry value into coordinates.
///
/// Accepts WKT (`POINT(lon lat)`, optionally `SRID=n;`-prefixed), GeoJSON
/// points, bare `{ "coordinates": [lon, lat] }` objects, and hex (E)WKB.
/// Returns `None` for any other input.
#[must_use]
pub fn decode(raw: &serde_json::Value) -> Option<Coordinates> {
    let Some(geometry) = RawGeometry::classify(raw) else {
        log::debug!("Unrecognized geometry shape: {raw}");
        return None;
    };
    geometry.decode()
}

#[cfg(test)]
mod tests {
    use super::*;

    struct WktEncoder;

    #[async_trait::async_trait]
    impl PointEncoder for WktEncoder {
        async fn encode_point(&self, point: Coordinates) -> Result<GeometryToken, GeometryError> {
            Ok(GeometryToken(serde_json::json!(format!(
                "SRID=4326;POINT({} {})",
                point.longitude, point.latitude
            ))))
        }
    }

    struct EwkbEncoder;

    #[async_trait::async_trait]
    impl PointEncoder for EwkbEncoder {
        async fn encode_point(&self, point: Coordinates) -> Result<GeometryToken, GeometryError> {
            Ok(GeometryToken(serde_json::json!(ewkb::encode_point(
                point,
                Some(WGS84_SRID)
            ))))
        }
    }

    struct FailingEncoder;

    #[async_trait::async_trait]
    impl PointEncoder for FailingEncoder {
        async fn encode_point(&self, _point: Coordinates) -> Result<GeometryToken, GeometryError> {
            Err(GeometryError::Encoder {
                message: "function create_point does not exist".to_string(),
            })
        }
    }

    #[test]
    fn rejects_out_of_range_coordinates() {
        assert_eq!(
            Coordinates::new(91.0, 0.0),
            Err(GeometryError::InvalidCoordinate {
                axis: Axis::Latitude,
                value: 91.0
            })
        );
        assert!(Coordinates::new(0.0, -180.5).is_err());
        assert!(Coordinates::new(f64::NAN, 0.0).is_err());
        assert!(Coordinates::new(0.0, f64::INFINITY).is_err());
        assert!(Coordinates::new(-90.0, 180.0).is_ok());
    }

    #[tokio::test]
    async fn encode_then_decode_recovers_pair() {
        for (lat, lon) in [(33.6846, -117.8265), (-89.5, 179.25), (0.0, 0.0)] {
            let expected = Coordinates::new(lat, lon).unwrap();
            for encoder in [&WktEncoder as &dyn PointEncoder, &EwkbEncoder] {
                let token = encode(lat, lon, encoder).await.unwrap();
                let decoded = token.decode().expect("token should decode");
                assert!(decoded.approx_eq(&expected, 1e-9), "{decoded:?}");
            }
        }
    }

    #[tokio::test]
    async fn encode_validates_before_delegating() {
        let err = encode(120.0, 0.0, &FailingEncoder).await.unwrap_err();
        assert!(matches!(
            err,
            GeometryError::InvalidCoordinate {
                axis: Axis::Latitude,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn encode_passes_through_encoder_failure() {
        let err = encode(10.0, 10.0, &FailingEncoder).await.unwrap_err();
        assert!(matches!(err, GeometryError::Encoder { .. }));
    }

    #[test]
    fn decode_returns_none_for_garbage() {
        assert_eq!(decode(&serde_json::json!("garbage")), None);
        assert_eq!(decode(&serde_json::json!({})), None);
        assert_eq!(decode(&serde_json::Value::Null), None);
        assert_eq!(decode(&serde_json::json!(42)), None);
        assert_eq!(decode(&serde_json::json!([1.0, 2.0])), None);
    }

    #[test]
    fn decode_accepts_every_observed_shape() {
        let expected = Coordinates::new(33.6846, -117.8265).unwrap();
        let shapes = [
            serde_json::json!("POINT(-117.8265 33.6846)"),
            serde_json::json!("SRID=4326;POINT(-117.8265 33.6846)"),
            serde_json::json!({ "type": "Point", "coordinates": [-117.8265, 33.6846] }),
            serde_json::json!({ "coordinates": [-117.8265, 33.6846] }),
            serde_json::json!(ewkb::encode_point(expected, None)),
        ];
        for shape in shapes {
            let decoded = decode(&shape).unwrap_or_else(|| panic!("failed to decode {shape}"));
            assert!(decoded.approx_eq(&expected, 1e-9));
        }
    }

    #[test]
    fn coordinates_display_uses_four_decimals() {
        let point = Coordinates::new(33.684_62, -117.826_51).unwrap();
        assert_eq!(point.to_string(), "33.6846, -117.8265");
    }
}
