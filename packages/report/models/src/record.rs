//! Wire shapes exchanged with the backend record store and its remote
//! procedures.
//!
//! Field names follow the persisted `reports` columns and the parameter
//! names of the `insert_report` procedure exactly.

use chrono::{DateTime, Utc};
use cora_geometry::{Coordinates, GeometryToken};
use serde::{Deserialize, Serialize};

use crate::{
    DEFAULT_CONFIDENCE_SCORE, DEFAULT_MEDIA_COUNT, ReportCategory, ReportId, ReportStatus, UserId,
};

/// A `reports` row as returned by the record store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportRecord {
    /// Primary key.
    pub id: ReportId,
    /// Submitter identity.
    pub user_id: UserId,
    /// Incident category.
    pub category: ReportCategory,
    /// Short summary.
    pub title: String,
    /// Free-form details.
    pub description: String,
    /// Lifecycle state.
    pub status: ReportStatus,
    /// Address entered by the submitter.
    pub address_text: String,
    /// Backend-native geometry (WKT, GeoJSON, or hex EWKB).
    #[serde(default)]
    pub geom: serde_json::Value,
    /// Row creation time.
    pub created_at: DateTime<Utc>,
    /// Informational confidence; `None` when the column is null.
    #[serde(default)]
    pub confidence_score: Option<f64>,
    /// Attached media count; `None` when the column is null.
    #[serde(default)]
    pub media_count: Option<u32>,
}

/// Payload for a direct `reports` insert (the fallback write path).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewReportRecord {
    /// Submitter identity.
    pub user_id: UserId,
    /// Incident category.
    pub category: ReportCategory,
    /// Short summary.
    pub title: String,
    /// Free-form details.
    pub description: String,
    /// Address entered by the submitter.
    pub address_text: String,
    /// Geometry token obtained from `create_point`.
    pub geom: GeometryToken,
    /// Always [`ReportStatus::Unverified`] for new reports.
    pub status: ReportStatus,
    /// Initial confidence.
    pub confidence_score: f64,
    /// Initial media count.
    pub media_count: u32,
}

impl NewReportRecord {
    /// Builds an insert payload with the defaults every new report gets.
    #[must_use]
    pub fn unverified(
        user_id: UserId,
        category: ReportCategory,
        title: String,
        description: String,
        address_text: String,
        geom: GeometryToken,
    ) -> Self {
        Self {
            user_id,
            category,
            title,
            description,
            address_text,
            geom,
            status: ReportStatus::Unverified,
            confidence_score: DEFAULT_CONFIDENCE_SCORE,
            media_count: DEFAULT_MEDIA_COUNT,
        }
    }
}

/// Arguments of the `insert_report` remote procedure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsertReportArgs {
    /// Submitter identity.
    pub p_user_id: UserId,
    /// Incident category.
    pub p_category: ReportCategory,
    /// Short summary.
    pub p_title: String,
    /// Free-form details.
    pub p_description: String,
    /// Address entered by the submitter.
    pub p_address_text: String,
    /// Latitude in degrees.
    pub p_lat: f64,
    /// Longitude in degrees.
    pub p_lon: f64,
}

impl InsertReportArgs {
    /// The point these arguments describe.
    ///
    /// # Errors
    ///
    /// Returns an error if the stored values are not a valid coordinate
    /// pair.
    pub fn coordinates(&self) -> Result<Coordinates, cora_geometry::GeometryError> {
        Coordinates::new(self.p_lat, self.p_lon)
    }
}
