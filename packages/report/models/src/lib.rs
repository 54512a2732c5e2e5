#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Report types, incident categories, and the status workflow.
//!
//! [`ReportRecord`] mirrors the persisted `reports` row exactly as the
//! backend returns it. [`Report`] is the domain view with the stored
//! geometry decoded into [`Coordinates`]. The [`workflow`] module defines
//! which status changes an administrator may make.

pub mod record;
pub mod workflow;

use std::str::FromStr;

use chrono::{DateTime, Utc};
use cora_geometry::Coordinates;
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use uuid::Uuid;

pub use record::{InsertReportArgs, NewReportRecord, ReportRecord};

/// Confidence assigned to a freshly submitted report.
pub const DEFAULT_CONFIDENCE_SCORE: f64 = 0.5;

/// Media attachment count of a freshly submitted report.
pub const DEFAULT_MEDIA_COUNT: u32 = 0;

/// Unique identifier of a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReportId(pub Uuid);

impl ReportId {
    /// Generates a fresh random identifier.
    #[must_use]
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for ReportId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for ReportId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim()).map(Self)
    }
}

/// Identity of an authenticated submitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub Uuid);

impl UserId {
    /// Generates a fresh random identifier.
    #[must_use]
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for UserId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim()).map(Self)
    }
}

/// Kind of incident being reported.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ReportCategory {
    /// Property taken without consent.
    Theft,
    /// Deliberate damage to property.
    Vandalism,
    /// Physical attack or threat against a person.
    Assault,
    /// Unlawful entry into a building.
    Burglary,
    /// Collisions, reckless driving, and other road incidents.
    Traffic,
    /// Anything that fits no other category.
    Other,
}

impl ReportCategory {
    /// Returns all variants of this enum.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::Theft,
            Self::Vandalism,
            Self::Assault,
            Self::Burglary,
            Self::Traffic,
            Self::Other,
        ]
    }

    /// Human-readable label shown on submission forms.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Theft => "Theft",
            Self::Vandalism => "Vandalism",
            Self::Assault => "Assault",
            Self::Burglary => "Burglary",
            Self::Traffic => "Traffic Incident",
            Self::Other => "Other",
        }
    }
}

/// Lifecycle state of a report.
///
/// See [`workflow`] for the transitions between states.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ReportStatus {
    /// Newly submitted, not yet reviewed. Every report starts here.
    Unverified,
    /// Confirmed by an administrator.
    Verified,
    /// Closed out. Terminal.
    Resolved,
    /// Retired from view by means outside the workflow. Terminal.
    Archived,
}

impl ReportStatus {
    /// Returns all variants of this enum.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::Unverified,
            Self::Verified,
            Self::Resolved,
            Self::Archived,
        ]
    }

    /// Human-readable label for filter controls and badges.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Unverified => "Unverified",
            Self::Verified => "Verified",
            Self::Resolved => "Resolved",
            Self::Archived => "Archived",
        }
    }

    /// Badge colour used when rendering a report with this status.
    #[must_use]
    pub const fn color(self) -> StatusColor {
        match self {
            Self::Unverified => StatusColor::Yellow,
            Self::Verified => StatusColor::Green,
            Self::Resolved => StatusColor::Gray,
            Self::Archived => StatusColor::LightGray,
        }
    }
}

/// Display colour of a status badge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, AsRefStr)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum StatusColor {
    /// Awaiting review.
    Yellow,
    /// Confirmed.
    Green,
    /// Closed.
    Gray,
    /// Archived.
    LightGray,
}

/// Which reports a feed should show.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum StatusFilter {
    /// Every report regardless of status.
    #[default]
    All,
    /// Only reports currently in the given status.
    Only(ReportStatus),
}

impl StatusFilter {
    /// Returns `true` if a report in `status` passes this filter.
    #[must_use]
    pub fn matches(self, status: ReportStatus) -> bool {
        match self {
            Self::All => true,
            Self::Only(wanted) => wanted == status,
        }
    }

    /// The status to filter on, or `None` for [`StatusFilter::All`].
    #[must_use]
    pub const fn status(self) -> Option<ReportStatus> {
        match self {
            Self::All => None,
            Self::Only(status) => Some(status),
        }
    }
}

impl From<ReportStatus> for StatusFilter {
    fn from(status: ReportStatus) -> Self {
        Self::Only(status)
    }
}

impl std::fmt::Display for StatusFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::All => f.write_str("all"),
            Self::Only(status) => status.fmt(f),
        }
    }
}

impl FromStr for StatusFilter {
    type Err = strum::ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("all") {
            return Ok(Self::All);
        }
        s.to_ascii_lowercase().parse().map(Self::Only)
    }
}

impl Serialize for StatusFilter {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for StatusFilter {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// A report as presented to browsing surfaces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    /// Unique identifier.
    pub id: ReportId,
    /// Submitter identity.
    pub user_id: UserId,
    /// Incident category.
    pub category: ReportCategory,
    /// Short summary.
    pub title: String,
    /// Free-form details.
    pub description: String,
    /// Street address or location description entered by the submitter.
    pub address_text: String,
    /// Decoded location, `None` if the stored geometry was unreadable.
    pub location: Option<Coordinates>,
    /// Current lifecycle state.
    pub status: ReportStatus,
    /// Informational confidence in `[0, 1]`.
    pub confidence_score: f64,
    /// Number of attached media items.
    pub media_count: u32,
    /// When the report was created.
    pub created_at: DateTime<Utc>,
}

impl From<ReportRecord> for Report {
    fn from(record: ReportRecord) -> Self {
        let location = cora_geometry::decode(&record.geom);
        Self {
            id: record.id,
            user_id: record.user_id,
            category: record.category,
            title: record.title,
            description: record.description,
            address_text: record.address_text,
            location,
            status: record.status,
            confidence_score: record
                .confidence_score
                .unwrap_or(DEFAULT_CONFIDENCE_SCORE)
                .clamp(0.0, 1.0),
            media_count: record.media_count.unwrap_or(DEFAULT_MEDIA_COUNT),
            created_at: record.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_round_trips_through_wire_names() {
        for category in ReportCategory::all() {
            let parsed: ReportCategory = category.as_ref().parse().unwrap();
            assert_eq!(parsed, *category);
        }
        assert_eq!(ReportCategory::Traffic.to_string(), "traffic");
        assert_eq!(ReportCategory::Traffic.label(), "Traffic Incident");
        assert!("robbery".parse::<ReportCategory>().is_err());
    }

    #[test]
    fn status_serializes_lowercase() {
        let json = serde_json::to_string(&ReportStatus::Unverified).unwrap();
        assert_eq!(json, "\"unverified\"");
        let status: ReportStatus = serde_json::from_str("\"resolved\"").unwrap();
        assert_eq!(status, ReportStatus::Resolved);
        assert!(serde_json::from_str::<ReportStatus>("\"pending\"").is_err());
    }

    #[test]
    fn status_colors() {
        assert_eq!(ReportStatus::Verified.color(), StatusColor::Green);
        assert_eq!(ReportStatus::Archived.color().to_string(), "light-gray");
    }

    #[test]
    fn status_filter_parses_all_and_statuses() {
        assert_eq!("all".parse::<StatusFilter>().unwrap(), StatusFilter::All);
        assert_eq!("ALL".parse::<StatusFilter>().unwrap(), StatusFilter::All);
        assert_eq!(
            "Verified".parse::<StatusFilter>().unwrap(),
            StatusFilter::Only(ReportStatus::Verified)
        );
        assert!("everything".parse::<StatusFilter>().is_err());
        assert_eq!(StatusFilter::Only(ReportStatus::Resolved).to_string(), "resolved");
    }

    #[test]
    fn status_filter_matches() {
        assert!(StatusFilter::All.matches(ReportStatus::Archived));
        assert!(StatusFilter::from(ReportStatus::Verified).matches(ReportStatus::Verified));
        assert!(!StatusFilter::from(ReportStatus::Verified).matches(ReportStatus::Unverified));
    }

    #[test]
    fn report_id_parses_uuid_text() {
        let id = ReportId::random();
        assert_eq!(id.to_string().parse::<ReportId>().unwrap(), id);
        assert!("not-a-uuid".parse::<ReportId>().is_err());
    }
}
