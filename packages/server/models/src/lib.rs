#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! API request and response types for the Cora server.
//!
//! These types are serialized to JSON for the REST API. They are separate
//! from the report record types to allow independent evolution of the API
//! contract.

use chrono::{DateTime, Utc};
use cora_report_models::workflow::Transition;
use cora_report_models::{Report, ReportCategory, ReportId, ReportStatus, StatusColor, UserId};
use cora_session::{AuthSession, Identity, Role};
use serde::{Deserialize, Serialize};

/// A report as returned by the API.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiReport {
    /// Unique report ID.
    pub id: ReportId,
    /// Submitter.
    pub user_id: UserId,
    /// Category wire name.
    pub category: ReportCategory,
    /// Category display label.
    pub category_label: String,
    /// Short summary.
    pub title: String,
    /// Details.
    pub description: String,
    /// Address as entered.
    pub address_text: String,
    /// Latitude, absent when the stored geometry is unreadable.
    pub latitude: Option<f64>,
    /// Longitude, absent when the stored geometry is unreadable.
    pub longitude: Option<f64>,
    /// Lifecycle state.
    pub status: ReportStatus,
    /// Status display label.
    pub status_label: String,
    /// Status badge colour.
    pub status_color: StatusColor,
    /// Informational confidence in `[0, 1]`.
    pub confidence_score: f64,
    /// Attached media count.
    pub media_count: u32,
    /// Creation time (ISO 8601).
    pub created_at: DateTime<Utc>,
    /// Status actions available to the caller; only filled on admin
    /// surfaces.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub actions: Vec<ApiTransition>,
}

impl From<Report> for ApiReport {
    fn from(report: Report) -> Self {
        Self {
            id: report.id,
            user_id: report.user_id,
            category: report.category,
            category_label: report.category.label().to_string(),
            title: report.title,
            description: report.description,
            address_text: report.address_text,
            latitude: report.location.map(|l| l.latitude),
            longitude: report.location.map(|l| l.longitude),
            status: report.status,
            status_label: report.status.label().to_string(),
            status_color: report.status.color(),
            confidence_score: report.confidence_score,
            media_count: report.media_count,
            created_at: report.created_at,
            actions: Vec::new(),
        }
    }
}

/// A status change an administrator can make.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiTransition {
    /// Target status.
    pub to: ReportStatus,
    /// Button label.
    pub action: String,
}

impl From<&Transition> for ApiTransition {
    fn from(transition: &Transition) -> Self {
        Self {
            to: transition.to,
            action: transition.action.to_string(),
        }
    }
}

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiHealth {
    /// Always `true` when the server answers.
    pub healthy: bool,
    /// Server version.
    pub version: String,
    /// Backend implementation in use.
    pub backend: String,
}

/// A report category option.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiCategory {
    /// Wire name.
    pub name: ReportCategory,
    /// Display label.
    pub label: String,
}

/// A report status option.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiStatus {
    /// Wire name.
    pub name: ReportStatus,
    /// Display label.
    pub label: String,
    /// Badge colour.
    pub color: StatusColor,
}

/// Query parameters for report listings.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportQueryParams {
    /// `all` or a status name; the surface's default when absent.
    pub status: Option<String>,
}

/// A coordinate given either as a JSON number or as text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CoordinateInput {
    /// Numeric input.
    Number(f64),
    /// Text input, e.g. straight from a form field.
    Text(String),
}

impl Default for CoordinateInput {
    fn default() -> Self {
        Self::Text(String::new())
    }
}

impl std::fmt::Display for CoordinateInput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Number(value) => value.fmt(f),
            Self::Text(text) => f.write_str(text),
        }
    }
}

/// Body of `POST /api/reports`.
///
/// Every field defaults to empty so missing fields are reported as
/// validation problems rather than as malformed JSON.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SubmitReportRequest {
    /// Category wire name.
    pub category: String,
    /// Short summary.
    pub title: String,
    /// Details.
    pub description: String,
    /// Address or location description.
    pub address_text: String,
    /// Latitude in decimal degrees.
    pub latitude: CoordinateInput,
    /// Longitude in decimal degrees.
    pub longitude: CoordinateInput,
}

/// Response to a successful submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiSubmitted {
    /// The new report's ID.
    pub id: ReportId,
    /// Where the submitter should be sent next.
    pub redirect_to: String,
}

/// Body of `PATCH /api/admin/reports/{id}/status`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateStatusRequest {
    /// Target status name.
    pub status: String,
}

/// Body of the sign-in and sign-up endpoints.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CredentialsRequest {
    /// Email address.
    pub email: String,
    /// Password.
    pub password: String,
}

/// The signed-in user.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiUser {
    /// User ID.
    pub id: UserId,
    /// Email address.
    pub email: Option<String>,
    /// Role.
    pub role: Role,
}

impl From<Identity> for ApiUser {
    fn from(identity: Identity) -> Self {
        Self {
            id: identity.id,
            email: identity.email,
            role: identity.role,
        }
    }
}

/// Tokens and identity returned on sign-in.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiSession {
    /// Bearer token for subsequent requests.
    pub access_token: String,
    /// Token for renewing the session.
    pub refresh_token: Option<String>,
    /// Who signed in.
    pub user: ApiUser,
}

impl From<AuthSession> for ApiSession {
    fn from(session: AuthSession) -> Self {
        Self {
            access_token: session.access_token,
            refresh_token: session.refresh_token,
            user: session.identity.into(),
        }
    }
}

/// Result of `POST /api/auth/sign-up`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ApiSignUp {
    /// Account created and signed in.
    SignedIn {
        /// The new session.
        session: ApiSession,
    },
    /// Account created; confirm via email before signing in.
    ConfirmationRequired {
        /// Address the confirmation was sent to.
        email: String,
    },
}

/// One diagnostic check.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiCheck {
    /// Check name.
    pub name: String,
    /// Whether it passed.
    pub ok: bool,
    /// Result summary or error message.
    pub detail: String,
}

/// Response of `GET /api/diagnostics`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiDiagnostics {
    /// Backend implementation in use.
    pub backend: String,
    /// Individual checks, in the order they ran.
    pub checks: Vec<ApiCheck>,
}

impl ApiDiagnostics {
    /// Returns `true` if every check passed.
    #[must_use]
    pub fn all_ok(&self) -> bool {
        self.checks.iter().all(|c| c.ok)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn submit_request_accepts_numbers_and_text() {
        let request: SubmitReportRequest = serde_json::from_value(serde_json::json!({
            "category": "theft",
            "title": "Bike stolen",
            "addressText": "4199 Campus Dr",
            "latitude": 33.6846,
            "longitude": "-117.8265"
        }))
        .unwrap();
        assert_eq!(request.latitude.to_string(), "33.6846");
        assert_eq!(request.longitude.to_string(), "-117.8265");
        assert_eq!(request.description, "");
    }

    #[test]
    fn report_without_location_serializes_nulls() {
        let report = Report {
            id: ReportId::random(),
            user_id: UserId::random(),
            category: ReportCategory::Traffic,
            title: "Red light runner".to_string(),
            description: "d".to_string(),
            address_text: "a".to_string(),
            location: None,
            status: ReportStatus::Archived,
            confidence_score: 0.5,
            media_count: 0,
            created_at: Utc::now(),
        };
        let json = serde_json::to_value(ApiReport::from(report)).unwrap();
        assert_eq!(json["latitude"], serde_json::Value::Null);
        assert_eq!(json["categoryLabel"], "Traffic Incident");
        assert_eq!(json["statusColor"], "light-gray");
        assert!(json.get("actions").is_none());
    }

    #[test]
    fn sign_up_outcome_is_tagged() {
        let json = serde_json::to_value(ApiSignUp::ConfirmationRequired {
            email: "new@example.com".to_string(),
        })
        .unwrap();
        assert_eq!(json["status"], "confirmation_required");
    }
}
