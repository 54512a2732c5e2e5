//! Checking submitted fields before anything is sent to the backend.

use cora_geometry::{Axis, Coordinates, GeometryToken};
use cora_report_models::{InsertReportArgs, NewReportRecord, ReportCategory, UserId};
use thiserror::Error;

/// Raw report fields as entered by a submitter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReportSubmission {
    /// Category wire name, e.g. `theft`.
    pub category: String,
    /// Short summary.
    pub title: String,
    /// Free-form details.
    pub description: String,
    /// Street address or location description.
    pub address_text: String,
    /// Latitude in decimal degrees.
    pub latitude: String,
    /// Longitude in decimal degrees.
    pub longitude: String,
}

/// One rejected field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldProblem {
    /// Field name as used in [`ReportSubmission`].
    pub field: &'static str,
    /// What is wrong with it.
    pub message: String,
}

impl std::fmt::Display for FieldProblem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Every problem found in a submission.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid report: {}", problems.iter().map(ToString::to_string).collect::<Vec<_>>().join("; "))]
pub struct ValidationError {
    /// Rejected fields, in form order.
    pub problems: Vec<FieldProblem>,
}

impl ValidationError {
    /// Returns `true` if `field` was rejected.
    #[must_use]
    pub fn has(&self, field: &str) -> bool {
        self.problems.iter().any(|p| p.field == field)
    }
}

/// A submission that passed validation.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedReport {
    /// Incident category.
    pub category: ReportCategory,
    /// Trimmed title.
    pub title: String,
    /// Trimmed description.
    pub description: String,
    /// Trimmed address.
    pub address_text: String,
    /// Parsed, range-checked location.
    pub location: Coordinates,
}

impl ValidatedReport {
    /// Arguments for the `insert_report` procedure.
    #[must_use]
    pub fn rpc_args(&self, submitter: UserId) -> InsertReportArgs {
        InsertReportArgs {
            p_user_id: submitter,
            p_category: self.category,
            p_title: self.title.clone(),
            p_description: self.description.clone(),
            p_address_text: self.address_text.clone(),
            p_lat: self.location.latitude,
            p_lon: self.location.longitude,
        }
    }

    /// Payload for a direct insert with a prepared geometry.
    #[must_use]
    pub fn record(&self, submitter: UserId, geom: GeometryToken) -> NewReportRecord {
        NewReportRecord::unverified(
            submitter,
            self.category,
            self.title.clone(),
            self.description.clone(),
            self.address_text.clone(),
            geom,
        )
    }
}

fn parse_coordinate(raw: &str, axis: Axis) -> Result<f64, String> {
    let value: f64 = raw
        .trim()
        .parse()
        .map_err(|_| format!("'{}' is not a number", raw.trim()))?;
    if !value.is_finite() || value.abs() > axis.limit() {
        return Err(format!("must be between -{0} and {0}", axis.limit()));
    }
    Ok(value)
}

impl ReportSubmission {
    /// Validates every field, collecting all problems.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError`] listing each rejected field.
    pub fn validate(&self) -> Result<ValidatedReport, ValidationError> {
        let mut problems = Vec::new();
        let mut problem = |field, message: String| problems.push(FieldProblem { field, message });

        let category = self.category.trim().to_ascii_lowercase().parse::<ReportCategory>();
        if category.is_err() {
            problem(
                "category",
                format!("'{}' is not a known category", self.category.trim()),
            );
        }

        for (field, value) in [
            ("title", &self.title),
            ("description", &self.description),
            ("address_text", &self.address_text),
        ] {
            if value.trim().is_empty() {
                problem(field, "is required".to_string());
            }
        }

        let latitude = parse_coordinate(&self.latitude, Axis::Latitude)
            .map_err(|message| problem("latitude", message))
            .ok();
        let longitude = parse_coordinate(&self.longitude, Axis::Longitude)
            .map_err(|message| problem("longitude", message))
            .ok();

        match (category, latitude, longitude) {
            (Ok(category), Some(latitude), Some(longitude)) if problems.is_empty() => {
                let location = Coordinates::new(latitude, longitude).map_err(|e| {
                    ValidationError {
                        problems: vec![FieldProblem {
                            field: "location",
                            message: e.to_string(),
                        }],
                    }
                })?;
                Ok(ValidatedReport {
                    category,
                    title: self.title.trim().to_string(),
                    description: self.description.trim().to_string(),
                    address_text: self.address_text.trim().to_string(),
                    location,
                })
            }
            _ => Err(ValidationError { problems }),
        }
    }
}
