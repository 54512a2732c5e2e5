#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Report repository.
//!
//! All reads and writes of reports go through [`ReportRepository`]. New
//! reports are validated locally, then created through the
//! `insert_report` procedure; if that fails the repository builds the
//! geometry with `create_point` and inserts the row itself (see
//! [`create`]). Status changes made on behalf of administrators are
//! checked against [`cora_report_models::workflow`] first.

pub mod create;
pub mod validation;

use std::sync::Arc;

use cora_backend::{Backend, BackendError, ReportQuery};
use cora_report_models::{Report, ReportId, ReportStatus, StatusFilter, UserId, workflow};
use cora_session::Identity;
use thiserror::Error;

pub use create::CreateStep;
pub use validation::{FieldProblem, ReportSubmission, ValidatedReport, ValidationError};

/// Errors from repository operations.
#[derive(Debug, Error)]
pub enum ReportError {
    /// Submitted fields were rejected; nothing was sent to the backend.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Neither write path created the report.
    #[error("Failed to submit report: {message}")]
    Submission {
        /// Error from the `insert_report` procedure, if it failed.
        rpc_error: Option<String>,
        /// Combined failure description.
        message: String,
    },

    /// Reports could not be read. Callers show "no data available", never
    /// an empty list.
    #[error("Failed to load reports: {message}")]
    Query {
        /// Backend error.
        message: String,
    },

    /// A status change was not applied.
    #[error("Failed to update report {report_id}: {message}")]
    Update {
        /// Target report.
        report_id: ReportId,
        /// Why the write did not happen.
        message: String,
    },

    /// No report with this id.
    #[error("Report {report_id} not found")]
    NotFound {
        /// Requested report.
        report_id: ReportId,
    },

    /// Submitting requires a signed-in user.
    #[error("Sign in to submit a report")]
    AuthRequired,

    /// The workflow does not allow this status change.
    #[error("Cannot change report status from {from} to {to}")]
    TransitionNotAllowed {
        /// Current status.
        from: ReportStatus,
        /// Requested status.
        to: ReportStatus,
    },
}

fn query_error(e: &BackendError) -> ReportError {
    log::error!("Report query failed: {e}");
    ReportError::Query {
        message: e.to_string(),
    }
}

/// Report persistence on top of a [`Backend`].
#[derive(Clone)]
pub struct ReportRepository {
    backend: Arc<dyn Backend>,
}

impl ReportRepository {
    /// Creates a repository over `backend`.
    #[must_use]
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self { backend }
    }

    /// The underlying backend handle.
    #[must_use]
    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.backend
    }

    /// Validates `fields` and creates a report owned by `submitter`.
    ///
    /// # Errors
    ///
    /// * [`ReportError::Validation`] before any backend call if a field is
    ///   invalid
    /// * [`ReportError::Submission`] if neither write path succeeded
    pub async fn create(
        &self,
        submitter: UserId,
        fields: &ReportSubmission,
    ) -> Result<ReportId, ReportError> {
        let report = fields.validate()?;
        create::run(self.backend.as_ref(), submitter, &report).await
    }

    /// Submits a report as `identity`.
    ///
    /// # Errors
    ///
    /// Returns [`ReportError::AuthRequired`] when nobody is signed in, and
    /// otherwise whatever [`create`](Self::create) returns.
    pub async fn submit(
        &self,
        identity: Option<&Identity>,
        fields: &ReportSubmission,
    ) -> Result<ReportId, ReportError> {
        let identity = identity.ok_or(ReportError::AuthRequired)?;
        let id = self.create(identity.id, fields).await?;
        log::info!("User {} submitted report {id}", identity.id);
        Ok(id)
    }

    /// Reports matching `filter`, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`ReportError::Query`] if the backend cannot be read.
    pub async fn list_by_status(&self, filter: StatusFilter) -> Result<Vec<Report>, ReportError> {
        let records = self
            .backend
            .select_reports(&ReportQuery::by_status(filter))
            .await
            .map_err(|e| query_error(&e))?;
        Ok(records.into_iter().map(Report::from).collect())
    }

    /// The report with `id`.
    ///
    /// # Errors
    ///
    /// Returns [`ReportError::NotFound`] if it does not exist and
    /// [`ReportError::Query`] if the backend cannot be read.
    pub async fn get(&self, id: ReportId) -> Result<Report, ReportError> {
        self.backend
            .select_reports(&ReportQuery::by_id(id))
            .await
            .map_err(|e| query_error(&e))?
            .into_iter()
            .next()
            .map(Report::from)
            .ok_or(ReportError::NotFound { report_id: id })
    }

    /// Sets the status of report `id` without consulting the workflow.
    ///
    /// # Errors
    ///
    /// Returns [`ReportError::Update`] if the report does not exist or the
    /// backend rejects the write.
    pub async fn update_status(
        &self,
        id: ReportId,
        status: ReportStatus,
    ) -> Result<Report, ReportError> {
        match self.backend.update_report_status(id, status).await {
            Ok(Some(record)) => {
                log::info!("Report {id} is now {status}");
                Ok(record.into())
            }
            Ok(None) => Err(ReportError::Update {
                report_id: id,
                message: "no such report".to_string(),
            }),
            Err(e) => {
                log::error!("Status update for report {id} failed: {e}");
                Err(ReportError::Update {
                    report_id: id,
                    message: e.to_string(),
                })
            }
        }
    }

    /// Moves report `id` to `target` if the workflow allows it from its
    /// current status.
    ///
    /// # Errors
    ///
    /// Returns [`ReportError::TransitionNotAllowed`] without writing if the
    /// change is not allowed, or any error from [`get`](Self::get) and
    /// [`update_status`](Self::update_status).
    pub async fn transition(
        &self,
        id: ReportId,
        target: ReportStatus,
    ) -> Result<Report, ReportError> {
        let current = self.get(id).await?;
        if !workflow::can_transition(current.status, target) {
            return Err(ReportError::TransitionNotAllowed {
                from: current.status,
                to: target,
            });
        }
        self.update_status(id, target).await
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use cora_backend::memory::InMemoryBackend;
    use cora_geometry::Coordinates;
    use cora_report_models::{ReportCategory, ReportRecord};
    use cora_session::Role;

    use super::*;

    fn repository() -> (InMemoryBackend, ReportRepository) {
        let backend = InMemoryBackend::new();
        let repository = ReportRepository::new(Arc::new(backend.clone()));
        (backend, repository)
    }

    fn theft_at(latitude: &str, longitude: &str) -> ReportSubmission {
        ReportSubmission {
            category: "theft".to_string(),
            title: "Bike stolen".to_string(),
            description: "Cut lock left behind".to_string(),
            address_text: "4199 Campus Dr".to_string(),
            latitude: latitude.to_string(),
            longitude: longitude.to_string(),
        }
    }

    fn seeded(status: ReportStatus, minute: u32) -> ReportRecord {
        ReportRecord {
            id: ReportId::random(),
            user_id: UserId::random(),
            category: ReportCategory::Vandalism,
            title: format!("{status} at {minute}"),
            description: "d".to_string(),
            status,
            address_text: "a".to_string(),
            geom: serde_json::json!("SRID=4326;POINT(-117.8 33.6)"),
            created_at: Utc.with_ymd_and_hms(2025, 3, 1, 12, minute, 0).unwrap(),
            confidence_score: None,
            media_count: None,
        }
    }

    #[tokio::test]
    async fn invalid_latitude_makes_no_backend_calls() {
        let (backend, repository) = repository();
        let err = repository
            .create(UserId::random(), &theft_at("abc", "-117.8265"))
            .await
            .unwrap_err();
        assert!(matches!(err, ReportError::Validation(ref v) if v.has("latitude")));
        assert_eq!(backend.calls().total(), 0);
    }

    #[tokio::test]
    async fn submission_round_trips_location() {
        let (backend, repository) = repository();
        let id = repository
            .create(UserId::random(), &theft_at("33.6846", "-117.8265"))
            .await
            .unwrap();
        assert_eq!(backend.calls().create_point, 0);

        let report = repository.get(id).await.unwrap();
        assert_eq!(report.status, ReportStatus::Unverified);
        assert_eq!(report.category, ReportCategory::Theft);
        assert!(
            report
                .location
                .unwrap()
                .approx_eq(&Coordinates::new(33.6846, -117.8265).unwrap(), 1e-9)
        );
    }

    #[tokio::test]
    async fn falls_back_when_procedure_is_missing() {
        let (backend, repository) = repository();
        backend.set_insert_report_rpc_available(false);

        let id = repository
            .create(UserId::random(), &theft_at("33.6846", "-117.8265"))
            .await
            .unwrap();

        let records = backend.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, id);
        let report = Report::from(records[0].clone());
        assert_eq!(report.status, ReportStatus::Unverified);
        assert!((report.confidence_score - 0.5).abs() < f64::EPSILON);
        assert_eq!(report.media_count, 0);
        assert_eq!(backend.calls().create_point, 1);
        assert_eq!(backend.calls().insert, 1);
    }

    #[tokio::test]
    async fn both_paths_failing_leaves_no_record() {
        let (backend, repository) = repository();
        backend.set_insert_report_rpc_available(false);
        backend.set_create_point_available(false);

        let err = repository
            .create(UserId::random(), &theft_at("33.6846", "-117.8265"))
            .await
            .unwrap_err();
        let ReportError::Submission { rpc_error, message } = err else {
            panic!("expected Submission, got {err:?}");
        };
        assert!(rpc_error.unwrap().contains("insert_report"));
        assert!(message.contains("insert_report"));
        assert!(message.contains("create_point"));
        assert!(backend.records().is_empty());
        assert_eq!(backend.calls().insert, 0);
    }

    #[tokio::test]
    async fn failed_direct_insert_is_reported() {
        let (backend, repository) = repository();
        backend.set_insert_report_rpc_available(false);
        backend.set_insert_available(false);

        let err = repository
            .create(UserId::random(), &theft_at("1", "2"))
            .await
            .unwrap_err();
        assert!(
            matches!(err, ReportError::Submission { ref message, .. } if message.contains("row-level security"))
        );
        assert!(backend.records().is_empty());
    }

    #[tokio::test]
    async fn submit_requires_identity() {
        let (backend, repository) = repository();
        let err = repository
            .submit(None, &theft_at("1", "2"))
            .await
            .unwrap_err();
        assert!(matches!(err, ReportError::AuthRequired));
        assert_eq!(backend.calls().total(), 0);

        let identity = Identity {
            id: UserId::random(),
            email: None,
            role: Role::Member,
        };
        let id = repository
            .submit(Some(&identity), &theft_at("1", "2"))
            .await
            .unwrap();
        assert_eq!(repository.get(id).await.unwrap().user_id, identity.id);
    }

    #[tokio::test]
    async fn list_by_status_filters_and_orders_newest_first() {
        let (backend, repository) = repository();
        let old_verified = seeded(ReportStatus::Verified, 1);
        let unverified = seeded(ReportStatus::Unverified, 2);
        let new_verified = seeded(ReportStatus::Verified, 3);
        for record in [&old_verified, &unverified, &new_verified] {
            backend.seed(record.clone());
        }

        let verified: Vec<ReportId> = repository
            .list_by_status(ReportStatus::Verified.into())
            .await
            .unwrap()
            .iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(verified, vec![new_verified.id, old_verified.id]);

        let all: Vec<ReportId> = repository
            .list_by_status(StatusFilter::All)
            .await
            .unwrap()
            .iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(all, vec![new_verified.id, unverified.id, old_verified.id]);
    }

    #[tokio::test]
    async fn query_failure_is_an_error_not_an_empty_list() {
        let (backend, repository) = repository();
        backend.set_select_available(false);
        assert!(matches!(
            repository.list_by_status(StatusFilter::All).await,
            Err(ReportError::Query { .. })
        ));
    }

    #[tokio::test]
    async fn update_status_moves_report_between_filters() {
        let (_backend, repository) = repository();
        let id = repository
            .create(UserId::random(), &theft_at("1", "2"))
            .await
            .unwrap();
        repository
            .update_status(id, ReportStatus::Verified)
            .await
            .unwrap();

        let verified = repository
            .list_by_status(ReportStatus::Verified.into())
            .await
            .unwrap();
        assert!(verified.iter().any(|r| r.id == id));
        let unverified = repository
            .list_by_status(ReportStatus::Unverified.into())
            .await
            .unwrap();
        assert!(unverified.iter().all(|r| r.id != id));
    }

    #[tokio::test]
    async fn update_status_of_missing_report_fails() {
        let (_backend, repository) = repository();
        assert!(matches!(
            repository
                .update_status(ReportId::random(), ReportStatus::Verified)
                .await,
            Err(ReportError::Update { .. })
        ));
    }

    #[tokio::test]
    async fn transition_enforces_workflow() {
        let (backend, repository) = repository();
        let resolved = seeded(ReportStatus::Resolved, 5);
        backend.seed(resolved.clone());

        let err = repository
            .transition(resolved.id, ReportStatus::Verified)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ReportError::TransitionNotAllowed {
                from: ReportStatus::Resolved,
                to: ReportStatus::Verified
            }
        ));
        assert_eq!(backend.calls().update, 0);

        let fresh = seeded(ReportStatus::Unverified, 6);
        backend.seed(fresh.clone());
        let verified = repository
            .transition(fresh.id, ReportStatus::Verified)
            .await
            .unwrap();
        assert_eq!(verified.status, ReportStatus::Verified);
        let resolved = repository
            .transition(fresh.id, ReportStatus::Resolved)
            .await
            .unwrap();
        assert_eq!(resolved.status, ReportStatus::Resolved);

        assert!(matches!(
            repository
                .transition(ReportId::random(), ReportStatus::Verified)
                .await,
            Err(ReportError::NotFound { .. })
        ));
    }
}
