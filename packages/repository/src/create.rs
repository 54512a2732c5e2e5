//! The report creation state machine.
//!
//! ```text
//! TryRpc ──ok(id)──────────────────────────────────────────▶ Done
//!   │ err
//!   ▼
//! TryFallbackGeometry ──err──▶ Failed (procedure + geometry errors)
//!   │ ok(geometry)
//!   ▼
//! TryDirectInsert ──ok──▶ Done
//!   └──err──▶ Failed (insert error)
//! ```
//!
//! A procedure call that succeeds without returning an id goes straight to
//! `Failed`: the procedure may already have written the row, so inserting
//! again could duplicate it.

use cora_backend::{Backend, CreatePointEncoder};
use cora_geometry::GeometryToken;
use cora_report_models::{ReportId, UserId};

use crate::{ReportError, ValidatedReport};

/// One state of a report creation.
#[derive(Debug)]
pub enum CreateStep {
    /// Call the `insert_report` procedure.
    TryRpc,
    /// Build the geometry via `create_point` after the procedure failed.
    TryFallbackGeometry {
        /// Why the procedure failed.
        rpc_error: String,
    },
    /// Insert the row directly with a prepared geometry.
    TryDirectInsert {
        /// Why the procedure failed.
        rpc_error: String,
        /// Geometry from `create_point`.
        geometry: GeometryToken,
    },
    /// The report exists.
    Done(ReportId),
    /// No report was created.
    Failed(ReportError),
}

impl CreateStep {
    /// Performs this step and returns the next one. Final steps return
    /// themselves.
    pub async fn advance(
        self,
        backend: &dyn Backend,
        submitter: UserId,
        report: &ValidatedReport,
    ) -> Self {
        match self {
            Self::TryRpc => match backend.insert_report_rpc(&report.rpc_args(submitter)).await {
                Ok(Some(id)) => Self::Done(id),
                Ok(None) => Self::Failed(ReportError::Submission {
                    rpc_error: None,
                    message: "insert_report returned no report id".to_string(),
                }),
                Err(e) => {
                    log::warn!("insert_report failed, falling back to direct insert: {e}");
                    Self::TryFallbackGeometry {
                        rpc_error: e.to_string(),
                    }
                }
            },
            Self::TryFallbackGeometry { rpc_error } => {
                let encoder = CreatePointEncoder::new(backend);
                match cora_geometry::encode(
                    report.location.latitude,
                    report.location.longitude,
                    &encoder,
                )
                .await
                {
                    Ok(geometry) => Self::TryDirectInsert {
                        rpc_error,
                        geometry,
                    },
                    Err(e) => {
                        log::error!("Geometry fallback failed: {e}");
                        Self::Failed(ReportError::Submission {
                            message: format!("{rpc_error}; {e}"),
                            rpc_error: Some(rpc_error),
                        })
                    }
                }
            }
            Self::TryDirectInsert {
                rpc_error,
                geometry,
            } => match backend.insert_report(&report.record(submitter, geometry)).await {
                Ok(record) => Self::Done(record.id),
                Err(e) => {
                    log::error!("Direct report insert failed: {e}");
                    Self::Failed(ReportError::Submission {
                        rpc_error: Some(rpc_error),
                        message: e.to_string(),
                    })
                }
            },
            done @ (Self::Done(_) | Self::Failed(_)) => done,
        }
    }
}

/// Runs the state machine from [`CreateStep::TryRpc`] to completion.
///
/// # Errors
///
/// Returns [`ReportError::Submission`] if no write path succeeded.
pub async fn run(
    backend: &dyn Backend,
    submitter: UserId,
    report: &ValidatedReport,
) -> Result<ReportId, ReportError> {
    let mut step = CreateStep::TryRpc;
    loop {
        step = match step {
            CreateStep::Done(id) => return Ok(id),
            CreateStep::Failed(e) => return Err(e),
            pending => pending.advance(backend, submitter, report).await,
        };
    }
}

#[cfg(test)]
mod tests {
    use cora_backend::RemoteProcedures;
    use cora_backend::memory::InMemoryBackend;
    use cora_geometry::Coordinates;
    use cora_report_models::ReportCategory;

    use super::*;

    fn report() -> ValidatedReport {
        ValidatedReport {
            category: ReportCategory::Assault,
            title: "t".to_string(),
            description: "d".to_string(),
            address_text: "a".to_string(),
            location: Coordinates::new(41.8827, -87.6278).unwrap(),
        }
    }

    #[tokio::test]
    async fn rpc_success_finishes_in_one_step() {
        let backend = InMemoryBackend::new();
        let step = CreateStep::TryRpc
            .advance(&backend, UserId::random(), &report())
            .await;
        assert!(matches!(step, CreateStep::Done(_)));
        assert_eq!(backend.calls().total(), 1);
    }

    #[tokio::test]
    async fn rpc_failure_moves_to_geometry() {
        let backend = InMemoryBackend::new();
        backend.set_insert_report_rpc_available(false);
        let step = CreateStep::TryRpc
            .advance(&backend, UserId::random(), &report())
            .await;
        assert!(
            matches!(step, CreateStep::TryFallbackGeometry { ref rpc_error } if rpc_error.contains("insert_report"))
        );
    }

    #[tokio::test]
    async fn geometry_step_produces_token_for_insert() {
        let backend = InMemoryBackend::new();
        let step = CreateStep::TryFallbackGeometry {
            rpc_error: "boom".to_string(),
        }
        .advance(&backend, UserId::random(), &report())
        .await;
        let CreateStep::TryDirectInsert { rpc_error, geometry } = step else {
            panic!("expected TryDirectInsert, got {step:?}");
        };
        assert_eq!(rpc_error, "boom");
        assert!(
            geometry
                .decode()
                .unwrap()
                .approx_eq(&report().location, 1e-9)
        );
        assert!(backend.records().is_empty());
    }

    #[tokio::test]
    async fn direct_insert_step_stores_one_record() {
        let backend = InMemoryBackend::new();
        let geometry = backend
            .create_point(report().location)
            .await
            .unwrap();
        let step = CreateStep::TryDirectInsert {
            rpc_error: "boom".to_string(),
            geometry,
        }
        .advance(&backend, UserId::random(), &report())
        .await;
        let CreateStep::Done(id) = step else {
            panic!("expected Done, got {step:?}");
        };
        let records = backend.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, id);
    }

    #[tokio::test]
    async fn final_steps_are_fixed_points() {
        let backend = InMemoryBackend::new();
        let id = ReportId::random();
        let step = CreateStep::Done(id)
            .advance(&backend, UserId::random(), &report())
            .await;
        assert!(matches!(step, CreateStep::Done(done) if done == id));
        assert_eq!(backend.calls().total(), 0);
    }

    #[tokio::test]
    async fn run_falls_back_to_direct_insert() {
        let backend = InMemoryBackend::new();
        backend.set_insert_report_rpc_available(false);
        let id = run(&backend, UserId::random(), &report()).await.unwrap();
        assert_eq!(backend.records()[0].id, id);
    }

    #[tokio::test]
    async fn run_reports_failure_when_every_path_fails() {
        let backend = InMemoryBackend::new();
        backend.set_insert_report_rpc_available(false);
        backend.set_insert_available(false);
        let result = run(&backend, UserId::random(), &report()).await;
        assert!(matches!(result, Err(ReportError::Submission { .. })));
        assert!(backend.records().is_empty());
    }
}
