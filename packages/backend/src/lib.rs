#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Backend collaborator ports and their implementations.
//!
//! The hosted backend offers three things this application relies on: a
//! `reports` record store ([`ReportStore`]), two remote procedures
//! ([`RemoteProcedures`]), and an auth service
//! ([`cora_session::AuthProvider`]). [`rest`] and [`gotrue`] talk to a
//! Supabase-style deployment over HTTP; [`memory`] keeps everything in
//! process for tests and local demos.
//!
//! Use [`create_services_from_env`] to build the pair selected by the
//! environment.

pub mod config;
pub mod gotrue;
pub mod memory;
pub mod rest;
mod retry;

use std::sync::Arc;

use cora_geometry::{Coordinates, GeometryError, GeometryToken, PointEncoder};
use cora_report_models::{
    InsertReportArgs, NewReportRecord, ReportId, ReportRecord, ReportStatus, StatusFilter,
};
use cora_session::AuthProvider;
use thiserror::Error;

pub use config::{BackendConfig, BackendKind, ConfigError, RestConfig};

/// Errors from backend calls.
#[derive(Debug, Error)]
pub enum BackendError {
    /// Transport-level failure (connect, timeout, TLS, body read).
    #[error(transparent)]
    Http(#[from] reqwest::Error),

    /// The backend answered with an error status.
    #[error("Backend error (HTTP {status}): {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Backend-supplied error code, if any.
        code: Option<String>,
        /// Human-readable message assembled from the error body.
        message: String,
    },

    /// The response could not be interpreted.
    #[error("Unexpected backend response: {message}")]
    Decode {
        /// What was wrong with the response.
        message: String,
    },

    /// The backend refused the operation.
    #[error("{message}")]
    Rejected {
        /// Why the operation was refused.
        message: String,
    },
}

impl From<serde_json::Error> for BackendError {
    fn from(e: serde_json::Error) -> Self {
        Self::Decode {
            message: e.to_string(),
        }
    }
}

/// Selection of `reports` rows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReportQuery {
    /// Status filter.
    pub filter: StatusFilter,
    /// Restrict to a single report.
    pub id: Option<ReportId>,
    /// Maximum number of rows.
    pub limit: Option<usize>,
}

impl ReportQuery {
    /// All reports matching `filter`, newest first.
    #[must_use]
    pub fn by_status(filter: StatusFilter) -> Self {
        Self {
            filter,
            ..Self::default()
        }
    }

    /// The single report with `id`.
    #[must_use]
    pub fn by_id(id: ReportId) -> Self {
        Self {
            id: Some(id),
            limit: Some(1),
            ..Self::default()
        }
    }
}

/// The `reports` record store.
///
/// Results of [`select_reports`](Self::select_reports) are always ordered
/// by `created_at`, newest first.
#[async_trait::async_trait]
pub trait ReportStore: Send + Sync {
    /// Reads rows matching `query`.
    async fn select_reports(&self, query: &ReportQuery) -> Result<Vec<ReportRecord>, BackendError>;

    /// Inserts a row and returns it as stored.
    async fn insert_report(&self, record: &NewReportRecord) -> Result<ReportRecord, BackendError>;

    /// Sets the status of report `id`, returning the updated row or `None`
    /// if no such report exists.
    async fn update_report_status(
        &self,
        id: ReportId,
        status: ReportStatus,
    ) -> Result<Option<ReportRecord>, BackendError>;
}

/// Server-side procedures.
#[async_trait::async_trait]
pub trait RemoteProcedures: Send + Sync {
    /// Creates a report in one call, building its geometry server-side.
    ///
    /// `Ok(None)` means the call succeeded but returned no identifier.
    async fn insert_report_rpc(
        &self,
        args: &InsertReportArgs,
    ) -> Result<Option<ReportId>, BackendError>;

    /// Builds the backend-native geometry for `point`.
    async fn create_point(&self, point: Coordinates) -> Result<GeometryToken, BackendError>;
}

/// Everything the application needs from the data backend.
pub trait Backend: ReportStore + RemoteProcedures {
    /// Short name for logs and diagnostics.
    fn name(&self) -> &'static str;

    /// A handle that acts on behalf of the user owning `access_token`, or
    /// anonymously when `None`.
    fn scoped(&self, access_token: Option<&str>) -> Arc<dyn Backend>;
}

/// [`PointEncoder`] backed by the `create_point` procedure.
pub struct CreatePointEncoder<'a, P: RemoteProcedures + ?Sized> {
    procedures: &'a P,
}

impl<'a, P: RemoteProcedures + ?Sized> CreatePointEncoder<'a, P> {
    /// Wraps `procedures`.
    #[must_use]
    pub const fn new(procedures: &'a P) -> Self {
        Self { procedures }
    }
}

#[async_trait::async_trait]
impl<P: RemoteProcedures + ?Sized> PointEncoder for CreatePointEncoder<'_, P> {
    async fn encode_point(&self, point: Coordinates) -> Result<GeometryToken, GeometryError> {
        self.procedures
            .create_point(point)
            .await
            .map_err(|e| GeometryError::Encoder {
                message: e.to_string(),
            })
    }
}

/// The data backend and auth provider selected by configuration.
#[derive(Clone)]
pub struct Services {
    /// Record store and procedures, acting anonymously.
    pub backend: Arc<dyn Backend>,
    /// Identity provider.
    pub auth: Arc<dyn AuthProvider>,
}

/// Builds the services described by `config`.
///
/// # Errors
///
/// Returns [`BackendError`] if the HTTP client cannot be constructed.
pub fn create_services(config: &BackendConfig) -> Result<Services, BackendError> {
    match config.kind {
        BackendKind::Rest => {
            let rest = config.rest.clone().ok_or_else(|| BackendError::Rejected {
                message: "REST backend selected without connection settings".to_string(),
            })?;
            let rest = Arc::new(rest);
            let client = rest::build_client(&rest)?;
            log::info!("Using REST backend at {}", rest.url);
            Ok(Services {
                backend: Arc::new(rest::RestBackend::new(client.clone(), Arc::clone(&rest))),
                auth: Arc::new(gotrue::GoTrueAuth::new(client, rest)),
            })
        }
        BackendKind::Memory => {
            log::warn!("Using in-memory backend; data is lost on exit");
            let auth = memory::InMemoryAuth::new();
            if let Some((email, password)) = &config.demo_admin {
                auth.add_user(email, password, cora_session::Role::Admin);
            }
            Ok(Services {
                backend: Arc::new(memory::InMemoryBackend::new()),
                auth: Arc::new(auth),
            })
        }
    }
}

/// Reads [`BackendConfig::from_env`] and builds the services it selects.
///
/// # Errors
///
/// Returns a message describing the configuration problem or client
/// construction failure.
pub fn create_services_from_env() -> Result<Services, Box<dyn std::error::Error + Send + Sync>> {
    let config = BackendConfig::from_env()?;
    Ok(create_services(&config)?)
}
