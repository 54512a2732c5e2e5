#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Report feeds.
//!
//! A feed is a status-filtered, newest-first view over the repository. The
//! public feed starts on `all`; the admin dashboard starts on
//! `unverified`. [`FeedController`] keeps the currently displayed result
//! and allows only one request at a time.

use std::sync::{Arc, PoisonError, RwLock};

use cora_report_models::workflow::{self, Transition};
use cora_report_models::{Report, ReportId, ReportStatus, StatusFilter};
use cora_repository::{ReportError, ReportRepository};
use strum_macros::{AsRefStr, Display, EnumString};
use thiserror::Error;

/// Errors from feed operations.
#[derive(Debug, Error)]
pub enum FeedError {
    /// Another request from this feed has not settled yet.
    #[error("A request is already in progress")]
    Busy,

    /// A status change failed.
    #[error(transparent)]
    Report(#[from] ReportError),
}

/// Which surface a feed backs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum FeedKind {
    /// Browsing surface open to everyone.
    Public,
    /// Administrator review dashboard.
    Admin,
}

impl FeedKind {
    /// Filter a fresh feed of this kind starts on.
    #[must_use]
    pub const fn default_filter(self) -> StatusFilter {
        match self {
            Self::Public => StatusFilter::All,
            Self::Admin => StatusFilter::Only(ReportStatus::Unverified),
        }
    }
}

/// A one-shot feed query.
#[derive(Clone)]
pub struct ReportFeed {
    repository: ReportRepository,
    kind: FeedKind,
}

impl ReportFeed {
    /// Creates a feed of `kind` over `repository`.
    #[must_use]
    pub const fn new(repository: ReportRepository, kind: FeedKind) -> Self {
        Self { repository, kind }
    }

    /// The kind of surface this feed backs.
    #[must_use]
    pub const fn kind(&self) -> FeedKind {
        self.kind
    }

    /// Reports matching `filter`, or the kind's default filter.
    ///
    /// # Errors
    ///
    /// Returns [`ReportError::Query`] if the repository cannot be read.
    pub async fn fetch(&self, filter: Option<StatusFilter>) -> Result<Vec<Report>, ReportError> {
        self.repository
            .list_by_status(filter.unwrap_or_else(|| self.kind.default_filter()))
            .await
    }
}

/// What a feed surface currently shows.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedView {
    /// Nothing fetched yet.
    Loading,
    /// The latest successful result for `filter`.
    Loaded {
        /// Filter the reports were fetched with.
        filter: StatusFilter,
        /// Reports, newest first.
        reports: Arc<Vec<Report>>,
    },
    /// The latest fetch failed; distinct from an empty result.
    Unavailable {
        /// Filter the fetch was attempted with.
        filter: StatusFilter,
        /// Failure description.
        message: String,
    },
}

impl FeedView {
    /// The loaded reports, if any.
    #[must_use]
    pub fn reports(&self) -> Option<&[Report]> {
        match self {
            Self::Loaded { reports, .. } => Some(reports.as_slice()),
            Self::Loading | Self::Unavailable { .. } => None,
        }
    }
}

/// Stateful feed for an interactive surface.
///
/// Each successful fetch replaces the displayed result wholesale. While a
/// fetch or status change is in flight, further requests fail with
/// [`FeedError::Busy`].
pub struct FeedController {
    feed: ReportFeed,
    filter: RwLock<StatusFilter>,
    view: RwLock<FeedView>,
    in_flight: tokio::sync::Mutex<()>,
}

impl FeedController {
    /// Creates a controller starting on the kind's default filter.
    #[must_use]
    pub fn new(repository: ReportRepository, kind: FeedKind) -> Self {
        Self {
            feed: ReportFeed::new(repository, kind),
            filter: RwLock::new(kind.default_filter()),
            view: RwLock::new(FeedView::Loading),
            in_flight: tokio::sync::Mutex::new(()),
        }
    }

    /// The filter the next refresh uses.
    #[must_use]
    pub fn filter(&self) -> StatusFilter {
        *self.filter.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// What is currently displayed.
    #[must_use]
    pub fn view(&self) -> FeedView {
        self.view
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Returns `true` while a request is outstanding.
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.in_flight.try_lock().is_err()
    }

    /// Switches to `filter` and refreshes.
    ///
    /// # Errors
    ///
    /// Returns [`FeedError::Busy`] (leaving the filter unchanged) if a
    /// request is outstanding.
    pub async fn set_filter(&self, filter: StatusFilter) -> Result<FeedView, FeedError> {
        let _guard = self.in_flight.try_lock().map_err(|_| FeedError::Busy)?;
        *self.filter.write().unwrap_or_else(PoisonError::into_inner) = filter;
        Ok(self.load().await)
    }

    /// Re-fetches with the current filter.
    ///
    /// A failed fetch is not an error: the view becomes
    /// [`FeedView::Unavailable`].
    ///
    /// # Errors
    ///
    /// Returns [`FeedError::Busy`] if a request is outstanding.
    pub async fn refresh(&self) -> Result<FeedView, FeedError> {
        let _guard = self.in_flight.try_lock().map_err(|_| FeedError::Busy)?;
        Ok(self.load().await)
    }

    /// Applies a workflow-checked status change, then re-fetches once the
    /// change has settled.
    ///
    /// # Errors
    ///
    /// Returns [`FeedError::Busy`] if a request is outstanding, or
    /// [`FeedError::Report`] if the change was rejected. The view is left
    /// as it was on error.
    pub async fn apply_transition(
        &self,
        id: ReportId,
        target: ReportStatus,
    ) -> Result<FeedView, FeedError> {
        let _guard = self.in_flight.try_lock().map_err(|_| FeedError::Busy)?;
        self.feed.repository.transition(id, target).await?;
        Ok(self.load().await)
    }

    /// Actions offered for `report` on this controller's surface.
    #[must_use]
    pub fn actions(&self, report: &Report) -> Vec<&'static Transition> {
        match self.feed.kind() {
            FeedKind::Admin => workflow::transitions_from(report.status).collect(),
            FeedKind::Public => Vec::new(),
        }
    }

    async fn load(&self) -> FeedView {
        let filter = self.filter();
        let view = match self.feed.fetch(Some(filter)).await {
            Ok(reports) => {
                log::debug!("Loaded {} reports for filter {filter}", reports.len());
                FeedView::Loaded {
                    filter,
                    reports: Arc::new(reports),
                }
            }
            Err(e) => FeedView::Unavailable {
                filter,
                message: e.to_string(),
            },
        };
        *self.view.write().unwrap_or_else(PoisonError::into_inner) = view.clone();
        view
    }
}
