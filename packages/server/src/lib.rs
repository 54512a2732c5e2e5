#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Actix-Web API server for Cora.
//!
//! Serves the public report feed, report submission, the administrator
//! review dashboard, email/password auth, and a diagnostics page. Callers
//! authenticate with the access token from `POST /api/auth/sign-in` sent as
//! `Authorization: Bearer <token>`; the token is validated with the auth
//! provider on every request and forwarded to the backend so row-level
//! policies see the real user.

pub mod diagnostics;
mod handlers;
pub mod interactive;

use std::collections::BTreeSet;
use std::sync::{Mutex, PoisonError};

use actix_cors::Cors;
use actix_web::{App, HttpServer, middleware, web};
use cora_backend::Services;
use cora_report_models::UserId;
use cora_repository::ReportRepository;

/// Where the server listens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Interface to bind.
    pub bind_addr: String,
    /// TCP port.
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

impl ServerConfig {
    /// Reads `BIND_ADDR` and `PORT`, falling back to `127.0.0.1:8080`.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let bind_addr = std::env::var("BIND_ADDR").unwrap_or(defaults.bind_addr);
        let port: u16 = std::env::var("PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(defaults.port);
        Self { bind_addr, port }
    }
}

/// Shared application state.
pub struct AppState {
    /// Backend and auth provider.
    pub services: Services,
    submissions: Mutex<BTreeSet<UserId>>,
}

impl AppState {
    /// Wraps `services` for use by the handlers.
    #[must_use]
    pub fn new(services: Services) -> Self {
        Self {
            services,
            submissions: Mutex::new(BTreeSet::new()),
        }
    }

    /// A repository that talks to the backend as the caller.
    fn repository(&self, access_token: Option<&str>) -> ReportRepository {
        ReportRepository::new(self.services.backend.scoped(access_token))
    }

    /// Marks a submission by `user` as in flight, or returns `None` if one
    /// already is.
    fn begin_submission(&self, user: UserId) -> Option<SubmissionGuard<'_>> {
        let inserted = self
            .submissions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(user);
        inserted.then_some(SubmissionGuard { state: self, user })
    }
}

/// Clears the in-flight marker when the submission settles.
struct SubmissionGuard<'a> {
    state: &'a AppState,
    user: UserId,
}

impl Drop for SubmissionGuard<'_> {
    fn drop(&mut self) {
        self.state
            .submissions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.user);
    }
}

/// Registers the `/api` routes.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            .route("/health", web::get().to(handlers::health))
            .route("/categories", web::get().to(handlers::categories))
            .route("/statuses", web::get().to(handlers::statuses))
            .route("/reports", web::get().to(handlers::list_reports))
            .route("/reports", web::post().to(handlers::submit_report))
            .route("/reports/{id}", web::get().to(handlers::get_report))
            .route(
                "/reports/{id}/transitions",
                web::get().to(handlers::report_transitions),
            )
            .route("/admin/reports", web::get().to(handlers::admin_reports))
            .route(
                "/admin/reports/{id}/status",
                web::patch().to(handlers::update_status),
            )
            .route("/auth/sign-in", web::post().to(handlers::sign_in))
            .route("/auth/sign-up", web::post().to(handlers::sign_up))
            .route("/auth/sign-out", web::post().to(handlers::sign_out))
            .route("/auth/me", web::get().to(handlers::me))
            .route("/diagnostics", web::get().to(handlers::diagnostics)),
    );
}

/// Starts the Cora API server.
///
/// This is a regular async function; the caller provides the runtime (e.g.
/// via `#[actix_web::main]`) and initializes logging.
///
/// # Errors
///
/// Returns an `std::io::Result` error if the HTTP server fails to bind or
/// encounters a runtime error.
#[allow(clippy::future_not_send)]
pub async fn run_server(services: Services, config: &ServerConfig) -> std::io::Result<()> {
    log::info!("Using {} backend", services.backend.name());
    let state = web::Data::new(AppState::new(services));

    log::info!("Starting server on {}:{}", config.bind_addr, config.port);

    HttpServer::new(move || {
        let cors = Cors::permissive();

        App::new()
            .wrap(cors)
            .wrap(middleware::Logger::default())
            .app_data(state.clone())
            .configure(configure)
    })
    .bind((config.bind_addr.as_str(), config.port))?
    .run()
    .await
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use cora_backend::memory::{InMemoryAuth, InMemoryBackend};

    use super::*;

    fn state() -> AppState {
        AppState::new(Services {
            backend: Arc::new(InMemoryBackend::new()),
            auth: Arc::new(InMemoryAuth::new()),
        })
    }

    #[test]
    fn one_submission_per_user_at_a_time() {
        let state = state();
        let user = UserId::random();
        let guard = state.begin_submission(user);
        assert!(guard.is_some());
        assert!(state.begin_submission(user).is_none());
        assert!(state.begin_submission(UserId::random()).is_some());
        drop(guard);
        assert!(state.begin_submission(user).is_some());
    }

    #[test]
    fn default_config_is_local() {
        let config = ServerConfig::default();
        assert_eq!(config.bind_addr, "127.0.0.1");
        assert_eq!(config.port, 8080);
    }
}
