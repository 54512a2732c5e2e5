//! Connectivity checks shared by `GET /api/diagnostics` and `cora check`.

use cora_backend::{ReportQuery, Services};
use cora_report_models::StatusFilter;
use cora_repository::ReportRepository;
use cora_server_models::{ApiCheck, ApiDiagnostics};

fn check<T, E: std::fmt::Display>(
    name: &str,
    result: Result<T, E>,
    detail: impl FnOnce(T) -> String,
) -> ApiCheck {
    match result {
        Ok(value) => ApiCheck {
            name: name.to_string(),
            ok: true,
            detail: detail(value),
        },
        Err(e) => {
            log::warn!("Diagnostic check '{name}' failed: {e}");
            ApiCheck {
                name: name.to_string(),
                ok: false,
                detail: e.to_string(),
            }
        }
    }
}

/// Probes the backend connection, a full reports query, and the session
/// owning `access_token`, in that order.
///
/// Without a token the auth check passes with "No active session".
pub async fn run_checks(services: &Services, access_token: Option<&str>) -> ApiDiagnostics {
    let backend = &services.backend;
    let name = backend.name();

    let probe = ReportQuery {
        limit: Some(1),
        ..ReportQuery::default()
    };
    let connection = check("connection", backend.select_reports(&probe).await, |_| {
        format!("Connected to {name} backend")
    });

    let reports = check(
        "reports",
        ReportRepository::new(backend.scoped(access_token))
            .list_by_status(StatusFilter::All)
            .await,
        |reports| format!("{} reports readable", reports.len()),
    );

    let auth = match access_token {
        None => ApiCheck {
            name: "auth".to_string(),
            ok: true,
            detail: "No active session".to_string(),
        },
        Some(token) => check("auth", services.auth.get_user(token).await, |identity| {
            format!(
                "Signed in as {} ({})",
                identity.email.as_deref().unwrap_or("unknown email"),
                identity.role
            )
        }),
    };

    ApiDiagnostics {
        backend: name.to_string(),
        checks: vec![connection, reports, auth],
    }
}
