//! HTTP handler functions for the Cora API.

use std::sync::Arc;

use actix_web::http::{StatusCode, header};
use actix_web::{HttpRequest, HttpResponse, web};
use cora_feed::{FeedKind, ReportFeed};
use cora_report_models::workflow;
use cora_report_models::{Report, ReportCategory, ReportId, ReportStatus, StatusFilter};
use cora_repository::{ReportError, ReportSubmission};
use cora_server_models::{
    ApiCategory, ApiHealth, ApiReport, ApiSession, ApiSignUp, ApiStatus, ApiSubmitted,
    ApiTransition, ApiUser, CredentialsRequest, ReportQueryParams, SubmitReportRequest,
    UpdateStatusRequest,
};
use cora_session::{AuthError, Identity, Session, SessionError, SignUpOutcome};

use crate::AppState;

/// Page the frontend sends anonymous submitters to.
const SIGN_IN_URL: &str = "/signin";

/// Where a successful submitter is sent next.
const AFTER_SUBMIT_URL: &str = "/";

fn error_json(status: StatusCode, message: impl std::fmt::Display) -> HttpResponse {
    HttpResponse::build(status).json(serde_json::json!({
        "error": message.to_string()
    }))
}

fn sign_in_required(message: impl std::fmt::Display) -> HttpResponse {
    HttpResponse::Unauthorized().json(serde_json::json!({
        "error": message.to_string(),
        "signInUrl": SIGN_IN_URL
    }))
}

fn report_error(e: &ReportError) -> HttpResponse {
    match e {
        ReportError::Validation(validation) => {
            let problems: Vec<serde_json::Value> = validation
                .problems
                .iter()
                .map(|p| serde_json::json!({ "field": p.field, "message": p.message }))
                .collect();
            HttpResponse::BadRequest().json(serde_json::json!({
                "error": e.to_string(),
                "problems": problems
            }))
        }
        ReportError::AuthRequired => sign_in_required(e),
        ReportError::NotFound { .. } => error_json(StatusCode::NOT_FOUND, e),
        ReportError::TransitionNotAllowed { .. } => error_json(StatusCode::CONFLICT, e),
        ReportError::Submission { .. } | ReportError::Query { .. } | ReportError::Update { .. } => {
            error_json(StatusCode::BAD_GATEWAY, e)
        }
    }
}

fn auth_error(e: &AuthError) -> HttpResponse {
    match e {
        AuthError::InvalidCredentials { .. } | AuthError::InvalidToken { .. } => {
            sign_in_required(e)
        }
        AuthError::Provider { .. } => error_json(StatusCode::BAD_REQUEST, e),
        AuthError::Transport { .. } => {
            log::error!("Auth provider unavailable: {e}");
            error_json(StatusCode::BAD_GATEWAY, e)
        }
    }
}

fn session_error(e: &SessionError) -> HttpResponse {
    match e {
        SessionError::Invalid { .. } => error_json(StatusCode::BAD_REQUEST, e),
        SessionError::AuthRequired => sign_in_required(e),
        SessionError::Forbidden => error_json(StatusCode::FORBIDDEN, e),
        SessionError::Auth(auth) => auth_error(auth),
        SessionError::AlreadyInitialized => error_json(StatusCode::INTERNAL_SERVER_ERROR, e),
    }
}

fn bearer_token(req: &HttpRequest) -> Option<&str> {
    req.headers()
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// An authenticated caller and the token it authenticated with.
struct Caller {
    identity: Identity,
    access_token: String,
}

async fn authenticate(state: &AppState, req: &HttpRequest) -> Result<Caller, HttpResponse> {
    let Some(token) = bearer_token(req) else {
        return Err(sign_in_required(SessionError::AuthRequired));
    };
    match state.services.auth.get_user(token).await {
        Ok(identity) => Ok(Caller {
            identity,
            access_token: token.to_string(),
        }),
        Err(e) => {
            log::debug!("Rejected bearer token: {e}");
            Err(auth_error(&e))
        }
    }
}

async fn authenticate_admin(state: &AppState, req: &HttpRequest) -> Result<Caller, HttpResponse> {
    let caller = authenticate(state, req).await?;
    if !caller.identity.is_admin() {
        log::warn!("User {} attempted an administrator action", caller.identity.id);
        return Err(session_error(&SessionError::Forbidden));
    }
    Ok(caller)
}

fn parse_filter(raw: Option<&str>) -> Result<Option<StatusFilter>, HttpResponse> {
    raw.map(|s| {
        s.parse::<StatusFilter>().map_err(|_| {
            error_json(
                StatusCode::BAD_REQUEST,
                format!("Unknown status filter '{s}'"),
            )
        })
    })
    .transpose()
}

fn parse_id(raw: &str) -> Result<ReportId, HttpResponse> {
    raw.parse()
        .map_err(|_| error_json(StatusCode::BAD_REQUEST, format!("Invalid report id '{raw}'")))
}

fn with_actions(report: Report) -> ApiReport {
    let actions: Vec<ApiTransition> = workflow::transitions_from(report.status)
        .map(ApiTransition::from)
        .collect();
    ApiReport {
        actions,
        ..ApiReport::from(report)
    }
}

/// `GET /api/health`
pub async fn health(state: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(ApiHealth {
        healthy: true,
        version: env!("CARGO_PKG_VERSION").to_string(),
        backend: state.services.backend.name().to_string(),
    })
}

/// `GET /api/categories`
pub async fn categories() -> HttpResponse {
    let categories: Vec<ApiCategory> = ReportCategory::all()
        .iter()
        .map(|&name| ApiCategory {
            name,
            label: name.label().to_string(),
        })
        .collect();
    HttpResponse::Ok().json(categories)
}

/// `GET /api/statuses`
pub async fn statuses() -> HttpResponse {
    let statuses: Vec<ApiStatus> = ReportStatus::all()
        .iter()
        .map(|&name| ApiStatus {
            name,
            label: name.label().to_string(),
            color: name.color(),
        })
        .collect();
    HttpResponse::Ok().json(statuses)
}

/// `GET /api/reports`
///
/// The public feed, newest first. `status` defaults to `all`.
pub async fn list_reports(
    state: web::Data<AppState>,
    params: web::Query<ReportQueryParams>,
) -> HttpResponse {
    let filter = match parse_filter(params.status.as_deref()) {
        Ok(filter) => filter,
        Err(resp) => return resp,
    };
    let feed = ReportFeed::new(state.repository(None), FeedKind::Public);
    match feed.fetch(filter).await {
        Ok(reports) => {
            let reports: Vec<ApiReport> = reports.into_iter().map(ApiReport::from).collect();
            HttpResponse::Ok().json(reports)
        }
        Err(e) => report_error(&e),
    }
}

/// `GET /api/reports/{id}`
pub async fn get_report(state: web::Data<AppState>, path: web::Path<String>) -> HttpResponse {
    let id = match parse_id(&path) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    match state.repository(None).get(id).await {
        Ok(report) => HttpResponse::Ok().json(ApiReport::from(report)),
        Err(e) => report_error(&e),
    }
}

/// `GET /api/reports/{id}/transitions`
///
/// Status changes the workflow allows from the report's current status.
pub async fn report_transitions(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> HttpResponse {
    let id = match parse_id(&path) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    match state.repository(None).get(id).await {
        Ok(report) => {
            let transitions: Vec<ApiTransition> = workflow::transitions_from(report.status)
                .map(ApiTransition::from)
                .collect();
            HttpResponse::Ok().json(transitions)
        }
        Err(e) => report_error(&e),
    }
}

/// `POST /api/reports`
///
/// Submits a report as the caller. Anonymous callers get `401` with a
/// `signInUrl`; a second submission while the first is in flight gets
/// `409`.
pub async fn submit_report(
    req: HttpRequest,
    state: web::Data<AppState>,
    body: web::Json<SubmitReportRequest>,
) -> HttpResponse {
    let caller = match authenticate(&state, &req).await {
        Ok(caller) => caller,
        Err(resp) => return resp,
    };
    let Some(_submission) = state.begin_submission(caller.identity.id) else {
        return error_json(StatusCode::CONFLICT, "A submission is already in progress");
    };

    let body = body.into_inner();
    let fields = ReportSubmission {
        category: body.category,
        title: body.title,
        description: body.description,
        address_text: body.address_text,
        latitude: body.latitude.to_string(),
        longitude: body.longitude.to_string(),
    };

    match state
        .repository(Some(&caller.access_token))
        .submit(Some(&caller.identity), &fields)
        .await
    {
        Ok(id) => HttpResponse::Created().json(ApiSubmitted {
            id,
            redirect_to: AFTER_SUBMIT_URL.to_string(),
        }),
        Err(e) => report_error(&e),
    }
}

/// `GET /api/admin/reports`
///
/// The review dashboard feed. `status` defaults to `unverified`; each
/// report carries the actions available for it.
pub async fn admin_reports(
    req: HttpRequest,
    state: web::Data<AppState>,
    params: web::Query<ReportQueryParams>,
) -> HttpResponse {
    let caller = match authenticate_admin(&state, &req).await {
        Ok(caller) => caller,
        Err(resp) => return resp,
    };
    let filter = match parse_filter(params.status.as_deref()) {
        Ok(filter) => filter,
        Err(resp) => return resp,
    };
    let feed = ReportFeed::new(
        state.repository(Some(&caller.access_token)),
        FeedKind::Admin,
    );
    match feed.fetch(filter).await {
        Ok(reports) => {
            let reports: Vec<ApiReport> = reports.into_iter().map(with_actions).collect();
            HttpResponse::Ok().json(reports)
        }
        Err(e) => report_error(&e),
    }
}

/// `PATCH /api/admin/reports/{id}/status`
///
/// Applies a workflow-checked status change.
pub async fn update_status(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<String>,
    body: web::Json<UpdateStatusRequest>,
) -> HttpResponse {
    let caller = match authenticate_admin(&state, &req).await {
        Ok(caller) => caller,
        Err(resp) => return resp,
    };
    let id = match parse_id(&path) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let Ok(target) = body.status.trim().to_ascii_lowercase().parse::<ReportStatus>() else {
        return error_json(
            StatusCode::BAD_REQUEST,
            format!("Unknown status '{}'", body.status),
        );
    };

    match state
        .repository(Some(&caller.access_token))
        .transition(id, target)
        .await
    {
        Ok(report) => {
            log::info!("Admin {} set report {id} to {target}", caller.identity.id);
            HttpResponse::Ok().json(with_actions(report))
        }
        Err(e) => report_error(&e),
    }
}

/// `POST /api/auth/sign-in`
pub async fn sign_in(
    state: web::Data<AppState>,
    body: web::Json<CredentialsRequest>,
) -> HttpResponse {
    let session = Session::new(Arc::clone(&state.services.auth));
    if let Err(e) = session.sign_in(&body.email, &body.password).await {
        return session_error(&e);
    }
    session.snapshot().map_or_else(
        || session_error(&SessionError::AuthRequired),
        |established| HttpResponse::Ok().json(ApiSession::from(established)),
    )
}

/// `POST /api/auth/sign-up`
///
/// `201` with a session when the account is usable immediately, `202`
/// when the provider wants the address confirmed first.
pub async fn sign_up(
    state: web::Data<AppState>,
    body: web::Json<CredentialsRequest>,
) -> HttpResponse {
    let session = Session::new(Arc::clone(&state.services.auth));
    match session.sign_up(&body.email, &body.password).await {
        Ok(SignUpOutcome::SignedIn(established)) => {
            HttpResponse::Created().json(ApiSignUp::SignedIn {
                session: established.into(),
            })
        }
        Ok(SignUpOutcome::ConfirmationRequired { email }) => {
            HttpResponse::Accepted().json(ApiSignUp::ConfirmationRequired { email })
        }
        Err(e) => session_error(&e),
    }
}

/// `POST /api/auth/sign-out`
pub async fn sign_out(req: HttpRequest, state: web::Data<AppState>) -> HttpResponse {
    let Some(token) = bearer_token(&req) else {
        return sign_in_required(SessionError::AuthRequired);
    };
    match state.services.auth.sign_out(token).await {
        Ok(()) => HttpResponse::NoContent().finish(),
        Err(e) => auth_error(&e),
    }
}

/// `GET /api/auth/me`
pub async fn me(req: HttpRequest, state: web::Data<AppState>) -> HttpResponse {
    match authenticate(&state, &req).await {
        Ok(caller) => HttpResponse::Ok().json(ApiUser::from(caller.identity)),
        Err(resp) => resp,
    }
}

/// `GET /api/diagnostics`
///
/// Always answers `200`; failures are reported per check.
pub async fn diagnostics(req: HttpRequest, state: web::Data<AppState>) -> HttpResponse {
    let diagnostics = crate::diagnostics::run_checks(&state.services, bearer_token(&req)).await;
    HttpResponse::Ok().json(diagnostics)
}
