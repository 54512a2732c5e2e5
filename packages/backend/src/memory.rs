//! In-process backend and auth provider.
//!
//! Both behave like their hosted counterparts closely enough to exercise
//! the application end to end: `create_point` returns PostGIS-style hex
//! EWKB, selections come back newest first, and error bodies carry the
//! same kinds of messages. Each capability can be switched off to
//! simulate a deployment without the procedure, a policy that rejects
//! inserts, or an outage, and every call is counted.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, TimeDelta, Utc};
use cora_geometry::{Coordinates, GeometryToken, WGS84_SRID, ewkb};
use cora_report_models::{
    InsertReportArgs, NewReportRecord, ReportId, ReportRecord, ReportStatus, UserId,
};
use cora_session::{AuthError, AuthProvider, AuthSession, Identity, Role, SignUpOutcome};

use crate::{Backend, BackendError, RemoteProcedures, ReportQuery, ReportStore};

/// Number of calls made to each backend operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    /// `insert_report` procedure calls.
    pub insert_report_rpc: usize,
    /// `create_point` procedure calls.
    pub create_point: usize,
    /// Direct inserts.
    pub insert: usize,
    /// Selections.
    pub select: usize,
    /// Status updates.
    pub update: usize,
}

impl CallCounts {
    /// Total number of backend calls.
    #[must_use]
    pub const fn total(&self) -> usize {
        self.insert_report_rpc + self.create_point + self.insert + self.select + self.update
    }
}

#[derive(Default)]
struct Counters {
    insert_report_rpc: AtomicUsize,
    create_point: AtomicUsize,
    insert: AtomicUsize,
    select: AtomicUsize,
    update: AtomicUsize,
}

struct Capabilities {
    insert_report_rpc: AtomicBool,
    create_point: AtomicBool,
    insert: AtomicBool,
    select: AtomicBool,
    update: AtomicBool,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            insert_report_rpc: AtomicBool::new(true),
            create_point: AtomicBool::new(true),
            insert: AtomicBool::new(true),
            select: AtomicBool::new(true),
            update: AtomicBool::new(true),
        }
    }
}

#[derive(Default)]
struct MemoryState {
    records: Mutex<Vec<ReportRecord>>,
    calls: Counters,
    capabilities: Capabilities,
}

/// In-process `reports` store and procedures.
///
/// Clones share the same data.
#[derive(Clone, Default)]
pub struct InMemoryBackend {
    state: Arc<MemoryState>,
}

fn missing_function(name: &str) -> BackendError {
    BackendError::Api {
        status: 404,
        code: Some("PGRST202".to_string()),
        message: format!("Could not find the function public.{name} in the schema cache"),
    }
}

fn policy_violation() -> BackendError {
    BackendError::Api {
        status: 403,
        code: Some("42501".to_string()),
        message: "new row violates row-level security policy for table \"reports\"".to_string(),
    }
}

fn service_unavailable() -> BackendError {
    BackendError::Api {
        status: 503,
        code: None,
        message: "Service Unavailable".to_string(),
    }
}

impl InMemoryBackend {
    /// Creates an empty backend with every capability enabled.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Enables or disables the `insert_report` procedure.
    pub fn set_insert_report_rpc_available(&self, available: bool) {
        self.state
            .capabilities
            .insert_report_rpc
            .store(available, Ordering::SeqCst);
    }

    /// Enables or disables the `create_point` procedure.
    pub fn set_create_point_available(&self, available: bool) {
        self.state
            .capabilities
            .create_point
            .store(available, Ordering::SeqCst);
    }

    /// Makes direct inserts succeed or fail with a policy violation.
    pub fn set_insert_available(&self, available: bool) {
        self.state
            .capabilities
            .insert
            .store(available, Ordering::SeqCst);
    }

    /// Makes selections succeed or fail as if the service were down.
    pub fn set_select_available(&self, available: bool) {
        self.state
            .capabilities
            .select
            .store(available, Ordering::SeqCst);
    }

    /// Makes status updates succeed or fail with a policy violation.
    pub fn set_update_available(&self, available: bool) {
        self.state
            .capabilities
            .update
            .store(available, Ordering::SeqCst);
    }

    /// Calls made so far.
    #[must_use]
    pub fn calls(&self) -> CallCounts {
        let calls = &self.state.calls;
        CallCounts {
            insert_report_rpc: calls.insert_report_rpc.load(Ordering::SeqCst),
            create_point: calls.create_point.load(Ordering::SeqCst),
            insert: calls.insert.load(Ordering::SeqCst),
            select: calls.select.load(Ordering::SeqCst),
            update: calls.update.load(Ordering::SeqCst),
        }
    }

    /// Every stored row, in insertion order.
    #[must_use]
    pub fn records(&self) -> Vec<ReportRecord> {
        self.lock().clone()
    }

    /// Stores `record` as is, bypassing counters and capabilities.
    pub fn seed(&self, record: ReportRecord) {
        self.lock().push(record);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<ReportRecord>> {
        self.state
            .records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn enabled(flag: &AtomicBool) -> bool {
        flag.load(Ordering::SeqCst)
    }

    fn count(counter: &AtomicUsize) {
        counter.fetch_add(1, Ordering::SeqCst);
    }

    /// Creation time strictly after every stored row so ordering is total.
    fn next_created_at(records: &[ReportRecord]) -> DateTime<Utc> {
        let now = Utc::now();
        match records.iter().map(|r| r.created_at).max() {
            Some(latest) if latest >= now => latest + TimeDelta::microseconds(1),
            _ => now,
        }
    }

    fn store(&self, new: NewReportRecord) -> ReportRecord {
        let mut records = self.lock();
        let record = ReportRecord {
            id: ReportId::random(),
            user_id: new.user_id,
            category: new.category,
            title: new.title,
            description: new.description,
            status: new.status,
            address_text: new.address_text,
            geom: new.geom.0,
            created_at: Self::next_created_at(&records),
            confidence_score: Some(new.confidence_score),
            media_count: Some(new.media_count),
        };
        records.push(record.clone());
        record
    }
}

fn ewkb_token(point: Coordinates) -> GeometryToken {
    GeometryToken(serde_json::Value::String(ewkb::encode_point(
        point,
        Some(WGS84_SRID),
    )))
}

#[async_trait::async_trait]
impl ReportStore for InMemoryBackend {
    async fn select_reports(&self, query: &ReportQuery) -> Result<Vec<ReportRecord>, BackendError> {
        Self::count(&self.state.calls.select);
        if !Self::enabled(&self.state.capabilities.select) {
            return Err(service_unavailable());
        }

        let mut rows: Vec<ReportRecord> = self
            .lock()
            .iter()
            .filter(|r| query.filter.matches(r.status))
            .filter(|r| query.id.is_none_or(|id| r.id == id))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        if let Some(limit) = query.limit {
            rows.truncate(limit);
        }
        Ok(rows)
    }

    async fn insert_report(&self, record: &NewReportRecord) -> Result<ReportRecord, BackendError> {
        Self::count(&self.state.calls.insert);
        if !Self::enabled(&self.state.capabilities.insert) {
            return Err(policy_violation());
        }
        if record.geom.decode().is_none() {
            return Err(BackendError::Api {
                status: 400,
                code: Some("XX000".to_string()),
                message: "parse error - invalid geometry".to_string(),
            });
        }
        Ok(self.store(record.clone()))
    }

    async fn update_report_status(
        &self,
        id: ReportId,
        status: ReportStatus,
    ) -> Result<Option<ReportRecord>, BackendError> {
        Self::count(&self.state.calls.update);
        if !Self::enabled(&self.state.capabilities.update) {
            return Err(policy_violation());
        }
        let mut records = self.lock();
        Ok(records.iter_mut().find(|r| r.id == id).map(|r| {
            r.status = status;
            r.clone()
        }))
    }
}

#[async_trait::async_trait]
impl RemoteProcedures for InMemoryBackend {
    async fn insert_report_rpc(
        &self,
        args: &InsertReportArgs,
    ) -> Result<Option<ReportId>, BackendError> {
        Self::count(&self.state.calls.insert_report_rpc);
        if !Self::enabled(&self.state.capabilities.insert_report_rpc) {
            return Err(missing_function("insert_report"));
        }
        let point = args.coordinates().map_err(|e| BackendError::Api {
            status: 400,
            code: Some("22023".to_string()),
            message: e.to_string(),
        })?;
        let record = self.store(NewReportRecord::unverified(
            args.p_user_id,
            args.p_category,
            args.p_title.clone(),
            args.p_description.clone(),
            args.p_address_text.clone(),
            ewkb_token(point),
        ));
        Ok(Some(record.id))
    }

    async fn create_point(&self, point: Coordinates) -> Result<GeometryToken, BackendError> {
        Self::count(&self.state.calls.create_point);
        if !Self::enabled(&self.state.capabilities.create_point) {
            return Err(missing_function("create_point"));
        }
        Ok(ewkb_token(point))
    }
}

impl Backend for InMemoryBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn scoped(&self, _access_token: Option<&str>) -> Arc<dyn Backend> {
        Arc::new(self.clone())
    }
}

struct MemoryUser {
    id: UserId,
    password: String,
    role: Role,
}

#[derive(Default)]
struct AuthState {
    users: BTreeMap<String, MemoryUser>,
    access_tokens: BTreeMap<String, String>,
    refresh_tokens: BTreeMap<String, String>,
    require_confirmation: bool,
}

impl AuthState {
    fn identity(&self, email: &str) -> Option<Identity> {
        self.users.get(email).map(|user| Identity {
            id: user.id,
            email: Some(email.to_string()),
            role: user.role,
        })
    }

    fn issue(&mut self, email: &str) -> Option<AuthSession> {
        let identity = self.identity(email)?;
        let access_token = uuid::Uuid::new_v4().to_string();
        let refresh_token = uuid::Uuid::new_v4().to_string();
        self.access_tokens
            .insert(access_token.clone(), email.to_string());
        self.refresh_tokens
            .insert(refresh_token.clone(), email.to_string());
        Some(AuthSession {
            access_token,
            refresh_token: Some(refresh_token),
            identity,
        })
    }
}

/// In-process auth provider with email/password accounts.
#[derive(Default)]
pub struct InMemoryAuth {
    state: Mutex<AuthState>,
}

impl InMemoryAuth {
    /// Creates a provider with no accounts.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, AuthState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Creates (or replaces) an account and returns its id.
    pub fn add_user(&self, email: &str, password: &str, role: Role) -> UserId {
        let id = UserId::random();
        self.lock().users.insert(
            email.trim().to_ascii_lowercase(),
            MemoryUser {
                id,
                password: password.to_string(),
                role,
            },
        );
        id
    }

    /// When set, sign-ups create the account but return no session.
    pub fn set_require_confirmation(&self, required: bool) {
        self.lock().require_confirmation = required;
    }

    /// Invalidates every access token, as if they had all expired.
    pub fn expire_access_tokens(&self) {
        self.lock().access_tokens.clear();
    }
}

#[async_trait::async_trait]
impl AuthProvider for InMemoryAuth {
    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthSession, AuthError> {
        let email = email.trim().to_ascii_lowercase();
        let mut state = self.lock();
        let valid = state
            .users
            .get(&email)
            .is_some_and(|user| user.password == password);
        if !valid {
            return Err(AuthError::InvalidCredentials {
                message: "Invalid login credentials".to_string(),
            });
        }
        state.issue(&email).ok_or_else(|| AuthError::InvalidCredentials {
            message: "Invalid login credentials".to_string(),
        })
    }

    async fn sign_up(&self, email: &str, password: &str) -> Result<SignUpOutcome, AuthError> {
        let email = email.trim().to_ascii_lowercase();
        let mut state = self.lock();
        if state.users.contains_key(&email) {
            return Err(AuthError::Provider {
                message: "User already registered".to_string(),
            });
        }
        state.users.insert(
            email.clone(),
            MemoryUser {
                id: UserId::random(),
                password: password.to_string(),
                role: Role::Member,
            },
        );
        if state.require_confirmation {
            return Ok(SignUpOutcome::ConfirmationRequired { email });
        }
        state
            .issue(&email)
            .map(SignUpOutcome::SignedIn)
            .ok_or_else(|| AuthError::Provider {
                message: "User vanished during sign-up".to_string(),
            })
    }

    async fn sign_out(&self, access_token: &str) -> Result<(), AuthError> {
        let mut state = self.lock();
        let Some(email) = state.access_tokens.remove(access_token) else {
            return Err(AuthError::InvalidToken {
                message: "Session not found".to_string(),
            });
        };
        state.refresh_tokens.retain(|_, owner| *owner != email);
        Ok(())
    }

    async fn get_user(&self, access_token: &str) -> Result<Identity, AuthError> {
        let state = self.lock();
        state
            .access_tokens
            .get(access_token)
            .and_then(|email| state.identity(email))
            .ok_or_else(|| AuthError::InvalidToken {
                message: "invalid JWT: token is expired".to_string(),
            })
    }

    async fn refresh(&self, refresh_token: &str) -> Result<AuthSession, AuthError> {
        let mut state = self.lock();
        let email = state
            .refresh_tokens
            .remove(refresh_token)
            .ok_or_else(|| AuthError::InvalidToken {
                message: "Invalid Refresh Token: Refresh Token Not Found".to_string(),
            })?;
        state.issue(&email).ok_or_else(|| AuthError::InvalidToken {
            message: "User not found".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use cora_report_models::{ReportCategory, StatusFilter};

    use super::*;

    fn args(lat: f64, lon: f64) -> InsertReportArgs {
        InsertReportArgs {
            p_user_id: UserId::random(),
            p_category: ReportCategory::Theft,
            p_title: "Bike stolen".to_string(),
            p_description: "From the rack".to_string(),
            p_address_text: "4199 Campus Dr".to_string(),
            p_lat: lat,
            p_lon: lon,
        }
    }

    #[tokio::test]
    async fn rpc_insert_stores_decodable_geometry() {
        let backend = InMemoryBackend::new();
        let id = backend
            .insert_report_rpc(&args(33.6846, -117.8265))
            .await
            .unwrap()
            .unwrap();

        let records = backend.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, id);
        assert_eq!(records[0].status, ReportStatus::Unverified);
        let point = cora_geometry::decode(&records[0].geom).unwrap();
        assert!(point.approx_eq(&Coordinates::new(33.6846, -117.8265).unwrap(), 1e-9));
    }

    #[tokio::test]
    async fn disabled_capabilities_fail_and_are_counted() {
        let backend = InMemoryBackend::new();
        backend.set_insert_report_rpc_available(false);
        backend.set_create_point_available(false);
        backend.set_select_available(false);

        assert!(backend.insert_report_rpc(&args(1.0, 2.0)).await.is_err());
        assert!(
            backend
                .create_point(Coordinates::new(1.0, 2.0).unwrap())
                .await
                .is_err()
        );
        assert!(backend.select_reports(&ReportQuery::default()).await.is_err());
        assert_eq!(
            backend.calls(),
            CallCounts {
                insert_report_rpc: 1,
                create_point: 1,
                select: 1,
                ..CallCounts::default()
            }
        );
        assert!(backend.records().is_empty());
    }

    #[tokio::test]
    async fn direct_insert_rejects_bad_geometry() {
        let backend = InMemoryBackend::new();
        let record = NewReportRecord::unverified(
            UserId::random(),
            ReportCategory::Other,
            "t".to_string(),
            "d".to_string(),
            "a".to_string(),
            GeometryToken(serde_json::json!("garbage")),
        );
        assert!(backend.insert_report(&record).await.is_err());
        assert!(backend.records().is_empty());
    }

    #[tokio::test]
    async fn select_orders_newest_first_and_filters() {
        let backend = InMemoryBackend::new();
        let first = backend.insert_report_rpc(&args(1.0, 1.0)).await.unwrap().unwrap();
        let second = backend.insert_report_rpc(&args(2.0, 2.0)).await.unwrap().unwrap();
        backend
            .update_report_status(first, ReportStatus::Verified)
            .await
            .unwrap()
            .unwrap();

        let all = backend.select_reports(&ReportQuery::default()).await.unwrap();
        let ids: Vec<ReportId> = all.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![second, first]);

        let verified = backend
            .select_reports(&ReportQuery::by_status(StatusFilter::Only(
                ReportStatus::Verified,
            )))
            .await
            .unwrap();
        assert_eq!(verified.len(), 1);
        assert_eq!(verified[0].id, first);

        let missing = backend
            .update_report_status(ReportId::random(), ReportStatus::Resolved)
            .await
            .unwrap();
        assert_eq!(missing, None);
    }

    #[tokio::test]
    async fn auth_sign_in_refresh_and_sign_out() {
        let auth = InMemoryAuth::new();
        let id = auth.add_user("Admin@Example.com", "secret1", Role::Admin);

        assert!(matches!(
            auth.sign_in("admin@example.com", "wrong").await,
            Err(AuthError::InvalidCredentials { .. })
        ));

        let session = auth.sign_in("admin@example.com", "secret1").await.unwrap();
        assert_eq!(session.identity.id, id);
        assert!(session.identity.is_admin());
        assert_eq!(auth.get_user(&session.access_token).await.unwrap().id, id);

        auth.expire_access_tokens();
        assert!(auth.get_user(&session.access_token).await.is_err());
        let refreshed = auth
            .refresh(session.refresh_token.as_deref().unwrap())
            .await
            .unwrap();
        assert_eq!(refreshed.identity.id, id);

        auth.sign_out(&refreshed.access_token).await.unwrap();
        assert!(auth.get_user(&refreshed.access_token).await.is_err());
    }

    #[tokio::test]
    async fn auth_sign_up_variants() {
        let auth = InMemoryAuth::new();
        let outcome = auth.sign_up("new@example.com", "secret1").await.unwrap();
        assert!(matches!(outcome, SignUpOutcome::SignedIn(ref s) if !s.identity.is_admin()));
        assert!(matches!(
            auth.sign_up("new@example.com", "secret1").await,
            Err(AuthError::Provider { .. })
        ));

        auth.set_require_confirmation(true);
        let outcome = auth.sign_up("later@example.com", "secret1").await.unwrap();
        assert_eq!(
            outcome,
            SignUpOutcome::ConfirmationRequired {
                email: "later@example.com".to_string()
            }
        );
    }
}
