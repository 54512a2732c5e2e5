//! Supabase-style REST backend: PostgREST for the `reports` table and the
//! remote procedures.

use std::sync::Arc;

use cora_geometry::{Coordinates, GeometryToken};
use cora_report_models::{
    InsertReportArgs, NewReportRecord, ReportId, ReportRecord, ReportStatus, StatusFilter,
};
use serde_json::json;

use crate::{Backend, BackendError, RemoteProcedures, ReportQuery, ReportStore, RestConfig, retry};

/// Builds the shared HTTP client for `config`.
///
/// # Errors
///
/// Returns [`BackendError::Http`] if the TLS backend cannot be initialised.
pub fn build_client(config: &RestConfig) -> Result<reqwest::Client, BackendError> {
    Ok(reqwest::Client::builder().timeout(config.timeout).build()?)
}

/// PostgREST client for the `reports` table and procedures.
#[derive(Clone)]
pub struct RestBackend {
    client: reqwest::Client,
    config: Arc<RestConfig>,
    access_token: Option<String>,
}

impl RestBackend {
    /// Creates an anonymous client.
    #[must_use]
    pub const fn new(client: reqwest::Client, config: Arc<RestConfig>) -> Self {
        Self {
            client,
            config,
            access_token: None,
        }
    }

    fn bearer(&self) -> &str {
        self.access_token
            .as_deref()
            .unwrap_or(self.config.anon_key.as_str())
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, self.config.endpoint(path))
            .header("apikey", &self.config.anon_key)
            .bearer_auth(self.bearer())
    }

    fn rpc(&self, name: &str) -> reqwest::RequestBuilder {
        self.request(reqwest::Method::POST, &format!("rest/v1/rpc/{name}"))
    }
}

/// PostgREST query parameters for `query`.
fn select_params(query: &ReportQuery) -> Vec<(&'static str, String)> {
    let mut params = vec![
        ("select", "*".to_string()),
        ("order", "created_at.desc".to_string()),
    ];
    if let StatusFilter::Only(status) = query.filter {
        params.push(("status", format!("eq.{status}")));
    }
    if let Some(id) = query.id {
        params.push(("id", format!("eq.{id}")));
    }
    if let Some(limit) = query.limit {
        params.push(("limit", limit.to_string()));
    }
    params
}

/// Takes the first row of a `return=representation` response.
fn first_row(value: serde_json::Value) -> Result<Option<ReportRecord>, BackendError> {
    let rows: Vec<ReportRecord> = match value {
        serde_json::Value::Null => Vec::new(),
        serde_json::Value::Array(_) => serde_json::from_value(value)?,
        row @ serde_json::Value::Object(_) => vec![serde_json::from_value(row)?],
        other => {
            return Err(BackendError::Decode {
                message: format!("expected report rows, got {other}"),
            });
        }
    };
    Ok(rows.into_iter().next())
}

/// Reads the identifier returned by `insert_report`.
///
/// Accepts a bare UUID string, `null`, an object with an `id` field, or a
/// single-row array of either.
fn parse_rpc_id(value: &serde_json::Value) -> Result<Option<ReportId>, BackendError> {
    match value {
        serde_json::Value::Null => Ok(None),
        serde_json::Value::String(id) => id.parse().map(Some).map_err(|e| BackendError::Decode {
            message: format!("insert_report returned an invalid id '{id}': {e}"),
        }),
        serde_json::Value::Object(fields) => fields
            .get("id")
            .or_else(|| fields.get("insert_report"))
            .map_or(Ok(None), parse_rpc_id),
        serde_json::Value::Array(rows) => rows.first().map_or(Ok(None), parse_rpc_id),
        other => Err(BackendError::Decode {
            message: format!("insert_report returned {other}"),
        }),
    }
}

#[async_trait::async_trait]
impl ReportStore for RestBackend {
    async fn select_reports(&self, query: &ReportQuery) -> Result<Vec<ReportRecord>, BackendError> {
        let params = select_params(query);
        let body = retry::send_json(|| {
            self.request(reqwest::Method::GET, "rest/v1/reports")
                .query(&params)
        })
        .await?;
        log::debug!("Selected reports with {params:?}");
        Ok(serde_json::from_value(body)?)
    }

    async fn insert_report(&self, record: &NewReportRecord) -> Result<ReportRecord, BackendError> {
        let body = retry::send_json_once(
            self.request(reqwest::Method::POST, "rest/v1/reports")
                .header("Prefer", "return=representation")
                .json(record),
        )
        .await?;
        first_row(body)?.ok_or_else(|| BackendError::Decode {
            message: "insert returned no row".to_string(),
        })
    }

    async fn update_report_status(
        &self,
        id: ReportId,
        status: ReportStatus,
    ) -> Result<Option<ReportRecord>, BackendError> {
        let body = retry::send_json_once(
            self.request(reqwest::Method::PATCH, "rest/v1/reports")
                .query(&[("id", format!("eq.{id}"))])
                .header("Prefer", "return=representation")
                .json(&json!({ "status": status })),
        )
        .await?;
        first_row(body)
    }
}

#[async_trait::async_trait]
impl RemoteProcedures for RestBackend {
    async fn insert_report_rpc(
        &self,
        args: &InsertReportArgs,
    ) -> Result<Option<ReportId>, BackendError> {
        let body = retry::send_json_once(self.rpc("insert_report").json(args)).await?;
        parse_rpc_id(&body)
    }

    async fn create_point(&self, point: Coordinates) -> Result<GeometryToken, BackendError> {
        let body = retry::send_json_once(
            self.rpc("create_point")
                .json(&json!({ "lat": point.latitude, "lon": point.longitude })),
        )
        .await?;
        if body.is_null() {
            return Err(BackendError::Decode {
                message: "create_point returned no geometry".to_string(),
            });
        }
        Ok(GeometryToken(body))
    }
}

impl Backend for RestBackend {
    fn name(&self) -> &'static str {
        "rest"
    }

    fn scoped(&self, access_token: Option<&str>) -> Arc<dyn Backend> {
        Arc::new(Self {
            access_token: access_token.map(str::to_string),
            ..self.clone()
        })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn backend() -> RestBackend {
        let config = RestConfig::new("https://abc.supabase.co", "anon", Duration::from_secs(5))
            .unwrap();
        let config = Arc::new(config);
        RestBackend::new(build_client(&config).unwrap(), config)
    }

    #[test]
    fn select_params_for_filters() {
        let all = select_params(&ReportQuery::by_status(StatusFilter::All));
        assert_eq!(
            all,
            vec![
                ("select", "*".to_string()),
                ("order", "created_at.desc".to_string())
            ]
        );

        let verified = select_params(&ReportQuery::by_status(ReportStatus::Verified.into()));
        assert!(verified.contains(&("status", "eq.verified".to_string())));

        let id = ReportId::random();
        let single = select_params(&ReportQuery::by_id(id));
        assert!(single.contains(&("id", format!("eq.{id}"))));
        assert!(single.contains(&("limit", "1".to_string())));
    }

    #[test]
    fn requests_carry_key_and_bearer() {
        let anon = backend();
        let request = anon
            .request(reqwest::Method::GET, "rest/v1/reports")
            .build()
            .unwrap();
        assert_eq!(request.url().as_str(), "https://abc.supabase.co/rest/v1/reports");
        assert_eq!(request.headers()["apikey"], "anon");
        assert_eq!(request.headers()["authorization"], "Bearer anon");

        let user = RestBackend {
            access_token: Some("user-jwt".to_string()),
            ..anon
        };
        let request = user.rpc("insert_report").build().unwrap();
        assert_eq!(
            request.url().as_str(),
            "https://abc.supabase.co/rest/v1/rpc/insert_report"
        );
        assert_eq!(request.headers()["authorization"], "Bearer user-jwt");
    }

    #[test]
    fn rpc_id_shapes() {
        let id = ReportId::random();
        assert_eq!(parse_rpc_id(&json!(id.to_string())).unwrap(), Some(id));
        assert_eq!(parse_rpc_id(&json!({ "id": id.to_string() })).unwrap(), Some(id));
        assert_eq!(
            parse_rpc_id(&json!([{ "insert_report": id.to_string() }])).unwrap(),
            Some(id)
        );
        assert_eq!(parse_rpc_id(&json!(null)).unwrap(), None);
        assert_eq!(parse_rpc_id(&json!([])).unwrap(), None);
        assert!(parse_rpc_id(&json!("nope")).is_err());
        assert!(parse_rpc_id(&json!(7)).is_err());
    }

    #[test]
    fn first_row_of_representation() {
        assert_eq!(first_row(json!([])).unwrap(), None);
        assert!(first_row(json!("x")).is_err());
        let row = json!([{
            "id": "6d1f4f8e-8a4c-4a64-9c3e-6f1b1c2d3e4f",
            "user_id": "0b6c1e2a-3d4f-4a5b-8c9d-0e1f2a3b4c5d",
            "category": "burglary",
            "title": "t",
            "description": "d",
            "status": "verified",
            "address_text": "a",
            "geom": "0101000020E6100000F4FDD478E9755DC0B3EA73B515D74040",
            "created_at": "2025-03-01T18:22:05Z",
            "confidence_score": 0.5,
            "media_count": 0
        }]);
        let record = first_row(row).unwrap().unwrap();
        assert_eq!(record.status, ReportStatus::Verified);
    }
}
