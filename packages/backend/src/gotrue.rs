//! GoTrue auth client.

use std::sync::Arc;

use cora_report_models::UserId;
use cora_session::{AuthError, AuthProvider, AuthSession, Identity, Role, SignUpOutcome};
use serde::Deserialize;
use serde_json::json;

use crate::{BackendError, RestConfig, retry};

/// [`AuthProvider`] backed by a GoTrue `/auth/v1` endpoint.
#[derive(Clone)]
pub struct GoTrueAuth {
    client: reqwest::Client,
    config: Arc<RestConfig>,
}

impl GoTrueAuth {
    /// Creates a client for the deployment in `config`.
    #[must_use]
    pub const fn new(client: reqwest::Client, config: Arc<RestConfig>) -> Self {
        Self { client, config }
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, self.config.endpoint(&format!("auth/v1/{path}")))
            .header("apikey", &self.config.anon_key)
    }

    async fn token(
        &self,
        grant_type: &str,
        body: serde_json::Value,
    ) -> Result<AuthSession, AuthError> {
        let response = retry::send_json_once(
            self.request(reqwest::Method::POST, "token")
                .query(&[("grant_type", grant_type)])
                .json(&body),
        )
        .await
        .map_err(|e| {
            if grant_type == "password" {
                auth_error(e, |message| AuthError::InvalidCredentials { message })
            } else {
                auth_error(e, |message| AuthError::InvalidToken { message })
            }
        })?;
        parse_session(response)?.ok_or_else(|| AuthError::Transport {
            message: "token response carried no access token".to_string(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct UserBody {
    id: UserId,
    email: Option<String>,
    #[serde(default)]
    app_metadata: AppMetadata,
}

#[derive(Debug, Default, Deserialize)]
struct AppMetadata {
    role: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SessionBody {
    access_token: String,
    refresh_token: Option<String>,
    user: UserBody,
}

impl From<UserBody> for Identity {
    fn from(user: UserBody) -> Self {
        Self {
            id: user.id,
            email: user.email,
            role: Role::from_claim(user.app_metadata.role.as_deref()),
        }
    }
}

/// Reads a token/sign-up response. `Ok(None)` when it holds no session.
fn parse_session(value: serde_json::Value) -> Result<Option<AuthSession>, AuthError> {
    if value.get("access_token").is_none() {
        return Ok(None);
    }
    let body: SessionBody = serde_json::from_value(value).map_err(transport)?;
    Ok(Some(AuthSession {
        access_token: body.access_token,
        refresh_token: body.refresh_token,
        identity: body.user.into(),
    }))
}

fn transport(e: impl std::fmt::Display) -> AuthError {
    AuthError::Transport {
        message: e.to_string(),
    }
}

/// Maps a backend failure to an [`AuthError`]: client errors become
/// `rejected(message)`, everything else is a transport failure.
fn auth_error(e: BackendError, rejected: impl FnOnce(String) -> AuthError) -> AuthError {
    match e {
        BackendError::Api {
            status, message, ..
        } if (400..500).contains(&status) && status != 429 => rejected(message),
        other => transport(other),
    }
}

#[async_trait::async_trait]
impl AuthProvider for GoTrueAuth {
    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthSession, AuthError> {
        self.token("password", json!({ "email": email, "password": password }))
            .await
    }

    async fn sign_up(&self, email: &str, password: &str) -> Result<SignUpOutcome, AuthError> {
        let response = retry::send_json_once(
            self.request(reqwest::Method::POST, "signup")
                .json(&json!({ "email": email, "password": password })),
        )
        .await
        .map_err(|e| auth_error(e, |message| AuthError::Provider { message }))?;

        match parse_session(response)? {
            Some(session) => Ok(SignUpOutcome::SignedIn(session)),
            None => {
                log::info!("Sign-up for {email} awaits email confirmation");
                Ok(SignUpOutcome::ConfirmationRequired {
                    email: email.to_string(),
                })
            }
        }
    }

    async fn sign_out(&self, access_token: &str) -> Result<(), AuthError> {
        retry::send_json_once(
            self.request(reqwest::Method::POST, "logout")
                .bearer_auth(access_token),
        )
        .await
        .map_err(|e| auth_error(e, |message| AuthError::InvalidToken { message }))?;
        Ok(())
    }

    async fn get_user(&self, access_token: &str) -> Result<Identity, AuthError> {
        let response = retry::send_json(|| {
            self.request(reqwest::Method::GET, "user")
                .bearer_auth(access_token)
        })
        .await
        .map_err(|e| auth_error(e, |message| AuthError::InvalidToken { message }))?;
        let user: UserBody = serde_json::from_value(response).map_err(transport)?;
        Ok(user.into())
    }

    async fn refresh(&self, refresh_token: &str) -> Result<AuthSession, AuthError> {
        self.token("refresh_token", json!({ "refresh_token": refresh_token }))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_token_response_with_admin_role() {
        let session = parse_session(json!({
            "access_token": "jwt",
            "token_type": "bearer",
            "expires_in": 3600,
            "refresh_token": "r1",
            "user": {
                "id": "0b6c1e2a-3d4f-4a5b-8c9d-0e1f2a3b4c5d",
                "email": "admin@example.com",
                "app_metadata": { "provider": "email", "role": "admin" }
            }
        }))
        .unwrap()
        .unwrap();
        assert_eq!(session.access_token, "jwt");
        assert_eq!(session.refresh_token.as_deref(), Some("r1"));
        assert!(session.identity.is_admin());
    }

    #[test]
    fn unconfirmed_sign_up_has_no_session() {
        let outcome = parse_session(json!({
            "id": "0b6c1e2a-3d4f-4a5b-8c9d-0e1f2a3b4c5d",
            "email": "new@example.com",
            "confirmation_sent_at": "2025-03-01T18:22:05Z"
        }))
        .unwrap();
        assert_eq!(outcome, None);
    }

    #[test]
    fn missing_role_claim_is_member() {
        let user: UserBody = serde_json::from_value(json!({
            "id": "0b6c1e2a-3d4f-4a5b-8c9d-0e1f2a3b4c5d",
            "email": null
        }))
        .unwrap();
        let identity = Identity::from(user);
        assert_eq!(identity.role, Role::Member);
        assert_eq!(identity.email, None);
    }

    #[test]
    fn client_errors_are_rejections() {
        let rejected = auth_error(
            BackendError::Api {
                status: 400,
                code: Some("invalid_grant".to_string()),
                message: "Invalid login credentials".to_string(),
            },
            |message| AuthError::InvalidCredentials { message },
        );
        assert!(matches!(rejected, AuthError::InvalidCredentials { .. }));

        let outage = auth_error(
            BackendError::Api {
                status: 503,
                code: None,
                message: "unavailable".to_string(),
            },
            |message| AuthError::InvalidCredentials { message },
        );
        assert!(matches!(outage, AuthError::Transport { .. }));
    }
}
