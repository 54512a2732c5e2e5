//! The auth provider seam and the identity types it produces.

use cora_report_models::UserId;
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use thiserror::Error;

/// Errors from the auth provider.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Email/password pair not accepted.
    #[error("Invalid credentials: {message}")]
    InvalidCredentials {
        /// Provider's explanation.
        message: String,
    },

    /// Access or refresh token expired or unknown.
    #[error("Invalid or expired token: {message}")]
    InvalidToken {
        /// Provider's explanation.
        message: String,
    },

    /// Provider rejected the request for another reason (e.g. the email is
    /// already registered).
    #[error("Auth provider error: {message}")]
    Provider {
        /// Provider's explanation.
        message: String,
    },

    /// Provider could not be reached or answered with something unreadable.
    #[error("Auth transport error: {message}")]
    Transport {
        /// Underlying failure.
        message: String,
    },
}

/// Role of an authenticated user.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Role {
    /// Regular community member. May submit and browse.
    #[default]
    Member,
    /// May additionally review and change report status.
    Admin,
}

impl Role {
    /// Reads the role claim; anything other than `admin` is a member.
    #[must_use]
    pub fn from_claim(claim: Option<&str>) -> Self {
        match claim {
            Some(claim) if claim.trim().eq_ignore_ascii_case("admin") => Self::Admin,
            _ => Self::Member,
        }
    }
}

/// The authenticated principal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Stable user identifier.
    pub id: UserId,
    /// Email address, when the provider exposes it.
    pub email: Option<String>,
    /// Authorization role.
    #[serde(default)]
    pub role: Role,
}

impl Identity {
    /// Returns `true` for administrators.
    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// A token pair plus the identity it belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthSession {
    /// Bearer token presented to the backend.
    pub access_token: String,
    /// Token used to obtain a new access token once it expires.
    pub refresh_token: Option<String>,
    /// Who the tokens belong to.
    pub identity: Identity,
}

/// Result of a registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignUpOutcome {
    /// Account created and signed in immediately.
    SignedIn(AuthSession),
    /// Account created; the user must confirm via email before signing in.
    ConfirmationRequired {
        /// Address the confirmation was sent to.
        email: String,
    },
}

/// Identity provider operations.
#[async_trait::async_trait]
pub trait AuthProvider: Send + Sync {
    /// Exchanges credentials for a session.
    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthSession, AuthError>;

    /// Registers a new account.
    async fn sign_up(&self, email: &str, password: &str) -> Result<SignUpOutcome, AuthError>;

    /// Revokes the session behind `access_token`.
    async fn sign_out(&self, access_token: &str) -> Result<(), AuthError>;

    /// Resolves the identity behind `access_token`.
    async fn get_user(&self, access_token: &str) -> Result<Identity, AuthError>;

    /// Exchanges a refresh token for a new session.
    async fn refresh(&self, refresh_token: &str) -> Result<AuthSession, AuthError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_claim() {
        assert_eq!(Role::from_claim(Some("admin")), Role::Admin);
        assert_eq!(Role::from_claim(Some(" Admin ")), Role::Admin);
        assert_eq!(Role::from_claim(Some("moderator")), Role::Member);
        assert_eq!(Role::from_claim(None), Role::Member);
    }
}
