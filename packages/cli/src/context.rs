//! Process-wide services and the persisted user session.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use cora_backend::Services;
use cora_repository::ReportRepository;
use cora_session::{AuthEvent, Session, Subscription, store};

use crate::CliResult;

/// Default location of the stored session tokens.
pub const DEFAULT_SESSION_FILE: &str = "data/session.json";

/// Returns the session token file, overridable via `CORA_SESSION_FILE`.
#[must_use]
pub fn session_file() -> PathBuf {
    std::env::var("CORA_SESSION_FILE")
        .ok()
        .filter(|v| !v.trim().is_empty())
        .map_or_else(|| PathBuf::from(DEFAULT_SESSION_FILE), PathBuf::from)
}

fn persist(path: &Path, event: &AuthEvent) {
    let result = match event {
        AuthEvent::SignedIn(_) | AuthEvent::Restored(_) => {
            match cora_session::global().and_then(Session::snapshot) {
                Some(session) => store::save(path, &session),
                None => Ok(()),
            }
        }
        AuthEvent::SignedOut => store::clear(path),
    };
    if let Err(e) = result {
        log::warn!("Failed to update {}: {e}", path.display());
    }
}

/// Everything a command needs.
pub struct Context {
    /// Backend and auth provider.
    pub services: Services,
    /// The process-wide session.
    pub session: &'static Session,
    _persist: Subscription,
}

impl Context {
    /// Builds the services from the environment, installs the global
    /// session, and restores stored tokens if there are any.
    ///
    /// Stored tokens that are no longer accepted are discarded.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid, the session was
    /// already installed, or the token file cannot be read.
    pub async fn init() -> CliResult<Self> {
        let services = cora_backend::create_services_from_env()?;
        let session = cora_session::init_global(Session::new(Arc::clone(&services.auth)))?;

        let path = session_file();
        let subscription = {
            let path = path.clone();
            session.subscribe(move |event| persist(&path, event))
        };

        if let Some(tokens) = store::load(&path)? {
            match session
                .restore(&tokens.access_token, tokens.refresh_token.as_deref())
                .await
            {
                Ok(identity) => log::debug!("Restored session for {}", identity.id),
                Err(e) => {
                    log::warn!("Stored session is no longer valid: {e}");
                    store::clear(&path)?;
                }
            }
        }

        Ok(Self {
            services,
            session,
            _persist: subscription,
        })
    }

    /// A repository acting as the signed-in user, or anonymously.
    #[must_use]
    pub fn repository(&self) -> ReportRepository {
        let token = self.session.access_token();
        ReportRepository::new(self.services.backend.scoped(token.as_deref()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_session_file_lives_under_data() {
        assert_eq!(
            PathBuf::from(DEFAULT_SESSION_FILE),
            Path::new("data").join("session.json")
        );
    }
}
