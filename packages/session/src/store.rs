//! Persisting a session between process runs.
//!
//! The CLI keeps the signed-in token pair in a small JSON file so later
//! invocations can [`Session::restore`](crate::Session::restore) it instead
//! of prompting for credentials again.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::AuthSession;

/// Errors reading or writing the session file.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Filesystem failure.
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// File exists but is not a stored session.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Tokens as stored on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredTokens {
    /// Last known access token.
    pub access_token: String,
    /// Refresh token, if the provider issued one.
    #[serde(default)]
    pub refresh_token: Option<String>,
}

impl From<&AuthSession> for StoredTokens {
    fn from(session: &AuthSession) -> Self {
        Self {
            access_token: session.access_token.clone(),
            refresh_token: session.refresh_token.clone(),
        }
    }
}

/// Writes the session's tokens to `path`, creating parent directories.
///
/// # Errors
///
/// Returns [`StoreError`] if the file cannot be written.
pub fn save(path: &Path, session: &AuthSession) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(&StoredTokens::from(session))?;
    std::fs::write(path, json)?;
    log::debug!("Saved session to {}", path.display());
    Ok(())
}

/// Reads stored tokens from `path`. A missing file yields `Ok(None)`.
///
/// # Errors
///
/// Returns [`StoreError`] if the file exists but cannot be read or parsed.
pub fn load(path: &Path) -> Result<Option<StoredTokens>, StoreError> {
    match std::fs::read_to_string(path) {
        Ok(contents) => Ok(Some(serde_json::from_str(&contents)?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Removes the session file. A missing file is not an error.
///
/// # Errors
///
/// Returns [`StoreError`] if the file exists but cannot be removed.
pub fn clear(path: &Path) -> Result<(), StoreError> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use cora_report_models::UserId;

    use super::*;
    use crate::{Identity, Role};

    #[test]
    fn save_load_clear() {
        let dir = std::env::temp_dir().join(format!("cora-session-{}", UserId::random()));
        let path = dir.join("nested").join("session.json");

        assert_eq!(load(&path).unwrap(), None);

        let session = AuthSession {
            access_token: "access".to_string(),
            refresh_token: Some("refresh".to_string()),
            identity: Identity {
                id: UserId::random(),
                email: None,
                role: Role::Member,
            },
        };
        save(&path, &session).unwrap();
        let stored = load(&path).unwrap().unwrap();
        assert_eq!(stored.access_token, "access");
        assert_eq!(stored.refresh_token.as_deref(), Some("refresh"));

        clear(&path).unwrap();
        clear(&path).unwrap();
        assert_eq!(load(&path).unwrap(), None);
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn corrupt_file_is_an_error() {
        let path = std::env::temp_dir().join(format!("cora-session-{}.json", UserId::random()));
        std::fs::write(&path, "not json").unwrap();
        assert!(matches!(load(&path), Err(StoreError::Json(_))));
        std::fs::remove_file(&path).unwrap();
    }
}
