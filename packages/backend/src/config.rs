//! Backend selection and connection settings from the environment.
//!
//! | Variable | Default |
//! |---|---|
//! | `CORA_BACKEND` | `rest` |
//! | `SUPABASE_URL` | required for `rest` |
//! | `SUPABASE_ANON_KEY` | required for `rest` |
//! | `CORA_REQUEST_TIMEOUT_SECS` | `30` |
//! | `CORA_DEMO_ADMIN_EMAIL` / `CORA_DEMO_ADMIN_PASSWORD` | unset (`memory` only) |

use std::time::Duration;

use strum_macros::{AsRefStr, Display, EnumString};
use thiserror::Error;

/// Default per-request timeout for the REST client.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Configuration problems, reported before any request is made.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// Required variables are not set.
    #[error("Missing environment variables: {}", names.join(", "))]
    Missing {
        /// Names of the unset variables.
        names: Vec<&'static str>,
    },

    /// The URL variable holds what looks like an API key.
    #[error(
        "SUPABASE_URL looks like a JWT; SUPABASE_URL and SUPABASE_ANON_KEY appear to be swapped"
    )]
    Swapped,

    /// The URL is not an http(s) URL.
    #[error("SUPABASE_URL must start with http:// or https:// (got '{url}')")]
    InvalidUrl {
        /// The rejected value.
        url: String,
    },

    /// A variable has an unusable value.
    #[error("Invalid value for {name}: '{value}'")]
    InvalidValue {
        /// Variable name.
        name: &'static str,
        /// The rejected value.
        value: String,
    },
}

/// Which backend implementation to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumString, AsRefStr)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum BackendKind {
    /// Supabase-style REST deployment.
    #[default]
    Rest,
    /// In-process store; nothing persists.
    Memory,
}

/// Connection settings for a REST deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestConfig {
    /// Project URL without a trailing slash.
    pub url: String,
    /// Public anon key, sent as `apikey` on every request.
    pub anon_key: String,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl RestConfig {
    /// Validates and normalizes connection settings.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Swapped`] if `url` looks like a JWT and
    /// [`ConfigError::InvalidUrl`] if it is not an http(s) URL.
    pub fn new(url: &str, anon_key: &str, timeout: Duration) -> Result<Self, ConfigError> {
        let url = url.trim();
        if url.starts_with("eyJ") {
            return Err(ConfigError::Swapped);
        }
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(ConfigError::InvalidUrl {
                url: url.to_string(),
            });
        }
        Ok(Self {
            url: url.trim_end_matches('/').to_string(),
            anon_key: anon_key.trim().to_string(),
            timeout,
        })
    }

    /// Builds a URL under the project root, e.g. `endpoint("rest/v1/reports")`.
    #[must_use]
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.url, path.trim_start_matches('/'))
    }
}

/// Full backend configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendConfig {
    /// Selected implementation.
    pub kind: BackendKind,
    /// Connection settings; present when `kind` is [`BackendKind::Rest`].
    pub rest: Option<RestConfig>,
    /// Email and password of an administrator to create in the in-memory
    /// auth provider.
    pub demo_admin: Option<(String, String)>,
}

impl BackendConfig {
    /// Reads configuration from process environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if required variables are missing or invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Reads configuration through `lookup`, which returns a variable's
    /// value or `None` when unset.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if required variables are missing or invalid.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let kind = match var("CORA_BACKEND") {
            Some(value) => value
                .trim()
                .parse::<BackendKind>()
                .map_err(|_| ConfigError::InvalidValue {
                    name: "CORA_BACKEND",
                    value,
                })?,
            None => BackendKind::default(),
        };

        match kind {
            BackendKind::Memory => {
                let demo_admin = var("CORA_DEMO_ADMIN_EMAIL").zip(var("CORA_DEMO_ADMIN_PASSWORD"));
                Ok(Self {
                    kind,
                    rest: None,
                    demo_admin,
                })
            }
            BackendKind::Rest => {
                let url = var("SUPABASE_URL");
                let anon_key = var("SUPABASE_ANON_KEY");
                let (url, anon_key) = match (url, anon_key) {
                    (Some(url), Some(key)) => (url, key),
                    (url, key) => {
                        let mut names = Vec::new();
                        if url.is_none() {
                            names.push("SUPABASE_URL");
                        }
                        if key.is_none() {
                            names.push("SUPABASE_ANON_KEY");
                        }
                        return Err(ConfigError::Missing { names });
                    }
                };

                let timeout = match var("CORA_REQUEST_TIMEOUT_SECS") {
                    Some(value) => match value.trim().parse::<u64>() {
                        Ok(secs) if secs > 0 => Duration::from_secs(secs),
                        _ => {
                            return Err(ConfigError::InvalidValue {
                                name: "CORA_REQUEST_TIMEOUT_SECS",
                                value,
                            });
                        }
                    },
                    None => DEFAULT_REQUEST_TIMEOUT,
                };

                Ok(Self {
                    kind,
                    rest: Some(RestConfig::new(&url, &anon_key, timeout)?),
                    demo_admin: None,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: BTreeMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn rest_is_the_default() {
        let config = BackendConfig::from_lookup(lookup(&[
            ("SUPABASE_URL", "https://abc.supabase.co/"),
            ("SUPABASE_ANON_KEY", "eyJhbGciOi"),
        ]))
        .unwrap();
        assert_eq!(config.kind, BackendKind::Rest);
        let rest = config.rest.unwrap();
        assert_eq!(rest.url, "https://abc.supabase.co");
        assert_eq!(rest.timeout, DEFAULT_REQUEST_TIMEOUT);
        assert_eq!(
            rest.endpoint("/rest/v1/reports"),
            "https://abc.supabase.co/rest/v1/reports"
        );
    }

    #[test]
    fn lists_every_missing_variable() {
        let err = BackendConfig::from_lookup(lookup(&[])).unwrap_err();
        assert_eq!(
            err,
            ConfigError::Missing {
                names: vec!["SUPABASE_URL", "SUPABASE_ANON_KEY"]
            }
        );
        assert_eq!(
            err.to_string(),
            "Missing environment variables: SUPABASE_URL, SUPABASE_ANON_KEY"
        );

        let err =
            BackendConfig::from_lookup(lookup(&[("SUPABASE_URL", "https://x.co")])).unwrap_err();
        assert_eq!(
            err,
            ConfigError::Missing {
                names: vec!["SUPABASE_ANON_KEY"]
            }
        );
    }

    #[test]
    fn detects_swapped_values() {
        let err = BackendConfig::from_lookup(lookup(&[
            ("SUPABASE_URL", "eyJhbGciOiJIUzI1NiJ9"),
            ("SUPABASE_ANON_KEY", "https://abc.supabase.co"),
        ]))
        .unwrap_err();
        assert_eq!(err, ConfigError::Swapped);
    }

    #[test]
    fn rejects_non_http_urls_and_bad_timeouts() {
        let err = BackendConfig::from_lookup(lookup(&[
            ("SUPABASE_URL", "abc.supabase.co"),
            ("SUPABASE_ANON_KEY", "key"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidUrl { .. }));

        let err = BackendConfig::from_lookup(lookup(&[
            ("SUPABASE_URL", "https://abc.supabase.co"),
            ("SUPABASE_ANON_KEY", "key"),
            ("CORA_REQUEST_TIMEOUT_SECS", "0"),
        ]))
        .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue {
                name: "CORA_REQUEST_TIMEOUT_SECS",
                ..
            }
        ));
    }

    #[test]
    fn memory_backend_needs_no_credentials() {
        let config = BackendConfig::from_lookup(lookup(&[
            ("CORA_BACKEND", "Memory"),
            ("CORA_DEMO_ADMIN_EMAIL", "admin@example.com"),
            ("CORA_DEMO_ADMIN_PASSWORD", "secret1"),
        ]))
        .unwrap();
        assert_eq!(config.kind, BackendKind::Memory);
        assert_eq!(config.rest, None);
        assert_eq!(
            config.demo_admin,
            Some(("admin@example.com".to_string(), "secret1".to_string()))
        );

        assert!(matches!(
            BackendConfig::from_lookup(lookup(&[("CORA_BACKEND", "sqlite")])),
            Err(ConfigError::InvalidValue { .. })
        ));
    }
}
