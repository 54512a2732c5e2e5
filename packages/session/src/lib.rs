#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Session context for the current user.
//!
//! A [`Session`] wraps an [`AuthProvider`] and holds the one identity the
//! process is acting as. It is established once (sign-in, sign-up, or
//! restoring stored tokens) and read everywhere else through
//! [`Session::current_user`] instead of asking the provider again.
//! Components that care about identity changes register with
//! [`Session::subscribe`] and drop (or [`Subscription::unsubscribe`]) the
//! returned handle when done.
//!
//! Binaries install one process-wide instance with [`init_global`].

pub mod provider;
pub mod store;

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, OnceLock, PoisonError, RwLock, Weak};

use thiserror::Error;

pub use provider::{AuthError, AuthProvider, AuthSession, Identity, Role, SignUpOutcome};

/// Minimum accepted password length for new accounts.
pub const MIN_PASSWORD_LEN: usize = 6;

/// Errors from session operations.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The action needs a signed-in user and there is none.
    #[error("Sign in required")]
    AuthRequired,

    /// The signed-in user lacks the administrator role.
    #[error("Administrator privileges required")]
    Forbidden,

    /// Input rejected before contacting the auth provider.
    #[error("Invalid {field}: {message}")]
    Invalid {
        /// Which input was rejected.
        field: &'static str,
        /// Why it was rejected.
        message: String,
    },

    /// The auth provider rejected the request or was unreachable.
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// [`init_global`] was called more than once.
    #[error("Session context already initialized")]
    AlreadyInitialized,
}

/// Identity changes broadcast to subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthEvent {
    /// A user signed in (or signed up with immediate confirmation).
    SignedIn(Identity),
    /// Stored tokens were validated and the user is active again.
    Restored(Identity),
    /// The session was cleared.
    SignedOut,
}

impl AuthEvent {
    /// The identity after this event, `None` when signed out.
    #[must_use]
    pub const fn identity(&self) -> Option<&Identity> {
        match self {
            Self::SignedIn(identity) | Self::Restored(identity) => Some(identity),
            Self::SignedOut => None,
        }
    }
}

type Listener = Arc<dyn Fn(&AuthEvent) + Send + Sync>;

#[derive(Default)]
struct Listeners {
    next_id: u64,
    entries: BTreeMap<u64, Listener>,
}

/// Handle for an identity-change subscription.
///
/// The listener stays registered until this handle is dropped or
/// [`unsubscribe`](Self::unsubscribe)d.
#[must_use = "dropping the subscription unregisters the listener"]
pub struct Subscription {
    id: u64,
    listeners: Weak<Mutex<Listeners>>,
}

impl Subscription {
    /// Unregisters the listener.
    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(listeners) = self.listeners.upgrade() {
            listeners
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .entries
                .remove(&self.id);
        }
    }
}

/// The current user's session.
pub struct Session {
    auth: Arc<dyn AuthProvider>,
    current: RwLock<Option<AuthSession>>,
    listeners: Arc<Mutex<Listeners>>,
}

impl Session {
    /// Creates a signed-out session backed by `auth`.
    #[must_use]
    pub fn new(auth: Arc<dyn AuthProvider>) -> Self {
        Self {
            auth,
            current: RwLock::new(None),
            listeners: Arc::new(Mutex::new(Listeners::default())),
        }
    }

    /// The auth provider this session talks to.
    #[must_use]
    pub fn provider(&self) -> &Arc<dyn AuthProvider> {
        &self.auth
    }

    /// The signed-in identity, if any.
    #[must_use]
    pub fn current_user(&self) -> Option<Identity> {
        self.read().as_ref().map(|s| s.identity.clone())
    }

    /// The access token to present to the backend, if signed in.
    #[must_use]
    pub fn access_token(&self) -> Option<String> {
        self.read().as_ref().map(|s| s.access_token.clone())
    }

    /// A copy of the full session, for persisting between runs.
    #[must_use]
    pub fn snapshot(&self) -> Option<AuthSession> {
        self.read().clone()
    }

    /// The signed-in identity.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::AuthRequired`] when nobody is signed in.
    pub fn require_user(&self) -> Result<Identity, SessionError> {
        self.current_user().ok_or(SessionError::AuthRequired)
    }

    /// The signed-in identity, which must be an administrator.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::AuthRequired`] when nobody is signed in and
    /// [`SessionError::Forbidden`] for non-administrators.
    pub fn require_admin(&self) -> Result<Identity, SessionError> {
        let identity = self.require_user()?;
        if identity.is_admin() {
            Ok(identity)
        } else {
            Err(SessionError::Forbidden)
        }
    }

    /// Signs in with email and password.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError`] if the input is malformed or the provider
    /// rejects the credentials.
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<Identity, SessionError> {
        let email = validate_email(email)?;
        let session = self.auth.sign_in(&email, password).await?;
        let identity = session.identity.clone();
        log::info!("Signed in as {}", identity.id);
        self.replace(Some(session));
        self.emit(&AuthEvent::SignedIn(identity.clone()));
        Ok(identity)
    }

    /// Registers a new account.
    ///
    /// When the provider requires email confirmation the session stays
    /// signed out and [`SignUpOutcome::ConfirmationRequired`] is returned.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError`] if the input is malformed (including
    /// passwords shorter than [`MIN_PASSWORD_LEN`]) or the provider rejects
    /// the registration.
    pub async fn sign_up(&self, email: &str, password: &str) -> Result<SignUpOutcome, SessionError> {
        let email = validate_email(email)?;
        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(SessionError::Invalid {
                field: "password",
                message: format!("must be at least {MIN_PASSWORD_LEN} characters"),
            });
        }

        let outcome = self.auth.sign_up(&email, password).await?;
        if let SignUpOutcome::SignedIn(session) = &outcome {
            let identity = session.identity.clone();
            self.replace(Some(session.clone()));
            self.emit(&AuthEvent::SignedIn(identity));
        }
        Ok(outcome)
    }

    /// Re-establishes a session from stored or callback-supplied tokens.
    ///
    /// The access token is validated with the provider once; if it has
    /// expired and a refresh token is available, the pair is refreshed.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Auth`] if neither token is accepted.
    pub async fn restore(
        &self,
        access_token: &str,
        refresh_token: Option<&str>,
    ) -> Result<Identity, SessionError> {
        let session = match self.auth.get_user(access_token).await {
            Ok(identity) => AuthSession {
                access_token: access_token.to_string(),
                refresh_token: refresh_token.map(str::to_string),
                identity,
            },
            Err(e) => {
                let Some(refresh_token) = refresh_token else {
                    return Err(e.into());
                };
                log::debug!("Access token rejected ({e}), refreshing");
                self.auth.refresh(refresh_token).await?
            }
        };

        let identity = session.identity.clone();
        self.replace(Some(session));
        self.emit(&AuthEvent::Restored(identity.clone()));
        Ok(identity)
    }

    /// Signs out and clears the session.
    ///
    /// The local session is cleared even if the provider cannot be reached;
    /// that failure is only logged.
    pub async fn sign_out(&self) {
        let Some(previous) = self.replace(None) else {
            return;
        };
        if let Err(e) = self.auth.sign_out(&previous.access_token).await {
            log::warn!("Auth provider sign-out failed: {e}");
        }
        self.emit(&AuthEvent::SignedOut);
    }

    /// Registers `listener` for identity changes.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&AuthEvent) + Send + Sync + 'static,
    {
        let mut listeners = self
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let id = listeners.next_id;
        listeners.next_id += 1;
        listeners.entries.insert(id, Arc::new(listener));
        Subscription {
            id,
            listeners: Arc::downgrade(&self.listeners),
        }
    }

    /// Number of registered listeners.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .len()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Option<AuthSession>> {
        self.current.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn replace(&self, session: Option<AuthSession>) -> Option<AuthSession> {
        let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *current, session)
    }

    fn emit(&self, event: &AuthEvent) {
        // Listeners run outside the lock so they may (un)subscribe.
        let listeners: Vec<Listener> = self
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .values()
            .cloned()
            .collect();
        for listener in listeners {
            listener(event);
        }
    }
}

fn validate_email(email: &str) -> Result<String, SessionError> {
    let email = email.trim();
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') => Ok(email.to_string()),
        _ => Err(SessionError::Invalid {
            field: "email",
            message: format!("'{email}' is not an email address"),
        }),
    }
}

static GLOBAL: OnceLock<Session> = OnceLock::new();

/// Installs the process-wide session context.
///
/// # Errors
///
/// Returns [`SessionError::AlreadyInitialized`] if a session was already
/// installed.
pub fn init_global(session: Session) -> Result<&'static Session, SessionError> {
    GLOBAL
        .set(session)
        .map_err(|_| SessionError::AlreadyInitialized)?;
    GLOBAL.get().ok_or(SessionError::AlreadyInitialized)
}

/// The process-wide session context, if [`init_global`] has run.
#[must_use]
pub fn global() -> Option<&'static Session> {
    GLOBAL.get()
}
