//! Session and identity state.
//!
//! # Design
//! - Single owner of the current user. State lives in a `watch` channel so
//!   readers observe changes without holding locks.
//! - The user is written only by `initialize`, `set_user` and `logout`; the
//!   token only by `login`/`register`, the refresh interceptor and `logout`.
//! - `initialize` runs the who-am-i bootstrap at most once per store and never
//!   fails: any error means "no session". It alone sets `initialized`.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{OnceCell, watch};
use tracing::{debug, info, warn};

use temuin_api_models::{AuthResponse, LoginRequest, RegisterRequest, Role, User};
use temuin_events::{Event, EventBus};

use crate::error::ClientResult;
use crate::http::ApiClient;

/// Observable identity state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SessionState {
    /// Whether the bootstrap call has settled.
    pub initialized: bool,
    /// Current identity, if signed in.
    pub user: Option<User>,
}

/// Process-wide identity store.
#[derive(Clone)]
pub struct SessionStore {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    api: ApiClient,
    events: EventBus,
    state: watch::Sender<SessionState>,
    bootstrap: OnceCell<()>,
}

impl SessionStore {
    /// Store issuing identity calls through `api` and notifying via `events`.
    #[must_use]
    pub fn new(api: ApiClient, events: EventBus) -> Self {
        let (state, _) = watch::channel(SessionState::default());
        Self {
            inner: Arc::new(SessionInner {
                api,
                events,
                state,
                bootstrap: OnceCell::new(),
            }),
        }
    }

    /// Resolve the current identity once; later calls return the settled state.
    pub async fn initialize(&self) -> SessionState {
        self.inner
            .bootstrap
            .get_or_init(|| async {
                let user = match self.inner.api.me().await {
                    Ok(me) => {
                        debug!(email = %me.user.email, "session restored");
                        Some(me.user)
                    }
                    Err(err) => {
                        debug!(error = %err, detail = %err.user_message(), "no active session");
                        None
                    }
                };
                self.inner.state.send_modify(|state| {
                    state.user = user;
                    state.initialized = true;
                });
            })
            .await;
        self.snapshot()
    }

    /// Sign in with email and password.
    ///
    /// # Errors
    ///
    /// Returns the backend's rejection, or a storage error if the token cannot
    /// be persisted.
    pub async fn login(&self, email: &str, password: &str) -> ClientResult<User> {
        let outcome = self
            .inner
            .api
            .login(&LoginRequest {
                email: email.to_string(),
                password: password.to_string(),
            })
            .await;
        self.complete_sign_in(outcome)
    }

    /// Create an account and sign in.
    ///
    /// # Errors
    ///
    /// Returns the backend's rejection, or a storage error if the token cannot
    /// be persisted.
    pub async fn register(
        &self,
        email: &str,
        password: &str,
        name: Option<&str>,
    ) -> ClientResult<User> {
        let outcome = self
            .inner
            .api
            .register(&RegisterRequest {
                email: email.to_string(),
                password: password.to_string(),
                name: name.map(str::to_string),
            })
            .await;
        self.complete_sign_in(outcome)
    }

    fn complete_sign_in(&self, outcome: ClientResult<AuthResponse>) -> ClientResult<User> {
        let persisted = outcome.and_then(|auth| {
            self.inner.api.tokens().persist(&auth.token)?;
            Ok(auth.user)
        });
        match persisted {
            Ok(user) => {
                info!(email = %user.email, role = user.role.as_str(), "signed in");
                self.set_user(Some(user.clone()));
                self.inner.events.publish(Event::SignedIn {
                    email: user.email.clone(),
                });
                Ok(user)
            }
            Err(err) => {
                self.inner.events.publish(Event::AuthFailed {
                    message: err.user_message(),
                });
                Err(err)
            }
        }
    }

    /// End the session. The server call is best-effort; local state is always
    /// cleared.
    pub async fn logout(&self) {
        if let Err(err) = self.inner.api.logout().await {
            debug!(error = %err, detail = %err.user_message(), "logout call failed; clearing locally");
        }
        if let Err(err) = self.inner.api.tokens().clear() {
            warn!(error = %err, detail = %err.user_message(), "failed to clear session token");
        }
        self.set_user(None);
        self.inner.events.publish(Event::SignedOut);
    }

    /// Replace the current identity.
    pub fn set_user(&self, user: Option<User>) {
        self.inner.state.send_modify(|state| state.user = user);
    }

    /// Current state.
    #[must_use]
    pub fn snapshot(&self) -> SessionState {
        self.inner.state.borrow().clone()
    }

    /// Current identity.
    #[must_use]
    pub fn user(&self) -> Option<User> {
        self.inner.state.borrow().user.clone()
    }

    /// Whether the current identity is an administrator.
    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.inner
            .state
            .borrow()
            .user
            .as_ref()
            .is_some_and(|user| user.role == Role::Admin)
    }

    /// Watch identity changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.inner.state.subscribe()
    }
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("SessionStore")
            .field("state", &*self.inner.state.borrow())
            .finish_non_exhaustive()
    }
}
