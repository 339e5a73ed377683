//! Admin console: user listing, audit log and confirmed promotions.
//!
//! # Design
//! - The backend returns every user; pages and search are applied client-side
//!   and cached under `admin/users/{page,q}`.
//! - A promotion needs a [`ConfirmedPromotion`], which only exists after a
//!   [`PromotionPrompt`] was explicitly confirmed.
//! - One promotion in flight at a time; it runs as an optimistic mutation over
//!   the `admin/users` family and also invalidates `admin/audit`.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{info, warn};

use temuin_api_models::{AdminUserRow, AuditEntry, Role};
use temuin_events::{Event, EventBus};

use crate::cache::QueryCache;
use crate::error::{ClientError, ClientResult};
use crate::http::ApiClient;
use crate::optimistic::OptimisticMutation;

/// Rows per page of the user listing.
pub const PAGE_SIZE: usize = 20;

/// Cache keys for admin queries.
pub mod keys {
    use crate::cache::QueryKey;

    /// `admin/users` family.
    #[must_use]
    pub fn users_family() -> QueryKey {
        QueryKey::from_parts(&["admin", "users"])
    }

    /// `admin/users/{page,q}`
    #[must_use]
    pub fn users(page: usize, query: &str) -> QueryKey {
        users_family().with_params([("page", page.to_string()), ("q", query.to_string())])
    }

    /// `admin/audit` family.
    #[must_use]
    pub fn audit() -> QueryKey {
        QueryKey::from_parts(&["admin", "audit"])
    }
}

/// Promotion awaiting explicit confirmation.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use = "a prompt does nothing until it is confirmed"]
pub struct PromotionPrompt {
    email: String,
}

impl PromotionPrompt {
    /// Account the prompt names.
    #[must_use]
    pub fn email(&self) -> &str {
        &self.email
    }

    /// Question to show the operator.
    #[must_use]
    pub fn message(&self) -> String {
        format!("Promote {} to admin?", self.email)
    }

    /// Accept the prompt.
    pub fn confirm(self) -> ConfirmedPromotion {
        ConfirmedPromotion { email: self.email }
    }
}

/// Promotion the operator has confirmed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmedPromotion {
    email: String,
}

impl ConfirmedPromotion {
    /// Account to promote.
    #[must_use]
    pub fn email(&self) -> &str {
        &self.email
    }
}

/// Result of a promotion attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromotionOutcome {
    /// The backend accepted the promotion.
    Promoted {
        /// Promoted account.
        email: String,
    },
    /// The backend refused; the optimistic change was rolled back.
    RolledBack {
        /// Account whose promotion failed.
        email: String,
        /// Failure description.
        message: String,
    },
}

/// Admin console operations.
#[derive(Clone)]
pub struct AdminConsole {
    api: ApiClient,
    cache: QueryCache,
    events: EventBus,
    promoting: Arc<AtomicBool>,
}

struct Promoting<'a>(&'a AtomicBool);

impl Drop for Promoting<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl AdminConsole {
    /// Console over `api`, caching into `cache`.
    #[must_use]
    pub fn new(api: ApiClient, cache: QueryCache, events: EventBus) -> Self {
        Self {
            api,
            cache,
            events,
            promoting: Arc::new(AtomicBool::new(false)),
        }
    }

    /// One page of users matching `query` (email or name, case-insensitive).
    ///
    /// # Errors
    ///
    /// Returns a validation error for page `0`, otherwise propagates fetch errors.
    pub async fn users(&self, page: usize, query: &str) -> ClientResult<Vec<AdminUserRow>> {
        if page == 0 {
            return Err(ClientError::validation("page numbers start at 1"));
        }
        let api = self.api.clone();
        let needle = query.trim().to_lowercase();
        self.cache
            .fetch(&keys::users(page, query), || async move {
                let listing = api.admin_users().await?;
                Ok(paginate(listing.users, &needle, page))
            })
            .await
    }

    /// Audit log, newest first as returned by the backend.
    ///
    /// # Errors
    ///
    /// Propagates fetch errors.
    pub async fn audit(&self) -> ClientResult<Vec<AuditEntry>> {
        let api = self.api.clone();
        self.cache
            .fetch(&keys::audit(), || async move {
                Ok(api.admin_audit().await?.audit)
            })
            .await
    }

    /// Cached rows for `page`/`query` without fetching.
    #[must_use]
    pub fn cached_users(&self, page: usize, query: &str) -> Option<Vec<AdminUserRow>> {
        self.cache.get_data(&keys::users(page, query))
    }

    /// Whether a promotion is in flight.
    #[must_use]
    pub fn is_promoting(&self) -> bool {
        self.promoting.load(Ordering::SeqCst)
    }

    /// Ask for confirmation before promoting `email`.
    ///
    /// # Errors
    ///
    /// Returns a validation error for a blank email.
    pub fn request_promotion(&self, email: &str) -> ClientResult<PromotionPrompt> {
        let email = email.trim();
        if email.is_empty() {
            return Err(ClientError::validation("an email is required"));
        }
        Ok(PromotionPrompt {
            email: email.to_string(),
        })
    }

    /// Promote a confirmed account with an optimistic role change.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Busy`] while another promotion is in flight. A
    /// backend rejection is reported as [`PromotionOutcome::RolledBack`].
    pub async fn promote(&self, promotion: ConfirmedPromotion) -> ClientResult<PromotionOutcome> {
        if self
            .promoting
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(ClientError::Busy {
                operation: "promotion",
            });
        }
        let _guard = Promoting(&self.promoting);

        let email = promotion.email;
        let mutation = OptimisticMutation::new(self.cache.clone(), keys::users_family())
            .invalidating(keys::audit());
        let target = email.clone();
        let result = mutation
            .run(
                move |rows: &mut Vec<AdminUserRow>| mark_admin(rows, &target),
                self.api.admin_promote(&email),
            )
            .await;

        match result {
            Ok(()) => {
                info!(%email, "user promoted");
                self.events.publish(Event::UserPromoted {
                    email: email.clone(),
                });
                Ok(PromotionOutcome::Promoted { email })
            }
            Err(err) => {
                let message = err.user_message();
                warn!(%email, error = %err, %message, "promotion failed; rolled back");
                self.events.publish(Event::PromotionFailed {
                    email: email.clone(),
                    message: message.clone(),
                });
                Ok(PromotionOutcome::RolledBack { email, message })
            }
        }
    }
}

impl std::fmt::Debug for AdminConsole {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("AdminConsole")
            .field("promoting", &self.is_promoting())
            .finish_non_exhaustive()
    }
}

fn mark_admin(rows: &mut [AdminUserRow], email: &str) {
    for row in rows.iter_mut().filter(|row| row.email == email) {
        row.role = Role::Admin;
    }
}

fn paginate(users: Vec<AdminUserRow>, needle: &str, page: usize) -> Vec<AdminUserRow> {
    users
        .into_iter()
        .filter(|row| {
            needle.is_empty()
                || row.email.to_lowercase().contains(needle)
                || row.name.to_lowercase().contains(needle)
        })
        .skip((page - 1).saturating_mul(PAGE_SIZE))
        .take(PAGE_SIZE)
        .collect()
}
