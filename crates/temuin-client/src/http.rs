//! Authenticated request pipeline.
//!
//! # Design
//! - Every attempt reads the token lazily and attaches it as a bearer credential.
//! - A 401 on a first attempt joins the shared refresh flight: the leader calls
//!   the refresh endpoint, waiters queue behind it and are released in arrival
//!   order with the same outcome.
//! - A 401 for a request sent with a token that has since been replaced is
//!   replayed with the current token instead of refreshing again.
//! - A replay is marked as a retry and is never intercepted again, so a request
//!   is dispatched at most twice.
//! - When the refresh fails the leader surfaces its original 401 and waiters
//!   receive the refresh error.

use std::sync::Arc;

use tracing::{debug, warn};

use temuin_api_models::RefreshResponse;

use crate::api::paths;
use crate::error::{ClientError, ClientResult};
use crate::single_flight::{Joined, SingleFlight, WaitError};
use crate::storage::TokenStore;
use crate::transport::{ApiRequest, ApiResponse, Transport};

const UNAUTHORIZED: u16 = 401;

/// Shared HTTP client; clones share the token slot and refresh flight.
#[derive(Clone)]
pub struct ApiClient {
    inner: Arc<Inner>,
}

struct Inner {
    transport: Arc<dyn Transport>,
    tokens: TokenStore,
    refresh: SingleFlight<String, ClientError>,
}

impl ApiClient {
    /// Client sending through `transport` with credentials from `tokens`.
    pub fn new(transport: Arc<dyn Transport>, tokens: TokenStore) -> Self {
        Self {
            inner: Arc::new(Inner {
                transport,
                tokens,
                refresh: SingleFlight::new(),
            }),
        }
    }

    /// Token slot used for bearer credentials.
    #[must_use]
    pub fn tokens(&self) -> &TokenStore {
        &self.inner.tokens
    }

    /// Whether a credential refresh is currently in flight.
    #[must_use]
    pub fn refresh_in_flight(&self) -> bool {
        self.inner.refresh.in_flight()
    }

    /// Send `request`, refreshing credentials and replaying once on 401.
    ///
    /// # Errors
    ///
    /// Returns the server's status error for non-2xx responses, a transport
    /// error when no response arrived, or the refresh error for callers queued
    /// behind a failed refresh.
    pub async fn send(&self, request: ApiRequest) -> ClientResult<ApiResponse> {
        let attempt = request.with_bearer(self.inner.tokens.read());
        let response = self.inner.transport.execute(&attempt).await?;
        if response.status != UNAUTHORIZED
            || attempt.is_retry()
            || !attempt.refreshes_on_unauthorized()
        {
            return classify(response);
        }

        let original = ClientError::from_status(response.status, &response.body);
        let replay = attempt.into_retry();
        if let Some(current) = self.inner.tokens.read()
            && replay.bearer() != Some(current.as_str())
        {
            debug!(path = replay.path(), "token rotated while request was in flight");
            return self.replay(replay, current).await;
        }
        match self.inner.refresh.join() {
            Joined::Waiter(waiter) => {
                debug!(path = replay.path(), "queued behind credential refresh");
                match waiter.wait().await {
                    Ok(token) => self.replay(replay, token).await,
                    Err(WaitError::Failed(err)) => Err(err),
                    Err(WaitError::Abandoned) => Err(ClientError::RefreshAbandoned),
                }
            }
            Joined::Leader(leader) => {
                let outcome = self.refresh_token().await;
                leader.settle(&outcome);
                match outcome {
                    Ok(token) => self.replay(replay, token).await,
                    Err(err) => {
                        warn!(error = %err, detail = %err.user_message(), "credential refresh failed");
                        Err(original)
                    }
                }
            }
        }
    }

    async fn replay(&self, request: ApiRequest, token: String) -> ClientResult<ApiResponse> {
        let attempt = request.with_bearer(Some(token));
        let response = self.inner.transport.execute(&attempt).await?;
        classify(response)
    }

    async fn refresh_token(&self) -> ClientResult<String> {
        let request = ApiRequest::post(paths::AUTH_REFRESH).without_refresh();
        let response = classify(self.inner.transport.execute(&request).await?)?;
        let RefreshResponse { token } = response.json("refresh response")?;
        self.inner.tokens.persist(&token)?;
        debug!("credential refresh succeeded");
        Ok(token)
    }
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("ApiClient")
            .field("tokens", &self.inner.tokens)
            .field("refresh_in_flight", &self.inner.refresh.in_flight())
            .finish_non_exhaustive()
    }
}

fn classify(response: ApiResponse) -> ClientResult<ApiResponse> {
    if response.is_success() {
        Ok(response)
    } else {
        Err(ClientError::from_status(response.status, &response.body))
    }
}
