use std::sync::Arc;

use anyhow::{Context, Result};
use futures_util::future::join_all;
use temuin_client::api::paths;
use temuin_client::{ApiClient, ApiRequest, ClientError, MemoryStore, Method, TokenStore};
use temuin_test_support::fixtures::REFRESHED_TOKEN;
use temuin_test_support::{MockBackend, MockReply};

fn client(backend: &MockBackend) -> ApiClient {
    ApiClient::new(
        Arc::new(backend.clone()),
        TokenStore::new(Arc::new(MemoryStore::new())),
    )
}

/// `/api/me` answers 401 unless the refreshed token is presented.
fn expiring_backend() -> MockBackend {
    let backend = MockBackend::new();
    backend.on(Method::Get, paths::ME, |request| {
        if request.bearer() == Some(REFRESHED_TOKEN) {
            MockReply::ok(serde_json::json!({ "user": { "id": "u1", "email": "a@x" } }))
        } else {
            MockReply::error(401, "token expired")
        }
    });
    backend.on(Method::Post, paths::AUTH_REFRESH, |_| {
        MockReply::ok(serde_json::json!({ "token": REFRESHED_TOKEN }))
    });
    backend
}

#[tokio::test]
async fn concurrent_unauthorized_requests_share_one_refresh() -> Result<()> {
    const CALLERS: usize = 5;
    let backend = expiring_backend();
    let api = client(&backend);
    let gate = backend.hold(Method::Post, paths::AUTH_REFRESH);

    let handles: Vec<_> = (0..CALLERS)
        .map(|_| {
            let api = api.clone();
            tokio::spawn(async move { api.me().await })
        })
        .collect();

    gate.arrived().await;
    backend.wait_for_calls(Method::Get, paths::ME, CALLERS).await;
    assert!(api.refresh_in_flight());
    assert_eq!(backend.count(Method::Post, paths::AUTH_REFRESH), 1);
    gate.release();

    for outcome in join_all(handles).await {
        let me = outcome.context("task panicked")??;
        assert_eq!(me.user.email, "a@x");
    }
    assert_eq!(backend.count(Method::Post, paths::AUTH_REFRESH), 1);
    assert!(!api.refresh_in_flight());

    let replays: Vec<_> = backend
        .calls_to(Method::Get, paths::ME)
        .into_iter()
        .filter(|call| call.retry)
        .collect();
    assert_eq!(replays.len(), CALLERS);
    assert!(
        replays
            .iter()
            .all(|call| call.bearer.as_deref() == Some(REFRESHED_TOKEN))
    );
    assert_eq!(api.tokens().read().as_deref(), Some(REFRESHED_TOKEN));
    Ok(())
}

#[tokio::test]
async fn replay_rejected_again_is_not_retried_a_third_time() -> Result<()> {
    let backend = MockBackend::new();
    backend.on(Method::Get, paths::PROVIDERS, |_| {
        MockReply::error(401, "still unauthorized")
    });
    backend.on(Method::Post, paths::AUTH_REFRESH, |_| {
        MockReply::ok(serde_json::json!({ "token": REFRESHED_TOKEN }))
    });
    let api = client(&backend);

    let err = api
        .list_providers()
        .await
        .expect_err("second 401 must propagate");
    assert!(err.is_unauthorized());
    assert_eq!(err.user_message(), "still unauthorized");
    assert_eq!(backend.count(Method::Get, paths::PROVIDERS), 2);
    assert_eq!(backend.count(Method::Post, paths::AUTH_REFRESH), 1);
    Ok(())
}

#[tokio::test]
async fn failed_refresh_fails_every_queued_request() -> Result<()> {
    let backend = expiring_backend();
    backend.on(Method::Post, paths::AUTH_REFRESH, |_| {
        MockReply::json(401, serde_json::json!({ "error": "invalid refresh" }))
    });
    let api = client(&backend);
    let gate = backend.hold(Method::Post, paths::AUTH_REFRESH);

    let leader = {
        let api = api.clone();
        tokio::spawn(async move { api.send(ApiRequest::get(paths::ME)).await })
    };
    gate.arrived().await;
    let waiters: Vec<_> = (0..2)
        .map(|_| {
            let api = api.clone();
            tokio::spawn(async move { api.send(ApiRequest::get(paths::ME)).await })
        })
        .collect();
    backend.wait_for_calls(Method::Get, paths::ME, 3).await;
    gate.release();

    let leader_err = leader
        .await
        .context("leader panicked")?
        .expect_err("refresh failed");
    assert_eq!(leader_err.user_message(), "token expired");

    for waiter in join_all(waiters).await {
        let err = waiter.context("waiter panicked")?.expect_err("refresh failed");
        assert!(matches!(err, ClientError::Status { status: 401, .. }));
        assert_eq!(err.user_message(), "invalid refresh");
    }
    assert_eq!(backend.count(Method::Post, paths::AUTH_REFRESH), 1);
    assert_eq!(backend.count(Method::Get, paths::ME), 3);
    assert!(!api.refresh_in_flight());
    assert!(api.tokens().read().is_none());
    Ok(())
}

#[tokio::test]
async fn refresh_flag_clears_so_later_expiry_refreshes_again() -> Result<()> {
    let backend = expiring_backend();
    let api = client(&backend);
    api.me().await?;

    backend.on(Method::Get, paths::ME, |_| MockReply::error(401, "expired again"));
    let err = api.me().await.expect_err("replay also rejected");
    assert!(err.is_unauthorized());
    assert_eq!(backend.count(Method::Post, paths::AUTH_REFRESH), 2);
    Ok(())
}

#[tokio::test]
async fn late_unauthorized_after_settled_refresh_reuses_the_new_token() -> Result<()> {
    let backend = expiring_backend();
    let api = client(&backend);
    let gate = backend.hold(Method::Get, paths::ME);

    let slow = {
        let api = api.clone();
        tokio::spawn(async move { api.me().await })
    };
    gate.arrived().await;

    api.me().await?;
    assert_eq!(backend.count(Method::Post, paths::AUTH_REFRESH), 1);
    assert!(!api.refresh_in_flight());

    gate.release();
    let me = slow.await.context("task panicked")??;
    assert_eq!(me.user.email, "a@x");
    assert_eq!(backend.count(Method::Post, paths::AUTH_REFRESH), 1);

    let last = backend
        .calls_to(Method::Get, paths::ME)
        .pop()
        .context("replayed call")?;
    assert!(last.retry);
    assert_eq!(last.bearer.as_deref(), Some(REFRESHED_TOKEN));
    Ok(())
}
