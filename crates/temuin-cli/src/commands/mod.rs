pub(crate) mod admin;
pub(crate) mod auth;
pub(crate) mod booking;
pub(crate) mod catalog;

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;
    use std::time::Duration;

    use anyhow::{Result, anyhow};
    use httpmock::MockServer;
    use temuin_client::storage::TOKEN_KEY;
    use temuin_client::{KeyValueStore, MemoryStore};

    use crate::client::AppContext;

    /// Context talking to `server` with an in-memory session slot.
    pub(crate) fn context(server: &MockServer) -> Result<(AppContext, Arc<MemoryStore>)> {
        let store = Arc::new(MemoryStore::new());
        let base_url = server
            .base_url()
            .parse()
            .map_err(|_| anyhow!("valid URL"))?;
        let ctx = AppContext::with_store(base_url, Duration::from_secs(5), store.clone())
            .map_err(|err| anyhow!(err.display_message()))?;
        Ok((ctx, store))
    }

    /// Same as [`context`] with a persisted session token.
    pub(crate) fn signed_in_context(
        server: &MockServer,
        token: &str,
    ) -> Result<(AppContext, Arc<MemoryStore>)> {
        let (ctx, store) = context(server)?;
        store
            .set(TOKEN_KEY, token)
            .map_err(|err| anyhow!(err.user_message()))?;
        Ok((ctx, store))
    }
}
