//! Composition root wiring transport, storage, cache and events together.

use std::sync::Arc;

use temuin_events::EventBus;

use crate::admin::AdminConsole;
use crate::booking::BookingOrchestrator;
use crate::cache::QueryCache;
use crate::catalog::Catalog;
use crate::config::ClientConfig;
use crate::error::ClientResult;
use crate::http::ApiClient;
use crate::session::SessionStore;
use crate::storage::{KeyValueStore, TokenStore};
use crate::transport::{ReqwestTransport, Transport};

/// Every client component sharing one transport, token slot, cache and bus.
#[derive(Debug, Clone)]
pub struct TemuinApp {
    config: ClientConfig,
    api: ApiClient,
    cache: QueryCache,
    events: EventBus,
    session: SessionStore,
    catalog: Catalog,
    booking: BookingOrchestrator,
    admin: AdminConsole,
}

impl TemuinApp {
    /// Application talking HTTP to `config.base_url`.
    ///
    /// # Errors
    ///
    /// Returns a transport error if the HTTP client cannot be built.
    pub fn connect(config: ClientConfig, storage: Arc<dyn KeyValueStore>) -> ClientResult<Self> {
        let transport = ReqwestTransport::from_config(&config)?;
        Ok(Self::with_transport(config, Arc::new(transport), storage))
    }

    /// Application over an arbitrary transport.
    #[must_use]
    pub fn with_transport(
        config: ClientConfig,
        transport: Arc<dyn Transport>,
        storage: Arc<dyn KeyValueStore>,
    ) -> Self {
        let api = ApiClient::new(transport, TokenStore::new(storage));
        let cache = QueryCache::new(config.stale_time);
        let events = EventBus::new();
        Self {
            session: SessionStore::new(api.clone(), events.clone()),
            catalog: Catalog::new(api.clone(), cache.clone()),
            booking: BookingOrchestrator::new(
                api.clone(),
                cache.clone(),
                events.clone(),
                config.payment.clone(),
            ),
            admin: AdminConsole::new(api.clone(), cache.clone(), events.clone()),
            config,
            api,
            cache,
            events,
        }
    }

    /// Active configuration.
    #[must_use]
    pub const fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Authenticated HTTP client.
    #[must_use]
    pub const fn api(&self) -> &ApiClient {
        &self.api
    }

    /// Shared query cache.
    #[must_use]
    pub const fn cache(&self) -> &QueryCache {
        &self.cache
    }

    /// Notification bus.
    #[must_use]
    pub const fn events(&self) -> &EventBus {
        &self.events
    }

    /// Identity store.
    #[must_use]
    pub const fn session(&self) -> &SessionStore {
        &self.session
    }

    /// Services, providers and slots.
    #[must_use]
    pub const fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Booking saga.
    #[must_use]
    pub const fn booking(&self) -> &BookingOrchestrator {
        &self.booking
    }

    /// Admin console.
    #[must_use]
    pub const fn admin(&self) -> &AdminConsole {
        &self.admin
    }
}
