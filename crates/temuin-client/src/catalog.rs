//! Reference data for the booking screen: services, providers and slots.
//!
//! # Design
//! - Services and providers are cached queries; their loading flags are the
//!   cache's in-flight flags.
//! - Slot loading is re-run on every selection change. Each load is tagged with
//!   a generation; a response whose generation is no longer current is dropped,
//!   so the displayed slots always match the latest selection.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, warn};

use temuin_api_models::{Provider, Service};

use crate::cache::{QueryCache, QueryKey};
use crate::error::ClientResult;
use crate::http::ApiClient;

/// Cache keys for catalogue queries.
pub mod keys {
    use chrono::NaiveDate;

    use crate::cache::QueryKey;

    /// `services`
    #[must_use]
    pub fn services() -> QueryKey {
        QueryKey::from_parts(&["services"])
    }

    /// `providers`
    #[must_use]
    pub fn providers() -> QueryKey {
        QueryKey::from_parts(&["providers"])
    }

    /// `availability` family.
    #[must_use]
    pub fn availability_family() -> QueryKey {
        QueryKey::from_parts(&["availability"])
    }

    /// `availability/{date,providerId}`
    #[must_use]
    pub fn availability(provider_id: &str, date: NaiveDate) -> QueryKey {
        availability_family().with_params([
            ("providerId", provider_id.to_string()),
            ("date", date.format("%Y-%m-%d").to_string()),
        ])
    }
}

/// Cached access to services and providers.
#[derive(Debug, Clone)]
pub struct Catalog {
    api: ApiClient,
    cache: QueryCache,
}

impl Catalog {
    /// Catalogue reading through `api` into `cache`.
    #[must_use]
    pub const fn new(api: ApiClient, cache: QueryCache) -> Self {
        Self { api, cache }
    }

    /// Service list.
    ///
    /// # Errors
    ///
    /// Propagates fetch errors.
    pub async fn services(&self) -> ClientResult<Vec<Service>> {
        let api = self.api.clone();
        self.cache
            .fetch(&keys::services(), || async move { api.list_services().await })
            .await
    }

    /// Provider list.
    ///
    /// # Errors
    ///
    /// Propagates fetch errors.
    pub async fn providers(&self) -> ClientResult<Vec<Provider>> {
        let api = self.api.clone();
        self.cache
            .fetch(&keys::providers(), || async move { api.list_providers().await })
            .await
    }

    /// Whether the service list is loading.
    #[must_use]
    pub fn services_loading(&self) -> bool {
        self.cache.is_fetching(&keys::services())
    }

    /// Whether the provider list is loading.
    #[must_use]
    pub fn providers_loading(&self) -> bool {
        self.cache.is_fetching(&keys::providers())
    }

    /// Slot loader sharing this catalogue's client and cache.
    #[must_use]
    pub fn slot_loader(&self) -> SlotLoader {
        SlotLoader::new(self.api.clone(), self.cache.clone())
    }
}

/// Provider and date whose slots are requested.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct SlotSelection {
    /// Provider identifier.
    pub provider_id: String,
    /// Requested date.
    pub date: NaiveDate,
}

/// What the slot list currently shows.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SlotView {
    /// Selection the view belongs to.
    pub selection: Option<SlotSelection>,
    /// Slots for that selection.
    pub slots: Vec<DateTime<Utc>>,
    /// Whether a load for the selection is in flight.
    pub loading: bool,
}

/// Outcome of one [`SlotLoader::select`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotLoad {
    /// Slots for the selection were applied to the view.
    Applied(Vec<DateTime<Utc>>),
    /// A newer selection superseded this one; the response was dropped.
    Superseded,
    /// Provider or date was missing; the view was emptied.
    Cleared,
    /// The load failed; the view was emptied.
    Failed(String),
}

/// Loads slots for the current selection, last selection wins.
#[derive(Clone)]
pub struct SlotLoader {
    api: ApiClient,
    cache: QueryCache,
    generation: Arc<AtomicU64>,
    view: Arc<watch::Sender<SlotView>>,
}

impl SlotLoader {
    /// Loader with an empty view.
    #[must_use]
    pub fn new(api: ApiClient, cache: QueryCache) -> Self {
        let (view, _) = watch::channel(SlotView::default());
        Self {
            api,
            cache,
            generation: Arc::new(AtomicU64::new(0)),
            view: Arc::new(view),
        }
    }

    /// Current view.
    #[must_use]
    pub fn view(&self) -> SlotView {
        self.view.borrow().clone()
    }

    /// Watch view changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SlotView> {
        self.view.subscribe()
    }

    /// Change the selection and load its slots.
    pub async fn select(&self, provider_id: Option<&str>, date: Option<NaiveDate>) -> SlotLoad {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let (Some(provider_id), Some(date)) = (provider_id.filter(|id| !id.is_empty()), date)
        else {
            self.view.send_replace(SlotView::default());
            return SlotLoad::Cleared;
        };

        let selection = SlotSelection {
            provider_id: provider_id.to_string(),
            date,
        };
        self.view.send_replace(SlotView {
            selection: Some(selection.clone()),
            slots: Vec::new(),
            loading: true,
        });

        let api = self.api.clone();
        let key = keys::availability(provider_id, date);
        let provider = provider_id.to_string();
        let outcome = self
            .cache
            .fetch(&key, || async move { api.availability(&provider, date).await })
            .await;

        if self.generation.load(Ordering::SeqCst) != generation {
            debug!(provider = %selection.provider_id, %date, "dropping superseded slot response");
            return SlotLoad::Superseded;
        }

        match outcome {
            Ok(availability) => {
                self.view.send_replace(SlotView {
                    selection: Some(selection),
                    slots: availability.slots.clone(),
                    loading: false,
                });
                SlotLoad::Applied(availability.slots)
            }
            Err(err) => {
                warn!(error = %err, detail = %err.user_message(), "failed to fetch availability");
                self.view.send_replace(SlotView {
                    selection: Some(selection),
                    slots: Vec::new(),
                    loading: false,
                });
                SlotLoad::Failed(err.user_message())
            }
        }
    }
}

impl std::fmt::Debug for SlotLoader {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("SlotLoader")
            .field("generation", &self.generation.load(Ordering::SeqCst))
            .field("view", &*self.view.borrow())
            .finish_non_exhaustive()
    }
}
