//! Keyed query cache with staleness, cancellation and snapshot/restore.
//!
//! # Design
//! - Keys are segment tuples; a resource family is any key prefix, so one
//!   invalidation reaches every parameter variation of that resource.
//! - Values are stored as JSON so heterogeneous queries share one map.
//! - Each entry carries an epoch. `cancel` bumps it and a fetch that settles
//!   under an older epoch discards its result instead of overwriting newer
//!   (for example optimistic) data.
//! - Observers watch a change counter rather than individual entries.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::error::{ClientError, ClientResult};

/// One component of a [`QueryKey`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum KeySegment {
    /// Resource or sub-resource name.
    Name(String),
    /// Query parameters, ordered canonically.
    Params(BTreeMap<String, String>),
}

/// Semantic cache key such as `admin/users/{page=1,q=}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QueryKey(Vec<KeySegment>);

impl QueryKey {
    /// Key made of plain name segments.
    #[must_use]
    pub fn from_parts(parts: &[&str]) -> Self {
        Self(
            parts
                .iter()
                .map(|part| KeySegment::Name((*part).to_string()))
                .collect(),
        )
    }

    /// Append a name segment.
    #[must_use]
    pub fn push(mut self, name: impl Into<String>) -> Self {
        self.0.push(KeySegment::Name(name.into()));
        self
    }

    /// Append a parameter segment.
    #[must_use]
    pub fn with_params<K, V>(mut self, params: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        let params = params
            .into_iter()
            .map(|(key, value)| (key.into(), value.into()))
            .collect();
        self.0.push(KeySegment::Params(params));
        self
    }

    /// Whether `prefix` names this key or one of its families.
    #[must_use]
    pub fn starts_with(&self, prefix: &Self) -> bool {
        self.0.starts_with(&prefix.0)
    }

    /// Key segments.
    #[must_use]
    pub fn segments(&self) -> &[KeySegment] {
        &self.0
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, segment) in self.0.iter().enumerate() {
            if index > 0 {
                formatter.write_str("/")?;
            }
            match segment {
                KeySegment::Name(name) => formatter.write_str(name)?,
                KeySegment::Params(params) => {
                    formatter.write_str("{")?;
                    for (position, (key, value)) in params.iter().enumerate() {
                        if position > 0 {
                            formatter.write_str(",")?;
                        }
                        write!(formatter, "{key}={value}")?;
                    }
                    formatter.write_str("}")?;
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
struct Entry {
    data: Option<Value>,
    updated_at: Option<Instant>,
    stale: bool,
    epoch: u64,
    fetching: bool,
}

impl Entry {
    fn is_fresh(&self, stale_time: Duration) -> bool {
        self.data.is_some()
            && !self.stale
            && self
                .updated_at
                .is_some_and(|at| at.elapsed() < stale_time)
    }
}

/// Captured entries used to undo an optimistic write.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CacheSnapshot {
    entries: Vec<(QueryKey, Value)>,
}

impl CacheSnapshot {
    /// Number of captured entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing was captured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Captured keys and values.
    #[must_use]
    pub fn entries(&self) -> &[(QueryKey, Value)] {
        &self.entries
    }
}

/// Shared query cache; clones observe the same entries.
#[derive(Clone)]
pub struct QueryCache {
    entries: Arc<Mutex<HashMap<QueryKey, Entry>>>,
    stale_time: Duration,
    changes: Arc<watch::Sender<u64>>,
}

impl QueryCache {
    /// Empty cache whose entries stay fresh for `stale_time`.
    #[must_use]
    pub fn new(stale_time: Duration) -> Self {
        let (changes, _) = watch::channel(0);
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
            stale_time,
            changes: Arc::new(changes),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<QueryKey, Entry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn notify(&self) {
        self.changes.send_modify(|version| *version = version.wrapping_add(1));
    }

    /// Receiver ticking on every visible change.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.changes.subscribe()
    }

    /// Decoded data under `key`, if present and of the expected shape.
    #[must_use]
    pub fn get_data<T: DeserializeOwned>(&self, key: &QueryKey) -> Option<T> {
        let value = self.lock().get(key).and_then(|entry| entry.data.clone())?;
        match serde_json::from_value(value) {
            Ok(data) => Some(data),
            Err(err) => {
                warn!(key = %key, error = %err, "cached data has an unexpected shape");
                None
            }
        }
    }

    /// Replace the data under `key` and mark it fresh.
    ///
    /// # Errors
    ///
    /// Returns a decode error if `data` cannot be represented as JSON.
    pub fn set_data<T: Serialize>(&self, key: &QueryKey, data: &T) -> ClientResult<()> {
        let value = serde_json::to_value(data).map_err(|err| ClientError::Decode {
            context: format!("cache entry {key}"),
            detail: err.to_string(),
        })?;
        self.write_value(key, value);
        Ok(())
    }

    fn write_value(&self, key: &QueryKey, value: Value) {
        {
            let mut entries = self.lock();
            let entry = entries.entry(key.clone()).or_default();
            entry.data = Some(value);
            entry.updated_at = Some(Instant::now());
            entry.stale = false;
        }
        self.notify();
    }

    /// Keys under `prefix` that currently hold data.
    #[must_use]
    pub fn keys(&self, prefix: &QueryKey) -> Vec<QueryKey> {
        let mut keys: Vec<QueryKey> = self
            .lock()
            .iter()
            .filter(|(key, entry)| key.starts_with(prefix) && entry.data.is_some())
            .map(|(key, _)| key.clone())
            .collect();
        keys.sort();
        keys
    }

    /// Capture every populated entry under `prefix`.
    #[must_use]
    pub fn snapshot(&self, prefix: &QueryKey) -> CacheSnapshot {
        let mut entries: Vec<(QueryKey, Value)> = self
            .lock()
            .iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .filter_map(|(key, entry)| entry.data.clone().map(|data| (key.clone(), data)))
            .collect();
        entries.sort_by(|left, right| left.0.cmp(&right.0));
        CacheSnapshot { entries }
    }

    /// Write every captured entry back verbatim.
    pub fn restore(&self, snapshot: CacheSnapshot) {
        if snapshot.is_empty() {
            return;
        }
        {
            let mut entries = self.lock();
            for (key, value) in snapshot.entries {
                let entry = entries.entry(key).or_default();
                entry.data = Some(value);
                entry.updated_at = Some(Instant::now());
            }
        }
        self.notify();
    }

    /// Mark every entry under `prefix` stale; returns how many were marked.
    pub fn invalidate(&self, prefix: &QueryKey) -> usize {
        let marked = {
            let mut entries = self.lock();
            let mut marked = 0;
            for (_, entry) in entries.iter_mut().filter(|(key, _)| key.starts_with(prefix)) {
                entry.stale = true;
                marked += 1;
            }
            marked
        };
        if marked > 0 {
            debug!(prefix = %prefix, marked, "invalidated cache family");
            self.notify();
        }
        marked
    }

    /// Abandon in-flight fetches under `prefix`; their results will be discarded.
    pub fn cancel(&self, prefix: &QueryKey) {
        let mut entries = self.lock();
        for (_, entry) in entries.iter_mut().filter(|(key, _)| key.starts_with(prefix)) {
            entry.epoch = entry.epoch.wrapping_add(1);
            entry.fetching = false;
        }
    }

    /// Whether the entry under `key` is missing, invalidated or past its stale time.
    #[must_use]
    pub fn is_stale(&self, key: &QueryKey) -> bool {
        self.lock()
            .get(key)
            .is_none_or(|entry| !entry.is_fresh(self.stale_time))
    }

    /// Whether a fetch for `key` is in flight.
    #[must_use]
    pub fn is_fetching(&self, key: &QueryKey) -> bool {
        self.lock().get(key).is_some_and(|entry| entry.fetching)
    }

    /// Return fresh data under `key`, or run `fetcher` and store its result.
    ///
    /// A result that settles after [`QueryCache::cancel`] touched the key is not
    /// stored; the data cached at that moment is returned instead when present.
    ///
    /// # Errors
    ///
    /// Propagates the fetcher's error; previously cached data is kept.
    pub async fn fetch<T, F, Fut>(&self, key: &QueryKey, fetcher: F) -> ClientResult<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = ClientResult<T>>,
    {
        let epoch = {
            let mut entries = self.lock();
            let entry = entries.entry(key.clone()).or_default();
            if entry.is_fresh(self.stale_time)
                && let Some(value) = entry.data.clone()
                && let Ok(data) = serde_json::from_value(value)
            {
                return Ok(data);
            }
            entry.fetching = true;
            entry.epoch
        };
        self.notify();

        let outcome = fetcher().await;

        let (current, superseded) = {
            let mut entries = self.lock();
            let entry = entries.entry(key.clone()).or_default();
            let superseded = entry.epoch != epoch;
            if !superseded {
                entry.fetching = false;
            }
            (entry.data.clone(), superseded)
        };

        if superseded {
            debug!(key = %key, "discarding result of cancelled fetch");
            return match (outcome, current.map(serde_json::from_value::<T>)) {
                (_, Some(Ok(data))) => Ok(data),
                (outcome, _) => outcome,
            };
        }

        match outcome {
            Ok(data) => {
                self.set_data(key, &data)?;
                Ok(data)
            }
            Err(err) => {
                self.notify();
                Err(err)
            }
        }
    }
}

impl fmt::Debug for QueryCache {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("QueryCache")
            .field("entries", &self.lock().len())
            .field("stale_time", &self.stale_time)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use tokio::sync::oneshot;

    fn users_key(page: u32) -> QueryKey {
        QueryKey::from_parts(&["admin", "users"]).with_params([
            ("page", page.to_string()),
            ("q", String::new()),
        ])
    }

    #[test]
    fn keys_match_their_families() {
        let family = QueryKey::from_parts(&["admin", "users"]);
        assert!(users_key(1).starts_with(&family));
        assert!(users_key(1).starts_with(&QueryKey::from_parts(&["admin"])));
        assert!(!users_key(1).starts_with(&QueryKey::from_parts(&["admin", "audit"])));
        assert!(!family.starts_with(&users_key(1)));
        assert_eq!(users_key(2).to_string(), "admin/users/{page=2,q=}");
    }

    #[tokio::test]
    async fn fetch_reuses_fresh_data_until_invalidated() {
        let cache = QueryCache::new(Duration::from_secs(60));
        let key = QueryKey::from_parts(&["providers"]);
        let counter = AtomicUsize::new(0);
        let calls = &counter;
        let load = move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok::<_, ClientError>(vec!["p1".to_string()])
        };

        assert_eq!(cache.fetch(&key, load).await.expect("first"), vec!["p1"]);
        assert_eq!(cache.fetch(&key, load).await.expect("cached"), vec!["p1"]);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!cache.is_stale(&key));

        assert_eq!(cache.invalidate(&QueryKey::from_parts(&["providers"])), 1);
        assert!(cache.is_stale(&key));
        cache.fetch(&key, load).await.expect("refetch");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn zero_stale_time_always_refetches() {
        let cache = QueryCache::new(Duration::ZERO);
        let key = QueryKey::from_parts(&["services"]);
        cache.set_data(&key, &1_u32).expect("seed");
        let fetched = cache
            .fetch(&key, || async { Ok::<_, ClientError>(2_u32) })
            .await
            .expect("fetch");
        assert_eq!(fetched, 2);
    }

    #[tokio::test]
    async fn failed_fetch_keeps_previous_data() {
        let cache = QueryCache::new(Duration::ZERO);
        let key = QueryKey::from_parts(&["services"]);
        cache.set_data(&key, &vec![1_u32]).expect("seed");
        let err = cache
            .fetch(&key, || async {
                Err::<Vec<u32>, _>(ClientError::validation("offline"))
            })
            .await
            .expect_err("fails");
        assert_eq!(err.user_message(), "offline");
        assert_eq!(cache.get_data::<Vec<u32>>(&key), Some(vec![1]));
        assert!(!cache.is_fetching(&key));
    }

    #[tokio::test]
    async fn cancelled_fetch_does_not_clobber_newer_data() {
        let cache = QueryCache::new(Duration::from_secs(60));
        let key = users_key(1);
        let (release, gate) = oneshot::channel::<()>();

        let pending = {
            let cache = cache.clone();
            let key = key.clone();
            tokio::spawn(async move {
                cache
                    .fetch(&key, || async move {
                        let _ = gate.await;
                        Ok::<_, ClientError>("server".to_string())
                    })
                    .await
            })
        };
        tokio::task::yield_now().await;
        assert!(cache.is_fetching(&key));

        cache.cancel(&QueryKey::from_parts(&["admin", "users"]));
        cache.set_data(&key, &"optimistic".to_string()).expect("write");
        let _ = release.send(());

        let returned = pending.await.expect("join").expect("fetch");
        assert_eq!(returned, "optimistic");
        assert_eq!(cache.get_data::<String>(&key).as_deref(), Some("optimistic"));
    }

    #[test]
    fn snapshot_and_restore_cover_the_whole_family() {
        let cache = QueryCache::new(Duration::from_secs(60));
        cache.set_data(&users_key(1), &"one").expect("seed");
        cache.set_data(&users_key(2), &"two").expect("seed");
        cache
            .set_data(&QueryKey::from_parts(&["admin", "audit"]), &"audit")
            .expect("seed");

        let snapshot = cache.snapshot(&QueryKey::from_parts(&["admin", "users"]));
        assert_eq!(snapshot.len(), 2);

        cache.set_data(&users_key(1), &"changed").expect("write");
        cache.set_data(&users_key(2), &"changed").expect("write");
        cache.restore(snapshot);
        assert_eq!(cache.get_data::<String>(&users_key(1)).as_deref(), Some("one"));
        assert_eq!(cache.get_data::<String>(&users_key(2)).as_deref(), Some("two"));
        assert_eq!(cache.keys(&QueryKey::from_parts(&["admin"])).len(), 3);
    }

    #[test]
    fn changes_are_observable() {
        let cache = QueryCache::new(Duration::from_secs(60));
        let mut changes = cache.subscribe();
        let before = *changes.borrow_and_update();
        cache.set_data(&users_key(1), &"x").expect("seed");
        assert!(changes.has_changed().expect("sender alive"));
        assert_ne!(*changes.borrow_and_update(), before);
    }
}
