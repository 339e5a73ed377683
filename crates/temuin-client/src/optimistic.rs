//! Reusable "mutate now, roll back on failure" primitive over [`QueryCache`].
//!
//! # Design
//! - Parameterised by the affected family, a typed transform and the families
//!   to invalidate once the mutation settles.
//! - `begin` cancels in-flight fetches for the family before snapshotting, so
//!   a late response cannot overwrite the optimistic value.
//! - `settle` restores the snapshot on failure and always invalidates.

use std::future::Future;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::cache::{CacheSnapshot, QueryCache, QueryKey};
use crate::error::ClientResult;

/// Optimistic write recipe for one resource family.
#[derive(Debug, Clone)]
pub struct OptimisticMutation {
    cache: QueryCache,
    affected: QueryKey,
    invalidates: Vec<QueryKey>,
}

/// Rollback context returned by [`OptimisticMutation::begin`].
#[derive(Debug, Clone, PartialEq)]
#[must_use = "pass the context to `settle` so failures can be rolled back"]
pub struct RollbackContext {
    snapshot: CacheSnapshot,
}

impl RollbackContext {
    /// Entries captured before the optimistic write.
    #[must_use]
    pub const fn snapshot(&self) -> &CacheSnapshot {
        &self.snapshot
    }
}

impl OptimisticMutation {
    /// Mutation over the `affected` family.
    #[must_use]
    pub const fn new(cache: QueryCache, affected: QueryKey) -> Self {
        Self {
            cache,
            affected,
            invalidates: Vec::new(),
        }
    }

    /// Also invalidate `family` when the mutation settles.
    #[must_use]
    pub fn invalidating(mut self, family: QueryKey) -> Self {
        self.invalidates.push(family);
        self
    }

    /// Cancel in-flight fetches, snapshot the family and apply `transform` to
    /// every cached entry of type `T`.
    pub fn begin<T, F>(&self, transform: F) -> RollbackContext
    where
        T: Serialize + DeserializeOwned,
        F: Fn(&mut T),
    {
        self.cache.cancel(&self.affected);
        let snapshot = self.cache.snapshot(&self.affected);
        for (key, value) in snapshot.entries() {
            let mut data = match serde_json::from_value::<T>(value.clone()) {
                Ok(data) => data,
                Err(err) => {
                    warn!(key = %key, error = %err, "skipping optimistic write for entry");
                    continue;
                }
            };
            transform(&mut data);
            if let Err(err) = self.cache.set_data(key, &data) {
                warn!(key = %key, error = %err, "optimistic write failed");
            }
        }
        debug!(family = %self.affected, entries = snapshot.len(), "applied optimistic write");
        RollbackContext { snapshot }
    }

    /// Restore the snapshot if `result` failed, then invalidate every family.
    pub fn settle<R, E>(&self, context: RollbackContext, result: &Result<R, E>) {
        if result.is_err() {
            debug!(family = %self.affected, "rolling back optimistic write");
            self.cache.restore(context.snapshot);
        }
        self.cache.invalidate(&self.affected);
        for family in &self.invalidates {
            self.cache.invalidate(family);
        }
    }

    /// Run `operation` between [`begin`](Self::begin) and [`settle`](Self::settle).
    ///
    /// # Errors
    ///
    /// Returns the operation's error after the rollback has been applied.
    pub async fn run<T, F, R, Fut>(&self, transform: F, operation: Fut) -> ClientResult<R>
    where
        T: Serialize + DeserializeOwned,
        F: Fn(&mut T),
        Fut: Future<Output = ClientResult<R>>,
    {
        let context = self.begin(transform);
        let result = operation.await;
        self.settle(context, &result);
        result
    }
}
