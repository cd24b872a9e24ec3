//! Mutation coordination.
//!
//! A mutation runs in four steps: cancel outstanding reads on the key, install
//! the optimistic patch, await the remote call, then reconcile. Reconciling
//! always ends in an invalidation so the next read fetches server truth.

use std::future::Future;
use std::sync::Arc;

use outlay_core::{RequestFailed, Value};
use thiserror::Error;
use tracing::{debug, warn};

use crate::cache::{CacheKey, EntityCache, RollbackOutcome, SnapshotToken};

/// A mutation whose remote call succeeded.
#[derive(Debug, Clone, PartialEq)]
pub struct Confirmed<T> {
    pub key: CacheKey,
    pub token: SnapshotToken,
    pub response: T,
}

impl<T> Confirmed<T> {
    pub fn into_response(self) -> T {
        self.response
    }
}

/// A mutation whose remote call failed. The patch has been rolled back
/// unless a newer mutation superseded it.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Mutation on {key} failed: {source}")]
pub struct MutationFailed {
    pub key: CacheKey,
    #[source]
    pub source: RequestFailed,
    pub rollback: RollbackOutcome,
}

impl MutationFailed {
    pub fn into_source(self) -> RequestFailed {
        self.source
    }
}

/// Runs optimistic mutations against a shared [`EntityCache`].
#[derive(Debug, Clone)]
pub struct MutationCoordinator {
    cache: Arc<EntityCache>,
}

impl MutationCoordinator {
    pub fn new(cache: Arc<EntityCache>) -> Self {
        Self { cache }
    }

    pub fn cache(&self) -> &Arc<EntityCache> {
        &self.cache
    }

    /// Apply `patch` to `key` immediately, then await `remote`.
    ///
    /// The patch is visible to readers before the first suspension. If a
    /// mutation on the same key is still in flight, this one supersedes its
    /// snapshot: that mutation's later failure will not undo this patch.
    ///
    /// On success the pending snapshot is cleared and `key` invalidated. On
    /// failure the snapshot is restored (when still owned by this mutation)
    /// and `key` invalidated as well.
    #[tracing::instrument(skip_all, fields(key = %key))]
    pub async fn run<T, P, F, Fut>(
        &self,
        key: &CacheKey,
        patch: P,
        remote: F,
    ) -> Result<Confirmed<T>, MutationFailed>
    where
        P: FnOnce(Option<Value>) -> Option<Value>,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, RequestFailed>>,
    {
        self.cache.cancel_reads(key);
        let start = self.cache.begin_or_supersede(key, patch);
        let token = start.token;

        match remote().await {
            Ok(response) => {
                self.cache.settle(key, token);
                self.cache.invalidate(key);
                debug!(token = %token, "Mutation confirmed");
                Ok(Confirmed {
                    key: key.clone(),
                    token,
                    response,
                })
            }
            Err(source) => {
                let rollback = self.cache.rollback(key, token);
                self.cache.invalidate(key);
                warn!(token = %token, ?rollback, error = %source, "Mutation failed");
                Err(MutationFailed {
                    key: key.clone(),
                    source,
                    rollback,
                })
            }
        }
    }
}
