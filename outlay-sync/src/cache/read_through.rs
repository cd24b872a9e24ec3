//! Read-through access to the entity cache.
//!
//! Reads consult the cache first according to their [`Freshness`], fall back
//! to the remote [`Fetcher`], and store the result unless a mutation or an
//! invalidation overtook the fetch while it was suspended.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use outlay_core::{Fetcher, RequestFailed, Value};
use tracing::{debug, warn};

use super::freshness::{CacheRead, Freshness};
use super::key::CacheKey;
use super::store::{EntityCache, ReadCompletion, ReadTicket, DEFAULT_EVENT_CAPACITY};

/// Configuration for the read path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// Maximum staleness for [`ReadThroughCache::read_default`].
    pub default_max_staleness: Duration,
    /// Extra fetch attempts after a failed read. Zero disables retry.
    pub read_retries: u32,
    /// Buffered change events per subscriber.
    pub event_capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_max_staleness: Duration::from_secs(5),
            read_retries: 0,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

impl CacheConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_staleness(mut self, duration: Duration) -> Self {
        self.default_max_staleness = duration;
        self
    }

    pub fn with_read_retries(mut self, retries: u32) -> Self {
        self.read_retries = retries;
        self
    }

    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    /// Build an [`EntityCache`] sized by this configuration.
    pub fn build_cache(&self) -> EntityCache {
        EntityCache::with_event_capacity(self.event_capacity)
    }
}

/// Read path over a shared [`EntityCache`].
#[derive(Debug, Clone)]
pub struct ReadThroughCache {
    cache: Arc<EntityCache>,
    config: CacheConfig,
}

impl ReadThroughCache {
    pub fn new(cache: Arc<EntityCache>, config: CacheConfig) -> Self {
        Self { cache, config }
    }

    pub fn with_defaults(cache: Arc<EntityCache>) -> Self {
        Self::new(cache, CacheConfig::default())
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn cache(&self) -> &Arc<EntityCache> {
        &self.cache
    }

    /// Read `key`, fetching `resource` when the cached value does not satisfy
    /// `freshness`.
    ///
    /// If the fetch is overtaken (a mutation started or the key was
    /// invalidated while it was in flight), its result is dropped and the
    /// value the cache holds at completion is returned, marked
    /// [`superseded`](CacheRead::was_superseded). When the cache holds no
    /// value for `key` at that point, the fetched value is returned instead,
    /// still marked superseded and with version 0: it may predate the
    /// mutation that overtook it, so callers should read again once that
    /// mutation settles.
    pub async fn read<F>(
        &self,
        key: &CacheKey,
        resource: &str,
        freshness: Freshness,
        fetcher: &F,
    ) -> Result<CacheRead<Value>, RequestFailed>
    where
        F: Fetcher + ?Sized,
    {
        if let Some(hit) = self.cached(key, freshness) {
            self.cache.counters().hit();
            return Ok(hit);
        }
        self.cache.counters().miss();

        let in_flight = InFlightRead {
            cache: &self.cache,
            ticket: Some(self.cache.begin_read(key)),
        };
        let value = self.fetch(key, resource, fetcher).await?;
        self.cache.counters().fetch();

        match in_flight.complete(value.clone()) {
            ReadCompletion::Stored {
                version,
                fetched_at,
            } => Ok(CacheRead::from_fetch(value, fetched_at, version)),
            ReadCompletion::Discarded => {
                let version = self.cache.version(key);
                let current = self.cache.get(key).unwrap_or(value);
                Ok(CacheRead::superseded(current, version))
            }
        }
    }

    /// [`read`](Self::read) with the configured default staleness window.
    pub async fn read_default<F>(
        &self,
        key: &CacheKey,
        resource: &str,
        fetcher: &F,
    ) -> Result<CacheRead<Value>, RequestFailed>
    where
        F: Fetcher + ?Sized,
    {
        let freshness = Freshness::best_effort(self.config.default_max_staleness);
        self.read(key, resource, freshness, fetcher).await
    }

    fn cached(&self, key: &CacheKey, freshness: Freshness) -> Option<CacheRead<Value>> {
        let entry = self.cache.entry(key)?;
        if entry.is_stale() {
            return None;
        }
        let fetched_at = entry.fetched_at()?;
        if !freshness.accepts(fetched_at, Utc::now()) {
            return None;
        }
        let version = entry.version();
        let value = entry.value?;
        debug!(key = %key, version, "Cache hit");
        Some(CacheRead::from_cache(value, fetched_at, version))
    }

    async fn fetch<F>(
        &self,
        key: &CacheKey,
        resource: &str,
        fetcher: &F,
    ) -> Result<Value, RequestFailed>
    where
        F: Fetcher + ?Sized,
    {
        let mut attempt = 0;
        loop {
            match fetcher.get(resource).await {
                Ok(value) => return Ok(value),
                Err(err) if attempt < self.config.read_retries => {
                    attempt += 1;
                    warn!(key = %key, attempt, error = %err, "Read failed, retrying");
                }
                Err(err) => return Err(err),
            }
        }
    }
}

/// A registered read. Hands its ticket back on drop unless completed, so a
/// failed or cancelled fetch does not pin the cache entry.
struct InFlightRead<'a> {
    cache: &'a EntityCache,
    ticket: Option<ReadTicket>,
}

impl InFlightRead<'_> {
    fn complete(mut self, value: Value) -> ReadCompletion {
        match self.ticket.take() {
            Some(ticket) => self.cache.complete_read(ticket, value),
            None => ReadCompletion::Discarded,
        }
    }
}

impl Drop for InFlightRead<'_> {
    fn drop(&mut self) {
        if let Some(ticket) = self.ticket.take() {
            self.cache.abandon_read(ticket);
        }
    }
}
