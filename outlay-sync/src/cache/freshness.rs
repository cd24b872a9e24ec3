//! Freshness contracts for cache reads.
//!
//! Every read names its staleness tolerance, so whether a screen may show a
//! remembered list or must wait for the server is decided at the call site.

use chrono::{DateTime, Utc};
use std::time::Duration;

/// Freshness requirement for cache reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Freshness {
    /// Serve the cached value while it is not stale and younger than
    /// `max_staleness`; refetch otherwise.
    BestEffort { max_staleness: Duration },

    /// Always refetch. The cached value is replaced when the fetch lands.
    #[default]
    Consistent,
}

impl Freshness {
    pub fn best_effort(max_staleness: Duration) -> Self {
        Self::BestEffort { max_staleness }
    }

    pub fn consistent() -> Self {
        Self::Consistent
    }

    pub fn is_best_effort(&self) -> bool {
        matches!(self, Self::BestEffort { .. })
    }

    pub fn is_consistent(&self) -> bool {
        matches!(self, Self::Consistent)
    }

    /// Max staleness for BestEffort, zero for Consistent.
    pub fn max_staleness(&self) -> Duration {
        match self {
            Self::BestEffort { max_staleness } => *max_staleness,
            Self::Consistent => Duration::ZERO,
        }
    }

    /// Whether a value stored at `fetched_at` may be served at `now`.
    pub fn accepts(&self, fetched_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        match self {
            Self::BestEffort { max_staleness } => age(fetched_at, now) <= *max_staleness,
            Self::Consistent => false,
        }
    }
}

/// Where the value of a [`CacheRead`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadSource {
    /// Served from memory without a request.
    Cache,
    /// Fetched and stored.
    Fetch,
    /// Fetched, but the result was discarded because a mutation or
    /// invalidation overtook it. The value is what the cache held instead.
    Superseded,
}

/// Result of a cache read, carrying staleness metadata.
#[derive(Debug, Clone)]
pub struct CacheRead<T> {
    value: T,
    fetched_at: DateTime<Utc>,
    version: u64,
    source: ReadSource,
}

impl<T> CacheRead<T> {
    pub fn from_cache(value: T, fetched_at: DateTime<Utc>, version: u64) -> Self {
        Self {
            value,
            fetched_at,
            version,
            source: ReadSource::Cache,
        }
    }

    pub fn from_fetch(value: T, fetched_at: DateTime<Utc>, version: u64) -> Self {
        Self {
            value,
            fetched_at,
            version,
            source: ReadSource::Fetch,
        }
    }

    pub fn superseded(value: T, version: u64) -> Self {
        Self {
            value,
            fetched_at: Utc::now(),
            version,
            source: ReadSource::Superseded,
        }
    }

    pub fn into_value(self) -> T {
        self.value
    }

    pub fn value(&self) -> &T {
        &self.value
    }

    pub fn source(&self) -> ReadSource {
        self.source
    }

    pub fn was_cache_hit(&self) -> bool {
        self.source == ReadSource::Cache
    }

    pub fn was_cache_miss(&self) -> bool {
        !self.was_cache_hit()
    }

    pub fn was_superseded(&self) -> bool {
        self.source == ReadSource::Superseded
    }

    /// Confirmed version of the entry when the value was read.
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn fetched_at(&self) -> DateTime<Utc> {
        self.fetched_at
    }

    /// Time since the value was fetched.
    pub fn staleness(&self) -> Duration {
        age(self.fetched_at, Utc::now())
    }

    pub fn is_fresh_as_of(&self, timestamp: DateTime<Utc>) -> bool {
        self.fetched_at >= timestamp
    }

    pub fn map<U, F>(self, f: F) -> CacheRead<U>
    where
        F: FnOnce(T) -> U,
    {
        CacheRead {
            value: f(self.value),
            fetched_at: self.fetched_at,
            version: self.version,
            source: self.source,
        }
    }

    /// Fallible [`map`](Self::map), typically used to decode the raw value.
    pub fn try_map<U, E, F>(self, f: F) -> Result<CacheRead<U>, E>
    where
        F: FnOnce(T) -> Result<U, E>,
    {
        Ok(CacheRead {
            value: f(self.value)?,
            fetched_at: self.fetched_at,
            version: self.version,
            source: self.source,
        })
    }
}

impl<T> AsRef<T> for CacheRead<T> {
    fn as_ref(&self) -> &T {
        &self.value
    }
}

fn age(fetched_at: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    (now - fetched_at).to_std().unwrap_or(Duration::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_freshness_best_effort() {
        let freshness = Freshness::best_effort(Duration::from_secs(5));
        assert!(freshness.is_best_effort());
        assert!(!freshness.is_consistent());
        assert_eq!(freshness.max_staleness(), Duration::from_secs(5));
    }

    #[test]
    fn test_freshness_default_is_consistent() {
        let freshness = Freshness::default();
        assert!(freshness.is_consistent());
        assert_eq!(freshness.max_staleness(), Duration::ZERO);
    }

    #[test]
    fn test_accepts_within_window() {
        let now = Utc::now();
        let freshness = Freshness::best_effort(Duration::from_secs(5));
        assert!(freshness.accepts(now - chrono::Duration::seconds(4), now));
        assert!(!freshness.accepts(now - chrono::Duration::seconds(6), now));
        assert!(!Freshness::consistent().accepts(now, now));
    }

    #[test]
    fn test_future_timestamp_counts_as_fresh() {
        let now = Utc::now();
        let freshness = Freshness::best_effort(Duration::ZERO);
        assert!(freshness.accepts(now + chrono::Duration::seconds(1), now));
    }

    #[test]
    fn test_cache_read_sources() {
        let at = Utc::now();
        let hit = CacheRead::from_cache("a", at, 3);
        assert!(hit.was_cache_hit());
        assert_eq!(hit.version(), 3);
        assert_eq!(hit.fetched_at(), at);

        let fetched = CacheRead::from_fetch(42, at, 1);
        assert!(fetched.was_cache_miss());
        assert!(!fetched.was_superseded());

        let superseded = CacheRead::superseded(7, 1);
        assert!(superseded.was_cache_miss());
        assert!(superseded.was_superseded());
    }

    #[test]
    fn test_cache_read_map() {
        let read = CacheRead::from_fetch(21, Utc::now(), 2);
        let doubled = read.map(|v| v * 2);
        assert_eq!(*doubled.value(), 42);
        assert_eq!(doubled.source(), ReadSource::Fetch);

        let parsed: Result<CacheRead<i32>, std::num::ParseIntError> =
            CacheRead::from_cache("12", Utc::now(), 1).try_map(str::parse);
        assert_eq!(parsed.unwrap().into_value(), 12);
    }

    #[test]
    fn test_staleness_grows() {
        let read = CacheRead::from_cache((), Utc::now() - chrono::Duration::seconds(10), 1);
        assert!(read.staleness() >= Duration::from_secs(10));
        assert!(!read.is_fresh_as_of(Utc::now()));
    }
}
