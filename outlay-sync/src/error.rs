//! Error types internal to the cache engine.

use crate::cache::{CacheKey, SnapshotToken};
use thiserror::Error;

/// A speculative patch was requested while another one still holds the
/// pending snapshot for the same key.
///
/// The mutation coordinator never surfaces this: it supersedes the earlier
/// snapshot instead. Direct callers of
/// [`EntityCache::begin_optimistic`](crate::EntityCache::begin_optimistic) see it.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Mutation already in flight for {key} (snapshot {pending})")]
pub struct ConflictError {
    pub key: CacheKey,
    pub pending: SnapshotToken,
}
