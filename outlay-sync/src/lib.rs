//! Outlay Sync - Optimistic Client Cache
//!
//! Keeps server-fetched collections in memory, applies speculative patches
//! while remote writes are in flight, and reconciles with server truth through
//! invalidation and refetch.
//!
//! One [`EntityCache`] is constructed per client session and injected into
//! the read path ([`ReadThroughCache`]) and the write path
//! ([`MutationCoordinator`]). Nothing here is global.

pub mod cache;
pub mod error;
pub mod mutation;

pub use cache::{
    CacheConfig, CacheEntry, CacheEvent, CacheKey, CacheRead, CacheStats, EntityCache, Freshness,
    KeyPart, OptimisticStart, ReadCompletion, ReadSource, ReadThroughCache, ReadTicket,
    RollbackOutcome, SnapshotToken,
};
pub use error::ConflictError;
pub use mutation::{Confirmed, MutationCoordinator, MutationFailed};
