//! Cache layer with optimistic patches and token-guarded rollback.
//!
//! # Design Philosophy
//!
//! Optimistic patches must be visible immediately, yet always reconcilable to
//! server truth. Every patch captures the value it replaced together with a
//! [`SnapshotToken`]. A rollback only restores that snapshot while its token is
//! still the pending one, so a slow failing mutation can never undo state a
//! newer mutation (or a refetch) already installed.
//!
//! All cache operations are synchronous. Suspension only happens at the
//! network boundary, so patch application and snapshot capture are atomic with
//! respect to every other cache operation.
//!
//! # Example
//!
//! ```ignore
//! let cache = Arc::new(EntityCache::new());
//! let reads = ReadThroughCache::with_defaults(Arc::clone(&cache));
//!
//! let list = reads
//!     .read(&key, "/expenses", Freshness::best_effort(Duration::from_secs(5)), &fetcher)
//!     .await?;
//!
//! let coordinator = MutationCoordinator::new(cache);
//! coordinator.run(&key, |current| current.map(drop_seven), || remote_delete()).await?;
//! ```

pub mod entry;
pub mod events;
pub mod freshness;
pub mod key;
pub mod read_through;
pub mod stats;
pub mod store;

pub use entry::{CacheEntry, OptimisticStart, RollbackOutcome, SnapshotToken};
pub use events::CacheEvent;
pub use freshness::{CacheRead, Freshness, ReadSource};
pub use key::{CacheKey, KeyPart};
pub use read_through::{CacheConfig, ReadThroughCache};
pub use stats::CacheStats;
pub use store::{EntityCache, ReadCompletion, ReadTicket};
