//! Cache entries and snapshot tokens.

use chrono::{DateTime, Utc};
use outlay_core::Value;
use std::fmt;

/// Opaque handle pairing a pending snapshot with the mutation that created it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SnapshotToken(u64);

impl SnapshotToken {
    pub(crate) fn new(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for SnapshotToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Value captured by a speculative patch, restorable only by its own token.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct PendingSnapshot {
    pub(crate) token: SnapshotToken,
    pub(crate) value: Option<Value>,
}

/// Result of installing a speculative patch through
/// [`EntityCache::begin_or_supersede`](super::EntityCache::begin_or_supersede).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OptimisticStart {
    pub token: SnapshotToken,
    /// Token of the in-flight mutation this patch superseded, if any.
    pub superseded: Option<SnapshotToken>,
}

/// What a rollback did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RollbackOutcome {
    /// The snapshot was restored as the current value.
    Restored,
    /// A newer mutation or a server refresh owns the entry; nothing changed.
    Superseded,
}

/// One cached collection or item.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CacheEntry {
    pub(crate) value: Option<Value>,
    pub(crate) version: u64,
    pub(crate) pending: Option<PendingSnapshot>,
    pub(crate) stale: bool,
    pub(crate) fetched_at: Option<DateTime<Utc>>,
    pub(crate) read_epoch: u64,
    /// Reads registered with `begin_read` that have not completed yet.
    pub(crate) readers: usize,
}

impl CacheEntry {
    /// Current value, including any optimistic patch.
    pub fn value(&self) -> Option<&Value> {
        self.value.as_ref()
    }

    /// Number of server-confirmed writes or refreshes applied to this entry.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// True after invalidation until the next refresh lands.
    pub fn is_stale(&self) -> bool {
        self.stale
    }

    /// When the current server value was stored, if ever.
    pub fn fetched_at(&self) -> Option<DateTime<Utc>> {
        self.fetched_at
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn pending_token(&self) -> Option<SnapshotToken> {
        self.pending.as_ref().map(|p| p.token)
    }

    /// The value a rollback would restore, if a mutation is in flight.
    pub fn pending_snapshot(&self) -> Option<&Value> {
        self.pending.as_ref().and_then(|p| p.value.as_ref())
    }

    /// Never stored, holds nothing, and no read or mutation refers to it.
    pub(crate) fn is_vacant(&self) -> bool {
        self.value.is_none() && self.pending.is_none() && self.readers == 0 && self.version == 0
    }
}
