//! The in-memory entity cache.
//!
//! [`EntityCache`] exclusively owns every [`CacheEntry`]. Callers borrow values
//! by cloning them out; nothing outside this module holds a reference into the
//! map across a suspension point.

use super::entry::{CacheEntry, OptimisticStart, PendingSnapshot, RollbackOutcome, SnapshotToken};
use super::events::CacheEvent;
use super::key::CacheKey;
use super::stats::{CacheStats, StatsCounters};
use crate::error::ConflictError;
use chrono::{DateTime, Utc};
use outlay_core::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::broadcast;
use tracing::{debug, trace};

/// Default number of buffered change events per subscriber.
pub const DEFAULT_EVENT_CAPACITY: usize = 64;

/// Proof that a read started at a particular point in the entry's history.
///
/// Obtained from [`EntityCache::begin_read`] before the fetch suspends and
/// handed back to [`EntityCache::complete_read`] with the result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadTicket {
    key: CacheKey,
    epoch: u64,
}

impl ReadTicket {
    pub fn key(&self) -> &CacheKey {
        &self.key
    }
}

/// What happened to a fetched value handed to [`EntityCache::complete_read`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadCompletion {
    Stored {
        version: u64,
        fetched_at: DateTime<Utc>,
    },
    /// The read was cancelled, invalidated, or a mutation is in flight.
    Discarded,
}

/// Process-wide (per client session) store of server-fetched values.
///
/// Every operation is synchronous and completes under a single lock
/// acquisition, so operations are atomic with respect to each other. Patch
/// closures run under that lock and must not call back into the cache.
pub struct EntityCache {
    entries: RwLock<HashMap<CacheKey, CacheEntry>>,
    next_token: AtomicU64,
    events: broadcast::Sender<CacheEvent>,
    stats: StatsCounters,
}

impl EntityCache {
    pub fn new() -> Self {
        Self::with_event_capacity(DEFAULT_EVENT_CAPACITY)
    }

    pub fn with_event_capacity(capacity: usize) -> Self {
        let (events, _) = broadcast::channel(capacity.max(1));
        Self {
            entries: RwLock::new(HashMap::new()),
            next_token: AtomicU64::new(0),
            events,
            stats: StatsCounters::default(),
        }
    }

    /// Subscribe to change events. Slow subscribers may observe `Lagged`.
    pub fn subscribe(&self) -> broadcast::Receiver<CacheEvent> {
        self.events.subscribe()
    }

    // ------------------------------------------------------------------------
    // Plain access
    // ------------------------------------------------------------------------

    /// Current value for `key`, including any optimistic patch. No side effect.
    pub fn get(&self, key: &CacheKey) -> Option<Value> {
        self.read().get(key).and_then(|e| e.value.clone())
    }

    /// Copy of the full entry, for inspection.
    pub fn entry(&self, key: &CacheKey) -> Option<CacheEntry> {
        self.read().get(key).cloned()
    }

    /// Confirmed version of `key`; zero if it was never stored.
    pub fn version(&self, key: &CacheKey) -> u64 {
        self.read().get(key).map(|e| e.version).unwrap_or(0)
    }

    /// Number of entries holding a value.
    pub fn len(&self) -> usize {
        self.read().values().filter(|e| e.value.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        self.stats.snapshot(self.len() as u64)
    }

    /// Replace the value with server truth.
    ///
    /// Increments the version, clears staleness and any pending snapshot.
    /// Returns the new version.
    pub fn set(&self, key: &CacheKey, value: Value) -> u64 {
        let (version, changed) = {
            let mut entries = self.write();
            let entry = entries.entry(key.clone()).or_default();
            let (version, changed, _) = store(entry, value);
            (version, changed)
        };
        trace!(key = %key, version, changed, "Stored server value");
        self.emit(CacheEvent::Updated {
            key: key.clone(),
            version,
            changed,
        });
        version
    }

    // ------------------------------------------------------------------------
    // Optimistic patches
    // ------------------------------------------------------------------------

    /// Capture the current value as the pending snapshot and install
    /// `patch(current)` in its place.
    ///
    /// Fails with [`ConflictError`] if another mutation already holds the
    /// pending snapshot for `key`. The patch is visible to [`get`](Self::get)
    /// as soon as this returns.
    pub fn begin_optimistic<P>(
        &self,
        key: &CacheKey,
        patch: P,
    ) -> Result<SnapshotToken, ConflictError>
    where
        P: FnOnce(Option<Value>) -> Option<Value>,
    {
        let token = {
            let mut entries = self.write();
            let entry = entries.entry(key.clone()).or_default();
            if let Some(pending) = &entry.pending {
                return Err(ConflictError {
                    key: key.clone(),
                    pending: pending.token,
                });
            }
            self.install(entry, patch)
        };
        trace!(key = %key, token = %token, "Installed optimistic patch");
        self.emit(CacheEvent::Patched {
            key: key.clone(),
            token,
        });
        Ok(token)
    }

    /// Like [`begin_optimistic`](Self::begin_optimistic), but a pending
    /// snapshot held by an earlier mutation is superseded instead of rejected.
    ///
    /// The new snapshot is the current (already patched) value, so the later
    /// mutation always builds on the earlier one's patch, and the earlier
    /// mutation's rollback becomes a no-op.
    pub fn begin_or_supersede<P>(&self, key: &CacheKey, patch: P) -> OptimisticStart
    where
        P: FnOnce(Option<Value>) -> Option<Value>,
    {
        let start = {
            let mut entries = self.write();
            let entry = entries.entry(key.clone()).or_default();
            let superseded = entry.pending.take().map(|p| p.token);
            let token = self.install(entry, patch);
            OptimisticStart { token, superseded }
        };
        if let Some(previous) = start.superseded {
            self.stats.supersession();
            debug!(
                key = %key,
                token = %start.token,
                superseded = %previous,
                "Superseded in-flight patch"
            );
        }
        self.emit(CacheEvent::Patched {
            key: key.clone(),
            token: start.token,
        });
        start
    }

    /// Clear the pending snapshot after the remote write succeeded.
    ///
    /// Token-guarded like [`rollback`](Self::rollback); the optimistic value
    /// stays in place until the next refresh. Returns true if `token` was
    /// still pending.
    pub fn settle(&self, key: &CacheKey, token: SnapshotToken) -> bool {
        let mut entries = self.write();
        let settled = match entries.get_mut(key) {
            Some(entry) if entry.pending_token() == Some(token) => {
                entry.pending = None;
                true
            }
            _ => false,
        };
        if settled {
            prune(&mut entries, key);
        }
        settled
    }

    /// Restore the snapshot captured by `token`, if it is still the pending one.
    ///
    /// If a newer mutation superseded it, or a refresh already replaced the
    /// value, this is a no-op: stale rollback data never clobbers newer state.
    pub fn rollback(&self, key: &CacheKey, token: SnapshotToken) -> RollbackOutcome {
        let restored = {
            let mut entries = self.write();
            match entries.get_mut(key) {
                Some(entry) if entry.pending_token() == Some(token) => {
                    if let Some(pending) = entry.pending.take() {
                        entry.value = pending.value;
                    }
                    prune(&mut entries, key);
                    true
                }
                _ => false,
            }
        };

        if restored {
            self.stats.rollback();
            debug!(key = %key, token = %token, "Rolled back optimistic patch");
            self.emit(CacheEvent::RolledBack {
                key: key.clone(),
                token,
            });
            RollbackOutcome::Restored
        } else {
            debug!(key = %key, token = %token, "Rollback skipped, snapshot superseded");
            RollbackOutcome::Superseded
        }
    }

    // ------------------------------------------------------------------------
    // Invalidation and the read path
    // ------------------------------------------------------------------------

    /// Mark `key` stale so the next read refetches.
    ///
    /// The value is left untouched until the refetch completes. Reads already
    /// in flight are cancelled: their results predate the invalidation.
    /// Returns false if nothing is cached under `key`.
    pub fn invalidate(&self, key: &CacheKey) -> bool {
        let found = {
            let mut entries = self.write();
            match entries.get_mut(key) {
                Some(entry) => {
                    mark_stale(entry);
                    true
                }
                None => false,
            }
        };
        if found {
            trace!(key = %key, "Invalidated");
            self.emit(CacheEvent::Invalidated { key: key.clone() });
        }
        found
    }

    /// Invalidate every entry whose key starts with `prefix`.
    ///
    /// Returns the number of entries invalidated.
    pub fn invalidate_matching(&self, prefix: &CacheKey) -> u64 {
        let keys: Vec<CacheKey> = {
            let mut entries = self.write();
            entries
                .iter_mut()
                .filter(|(key, _)| prefix.is_prefix_of(key))
                .map(|(key, entry)| {
                    mark_stale(entry);
                    key.clone()
                })
                .collect()
        };
        for key in &keys {
            self.emit(CacheEvent::Invalidated { key: key.clone() });
        }
        keys.len() as u64
    }

    /// Suppress the result of every read currently in flight for `key`.
    ///
    /// Advisory only: the requests keep running, their results are discarded
    /// by [`complete_read`](Self::complete_read).
    pub fn cancel_reads(&self, key: &CacheKey) {
        if let Some(entry) = self.write().get_mut(key) {
            entry.read_epoch += 1;
        }
    }

    /// Register a read that is about to suspend on a fetch.
    ///
    /// Every ticket must be handed back through
    /// [`complete_read`](Self::complete_read) or
    /// [`abandon_read`](Self::abandon_read); until then the entry is kept
    /// even if it holds no value.
    pub fn begin_read(&self, key: &CacheKey) -> ReadTicket {
        let mut entries = self.write();
        let entry = entries.entry(key.clone()).or_default();
        entry.readers += 1;
        ReadTicket {
            key: key.clone(),
            epoch: entry.read_epoch,
        }
    }

    /// Store a fetched value unless its read was cancelled in the meantime.
    ///
    /// A result is also discarded while a mutation holds the pending snapshot:
    /// storing it would drop the optimistic patch and the snapshot with it.
    pub fn complete_read(&self, ticket: ReadTicket, value: Value) -> ReadCompletion {
        let outcome = {
            let mut entries = self.write();
            let entry = entries.entry(ticket.key.clone()).or_default();
            entry.readers = entry.readers.saturating_sub(1);
            if entry.read_epoch != ticket.epoch || entry.pending.is_some() {
                prune(&mut entries, &ticket.key);
                None
            } else {
                Some(store(entry, value))
            }
        };

        match outcome {
            Some((version, changed, fetched_at)) => {
                trace!(key = %ticket.key, version, changed, "Stored fetched value");
                self.emit(CacheEvent::Updated {
                    key: ticket.key,
                    version,
                    changed,
                });
                ReadCompletion::Stored {
                    version,
                    fetched_at,
                }
            }
            None => {
                self.stats.discarded();
                debug!(key = %ticket.key, "Discarded superseded read");
                ReadCompletion::Discarded
            }
        }
    }

    /// Hand back the ticket of a read whose fetch failed or was dropped.
    pub fn abandon_read(&self, ticket: ReadTicket) {
        let mut entries = self.write();
        if let Some(entry) = entries.get_mut(&ticket.key) {
            entry.readers = entry.readers.saturating_sub(1);
            prune(&mut entries, &ticket.key);
        }
    }

    pub(crate) fn counters(&self) -> &StatsCounters {
        &self.stats
    }

    // ------------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------------

    fn install<P>(&self, entry: &mut CacheEntry, patch: P) -> SnapshotToken
    where
        P: FnOnce(Option<Value>) -> Option<Value>,
    {
        let token = SnapshotToken::new(self.next_token.fetch_add(1, Ordering::Relaxed) + 1);
        let snapshot = entry.value.take();
        entry.value = patch(snapshot.clone());
        entry.pending = Some(PendingSnapshot {
            token,
            value: snapshot,
        });
        token
    }

    fn emit(&self, event: CacheEvent) {
        // No subscribers is not an error.
        let _ = self.events.send(event);
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<CacheKey, CacheEntry>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<CacheKey, CacheEntry>> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for EntityCache {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EntityCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityCache")
            .field("entries", &self.read().len())
            .field("subscribers", &self.events.receiver_count())
            .finish()
    }
}

fn store(entry: &mut CacheEntry, value: Value) -> (u64, bool, DateTime<Utc>) {
    let changed = entry.value.as_ref() != Some(&value);
    let fetched_at = Utc::now();
    entry.value = Some(value);
    entry.version += 1;
    entry.pending = None;
    entry.stale = false;
    entry.fetched_at = Some(fetched_at);
    (entry.version, changed, fetched_at)
}

/// Drop the entry for `key` if it is vacant. Entries that ever held a
/// server value are kept so their version stays monotonic.
fn prune(entries: &mut HashMap<CacheKey, CacheEntry>, key: &CacheKey) {
    if entries.get(key).is_some_and(CacheEntry::is_vacant) {
        entries.remove(key);
    }
}

fn mark_stale(entry: &mut CacheEntry) {
    entry.stale = true;
    entry.read_epoch += 1;
}
