//! Change notifications for the rendering layer.

use super::entry::SnapshotToken;
use super::key::CacheKey;

/// Something observable happened to a cache entry.
///
/// Renderers re-render on `Updated { changed: true }`, `Patched` and
/// `RolledBack`, and start a refetch on `Invalidated`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheEvent {
    /// A server value was stored. `changed` is false when it equals the
    /// value already shown, so renderers can skip the redraw.
    Updated {
        key: CacheKey,
        version: u64,
        changed: bool,
    },
    /// A speculative patch was installed.
    Patched { key: CacheKey, token: SnapshotToken },
    /// A speculative patch was undone.
    RolledBack { key: CacheKey, token: SnapshotToken },
    /// The entry is stale and should be refetched.
    Invalidated { key: CacheKey },
}

impl CacheEvent {
    pub fn key(&self) -> &CacheKey {
        match self {
            Self::Updated { key, .. }
            | Self::Patched { key, .. }
            | Self::RolledBack { key, .. }
            | Self::Invalidated { key } => key,
        }
    }
}
