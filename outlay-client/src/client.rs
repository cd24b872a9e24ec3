//! Client session wiring.

use crate::api_client::RestClient;
use crate::config::ClientConfig;
use crate::error::ClientResult;
use crate::expenses::ExpenseService;
use crate::upload::{UploadProtocol, UploadSettings};
use outlay_core::{Fetcher, ObjectStore};
use outlay_sync::{
    CacheConfig, CacheEvent, CacheStats, EntityCache, MutationCoordinator, ReadThroughCache,
};
use std::sync::Arc;
use tokio::sync::broadcast;

/// One client session.
///
/// Owns the session's [`EntityCache`]; the read path, the coordinator and the
/// services all share it. Dropping the client ends the session and its cache.
#[derive(Clone)]
pub struct ExpenseClient {
    cache: Arc<EntityCache>,
    reads: ReadThroughCache,
    coordinator: MutationCoordinator,
    expenses: ExpenseService,
    uploads: UploadProtocol,
}

impl ExpenseClient {
    /// Build a session talking HTTP to the configured API.
    pub fn connect(config: &ClientConfig) -> ClientResult<Self> {
        let rest = Arc::new(RestClient::new(config)?);
        let upload = UploadSettings {
            default_content_type: config.upload.default_content_type.clone(),
            max_file_bytes: config.upload.max_file_bytes,
        };
        Ok(Self::from_parts(
            rest.clone(),
            rest,
            config.cache_config(),
            upload,
        ))
    }

    /// Build a session over injected collaborators.
    pub fn from_parts(
        fetcher: Arc<dyn Fetcher>,
        store: Arc<dyn ObjectStore>,
        cache_config: CacheConfig,
        upload: UploadSettings,
    ) -> Self {
        let cache = Arc::new(cache_config.build_cache());
        let reads = ReadThroughCache::new(Arc::clone(&cache), cache_config);
        let coordinator = MutationCoordinator::new(Arc::clone(&cache));
        let expenses =
            ExpenseService::new(reads.clone(), coordinator.clone(), Arc::clone(&fetcher));
        let uploads = UploadProtocol::new(fetcher, store, coordinator.clone(), upload);
        Self {
            cache,
            reads,
            coordinator,
            expenses,
            uploads,
        }
    }

    pub fn expenses(&self) -> &ExpenseService {
        &self.expenses
    }

    pub fn uploads(&self) -> &UploadProtocol {
        &self.uploads
    }

    pub fn reads(&self) -> &ReadThroughCache {
        &self.reads
    }

    pub fn coordinator(&self) -> &MutationCoordinator {
        &self.coordinator
    }

    pub fn cache(&self) -> &Arc<EntityCache> {
        &self.cache
    }

    /// Change events for the rendering layer.
    pub fn subscribe(&self) -> broadcast::Receiver<CacheEvent> {
        self.cache.subscribe()
    }

    pub fn stats(&self) -> CacheStats {
        self.cache.stats()
    }
}
