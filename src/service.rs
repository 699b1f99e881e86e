//! Service facade tying configuration, providers and aggregation together.

use std::sync::{Arc, PoisonError, RwLock};

use anyhow::Result;
use serde_json::{Map, Value};
use tracing::info;

use crate::config::{Config, ConfigStore};
use crate::cookie::{CookieRotator, CookieStats};
use crate::http_client::AcceleratedClient;
use crate::stream::providers::builtin_catalog;
use crate::stream::{
    AggregationEngine, FetchContext, ProviderCatalog, ProviderRegistry, ProviderStatus,
    StreamCandidate,
};

/// Entry point for callers that want streams for a title.
///
/// The registry is rebuilt after every reload or successful patch, so
/// enable-flag changes take effect on the next fetch. A fetch already in
/// flight keeps the registry and config it started with.
pub struct StreamService {
    store: ConfigStore,
    catalog: ProviderCatalog,
    registry: RwLock<Arc<ProviderRegistry>>,
    engine: AggregationEngine,
}

impl StreamService {
    pub fn new(store: ConfigStore, catalog: ProviderCatalog) -> Self {
        Self::with_engine(store, catalog, AggregationEngine::new(Arc::new(CookieRotator::new())))
    }

    pub fn with_engine(store: ConfigStore, catalog: ProviderCatalog, engine: AggregationEngine) -> Self {
        let registry = ProviderRegistry::build(store.snapshot(), &catalog);
        info!(providers = catalog.len(), "Stream service ready");
        Self {
            store,
            catalog,
            registry: RwLock::new(Arc::new(registry)),
            engine,
        }
    }

    /// Service over the bundled providers.
    pub fn with_builtin_providers(store: ConfigStore) -> Result<Self> {
        let client = AcceleratedClient::new()?;
        Ok(Self::new(store, builtin_catalog(&client)))
    }

    /// Fetch candidates from every enabled provider.
    pub async fn fetch_streams(&self, ctx: &FetchContext) -> Vec<StreamCandidate> {
        let registry = self.registry();
        self.engine.fetch_all(ctx, &registry).await
    }

    /// Every known provider with its enable flag.
    pub fn providers(&self) -> Vec<ProviderStatus> {
        self.registry().list()
    }

    /// Persist `partial` into the override document and apply it.
    pub fn patch_config(&self, partial: &Map<String, Value>) -> bool {
        let ok = self.store.patch(partial);
        if ok {
            self.rebuild_registry();
        }
        ok
    }

    /// Re-read every configuration layer and apply the result.
    pub fn reload(&self) -> Arc<Config> {
        self.store.reload();
        Arc::clone(self.rebuild_registry().config())
    }

    pub fn config(&self) -> Arc<Config> {
        self.store.snapshot()
    }

    pub fn cookie_stats(&self) -> Option<CookieStats> {
        self.engine.cookie_stats()
    }

    pub fn store(&self) -> &ConfigStore {
        &self.store
    }

    fn registry(&self) -> Arc<ProviderRegistry> {
        Arc::clone(&self.registry.read().unwrap_or_else(PoisonError::into_inner))
    }

    fn rebuild_registry(&self) -> Arc<ProviderRegistry> {
        // Snapshot under the write lock so the newest config always wins.
        let mut slot = self.registry.write().unwrap_or_else(PoisonError::into_inner);
        let registry = Arc::new(ProviderRegistry::build(self.store.snapshot(), &self.catalog));
        *slot = Arc::clone(&registry);
        registry
    }
}

impl std::fmt::Debug for StreamService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamService")
            .field("store", &self.store)
            .field("catalog", &self.catalog)
            .finish_non_exhaustive()
    }
}
