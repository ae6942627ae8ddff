//! Application state shared across handlers.

use std::sync::Arc;

use crate::config::MarketplaceConfig;
use crate::db::MarketplaceStore;
use crate::services::catalog::{CatalogCache, CatalogService};
use crate::services::media::MediaSigner;
use crate::services::orders::OrderService;

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc` and provides access to
/// shared resources like the store and configuration.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: MarketplaceConfig,
    store: Arc<dyn MarketplaceStore>,
    catalog_cache: CatalogCache,
    media: Option<MediaSigner>,
}

impl AppState {
    /// Create a new application state.
    ///
    /// # Arguments
    ///
    /// * `config` - Marketplace configuration
    /// * `store` - Storage backend (`PostgreSQL` or in-memory)
    #[must_use]
    pub fn new(config: MarketplaceConfig, store: Arc<dyn MarketplaceStore>) -> Self {
        let catalog_cache = CatalogCache::new(config.catalog_cache_ttl);
        let media = config.media.clone().map(MediaSigner::new);

        Self {
            inner: Arc::new(AppStateInner {
                config,
                store,
                catalog_cache,
                media,
            }),
        }
    }

    /// Get a reference to the marketplace configuration.
    #[must_use]
    pub fn config(&self) -> &MarketplaceConfig {
        &self.inner.config
    }

    /// Get a reference to the storage backend.
    #[must_use]
    pub fn store(&self) -> &dyn MarketplaceStore {
        self.inner.store.as_ref()
    }

    #[must_use]
    pub fn catalog_cache(&self) -> &CatalogCache {
        &self.inner.catalog_cache
    }

    /// Catalog reads through the cache.
    #[must_use]
    pub fn catalog(&self) -> CatalogService<'_> {
        CatalogService::new(self.store(), self.catalog_cache())
    }

    /// Cart and order operations.
    #[must_use]
    pub fn orders(&self) -> OrderService<'_> {
        OrderService::new(self.store(), self.catalog_cache())
    }

    /// Upload signer, if media credentials are configured.
    #[must_use]
    pub fn media(&self) -> Option<&MediaSigner> {
        self.inner.media.as_ref()
    }
}
