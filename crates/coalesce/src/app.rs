//! Top-level registry owning one loader per backend collection

use crate::error::{LoaderError, LoaderResult};
use crate::loader::{ServiceLoader, ServiceLoaderOptions};
use crate::params::CacheParamsFn;
use crate::service::CollectionService;
use crate::store::CacheStore;
use coalesce_batch::BatchOptions;
use dashmap::DashMap;
use futures::future::try_join_all;
use std::collections::HashMap;
use std::sync::Arc;

/// Per-collection overrides applied when its loader is created.
#[derive(Default)]
pub struct ServiceConfig {
    pub cache: Option<Arc<dyn CacheStore>>,
    pub cache_params_fn: Option<CacheParamsFn>,
    pub batch: Option<BatchOptions>,
}

/// Builder for an [`AppLoader`].
#[derive(Default)]
pub struct AppLoaderBuilder {
    services: HashMap<String, Arc<dyn CollectionService>>,
    configs: HashMap<String, ServiceConfig>,
    cache: Option<Arc<dyn CacheStore>>,
    cache_params_fn: Option<CacheParamsFn>,
    batch: Option<BatchOptions>,
}

impl AppLoaderBuilder {
    /// Register a backend collection under a name.
    pub fn register(
        mut self,
        name: impl Into<String>,
        service: Arc<dyn CollectionService>,
    ) -> Self {
        self.services.insert(name.into(), service);
        self
    }

    /// Override loader options for one collection.
    pub fn configure(mut self, name: impl Into<String>, config: ServiceConfig) -> Self {
        self.configs.insert(name.into(), config);
        self
    }

    /// Cache store shared by every loader that has no per-collection store.
    /// Entries are collection-tagged, so scoped invalidation keeps working.
    pub fn cache(mut self, store: Arc<dyn CacheStore>) -> Self {
        self.cache = Some(store);
        self
    }

    /// Default cache-relevant params extractor for every loader.
    pub fn cache_params_fn(mut self, cache_params_fn: CacheParamsFn) -> Self {
        self.cache_params_fn = Some(cache_params_fn);
        self
    }

    /// Default batch tuning for every loader.
    pub fn batch(mut self, options: BatchOptions) -> Self {
        self.batch = Some(options);
        self
    }

    pub fn build(self) -> AppLoader {
        AppLoader {
            inner: Arc::new(AppInner {
                services: self.services,
                configs: self.configs,
                cache: self.cache,
                cache_params_fn: self.cache_params_fn,
                batch: self.batch.unwrap_or_default(),
                loaders: DashMap::new(),
            }),
        }
    }
}

struct AppInner {
    services: HashMap<String, Arc<dyn CollectionService>>,
    configs: HashMap<String, ServiceConfig>,
    cache: Option<Arc<dyn CacheStore>>,
    cache_params_fn: Option<CacheParamsFn>,
    batch: BatchOptions,
    loaders: DashMap<String, ServiceLoader>,
}

/// Registry handing out one [`ServiceLoader`] per registered collection,
/// created on first use and reused afterwards.
#[derive(Clone)]
pub struct AppLoader {
    inner: Arc<AppInner>,
}

impl AppLoader {
    pub fn builder() -> AppLoaderBuilder {
        AppLoaderBuilder::default()
    }

    /// The loader for a registered collection, creating it on first use.
    pub fn service(&self, name: &str) -> LoaderResult<ServiceLoader> {
        if let Some(loader) = self.inner.loaders.get(name) {
            return Ok(loader.clone());
        }

        let service = self.inner.services.get(name).ok_or_else(|| {
            LoaderError::Configuration(format!("no service registered under '{}'", name))
        })?;
        let config = self.inner.configs.get(name);
        let options = ServiceLoaderOptions {
            cache: config
                .and_then(|config| config.cache.clone())
                .or_else(|| self.inner.cache.clone()),
            cache_params_fn: config
                .and_then(|config| config.cache_params_fn.clone())
                .or_else(|| self.inner.cache_params_fn.clone()),
            batch: config
                .and_then(|config| config.batch.clone())
                .unwrap_or_else(|| self.inner.batch.clone()),
        };
        let loader = ServiceLoader::with_options(name, Arc::clone(service), options);

        Ok(self
            .inner
            .loaders
            .entry(name.to_string())
            .or_insert(loader)
            .clone())
    }

    /// Fan out [`ServiceLoader::clear`] to every live loader, then drop them.
    pub async fn clear(&self) -> LoaderResult<()> {
        let loaders: Vec<ServiceLoader> = self
            .inner
            .loaders
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        try_join_all(loaders.iter().map(|loader| loader.clear())).await?;
        self.inner.loaders.clear();
        Ok(())
    }
}
