//! Per-collection loader: the single execution path for every request

use crate::builder::QueryBuilder;
use crate::error::LoaderResult;
use crate::groups::BatchGroupRegistry;
use crate::keys;
use crate::params::{default_cache_params_fn, CacheParamsFn, Params};
use crate::request::{canonical_ids, LoaderRequest, RequestKind};
use crate::service::CollectionService;
use crate::store::{CacheStore, MemoryStore};
use coalesce_batch::BatchOptions;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::{try_join_all, BoxFuture, FutureExt, Shared};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, trace};

/// Options for constructing a [`ServiceLoader`].
#[derive(Default)]
pub struct ServiceLoaderOptions {
    /// Cache store; a loader gets a private [`MemoryStore`] when this is
    /// `None`. A store shared across loaders works because every entry is
    /// tagged with its owning collection.
    pub cache: Option<Arc<dyn CacheStore>>,
    /// Cache-relevant params extractor; defaults to
    /// [`crate::params::default_cache_params`].
    pub cache_params_fn: Option<CacheParamsFn>,
    /// Tuning for the batch groups this loader creates.
    pub batch: BatchOptions,
}

type SharedExec = Shared<BoxFuture<'static, LoaderResult<Value>>>;

struct LoaderInner {
    name: String,
    service: Arc<dyn CollectionService>,
    id_field: String,
    cache: Arc<dyn CacheStore>,
    cache_params_fn: CacheParamsFn,
    groups: BatchGroupRegistry,
    /// Requests currently resolving, keyed by cache key. A second identical
    /// request issued before the first settles joins the same shared future
    /// instead of reaching the backend again.
    inflight: DashMap<String, SharedExec>,
}

/// Loader for a single backend collection that batches and memoizes requests.
///
/// Cloning is cheap and clones share all state, so a loader can be handed
/// around freely (request contexts, resolvers).
#[derive(Clone)]
pub struct ServiceLoader {
    inner: Arc<LoaderInner>,
}

impl std::fmt::Debug for ServiceLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceLoader")
            .field("name", &self.inner.name)
            .finish_non_exhaustive()
    }
}

impl ServiceLoader {
    pub fn new(name: impl Into<String>, service: Arc<dyn CollectionService>) -> Self {
        Self::with_options(name, service, ServiceLoaderOptions::default())
    }

    pub fn with_options(
        name: impl Into<String>,
        service: Arc<dyn CollectionService>,
        options: ServiceLoaderOptions,
    ) -> Self {
        let id_field = service.id_field().to_string();
        Self {
            inner: Arc::new(LoaderInner {
                name: name.into(),
                id_field,
                cache: options
                    .cache
                    .unwrap_or_else(|| Arc::new(MemoryStore::new())),
                cache_params_fn: options
                    .cache_params_fn
                    .unwrap_or_else(default_cache_params_fn),
                groups: BatchGroupRegistry::new(options.batch),
                inflight: DashMap::new(),
                service,
            }),
        }
    }

    pub fn service_name(&self) -> &str {
        &self.inner.name
    }

    pub fn id_field(&self) -> &str {
        &self.inner.id_field
    }

    pub fn cache(&self) -> &Arc<dyn CacheStore> {
        &self.inner.cache
    }

    /// Number of live batch groups; zero after [`clear`](Self::clear).
    pub fn group_count(&self) -> usize {
        self.inner.groups.len()
    }

    // Fluent configuration; each call starts a builder carrying the override.

    /// Look records up by a field other than the primary key.
    pub fn key(&self, name: impl Into<String>) -> QueryBuilder {
        QueryBuilder::new(self.clone()).key(name)
    }

    /// Look records up by a field that matches many records per id.
    pub fn multi(&self, name: impl Into<String>) -> QueryBuilder {
        QueryBuilder::new(self.clone()).multi(name)
    }

    /// Trim results to a field subset after fetching.
    pub fn select<I, S>(&self, fields: I) -> QueryBuilder
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        QueryBuilder::new(self.clone()).select(fields)
    }

    /// Override the cache-relevant params extractor for subsequent calls.
    pub fn params(&self, cache_params_fn: CacheParamsFn) -> QueryBuilder {
        QueryBuilder::new(self.clone()).params(cache_params_fn)
    }

    // Terminal methods with default configuration.

    pub async fn get<I: Serialize>(&self, id: I, params: Option<Params>) -> LoaderResult<Value> {
        QueryBuilder::new(self.clone()).get(id, params).await
    }

    pub async fn get_raw<I: Serialize>(
        &self,
        id: I,
        params: Option<Params>,
    ) -> LoaderResult<Value> {
        QueryBuilder::new(self.clone()).get_raw(id, params).await
    }

    pub async fn find(&self, params: Option<Params>) -> LoaderResult<Value> {
        QueryBuilder::new(self.clone()).find(params).await
    }

    pub async fn find_raw(&self, params: Option<Params>) -> LoaderResult<Value> {
        QueryBuilder::new(self.clone()).find_raw(params).await
    }

    pub async fn load<I: Serialize>(&self, id: I, params: Option<Params>) -> LoaderResult<Value> {
        QueryBuilder::new(self.clone()).load(id, params).await
    }

    pub async fn load_raw<I: Serialize>(
        &self,
        id: I,
        params: Option<Params>,
    ) -> LoaderResult<Value> {
        QueryBuilder::new(self.clone()).load_raw(id, params).await
    }

    /// The canonical cache key a request resolves under.
    pub fn cache_key(&self, request: &LoaderRequest) -> LoaderResult<String> {
        let (lookup_key, id, cache_params) = self.normalize(request)?;
        keys::cache_key(
            &self.inner.name,
            &id,
            &lookup_key,
            request.multi,
            request.kind,
            &cache_params,
        )
    }

    /// Resolve a normalized request against cache, in-flight requests and
    /// batch groups.
    pub async fn exec(&self, request: LoaderRequest) -> LoaderResult<Value> {
        let (lookup_key, id, cache_params) = self.normalize(&request)?;
        let cache_key = keys::cache_key(
            &self.inner.name,
            &id,
            &lookup_key,
            request.multi,
            request.kind,
            &cache_params,
        )?;

        if let Some(cached) = self.inner.cache.get(&cache_key).await? {
            trace!(key = %cache_key, "cache hit");
            return Ok(cached);
        }
        trace!(key = %cache_key, "cache miss");

        let shared = match self.inner.inflight.entry(cache_key.clone()) {
            Entry::Occupied(entry) => entry.get().clone(),
            Entry::Vacant(entry) => {
                let fut = resolve(
                    Arc::clone(&self.inner),
                    cache_key,
                    request.kind,
                    id,
                    lookup_key,
                    request.multi,
                    request.params,
                    cache_params,
                )
                .boxed()
                .shared();
                entry.insert(fut.clone());
                fut
            }
        };
        shared.await
    }

    /// Drop all batch groups, then sweep this collection's entries out of the
    /// cache store. Entries tagged with other collections are left alone, so
    /// a shared store survives intact. Batches already dispatched complete
    /// normally; their eventual cache write is simply a fresh entry.
    pub async fn clear(&self) -> LoaderResult<()> {
        self.inner.groups.clear();

        // Full snapshot pass first, deletions after.
        let keys = self.inner.cache.keys().await?;
        let mine: Vec<String> = keys
            .into_iter()
            .filter(|key| keys::service_tag(key).as_deref() == Some(self.inner.name.as_str()))
            .collect();
        debug!(
            service = %self.inner.name,
            entries = mine.len(),
            "invalidation sweep"
        );
        try_join_all(mine.iter().map(|key| self.inner.cache.delete(key))).await?;
        Ok(())
    }

    /// Fill defaulted fields and canonicalize the id.
    fn normalize(
        &self,
        request: &LoaderRequest,
    ) -> LoaderResult<(String, Value, Option<Value>)> {
        let lookup_key = request
            .key
            .clone()
            .unwrap_or_else(|| self.inner.id_field.clone());
        let id = if request.kind.is_batched() {
            canonical_ids(&request.id)
        } else {
            request.id.clone()
        };
        let extractor = request
            .cache_params_fn
            .as_ref()
            .unwrap_or(&self.inner.cache_params_fn);
        let cache_params = extractor(request.params.as_ref());
        Ok((lookup_key, id, cache_params))
    }
}

/// The miss path: call the backend (directly or through a batch group), write
/// the cache on success, then release the in-flight slot.
#[allow(clippy::too_many_arguments)]
async fn resolve(
    inner: Arc<LoaderInner>,
    cache_key: String,
    kind: RequestKind,
    id: Value,
    lookup_key: String,
    multi: bool,
    params: Option<Params>,
    cache_params: Option<Value>,
) -> LoaderResult<Value> {
    let fetched = fetch(&inner, kind, &id, &lookup_key, multi, &params, &cache_params).await;

    let value = match fetched {
        Ok(value) => value,
        Err(err) => {
            // Nothing is cached on failure; the next identical request
            // retries the backend instead of replaying the error.
            inner.inflight.remove(&cache_key);
            return Err(err);
        }
    };

    let stored = inner.cache.set(&cache_key, value.clone()).await;
    inner.inflight.remove(&cache_key);
    stored?;
    Ok(value)
}

async fn fetch(
    inner: &Arc<LoaderInner>,
    kind: RequestKind,
    id: &Value,
    lookup_key: &str,
    multi: bool,
    params: &Option<Params>,
    cache_params: &Option<Value>,
) -> LoaderResult<Value> {
    let default_params = Params::default();
    let call_params = params.as_ref().unwrap_or(&default_params);

    match kind {
        RequestKind::Get => inner.service.get(id, call_params).await,
        RequestKind::GetRaw => inner.service.get_raw(id, call_params).await,
        RequestKind::Find => inner.service.find(call_params).await,
        RequestKind::FindRaw => inner.service.find_raw(call_params).await,
        RequestKind::Load | RequestKind::LoadRaw => {
            let shape = keys::shape_key(lookup_key, multi, kind, cache_params)?;
            let group = inner.groups.get_or_create(
                &shape,
                &inner.service,
                kind,
                lookup_key,
                multi,
                params.as_ref(),
            )?;
            match id {
                Value::Array(ids) => Ok(Value::Array(group.load_many(ids.clone()).await?)),
                id => Ok(group.load(id.clone()).await?),
            }
        }
    }
}
