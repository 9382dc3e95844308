//! Fluent query chain over a loader
//!
//! Configuration methods consume the builder and return an updated value, so
//! forking a chain means cloning it; no state is shared between branches.
//! Terminal methods borrow the builder, which makes a configured chain
//! reusable for any number of calls.

use crate::error::LoaderResult;
use crate::keys::to_value;
use crate::loader::ServiceLoader;
use crate::params::{CacheParamsFn, Params};
use crate::projection::project;
use crate::request::{LoaderRequest, RequestKind};
use serde::Serialize;
use serde_json::Value;

/// Accumulates lookup-key, multiplicity, projection and cache-params
/// overrides before a terminal call freezes them into a request.
#[derive(Clone)]
pub struct QueryBuilder {
    loader: ServiceLoader,
    key: Option<String>,
    multi: bool,
    select: Option<Vec<String>>,
    cache_params_fn: Option<CacheParamsFn>,
}

impl QueryBuilder {
    pub(crate) fn new(loader: ServiceLoader) -> Self {
        Self {
            loader,
            key: None,
            multi: false,
            select: None,
            cache_params_fn: None,
        }
    }

    /// Match ids against this field, expecting at most one record per id.
    pub fn key(mut self, name: impl Into<String>) -> Self {
        self.key = Some(name.into());
        self.multi = false;
        self
    }

    /// Match ids against this field, collecting every record per id.
    pub fn multi(mut self, name: impl Into<String>) -> Self {
        self.key = Some(name.into());
        self.multi = true;
        self
    }

    /// Trim results to these fields. The primary key and the active lookup
    /// key are always retained.
    pub fn select<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.select = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    /// Override the cache-relevant params extractor for this chain.
    pub fn params(mut self, cache_params_fn: CacheParamsFn) -> Self {
        self.cache_params_fn = Some(cache_params_fn);
        self
    }

    pub async fn get<I: Serialize>(&self, id: I, params: Option<Params>) -> LoaderResult<Value> {
        self.terminal(RequestKind::Get, to_value(id)?, params).await
    }

    pub async fn get_raw<I: Serialize>(
        &self,
        id: I,
        params: Option<Params>,
    ) -> LoaderResult<Value> {
        self.terminal(RequestKind::GetRaw, to_value(id)?, params).await
    }

    pub async fn find(&self, params: Option<Params>) -> LoaderResult<Value> {
        self.terminal(RequestKind::Find, Value::Null, params).await
    }

    pub async fn find_raw(&self, params: Option<Params>) -> LoaderResult<Value> {
        self.terminal(RequestKind::FindRaw, Value::Null, params).await
    }

    pub async fn load<I: Serialize>(&self, id: I, params: Option<Params>) -> LoaderResult<Value> {
        self.terminal(RequestKind::Load, to_value(id)?, params).await
    }

    pub async fn load_raw<I: Serialize>(
        &self,
        id: I,
        params: Option<Params>,
    ) -> LoaderResult<Value> {
        self.terminal(RequestKind::LoadRaw, to_value(id)?, params).await
    }

    /// Freeze the accumulated overrides into a request, execute it, and
    /// apply projection to what comes back.
    async fn terminal(
        &self,
        kind: RequestKind,
        id: Value,
        params: Option<Params>,
    ) -> LoaderResult<Value> {
        let request = LoaderRequest {
            id,
            key: self.key.clone(),
            multi: self.multi,
            kind,
            params,
            cache_params_fn: self.cache_params_fn.clone(),
        };
        let result = self.loader.exec(request).await?;
        Ok(match &self.select {
            Some(fields) => {
                let lookup_key = self.key.as_deref().unwrap_or_else(|| self.loader.id_field());
                project(fields, &result, self.loader.id_field(), lookup_key)
            }
            None => result,
        })
    }
}
