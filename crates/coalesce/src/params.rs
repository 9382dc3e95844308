//! Backend call parameters and the cache-relevant subset used for keying

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;

/// Parameters passed along with a backend service call.
///
/// `query` carries the backend's filter object (`{field: {"$in": [...]}}` and
/// friends). `extra` absorbs any transport- or hook-specific fields that have
/// no business in a cache key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Params {
    /// Transport provider (rest, socketio, ...)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,

    /// Authentication information
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authentication: Option<Value>,

    /// Authenticated user
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<Value>,

    /// Query filter
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query: Option<Map<String, Value>>,

    /// When `Some(false)` the backend must return all matches unpaginated
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paginate: Option<bool>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    /// Params carrying only a query filter.
    pub fn with_query(query: Map<String, Value>) -> Self {
        Self {
            query: Some(query),
            ..Self::default()
        }
    }
}

/// Pluggable extractor producing the cache-relevant view of [`Params`].
///
/// The output feeds straight into cache-key serialization, so implementations
/// must only emit values that are safe to use as cache discriminators.
pub type CacheParamsFn = Arc<dyn Fn(Option<&Params>) -> Option<Value> + Send + Sync>;

/// Default extractor: keeps provider, authentication, user and query, and
/// drops everything else.
pub fn default_cache_params(params: Option<&Params>) -> Option<Value> {
    params.map(|params| {
        let mut out = Map::new();
        if let Some(provider) = &params.provider {
            out.insert("provider".to_string(), Value::String(provider.clone()));
        }
        if let Some(authentication) = &params.authentication {
            out.insert("authentication".to_string(), authentication.clone());
        }
        if let Some(user) = &params.user {
            out.insert("user".to_string(), user.clone());
        }
        if let Some(query) = &params.query {
            out.insert("query".to_string(), Value::Object(query.clone()));
        }
        Value::Object(out)
    })
}

pub fn default_cache_params_fn() -> CacheParamsFn {
    Arc::new(default_cache_params)
}
