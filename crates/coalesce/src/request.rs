//! Normalized request form handed to the executor

use crate::params::{CacheParamsFn, Params};
use crate::service::ServiceCall;
use serde_json::Value;

/// The kind of read a request performs. Dispatch is an explicit match on this
/// tag; method names never travel as strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestKind {
    Get,
    GetRaw,
    Find,
    FindRaw,
    Load,
    LoadRaw,
}

impl RequestKind {
    /// Stable name used inside cache keys.
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestKind::Get => "get",
            RequestKind::GetRaw => "get-raw",
            RequestKind::Find => "find",
            RequestKind::FindRaw => "find-raw",
            RequestKind::Load => "load",
            RequestKind::LoadRaw => "load-raw",
        }
    }

    /// Load-style requests go through a batch group; the rest call the
    /// backend directly.
    pub fn is_batched(&self) -> bool {
        matches!(self, RequestKind::Load | RequestKind::LoadRaw)
    }

    /// The bulk-read method a batch group for this kind requires.
    pub fn bulk_call(&self) -> Option<ServiceCall> {
        match self {
            RequestKind::Load => Some(ServiceCall::Find),
            RequestKind::LoadRaw => Some(ServiceCall::FindRaw),
            _ => None,
        }
    }
}

/// The normalized form of any loader call.
#[derive(Clone)]
pub struct LoaderRequest {
    /// `Null` for get/find-style calls; a scalar or array of scalars for
    /// load-style calls.
    pub id: Value,
    /// Lookup key matched against backend records; `None` falls back to the
    /// service's primary key during normalization.
    pub key: Option<String>,
    /// Whether a lookup key yields one record or many per id.
    pub multi: bool,
    pub kind: RequestKind,
    pub params: Option<Params>,
    /// Per-request override of the cache-relevant params extractor.
    pub cache_params_fn: Option<CacheParamsFn>,
}

impl LoaderRequest {
    pub fn new(kind: RequestKind) -> Self {
        Self {
            id: Value::Null,
            key: None,
            multi: false,
            kind,
            params: None,
            cache_params_fn: None,
        }
    }
}

impl std::fmt::Debug for LoaderRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoaderRequest")
            .field("id", &self.id)
            .field("key", &self.key)
            .field("multi", &self.multi)
            .field("kind", &self.kind)
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

/// Sort a multi-id array into canonical order, comparing elements by their
/// string form. Id order does not matter to the bulk read, but it does matter
/// to the cache key, so `load([2, 1])` and `load([1, 2])` must collapse to the
/// same entry; results come back in this sorted order as well.
pub(crate) fn canonical_ids(id: &Value) -> Value {
    match id {
        Value::Array(ids) => {
            let mut sorted = ids.clone();
            sorted.sort_by_cached_key(|id| id.to_string());
            Value::Array(sorted)
        }
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn canonical_ids_sorts_arrays_by_string_form() {
        assert_eq!(canonical_ids(&json!([2, 1, 3])), json!([1, 2, 3]));
        assert_eq!(canonical_ids(&json!(["b", "a"])), json!(["a", "b"]));
        // Scalars pass through untouched.
        assert_eq!(canonical_ids(&json!(5)), json!(5));
        assert_eq!(canonical_ids(&Value::Null), Value::Null);
    }

    #[test]
    fn reversed_arrays_share_a_canonical_form() {
        assert_eq!(canonical_ids(&json!([3, 2, 1])), canonical_ids(&json!([1, 2, 3])));
    }
}
