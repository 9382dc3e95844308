//! Batch group lifecycle
//!
//! One batch group exists per request shape — `(lookup key, multiplicity,
//! method, params fingerprint)` — for the life of the owning loader. Groups
//! are created lazily and torn down by [`crate::ServiceLoader::clear`].

use crate::error::{LoaderError, LoaderResult};
use crate::params::Params;
use crate::request::RequestKind;
use crate::results::{envelope_rows, unique_keys, unique_results, unique_results_multi, value_key};
use crate::service::{CollectionService, ServiceCall};
use async_trait::async_trait;
use coalesce_batch::{BatchFetcher, BatchOptions, Batcher};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Batch function for one request shape: issues a single bulk read with the
/// lookup key `$in` the pending ids and demultiplexes the rows back to them.
pub(crate) struct BulkFetcher {
    service: Arc<dyn CollectionService>,
    key: String,
    multi: bool,
    raw: bool,
    params: Option<Params>,
}

#[async_trait]
impl BatchFetcher for BulkFetcher {
    type Key = Value;
    type Value = Value;
    type Error = LoaderError;

    fn cache_key(&self, key: &Value) -> String {
        value_key(key)
    }

    async fn fetch(&self, keys: &[Value]) -> LoaderResult<Vec<Value>> {
        let mut params = self.params.clone().unwrap_or_default();
        params.paginate = Some(false);

        let mut query = params.query.take().unwrap_or_default();
        // Caller-supplied page size would truncate the bulk read; strip it and
        // nothing else.
        query.remove("$limit");
        query.insert(self.key.clone(), json!({ "$in": unique_keys(keys) }));
        params.query = Some(query);

        let result = if self.raw {
            self.service.find_raw(&params).await?
        } else {
            self.service.find(&params).await?
        };
        let rows = envelope_rows(&result);

        Ok(if self.multi {
            unique_results_multi(keys, &rows, &self.key)
        } else {
            unique_results(keys, &rows, &self.key)
        })
    }
}

/// Registry of batch groups keyed by canonicalized request shape.
pub(crate) struct BatchGroupRegistry {
    groups: Mutex<HashMap<String, Arc<Batcher<BulkFetcher>>>>,
    options: BatchOptions,
}

impl BatchGroupRegistry {
    pub(crate) fn new(options: BatchOptions) -> Self {
        Self {
            groups: Mutex::new(HashMap::new()),
            options,
        }
    }

    /// Get the group for a shape, creating it on first use. The backend must
    /// expose the bulk-read variant being batched; that is checked here, at
    /// group-creation time, not per request.
    pub(crate) fn get_or_create(
        &self,
        shape_key: &str,
        service: &Arc<dyn CollectionService>,
        kind: RequestKind,
        key: &str,
        multi: bool,
        params: Option<&Params>,
    ) -> LoaderResult<Arc<Batcher<BulkFetcher>>> {
        let mut groups = self.groups.lock();
        if let Some(group) = groups.get(shape_key) {
            return Ok(Arc::clone(group));
        }

        let (call, name, raw) = match kind {
            RequestKind::Load => (ServiceCall::Find, "find", false),
            RequestKind::LoadRaw => (ServiceCall::FindRaw, "find-raw", true),
            other => {
                return Err(LoaderError::Configuration(format!(
                    "request kind {:?} is not batched",
                    other
                )))
            }
        };
        if !service.provides(call) {
            return Err(LoaderError::Capability(format!(
                "cannot create a batch group for a service that does not have a {} method",
                name
            )));
        }

        debug!(shape = shape_key, "creating batch group");
        let fetcher = BulkFetcher {
            service: Arc::clone(service),
            key: key.to_string(),
            multi,
            raw,
            params: params.cloned(),
        };
        let group = Arc::new(Batcher::with_options(fetcher, self.options.clone()));
        groups.insert(shape_key.to_string(), Arc::clone(&group));
        Ok(group)
    }

    pub(crate) fn len(&self) -> usize {
        self.groups.lock().len()
    }

    pub(crate) fn clear(&self) {
        self.groups.lock().clear();
    }
}
