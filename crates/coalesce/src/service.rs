//! The backend collection-service capability consumed by the engine

use crate::error::LoaderResult;
use crate::params::Params;
use async_trait::async_trait;
use serde_json::Value;

/// The read methods a backend may expose. Raw variants bypass whatever hook
/// pipeline the backend runs around the regular ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceCall {
    Get,
    GetRaw,
    Find,
    FindRaw,
}

/// A collection-oriented backend: `get(id)` / `find(query)` style reads over
/// records addressed by a primary key.
///
/// Find results may be a bare array or a `{"data": [...]}` envelope; the
/// engine accepts both transparently. Backends must honor `paginate: false`
/// and a `{field: {"$in": [...]}}` query filter, which is all the engine needs
/// to turn many single-key lookups into one bulk read.
#[async_trait]
pub trait CollectionService: Send + Sync {
    /// Name of the primary-key field.
    fn id_field(&self) -> &str {
        "id"
    }

    /// Capability discovery. Batch groups require the bulk-read method for
    /// the variant being batched and check this before the group is created.
    fn provides(&self, _call: ServiceCall) -> bool {
        true
    }

    async fn get(&self, id: &Value, params: &Params) -> LoaderResult<Value>;

    async fn find(&self, params: &Params) -> LoaderResult<Value>;

    /// Unhooked `get`; defaults to the hooked variant.
    async fn get_raw(&self, id: &Value, params: &Params) -> LoaderResult<Value> {
        self.get(id, params).await
    }

    /// Unhooked `find`; defaults to the hooked variant.
    async fn find_raw(&self, params: &Params) -> LoaderResult<Value> {
        self.find(params).await
    }
}
