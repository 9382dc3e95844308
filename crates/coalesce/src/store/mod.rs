//! Pluggable cache store capability
//!
//! The engine treats the store as an unbounded-until-cleared async mapping;
//! stores are free to layer TTL or eviction on top.

mod memory;

pub use memory::MemoryStore;

use crate::error::LoaderResult;
use async_trait::async_trait;
use serde_json::Value;

/// Asynchronous key/value mapping backing a loader's memoization.
///
/// May be process-local or remote; every access is awaited. `keys` returns a
/// snapshot so an invalidation sweep can delete after a full pass instead of
/// mutating a live iterator.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> LoaderResult<Option<Value>>;

    async fn set(&self, key: &str, value: Value) -> LoaderResult<()>;

    /// Remove one entry; reports whether it was present.
    async fn delete(&self, key: &str) -> LoaderResult<bool>;

    /// Drop every entry, regardless of owning collection.
    async fn clear(&self) -> LoaderResult<()>;

    /// Snapshot of the current key set.
    async fn keys(&self) -> LoaderResult<Vec<String>>;

    async fn len(&self) -> LoaderResult<usize> {
        Ok(self.keys().await?.len())
    }

    async fn is_empty(&self) -> LoaderResult<bool> {
        Ok(self.len().await? == 0)
    }
}
