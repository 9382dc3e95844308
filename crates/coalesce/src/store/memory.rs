//! In-memory cache store

use crate::error::LoaderResult;
use crate::store::CacheStore;
use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;

/// Process-local store over a concurrent map. The default backing for a
/// loader that was not handed a shared store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: DashMap<String, Value>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn get(&self, key: &str) -> LoaderResult<Option<Value>> {
        Ok(self.entries.get(key).map(|entry| entry.value().clone()))
    }

    async fn set(&self, key: &str, value: Value) -> LoaderResult<()> {
        self.entries.insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> LoaderResult<bool> {
        Ok(self.entries.remove(key).is_some())
    }

    async fn clear(&self) -> LoaderResult<()> {
        self.entries.clear();
        Ok(())
    }

    async fn keys(&self) -> LoaderResult<Vec<String>> {
        Ok(self.entries.iter().map(|entry| entry.key().clone()).collect())
    }

    async fn len(&self) -> LoaderResult<usize> {
        Ok(self.entries.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn basic_operations() {
        let store = MemoryStore::new();

        store.set("a", json!({"id": 1})).await.unwrap();
        assert_eq!(store.get("a").await.unwrap(), Some(json!({"id": 1})));
        assert_eq!(store.get("missing").await.unwrap(), None);
        assert_eq!(store.len().await.unwrap(), 1);

        assert!(store.delete("a").await.unwrap());
        assert!(!store.delete("a").await.unwrap());
        assert!(store.is_empty().await.unwrap());
    }

    #[tokio::test]
    async fn keys_returns_a_snapshot() {
        let store = MemoryStore::new();
        store.set("a", json!(1)).await.unwrap();
        store.set("b", json!(2)).await.unwrap();

        let mut keys = store.keys().await.unwrap();
        keys.sort();
        assert_eq!(keys, vec!["a".to_string(), "b".to_string()]);

        store.clear().await.unwrap();
        assert!(store.keys().await.unwrap().is_empty());
    }
}
