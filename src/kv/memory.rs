// src/kv/memory.rs

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;

use crate::errors::Result;
use crate::kv::KvStore;

/// Concurrent in-memory store. Clones share the same map.
#[derive(Debug, Clone, Default)]
pub struct MemoryKvStore {
    data: Arc<DashMap<String, Value>>,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

#[async_trait]
impl KvStore for MemoryKvStore {
    async fn put(&self, key: &str, value: Value) -> Result<()> {
        self.data.insert(key.to_string(), value);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.data.get(key).map(|entry| entry.value().clone()))
    }

    async fn all(&self) -> Result<HashMap<String, Value>> {
        Ok(self
            .data
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn last_write_wins_per_key() {
        let store = MemoryKvStore::new();
        store.put("a", json!({"status": "RUNNING"})).await.unwrap();
        store.put("a", json!({"status": "COMPLETE"})).await.unwrap();
        store.put("b", json!(1)).await.unwrap();

        assert_eq!(store.get("a").await.unwrap(), Some(json!({"status": "COMPLETE"})));
        assert_eq!(store.get("missing").await.unwrap(), None);
        assert_eq!(store.all().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn concurrent_writers_do_not_lose_keys() {
        let store = MemoryKvStore::new();
        let mut handles = Vec::new();
        for i in 0..16 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.put(&format!("k{i}"), json!(i)).await.unwrap();
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(store.len(), 16);
    }
}
