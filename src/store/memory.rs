use async_trait::async_trait;
use dashmap::{mapref::entry::Entry, DashMap};
use serde_json::{Map, Value};
use std::time::Duration;
use strum::IntoEnumIterator;

use super::{Collection, DocumentStore, Modifier, StoreBackend, StoreError};

const COLLECTION_COUNT: usize = 5;

/// Process-local store. Each collection is a sharded concurrent map, so
/// `modify` holds only the shard lock of the key being rewritten.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    collections: [DashMap<String, Value>; COLLECTION_COUNT],
    latency: Duration,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every operation sleeps `latency` first, mimicking a remote database.
    pub fn with_latency(latency: Duration) -> Self {
        Self {
            latency,
            ..Self::default()
        }
    }

    fn collection(&self, collection: Collection) -> &DashMap<String, Value> {
        &self.collections[collection as usize]
    }

    async fn simulate_latency(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }

    /// Apply `modifier` under the key's shard lock. Returns the previous
    /// document alongside the stored one.
    pub(super) fn modify_now(
        &self,
        collection: Collection,
        id: &str,
        modifier: Modifier<'_>,
    ) -> Result<(Option<Value>, Value), StoreError> {
        match self.collection(collection).entry(id.to_string()) {
            Entry::Occupied(mut entry) => {
                let next = modifier(Some(entry.get().clone()))?;
                let previous = entry.insert(next.clone());
                Ok((Some(previous), next))
            }
            Entry::Vacant(entry) => {
                let next = modifier(None)?;
                entry.insert(next.clone());
                Ok((None, next))
            }
        }
    }

    pub(super) fn put_now(&self, collection: Collection, id: &str, document: Value) -> Option<Value> {
        self.collection(collection).insert(id.to_string(), document)
    }

    pub(super) fn delete_now(&self, collection: Collection, id: &str) -> Option<Value> {
        self.collection(collection)
            .remove(id)
            .map(|(_, document)| document)
    }

    /// Put `previous` back, but only if the key still holds `written`
    /// (`None` meaning absent). Returns false when a later write got there
    /// first and was left alone.
    pub(super) fn revert_now(
        &self,
        collection: Collection,
        id: &str,
        written: Option<&Value>,
        previous: Option<Value>,
    ) -> bool {
        match self.collection(collection).entry(id.to_string()) {
            Entry::Occupied(mut entry) => {
                if Some(entry.get()) != written {
                    return false;
                }
                match previous {
                    Some(document) => {
                        entry.insert(document);
                    }
                    None => {
                        entry.remove();
                    }
                }
            }
            Entry::Vacant(entry) => {
                if written.is_some() {
                    return false;
                }
                if let Some(document) = previous {
                    entry.insert(document);
                }
            }
        }
        true
    }

    /// Copy of a whole collection as a JSON object keyed by id.
    pub(super) fn snapshot(&self, collection: Collection) -> Map<String, Value> {
        self.collection(collection)
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    pub(super) fn load(&self, collection: Collection, documents: Map<String, Value>) {
        let target = self.collection(collection);
        for (id, document) in documents {
            target.insert(id, document);
        }
    }

    pub fn len(&self) -> usize {
        Collection::iter().map(|c| self.collection(c).len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl DocumentStore for InMemoryStore {
    async fn get(&self, collection: Collection, id: &str) -> Result<Option<Value>, StoreError> {
        self.simulate_latency().await;
        Ok(self
            .collection(collection)
            .get(id)
            .map(|entry| entry.value().clone()))
    }

    async fn put(
        &self,
        collection: Collection,
        id: &str,
        document: Value,
    ) -> Result<(), StoreError> {
        self.simulate_latency().await;
        self.put_now(collection, id, document);
        Ok(())
    }

    async fn delete(&self, collection: Collection, id: &str) -> Result<bool, StoreError> {
        self.simulate_latency().await;
        Ok(self.delete_now(collection, id).is_some())
    }

    async fn list(&self, collection: Collection) -> Result<Vec<Value>, StoreError> {
        self.simulate_latency().await;
        Ok(self
            .collection(collection)
            .iter()
            .map(|entry| entry.value().clone())
            .collect())
    }

    async fn modify<'a>(
        &self,
        collection: Collection,
        id: &str,
        modifier: Modifier<'a>,
    ) -> Result<Value, StoreError> {
        self.simulate_latency().await;
        self.modify_now(collection, id, modifier)
            .map(|(_, stored)| stored)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }

    fn backend(&self) -> StoreBackend {
        StoreBackend::InMemory
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;
    use std::sync::Arc;

    #[tokio::test]
    async fn put_get_delete() {
        let store = InMemoryStore::new();
        store
            .put(Collection::Products, "p1", json!({"id": "p1", "stock": 3}))
            .await
            .unwrap();

        let doc = store.get(Collection::Products, "p1").await.unwrap();
        assert_eq!(doc, Some(json!({"id": "p1", "stock": 3})));

        // collections are disjoint
        assert!(store.get(Collection::Orders, "p1").await.unwrap().is_none());

        assert!(store.delete(Collection::Products, "p1").await.unwrap());
        assert!(!store.delete(Collection::Products, "p1").await.unwrap());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn rejected_modify_leaves_document_untouched() {
        let store = InMemoryStore::new();
        store
            .put(Collection::Products, "p1", json!({"stock": 1}))
            .await
            .unwrap();

        let result = store
            .modify(
                Collection::Products,
                "p1",
                Box::new(|_| Err(StoreError::Rejected("no".into()))),
            )
            .await;
        assert_matches!(result, Err(StoreError::Rejected(_)));
        assert_eq!(
            store.get(Collection::Products, "p1").await.unwrap(),
            Some(json!({"stock": 1}))
        );
    }

    #[tokio::test]
    async fn concurrent_modify_does_not_lose_updates() {
        let store = Arc::new(InMemoryStore::new());
        store
            .put(Collection::Products, "p1", json!({"stock": 0}))
            .await
            .unwrap();

        let tasks = (0..50).map(|_| {
            let store = store.clone();
            tokio::spawn(async move {
                store
                    .modify(
                        Collection::Products,
                        "p1",
                        Box::new(|doc| {
                            let stock = doc
                                .as_ref()
                                .and_then(|d| d["stock"].as_i64())
                                .unwrap_or_default();
                            Ok(json!({"stock": stock + 1}))
                        }),
                    )
                    .await
            })
        });
        for task in futures::future::join_all(tasks).await {
            task.unwrap().unwrap();
        }

        let doc = store.get(Collection::Products, "p1").await.unwrap().unwrap();
        assert_eq!(doc["stock"], 50);
    }
}
