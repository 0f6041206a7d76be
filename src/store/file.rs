use async_trait::async_trait;
use serde_json::{Map, Value};
use std::{
    path::{Path, PathBuf},
    time::Duration,
};
use strum::IntoEnumIterator;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::{Collection, DocumentStore, InMemoryStore, Modifier, StoreBackend, StoreError};

/// Durable store: documents live in memory and every write is flushed to
/// `<data_dir>/<collection>.json` before the call returns.
#[derive(Debug)]
pub struct JsonFileStore {
    data_dir: PathBuf,
    documents: InMemoryStore,
    latency: Duration,
    flush_lock: Mutex<()>,
}

impl JsonFileStore {
    /// Open (or create) the data directory and load every existing snapshot.
    pub fn open(data_dir: impl AsRef<Path>, latency: Duration) -> Result<Self, StoreError> {
        let data_dir = data_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&data_dir)?;

        let documents = InMemoryStore::new();
        for collection in Collection::iter() {
            let path = snapshot_path(&data_dir, collection);
            if !path.exists() {
                continue;
            }
            let raw = std::fs::read(&path)?;
            let map: Map<String, Value> = serde_json::from_slice(&raw)?;
            info!(collection = %collection, documents = map.len(), "loaded snapshot");
            documents.load(collection, map);
        }

        Ok(Self {
            data_dir,
            documents,
            latency,
            flush_lock: Mutex::new(()),
        })
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    async fn simulate_latency(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }

    /// Rewrite the collection snapshot. The snapshot is taken while holding
    /// the flush lock, so the last flush to finish always carries the latest
    /// state.
    async fn flush(&self, collection: Collection) -> Result<(), StoreError> {
        let _guard = self.flush_lock.lock().await;
        let snapshot = self.documents.snapshot(collection);
        let bytes = serde_json::to_vec_pretty(&snapshot)?;

        let path = snapshot_path(&self.data_dir, collection);
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &path).await?;
        debug!(collection = %collection, documents = snapshot.len(), "flushed snapshot");
        Ok(())
    }

    /// Flush after a write to `id`; if the snapshot cannot be written, the
    /// in-memory document goes back to `previous` so callers never see a
    /// failed write take effect.
    async fn flush_or_revert(
        &self,
        collection: Collection,
        id: &str,
        written: Option<&Value>,
        previous: Option<Value>,
    ) -> Result<(), StoreError> {
        let Err(err) = self.flush(collection).await else {
            return Ok(());
        };
        if self.documents.revert_now(collection, id, written, previous) {
            warn!(collection = %collection, %id, error = %err, "flush failed; write rolled back");
        } else {
            warn!(collection = %collection, %id, error = %err, "flush failed; document already rewritten");
        }
        Err(err)
    }
}

fn snapshot_path(data_dir: &Path, collection: Collection) -> PathBuf {
    data_dir.join(format!("{}.json", collection))
}

#[async_trait]
impl DocumentStore for JsonFileStore {
    async fn get(&self, collection: Collection, id: &str) -> Result<Option<Value>, StoreError> {
        self.simulate_latency().await;
        self.documents.get(collection, id).await
    }

    async fn put(
        &self,
        collection: Collection,
        id: &str,
        document: Value,
    ) -> Result<(), StoreError> {
        self.simulate_latency().await;
        let previous = self.documents.put_now(collection, id, document.clone());
        self.flush_or_revert(collection, id, Some(&document), previous)
            .await
    }

    async fn delete(&self, collection: Collection, id: &str) -> Result<bool, StoreError> {
        self.simulate_latency().await;
        let Some(removed) = self.documents.delete_now(collection, id) else {
            return Ok(false);
        };
        self.flush_or_revert(collection, id, None, Some(removed))
            .await?;
        Ok(true)
    }

    async fn list(&self, collection: Collection) -> Result<Vec<Value>, StoreError> {
        self.simulate_latency().await;
        self.documents.list(collection).await
    }

    async fn modify<'a>(
        &self,
        collection: Collection,
        id: &str,
        modifier: Modifier<'a>,
    ) -> Result<Value, StoreError> {
        self.simulate_latency().await;
        let (previous, stored) = self.documents.modify_now(collection, id, modifier)?;
        self.flush_or_revert(collection, id, Some(&stored), previous)
            .await?;
        Ok(stored)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        tokio::fs::metadata(&self.data_dir).await?;
        Ok(())
    }

    fn backend(&self) -> StoreBackend {
        StoreBackend::File
    }
}
