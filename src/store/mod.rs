//! Document store
//!
//! Key-value persistence for the storefront. Every record is a JSON document
//! keyed by string id inside one of a fixed set of collections; typed
//! conversion happens one layer up in `repositories`. The concrete backend is
//! chosen once at startup from configuration.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{path::Path, sync::Arc, time::Duration};
use strum::{AsRefStr, Display, EnumIter, EnumString};
use thiserror::Error;

mod file;
mod memory;

pub use file::JsonFileStore;
pub use memory::InMemoryStore;

/// Logical collections held by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, AsRefStr, EnumIter)]
#[strum(serialize_all = "snake_case")]
pub enum Collection {
    Users,
    Products,
    Carts,
    Orders,
    /// Device-scoped carts of anonymous visitors. Only ever backed in memory.
    GuestCarts,
}

/// Which backend serves the persisted collections.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum StoreBackend {
    #[default]
    InMemory,
    File,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("document serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("store I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("document {0} does not exist")]
    Missing(String),

    /// A `modify` closure refused the write.
    #[error("{0}")]
    Rejected(String),
}

/// Read-modify-write step applied atomically to a single document.
///
/// Receives the current document (`None` when absent) and returns the
/// document to store. Returning an error leaves the stored value untouched.
pub type Modifier<'a> =
    Box<dyn FnOnce(Option<Value>) -> Result<Value, StoreError> + Send + 'a>;

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get(&self, collection: Collection, id: &str) -> Result<Option<Value>, StoreError>;

    async fn put(&self, collection: Collection, id: &str, document: Value)
        -> Result<(), StoreError>;

    /// Returns `true` when a document was removed.
    async fn delete(&self, collection: Collection, id: &str) -> Result<bool, StoreError>;

    async fn list(&self, collection: Collection) -> Result<Vec<Value>, StoreError>;

    /// Atomically replace a document with the result of `modifier`.
    ///
    /// No other writer to the same key can interleave between the read and
    /// the write. Returns the stored document.
    async fn modify<'a>(
        &self,
        collection: Collection,
        id: &str,
        modifier: Modifier<'a>,
    ) -> Result<Value, StoreError>;

    async fn ping(&self) -> Result<(), StoreError>;

    fn backend(&self) -> StoreBackend;
}

/// Open the configured backend.
pub fn open_store(
    backend: StoreBackend,
    data_dir: &Path,
    latency: Duration,
) -> Result<Arc<dyn DocumentStore>, StoreError> {
    let store: Arc<dyn DocumentStore> = match backend {
        StoreBackend::InMemory => Arc::new(InMemoryStore::with_latency(latency)),
        StoreBackend::File => Arc::new(JsonFileStore::open(data_dir, latency)?),
    };
    tracing::info!(backend = %backend, "document store opened");
    Ok(store)
}
