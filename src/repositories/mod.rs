//! Typed persistence ports over the document store.
//!
//! Services depend on these traits only; the `Document*` implementations map
//! records to and from JSON documents in a [`DocumentStore`].

use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;

use crate::{errors::ServiceError, store::StoreError};

pub mod cart_repository;
pub mod order_repository;
pub mod product_repository;
pub mod user_repository;

pub use cart_repository::{CartChange, CartRepository, DocumentCartRepository};
pub use order_repository::{DocumentOrderRepository, OrderRepository};
pub use product_repository::{DocumentProductRepository, ProductRepository};
pub use user_repository::{DocumentUserRepository, UserRepository};

#[cfg(test)]
pub use cart_repository::MockCartRepository;
#[cfg(test)]
pub use order_repository::MockOrderRepository;
#[cfg(test)]
pub use product_repository::MockProductRepository;

pub(crate) fn decode<T: DeserializeOwned>(document: Value) -> Result<T, ServiceError> {
    serde_json::from_value(document)
        .map_err(StoreError::from)
        .map_err(ServiceError::from)
}

pub(crate) fn encode<T: Serialize>(record: &T) -> Result<Value, ServiceError> {
    serde_json::to_value(record)
        .map_err(StoreError::from)
        .map_err(ServiceError::from)
}

/// Decode every document, skipping (and logging) ones that no longer match
/// the record shape so one bad document cannot break a listing.
pub(crate) fn decode_all<T: DeserializeOwned>(documents: Vec<Value>, kind: &str) -> Vec<T> {
    documents
        .into_iter()
        .filter_map(|document| match serde_json::from_value(document) {
            Ok(record) => Some(record),
            Err(err) => {
                tracing::warn!(kind, error = %err, "skipping undecodable document");
                None
            }
        })
        .collect()
}
