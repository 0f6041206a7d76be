use async_trait::async_trait;
use std::sync::Arc;

use super::{decode, decode_all, encode};
use crate::{
    errors::ServiceError,
    models::{Product, ProductUpdate},
    store::{Collection, DocumentStore, StoreError},
};

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ProductRepository: Send + Sync {
    async fn find_by_id(&self, id: &str) -> Result<Option<Product>, ServiceError>;

    async fn find_all(&self) -> Result<Vec<Product>, ServiceError>;

    async fn insert(&self, product: &Product) -> Result<(), ServiceError>;

    /// Merge `changes` onto the stored product. `None` when it does not exist.
    async fn update(
        &self,
        id: &str,
        changes: ProductUpdate,
    ) -> Result<Option<Product>, ServiceError>;

    async fn delete(&self, id: &str) -> Result<bool, ServiceError>;

    /// Atomically add `delta` (negative to deduct) to the product's stock.
    ///
    /// Refuses with a conflict, leaving stock unchanged, when the result
    /// would be negative.
    async fn adjust_stock(&self, id: &str, delta: i64) -> Result<Product, ServiceError>;
}

pub struct DocumentProductRepository {
    store: Arc<dyn DocumentStore>,
}

impl DocumentProductRepository {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl ProductRepository for DocumentProductRepository {
    async fn find_by_id(&self, id: &str) -> Result<Option<Product>, ServiceError> {
        self.store
            .get(Collection::Products, id)
            .await?
            .map(decode)
            .transpose()
    }

    async fn find_all(&self) -> Result<Vec<Product>, ServiceError> {
        let documents = self.store.list(Collection::Products).await?;
        Ok(decode_all(documents, "product"))
    }

    async fn insert(&self, product: &Product) -> Result<(), ServiceError> {
        self.store
            .put(Collection::Products, &product.id, encode(product)?)
            .await?;
        Ok(())
    }

    async fn update(
        &self,
        id: &str,
        changes: ProductUpdate,
    ) -> Result<Option<Product>, ServiceError> {
        let label = format!("Product {}", id);
        let result = self
            .store
            .modify(
                Collection::Products,
                id,
                Box::new(move |current| {
                    let current = current.ok_or(StoreError::Missing(label))?;
                    let mut product: Product = serde_json::from_value(current)?;
                    changes.apply(&mut product);
                    Ok(serde_json::to_value(&product)?)
                }),
            )
            .await;

        match result {
            Ok(document) => decode(document).map(Some),
            Err(StoreError::Missing(_)) => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    async fn delete(&self, id: &str) -> Result<bool, ServiceError> {
        Ok(self.store.delete(Collection::Products, id).await?)
    }

    async fn adjust_stock(&self, id: &str, delta: i64) -> Result<Product, ServiceError> {
        let label = format!("Product {}", id);
        let document = self
            .store
            .modify(
                Collection::Products,
                id,
                Box::new(move |current| {
                    let current = current.ok_or(StoreError::Missing(label))?;
                    let mut product: Product = serde_json::from_value(current)?;
                    let next = i64::from(product.stock) + delta;
                    if next < 0 {
                        return Err(StoreError::Rejected(format!(
                            "Insufficient stock for {}. Available: {}",
                            product.name, product.stock
                        )));
                    }
                    product.stock = u32::try_from(next).map_err(|_| {
                        StoreError::Rejected(format!("Stock for {} out of range", product.name))
                    })?;
                    Ok(serde_json::to_value(&product)?)
                }),
            )
            .await?;
        decode(document)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;
    use assert_matches::assert_matches;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn repo() -> DocumentProductRepository {
        DocumentProductRepository::new(Arc::new(InMemoryStore::new()))
    }

    fn katana(stock: u32) -> Product {
        Product {
            id: "5".into(),
            name: "Miniature Katana".into(),
            description: "Detailed metal alloy replica of a katana.".into(),
            price: dec!(35.00),
            stock,
            category: "Metal".into(),
            is_active: true,
            images: vec![],
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn adjust_stock_refuses_negative_and_leaves_stock() {
        let repo = repo();
        repo.insert(&katana(2)).await.unwrap();

        let err = repo.adjust_stock("5", -3).await.unwrap_err();
        assert_matches!(err, ServiceError::StoreError(StoreError::Rejected(ref msg)) if msg.contains("Available: 2"));
        assert_eq!(repo.find_by_id("5").await.unwrap().unwrap().stock, 2);

        let product = repo.adjust_stock("5", -2).await.unwrap();
        assert_eq!(product.stock, 0);
        assert_eq!(repo.adjust_stock("5", 4).await.unwrap().stock, 4);
    }

    #[tokio::test]
    async fn adjust_stock_on_missing_product_is_not_found() {
        let err = repo().adjust_stock("nope", -1).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn concurrent_deductions_never_oversell() {
        let repo = Arc::new(repo());
        repo.insert(&katana(5)).await.unwrap();

        let attempts = (0..20).map(|_| {
            let repo = repo.clone();
            async move { repo.adjust_stock("5", -1).await }
        });
        let results = futures::future::join_all(attempts).await;

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 5);
        assert_eq!(repo.find_by_id("5").await.unwrap().unwrap().stock, 0);
    }

    #[tokio::test]
    async fn update_missing_product_returns_none() {
        let updated = repo()
            .update("missing", ProductUpdate::default())
            .await
            .unwrap();
        assert!(updated.is_none());
    }
}
