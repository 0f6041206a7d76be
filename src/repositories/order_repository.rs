use async_trait::async_trait;
use std::sync::Arc;

use super::{decode, decode_all, encode};
use crate::{
    errors::ServiceError,
    models::Order,
    store::{Collection, DocumentStore},
};

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OrderRepository: Send + Sync {
    async fn find_by_id(&self, id: &str) -> Result<Option<Order>, ServiceError>;

    /// All orders, newest first.
    async fn find_all(&self) -> Result<Vec<Order>, ServiceError>;

    /// Orders placed by one user, newest first.
    async fn find_by_user(&self, user_id: &str) -> Result<Vec<Order>, ServiceError>;

    /// Insert or replace the order.
    async fn save(&self, order: &Order) -> Result<(), ServiceError>;
}

pub struct DocumentOrderRepository {
    store: Arc<dyn DocumentStore>,
}

impl DocumentOrderRepository {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }
}

fn newest_first(mut orders: Vec<Order>) -> Vec<Order> {
    orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    orders
}

#[async_trait]
impl OrderRepository for DocumentOrderRepository {
    async fn find_by_id(&self, id: &str) -> Result<Option<Order>, ServiceError> {
        self.store
            .get(Collection::Orders, id)
            .await?
            .map(decode)
            .transpose()
    }

    async fn find_all(&self) -> Result<Vec<Order>, ServiceError> {
        let documents = self.store.list(Collection::Orders).await?;
        Ok(newest_first(decode_all(documents, "order")))
    }

    async fn find_by_user(&self, user_id: &str) -> Result<Vec<Order>, ServiceError> {
        let documents = self.store.list(Collection::Orders).await?;
        let orders: Vec<Order> = decode_all(documents, "order");
        Ok(newest_first(
            orders
                .into_iter()
                .filter(|order| order.user_id == user_id)
                .collect(),
        ))
    }

    async fn save(&self, order: &Order) -> Result<(), ServiceError> {
        self.store
            .put(Collection::Orders, &order.id, encode(order)?)
            .await?;
        Ok(())
    }
}
