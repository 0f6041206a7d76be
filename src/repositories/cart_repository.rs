use async_trait::async_trait;
use rust_decimal::Decimal;
use std::sync::Arc;

use super::decode;
use crate::{
    errors::ServiceError,
    models::Cart,
    store::{Collection, DocumentStore, StoreError},
};

/// A single cart mutation, applied atomically against the stored cart.
#[derive(Debug, Clone, PartialEq)]
pub enum CartChange {
    /// Add units of a product. Refused when the resulting line quantity
    /// would exceed `available`.
    Add {
        product_id: String,
        product_name: String,
        quantity: u32,
        price: Decimal,
        available: u32,
    },
    /// Overwrite a line's quantity; zero removes it. With `require_line`
    /// a missing line is reported as not found, otherwise it is ignored.
    SetQuantity {
        product_id: String,
        quantity: u32,
        require_line: bool,
    },
    Remove {
        product_id: String,
    },
    Clear,
}

impl CartChange {
    fn apply(self, cart: &mut Cart) -> Result<(), StoreError> {
        match self {
            CartChange::Add {
                product_id,
                product_name,
                quantity,
                price,
                available,
            } => {
                let wanted = cart.quantity_of(&product_id).saturating_add(quantity);
                if wanted > available {
                    return Err(StoreError::Rejected(format!(
                        "Insufficient stock for {}. Available: {}",
                        product_name, available
                    )));
                }
                cart.add(&product_id, quantity, price);
            }
            CartChange::SetQuantity {
                product_id,
                quantity,
                require_line,
            } => {
                let found = cart.set_quantity(&product_id, quantity);
                if !found && require_line {
                    return Err(StoreError::Missing(format!("Cart item {}", product_id)));
                }
            }
            CartChange::Remove { product_id } => {
                cart.remove(&product_id);
            }
            CartChange::Clear => cart.items.clear(),
        }
        Ok(())
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CartRepository: Send + Sync {
    async fn find(&self, owner: &str) -> Result<Option<Cart>, ServiceError>;

    /// Apply `change` to the owner's cart (created empty if absent) and
    /// return the stored result.
    async fn apply(&self, owner: &str, change: CartChange) -> Result<Cart, ServiceError>;
}

/// Carts stored in one collection of a document store, keyed by owner.
pub struct DocumentCartRepository {
    store: Arc<dyn DocumentStore>,
    collection: Collection,
}

impl DocumentCartRepository {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self::in_collection(store, Collection::Carts)
    }

    pub fn in_collection(store: Arc<dyn DocumentStore>, collection: Collection) -> Self {
        Self { store, collection }
    }
}

#[async_trait]
impl CartRepository for DocumentCartRepository {
    async fn find(&self, owner: &str) -> Result<Option<Cart>, ServiceError> {
        self.store
            .get(self.collection, owner)
            .await?
            .map(decode)
            .transpose()
    }

    async fn apply(&self, owner: &str, change: CartChange) -> Result<Cart, ServiceError> {
        let owner_id = owner.to_string();
        let document = self
            .store
            .modify(
                self.collection,
                owner,
                Box::new(move |current| {
                    let mut cart = match current {
                        Some(document) => serde_json::from_value(document)?,
                        None => Cart::new(owner_id),
                    };
                    change.apply(&mut cart)?;
                    Ok(serde_json::to_value(&cart)?)
                }),
            )
            .await?;
        decode(document)
    }
}
