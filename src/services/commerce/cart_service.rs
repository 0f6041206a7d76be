use crate::{
    errors::ServiceError,
    events::{Event, EventSender},
    models::{round_money, Cart, CartView, CartViewItem},
    repositories::{CartChange, CartRepository, ProductRepository},
};
use futures::future::join_all;
use rust_decimal::Decimal;
use std::{fmt, sync::Arc};
use tracing::{info, instrument};

/// Who a cart belongs to.
///
/// Signed-in users have persisted carts; guests are identified by a
/// client-chosen device id and their carts only live in memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CartOwner {
    User(String),
    Guest(String),
}

impl CartOwner {
    fn key(&self) -> &str {
        match self {
            CartOwner::User(id) | CartOwner::Guest(id) => id,
        }
    }
}

impl fmt::Display for CartOwner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CartOwner::User(id) => write!(f, "user:{}", id),
            CartOwner::Guest(id) => write!(f, "guest:{}", id),
        }
    }
}

/// Cart service. Quantities are capped by catalog stock when added; prices
/// shown are always the catalog's current ones.
#[derive(Clone)]
pub struct CartService {
    user_carts: Arc<dyn CartRepository>,
    guest_carts: Arc<dyn CartRepository>,
    products: Arc<dyn ProductRepository>,
    event_sender: Arc<EventSender>,
}

impl CartService {
    pub fn new(
        user_carts: Arc<dyn CartRepository>,
        guest_carts: Arc<dyn CartRepository>,
        products: Arc<dyn ProductRepository>,
        event_sender: Arc<EventSender>,
    ) -> Self {
        Self {
            user_carts,
            guest_carts,
            products,
            event_sender,
        }
    }

    fn repo(&self, owner: &CartOwner) -> &Arc<dyn CartRepository> {
        match owner {
            CartOwner::User(_) => &self.user_carts,
            CartOwner::Guest(_) => &self.guest_carts,
        }
    }

    /// Current cart contents joined with live product data
    #[instrument(skip(self), fields(owner = %owner))]
    pub async fn get_cart(&self, owner: &CartOwner) -> Result<CartView, ServiceError> {
        let cart = self
            .repo(owner)
            .find(owner.key())
            .await?
            .unwrap_or_else(|| Cart::new(owner.key()));
        self.view(cart).await
    }

    /// Add units of a product to the cart
    #[instrument(skip(self), fields(owner = %owner))]
    pub async fn add_item(
        &self,
        owner: &CartOwner,
        product_id: &str,
        quantity: i64,
    ) -> Result<CartView, ServiceError> {
        let quantity = u32::try_from(quantity)
            .ok()
            .filter(|q| *q >= 1)
            .ok_or_else(|| ServiceError::InvalidInput("Quantity must be at least 1".to_string()))?;

        let product = self
            .products
            .find_by_id(product_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Product {} not found", product_id)))?;
        if !product.is_active {
            return Err(ServiceError::Conflict(format!(
                "Product {} is no longer available",
                product.name
            )));
        }

        let cart = self
            .repo(owner)
            .apply(
                owner.key(),
                CartChange::Add {
                    product_id: product.id.clone(),
                    product_name: product.name.clone(),
                    quantity,
                    price: product.price,
                    available: product.stock,
                },
            )
            .await?;

        info!(product_id = %product.id, quantity, "Added to cart");
        self.view(cart).await
    }

    /// Set a line's quantity; zero or less removes the line
    #[instrument(skip(self), fields(owner = %owner))]
    pub async fn update_quantity(
        &self,
        owner: &CartOwner,
        product_id: &str,
        quantity: i64,
    ) -> Result<CartView, ServiceError> {
        if quantity <= 0 {
            return self.remove_item(owner, product_id).await;
        }
        let quantity = u32::try_from(quantity)
            .map_err(|_| ServiceError::InvalidInput("Quantity is too large".to_string()))?;

        if let Some(product) = self.products.find_by_id(product_id).await? {
            if quantity > product.stock {
                return Err(ServiceError::Conflict(format!(
                    "Insufficient stock for {}. Available: {}",
                    product.name, product.stock
                )));
            }
        }

        let cart = self
            .repo(owner)
            .apply(
                owner.key(),
                CartChange::SetQuantity {
                    product_id: product_id.to_string(),
                    quantity,
                    require_line: matches!(owner, CartOwner::User(_)),
                },
            )
            .await?;
        self.view(cart).await
    }

    /// Remove a line; removing an absent line is not an error
    #[instrument(skip(self), fields(owner = %owner))]
    pub async fn remove_item(
        &self,
        owner: &CartOwner,
        product_id: &str,
    ) -> Result<CartView, ServiceError> {
        let cart = self
            .repo(owner)
            .apply(
                owner.key(),
                CartChange::Remove {
                    product_id: product_id.to_string(),
                },
            )
            .await?;
        self.view(cart).await
    }

    /// Empty the cart
    #[instrument(skip(self), fields(owner = %owner))]
    pub async fn clear(&self, owner: &CartOwner) -> Result<CartView, ServiceError> {
        let cart = self.repo(owner).apply(owner.key(), CartChange::Clear).await?;
        self.event_sender
            .send_or_log(Event::CartCleared(owner.to_string()))
            .await;
        self.view(cart).await
    }

    async fn view(&self, cart: Cart) -> Result<CartView, ServiceError> {
        let lookups = cart
            .items
            .iter()
            .map(|line| self.products.find_by_id(&line.product_id));
        let products = join_all(lookups).await;

        let mut items = Vec::with_capacity(cart.items.len());
        for (line, found) in cart.items.iter().zip(products) {
            // Deleted products silently drop out of the cart view.
            if let Some(product) = found? {
                items.push(CartViewItem {
                    product,
                    quantity: line.quantity,
                });
            }
        }

        let out_of_range = || ServiceError::InvalidInput("Cart total is out of range".to_string());
        let total = items
            .iter()
            .try_fold(Decimal::ZERO, |total, item| {
                item.product
                    .price
                    .checked_mul(Decimal::from(item.quantity))
                    .and_then(|subtotal| total.checked_add(subtotal))
            })
            .map(round_money)
            .ok_or_else(out_of_range)?;
        let item_count = items
            .iter()
            .try_fold(0u32, |count, item| count.checked_add(item.quantity))
            .ok_or_else(out_of_range)?;

        Ok(CartView {
            items,
            total,
            item_count,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        events,
        models::Product,
        repositories::{DocumentCartRepository, DocumentProductRepository, MockProductRepository},
        store::{Collection, InMemoryStore},
    };
    use assert_matches::assert_matches;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    struct Fixture {
        carts: CartService,
        products: Arc<DocumentProductRepository>,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(InMemoryStore::new());
        let guest_store = Arc::new(InMemoryStore::new());
        let products = Arc::new(DocumentProductRepository::new(store.clone()));
        let (sender, _rx) = events::channel(64);
        let carts = CartService::new(
            Arc::new(DocumentCartRepository::new(store)),
            Arc::new(DocumentCartRepository::in_collection(
                guest_store,
                Collection::GuestCarts,
            )),
            products.clone(),
            Arc::new(sender),
        );
        Fixture { carts, products }
    }

    fn product(id: &str, price: Decimal, stock: u32, active: bool) -> Product {
        Product {
            id: id.into(),
            name: format!("Keychain {}", id),
            description: "A keychain for testing".into(),
            price,
            stock,
            category: "Metal".into(),
            is_active: active,
            images: vec![],
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn add_accumulates_and_caps_at_stock() {
        let fx = fixture();
        fx.products.insert(&product("a", dec!(10), 3, true)).await.unwrap();
        let owner = CartOwner::User("u1".into());

        fx.carts.add_item(&owner, "a", 2).await.unwrap();
        let err = fx.carts.add_item(&owner, "a", 2).await.unwrap_err();
        assert_matches!(err, ServiceError::Conflict(_));

        let view = fx.carts.add_item(&owner, "a", 1).await.unwrap();
        assert_eq!(view.item_count, 3);
        assert_eq!(view.total, dec!(30.00));
    }

    #[tokio::test]
    async fn add_rejects_bad_quantity_missing_and_inactive() {
        let fx = fixture();
        fx.products.insert(&product("off", dec!(5), 9, false)).await.unwrap();
        let owner = CartOwner::Guest("device-1".into());

        assert_matches!(
            fx.carts.add_item(&owner, "off", 0).await,
            Err(ServiceError::InvalidInput(_))
        );
        assert!(fx
            .carts
            .add_item(&owner, "ghost", 1)
            .await
            .unwrap_err()
            .is_not_found());
        assert_matches!(
            fx.carts.add_item(&owner, "off", 1).await,
            Err(ServiceError::Conflict(_))
        );
    }

    #[tokio::test]
    async fn view_uses_current_prices_and_drops_deleted_products() {
        let fx = fixture();
        fx.products.insert(&product("a", dec!(10), 5, true)).await.unwrap();
        fx.products.insert(&product("b", dec!(2.5), 5, true)).await.unwrap();
        let owner = CartOwner::User("u1".into());
        fx.carts.add_item(&owner, "a", 1).await.unwrap();
        fx.carts.add_item(&owner, "b", 2).await.unwrap();

        fx.products
            .update(
                "a",
                crate::models::ProductUpdate {
                    price: Some(dec!(12.345)),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        fx.products.delete("b").await.unwrap();

        let view = fx.carts.get_cart(&owner).await.unwrap();
        assert_eq!(view.items.len(), 1);
        assert_eq!(view.item_count, 1);
        assert_eq!(view.total, dec!(12.35));
    }

    #[tokio::test]
    async fn store_failure_while_viewing_is_reported_not_hidden() {
        let store = Arc::new(InMemoryStore::new());
        let user_carts = Arc::new(DocumentCartRepository::new(store.clone()));
        user_carts
            .apply(
                "u1",
                CartChange::Add {
                    product_id: "a".into(),
                    product_name: "Keychain a".into(),
                    quantity: 1,
                    price: dec!(10),
                    available: 5,
                },
            )
            .await
            .unwrap();

        let mut products = MockProductRepository::new();
        products
            .expect_find_by_id()
            .returning(|_| Err(ServiceError::InternalError("product store down".into())));
        let (sender, _rx) = events::channel(8);
        let carts = CartService::new(
            user_carts,
            Arc::new(DocumentCartRepository::in_collection(store, Collection::GuestCarts)),
            Arc::new(products),
            Arc::new(sender),
        );

        assert_matches!(
            carts.get_cart(&CartOwner::User("u1".into())).await,
            Err(ServiceError::InternalError(_))
        );
    }

    #[tokio::test]
    async fn update_quantity_missing_line_differs_for_users_and_guests() {
        let fx = fixture();
        fx.products.insert(&product("a", dec!(1), 5, true)).await.unwrap();

        let user = CartOwner::User("u1".into());
        assert!(fx
            .carts
            .update_quantity(&user, "a", 2)
            .await
            .unwrap_err()
            .is_not_found());

        let guest = CartOwner::Guest("d1".into());
        let view = fx.carts.update_quantity(&guest, "a", 2).await.unwrap();
        assert!(view.items.is_empty());
    }

    #[tokio::test]
    async fn zero_quantity_removes_and_clear_empties() {
        let fx = fixture();
        fx.products.insert(&product("a", dec!(1), 5, true)).await.unwrap();
        fx.products.insert(&product("b", dec!(1), 5, true)).await.unwrap();
        let owner = CartOwner::User("u1".into());
        fx.carts.add_item(&owner, "a", 1).await.unwrap();
        fx.carts.add_item(&owner, "b", 1).await.unwrap();

        let view = fx.carts.update_quantity(&owner, "a", 0).await.unwrap();
        assert_eq!(view.items.len(), 1);

        let view = fx.carts.clear(&owner).await.unwrap();
        assert!(view.items.is_empty());
        assert_eq!(view.total, Decimal::ZERO);
    }

    #[tokio::test]
    async fn guest_and_user_carts_are_separate() {
        let fx = fixture();
        fx.products.insert(&product("a", dec!(1), 5, true)).await.unwrap();
        fx.carts
            .add_item(&CartOwner::Guest("same".into()), "a", 1)
            .await
            .unwrap();

        let view = fx
            .carts
            .get_cart(&CartOwner::User("same".into()))
            .await
            .unwrap();
        assert!(view.items.is_empty());
    }
}
