use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::Product;

/// Stored cart line: quantity plus the price seen when it was added.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CartLine {
    pub product_id: String,
    pub quantity: u32,
    #[serde(with = "rust_decimal::serde::float")]
    #[schema(value_type = f64)]
    pub price: Decimal,
}

/// Stored cart document. `user_id` holds the device id for guest carts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Cart {
    pub user_id: String,
    #[serde(default)]
    pub items: Vec<CartLine>,
}

impl Cart {
    pub fn new(owner: impl Into<String>) -> Self {
        Self {
            user_id: owner.into(),
            items: Vec::new(),
        }
    }

    pub fn quantity_of(&self, product_id: &str) -> u32 {
        self.items
            .iter()
            .find(|line| line.product_id == product_id)
            .map(|line| line.quantity)
            .unwrap_or(0)
    }

    /// Add `quantity` units, refreshing the captured price. Returns the new
    /// line quantity.
    pub fn add(&mut self, product_id: &str, quantity: u32, price: Decimal) -> u32 {
        match self.items.iter_mut().find(|line| line.product_id == product_id) {
            Some(line) => {
                line.quantity = line.quantity.saturating_add(quantity);
                line.price = price;
                line.quantity
            }
            None => {
                self.items.push(CartLine {
                    product_id: product_id.to_string(),
                    quantity,
                    price,
                });
                quantity
            }
        }
    }

    /// Overwrite a line's quantity; zero removes the line. Returns `false`
    /// when the line does not exist.
    pub fn set_quantity(&mut self, product_id: &str, quantity: u32) -> bool {
        if quantity == 0 {
            return self.remove(product_id);
        }
        match self.items.iter_mut().find(|line| line.product_id == product_id) {
            Some(line) => {
                line.quantity = quantity;
                true
            }
            None => false,
        }
    }

    pub fn remove(&mut self, product_id: &str) -> bool {
        let before = self.items.len();
        self.items.retain(|line| line.product_id != product_id);
        self.items.len() != before
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Cart line joined with the current catalog entry.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CartViewItem {
    #[serde(flatten)]
    pub product: Product,
    pub quantity: u32,
}

/// Materialized cart as presented to the shopper.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CartView {
    pub items: Vec<CartViewItem>,
    #[serde(with = "rust_decimal::serde::float")]
    #[schema(value_type = f64)]
    pub total: Decimal,
    pub item_count: u32,
}
