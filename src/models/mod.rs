//! Storefront records as they are persisted and sent over the wire.
//!
//! Field names are camelCase on the wire; money is a decimal number except in
//! payment-intent responses, which carry integer minor units.

use rust_decimal::{Decimal, RoundingStrategy};

pub mod cart;
pub mod order;
pub mod product;
pub mod user;

pub use cart::{Cart, CartLine, CartView, CartViewItem};
pub use order::{generate_order_id, Address, Order, OrderItem, OrderStatus, PaymentStatus};
pub use product::{Product, ProductFilter, ProductPage, ProductUpdate, PLACEHOLDER_IMAGE};
pub use user::{Role, User};

/// Round a currency amount to cents, half away from zero.
pub fn round_money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}
