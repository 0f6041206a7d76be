use crate::{
    errors::ServiceError,
    events::{Event, EventSender},
    models::{
        generate_order_id, round_money, Address, Order, OrderItem, OrderStatus, PaymentStatus,
        Product,
    },
    repositories::{CartChange, CartRepository, OrderRepository},
    services::{
        commerce::{CartOwner, ProductCatalogService},
        payments::{PaymentIntent, PaymentService},
    },
};
use axum::http::StatusCode;
use chrono::Utc;
use dashmap::DashMap;
use futures::future::{join_all, try_join_all};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, future::Future, sync::Arc};
use tokio::sync::Mutex;
use tracing::{error, info, instrument, warn};
use utoipa::ToSchema;
use validator::Validate;

/// One requested order line. Any client-side price is ignored.
#[derive(Debug, Clone, Deserialize, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OrderLineInput {
    #[serde(alias = "id")]
    pub product_id: String,
    pub quantity: i64,
    #[serde(default, with = "rust_decimal::serde::float_option")]
    #[schema(value_type = Option<f64>)]
    pub price: Option<Decimal>,
}

/// Request to place an order
#[derive(Debug, Clone, Deserialize, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderInput {
    pub items: Vec<OrderLineInput>,
    /// Client-declared total; advisory only.
    #[serde(with = "rust_decimal::serde::float")]
    #[schema(value_type = f64)]
    pub total_amount: Decimal,
    pub address: Address,
}

/// Gateway results handed back by the checkout widget
#[derive(Debug, Clone, Default, Deserialize, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PaymentConfirmation {
    #[serde(default)]
    pub intent_id: String,
    #[serde(default)]
    pub payment_id: String,
    #[serde(default)]
    pub signature: String,
}

/// Total units requested per product across all lines.
fn requested_units<'a>(
    lines: impl Iterator<Item = (&'a str, u32)>,
) -> Result<HashMap<&'a str, u32>, ServiceError> {
    let mut needed = HashMap::new();
    for (product_id, quantity) in lines {
        let units = needed.entry(product_id).or_insert(0u32);
        *units = units.checked_add(quantity).ok_or_else(|| {
            ServiceError::InvalidInput(format!("Quantity for product {} is too large", product_id))
        })?;
    }
    Ok(needed)
}

fn ensure_orderable(product: &Product, quantity: u32) -> Result<(), ServiceError> {
    if !product.is_active {
        return Err(ServiceError::Conflict(format!(
            "Product {} is no longer available",
            product.name
        )));
    }
    if !product.can_fulfil(quantity) {
        return Err(ServiceError::Conflict(format!(
            "Insufficient stock for {}. Available: {}",
            product.name, product.stock
        )));
    }
    Ok(())
}

fn stock_error(name: &str) -> ServiceError {
    ServiceError::Conflict(format!(
        "Stock error for {} during finalization. Order cancelled.",
        name
    ))
}

/// Order workflow: pending creation, payment intents, finalization and
/// administrative status changes.
#[derive(Clone)]
pub struct OrderService {
    orders: Arc<dyn OrderRepository>,
    catalog: Arc<ProductCatalogService>,
    carts: Arc<dyn CartRepository>,
    payments: Arc<PaymentService>,
    event_sender: Arc<EventSender>,
    enforce_status_transitions: bool,
    order_locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

impl OrderService {
    pub fn new(
        orders: Arc<dyn OrderRepository>,
        catalog: Arc<ProductCatalogService>,
        carts: Arc<dyn CartRepository>,
        payments: Arc<PaymentService>,
        event_sender: Arc<EventSender>,
    ) -> Self {
        Self {
            orders,
            catalog,
            carts,
            payments,
            event_sender,
            enforce_status_transitions: false,
            order_locks: Arc::new(DashMap::new()),
        }
    }

    /// Only allow the forward status transitions of [`OrderStatus::can_transition_to`]
    pub fn with_status_transitions(mut self, enforce: bool) -> Self {
        self.enforce_status_transitions = enforce;
        self
    }

    /// Run `f` while holding the order's lock. Mutations of one order never interleave.
    async fn with_order_lock<T, F, Fut>(&self, order_id: &str, f: F) -> Result<T, ServiceError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, ServiceError>>,
    {
        let lock = self
            .order_locks
            .entry(order_id.to_string())
            .or_default()
            .clone();
        let result = {
            let _guard = lock.lock().await;
            f().await
        };
        drop(lock);
        self.order_locks
            .remove_if(order_id, |_, lock| Arc::strong_count(lock) == 1);
        result
    }

    async fn load(&self, order_id: &str) -> Result<Order, ServiceError> {
        self.orders
            .find_by_id(order_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))
    }

    /// Validate the request against the catalog and persist a pending order.
    ///
    /// Prices and the total come from the catalog; nothing is reserved.
    #[instrument(skip(self, input), fields(lines = input.items.len()))]
    pub async fn create_pending_order(
        &self,
        user_id: &str,
        input: CreateOrderInput,
    ) -> Result<Order, ServiceError> {
        if input.items.is_empty() {
            return Err(ServiceError::InvalidInput(
                "Order must contain at least one item".to_string(),
            ));
        }
        if input.total_amount <= Decimal::ZERO {
            return Err(ServiceError::InvalidInput(
                "Total amount must be positive".to_string(),
            ));
        }
        input.address.validate()?;

        let mut lines = Vec::with_capacity(input.items.len());
        for line in &input.items {
            let quantity = u32::try_from(line.quantity)
                .ok()
                .filter(|q| *q >= 1)
                .ok_or_else(|| {
                    ServiceError::InvalidInput(format!(
                        "Quantity for product {} must be at least 1",
                        line.product_id
                    ))
                })?;
            lines.push((line.product_id.as_str(), quantity));
        }
        let needed = requested_units(lines.iter().copied())?;

        let products = try_join_all(lines.iter().map(|(product_id, quantity)| {
            let units = needed.get(product_id).copied().unwrap_or(*quantity);
            async move {
                let product = self
                    .catalog
                    .find_product(product_id)
                    .await?
                    .ok_or_else(|| {
                        ServiceError::NotFound(format!("Product {} not found", product_id))
                    })?;
                ensure_orderable(&product, units)?;
                Ok::<_, ServiceError>(product)
            }
        }))
        .await?;

        let items: Vec<OrderItem> = lines
            .iter()
            .zip(&products)
            .map(|((_, quantity), product)| OrderItem {
                product_id: product.id.clone(),
                quantity: *quantity,
                price: product.price,
                name: product.name.clone(),
                image: product.primary_image().to_string(),
            })
            .collect();
        let total_amount = items
            .iter()
            .try_fold(Decimal::ZERO, |total, item| {
                item.subtotal().and_then(|subtotal| total.checked_add(subtotal))
            })
            .map(round_money)
            .ok_or_else(|| ServiceError::InvalidInput("Order total is out of range".to_string()))?;
        if round_money(input.total_amount) != total_amount {
            warn!(
                declared = %input.total_amount,
                calculated = %total_amount,
                "client total differs from catalog total; using catalog"
            );
        }

        let order = Order {
            id: generate_order_id(),
            user_id: user_id.to_string(),
            items,
            total_amount,
            address: input.address,
            payment_status: PaymentStatus::Pending,
            order_status: OrderStatus::Processing,
            payment_id: String::new(),
            payment_intent_id: None,
            created_at: Utc::now(),
        };
        self.orders.save(&order).await?;

        self.event_sender
            .send_or_log(Event::OrderCreated {
                order_id: order.id.clone(),
                user_id: order.user_id.clone(),
                total_amount,
            })
            .await;

        info!(order_id = %order.id, %total_amount, "Pending order created");
        Ok(order)
    }

    /// Open a gateway intent for an arbitrary amount
    pub async fn create_payment_intent(
        &self,
        amount: Decimal,
        currency: Option<&str>,
    ) -> Result<PaymentIntent, ServiceError> {
        self.payments.create_intent(amount, currency).await
    }

    /// Open a gateway intent for an order's authoritative total and bind it
    /// to the order, so only a payment against this intent can finalize it.
    #[instrument(skip(self))]
    pub async fn create_payment_intent_for_order(
        &self,
        order_id: &str,
    ) -> Result<PaymentIntent, ServiceError> {
        self.with_order_lock(order_id, || async {
            let mut order = self.load(order_id).await?;
            match order.payment_status {
                PaymentStatus::Pending => {}
                PaymentStatus::Completed => {
                    return Err(ServiceError::Conflict(format!(
                        "Order {} is already paid",
                        order_id
                    )))
                }
                PaymentStatus::Failed => {
                    return Err(ServiceError::Conflict(format!(
                        "Order {} has been cancelled",
                        order_id
                    )))
                }
            }

            let intent = self.payments.create_intent(order.total_amount, None).await?;
            order.payment_intent_id = Some(intent.id.clone());
            self.orders.save(&order).await?;
            Ok(intent)
        })
        .await
    }

    /// Verify payment, re-check and deduct stock, and mark the order paid.
    ///
    /// Finalizing an already-paid order returns it unchanged; stock is
    /// deducted at most once per order.
    #[instrument(skip(self, confirmation), fields(payment_id = %confirmation.payment_id))]
    pub async fn finalize_order(
        &self,
        order_id: &str,
        confirmation: PaymentConfirmation,
    ) -> Result<Order, ServiceError> {
        self.with_order_lock(order_id, || self.finalize_locked(order_id, confirmation))
            .await
    }

    async fn finalize_locked(
        &self,
        order_id: &str,
        confirmation: PaymentConfirmation,
    ) -> Result<Order, ServiceError> {
        let verified = self
            .payments
            .verify(
                &confirmation.intent_id,
                &confirmation.payment_id,
                &confirmation.signature,
            )
            .await?;

        let order = self.load(order_id).await?;
        match order.payment_status {
            PaymentStatus::Completed => {
                info!(%order_id, "Order already finalized");
                return Ok(order);
            }
            PaymentStatus::Failed => {
                return Err(ServiceError::Conflict(format!(
                    "Order {} has been cancelled; place a new order",
                    order_id
                )));
            }
            PaymentStatus::Pending => {}
        }

        // Only a payment against the intent opened for this order's total counts.
        let bound_to_intent = order
            .payment_intent_id
            .as_deref()
            .is_some_and(|expected| expected == confirmation.intent_id);
        if !verified || !bound_to_intent {
            self.reject(order, "payment verification failed").await?;
            return Err(ServiceError::PaymentRejected(
                "Payment verification failed".to_string(),
            ));
        }

        let needed = requested_units(
            order
                .items
                .iter()
                .map(|item| (item.product_id.as_str(), item.quantity)),
        )?;
        let current = join_all(
            order
                .items
                .iter()
                .map(|item| self.catalog.find_product(&item.product_id)),
        )
        .await;
        let mut shortage = None;
        for (item, found) in order.items.iter().zip(current) {
            let units = needed.get(item.product_id.as_str()).copied().unwrap_or(0);
            let available = matches!(found?, Some(ref p) if p.is_active && p.can_fulfil(units));
            if !available {
                shortage = Some(item.name.clone());
                break;
            }
        }
        if let Some(name) = shortage {
            self.reject(order, "stock no longer available").await?;
            return Err(stock_error(&name));
        }

        let items = order.items.clone();
        let outcomes = join_all(
            items
                .iter()
                .map(|item| self.catalog.deduct_stock(&item.product_id, item.quantity)),
        )
        .await;

        let mut deducted = Vec::with_capacity(items.len());
        let mut failure = None;
        for (item, outcome) in items.iter().zip(outcomes) {
            match outcome {
                Ok(_) => deducted.push(item),
                Err(err) if failure.is_none() => failure = Some((item, err)),
                Err(_) => {}
            }
        }

        if let Some((item, err)) = failure {
            self.restore(&deducted).await;
            if matches!(err.status_code(), StatusCode::CONFLICT | StatusCode::NOT_FOUND) {
                self.reject(order, "stock lost during finalization").await?;
                return Err(stock_error(&item.name));
            }
            return Err(err);
        }

        let mut order = order;
        order.mark_paid(confirmation.payment_id.as_str());
        if let Err(err) = self.orders.save(&order).await {
            self.restore(&deducted).await;
            return Err(err);
        }

        self.event_sender
            .send_or_log(Event::OrderFinalized {
                order_id: order.id.clone(),
                payment_id: order.payment_id.clone(),
            })
            .await;

        match self.carts.apply(&order.user_id, CartChange::Clear).await {
            Ok(_) => {
                self.event_sender
                    .send_or_log(Event::CartCleared(
                        CartOwner::User(order.user_id.clone()).to_string(),
                    ))
                    .await;
            }
            Err(err) => {
                warn!(%order_id, user_id = %order.user_id, error = %err, "failed to clear cart after payment");
            }
        }

        info!(%order_id, payment_id = %order.payment_id, "Order finalized");
        Ok(order)
    }

    async fn reject(&self, mut order: Order, reason: &str) -> Result<(), ServiceError> {
        order.mark_failed();
        self.orders.save(&order).await?;
        self.event_sender
            .send_or_log(Event::OrderPaymentFailed {
                order_id: order.id.clone(),
                reason: reason.to_string(),
            })
            .await;
        Ok(())
    }

    async fn restore(&self, items: &[&OrderItem]) {
        let outcomes = join_all(
            items
                .iter()
                .map(|item| self.catalog.restore_stock(&item.product_id, item.quantity)),
        )
        .await;
        for (item, outcome) in items.iter().zip(outcomes) {
            if let Err(err) = outcome {
                error!(
                    product_id = %item.product_id,
                    quantity = item.quantity,
                    error = %err,
                    "failed to restore stock"
                );
            }
        }
    }

    /// All orders, or one user's, newest first
    #[instrument(skip(self))]
    pub async fn list_orders(&self, user_id: Option<&str>) -> Result<Vec<Order>, ServiceError> {
        match user_id {
            Some(user_id) => self.orders.find_by_user(user_id).await,
            None => self.orders.find_all().await,
        }
    }

    /// Get an order by ID
    #[instrument(skip(self))]
    pub async fn get_order(&self, order_id: &str) -> Result<Order, ServiceError> {
        self.load(order_id).await
    }

    /// Administrative fulfilment status change
    #[instrument(skip(self))]
    pub async fn update_order_status(
        &self,
        order_id: &str,
        new_status: OrderStatus,
    ) -> Result<Order, ServiceError> {
        self.with_order_lock(order_id, || async {
            let mut order = self.load(order_id).await?;
            let old_status = order.order_status;

            if self.enforce_status_transitions && !old_status.can_transition_to(new_status) {
                return Err(ServiceError::Conflict(format!(
                    "Cannot change order status from {} to {}",
                    old_status, new_status
                )));
            }

            order.order_status = new_status;
            self.orders.save(&order).await?;

            self.event_sender
                .send_or_log(Event::OrderStatusChanged {
                    order_id: order.id.clone(),
                    old_status,
                    new_status,
                })
                .await;

            info!(%order_id, %old_status, %new_status, "Order status updated");
            Ok(order)
        })
        .await
    }
}
