pub mod auth;
pub mod cart;
pub mod common;
pub mod health;
pub mod orders;
pub mod payments;
pub mod products;

use crate::{
    auth::{AuthConfig, AuthService},
    circuit_breaker::CircuitBreaker,
    config::AppConfig,
    events::EventSender,
    repositories::{
        DocumentCartRepository, DocumentOrderRepository, DocumentProductRepository,
        DocumentUserRepository,
    },
    services::{
        commerce::{CartService, ProductCatalogService},
        orders::OrderService,
        payments::{HmacPaymentGateway, PaymentService},
    },
    store::{Collection, DocumentStore, InMemoryStore},
};
use std::sync::Arc;

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Services layer that encapsulates business logic used by HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub auth: Arc<AuthService>,
    pub product_catalog: Arc<ProductCatalogService>,
    pub cart: Arc<CartService>,
    pub payments: Arc<PaymentService>,
    pub orders: Arc<OrderService>,
}

impl AppServices {
    /// Wire every service over one document store. Guest carts always live
    /// in memory, whatever the configured backend.
    pub fn new(
        config: &AppConfig,
        store: Arc<dyn DocumentStore>,
        event_sender: Arc<EventSender>,
    ) -> Self {
        let products = Arc::new(DocumentProductRepository::new(store.clone()));
        let user_carts = Arc::new(DocumentCartRepository::new(store.clone()));
        let guest_carts = Arc::new(DocumentCartRepository::in_collection(
            Arc::new(InMemoryStore::with_latency(config.store_latency())),
            Collection::GuestCarts,
        ));

        let auth = Arc::new(AuthService::new(
            AuthConfig::from_app_config(config),
            Arc::new(DocumentUserRepository::new(store.clone())),
        ));
        let product_catalog = Arc::new(ProductCatalogService::new(
            products.clone(),
            event_sender.clone(),
        ));
        let cart = Arc::new(CartService::new(
            user_carts.clone(),
            guest_carts,
            products,
            event_sender.clone(),
        ));
        let payments = Arc::new(PaymentService::new(
            Arc::new(HmacPaymentGateway::new(
                config.payment_key_secret.clone(),
                config.gateway_latency(),
            )),
            Arc::new(CircuitBreaker::new(
                config.circuit_breaker_failure_threshold,
                config.circuit_breaker_timeout(),
                1,
            )
            .named("payment-gateway")),
            config.default_currency.clone(),
            config.payment_key_id.clone(),
        ));
        let orders = Arc::new(
            OrderService::new(
                Arc::new(DocumentOrderRepository::new(store)),
                product_catalog.clone(),
                user_carts,
                payments.clone(),
                event_sender,
            )
            .with_status_transitions(config.enforce_status_transitions),
        );

        Self {
            auth,
            product_catalog,
            cart,
            payments,
            orders,
        }
    }
}
