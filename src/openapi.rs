use crate::AppState;
use axum::{response::Json, routing::get, Router};
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "KeyCraft Storefront API",
        version = "1.0.0",
        description = r#"
# KeyCraft Storefront API

Catalog, cart, checkout and order management for a small keychain shop.

## Authentication

Most write operations need a bearer token from `/api/auth/login` or
`/api/auth/register`:

```
Authorization: Bearer <token>
```

Anonymous shoppers may keep a cart by sending an `X-Guest-Id` header.

## Checkout

1. `POST /api/orders` places a pending order priced from the catalog.
2. `POST /api/orders/{id}/payment-intent` opens a gateway intent for its total.
3. `POST /api/orders/{id}/finalize` verifies the gateway signature, deducts
   stock and marks the order paid. Repeating it is harmless.

## Errors

Every error has the shape
`{ "error", "message", "code", "request_id", "timestamp" }`.
"#,
        license(name = "MIT")
    ),
    tags(
        (name = "Auth", description = "Login and registration"),
        (name = "Products", description = "Product catalog"),
        (name = "Cart", description = "Shopping carts for users and guests"),
        (name = "Orders", description = "Order placement, payment and fulfilment"),
        (name = "Payments", description = "Payment gateway intents"),
        (name = "Health", description = "Service health"),
    ),
    paths(
        // Auth
        crate::handlers::auth::login,
        crate::handlers::auth::register,
        crate::handlers::auth::current_user,

        // Products
        crate::handlers::products::list_products,
        crate::handlers::products::get_product,
        crate::handlers::products::create_product,
        crate::handlers::products::update_product,
        crate::handlers::products::delete_product,
        crate::handlers::products::upload_images,

        // Cart
        crate::handlers::cart::get_cart,
        crate::handlers::cart::add_item,
        crate::handlers::cart::update_item,
        crate::handlers::cart::remove_item,
        crate::handlers::cart::clear_cart,

        // Orders
        crate::handlers::orders::create_order,
        crate::handlers::orders::create_order_payment_intent,
        crate::handlers::orders::finalize_order,
        crate::handlers::orders::list_orders,
        crate::handlers::orders::get_order,
        crate::handlers::orders::update_order_status,

        // Payments
        crate::handlers::payments::create_intent,
        crate::handlers::payments::payment_config,

        // Health
        crate::handlers::health::health_check,
    ),
    components(
        schemas(
            crate::models::Product,
            crate::models::ProductPage,
            crate::models::ProductUpdate,
            crate::models::CartView,
            crate::models::CartViewItem,
            crate::models::Order,
            crate::models::OrderItem,
            crate::models::OrderStatus,
            crate::models::PaymentStatus,
            crate::models::Address,
            crate::models::Role,
            crate::auth::LoginRequest,
            crate::auth::RegisterRequest,
            crate::auth::AuthSession,
            crate::services::commerce::CreateProductInput,
            crate::services::orders::CreateOrderInput,
            crate::services::orders::OrderLineInput,
            crate::services::orders::PaymentConfirmation,
            crate::services::payments::PaymentIntent,
            crate::handlers::payments::IntentResponse,
            crate::handlers::payments::CreateIntentRequest,
            crate::handlers::payments::PaymentConfigResponse,
            crate::handlers::orders::UpdateStatusRequest,
            crate::handlers::cart::AddToCartRequest,
            crate::handlers::cart::UpdateQuantityRequest,
            crate::handlers::products::UploadResponse,
            crate::handlers::common::MessageResponse,
            crate::handlers::health::HealthResponse,
            crate::errors::ErrorResponse
        )
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

/// Serves the generated document at `/api-docs/openapi.json`
pub fn openapi_routes() -> Router<AppState> {
    Router::new().route(
        "/api-docs/openapi.json",
        get(|| async { Json(ApiDoc::openapi()) }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_checkout_paths_and_bearer_scheme() {
        let json = serde_json::to_string(&ApiDoc::openapi()).unwrap();
        assert!(json.contains("KeyCraft Storefront API"));
        assert!(json.contains("/api/orders/{id}/finalize"));
        assert!(json.contains("bearer_auth"));
    }
}
