use crate::{
    auth::{AdminUser, AuthUser},
    errors::ServiceError,
    handlers::{
        common::{created_response, success_response, JsonBody, QueryParams},
        payments::IntentResponse,
    },
    models::OrderStatus,
    services::orders::{CreateOrderInput, PaymentConfirmation},
    AppState,
};
use axum::{
    extract::{Path, State},
    response::IntoResponse,
    routing::{get, post, put},
    Router,
};
use serde::{Deserialize, Serialize};
use tracing::info;
use utoipa::{IntoParams, ToSchema};

#[derive(Debug, Default, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct OrderListQuery {
    /// Restrict to one user's orders. Customers may only name themselves.
    pub user_id: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct UpdateStatusRequest {
    pub status: OrderStatus,
}

/// Creates the router for order endpoints
pub fn orders_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(create_order).get(list_orders))
        .route("/:id", get(get_order))
        .route("/:id/payment-intent", post(create_order_payment_intent))
        .route("/:id/finalize", post(finalize_order))
        .route("/:id/status", put(update_order_status))
}

/// Load an order the caller is allowed to see
async fn owned_order(
    state: &AppState,
    user: &AuthUser,
    order_id: &str,
) -> Result<crate::models::Order, ServiceError> {
    let order = state.services.orders.get_order(order_id).await?;
    if !user.can_access(&order.user_id) {
        return Err(ServiceError::Forbidden(
            "You do not have access to this order".to_string(),
        ));
    }
    Ok(order)
}

/// Place a pending order
#[utoipa::path(
    post,
    path = "/api/orders",
    request_body = CreateOrderInput,
    responses(
        (status = 201, description = "Pending order created", body = crate::models::Order),
        (status = 400, description = "Invalid request", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 404, description = "Unknown product", body = crate::errors::ErrorResponse),
        (status = 409, description = "Product unavailable or out of stock", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Orders"
)]
pub async fn create_order(
    user: AuthUser,
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<CreateOrderInput>,
) -> Result<impl IntoResponse, ServiceError> {
    let order = state
        .services
        .orders
        .create_pending_order(&user.user_id, payload)
        .await?;
    Ok(created_response(order))
}

/// Open a payment intent for an order's total
#[utoipa::path(
    post,
    path = "/api/orders/{id}/payment-intent",
    params(("id" = String, Path, description = "Order ID")),
    responses(
        (status = 201, description = "Intent opened", body = IntentResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Order is not awaiting payment", body = crate::errors::ErrorResponse),
        (status = 503, description = "Payment gateway unavailable", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Orders"
)]
pub async fn create_order_payment_intent(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ServiceError> {
    owned_order(&state, &user, &id).await?;
    let intent = state
        .services
        .orders
        .create_payment_intent_for_order(&id)
        .await?;
    Ok(created_response(IntentResponse::new(
        intent,
        state.services.payments.key_id(),
    )))
}

/// Verify payment and finalize an order
#[utoipa::path(
    post,
    path = "/api/orders/{id}/finalize",
    params(("id" = String, Path, description = "Order ID")),
    request_body = PaymentConfirmation,
    responses(
        (status = 200, description = "Order paid (or already paid)", body = crate::models::Order),
        (status = 400, description = "Missing payment details", body = crate::errors::ErrorResponse),
        (status = 402, description = "Payment verification failed", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Stock lost; order cancelled", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Orders"
)]
pub async fn finalize_order(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
    JsonBody(payload): JsonBody<PaymentConfirmation>,
) -> Result<impl IntoResponse, ServiceError> {
    // Missing orders are reported by finalization itself, after the
    // payment details are checked.
    match owned_order(&state, &user, &id).await {
        Err(err) if !err.is_not_found() => return Err(err),
        _ => {}
    }
    let order = state.services.orders.finalize_order(&id, payload).await?;
    Ok(success_response(order))
}

/// List orders, newest first
#[utoipa::path(
    get,
    path = "/api/orders",
    params(OrderListQuery),
    responses(
        (status = 200, description = "Orders", body = [crate::models::Order]),
        (status = 403, description = "Listing another user's orders", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Orders"
)]
pub async fn list_orders(
    user: AuthUser,
    State(state): State<AppState>,
    QueryParams(query): QueryParams<OrderListQuery>,
) -> Result<impl IntoResponse, ServiceError> {
    let user_id = match query.user_id {
        Some(requested) if !user.can_access(&requested) => {
            return Err(ServiceError::Forbidden(
                "You may only list your own orders".to_string(),
            ));
        }
        Some(requested) => Some(requested),
        None if user.is_admin() => None,
        None => Some(user.user_id.clone()),
    };
    let orders = state.services.orders.list_orders(user_id.as_deref()).await?;
    Ok(success_response(orders))
}

/// Get an order by ID
#[utoipa::path(
    get,
    path = "/api/orders/{id}",
    params(("id" = String, Path, description = "Order ID")),
    responses(
        (status = 200, description = "Order found", body = crate::models::Order),
        (status = 403, description = "Not the owner", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Orders"
)]
pub async fn get_order(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ServiceError> {
    Ok(success_response(owned_order(&state, &user, &id).await?))
}

/// Change an order's fulfilment status
#[utoipa::path(
    put,
    path = "/api/orders/{id}/status",
    params(("id" = String, Path, description = "Order ID")),
    request_body = UpdateStatusRequest,
    responses(
        (status = 200, description = "Status updated", body = crate::models::Order),
        (status = 403, description = "Forbidden", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Orders"
)]
pub async fn update_order_status(
    AdminUser(admin): AdminUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
    JsonBody(payload): JsonBody<UpdateStatusRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let order = state
        .services
        .orders
        .update_order_status(&id, payload.status)
        .await?;
    info!(order_id = %id, admin = %admin.user_id, status = %order.order_status, "order status changed via API");
    Ok(success_response(order))
}
