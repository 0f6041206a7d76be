use crate::{
    auth::MaybeAuthUser,
    errors::ServiceError,
    handlers::common::{success_response, JsonBody},
    services::commerce::CartOwner,
    AppState,
};
use axum::{
    extract::{Path, State},
    http::HeaderMap,
    response::IntoResponse,
    routing::{get, post, put},
    Router,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Header carrying a guest shopper's device id
pub const GUEST_ID_HEADER: &str = "x-guest-id";

#[derive(Debug, Deserialize, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AddToCartRequest {
    pub product_id: String,
    #[serde(default = "default_quantity")]
    pub quantity: i64,
}

fn default_quantity() -> i64 {
    1
}

#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct UpdateQuantityRequest {
    pub quantity: i64,
}

/// Creates the router for cart endpoints
pub fn cart_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(get_cart).delete(clear_cart))
        .route("/items", post(add_item))
        .route("/items/:product_id", put(update_item).delete(remove_item))
}

/// Signed-in callers use their account cart; anyone else must name a device.
fn cart_owner(caller: MaybeAuthUser, headers: &HeaderMap) -> Result<CartOwner, ServiceError> {
    if let MaybeAuthUser(Some(user)) = caller {
        return Ok(CartOwner::User(user.user_id));
    }
    headers
        .get(GUEST_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(|id| CartOwner::Guest(id.to_string()))
        .ok_or_else(|| {
            ServiceError::Unauthorized(format!(
                "Sign in or send an {} header to use a cart",
                GUEST_ID_HEADER
            ))
        })
}

/// Get the caller's cart
#[utoipa::path(
    get,
    path = "/api/cart",
    responses(
        (status = 200, description = "Cart contents", body = crate::models::CartView),
        (status = 401, description = "No user or guest id", body = crate::errors::ErrorResponse)
    ),
    tag = "Cart"
)]
pub async fn get_cart(
    caller: MaybeAuthUser,
    headers: HeaderMap,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, ServiceError> {
    let owner = cart_owner(caller, &headers)?;
    Ok(success_response(state.services.cart.get_cart(&owner).await?))
}

/// Add a product to the cart
#[utoipa::path(
    post,
    path = "/api/cart/items",
    request_body = AddToCartRequest,
    responses(
        (status = 200, description = "Updated cart", body = crate::models::CartView),
        (status = 400, description = "Invalid quantity", body = crate::errors::ErrorResponse),
        (status = 404, description = "Product not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Unavailable or insufficient stock", body = crate::errors::ErrorResponse)
    ),
    tag = "Cart"
)]
pub async fn add_item(
    caller: MaybeAuthUser,
    headers: HeaderMap,
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<AddToCartRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let owner = cart_owner(caller, &headers)?;
    let cart = state
        .services
        .cart
        .add_item(&owner, &payload.product_id, payload.quantity)
        .await?;
    Ok(success_response(cart))
}

/// Set a line's quantity; zero removes it
#[utoipa::path(
    put,
    path = "/api/cart/items/{product_id}",
    params(("product_id" = String, Path, description = "Product ID")),
    request_body = UpdateQuantityRequest,
    responses(
        (status = 200, description = "Updated cart", body = crate::models::CartView),
        (status = 404, description = "No such cart line", body = crate::errors::ErrorResponse),
        (status = 409, description = "Insufficient stock", body = crate::errors::ErrorResponse)
    ),
    tag = "Cart"
)]
pub async fn update_item(
    caller: MaybeAuthUser,
    headers: HeaderMap,
    State(state): State<AppState>,
    Path(product_id): Path<String>,
    JsonBody(payload): JsonBody<UpdateQuantityRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let owner = cart_owner(caller, &headers)?;
    let cart = state
        .services
        .cart
        .update_quantity(&owner, &product_id, payload.quantity)
        .await?;
    Ok(success_response(cart))
}

/// Remove a line from the cart
#[utoipa::path(
    delete,
    path = "/api/cart/items/{product_id}",
    params(("product_id" = String, Path, description = "Product ID")),
    responses(
        (status = 200, description = "Updated cart", body = crate::models::CartView)
    ),
    tag = "Cart"
)]
pub async fn remove_item(
    caller: MaybeAuthUser,
    headers: HeaderMap,
    State(state): State<AppState>,
    Path(product_id): Path<String>,
) -> Result<impl IntoResponse, ServiceError> {
    let owner = cart_owner(caller, &headers)?;
    let cart = state.services.cart.remove_item(&owner, &product_id).await?;
    Ok(success_response(cart))
}

/// Empty the cart
#[utoipa::path(
    delete,
    path = "/api/cart",
    responses(
        (status = 200, description = "Empty cart", body = crate::models::CartView)
    ),
    tag = "Cart"
)]
pub async fn clear_cart(
    caller: MaybeAuthUser,
    headers: HeaderMap,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, ServiceError> {
    let owner = cart_owner(caller, &headers)?;
    Ok(success_response(state.services.cart.clear(&owner).await?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{auth::AuthUser, models::Role};
    use assert_matches::assert_matches;
    use axum::http::HeaderValue;

    #[test]
    fn signed_in_caller_wins_over_guest_header() {
        let mut headers = HeaderMap::new();
        headers.insert(GUEST_ID_HEADER, HeaderValue::from_static("device-9"));
        let user = AuthUser {
            user_id: "u1".into(),
            name: "Ada".into(),
            email: "ada@example.com".into(),
            role: Role::Customer,
            token_id: "t".into(),
        };

        let owner = cart_owner(MaybeAuthUser(Some(user)), &headers).unwrap();
        assert_eq!(owner, CartOwner::User("u1".into()));

        let owner = cart_owner(MaybeAuthUser(None), &headers).unwrap();
        assert_eq!(owner, CartOwner::Guest("device-9".into()));
    }

    #[test]
    fn anonymous_without_device_id_is_unauthorized() {
        let mut headers = HeaderMap::new();
        headers.insert(GUEST_ID_HEADER, HeaderValue::from_static("  "));
        assert_matches!(
            cart_owner(MaybeAuthUser(None), &headers),
            Err(ServiceError::Unauthorized(_))
        );
    }
}
