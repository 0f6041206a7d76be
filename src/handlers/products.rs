use crate::{
    auth::{AdminUser, MaybeAuthUser},
    errors::ServiceError,
    handlers::common::{created_response, success_response, JsonBody, MessageResponse, QueryParams},
    models::{ProductFilter, ProductUpdate},
    services::commerce::{CreateProductInput, ImageUpload},
    AppState,
};
use axum::{
    extract::{Multipart, Path, State},
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use tracing::info;
use utoipa::ToSchema;

/// URLs of accepted uploads, in upload order
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UploadResponse {
    pub urls: Vec<String>,
}

/// Creates the router for product endpoints
pub fn products_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_products).post(create_product))
        .route("/images", post(upload_images))
        .route(
            "/:id",
            get(get_product).put(update_product).delete(delete_product),
        )
}

/// List products
#[utoipa::path(
    get,
    path = "/api/products",
    params(ProductFilter),
    responses(
        (status = 200, description = "One page of products", body = crate::models::ProductPage),
        (status = 400, description = "Invalid paging", body = crate::errors::ErrorResponse)
    ),
    tag = "Products"
)]
pub async fn list_products(
    MaybeAuthUser(caller): MaybeAuthUser,
    State(state): State<AppState>,
    QueryParams(mut filter): QueryParams<ProductFilter>,
) -> Result<impl IntoResponse, ServiceError> {
    // Inactive products are an admin-only view.
    if !caller.as_ref().is_some_and(|user| user.is_admin()) {
        filter.include_inactive = false;
    }
    let page = state.services.product_catalog.list_products(filter).await?;
    Ok(success_response(page))
}

/// Get a product by ID
#[utoipa::path(
    get,
    path = "/api/products/{id}",
    params(("id" = String, Path, description = "Product ID")),
    responses(
        (status = 200, description = "Product found", body = crate::models::Product),
        (status = 404, description = "Product not found", body = crate::errors::ErrorResponse)
    ),
    tag = "Products"
)]
pub async fn get_product(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ServiceError> {
    let product = state.services.product_catalog.get_product(&id).await?;
    Ok(success_response(product))
}

/// Create a new product
#[utoipa::path(
    post,
    path = "/api/products",
    request_body = CreateProductInput,
    responses(
        (status = 201, description = "Product created", body = crate::models::Product),
        (status = 400, description = "Invalid payload", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 403, description = "Forbidden", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Products"
)]
pub async fn create_product(
    AdminUser(admin): AdminUser,
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<CreateProductInput>,
) -> Result<impl IntoResponse, ServiceError> {
    let product = state.services.product_catalog.create_product(payload).await?;
    info!(product_id = %product.id, admin = %admin.user_id, "product created via API");
    Ok(created_response(product))
}

/// Update a product
#[utoipa::path(
    put,
    path = "/api/products/{id}",
    params(("id" = String, Path, description = "Product ID")),
    request_body = ProductUpdate,
    responses(
        (status = 200, description = "Product updated", body = crate::models::Product),
        (status = 400, description = "Invalid payload", body = crate::errors::ErrorResponse),
        (status = 403, description = "Forbidden", body = crate::errors::ErrorResponse),
        (status = 404, description = "Product not found", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Products"
)]
pub async fn update_product(
    AdminUser(_admin): AdminUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
    JsonBody(payload): JsonBody<ProductUpdate>,
) -> Result<impl IntoResponse, ServiceError> {
    let product = state
        .services
        .product_catalog
        .update_product(&id, payload)
        .await?;
    Ok(success_response(product))
}

/// Delete a product
#[utoipa::path(
    delete,
    path = "/api/products/{id}",
    params(("id" = String, Path, description = "Product ID")),
    responses(
        (status = 200, description = "Product deleted", body = MessageResponse),
        (status = 403, description = "Forbidden", body = crate::errors::ErrorResponse),
        (status = 404, description = "Product not found", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Products"
)]
pub async fn delete_product(
    AdminUser(_admin): AdminUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ServiceError> {
    state.services.product_catalog.delete_product(&id).await?;
    Ok(success_response(MessageResponse::new("Product removed")))
}

/// Upload product images (multipart, any field name)
#[utoipa::path(
    post,
    path = "/api/products/images",
    responses(
        (status = 200, description = "Hosted image URLs", body = UploadResponse),
        (status = 400, description = "A file is not an image", body = crate::errors::ErrorResponse),
        (status = 403, description = "Forbidden", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Products"
)]
pub async fn upload_images(
    AdminUser(_admin): AdminUser,
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, ServiceError> {
    let mut files = Vec::new();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ServiceError::InvalidInput(e.body_text()))?
    {
        let file_name = field
            .file_name()
            .or_else(|| field.name())
            .unwrap_or("upload")
            .to_string();
        let content_type = field.content_type().map(str::to_string);
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ServiceError::InvalidInput(e.body_text()))?;
        files.push(ImageUpload {
            file_name,
            content_type,
            size: bytes.len(),
        });
    }

    let urls = state.services.product_catalog.upload_images(files).await?;
    Ok(success_response(UploadResponse { urls }))
}
