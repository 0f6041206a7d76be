//! KeyCraft storefront API
//!
//! Catalog, carts, checkout and order management for a small online shop,
//! served over HTTP with axum.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

// Core modules
pub mod auth;
pub mod circuit_breaker;
pub mod config;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod middleware_helpers;
pub mod models;
pub mod openapi;
pub mod repositories;
pub mod seed;
pub mod services;
pub mod store;
pub mod tracing;

use axum::{extract::FromRef, routing::get, Router};
use http::{header, HeaderName, HeaderValue, Method};
use std::{path::Path, sync::Arc};
use tower_http::{
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
};

use crate::{
    auth::AuthService,
    config::AppConfig,
    errors::ServiceError,
    handlers::AppServices,
    store::DocumentStore,
};

/// Capacity of the domain event channel
const EVENT_CHANNEL_CAPACITY: usize = 1024;

// App state definition
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub services: AppServices,
    pub store: Arc<dyn DocumentStore>,
}

impl FromRef<AppState> for Arc<AuthService> {
    fn from_ref(state: &AppState) -> Self {
        state.services.auth.clone()
    }
}

/// Open the configured store, start the event processor and wire services.
///
/// Must be called inside a Tokio runtime.
pub async fn build_state(config: AppConfig) -> Result<AppState, ServiceError> {
    let store = store::open_store(
        config.store_backend,
        Path::new(&config.data_dir),
        config.store_latency(),
    )?;

    let (event_sender, event_rx) = events::channel(EVENT_CHANNEL_CAPACITY);
    tokio::spawn(events::process_events(event_rx));

    let services = AppServices::new(&config, store.clone(), Arc::new(event_sender));

    if config.seed_on_start {
        seed::seed(store.clone(), &services.auth, &config.admin_password).await?;
    }

    Ok(AppState {
        config: Arc::new(config),
        services,
        store,
    })
}

/// All storefront API routes, relative to the API base path
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .nest("/auth", handlers::auth::auth_routes())
        .nest("/products", handlers::products::products_routes())
        .nest("/cart", handlers::cart::cart_routes())
        .nest("/orders", handlers::orders::orders_routes())
        .nest("/payments", handlers::payments::payments_routes())
}

fn cors_layer(config: &AppConfig) -> CorsLayer {
    if config.is_development() {
        return CorsLayer::permissive();
    }
    let origins: Vec<HeaderValue> = config
        .cors_origins()
        .iter()
        .filter_map(|origin| HeaderValue::from_str(origin).ok())
        .collect();
    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            HeaderName::from_static(handlers::cart::GUEST_ID_HEADER),
            HeaderName::from_static(middleware_helpers::request_id::REQUEST_ID_HEADER),
        ])
        .expose_headers(Any)
}

/// Full application router with middleware applied
pub fn build_router(state: AppState) -> Router {
    let base_path = state.config.api_base_path.trim_end_matches('/').to_string();
    let api = if base_path.is_empty() {
        Router::new().merge(api_routes())
    } else {
        Router::new().nest(&base_path, api_routes())
    };

    api.route("/health", get(handlers::health::health_check))
        .merge(openapi::openapi_routes())
        .layer(crate::tracing::http_trace_layer())
        .layer(TimeoutLayer::new(state.config.request_timeout()))
        .layer(cors_layer(&state.config))
        // Outermost, so the id is in scope for every layer above.
        .layer(axum::middleware::from_fn(
            middleware_helpers::request_id::request_id_middleware,
        ))
        .with_state(state)
}
