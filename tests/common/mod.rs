#![allow(dead_code)]

use axum::{
    body::{to_bytes, Body},
    http::{Method, Request, StatusCode},
    response::Response,
    Router,
};
use serde_json::{json, Value};
use storefront_api::{
    build_router, build_state,
    config::{AppConfig, DEV_DEFAULT_PAYMENT_SECRET},
    seed::ADMIN_EMAIL,
    services::payments::HmacPaymentGateway,
    AppState,
};
use tower::ServiceExt;
use uuid::Uuid;

pub const ADMIN_PASSWORD: &str = "admin123";

/// Helper harness for driving the full router against a fresh in-memory store.
pub struct TestApp {
    router: Router,
    pub state: AppState,
}

/// A registered customer
pub struct Customer {
    pub id: String,
    pub token: String,
}

impl TestApp {
    /// Construct a new test application with seeded admin and catalog.
    pub async fn new() -> Self {
        Self::with_config(AppConfig::default()).await
    }

    pub async fn with_config(config: AppConfig) -> Self {
        let state = build_state(config)
            .await
            .expect("failed to build application state");
        let router = build_router(state.clone());
        Self { router, state }
    }

    /// Send a request against the router with an optional bearer token.
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        token: Option<&str>,
    ) -> Response {
        self.request_with_headers(method, uri, body, token, &[]).await
    }

    pub async fn request_with_headers(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        token: Option<&str>,
        headers: &[(&str, &str)],
    ) -> Response {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(tok) = token {
            builder = builder.header("authorization", format!("Bearer {}", tok));
        }
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        let body = if let Some(json) = body {
            builder = builder.header("content-type", "application/json");
            Body::from(serde_json::to_vec(&json).expect("failed to serialize json request body"))
        } else {
            Body::empty()
        };
        let request = builder.body(body).expect("failed to build request");
        self.send(request).await
    }

    /// Send a prebuilt request, for bodies the JSON helpers cannot express.
    pub async fn send(&self, request: Request<Body>) -> Response {
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request")
    }

    /// Request and decode the JSON body in one go.
    pub async fn call(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        token: Option<&str>,
    ) -> (StatusCode, Value) {
        let response = self.request(method, uri, body, token).await;
        let status = response.status();
        (status, response_json(response).await)
    }

    pub async fn admin_token(&self) -> String {
        let (status, body) = self
            .call(
                Method::POST,
                "/api/auth/login",
                Some(json!({ "email": ADMIN_EMAIL, "password": ADMIN_PASSWORD })),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::OK, "admin login failed: {body}");
        body["token"].as_str().expect("token").to_string()
    }

    /// Register a fresh customer with a unique email.
    pub async fn customer(&self) -> Customer {
        let email = format!("shopper-{}@example.com", Uuid::new_v4().simple());
        let (status, body) = self
            .call(
                Method::POST,
                "/api/auth/register",
                Some(json!({ "name": "Shopper", "email": email, "password": "hunter22" })),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::OK, "registration failed: {body}");
        Customer {
            id: body["id"].as_str().expect("id").to_string(),
            token: body["token"].as_str().expect("token").to_string(),
        }
    }

    /// Create a product through the admin API and return its id.
    pub async fn create_product(&self, admin: &str, name: &str, price: f64, stock: i64) -> String {
        let (status, body) = self
            .call(
                Method::POST,
                "/api/products",
                Some(json!({
                    "name": name,
                    "description": "Created by the integration tests",
                    "price": price,
                    "stock": stock,
                    "category": "Test",
                    "isActive": true,
                    "images": []
                })),
                Some(admin),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "product creation failed: {body}");
        body["id"].as_str().expect("id").to_string()
    }

    pub async fn stock_of(&self, product_id: &str) -> i64 {
        let (status, body) = self
            .call(Method::GET, &format!("/api/products/{product_id}"), None, None)
            .await;
        assert_eq!(status, StatusCode::OK);
        body["stock"].as_i64().expect("stock")
    }

    /// Place an order for `(product_id, quantity)` lines with a declared total.
    pub async fn place_order(
        &self,
        token: &str,
        lines: &[(&str, i64)],
        declared_total: f64,
    ) -> (StatusCode, Value) {
        let items: Vec<Value> = lines
            .iter()
            .map(|(id, quantity)| json!({ "productId": id, "quantity": quantity, "price": 0.01 }))
            .collect();
        self.call(
            Method::POST,
            "/api/orders",
            Some(json!({
                "items": items,
                "totalAmount": declared_total,
                "address": address()
            })),
            Some(token),
        )
        .await
    }

    /// Open the gateway intent bound to `order_id` and return its id.
    pub async fn open_intent(&self, token: &str, order_id: &str) -> String {
        let (status, intent) = self
            .call(
                Method::POST,
                &format!("/api/orders/{order_id}/payment-intent"),
                None,
                Some(token),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "intent creation failed: {intent}");
        intent["id"].as_str().expect("intent id").to_string()
    }

    /// Finalize with a correctly signed payment for `intent_id`.
    pub async fn finalize(
        &self,
        token: &str,
        order_id: &str,
        intent_id: &str,
        payment_id: &str,
    ) -> (StatusCode, Value) {
        self.call(
            Method::POST,
            &format!("/api/orders/{order_id}/finalize"),
            Some(json!({
                "intentId": intent_id,
                "paymentId": payment_id,
                "signature": sign(intent_id, payment_id)
            })),
            Some(token),
        )
        .await
    }
}

pub fn address() -> Value {
    json!({
        "fullName": "Ada Lovelace",
        "street": "1 Analytical Way",
        "city": "London",
        "state": "LDN",
        "zipCode": "N1 9GU",
        "country": "UK"
    })
}

/// Signature the payment gateway issues for a captured payment.
pub fn sign(intent_id: &str, payment_id: &str) -> String {
    HmacPaymentGateway::sign(DEV_DEFAULT_PAYMENT_SECRET, intent_id, payment_id)
        .expect("signing never fails for a valid key")
}

pub async fn response_json(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("failed to read response body");
    if bytes.is_empty() {
        return Value::Null;
    }
    serde_json::from_slice(&bytes).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into()))
}
