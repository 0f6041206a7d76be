use crate::{
    auth::AuthUser,
    errors::ServiceError,
    handlers::common::{created_response, success_response, JsonBody},
    services::payments::PaymentIntent,
    AppState,
};
use axum::{
    extract::State,
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct CreateIntentRequest {
    /// Amount in major units, e.g. 24.99
    #[serde(with = "rust_decimal::serde::float")]
    #[schema(value_type = f64, example = 24.99)]
    pub amount: Decimal,
    /// ISO currency code; the configured default when omitted
    pub currency: Option<String>,
}

/// A payment intent plus the public key the checkout widget needs
#[derive(Debug, Deserialize, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct IntentResponse {
    #[serde(flatten)]
    pub intent: PaymentIntent,
    pub key_id: String,
}

impl IntentResponse {
    pub fn new(intent: PaymentIntent, key_id: &str) -> Self {
        Self {
            intent,
            key_id: key_id.to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PaymentConfigResponse {
    pub key_id: String,
}

/// Creates the router for payment endpoints
pub fn payments_routes() -> Router<AppState> {
    Router::new()
        .route("/intents", post(create_intent))
        .route("/config", get(payment_config))
}

/// Open a payment intent for an arbitrary amount
#[utoipa::path(
    post,
    path = "/api/payments/intents",
    request_body = CreateIntentRequest,
    responses(
        (status = 201, description = "Intent opened", body = IntentResponse),
        (status = 400, description = "Invalid amount", body = crate::errors::ErrorResponse),
        (status = 503, description = "Payment gateway unavailable", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Payments"
)]
pub async fn create_intent(
    _user: AuthUser,
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<CreateIntentRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let intent = state
        .services
        .orders
        .create_payment_intent(payload.amount, payload.currency.as_deref())
        .await?;
    Ok(created_response(IntentResponse::new(
        intent,
        state.services.payments.key_id(),
    )))
}

/// Public gateway configuration for checkout clients
#[utoipa::path(
    get,
    path = "/api/payments/config",
    responses(
        (status = 200, description = "Gateway key id", body = PaymentConfigResponse)
    ),
    tag = "Payments"
)]
pub async fn payment_config(State(state): State<AppState>) -> impl IntoResponse {
    success_response(PaymentConfigResponse {
        key_id: state.services.payments.key_id().to_string(),
    })
}
