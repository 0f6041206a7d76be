use crate::{
    circuit_breaker::{CircuitBreaker, CircuitBreakerError},
    errors::ServiceError,
};
use async_trait::async_trait;
use hmac::{Hmac, Mac};
use rand::{distributions::Alphanumeric, Rng};
use rust_decimal::{prelude::ToPrimitive, Decimal};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::{sync::Arc, time::Duration};
use tracing::{info, instrument, warn};
use utoipa::ToSchema;

type HmacSha256 = Hmac<Sha256>;

/// A payment intent opened with the gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PaymentIntent {
    #[schema(example = "order_9xKq2mB7aLw0Pz")]
    pub id: String,
    /// Amount in minor currency units.
    #[schema(example = 2000)]
    pub amount: i64,
    pub currency: String,
}

/// The external payment gateway seam.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_intent(
        &self,
        amount_minor: i64,
        currency: &str,
    ) -> Result<PaymentIntent, ServiceError>;

    /// Whether `signature` proves the gateway captured `payment_id` against `intent_id`.
    async fn verify_signature(
        &self,
        intent_id: &str,
        payment_id: &str,
        signature: &str,
    ) -> Result<bool, ServiceError>;
}

/// Gateway that signs `"{intent}|{payment}"` with HMAC-SHA256 under a shared
/// secret, the scheme hosted checkout widgets use to hand results back.
pub struct HmacPaymentGateway {
    secret: String,
    latency: Duration,
}

impl HmacPaymentGateway {
    pub fn new(secret: impl Into<String>, latency: Duration) -> Self {
        Self {
            secret: secret.into(),
            latency,
        }
    }

    fn mac(secret: &str, intent_id: &str, payment_id: &str) -> Result<HmacSha256, ServiceError> {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
            .map_err(|e| ServiceError::InternalError(format!("invalid payment secret: {}", e)))?;
        mac.update(format!("{}|{}", intent_id, payment_id).as_bytes());
        Ok(mac)
    }

    /// Hex signature the gateway would issue for a captured payment.
    pub fn sign(secret: &str, intent_id: &str, payment_id: &str) -> Result<String, ServiceError> {
        let mac = Self::mac(secret, intent_id, payment_id)?;
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    async fn simulate_latency(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }
}

#[async_trait]
impl PaymentGateway for HmacPaymentGateway {
    async fn create_intent(
        &self,
        amount_minor: i64,
        currency: &str,
    ) -> Result<PaymentIntent, ServiceError> {
        self.simulate_latency().await;
        let suffix: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(14)
            .map(char::from)
            .collect();
        Ok(PaymentIntent {
            id: format!("order_{}", suffix),
            amount: amount_minor,
            currency: currency.to_string(),
        })
    }

    async fn verify_signature(
        &self,
        intent_id: &str,
        payment_id: &str,
        signature: &str,
    ) -> Result<bool, ServiceError> {
        self.simulate_latency().await;
        let Ok(provided) = hex::decode(signature) else {
            return Ok(false);
        };
        let mac = Self::mac(&self.secret, intent_id, payment_id)?;
        Ok(mac.verify_slice(&provided).is_ok())
    }
}

/// Payment service: validates requests and guards gateway calls with a
/// circuit breaker.
#[derive(Clone)]
pub struct PaymentService {
    gateway: Arc<dyn PaymentGateway>,
    breaker: Arc<CircuitBreaker>,
    default_currency: String,
    key_id: String,
}

impl PaymentService {
    pub fn new(
        gateway: Arc<dyn PaymentGateway>,
        breaker: Arc<CircuitBreaker>,
        default_currency: impl Into<String>,
        key_id: impl Into<String>,
    ) -> Self {
        Self {
            gateway,
            breaker,
            default_currency: default_currency.into(),
            key_id: key_id.into(),
        }
    }

    /// Public gateway key handed to checkout clients
    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    /// Open an intent for `amount` (major units, converted to minor units)
    #[instrument(skip(self))]
    pub async fn create_intent(
        &self,
        amount: Decimal,
        currency: Option<&str>,
    ) -> Result<PaymentIntent, ServiceError> {
        if amount <= Decimal::ZERO {
            return Err(ServiceError::InvalidInput("Invalid amount".to_string()));
        }
        let amount_minor = amount
            .checked_mul(Decimal::ONE_HUNDRED)
            .and_then(|minor| minor.round().to_i64())
            .ok_or_else(|| ServiceError::InvalidInput("Invalid amount".to_string()))?;
        let currency = currency
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .unwrap_or(&self.default_currency)
            .to_ascii_uppercase();

        let intent = self
            .guarded(|| self.gateway.create_intent(amount_minor, &currency))
            .await?;

        info!(intent_id = %intent.id, amount_minor, %currency, "Payment intent created");
        Ok(intent)
    }

    /// Check a payment signature. All three inputs are required.
    #[instrument(skip(self, signature))]
    pub async fn verify(
        &self,
        intent_id: &str,
        payment_id: &str,
        signature: &str,
    ) -> Result<bool, ServiceError> {
        if [intent_id, payment_id, signature]
            .iter()
            .any(|v| v.trim().is_empty())
        {
            return Err(ServiceError::InvalidInput(
                "Missing payment verification parameters".to_string(),
            ));
        }

        let valid = self
            .guarded(|| self.gateway.verify_signature(intent_id, payment_id, signature))
            .await?;
        if !valid {
            warn!(%intent_id, %payment_id, "payment signature rejected");
        }
        Ok(valid)
    }

    async fn guarded<F, Fut, R>(&self, call: F) -> Result<R, ServiceError>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<R, ServiceError>>,
    {
        let is_outage = |err: &ServiceError| err.status_code().is_server_error();
        self.breaker
            .call_counting(is_outage, call)
            .await
            .map_err(|err| match err {
                CircuitBreakerError::CircuitOpen => {
                    warn!("payment gateway circuit open");
                    ServiceError::CircuitBreakerOpen
                }
                CircuitBreakerError::ServiceFailure(e) => e,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use rstest::rstest;
    use rust_decimal_macros::dec;

    const SECRET: &str = "test_secret";

    fn service_with(gateway: Arc<dyn PaymentGateway>) -> PaymentService {
        PaymentService::new(
            gateway,
            Arc::new(CircuitBreaker::new(2, Duration::from_secs(60), 1)),
            "USD",
            "rzp_test_key",
        )
    }

    fn hmac_service() -> PaymentService {
        service_with(Arc::new(HmacPaymentGateway::new(SECRET, Duration::ZERO)))
    }

    #[rstest]
    #[case(dec!(20), 2000)]
    #[case(dec!(24.99), 2499)]
    #[case(dec!(0.015), 2)]
    #[tokio::test]
    async fn amount_is_converted_to_minor_units(#[case] amount: Decimal, #[case] minor: i64) {
        let intent = hmac_service().create_intent(amount, None).await.unwrap();
        assert_eq!(intent.amount, minor);
        assert_eq!(intent.currency, "USD");
        assert!(intent.id.starts_with("order_"));
        assert_eq!(intent.id.len(), "order_".len() + 14);
    }

    #[rstest]
    #[case(dec!(0))]
    #[case(dec!(-5))]
    #[case(Decimal::MAX)]
    #[case(Decimal::from(i64::MAX))]
    #[tokio::test]
    async fn non_positive_or_oversized_amount_is_invalid(#[case] amount: Decimal) {
        assert_matches!(
            hmac_service().create_intent(amount, Some("inr")).await,
            Err(ServiceError::InvalidInput(_))
        );
    }

    #[tokio::test]
    async fn signature_round_trip() {
        let service = hmac_service();
        let signature = HmacPaymentGateway::sign(SECRET, "order_abc", "pay_1").unwrap();

        assert!(service.verify("order_abc", "pay_1", &signature).await.unwrap());
        assert!(!service.verify("order_abc", "pay_2", &signature).await.unwrap());
        assert!(!service.verify("order_abc", "pay_1", "zz-not-hex").await.unwrap());

        let forged = HmacPaymentGateway::sign("other", "order_abc", "pay_1").unwrap();
        assert!(!service.verify("order_abc", "pay_1", &forged).await.unwrap());
    }

    #[rstest]
    #[case("", "pay", "sig")]
    #[case("order", " ", "sig")]
    #[case("order", "pay", "")]
    #[tokio::test]
    async fn missing_verification_fields_are_invalid(
        #[case] intent: &str,
        #[case] payment: &str,
        #[case] signature: &str,
    ) {
        let mut gateway = MockPaymentGateway::new();
        gateway.expect_verify_signature().never();
        let service = service_with(Arc::new(gateway));

        assert_matches!(
            service.verify(intent, payment, signature).await,
            Err(ServiceError::InvalidInput(_))
        );
    }

    #[tokio::test]
    async fn repeated_gateway_failures_open_the_circuit() {
        let mut gateway = MockPaymentGateway::new();
        gateway
            .expect_create_intent()
            .times(2)
            .returning(|_, _| Err(ServiceError::ServiceUnavailable("gateway down".into())));
        let service = service_with(Arc::new(gateway));

        for _ in 0..2 {
            assert_matches!(
                service.create_intent(dec!(10), None).await,
                Err(ServiceError::ServiceUnavailable(_))
            );
        }
        assert_matches!(
            service.create_intent(dec!(10), None).await,
            Err(ServiceError::CircuitBreakerOpen)
        );
    }
}
