// server/src/services/payments/mod.rs

pub mod mock;
pub mod stripe;

use crate::errors::Result;
use async_trait::async_trait;
use uuid::Uuid;

pub use mock::MockPaymentGateway;
pub use stripe::StripeGateway;

#[derive(Debug, Clone)]
pub struct PaymentIntentRequest {
  pub order_id: Uuid,
  pub amount_cents: i64,
  pub currency: String,
  /// Forwarded to the processor so a retried request returns the same intent.
  pub idempotency_key: String,
}

#[derive(Debug, Clone)]
pub struct PaymentIntent {
  pub id: String,
  pub client_secret: String,
  pub amount_cents: i64,
  pub currency: String,
  pub status: String,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
  async fn create_payment_intent(&self, request: &PaymentIntentRequest) -> Result<PaymentIntent>;
}
