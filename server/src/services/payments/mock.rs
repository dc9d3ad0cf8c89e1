// server/src/services/payments/mock.rs

use super::{PaymentGateway, PaymentIntent, PaymentIntentRequest};
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use tracing::{info, instrument};
use uuid::Uuid;

/// In-process processor double. Repeated idempotency keys return the
/// intent created first, like the real processor.
#[derive(Default)]
pub struct MockPaymentGateway {
  intents: Mutex<HashMap<String, PaymentIntent>>,
  requests: Mutex<Vec<PaymentIntentRequest>>,
  failure: Option<String>,
}

impl MockPaymentGateway {
  pub fn new() -> Self {
    Self::default()
  }

  /// A gateway that declines every request with `message`.
  pub fn failing(message: impl Into<String>) -> Self {
    Self {
      failure: Some(message.into()),
      ..Self::default()
    }
  }

  pub fn requests(&self) -> Vec<PaymentIntentRequest> {
    self.requests.lock().clone()
  }
}

#[async_trait]
impl PaymentGateway for MockPaymentGateway {
  #[instrument(name = "payments::mock::create_payment_intent", skip(self, request), fields(order_id = %request.order_id))]
  async fn create_payment_intent(&self, request: &PaymentIntentRequest) -> Result<PaymentIntent> {
    self.requests.lock().push(request.clone());
    if let Some(message) = &self.failure {
      return Err(AppError::Upstream {
        service: "stripe",
        message: message.clone(),
      });
    }

    let mut intents = self.intents.lock();
    let intent = intents
      .entry(request.idempotency_key.clone())
      .or_insert_with(|| {
        let id = format!("mock_pi_{}", Uuid::new_v4().simple());
        PaymentIntent {
          client_secret: format!("{}_secret_{}", id, Uuid::new_v4().simple()),
          id,
          amount_cents: request.amount_cents,
          currency: request.currency.clone(),
          status: "requires_payment_method".to_string(),
        }
      })
      .clone();
    info!(payment_intent_id = %intent.id, "Mock payment intent issued.");
    Ok(intent)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn request(key: &str) -> PaymentIntentRequest {
    PaymentIntentRequest {
      order_id: Uuid::new_v4(),
      amount_cents: 1999,
      currency: "eur".into(),
      idempotency_key: key.into(),
    }
  }

  #[tokio::test]
  async fn same_key_returns_same_intent() {
    let gateway = MockPaymentGateway::new();
    let first = gateway.create_payment_intent(&request("a")).await.unwrap();
    let again = gateway.create_payment_intent(&request("a")).await.unwrap();
    let other = gateway.create_payment_intent(&request("b")).await.unwrap();

    assert_eq!(first.id, again.id);
    assert_ne!(first.id, other.id);
    assert!(first.client_secret.starts_with(&first.id));
    assert_eq!(gateway.requests().len(), 3);
  }

  #[tokio::test]
  async fn failing_gateway_reports_upstream_error() {
    let gateway = MockPaymentGateway::failing("card_declined");
    let err = gateway.create_payment_intent(&request("a")).await.unwrap_err();
    assert!(matches!(err, AppError::Upstream { service: "stripe", .. }));
  }
}
