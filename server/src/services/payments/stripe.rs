// server/src/services/payments/stripe.rs

use super::{PaymentGateway, PaymentIntent, PaymentIntentRequest};
use crate::config::{Secret, StripeConfig};
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tracing::{info, instrument};

const SERVICE: &str = "stripe";

pub struct StripeGateway {
  client: reqwest::Client,
  api_base: String,
  secret_key: Secret,
}

#[derive(Deserialize)]
struct StripePaymentIntent {
  id: String,
  client_secret: String,
  amount: i64,
  currency: String,
  status: String,
}

impl StripeGateway {
  pub fn new(config: &StripeConfig) -> Result<Self> {
    let client = reqwest::Client::builder()
      .timeout(std::time::Duration::from_secs(15))
      .build()
      .map_err(|e| AppError::Config(format!("Failed to build payment HTTP client: {}", e)))?;
    Ok(Self {
      client,
      api_base: config.api_base.clone(),
      secret_key: config.secret_key.clone(),
    })
  }
}

/// Form fields for `POST /v1/payment_intents`.
fn intent_form(request: &PaymentIntentRequest) -> Vec<(&'static str, String)> {
  vec![
    ("amount", request.amount_cents.to_string()),
    ("currency", request.currency.clone()),
    ("metadata[order_id]", request.order_id.to_string()),
    ("automatic_payment_methods[enabled]", "true".to_string()),
  ]
}

fn upstream(message: impl Into<String>) -> AppError {
  AppError::Upstream {
    service: SERVICE,
    message: message.into(),
  }
}

#[async_trait]
impl PaymentGateway for StripeGateway {
  #[instrument(
    name = "payments::stripe::create_payment_intent",
    skip(self, request),
    fields(order_id = %request.order_id, amount_cents = request.amount_cents)
  )]
  async fn create_payment_intent(&self, request: &PaymentIntentRequest) -> Result<PaymentIntent> {
    let response = self
      .client
      .post(format!("{}/v1/payment_intents", self.api_base))
      .bearer_auth(self.secret_key.expose())
      .header("Idempotency-Key", &request.idempotency_key)
      .form(&intent_form(request))
      .send()
      .await
      .map_err(|e| upstream(e.to_string()))?;

    let status = response.status();
    if !status.is_success() {
      let body = response.json::<Value>().await.unwrap_or(Value::Null);
      let message = body["error"]["message"]
        .as_str()
        .map(str::to_string)
        .unwrap_or_else(|| format!("payment intent creation failed with status {}", status.as_u16()));
      return Err(upstream(message));
    }

    let intent: StripePaymentIntent = response.json().await.map_err(|e| upstream(e.to_string()))?;
    info!(payment_intent_id = %intent.id, "Payment intent created.");
    Ok(PaymentIntent {
      id: intent.id,
      client_secret: intent.client_secret,
      amount_cents: intent.amount,
      currency: intent.currency,
      status: intent.status,
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use uuid::Uuid;

  #[test]
  fn form_carries_order_metadata_and_automatic_methods() {
    let order_id = Uuid::new_v4();
    let form = intent_form(&PaymentIntentRequest {
      order_id,
      amount_cents: 2500,
      currency: "eur".into(),
      idempotency_key: "k".into(),
    });
    assert!(form.contains(&("amount", "2500".to_string())));
    assert!(form.contains(&("metadata[order_id]", order_id.to_string())));
    assert!(form.contains(&("automatic_payment_methods[enabled]", "true".to_string())));
  }
}
