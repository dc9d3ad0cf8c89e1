// server/src/sagas/mod.rs

//! Multi-step workflows, registered once at startup and run by context type.

use crate::errors::AppError;
use souk_flow::SagaRegistry;

pub mod checkout;
pub mod contexts;
pub mod payment_intent;
pub mod signup;
pub mod webhook;

pub fn register_all(registry: &SagaRegistry<AppError>) {
  signup::register_signup_saga(registry);
  checkout::register_checkout_saga(registry);
  payment_intent::register_payment_intent_saga(registry);
  webhook::register_webhook_saga(registry);
  tracing::info!("All application sagas registered.");
}
