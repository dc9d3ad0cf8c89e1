// server/src/state.rs

use crate::config::AppConfig;
use crate::errors::{AppError, Result};
use crate::sagas;
use crate::services::identity::IdentityProvider;
use crate::services::mailer::Mailer;
use crate::services::payments::PaymentGateway;
use crate::services::webhooks::WebhookVerifier;
use crate::store::Store;
use souk_flow::SagaRegistry;
use std::sync::Arc;

/// Everything a handler or saga step needs, injected at startup.
#[derive(Clone)]
pub struct AppState {
  pub store: Arc<dyn Store>,
  pub identity: Arc<dyn IdentityProvider>,
  pub payments: Arc<dyn PaymentGateway>,
  pub mailer: Arc<dyn Mailer>,
  pub webhook_verifier: Arc<WebhookVerifier>,
  pub sagas: Arc<SagaRegistry<AppError>>,
  pub config: Arc<AppConfig>,
}

impl AppState {
  /// Builds the state and registers every saga.
  pub fn new(
    config: AppConfig,
    store: Arc<dyn Store>,
    identity: Arc<dyn IdentityProvider>,
    payments: Arc<dyn PaymentGateway>,
    mailer: Arc<dyn Mailer>,
  ) -> Result<Self> {
    let webhook_verifier = WebhookVerifier::new(&config.webhook_secret, config.webhook_tolerance_secs)?;
    let registry = SagaRegistry::<AppError>::new();
    sagas::register_all(&registry);

    Ok(Self {
      store,
      identity,
      payments,
      mailer,
      webhook_verifier: Arc::new(webhook_verifier),
      sagas: Arc::new(registry),
      config: Arc::new(config),
    })
  }
}
