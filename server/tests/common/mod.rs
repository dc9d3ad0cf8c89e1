// tests/common/mod.rs
#![allow(dead_code)]

use actix_web::http::header::AUTHORIZATION;
use actix_web::test::TestRequest;
use once_cell::sync::Lazy;
use serde_json::{json, Value};
use souk::config::AppConfig;
use souk::models::{Category, NewCategory, NewProduct, NewUser, Product, Role, User};
use souk::services::identity::LocalIdentity;
use souk::services::mailer::LogMailer;
use souk::services::payments::MockPaymentGateway;
use souk::state::AppState;
use souk::store::MemoryStore;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::Level;
use uuid::Uuid;

pub const WEBHOOK_SECRET: &str = "whsec_test_secret";
pub const PASSWORD: &str = "correct-horse-battery";

static TRACING: Lazy<()> = Lazy::new(|| {
  let _ = tracing_subscriber::fmt()
    .with_max_level(Level::DEBUG)
    .with_test_writer()
    .try_init();
});

pub fn setup_tracing() {
  Lazy::force(&TRACING);
}

/// Builds an App over `$state` with every route mounted.
macro_rules! init_app {
  ($state:expr) => {
    actix_web::test::init_service(
      actix_web::App::new()
        .app_data(actix_web::web::Data::new($state.clone()))
        .configure(souk::web::configure_app_routes),
    )
    .await
  };
}

pub struct TestApp {
  pub state: AppState,
  pub store: Arc<MemoryStore>,
  pub mailer: Arc<LogMailer>,
  pub payments: Arc<MockPaymentGateway>,
}

/// Development settings plus `extra` overrides.
pub fn test_config_with(extra: &[(&str, &str)]) -> AppConfig {
  let vars: HashMap<String, String> = [
    ("STRIPE_WEBHOOK_SECRET", WEBHOOK_SECRET),
    ("FRONTEND_URL", "http://shop.test"),
    ("PAYMENT_CURRENCY", "eur"),
  ]
  .iter()
  .chain(extra)
  .map(|(k, v)| (k.to_string(), v.to_string()))
  .collect();
  AppConfig::from_map(&vars).expect("test configuration")
}

pub fn test_config() -> AppConfig {
  test_config_with(&[])
}

pub fn test_app() -> TestApp {
  test_app_with(MockPaymentGateway::new())
}

pub fn test_app_with(payments: MockPaymentGateway) -> TestApp {
  test_app_with_config(test_config(), payments)
}

pub fn test_app_with_config(config: AppConfig, payments: MockPaymentGateway) -> TestApp {
  setup_tracing();
  let store = Arc::new(MemoryStore::new());
  let mailer = Arc::new(LogMailer::new("noreply@shop.test"));
  let payments = Arc::new(payments);
  let identity = Arc::new(LocalIdentity::new(store.clone(), mailer.clone()));
  let state = AppState::new(config, store.clone(), identity, payments.clone(), mailer.clone())
    .expect("application state");
  TestApp {
    state,
    store,
    mailer,
    payments,
  }
}

impl TestApp {
  /// Creates an account with `role` and returns it with a bearer token.
  pub async fn user(&self, email: &str, role: Role) -> (User, String) {
    let id = self.state.identity.sign_up(email, PASSWORD).await.expect("sign up");
    let user = self
      .state
      .store
      .insert_user(&NewUser {
        id,
        email: email.to_string(),
        first_name: "Test".to_string(),
        last_name: "User".to_string(),
        phone: None,
        street: None,
        postal_code: None,
        city: None,
        role,
      })
      .await
      .expect("insert user");
    let session = self.state.identity.sign_in(email, PASSWORD).await.expect("sign in");
    (user, session.access_token)
  }

  pub async fn category(&self, name: &str) -> Category {
    self
      .state
      .store
      .insert_category(&NewCategory {
        name: name.to_string(),
        description: None,
      })
      .await
      .expect("insert category")
  }

  pub async fn product(&self, seller_id: Uuid, name: &str, price_cents: i64) -> Product {
    self
      .state
      .store
      .insert_product(&NewProduct {
        seller_id,
        category_id: None,
        name: name.to_string(),
        description: None,
        price_cents,
        stock: 10,
        image_url: None,
      })
      .await
      .expect("insert product")
  }
}

pub fn authed(req: TestRequest, token: &str) -> TestRequest {
  req.insert_header((AUTHORIZATION, format!("Bearer {}", token)))
}

pub fn add_to_cart(token: &str, product_id: Uuid, quantity: i32) -> TestRequest {
  authed(TestRequest::post().uri("/api/cart/items"), token)
    .set_json(json!({ "product_id": product_id, "quantity": quantity }))
}

pub fn payment_succeeded_event(event_id: &str, intent_id: &str, order_id: Uuid) -> Value {
  json!({
    "id": event_id,
    "type": "payment_intent.succeeded",
    "data": { "object": { "id": intent_id, "metadata": { "order_id": order_id.to_string() } } }
  })
}
