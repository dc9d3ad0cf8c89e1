// server/src/sagas/contexts.rs

//! Data carried through each saga. Handlers receive these wrapped in
//! `souk_flow::ContextData`.

use crate::models::{Cart, CartLine, Order, OrderLine, Registration, User};
use crate::services::payments::PaymentIntent;
use crate::services::webhooks::StripeEvent;
use crate::state::AppState;
use uuid::Uuid;

#[derive(Clone)]
pub struct SignupCtxData {
  pub app_state: AppState,
  pub registration: Registration,
  pub identity_id: Option<Uuid>,
  pub user: Option<User>,
  pub welcome_email_sent: bool,
}

impl SignupCtxData {
  pub fn new(app_state: AppState, registration: Registration) -> Self {
    Self {
      app_state,
      registration,
      identity_id: None,
      user: None,
      welcome_email_sent: false,
    }
  }
}

/// A cart line with the price read during checkout.
#[derive(Debug, Clone)]
pub struct PricedLine {
  pub product_id: Uuid,
  pub product_name: String,
  pub quantity: i32,
  pub unit_price_cents: i64,
}

#[derive(Clone)]
pub struct CheckoutCtxData {
  pub app_state: AppState,
  pub user_id: Uuid,
  pub idempotency_key: Option<Uuid>,

  pub cart: Option<Cart>,
  pub cart_lines: Vec<CartLine>,
  pub priced_lines: Vec<PricedLine>,
  pub total_cents: i64,

  pub order: Option<Order>,
  pub order_lines: Vec<OrderLine>,
  /// Lines removed from the cart, kept so a rollback can put them back.
  pub cleared_lines: Vec<CartLine>,
  /// Set when the idempotency key matched an earlier checkout.
  pub replayed: bool,
}

impl CheckoutCtxData {
  pub fn new(app_state: AppState, user_id: Uuid, idempotency_key: Option<Uuid>) -> Self {
    Self {
      app_state,
      user_id,
      idempotency_key,
      cart: None,
      cart_lines: Vec::new(),
      priced_lines: Vec::new(),
      total_cents: 0,
      order: None,
      order_lines: Vec::new(),
      cleared_lines: Vec::new(),
      replayed: false,
    }
  }
}

#[derive(Clone)]
pub struct PaymentIntentCtxData {
  pub app_state: AppState,
  pub requester: User,
  pub order_id: Uuid,
  pub order: Option<Order>,
  pub order_lines: Vec<OrderLine>,
  pub amount_cents: i64,
  pub intent: Option<PaymentIntent>,
}

impl PaymentIntentCtxData {
  pub fn new(app_state: AppState, requester: User, order_id: Uuid) -> Self {
    Self {
      app_state,
      requester,
      order_id,
      order: None,
      order_lines: Vec::new(),
      amount_cents: 0,
      intent: None,
    }
  }
}

#[derive(Clone)]
pub struct WebhookCtxData {
  pub app_state: AppState,
  pub payload: Vec<u8>,
  pub signature: Option<String>,
  pub event: Option<StripeEvent>,
  pub duplicate: bool,
  pub paid_order_id: Option<Uuid>,
}

impl WebhookCtxData {
  pub fn new(app_state: AppState, payload: Vec<u8>, signature: Option<String>) -> Self {
    Self {
      app_state,
      payload,
      signature,
      event: None,
      duplicate: false,
      paid_order_id: None,
    }
  }
}
