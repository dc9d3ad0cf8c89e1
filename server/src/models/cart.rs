// server/src/models/cart.rs

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

/// Largest quantity a single cart line may hold, merged adds included.
pub const MAX_LINE_QUANTITY: i32 = 999;

/// One cart per user, created on the first add and kept when emptied.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Cart {
  pub id: Uuid,
  pub user_id: Uuid,
  pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, FromRow)]
pub struct CartLine {
  pub cart_id: Uuid,
  pub product_id: Uuid,
  pub quantity: i32,
  pub added_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CartLineView {
  pub product_id: Uuid,
  pub name: String,
  pub unit_price_cents: i64,
  pub quantity: i32,
  pub subtotal_cents: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CartView {
  pub cart_id: Option<Uuid>,
  pub lines: Vec<CartLineView>,
  pub total_cents: i64,
}

impl CartView {
  pub fn empty(cart_id: Option<Uuid>) -> Self {
    Self {
      cart_id,
      lines: Vec::new(),
      total_cents: 0,
    }
  }

  pub fn from_lines(cart_id: Uuid, lines: Vec<CartLineView>) -> Self {
    let total_cents = lines.iter().map(|l| l.subtotal_cents).sum();
    Self {
      cart_id: Some(cart_id),
      lines,
      total_cents,
    }
  }
}
