// server/src/models/wishlist.rs

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct WishlistItem {
  pub user_id: Uuid,
  pub product_id: Uuid,
  pub added_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct WishlistEntry {
  pub product_id: Uuid,
  pub name: String,
  pub price_cents: i64,
  pub image_url: Option<String>,
  pub added_at: DateTime<Utc>,
}
