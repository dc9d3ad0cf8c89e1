// server/src/models/category.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Category {
  pub id: Uuid,
  pub name: String,
  pub description: Option<String>,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

/// Create and update body for categories.
#[derive(Debug, Clone, Deserialize)]
pub struct NewCategory {
  pub name: String,
  pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct CategoryWithCounts {
  #[serde(flatten)]
  #[sqlx(flatten)]
  pub category: Category,
  pub total_products: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CategoryDetail {
  #[serde(flatten)]
  pub category: Category,
  pub total_products: i64,
  pub total_sellers: i64,
}
