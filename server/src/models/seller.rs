// server/src/models/seller.rs

use crate::models::comment::RatingSummary;
use crate::models::pagination::PageParams;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Shop profile of a seller account. Products reference the owning user,
/// not this row.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Seller {
  pub id: Uuid,
  pub user_id: Uuid,
  pub shop_name: String,
  pub description: Option<String>,
  pub siret: String,
  pub is_verified: bool,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewSeller {
  pub user_id: Uuid,
  pub shop_name: String,
  pub description: Option<String>,
  pub siret: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SellerPatch {
  pub shop_name: Option<String>,
  pub description: Option<String>,
}

impl SellerPatch {
  pub fn apply(&self, seller: &mut Seller) {
    if let Some(shop_name) = &self.shop_name {
      seller.shop_name = shop_name.clone();
    }
    if let Some(description) = &self.description {
      seller.description = Some(description.clone());
    }
  }
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct SellerWithStats {
  #[serde(flatten)]
  #[sqlx(flatten)]
  pub seller: Seller,
  /// Active products only.
  pub total_products: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SellerDetail {
  #[serde(flatten)]
  pub seller: Seller,
  pub total_products: i64,
  #[serde(flatten)]
  pub rating: RatingSummary,
}

#[derive(Debug, Clone, Default)]
pub struct SellerQuery {
  pub verified: Option<bool>,
  pub page: PageParams,
}

/// French business registration number: exactly 14 digits.
pub fn is_siret(value: &str) -> bool {
  value.len() == 14 && value.chars().all(|c| c.is_ascii_digit())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn siret_is_fourteen_digits() {
    assert!(is_siret("12345678901234"));
    assert!(!is_siret("1234567890123"));
    assert!(!is_siret("1234567890123a"));
    assert!(!is_siret(" 12345678901234"));
  }
}
