// server/src/models/product.rs

use crate::errors::{AppError, Result};
use crate::models::comment::RatingSummary;
use crate::models::pagination::PageParams;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Product {
  pub id: Uuid,
  pub seller_id: Uuid,
  pub category_id: Option<Uuid>,
  pub name: String,
  pub description: Option<String>,
  pub price_cents: i64,
  pub stock: i32,
  pub image_url: Option<String>,
  pub is_active: bool,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewProduct {
  pub seller_id: Uuid,
  pub category_id: Option<Uuid>,
  pub name: String,
  pub description: Option<String>,
  pub price_cents: i64,
  pub stock: i32,
  pub image_url: Option<String>,
}

/// Partial product update; `None` leaves the column untouched.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProductPatch {
  pub name: Option<String>,
  pub description: Option<String>,
  pub category_id: Option<Uuid>,
  pub price_cents: Option<i64>,
  pub stock: Option<i32>,
  pub image_url: Option<String>,
  pub is_active: Option<bool>,
}

impl ProductPatch {
  pub fn apply(&self, product: &mut Product) {
    if let Some(name) = &self.name {
      product.name = name.clone();
    }
    if let Some(description) = &self.description {
      product.description = Some(description.clone());
    }
    if let Some(category_id) = self.category_id {
      product.category_id = Some(category_id);
    }
    if let Some(price) = self.price_cents {
      product.price_cents = price;
    }
    if let Some(stock) = self.stock {
      product.stock = stock;
    }
    if let Some(image_url) = &self.image_url {
      product.image_url = Some(image_url.clone());
    }
    if let Some(is_active) = self.is_active {
      product.is_active = is_active;
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProductSort {
  Price,
  #[default]
  CreatedAt,
  Name,
  Stock,
}

impl ProductSort {
  /// Unknown keys fall back to creation date.
  pub fn parse(raw: Option<&str>) -> Self {
    match raw {
      Some("price") | Some("price_cents") => ProductSort::Price,
      Some("name") => ProductSort::Name,
      Some("stock") => ProductSort::Stock,
      _ => ProductSort::CreatedAt,
    }
  }

  pub fn column(self) -> &'static str {
    match self {
      ProductSort::Price => "price_cents",
      ProductSort::CreatedAt => "created_at",
      ProductSort::Name => "name",
      ProductSort::Stock => "stock",
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
  Asc,
  #[default]
  Desc,
}

impl SortDirection {
  pub fn parse(raw: Option<&str>) -> Self {
    match raw.map(str::to_ascii_lowercase).as_deref() {
      Some("asc") => SortDirection::Asc,
      _ => SortDirection::Desc,
    }
  }

  pub fn keyword(self) -> &'static str {
    match self {
      SortDirection::Asc => "ASC",
      SortDirection::Desc => "DESC",
    }
  }
}

#[derive(Debug, Clone, Default)]
pub struct ProductFilter {
  pub search: Option<String>,
  pub category_id: Option<Uuid>,
  pub seller_id: Option<Uuid>,
  pub min_price_cents: Option<i64>,
  pub max_price_cents: Option<i64>,
  pub include_inactive: bool,
  /// Deactivated products only; matches nothing without `include_inactive`.
  pub inactive_only: bool,
  pub sort: ProductSort,
  pub direction: SortDirection,
  pub page: PageParams,
}

impl ProductFilter {
  pub fn matches(&self, product: &Product) -> bool {
    if !self.include_inactive && !product.is_active {
      return false;
    }
    if self.inactive_only && product.is_active {
      return false;
    }
    if let Some(term) = &self.search {
      let term = term.to_lowercase();
      let in_name = product.name.to_lowercase().contains(&term);
      let in_description = product
        .description
        .as_deref()
        .is_some_and(|d| d.to_lowercase().contains(&term));
      if !in_name && !in_description {
        return false;
      }
    }
    self.category_id.map_or(true, |c| product.category_id == Some(c))
      && self.seller_id.map_or(true, |s| product.seller_id == s)
      && self.min_price_cents.map_or(true, |min| product.price_cents >= min)
      && self.max_price_cents.map_or(true, |max| product.price_cents <= max)
  }

  pub fn compare(&self, a: &Product, b: &Product) -> std::cmp::Ordering {
    let ordering = match self.sort {
      ProductSort::Price => a.price_cents.cmp(&b.price_cents),
      ProductSort::CreatedAt => a.created_at.cmp(&b.created_at),
      ProductSort::Name => a.name.cmp(&b.name),
      ProductSort::Stock => a.stock.cmp(&b.stock),
    };
    match self.direction {
      SortDirection::Asc => ordering,
      SortDirection::Desc => ordering.reverse(),
    }
  }
}

/// Stock update requested by a seller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StockChange {
  Set(i32),
  Add(i32),
  Subtract(i32),
}

impl StockChange {
  /// `operation` defaults to `set`.
  pub fn parse(operation: Option<&str>, quantity: i32) -> Result<Self> {
    match operation.unwrap_or("set") {
      "set" => Ok(StockChange::Set(quantity)),
      "add" => Ok(StockChange::Add(quantity)),
      "subtract" => Ok(StockChange::Subtract(quantity)),
      _ => Err(AppError::validation(
        "operation",
        "Operation must be one of set, add, subtract",
      )),
    }
  }

  /// The new stock level; never negative.
  pub fn apply(self, current: i32) -> Result<i32> {
    let next = match self {
      StockChange::Set(value) => Some(value),
      StockChange::Add(value) => current.checked_add(value),
      StockChange::Subtract(value) => current.checked_sub(value),
    };
    match next {
      Some(stock) if stock >= 0 => Ok(stock),
      Some(_) => Err(AppError::validation("quantity", "Stock cannot be negative")),
      None => Err(AppError::validation("quantity", "Stock is out of range")),
    }
  }
}

/// A product as shown in listings and detail views.
#[derive(Debug, Clone, Serialize)]
pub struct ProductListing {
  #[serde(flatten)]
  pub product: Product,
  #[serde(flatten)]
  pub rating: RatingSummary,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn stock_changes_never_go_negative() {
    assert_eq!(StockChange::parse(None, 7).unwrap().apply(3).unwrap(), 7);
    assert_eq!(StockChange::parse(Some("add"), 2).unwrap().apply(3).unwrap(), 5);
    assert_eq!(StockChange::parse(Some("subtract"), 3).unwrap().apply(3).unwrap(), 0);
    assert!(StockChange::parse(Some("subtract"), 4).unwrap().apply(3).is_err());
    assert!(StockChange::parse(Some("set"), -1).unwrap().apply(3).is_err());
    assert!(StockChange::parse(Some("add"), i32::MAX).unwrap().apply(1).is_err());
    assert!(StockChange::parse(Some("double"), 1).is_err());
  }
}
