// server/src/models/order.rs

use crate::errors::{AppError, Result};
use crate::models::pagination::PageParams;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type as SqlxType};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, SqlxType)]
#[sqlx(type_name = "order_status", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderStatus {
  Pending,
  /// Set by payment reconciliation only.
  Paid,
  Preparing,
  Shipped,
  Delivered,
  Cancelled,
}

impl OrderStatus {
  /// Statuses an operator may write through the status endpoint. Any of
  /// them may follow any other.
  pub const ADMIN_SETTABLE: [OrderStatus; 5] = [
    OrderStatus::Pending,
    OrderStatus::Preparing,
    OrderStatus::Shipped,
    OrderStatus::Delivered,
    OrderStatus::Cancelled,
  ];

  pub fn parse_admin_settable(raw: &str) -> Result<Self> {
    Self::ADMIN_SETTABLE
      .iter()
      .copied()
      .find(|s| s.as_str() == raw)
      .ok_or_else(|| {
        AppError::validation(
          "status",
          "Status must be one of PENDING, PREPARING, SHIPPED, DELIVERED, CANCELLED",
        )
      })
  }

  pub fn parse(raw: &str) -> Option<Self> {
    [
      OrderStatus::Pending,
      OrderStatus::Paid,
      OrderStatus::Preparing,
      OrderStatus::Shipped,
      OrderStatus::Delivered,
      OrderStatus::Cancelled,
    ]
    .into_iter()
    .find(|s| s.as_str() == raw)
  }

  pub fn as_str(self) -> &'static str {
    match self {
      OrderStatus::Pending => "PENDING",
      OrderStatus::Paid => "PAID",
      OrderStatus::Preparing => "PREPARING",
      OrderStatus::Shipped => "SHIPPED",
      OrderStatus::Delivered => "DELIVERED",
      OrderStatus::Cancelled => "CANCELLED",
    }
  }

  /// Orders still being worked on; they block account and shop removal.
  pub fn is_open(self) -> bool {
    matches!(
      self,
      OrderStatus::Pending | OrderStatus::Paid | OrderStatus::Preparing | OrderStatus::Shipped
    )
  }

  /// A customer may still cancel before the parcel leaves.
  pub fn is_cancellable(self) -> bool {
    matches!(self, OrderStatus::Pending | OrderStatus::Paid | OrderStatus::Preparing)
  }
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Order {
  pub id: Uuid,
  pub user_id: Uuid,
  pub status: OrderStatus,
  pub total_cents: i64,
  pub currency: String,
  pub payment_intent_id: Option<String>,
  pub paid_at: Option<DateTime<Utc>>,
  pub cancel_reason: Option<String>,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

/// Immutable line with the unit price captured at checkout.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct OrderLine {
  pub id: Uuid,
  pub order_id: Uuid,
  pub product_id: Uuid,
  pub product_name: String,
  pub quantity: i32,
  pub unit_price_cents: i64,
}

impl OrderLine {
  pub fn subtotal_cents(&self) -> i64 {
    self.unit_price_cents * i64::from(self.quantity)
  }
}

/// Sum of unit price times quantity over `lines`.
pub fn lines_total_cents(lines: impl IntoIterator<Item = (i64, i32)>) -> Result<i64> {
  lines.into_iter().try_fold(0i64, |acc, (unit_price, quantity)| {
    unit_price
      .checked_mul(i64::from(quantity))
      .and_then(|subtotal| acc.checked_add(subtotal))
      .ok_or_else(|| AppError::validation("items", "Order total exceeds the largest payable amount"))
  })
}

#[derive(Debug, Clone)]
pub struct NewOrder {
  pub id: Uuid,
  pub user_id: Uuid,
  pub total_cents: i64,
  pub currency: String,
}

#[derive(Debug, Clone)]
pub struct NewOrderLine {
  pub order_id: Uuid,
  pub product_id: Uuid,
  pub product_name: String,
  pub quantity: i32,
  pub unit_price_cents: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct OrderWithLines {
  #[serde(flatten)]
  pub order: Order,
  pub lines: Vec<OrderLine>,
}

#[derive(Debug, Clone, Default)]
pub struct OrderQuery {
  /// `None` lists every customer's orders.
  pub user_id: Option<Uuid>,
  pub status: Option<OrderStatus>,
  pub page: PageParams,
}

#[cfg(test)]
mod tests {
  use super::*;
  use actix_web::ResponseError;

  #[test]
  fn total_is_sum_of_line_subtotals() {
    // 2 x 10.00 + 1 x 5.00
    assert_eq!(lines_total_cents([(1000, 2), (500, 1)]).unwrap(), 2500);
    assert_eq!(lines_total_cents(Vec::<(i64, i32)>::new()).unwrap(), 0);
  }

  #[test]
  fn overflow_is_a_validation_error() {
    let err = lines_total_cents([(i64::MAX, 2)]).unwrap_err();
    assert!(matches!(err, AppError::Validation { .. }));
    assert_eq!(err.status_code(), actix_web::http::StatusCode::BAD_REQUEST);
  }

  #[test]
  fn paid_is_not_admin_settable() {
    assert!(OrderStatus::parse_admin_settable("PAID").is_err());
    assert_eq!(OrderStatus::parse_admin_settable("SHIPPED").unwrap(), OrderStatus::Shipped);
    assert!(OrderStatus::parse_admin_settable("shipped").is_err());
  }

  #[test]
  fn cancellable_statuses() {
    assert!(OrderStatus::Paid.is_cancellable());
    assert!(!OrderStatus::Shipped.is_cancellable());
    assert!(!OrderStatus::Cancelled.is_cancellable());
  }

  #[test]
  fn status_serializes_uppercase() {
    assert_eq!(serde_json::to_string(&OrderStatus::Preparing).unwrap(), "\"PREPARING\"");
  }
}
