// server/src/models/comment.rs

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Comment {
  pub id: Uuid,
  pub product_id: Uuid,
  pub user_id: Uuid,
  pub rate: i16,
  pub comment: String,
  pub approved: bool,
  pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewComment {
  pub product_id: Uuid,
  pub user_id: Uuid,
  pub rate: i16,
  pub comment: String,
}

/// Aggregate of approved ratings for one product.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Default)]
pub struct RatingSummary {
  pub average_rating: Option<f64>,
  pub total_comments: i64,
}

impl RatingSummary {
  /// Mean of `count` ratings summing to `sum`, rounded to one decimal.
  pub fn from_totals(sum: i64, count: i64) -> Self {
    if count <= 0 {
      return Self::default();
    }
    let tenths = (sum * 10 + count / 2) / count;
    Self {
      average_rating: Some(tenths as f64 / 10.0),
      total_comments: count,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn average_is_rounded_to_one_decimal() {
    assert_eq!(RatingSummary::from_totals(14, 3).average_rating, Some(4.7));
    assert_eq!(RatingSummary::from_totals(10, 4).average_rating, Some(2.5));
    assert_eq!(RatingSummary::from_totals(5, 1).average_rating, Some(5.0));
  }

  #[test]
  fn no_comments_means_no_average() {
    let summary = RatingSummary::from_totals(0, 0);
    assert_eq!(summary.average_rating, None);
    assert_eq!(summary.total_comments, 0);
  }
}
