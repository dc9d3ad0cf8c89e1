// server/src/models/pagination.rs

use crate::errors::{AppError, Result};
use serde::{Deserialize, Serialize};

pub const DEFAULT_LIMIT: u32 = 20;
pub const MAX_LIMIT: u32 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct PageParams {
  pub page: u32,
  pub limit: u32,
}

impl Default for PageParams {
  fn default() -> Self {
    Self {
      page: 1,
      limit: DEFAULT_LIMIT,
    }
  }
}

impl PageParams {
  pub fn new(page: Option<u32>, limit: Option<u32>) -> Result<Self> {
    let page = page.unwrap_or(1);
    let limit = limit.unwrap_or(DEFAULT_LIMIT);
    if page < 1 {
      return Err(AppError::validation("page", "Page must be a positive integer"));
    }
    if !(1..=MAX_LIMIT).contains(&limit) {
      return Err(AppError::validation("limit", format!("Limit must be between 1 and {}", MAX_LIMIT)));
    }
    Ok(Self { page, limit })
  }

  pub fn offset(&self) -> i64 {
    i64::from(self.page - 1) * i64::from(self.limit)
  }

  pub fn limit(&self) -> i64 {
    i64::from(self.limit)
  }

  pub fn meta(&self, total: i64) -> PageMeta {
    let limit = i64::from(self.limit);
    PageMeta {
      page: self.page,
      limit: self.limit,
      total,
      pages: (total + limit - 1) / limit,
    }
  }

  /// Applies this page to an already filtered, ordered list.
  pub fn slice<T: Clone>(&self, items: &[T]) -> Vec<T> {
    items
      .iter()
      .skip(self.offset() as usize)
      .take(self.limit as usize)
      .cloned()
      .collect()
  }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct PageMeta {
  pub page: u32,
  pub limit: u32,
  pub total: i64,
  pub pages: i64,
}
