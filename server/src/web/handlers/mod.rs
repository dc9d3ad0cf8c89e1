// server/src/web/handlers/mod.rs

pub mod auth_handlers;
pub mod cart_handlers;
pub mod category_handlers;
pub mod checkout_handlers;
pub mod client_handlers;
pub mod comment_handlers;
pub mod health_handlers;
pub mod order_handlers;
pub mod payment_handlers;
pub mod product_handlers;
pub mod seller_handlers;
pub mod webhook_handlers;
pub mod wishlist_handlers;

use crate::errors::AppError;
use crate::models::PageParams;
use serde::Deserialize;

/// `?page=&limit=` query shared by the paginated listings.
#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
  pub page: Option<u32>,
  pub limit: Option<u32>,
}

impl PageQuery {
  pub fn params(&self) -> Result<PageParams, AppError> {
    PageParams::new(self.page, self.limit)
  }
}
