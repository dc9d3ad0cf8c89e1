// server/src/web/handlers/cart_handlers.rs

use actix_web::{web, HttpResponse};
use serde::Deserialize;
use serde_json::json;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::{CartLineView, CartView, MAX_LINE_QUANTITY};
use crate::state::AppState;
use crate::web::extractors::AuthenticatedUser;

fn default_quantity() -> i32 {
  1
}

#[derive(Debug, Deserialize)]
pub struct AddToCartRequest {
  pub product_id: Uuid,
  #[serde(default = "default_quantity")]
  pub quantity: i32,
}

#[derive(Debug, Deserialize)]
pub struct UpdateQuantityRequest {
  pub quantity: i32,
}

fn check_quantity(quantity: i32) -> Result<(), AppError> {
  if !(1..=MAX_LINE_QUANTITY).contains(&quantity) {
    return Err(AppError::validation(
      "quantity",
      format!("Quantity must be between 1 and {}", MAX_LINE_QUANTITY),
    ));
  }
  Ok(())
}

/// The caller's cart priced at current product prices.
pub async fn cart_view(app_state: &AppState, user_id: Uuid) -> Result<CartView, AppError> {
  let Some(cart) = app_state.store.find_cart(user_id).await? else {
    return Ok(CartView::empty(None));
  };

  let lines = app_state.store.cart_lines(cart.id).await?;
  let mut views = Vec::with_capacity(lines.len());
  for line in lines {
    let Some(product) = app_state.store.find_product(line.product_id).await? else {
      continue;
    };
    views.push(CartLineView {
      product_id: product.id,
      name: product.name,
      unit_price_cents: product.price_cents,
      quantity: line.quantity,
      subtotal_cents: product.price_cents.saturating_mul(i64::from(line.quantity)),
    });
  }
  Ok(CartView::from_lines(cart.id, views))
}

#[instrument(name = "handler::get_cart", skip(app_state, auth_user), fields(user_id = %auth_user.id()))]
pub async fn get_cart_handler(
  app_state: web::Data<AppState>,
  auth_user: AuthenticatedUser,
) -> Result<HttpResponse, AppError> {
  let cart = cart_view(&app_state, auth_user.id()).await?;
  Ok(HttpResponse::Ok().json(json!({ "cart": cart })))
}

#[instrument(
  name = "handler::add_to_cart",
  skip(app_state, auth_user, req_payload),
  fields(user_id = %auth_user.id(), product_id = %req_payload.product_id)
)]
pub async fn add_to_cart_handler(
  app_state: web::Data<AppState>,
  auth_user: AuthenticatedUser,
  req_payload: web::Json<AddToCartRequest>,
) -> Result<HttpResponse, AppError> {
  let AddToCartRequest { product_id, quantity } = req_payload.into_inner();
  check_quantity(quantity)?;

  let product = app_state.store.find_product(product_id).await?;
  if !product.is_some_and(|p| p.is_active) {
    return Err(AppError::NotFound("Product not found".to_string()));
  }

  let cart = app_state.store.get_or_create_cart(auth_user.id()).await?;
  let line = app_state.store.add_cart_line(cart.id, product_id, quantity).await?;
  info!(quantity = line.quantity, "Cart line added.");

  let cart = cart_view(&app_state, auth_user.id()).await?;
  Ok(HttpResponse::Created().json(json!({
    "message": "Product added to cart",
    "cart": cart,
  })))
}

#[instrument(
  name = "handler::update_cart_line",
  skip(app_state, auth_user, req_payload),
  fields(user_id = %auth_user.id(), product_id = %path)
)]
pub async fn update_cart_line_handler(
  app_state: web::Data<AppState>,
  auth_user: AuthenticatedUser,
  path: web::Path<Uuid>,
  req_payload: web::Json<UpdateQuantityRequest>,
) -> Result<HttpResponse, AppError> {
  let product_id = path.into_inner();
  let quantity = req_payload.quantity;
  check_quantity(quantity)?;

  let cart = app_state
    .store
    .find_cart(auth_user.id())
    .await?
    .ok_or_else(|| AppError::NotFound("Cart not found".to_string()))?;
  app_state
    .store
    .set_cart_line_quantity(cart.id, product_id, quantity)
    .await?
    .ok_or_else(|| AppError::NotFound("Product not in cart".to_string()))?;

  let cart = cart_view(&app_state, auth_user.id()).await?;
  Ok(HttpResponse::Ok().json(json!({
    "message": "Cart updated",
    "cart": cart,
  })))
}

#[instrument(name = "handler::remove_cart_line", skip(app_state, auth_user), fields(user_id = %auth_user.id(), product_id = %path))]
pub async fn remove_cart_line_handler(
  app_state: web::Data<AppState>,
  auth_user: AuthenticatedUser,
  path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
  let product_id = path.into_inner();
  let cart = app_state
    .store
    .find_cart(auth_user.id())
    .await?
    .ok_or_else(|| AppError::NotFound("Cart not found".to_string()))?;
  if !app_state.store.remove_cart_line(cart.id, product_id).await? {
    return Err(AppError::NotFound("Product not in cart".to_string()));
  }

  let cart = cart_view(&app_state, auth_user.id()).await?;
  Ok(HttpResponse::Ok().json(json!({
    "message": "Product removed from cart",
    "cart": cart,
  })))
}

#[instrument(name = "handler::clear_cart", skip(app_state, auth_user), fields(user_id = %auth_user.id()))]
pub async fn clear_cart_handler(
  app_state: web::Data<AppState>,
  auth_user: AuthenticatedUser,
) -> Result<HttpResponse, AppError> {
  let cart_id = match app_state.store.find_cart(auth_user.id()).await? {
    Some(cart) => {
      let removed = app_state.store.clear_cart(cart.id).await?;
      info!(removed = removed.len(), "Cart cleared.");
      Some(cart.id)
    }
    None => None,
  };
  Ok(HttpResponse::Ok().json(json!({
    "message": "Cart cleared",
    "cart": CartView::empty(cart_id),
  })))
}
