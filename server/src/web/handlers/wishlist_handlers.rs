// server/src/web/handlers/wishlist_handlers.rs

use actix_web::{web, HttpResponse};
use serde::Deserialize;
use serde_json::json;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::errors::AppError;
use crate::state::AppState;
use crate::web::extractors::AuthenticatedUser;

#[derive(Debug, Deserialize)]
pub struct AddToWishlistRequest {
  pub product_id: Uuid,
}

#[instrument(name = "handler::get_wishlist", skip(app_state, auth_user), fields(user_id = %auth_user.id()))]
pub async fn get_wishlist_handler(
  app_state: web::Data<AppState>,
  auth_user: AuthenticatedUser,
) -> Result<HttpResponse, AppError> {
  let items = app_state.store.wishlist(auth_user.id()).await?;
  Ok(HttpResponse::Ok().json(json!({ "wishlist": items })))
}

#[instrument(
  name = "handler::add_to_wishlist",
  skip(app_state, auth_user, req_payload),
  fields(user_id = %auth_user.id(), product_id = %req_payload.product_id)
)]
pub async fn add_to_wishlist_handler(
  app_state: web::Data<AppState>,
  auth_user: AuthenticatedUser,
  req_payload: web::Json<AddToWishlistRequest>,
) -> Result<HttpResponse, AppError> {
  let product_id = req_payload.product_id;
  if app_state.store.find_product(product_id).await?.is_none() {
    return Err(AppError::NotFound("Product not found".to_string()));
  }

  let item = app_state.store.add_to_wishlist(auth_user.id(), product_id).await?;
  info!("Product added to wishlist.");
  Ok(HttpResponse::Created().json(json!({
    "message": "Product added to wishlist",
    "item": item,
  })))
}

#[instrument(name = "handler::remove_from_wishlist", skip(app_state, auth_user), fields(user_id = %auth_user.id(), product_id = %path))]
pub async fn remove_from_wishlist_handler(
  app_state: web::Data<AppState>,
  auth_user: AuthenticatedUser,
  path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
  if !app_state.store.remove_from_wishlist(auth_user.id(), path.into_inner()).await? {
    return Err(AppError::NotFound("Product not in wishlist".to_string()));
  }
  Ok(HttpResponse::Ok().json(json!({ "message": "Product removed from wishlist" })))
}
