// server/src/web/handlers/seller_handlers.rs

use actix_web::{web, HttpResponse};
use serde::Deserialize;
use serde_json::json;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::seller::is_siret;
use crate::models::{
  NewSeller, PageParams, ProductFilter, ProductSort, Role, Seller, SellerDetail, SellerPatch, SellerQuery,
  SortDirection,
};
use crate::state::AppState;
use crate::validation::{non_blank, FieldErrors};
use crate::web::extractors::{AuthenticatedUser, MaybeUser};
use crate::web::handlers::order_handlers::parse_status_filter;
use crate::web::handlers::product_handlers::with_ratings;

#[derive(Debug, Default, Deserialize)]
pub struct ListSellersQuery {
  pub verified: Option<bool>,
  pub page: Option<u32>,
  pub limit: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct CreateSellerRequest {
  pub shop_name: String,
  pub description: Option<String>,
  pub siret: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct SellerProductsQuery {
  pub active: Option<bool>,
  pub category_id: Option<Uuid>,
  pub sort_by: Option<String>,
  pub order: Option<String>,
  pub page: Option<u32>,
  pub limit: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SellerOrdersQuery {
  pub status: Option<String>,
  pub page: Option<u32>,
  pub limit: Option<u32>,
}

async fn find_seller(app_state: &AppState, seller_id: Uuid) -> Result<Seller, AppError> {
  app_state
    .store
    .find_seller(seller_id)
    .await?
    .ok_or_else(|| AppError::NotFound("Seller not found".to_string()))
}

/// Loads a shop the caller owns, or any shop for an admin.
async fn owned_seller(
  app_state: &AppState,
  auth_user: &AuthenticatedUser,
  seller_id: Uuid,
) -> Result<Seller, AppError> {
  let seller = find_seller(app_state, seller_id).await?;
  if seller.user_id != auth_user.id() && !auth_user.is_admin() {
    warn!(%seller_id, "Seller access refused for a non-owner.");
    return Err(AppError::Forbidden("You can only manage your own shop".to_string()));
  }
  Ok(seller)
}

#[instrument(name = "handler::list_sellers", skip(app_state, query))]
pub async fn list_sellers_handler(
  app_state: web::Data<AppState>,
  query: web::Query<ListSellersQuery>,
) -> Result<HttpResponse, AppError> {
  let seller_query = SellerQuery {
    verified: query.verified,
    page: PageParams::new(query.page, query.limit)?,
  };
  let (sellers, total) = app_state.store.list_sellers(&seller_query).await?;

  Ok(HttpResponse::Ok().json(json!({
    "sellers": sellers,
    "pagination": seller_query.page.meta(total),
  })))
}

#[instrument(name = "handler::get_seller", skip(app_state), fields(seller_id = %path))]
pub async fn get_seller_handler(
  app_state: web::Data<AppState>,
  path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
  let seller = find_seller(&app_state, path.into_inner()).await?;

  let count_filter = ProductFilter {
    seller_id: Some(seller.user_id),
    page: PageParams::new(Some(1), Some(1))?,
    ..ProductFilter::default()
  };
  let (_, total_products) = app_state.store.list_products(&count_filter).await?;
  let rating = app_state.store.seller_rating(seller.user_id).await?;
  let detail = SellerDetail {
    seller,
    total_products,
    rating,
  };

  Ok(HttpResponse::Ok().json(json!({ "seller": detail })))
}

#[instrument(name = "handler::create_seller", skip(app_state, auth_user, req_payload), fields(user_id = %auth_user.id()))]
pub async fn create_seller_handler(
  app_state: web::Data<AppState>,
  auth_user: AuthenticatedUser,
  req_payload: web::Json<CreateSellerRequest>,
) -> Result<HttpResponse, AppError> {
  auth_user.require_role(&[Role::Seller, Role::Admin])?;
  let req = req_payload.into_inner();

  let mut errors = FieldErrors::new();
  let shop_name = non_blank(&req.shop_name);
  errors.check(shop_name.is_some(), "shop_name", "Shop name is required");
  let siret = req.siret.trim().to_string();
  errors.check(is_siret(&siret), "siret", "SIRET must be exactly 14 digits");
  errors.into_result()?;

  let new_seller = NewSeller {
    user_id: auth_user.id(),
    shop_name: shop_name.unwrap_or_default(),
    description: req.description.as_deref().and_then(non_blank),
    siret,
  };
  let seller = app_state.store.insert_seller(&new_seller).await?;
  info!(seller_id = %seller.id, "Seller profile created.");

  Ok(HttpResponse::Created().json(json!({
    "message": "Seller profile created successfully",
    "seller": seller,
  })))
}

#[instrument(
  name = "handler::update_seller",
  skip(app_state, auth_user, req_payload),
  fields(user_id = %auth_user.id(), seller_id = %path)
)]
pub async fn update_seller_handler(
  app_state: web::Data<AppState>,
  auth_user: AuthenticatedUser,
  path: web::Path<Uuid>,
  req_payload: web::Json<SellerPatch>,
) -> Result<HttpResponse, AppError> {
  let seller_id = path.into_inner();
  let mut patch = req_payload.into_inner();
  if let Some(shop_name) = &patch.shop_name {
    let trimmed = non_blank(shop_name).ok_or_else(|| AppError::validation("shop_name", "Shop name cannot be empty"))?;
    patch.shop_name = Some(trimmed);
  }
  owned_seller(&app_state, &auth_user, seller_id).await?;

  let seller = app_state
    .store
    .update_seller(seller_id, &patch)
    .await?
    .ok_or_else(|| AppError::NotFound("Seller not found".to_string()))?;
  info!("Seller profile updated.");

  Ok(HttpResponse::Ok().json(json!({
    "message": "Seller profile updated successfully",
    "seller": seller,
  })))
}

#[instrument(name = "handler::verify_seller", skip(app_state, auth_user), fields(user_id = %auth_user.id(), seller_id = %path))]
pub async fn verify_seller_handler(
  app_state: web::Data<AppState>,
  auth_user: AuthenticatedUser,
  path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
  auth_user.require_role(&[Role::Admin])?;
  let seller_id = path.into_inner();
  if find_seller(&app_state, seller_id).await?.is_verified {
    return Err(AppError::Conflict("Seller is already verified".to_string()));
  }

  let seller = app_state
    .store
    .verify_seller(seller_id)
    .await?
    .ok_or_else(|| AppError::NotFound("Seller not found".to_string()))?;
  info!("Seller verified.");

  Ok(HttpResponse::Ok().json(json!({
    "message": "Seller verified successfully",
    "seller": seller,
  })))
}

/// Anyone sees the active catalogue; the owner and admins also see
/// deactivated products.
#[instrument(name = "handler::seller_products", skip(app_state, viewer, query), fields(seller_id = %path))]
pub async fn seller_products_handler(
  app_state: web::Data<AppState>,
  viewer: MaybeUser,
  path: web::Path<Uuid>,
  query: web::Query<SellerProductsQuery>,
) -> Result<HttpResponse, AppError> {
  let seller = find_seller(&app_state, path.into_inner()).await?;
  let query = query.into_inner();
  let privileged = viewer.is_admin() || viewer.user_id() == Some(seller.user_id);

  let filter = ProductFilter {
    seller_id: Some(seller.user_id),
    category_id: query.category_id,
    include_inactive: privileged && query.active != Some(true),
    inactive_only: query.active == Some(false),
    sort: ProductSort::parse(query.sort_by.as_deref()),
    direction: SortDirection::parse(query.order.as_deref()),
    page: PageParams::new(query.page, query.limit)?,
    ..ProductFilter::default()
  };
  let (products, total) = app_state.store.list_products(&filter).await?;
  let products = with_ratings(&app_state, products).await?;

  Ok(HttpResponse::Ok().json(json!({
    "products": products,
    "pagination": filter.page.meta(total),
  })))
}

#[instrument(name = "handler::seller_orders", skip(app_state, auth_user, query), fields(user_id = %auth_user.id(), seller_id = %path))]
pub async fn seller_orders_handler(
  app_state: web::Data<AppState>,
  auth_user: AuthenticatedUser,
  path: web::Path<Uuid>,
  query: web::Query<SellerOrdersQuery>,
) -> Result<HttpResponse, AppError> {
  let status = parse_status_filter(query.status.as_deref())?;
  let page = PageParams::new(query.page, query.limit)?;
  let seller = owned_seller(&app_state, &auth_user, path.into_inner()).await?;

  let (orders, total) = app_state
    .store
    .list_seller_orders(seller.user_id, status, &page)
    .await?;

  Ok(HttpResponse::Ok().json(json!({
    "orders": orders,
    "pagination": page.meta(total),
  })))
}

#[instrument(name = "handler::delete_seller", skip(app_state, auth_user), fields(user_id = %auth_user.id(), seller_id = %path))]
pub async fn delete_seller_handler(
  app_state: web::Data<AppState>,
  auth_user: AuthenticatedUser,
  path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
  auth_user.require_role(&[Role::Admin])?;
  let seller = find_seller(&app_state, path.into_inner()).await?;

  let open_orders = app_state.store.count_open_seller_orders(seller.user_id).await?;
  if open_orders > 0 {
    warn!(open_orders, "Seller removal refused with open orders.");
    return Err(AppError::Conflict(format!("Seller still has {} open order(s)", open_orders)));
  }

  if !app_state.store.delete_seller(seller.id).await? {
    return Err(AppError::NotFound("Seller not found".to_string()));
  }
  info!("Seller profile deleted and products deactivated.");
  Ok(HttpResponse::Ok().json(json!({ "message": "Seller profile deleted successfully" })))
}
