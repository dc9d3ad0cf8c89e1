// server/src/web/handlers/product_handlers.rs

use actix_web::{web, HttpResponse};
use serde::Deserialize;
use serde_json::json;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::{
  NewProduct, PageParams, Product, ProductFilter, ProductListing, ProductPatch, ProductSort, Role, SortDirection,
  StockChange,
};
use crate::state::AppState;
use crate::validation::{non_blank, FieldErrors};
use crate::web::extractors::{AuthenticatedUser, MaybeUser};

#[derive(Debug, Default, Deserialize)]
pub struct ListProductsQuery {
  pub page: Option<u32>,
  pub limit: Option<u32>,
  pub search: Option<String>,
  pub category_id: Option<Uuid>,
  pub seller_id: Option<Uuid>,
  pub min_price: Option<i64>,
  pub max_price: Option<i64>,
  pub sort_by: Option<String>,
  pub order: Option<String>,
}

impl ListProductsQuery {
  pub fn into_filter(self, include_inactive: bool) -> Result<ProductFilter, AppError> {
    Ok(ProductFilter {
      search: self.search.as_deref().and_then(non_blank),
      category_id: self.category_id,
      seller_id: self.seller_id,
      min_price_cents: self.min_price,
      max_price_cents: self.max_price,
      include_inactive,
      inactive_only: false,
      sort: ProductSort::parse(self.sort_by.as_deref()),
      direction: SortDirection::parse(self.order.as_deref()),
      page: PageParams::new(self.page, self.limit)?,
    })
  }
}

#[derive(Debug, Deserialize)]
pub struct CreateProductRequest {
  pub name: String,
  pub description: Option<String>,
  pub category_id: Option<Uuid>,
  pub price_cents: i64,
  #[serde(default)]
  pub stock: i32,
  pub image_url: Option<String>,
}

/// Attaches the approved-comment rating to each product.
pub async fn with_ratings(app_state: &AppState, products: Vec<Product>) -> Result<Vec<ProductListing>, AppError> {
  let ids: Vec<Uuid> = products.iter().map(|p| p.id).collect();
  let ratings = app_state.store.rating_summaries(&ids).await?;
  Ok(
    products
      .into_iter()
      .map(|product| {
        let rating = ratings.get(&product.id).copied().unwrap_or_default();
        ProductListing { product, rating }
      })
      .collect(),
  )
}

#[derive(Debug, Deserialize)]
pub struct StockRequest {
  pub quantity: i32,
  pub operation: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SearchQuery {
  pub q: Option<String>,
}

const SEARCH_LIMIT: u32 = 20;
const RELATED_LIMIT: usize = 8;

fn can_manage(auth_user: &AuthenticatedUser, product: &Product) -> bool {
  auth_user.is_admin() || (auth_user.user.role == Role::Seller && product.seller_id == auth_user.id())
}

/// Loads a product the caller may modify: their own, or any for an admin.
async fn managed_product(
  app_state: &AppState,
  auth_user: &AuthenticatedUser,
  product_id: Uuid,
) -> Result<Product, AppError> {
  auth_user.require_role(&[Role::Seller, Role::Admin])?;
  let product = app_state
    .store
    .find_product(product_id)
    .await?
    .ok_or_else(|| AppError::NotFound("Product not found".to_string()))?;
  if !can_manage(auth_user, &product) {
    warn!(%product_id, "Product change refused for a non-owner.");
    return Err(AppError::Forbidden("You can only modify your own products".to_string()));
  }
  Ok(product)
}

async fn check_category(app_state: &AppState, category_id: Option<Uuid>) -> Result<(), AppError> {
  if let Some(category_id) = category_id {
    if app_state.store.find_category(category_id).await?.is_none() {
      return Err(AppError::validation("category_id", "Category not found"));
    }
  }
  Ok(())
}

#[instrument(name = "handler::list_products", skip(app_state, viewer, query))]
pub async fn list_products_handler(
  app_state: web::Data<AppState>,
  viewer: MaybeUser,
  query: web::Query<ListProductsQuery>,
) -> Result<HttpResponse, AppError> {
  let filter = query.into_inner().into_filter(viewer.is_admin())?;
  let (products, total) = app_state.store.list_products(&filter).await?;
  let products = with_ratings(&app_state, products).await?;

  Ok(HttpResponse::Ok().json(json!({
    "products": products,
    "pagination": filter.page.meta(total),
  })))
}

#[instrument(name = "handler::get_product", skip(app_state, viewer), fields(product_id = %path))]
pub async fn get_product_handler(
  app_state: web::Data<AppState>,
  viewer: MaybeUser,
  path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
  let product_id = path.into_inner();
  let product = app_state
    .store
    .find_product(product_id)
    .await?
    .filter(|p| p.is_active || viewer.is_admin() || viewer.user_id() == Some(p.seller_id))
    .ok_or_else(|| AppError::NotFound("Product not found".to_string()))?;

  let category = match product.category_id {
    Some(category_id) => app_state.store.find_category(category_id).await?,
    None => None,
  };
  let listing = with_ratings(&app_state, vec![product])
    .await?
    .pop()
    .ok_or_else(|| AppError::Internal("Rating lookup dropped the product".to_string()))?;

  Ok(HttpResponse::Ok().json(json!({
    "product": listing,
    "category": category,
  })))
}

#[instrument(name = "handler::create_product", skip(app_state, auth_user, req_payload), fields(user_id = %auth_user.id()))]
pub async fn create_product_handler(
  app_state: web::Data<AppState>,
  auth_user: AuthenticatedUser,
  req_payload: web::Json<CreateProductRequest>,
) -> Result<HttpResponse, AppError> {
  auth_user.require_role(&[Role::Seller, Role::Admin])?;
  let req = req_payload.into_inner();

  let mut errors = FieldErrors::new();
  let name = non_blank(&req.name);
  errors.check(name.is_some(), "name", "Product name is required");
  errors.check(req.price_cents >= 0, "price_cents", "Price cannot be negative");
  errors.check(req.stock >= 0, "stock", "Stock cannot be negative");
  errors.into_result()?;
  check_category(&app_state, req.category_id).await?;

  let new_product = NewProduct {
    seller_id: auth_user.id(),
    category_id: req.category_id,
    name: name.unwrap_or_default(),
    description: req.description.as_deref().and_then(non_blank),
    price_cents: req.price_cents,
    stock: req.stock,
    image_url: req.image_url.as_deref().and_then(non_blank),
  };
  let product = app_state.store.insert_product(&new_product).await?;
  info!(product_id = %product.id, "Product created.");

  Ok(HttpResponse::Created().json(json!({
    "message": "Product created successfully",
    "product": product,
  })))
}

#[instrument(
  name = "handler::update_product",
  skip(app_state, auth_user, req_payload),
  fields(user_id = %auth_user.id(), product_id = %path)
)]
pub async fn update_product_handler(
  app_state: web::Data<AppState>,
  auth_user: AuthenticatedUser,
  path: web::Path<Uuid>,
  req_payload: web::Json<ProductPatch>,
) -> Result<HttpResponse, AppError> {
  auth_user.require_role(&[Role::Seller, Role::Admin])?;
  let product_id = path.into_inner();
  let mut patch = req_payload.into_inner();

  let mut errors = FieldErrors::new();
  if let Some(name) = &patch.name {
    match non_blank(name) {
      Some(trimmed) => patch.name = Some(trimmed),
      None => errors.add("name", "Product name cannot be empty"),
    }
  }
  errors.check(patch.price_cents.map_or(true, |p| p >= 0), "price_cents", "Price cannot be negative");
  errors.check(patch.stock.map_or(true, |s| s >= 0), "stock", "Stock cannot be negative");
  errors.into_result()?;

  managed_product(&app_state, &auth_user, product_id).await?;
  check_category(&app_state, patch.category_id).await?;

  let product = app_state
    .store
    .update_product(product_id, &patch)
    .await?
    .ok_or_else(|| AppError::NotFound("Product not found".to_string()))?;
  info!("Product updated.");

  Ok(HttpResponse::Ok().json(json!({
    "message": "Product updated successfully",
    "product": product,
  })))
}

/// Soft delete: the product stays for order history but leaves the catalog.
#[instrument(name = "handler::delete_product", skip(app_state, auth_user), fields(user_id = %auth_user.id(), product_id = %path))]
pub async fn delete_product_handler(
  app_state: web::Data<AppState>,
  auth_user: AuthenticatedUser,
  path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
  let product_id = path.into_inner();
  managed_product(&app_state, &auth_user, product_id).await?;

  let patch = ProductPatch {
    is_active: Some(false),
    ..ProductPatch::default()
  };
  app_state
    .store
    .update_product(product_id, &patch)
    .await?
    .ok_or_else(|| AppError::NotFound("Product not found".to_string()))?;
  info!("Product deactivated.");

  Ok(HttpResponse::Ok().json(json!({ "message": "Product deleted (deactivated)" })))
}

#[instrument(name = "handler::toggle_product_status", skip(app_state, auth_user), fields(user_id = %auth_user.id(), product_id = %path))]
pub async fn toggle_product_status_handler(
  app_state: web::Data<AppState>,
  auth_user: AuthenticatedUser,
  path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
  let product_id = path.into_inner();
  let existing = managed_product(&app_state, &auth_user, product_id).await?;

  let patch = ProductPatch {
    is_active: Some(!existing.is_active),
    ..ProductPatch::default()
  };
  let product = app_state
    .store
    .update_product(product_id, &patch)
    .await?
    .ok_or_else(|| AppError::NotFound("Product not found".to_string()))?;
  info!(is_active = product.is_active, "Product status toggled.");

  Ok(HttpResponse::Ok().json(json!({
    "message": "Product status updated",
    "is_active": product.is_active,
  })))
}

#[instrument(
  name = "handler::update_stock",
  skip(app_state, auth_user, req_payload),
  fields(user_id = %auth_user.id(), product_id = %path)
)]
pub async fn update_stock_handler(
  app_state: web::Data<AppState>,
  auth_user: AuthenticatedUser,
  path: web::Path<Uuid>,
  req_payload: web::Json<StockRequest>,
) -> Result<HttpResponse, AppError> {
  let product_id = path.into_inner();
  let req = req_payload.into_inner();
  let change = StockChange::parse(req.operation.as_deref(), req.quantity)?;
  managed_product(&app_state, &auth_user, product_id).await?;

  let product = app_state
    .store
    .adjust_stock(product_id, change)
    .await?
    .ok_or_else(|| AppError::NotFound("Product not found".to_string()))?;
  info!(stock = product.stock, ?change, "Stock updated.");

  Ok(HttpResponse::Ok().json(json!({
    "message": "Stock updated",
    "stock": product.stock,
  })))
}

#[instrument(name = "handler::search_products", skip(app_state, query))]
pub async fn search_products_handler(
  app_state: web::Data<AppState>,
  query: web::Query<SearchQuery>,
) -> Result<HttpResponse, AppError> {
  let term = query
    .q
    .as_deref()
    .map(str::trim)
    .filter(|term| term.chars().count() >= 2)
    .ok_or_else(|| AppError::validation("q", "Search term must be at least 2 characters"))?;

  let filter = ProductFilter {
    search: Some(term.to_string()),
    page: PageParams::new(Some(1), Some(SEARCH_LIMIT))?,
    ..ProductFilter::default()
  };
  let (products, _) = app_state.store.list_products(&filter).await?;
  let results = with_ratings(&app_state, products).await?;

  Ok(HttpResponse::Ok().json(json!({
    "total": results.len(),
    "results": results,
  })))
}

/// Same category, active, priced within 30% of the product.
#[instrument(name = "handler::related_products", skip(app_state), fields(product_id = %path))]
pub async fn related_products_handler(
  app_state: web::Data<AppState>,
  path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
  let product_id = path.into_inner();
  let product = app_state
    .store
    .find_product(product_id)
    .await?
    .ok_or_else(|| AppError::NotFound("Product not found".to_string()))?;

  let Some(category_id) = product.category_id else {
    return Ok(HttpResponse::Ok().json(json!({ "related_products": [] })));
  };
  let filter = ProductFilter {
    category_id: Some(category_id),
    min_price_cents: Some(product.price_cents.saturating_mul(7) / 10),
    max_price_cents: Some(product.price_cents.saturating_mul(13) / 10),
    page: PageParams::new(Some(1), Some(RELATED_LIMIT as u32 + 1))?,
    ..ProductFilter::default()
  };
  let (candidates, _) = app_state.store.list_products(&filter).await?;
  let related: Vec<Product> = candidates
    .into_iter()
    .filter(|p| p.id != product_id)
    .take(RELATED_LIMIT)
    .collect();
  let related = with_ratings(&app_state, related).await?;

  Ok(HttpResponse::Ok().json(json!({ "related_products": related })))
}
