// server/src/web/handlers/category_handlers.rs

use actix_web::{web, HttpResponse};
use serde_json::json;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::product_handlers::with_ratings;
use super::PageQuery;
use crate::errors::AppError;
use crate::models::{NewCategory, ProductFilter, Role};
use crate::state::AppState;
use crate::validation::non_blank;
use crate::web::extractors::AuthenticatedUser;

/// Trims the body and rejects a blank or already used name.
async fn checked_category(
  app_state: &AppState,
  category: NewCategory,
  except: Option<Uuid>,
) -> Result<NewCategory, AppError> {
  let name = non_blank(&category.name).ok_or_else(|| AppError::validation("name", "Category name is required"))?;
  if app_state.store.category_name_taken(&name, except).await? {
    return Err(AppError::Conflict("Category name already exists".to_string()));
  }
  Ok(NewCategory {
    name,
    description: category.description.as_deref().and_then(non_blank),
  })
}

#[instrument(name = "handler::list_categories", skip(app_state))]
pub async fn list_categories_handler(app_state: web::Data<AppState>) -> Result<HttpResponse, AppError> {
  let categories = app_state.store.list_categories().await?;
  Ok(HttpResponse::Ok().json(json!({ "categories": categories })))
}

#[instrument(name = "handler::get_category", skip(app_state), fields(category_id = %path))]
pub async fn get_category_handler(
  app_state: web::Data<AppState>,
  path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
  let detail = app_state
    .store
    .category_detail(path.into_inner())
    .await?
    .ok_or_else(|| AppError::NotFound("Category not found".to_string()))?;
  Ok(HttpResponse::Ok().json(json!({ "category": detail })))
}

#[instrument(name = "handler::create_category", skip(app_state, auth_user, req_payload), fields(user_id = %auth_user.id()))]
pub async fn create_category_handler(
  app_state: web::Data<AppState>,
  auth_user: AuthenticatedUser,
  req_payload: web::Json<NewCategory>,
) -> Result<HttpResponse, AppError> {
  auth_user.require_role(&[Role::Admin])?;
  let category = checked_category(&app_state, req_payload.into_inner(), None).await?;
  let category = app_state.store.insert_category(&category).await?;
  info!(category_id = %category.id, "Category created.");

  Ok(HttpResponse::Created().json(json!({
    "message": "Category created successfully",
    "category": category,
  })))
}

#[instrument(
  name = "handler::update_category",
  skip(app_state, auth_user, req_payload),
  fields(user_id = %auth_user.id(), category_id = %path)
)]
pub async fn update_category_handler(
  app_state: web::Data<AppState>,
  auth_user: AuthenticatedUser,
  path: web::Path<Uuid>,
  req_payload: web::Json<NewCategory>,
) -> Result<HttpResponse, AppError> {
  auth_user.require_role(&[Role::Admin])?;
  let category_id = path.into_inner();
  if app_state.store.find_category(category_id).await?.is_none() {
    return Err(AppError::NotFound("Category not found".to_string()));
  }

  let category = checked_category(&app_state, req_payload.into_inner(), Some(category_id)).await?;
  let category = app_state
    .store
    .update_category(category_id, &category)
    .await?
    .ok_or_else(|| AppError::NotFound("Category not found".to_string()))?;
  info!("Category updated.");

  Ok(HttpResponse::Ok().json(json!({
    "message": "Category updated successfully",
    "category": category,
  })))
}

#[instrument(name = "handler::delete_category", skip(app_state, auth_user), fields(user_id = %auth_user.id(), category_id = %path))]
pub async fn delete_category_handler(
  app_state: web::Data<AppState>,
  auth_user: AuthenticatedUser,
  path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
  auth_user.require_role(&[Role::Admin])?;
  let category_id = path.into_inner();
  if app_state.store.find_category(category_id).await?.is_none() {
    return Err(AppError::NotFound("Category not found".to_string()));
  }

  let linked = app_state.store.count_category_products(category_id).await?;
  if linked > 0 {
    warn!(linked, "Refusing to delete a category with products.");
    return Err(AppError::Conflict(
      "Cannot delete a category that still has products".to_string(),
    ));
  }

  if !app_state.store.delete_category(category_id).await? {
    return Err(AppError::NotFound("Category not found".to_string()));
  }
  info!("Category deleted.");
  Ok(HttpResponse::Ok().json(json!({ "message": "Category deleted successfully" })))
}

#[instrument(name = "handler::category_products", skip(app_state, query), fields(category_id = %path))]
pub async fn category_products_handler(
  app_state: web::Data<AppState>,
  path: web::Path<Uuid>,
  query: web::Query<PageQuery>,
) -> Result<HttpResponse, AppError> {
  let category_id = path.into_inner();
  let page = query.params()?;
  let category = app_state
    .store
    .find_category(category_id)
    .await?
    .ok_or_else(|| AppError::NotFound("Category not found".to_string()))?;

  let filter = ProductFilter {
    category_id: Some(category_id),
    page,
    ..ProductFilter::default()
  };
  let (products, total) = app_state.store.list_products(&filter).await?;
  let products = with_ratings(&app_state, products).await?;

  Ok(HttpResponse::Ok().json(json!({
    "category": category,
    "products": products,
    "pagination": page.meta(total),
  })))
}
