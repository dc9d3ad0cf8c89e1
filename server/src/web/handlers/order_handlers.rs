// server/src/web/handlers/order_handlers.rs

use actix_web::{web, HttpResponse};
use serde::Deserialize;
use serde_json::json;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::{Order, OrderQuery, OrderStatus, OrderWithLines, PageParams, Role};
use crate::state::AppState;
use crate::validation::non_blank;
use crate::web::extractors::AuthenticatedUser;

#[derive(Debug, Default, Deserialize)]
pub struct ListOrdersQuery {
  pub status: Option<String>,
  pub page: Option<u32>,
  pub limit: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
  pub status: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct CancelOrderRequest {
  pub reason: Option<String>,
}

/// `?status=` filter shared by the order listings.
pub fn parse_status_filter(raw: Option<&str>) -> Result<Option<OrderStatus>, AppError> {
  raw
    .map(|raw| {
      OrderStatus::parse(raw).ok_or_else(|| AppError::validation("status", format!("Unknown order status: {}", raw)))
    })
    .transpose()
}

/// Loads an order the caller owns, or any order for an admin.
async fn owned_order(app_state: &AppState, auth_user: &AuthenticatedUser, order_id: Uuid) -> Result<Order, AppError> {
  let order = app_state
    .store
    .find_order(order_id)
    .await?
    .ok_or_else(|| AppError::NotFound("Order not found".to_string()))?;
  if order.user_id != auth_user.id() && !auth_user.is_admin() {
    warn!(%order_id, "Order access refused for a non-owner.");
    return Err(AppError::Forbidden("You do not have access to this order".to_string()));
  }
  Ok(order)
}

#[instrument(name = "handler::list_orders", skip(app_state, auth_user, query), fields(user_id = %auth_user.id()))]
pub async fn list_orders_handler(
  app_state: web::Data<AppState>,
  auth_user: AuthenticatedUser,
  query: web::Query<ListOrdersQuery>,
) -> Result<HttpResponse, AppError> {
  let status = parse_status_filter(query.status.as_deref())?;
  let page = PageParams::new(query.page, query.limit)?;
  let order_query = OrderQuery {
    user_id: (!auth_user.is_admin()).then(|| auth_user.id()),
    status,
    page,
  };

  let (orders, total) = app_state.store.list_orders(&order_query).await?;
  Ok(HttpResponse::Ok().json(json!({
    "orders": orders,
    "pagination": page.meta(total),
  })))
}

#[instrument(name = "handler::get_order", skip(app_state, auth_user), fields(user_id = %auth_user.id(), order_id = %path))]
pub async fn get_order_handler(
  app_state: web::Data<AppState>,
  auth_user: AuthenticatedUser,
  path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
  let order = owned_order(&app_state, &auth_user, path.into_inner()).await?;
  let lines = app_state.store.order_lines(order.id).await?;
  Ok(HttpResponse::Ok().json(OrderWithLines { order, lines }))
}

/// Operator overwrite. Any administrative status may follow any other;
/// `PAID` is reserved to payment reconciliation.
#[instrument(
  name = "handler::update_order_status",
  skip(app_state, auth_user, req_payload),
  fields(user_id = %auth_user.id(), order_id = %path, status = %req_payload.status)
)]
pub async fn update_order_status_handler(
  app_state: web::Data<AppState>,
  auth_user: AuthenticatedUser,
  path: web::Path<Uuid>,
  req_payload: web::Json<UpdateStatusRequest>,
) -> Result<HttpResponse, AppError> {
  auth_user.require_role(&[Role::Seller, Role::Admin])?;
  let status = OrderStatus::parse_admin_settable(req_payload.status.trim())?;

  let order = app_state
    .store
    .set_order_status(path.into_inner(), status, None)
    .await?
    .ok_or_else(|| AppError::NotFound("Order not found".to_string()))?;
  info!("Order status overwritten.");

  Ok(HttpResponse::Ok().json(json!({
    "message": "Order status updated",
    "order": order,
  })))
}

#[instrument(name = "handler::cancel_order", skip(app_state, auth_user, req_payload), fields(user_id = %auth_user.id(), order_id = %path))]
pub async fn cancel_order_handler(
  app_state: web::Data<AppState>,
  auth_user: AuthenticatedUser,
  path: web::Path<Uuid>,
  req_payload: Option<web::Json<CancelOrderRequest>>,
) -> Result<HttpResponse, AppError> {
  let order = owned_order(&app_state, &auth_user, path.into_inner()).await?;
  if !order.status.is_cancellable() {
    return Err(AppError::Conflict(format!(
      "Order cannot be cancelled in status {}",
      order.status.as_str()
    )));
  }

  let reason = req_payload.and_then(|body| body.into_inner().reason.as_deref().and_then(non_blank));
  let order = app_state
    .store
    .set_order_status(order.id, OrderStatus::Cancelled, reason.as_deref())
    .await?
    .ok_or_else(|| AppError::NotFound("Order not found".to_string()))?;
  info!("Order cancelled.");

  Ok(HttpResponse::Ok().json(json!({
    "message": "Order cancelled",
    "order": order,
  })))
}

#[instrument(name = "handler::delete_order", skip(app_state, auth_user), fields(user_id = %auth_user.id(), order_id = %path))]
pub async fn delete_order_handler(
  app_state: web::Data<AppState>,
  auth_user: AuthenticatedUser,
  path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
  auth_user.require_role(&[Role::Admin])?;
  if !app_state.store.delete_order(path.into_inner()).await? {
    return Err(AppError::NotFound("Order not found".to_string()));
  }
  info!("Order deleted.");
  Ok(HttpResponse::Ok().json(json!({ "message": "Order deleted successfully" })))
}
