// server/src/web/handlers/client_handlers.rs

//! Account administration. Admins manage every account; a user may read,
//! edit and close their own.

use actix_web::{web, HttpResponse};
use serde::Deserialize;
use serde_json::json;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::{OrderQuery, PageParams, Role, User, UserPatch, UserQuery};
use crate::state::AppState;
use crate::validation::{is_postal_code, non_blank, FieldErrors};
use crate::web::extractors::{AuthenticatedUser, MaybeUser};
use crate::web::handlers::order_handlers::parse_status_filter;
use crate::web::handlers::PageQuery;

#[derive(Debug, Default, Deserialize)]
pub struct ListClientsQuery {
  pub role: Option<String>,
  pub search: Option<String>,
  pub page: Option<u32>,
  pub limit: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct ChangeRoleRequest {
  pub role: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct ClientOrdersQuery {
  pub status: Option<String>,
  pub page: Option<u32>,
  pub limit: Option<u32>,
}

fn require_self_or_admin(auth_user: &AuthenticatedUser, user_id: Uuid) -> Result<(), AppError> {
  if auth_user.id() == user_id || auth_user.is_admin() {
    return Ok(());
  }
  warn!(target_user = %user_id, "Account access refused.");
  Err(AppError::Forbidden("You can only access your own account".to_string()))
}

async fn find_client(app_state: &AppState, user_id: Uuid) -> Result<User, AppError> {
  app_state
    .store
    .find_user(user_id)
    .await?
    .ok_or_else(|| AppError::NotFound("User not found".to_string()))
}

#[instrument(name = "handler::list_clients", skip(app_state, auth_user, query), fields(user_id = %auth_user.id()))]
pub async fn list_clients_handler(
  app_state: web::Data<AppState>,
  auth_user: AuthenticatedUser,
  query: web::Query<ListClientsQuery>,
) -> Result<HttpResponse, AppError> {
  auth_user.require_role(&[Role::Admin])?;
  let role = query
    .role
    .as_deref()
    .map(|raw| Role::parse(raw).ok_or_else(|| AppError::validation("role", format!("Unknown role: {}", raw))))
    .transpose()?;
  let user_query = UserQuery {
    role,
    search: query.search.as_deref().and_then(non_blank),
    page: PageParams::new(query.page, query.limit)?,
  };

  let (clients, total) = app_state.store.list_users(&user_query).await?;
  Ok(HttpResponse::Ok().json(json!({
    "clients": clients,
    "pagination": user_query.page.meta(total),
  })))
}

#[instrument(name = "handler::get_client", skip(app_state, auth_user), fields(user_id = %auth_user.id(), client_id = %path))]
pub async fn get_client_handler(
  app_state: web::Data<AppState>,
  auth_user: AuthenticatedUser,
  path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
  let client_id = path.into_inner();
  require_self_or_admin(&auth_user, client_id)?;
  let client = find_client(&app_state, client_id).await?;
  let seller = app_state.store.find_seller_by_user(client_id).await?;

  Ok(HttpResponse::Ok().json(json!({
    "client": client,
    "seller": seller,
  })))
}

#[instrument(
  name = "handler::update_client",
  skip(app_state, auth_user, req_payload),
  fields(user_id = %auth_user.id(), client_id = %path)
)]
pub async fn update_client_handler(
  app_state: web::Data<AppState>,
  auth_user: AuthenticatedUser,
  path: web::Path<Uuid>,
  req_payload: web::Json<UserPatch>,
) -> Result<HttpResponse, AppError> {
  let client_id = path.into_inner();
  require_self_or_admin(&auth_user, client_id)?;
  let mut patch = req_payload.into_inner();

  let mut errors = FieldErrors::new();
  for (field, value) in [("first_name", &mut patch.first_name), ("last_name", &mut patch.last_name)] {
    if let Some(raw) = value.as_deref() {
      match non_blank(raw) {
        Some(trimmed) => *value = Some(trimmed),
        None => errors.add(field, "Name cannot be empty"),
      }
    }
  }
  errors.check(
    patch.postal_code.as_deref().map_or(true, is_postal_code),
    "postal_code",
    "Postal code must be 5 digits",
  );
  errors.into_result()?;

  let client = app_state
    .store
    .update_user(client_id, &patch)
    .await?
    .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;
  info!("Client profile updated.");

  Ok(HttpResponse::Ok().json(json!({
    "message": "Profile updated successfully",
    "client": client,
  })))
}

/// A seller losing the role also loses their storefront.
#[instrument(
  name = "handler::change_client_role",
  skip(app_state, auth_user, req_payload),
  fields(user_id = %auth_user.id(), client_id = %path)
)]
pub async fn change_client_role_handler(
  app_state: web::Data<AppState>,
  auth_user: AuthenticatedUser,
  path: web::Path<Uuid>,
  req_payload: web::Json<ChangeRoleRequest>,
) -> Result<HttpResponse, AppError> {
  auth_user.require_role(&[Role::Admin])?;
  let client_id = path.into_inner();
  let role = Role::parse(&req_payload.role)
    .ok_or_else(|| AppError::validation("role", format!("Unknown role: {}", req_payload.role)))?;
  let previous = find_client(&app_state, client_id).await?.role;

  let client = app_state
    .store
    .set_user_role(client_id, role)
    .await?
    .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;
  if previous == Role::Seller && role != Role::Seller {
    let deactivated = app_state.store.deactivate_seller_products(client_id).await?;
    info!(deactivated, "Former seller's products deactivated.");
  }
  info!(from = ?previous, to = ?role, "Client role changed.");

  Ok(HttpResponse::Ok().json(json!({
    "message": "Role updated successfully",
    "client": client,
  })))
}

/// Refused while the account has open orders, as buyer or as seller.
#[instrument(name = "handler::delete_client", skip(app_state, auth_user), fields(user_id = %auth_user.id(), client_id = %path))]
pub async fn delete_client_handler(
  app_state: web::Data<AppState>,
  auth_user: AuthenticatedUser,
  path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
  let client_id = path.into_inner();
  require_self_or_admin(&auth_user, client_id)?;
  find_client(&app_state, client_id).await?;

  let open_orders = app_state.store.count_open_orders(client_id).await?
    + app_state.store.count_open_seller_orders(client_id).await?;
  if open_orders > 0 {
    warn!(open_orders, "Account removal refused with open orders.");
    return Err(AppError::Conflict(format!("Account still has {} open order(s)", open_orders)));
  }

  if !app_state.store.delete_user(client_id).await? {
    return Err(AppError::NotFound("User not found".to_string()));
  }
  if let Err(e) = app_state.identity.delete_identity(client_id).await {
    error!(error = %e, "Profile deleted but the identity could not be removed.");
  }
  info!("Account deleted.");

  Ok(HttpResponse::Ok().json(json!({ "message": "Account deleted successfully" })))
}

#[instrument(name = "handler::client_orders", skip(app_state, auth_user, query), fields(user_id = %auth_user.id(), client_id = %path))]
pub async fn client_orders_handler(
  app_state: web::Data<AppState>,
  auth_user: AuthenticatedUser,
  path: web::Path<Uuid>,
  query: web::Query<ClientOrdersQuery>,
) -> Result<HttpResponse, AppError> {
  let client_id = path.into_inner();
  require_self_or_admin(&auth_user, client_id)?;
  let order_query = OrderQuery {
    user_id: Some(client_id),
    status: parse_status_filter(query.status.as_deref())?,
    page: PageParams::new(query.page, query.limit)?,
  };

  let (orders, total) = app_state.store.list_orders(&order_query).await?;
  Ok(HttpResponse::Ok().json(json!({
    "orders": orders,
    "pagination": order_query.page.meta(total),
  })))
}

/// Pending comments are only listed for their author and admins.
#[instrument(name = "handler::client_comments", skip(app_state, viewer, query), fields(client_id = %path))]
pub async fn client_comments_handler(
  app_state: web::Data<AppState>,
  viewer: MaybeUser,
  path: web::Path<Uuid>,
  query: web::Query<PageQuery>,
) -> Result<HttpResponse, AppError> {
  let client_id = path.into_inner();
  let page = query.params()?;
  find_client(&app_state, client_id).await?;
  let include_unapproved = viewer.is_admin() || viewer.user_id() == Some(client_id);

  let (comments, total) = app_state
    .store
    .list_user_comments(client_id, include_unapproved, &page)
    .await?;
  Ok(HttpResponse::Ok().json(json!({
    "comments": comments,
    "pagination": page.meta(total),
  })))
}
