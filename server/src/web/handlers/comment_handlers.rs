// server/src/web/handlers/comment_handlers.rs

use actix_web::{web, HttpResponse};
use serde::Deserialize;
use serde_json::json;
use tracing::{info, instrument};
use uuid::Uuid;

use super::PageQuery;
use crate::errors::AppError;
use crate::models::{NewComment, Role};
use crate::state::AppState;
use crate::validation::{non_blank, FieldErrors};
use crate::web::extractors::AuthenticatedUser;

#[derive(Debug, Deserialize)]
pub struct CreateCommentRequest {
  pub rate: i16,
  pub comment: String,
}

#[instrument(name = "handler::list_comments", skip(app_state, query), fields(product_id = %path))]
pub async fn list_comments_handler(
  app_state: web::Data<AppState>,
  path: web::Path<Uuid>,
  query: web::Query<PageQuery>,
) -> Result<HttpResponse, AppError> {
  let product_id = path.into_inner();
  let page = query.params()?;
  if app_state.store.find_product(product_id).await?.is_none() {
    return Err(AppError::NotFound("Product not found".to_string()));
  }

  let (comments, total) = app_state.store.list_approved_comments(product_id, &page).await?;
  Ok(HttpResponse::Ok().json(json!({
    "comments": comments,
    "pagination": page.meta(total),
  })))
}

/// New comments wait for an admin before they count towards ratings.
#[instrument(
  name = "handler::create_comment",
  skip(app_state, auth_user, req_payload),
  fields(user_id = %auth_user.id(), product_id = %path)
)]
pub async fn create_comment_handler(
  app_state: web::Data<AppState>,
  auth_user: AuthenticatedUser,
  path: web::Path<Uuid>,
  req_payload: web::Json<CreateCommentRequest>,
) -> Result<HttpResponse, AppError> {
  let product_id = path.into_inner();
  let req = req_payload.into_inner();

  let mut errors = FieldErrors::new();
  let text = non_blank(&req.comment);
  errors.check((1..=5).contains(&req.rate), "rate", "Rate must be between 1 and 5");
  errors.check(text.is_some(), "comment", "Comment is required");
  errors.into_result()?;

  if app_state.store.find_product(product_id).await?.is_none() {
    return Err(AppError::NotFound("Product not found".to_string()));
  }

  let comment = app_state
    .store
    .insert_comment(&NewComment {
      product_id,
      user_id: auth_user.id(),
      rate: req.rate,
      comment: text.unwrap_or_default(),
    })
    .await?;
  info!(comment_id = %comment.id, "Comment submitted for approval.");

  Ok(HttpResponse::Created().json(json!({
    "message": "Comment submitted and awaiting approval",
    "comment": comment,
  })))
}

#[instrument(name = "handler::approve_comment", skip(app_state, auth_user), fields(user_id = %auth_user.id(), comment_id = %path))]
pub async fn approve_comment_handler(
  app_state: web::Data<AppState>,
  auth_user: AuthenticatedUser,
  path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
  auth_user.require_role(&[Role::Admin])?;
  let comment = app_state
    .store
    .approve_comment(path.into_inner())
    .await?
    .ok_or_else(|| AppError::NotFound("Comment not found".to_string()))?;
  info!("Comment approved.");
  Ok(HttpResponse::Ok().json(json!({
    "message": "Comment approved",
    "comment": comment,
  })))
}
