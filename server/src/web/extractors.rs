// server/src/web/extractors.rs

//! Bearer-token gate. The identity provider vouches for the token; the
//! profile and role come from the store.

use crate::errors::{AppError, Result};
use crate::models::{Role, User};
use crate::state::AppState;
use actix_web::dev::Payload;
use actix_web::http::header::AUTHORIZATION;
use actix_web::{web, FromRequest, HttpRequest};
use futures_util::future::LocalBoxFuture;
use tracing::warn;

/// Token from an `Authorization: Bearer <token>` header.
pub fn bearer_token(req: &HttpRequest) -> Option<String> {
  req
    .headers()
    .get(AUTHORIZATION)
    .and_then(|value| value.to_str().ok())
    .and_then(|value| value.strip_prefix("Bearer "))
    .map(str::trim)
    .filter(|token| !token.is_empty())
    .map(str::to_string)
}

#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
  pub user: User,
  pub token: String,
}

impl AuthenticatedUser {
  pub fn id(&self) -> uuid::Uuid {
    self.user.id
  }

  pub fn is_admin(&self) -> bool {
    self.user.role == Role::Admin
  }

  pub fn require_role(&self, roles: &[Role]) -> Result<()> {
    if self.user.has_role(roles) {
      Ok(())
    } else {
      warn!(user_id = %self.user.id, role = ?self.user.role, required = ?roles, "Role check failed.");
      Err(AppError::Forbidden("Access denied".to_string()))
    }
  }
}

async fn authenticate(state: Option<web::Data<AppState>>, token: Option<String>) -> Result<AuthenticatedUser> {
  let state = state.ok_or_else(|| AppError::Internal("Application state is not configured".to_string()))?;
  let token = token.ok_or_else(|| AppError::Auth("Missing bearer token".to_string()))?;
  let user_id = state.identity.resolve_token(&token).await?;
  let user = state
    .store
    .find_user(user_id)
    .await?
    .ok_or_else(|| AppError::NotFound("User profile not found".to_string()))?;
  Ok(AuthenticatedUser { user, token })
}

impl FromRequest for AuthenticatedUser {
  type Error = AppError;
  type Future = LocalBoxFuture<'static, Result<Self, Self::Error>>;

  fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
    let state = req.app_data::<web::Data<AppState>>().cloned();
    let token = bearer_token(req);
    Box::pin(authenticate(state, token))
  }
}

/// Like `AuthenticatedUser`, but anonymous callers and bad tokens yield `None`.
#[derive(Debug, Clone)]
pub struct MaybeUser(pub Option<AuthenticatedUser>);

impl MaybeUser {
  pub fn is_admin(&self) -> bool {
    self.0.as_ref().is_some_and(AuthenticatedUser::is_admin)
  }

  pub fn user_id(&self) -> Option<uuid::Uuid> {
    self.0.as_ref().map(AuthenticatedUser::id)
  }
}

impl FromRequest for MaybeUser {
  type Error = AppError;
  type Future = LocalBoxFuture<'static, Result<Self, Self::Error>>;

  fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
    let state = req.app_data::<web::Data<AppState>>().cloned();
    let token = bearer_token(req);
    Box::pin(async move {
      if token.is_none() {
        return Ok(MaybeUser(None));
      }
      Ok(MaybeUser(authenticate(state, token).await.ok()))
    })
  }
}
