// server/src/web/handlers/auth_handlers.rs

use actix_web::{web, HttpRequest, HttpResponse};
use serde::Deserialize;
use serde_json::json;
use tracing::{info, instrument, warn};

use crate::errors::AppError;
use crate::models::Registration;
use crate::sagas::contexts::SignupCtxData;
use crate::sagas::signup::MIN_PASSWORD_LEN;
use crate::state::AppState;
use crate::validation::{is_valid_email, FieldErrors};
use crate::web::extractors::{bearer_token, AuthenticatedUser};
use souk_flow::{ContextData, SagaOutcome};

#[derive(Deserialize)]
pub struct LoginRequest {
  pub email: String,
  pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct ForgotPasswordRequest {
  pub email: String,
}

#[derive(Deserialize)]
pub struct ResetPasswordRequest {
  /// Recovery token; the `Authorization` header may carry it instead.
  pub token: Option<String>,
  pub password: String,
}

#[instrument(
  name = "handler::register",
  skip(app_state, req_payload),
  fields(email = %req_payload.email)
)]
pub async fn register_handler(
  app_state: web::Data<AppState>,
  req_payload: web::Json<Registration>,
) -> Result<HttpResponse, AppError> {
  info!("Registration attempt.");

  let signup_ctx = SignupCtxData::new(app_state.get_ref().clone(), req_payload.into_inner());
  let ctx_data = ContextData::new(signup_ctx);

  match app_state.sagas.run(ctx_data.clone()).await {
    Ok(SagaOutcome::Completed) => {
      let user = ctx_data
        .read()
        .user
        .clone()
        .ok_or_else(|| AppError::Internal("Sign-up completed without a user profile".to_string()))?;
      info!(user_id = %user.id, "Registration completed.");
      Ok(HttpResponse::Created().json(json!({
        "message": "User registered successfully",
        "user": user,
      })))
    }
    Ok(SagaOutcome::Stopped) => {
      warn!("Sign-up saga stopped without creating a user.");
      Err(AppError::Internal("Sign-up stopped unexpectedly".to_string()))
    }
    Err(e) => {
      warn!(error = %e, "Registration failed.");
      Err(e)
    }
  }
}

#[instrument(name = "handler::login", skip(app_state, req_payload), fields(email = %req_payload.email))]
pub async fn login_handler(
  app_state: web::Data<AppState>,
  req_payload: web::Json<LoginRequest>,
) -> Result<HttpResponse, AppError> {
  let LoginRequest { email, password } = req_payload.into_inner();
  let email = email.trim().to_string();

  let mut errors = FieldErrors::new();
  errors.check(!email.is_empty(), "email", "Email is required");
  errors.check(!password.is_empty(), "password", "Password is required");
  errors.into_result()?;

  let session = app_state.identity.sign_in(&email, &password).await?;
  let user = app_state
    .store
    .find_user(session.user_id)
    .await?
    .ok_or_else(|| AppError::NotFound("User profile not found".to_string()))?;

  info!(user_id = %user.id, "Login succeeded.");
  Ok(HttpResponse::Ok().json(json!({
    "token": session.access_token,
    "expires_at": session.expires_at,
    "user": user,
  })))
}

#[instrument(name = "handler::logout", skip(app_state, auth_user), fields(user_id = %auth_user.id()))]
pub async fn logout_handler(
  app_state: web::Data<AppState>,
  auth_user: AuthenticatedUser,
) -> Result<HttpResponse, AppError> {
  app_state.identity.sign_out(&auth_user.token).await?;
  info!("Session revoked.");
  Ok(HttpResponse::Ok().json(json!({ "message": "Logged out successfully" })))
}

#[instrument(name = "handler::me", skip(auth_user), fields(user_id = %auth_user.id()))]
pub async fn me_handler(auth_user: AuthenticatedUser) -> Result<HttpResponse, AppError> {
  Ok(HttpResponse::Ok().json(json!({ "user": auth_user.user })))
}

/// Answers 200 whether or not the email belongs to an account.
#[instrument(name = "handler::forgot_password", skip(app_state, req_payload))]
pub async fn forgot_password_handler(
  app_state: web::Data<AppState>,
  req_payload: web::Json<ForgotPasswordRequest>,
) -> Result<HttpResponse, AppError> {
  let email = req_payload.into_inner().email.trim().to_string();
  if !is_valid_email(&email) {
    return Err(AppError::validation("email", "Invalid email format"));
  }

  let redirect_to = format!("{}/reset-password", app_state.config.frontend_url);
  if let Err(e) = app_state.identity.send_password_reset(&email, &redirect_to).await {
    warn!(error = %e, "Password reset email could not be sent.");
  }

  Ok(HttpResponse::Ok().json(json!({
    "message": "If an account exists for this email, a reset link has been sent",
  })))
}

#[instrument(name = "handler::reset_password", skip_all)]
pub async fn reset_password_handler(
  req: HttpRequest,
  app_state: web::Data<AppState>,
  req_payload: web::Json<ResetPasswordRequest>,
) -> Result<HttpResponse, AppError> {
  let ResetPasswordRequest { token, password } = req_payload.into_inner();
  let token = token
    .filter(|t| !t.trim().is_empty())
    .or_else(|| bearer_token(&req))
    .ok_or_else(|| AppError::Auth("Missing recovery token".to_string()))?;
  if password.chars().count() < MIN_PASSWORD_LEN {
    return Err(AppError::validation("password", "Password must be at least 8 characters"));
  }

  app_state.identity.update_password(token.trim(), &password).await?;
  info!("Password reset completed.");
  Ok(HttpResponse::Ok().json(json!({ "message": "Password updated successfully" })))
}
