// server/src/errors.rs

use actix_web::body::{EitherBody, MessageBody};
use actix_web::dev::ServiceResponse;
use actix_web::http::StatusCode;
use actix_web::middleware::ErrorHandlerResponse;
use actix_web::{web, HttpResponse, ResponseError};
use serde::Serialize;
use serde_json::{json, Value};
use souk_flow::FlowError;
use thiserror::Error;

use crate::state::AppState;

/// One rejected request field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
  pub field: String,
  pub message: String,
}

#[derive(Debug, Error)]
pub enum AppError {
  #[error("Validation Error: {message}")]
  Validation { message: String, fields: Vec<FieldError> },

  #[error("Cart is empty")]
  EmptyCart,

  #[error("Invalid webhook signature: {0}")]
  InvalidSignature(String),

  #[error("Authentication Failed: {0}")]
  Auth(String),

  #[error("Forbidden: {0}")]
  Forbidden(String),

  #[error("Resource Not Found: {0}")]
  NotFound(String),

  #[error("Conflict: {0}")]
  Conflict(String),

  /// A remote collaborator (payment processor, managed auth) failed.
  #[error("{service} error: {message}")]
  Upstream { service: &'static str, message: String },

  #[error("Configuration Error: {0}")]
  Config(String),

  #[error("Database Error: {0}")]
  Database(#[source] sqlx::Error),

  #[error("Workflow Error: {source}")]
  Workflow {
    #[from]
    source: FlowError,
  },

  #[error("Internal Server Error: {0}")]
  Internal(String),
}

impl AppError {
  pub fn validation(field: &str, message: impl Into<String>) -> Self {
    let message = message.into();
    AppError::Validation {
      message: message.clone(),
      fields: vec![FieldError {
        field: field.to_string(),
        message,
      }],
    }
  }

  /// Server-side failures and signature mismatches carry a message that is
  /// withheld from the public body.
  pub fn has_hidden_detail(&self) -> bool {
    self.status_code().is_server_error() || matches!(self, AppError::InvalidSignature(_))
  }

  pub fn code(&self) -> &'static str {
    match self {
      AppError::Validation { .. } => "validation_error",
      AppError::EmptyCart => "empty_cart",
      AppError::InvalidSignature(_) => "invalid_signature",
      AppError::Auth(_) => "unauthorized",
      AppError::Forbidden(_) => "forbidden",
      AppError::NotFound(_) => "not_found",
      AppError::Conflict(_) => "conflict",
      AppError::Upstream { .. } => "upstream_error",
      AppError::Config(_) => "config_error",
      AppError::Database(_) => "database_error",
      AppError::Workflow { .. } => "workflow_error",
      AppError::Internal(_) => "internal_error",
    }
  }

  /// JSON body for this error. Internal detail is only attached when
  /// `expose_detail` is set.
  pub fn body(&self, expose_detail: bool) -> Value {
    let public_message = match self {
      AppError::Validation { message, .. } => message.clone(),
      AppError::EmptyCart => "Cannot create an order from an empty cart".to_string(),
      AppError::InvalidSignature(_) => "Invalid webhook signature".to_string(),
      AppError::Auth(m) | AppError::Forbidden(m) | AppError::NotFound(m) | AppError::Conflict(m) => m.clone(),
      AppError::Upstream { service, .. } => format!("{service} request failed"),
      AppError::Config(_) | AppError::Database(_) | AppError::Workflow { .. } | AppError::Internal(_) => {
        "An internal error occurred".to_string()
      }
    };

    let mut body = json!({ "error": public_message, "code": self.code() });
    if let AppError::Validation { fields, .. } = self {
      body["details"] = json!(fields);
    }
    if expose_detail && self.has_hidden_detail() {
      body["detail"] = json!(self.to_string());
    }
    body
  }
}

impl From<sqlx::Error> for AppError {
  fn from(err: sqlx::Error) -> Self {
    let db_code = match &err {
      sqlx::Error::Database(db_err) => db_err.code().map(|c| c.into_owned()),
      _ => None,
    };
    match db_code.as_deref() {
      Some("23505") => AppError::Conflict("Resource already exists".to_string()),
      Some("23503") => AppError::validation("reference", "Invalid reference to a related resource"),
      _ if matches!(err, sqlx::Error::RowNotFound) => AppError::NotFound("Resource not found".to_string()),
      _ => AppError::Database(err),
    }
  }
}

impl ResponseError for AppError {
  fn status_code(&self) -> StatusCode {
    match self {
      AppError::Validation { .. } | AppError::EmptyCart | AppError::InvalidSignature(_) => StatusCode::BAD_REQUEST,
      AppError::Auth(_) => StatusCode::UNAUTHORIZED,
      AppError::Forbidden(_) => StatusCode::FORBIDDEN,
      AppError::NotFound(_) => StatusCode::NOT_FOUND,
      AppError::Conflict(_) => StatusCode::CONFLICT,
      AppError::Upstream { .. }
      | AppError::Config(_) | AppError::Database(_) | AppError::Workflow { .. } | AppError::Internal(_) => {
        StatusCode::INTERNAL_SERVER_ERROR
      }
    }
  }

  fn error_response(&self) -> HttpResponse {
    let status = self.status_code();
    if status.is_server_error() {
      tracing::error!(application_error = %self, code = self.code(), "Responding with error");
    } else {
      tracing::warn!(application_error = %self, code = self.code(), "Rejecting request");
    }
    HttpResponse::build(status).json(self.body(false))
  }
}

/// `ErrorHandlers` callback: outside production, re-renders `AppError`
/// responses with their internal detail attached.
pub fn attach_error_detail<B>(res: ServiceResponse<B>) -> actix_web::Result<ErrorHandlerResponse<B>>
where
  B: MessageBody + 'static,
{
  let expose = res
    .request()
    .app_data::<web::Data<AppState>>()
    .is_some_and(|state| !state.config.is_production());
  let detailed = res
    .response()
    .error()
    .and_then(|err| err.as_error::<AppError>())
    .filter(|err| expose && err.has_hidden_detail())
    .map(|err| err.body(true));

  let Some(body) = detailed else {
    return Ok(ErrorHandlerResponse::Response(res.map_into_left_body()));
  };
  let (req, res) = res.into_parts();
  let res = res.set_body(body.to_string());
  let res: ServiceResponse<EitherBody<B>> = ServiceResponse::new(req, res).map_into_boxed_body().map_into_right_body();
  Ok(ErrorHandlerResponse::Response(res))
}

pub type Result<T, E = AppError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn client_errors_map_to_expected_statuses() {
    assert_eq!(AppError::EmptyCart.status_code(), StatusCode::BAD_REQUEST);
    assert_eq!(AppError::Auth("x".into()).status_code(), StatusCode::UNAUTHORIZED);
    assert_eq!(AppError::Forbidden("x".into()).status_code(), StatusCode::FORBIDDEN);
    assert_eq!(AppError::NotFound("x".into()).status_code(), StatusCode::NOT_FOUND);
    assert_eq!(AppError::Conflict("x".into()).status_code(), StatusCode::CONFLICT);
    assert_eq!(
      AppError::Upstream {
        service: "stripe",
        message: "card_declined".into()
      }
      .status_code(),
      StatusCode::INTERNAL_SERVER_ERROR
    );
  }

  #[test]
  fn validation_body_lists_fields() {
    let body = AppError::validation("email", "Invalid email format").body(false);
    assert_eq!(body["code"], "validation_error");
    assert_eq!(body["details"][0]["field"], "email");
    assert_eq!(body["details"][0]["message"], "Invalid email format");
  }

  #[test]
  fn internal_detail_only_when_exposed() {
    let err = AppError::Internal("pool exhausted".into());
    let hidden = err.body(false);
    assert_eq!(hidden["error"], "An internal error occurred");
    assert!(hidden.get("detail").is_none());

    let shown = err.body(true);
    assert!(shown["detail"].as_str().unwrap().contains("pool exhausted"));
  }

  #[test]
  fn upstream_message_is_detail_not_headline() {
    let err = AppError::Upstream {
      service: "stripe",
      message: "Your card was declined.".into(),
    };
    assert_eq!(err.body(false)["error"], "stripe request failed");
    assert!(err.body(true)["detail"].as_str().unwrap().contains("declined"));
  }

  #[test]
  fn row_not_found_becomes_not_found() {
    let err = AppError::from(sqlx::Error::RowNotFound);
    assert!(matches!(err, AppError::NotFound(_)));
  }
}
