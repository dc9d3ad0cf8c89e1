// server/src/web/handlers/checkout_handlers.rs

use actix_web::{web, HttpRequest, HttpResponse};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::OrderWithLines;
use crate::sagas::contexts::CheckoutCtxData;
use crate::state::AppState;
use crate::web::extractors::AuthenticatedUser;
use souk_flow::{ContextData, SagaOutcome};

pub const IDEMPOTENCY_HEADER: &str = "Idempotency-Key";

/// Optional UUID from the `Idempotency-Key` header.
pub fn idempotency_key(req: &HttpRequest) -> Result<Option<Uuid>, AppError> {
  let Some(raw) = req.headers().get(IDEMPOTENCY_HEADER) else {
    return Ok(None);
  };
  raw
    .to_str()
    .ok()
    .and_then(|value| Uuid::parse_str(value.trim()).ok())
    .map(Some)
    .ok_or_else(|| AppError::validation(IDEMPOTENCY_HEADER, "Idempotency-Key must be a UUID"))
}

fn order_from_ctx(ctx_data: &ContextData<CheckoutCtxData>) -> Result<OrderWithLines, AppError> {
  let guard = ctx_data.read();
  let order = guard
    .order
    .clone()
    .ok_or_else(|| AppError::Internal("Checkout finished without an order".to_string()))?;
  Ok(OrderWithLines {
    order,
    lines: guard.order_lines.clone(),
  })
}

#[instrument(
  name = "handler::checkout",
  skip(req, app_state, auth_user),
  fields(user_id = %auth_user.id())
)]
pub async fn checkout_handler(
  req: HttpRequest,
  app_state: web::Data<AppState>,
  auth_user: AuthenticatedUser,
) -> Result<HttpResponse, AppError> {
  let key = idempotency_key(&req)?;
  info!(idempotency_key = ?key, "Checkout requested.");

  let checkout_ctx = CheckoutCtxData::new(app_state.get_ref().clone(), auth_user.id(), key);
  let ctx_data = ContextData::new(checkout_ctx);

  match app_state.sagas.run(ctx_data.clone()).await {
    Ok(SagaOutcome::Completed) => {
      let created = order_from_ctx(&ctx_data)?;
      info!(order_id = %created.order.id, total_cents = created.order.total_cents, "Order created.");
      Ok(HttpResponse::Created().json(created))
    }
    Ok(SagaOutcome::Stopped) => {
      if !ctx_data.inspect(|d| d.replayed) {
        warn!("Checkout stopped without replaying an order.");
        return Err(AppError::Internal("Checkout stopped unexpectedly".to_string()));
      }
      let replayed = order_from_ctx(&ctx_data)?;
      info!(order_id = %replayed.order.id, "Returning the order of an earlier checkout.");
      Ok(HttpResponse::Ok().json(replayed))
    }
    Err(e) => {
      warn!(error = %e, "Checkout failed.");
      Err(e)
    }
  }
}
