// server/src/web/handlers/payment_handlers.rs

use actix_web::{web, HttpResponse};
use serde::Deserialize;
use serde_json::json;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::errors::AppError;
use crate::sagas::contexts::PaymentIntentCtxData;
use crate::state::AppState;
use crate::web::extractors::AuthenticatedUser;
use souk_flow::{ContextData, SagaOutcome};

#[derive(Debug, Deserialize)]
pub struct PaymentIntentRequestBody {
  pub order_id: Uuid,
}

#[instrument(
  name = "handler::create_payment_intent",
  skip(app_state, auth_user, req_payload),
  fields(user_id = %auth_user.id(), order_id = %req_payload.order_id)
)]
pub async fn create_payment_intent_handler(
  app_state: web::Data<AppState>,
  auth_user: AuthenticatedUser,
  req_payload: web::Json<PaymentIntentRequestBody>,
) -> Result<HttpResponse, AppError> {
  let order_id = req_payload.order_id;
  let intent_ctx = PaymentIntentCtxData::new(app_state.get_ref().clone(), auth_user.user.clone(), order_id);
  let ctx_data = ContextData::new(intent_ctx);

  match app_state.sagas.run(ctx_data.clone()).await {
    Ok(SagaOutcome::Completed) => {
      let (intent, amount_cents) = {
        let guard = ctx_data.read();
        (guard.intent.clone(), guard.amount_cents)
      };
      let intent = intent.ok_or_else(|| AppError::Internal("Payment intent saga finished without an intent".to_string()))?;
      info!(payment_intent_id = %intent.id, amount_cents, "Payment intent ready.");

      Ok(HttpResponse::Ok().json(json!({
        "clientSecret": intent.client_secret,
        "order_id": order_id,
        "amount": amount_cents,
      })))
    }
    Ok(SagaOutcome::Stopped) => {
      warn!("Payment intent saga stopped early.");
      Err(AppError::Internal("Payment intent creation stopped unexpectedly".to_string()))
    }
    Err(e) => {
      warn!(error = %e, "Payment intent creation failed.");
      Err(e)
    }
  }
}
