// server/src/web/handlers/webhook_handlers.rs

use actix_web::{web, HttpRequest, HttpResponse};
use serde_json::json;
use tracing::{info, instrument, warn};

use crate::errors::AppError;
use crate::sagas::contexts::WebhookCtxData;
use crate::services::webhooks::SIGNATURE_HEADER;
use crate::state::AppState;
use souk_flow::{ContextData, SagaOutcome};

/// Payment processor callback. The body is taken raw: the signature covers
/// the exact bytes sent.
#[instrument(name = "handler::stripe_webhook", skip(req, app_state, body), fields(body_len = body.len()))]
pub async fn stripe_webhook_handler(
  req: HttpRequest,
  app_state: web::Data<AppState>,
  body: web::Bytes,
) -> Result<HttpResponse, AppError> {
  let signature = req
    .headers()
    .get(SIGNATURE_HEADER)
    .and_then(|value| value.to_str().ok())
    .map(str::to_string);

  let webhook_ctx = WebhookCtxData::new(app_state.get_ref().clone(), body.to_vec(), signature);
  let ctx_data = ContextData::new(webhook_ctx);

  match app_state.sagas.run(ctx_data.clone()).await {
    Ok(SagaOutcome::Completed) => {
      let (event_id, paid_order_id) = ctx_data.inspect(|d| (d.event.as_ref().map(|e| e.id.clone()), d.paid_order_id));
      info!(event_id = ?event_id, paid_order_id = ?paid_order_id, "Webhook event processed.");
      Ok(HttpResponse::Ok().json(json!({ "received": true })))
    }
    Ok(SagaOutcome::Stopped) => {
      if ctx_data.inspect(|d| d.duplicate) {
        info!("Duplicate webhook event acknowledged.");
        return Ok(HttpResponse::Ok().json(json!({ "received": true, "duplicate": true })));
      }
      Ok(HttpResponse::Ok().json(json!({ "received": true })))
    }
    Err(e) => {
      warn!(error = %e, "Webhook rejected.");
      Err(e)
    }
  }
}
