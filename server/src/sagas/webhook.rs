// server/src/sagas/webhook.rs

//! Payment-processor event reconciliation. Events are applied at most once
//! per event id; anything that fails verification changes nothing.

use crate::errors::AppError;
use crate::sagas::contexts::WebhookCtxData;
use crate::services::webhooks::{PaymentIntentObject, StripeEvent};
use chrono::Utc;
use souk_flow::{ContextData, Saga, SagaControl, SagaRegistry};
use tracing::{info, warn};
use uuid::Uuid;

pub const PAYMENT_SUCCEEDED: &str = "payment_intent.succeeded";
pub const PAYMENT_FAILED: &str = "payment_intent.payment_failed";

pub fn register_webhook_saga(registry: &SagaRegistry<AppError>) {
  let mut saga = Saga::<WebhookCtxData, AppError>::new(
    "stripe_webhook",
    &[
      ("verify_signature", false, None),
      ("parse_event", false, None),
      ("skip_processed_event", false, None),
      ("apply_event", false, None),
      ("record_event", false, None),
    ],
  );

  saga.on("verify_signature", |ctx_data: ContextData<WebhookCtxData>| {
    Box::pin(async move {
      let verified = ctx_data.inspect(|d| {
        d.app_state
          .webhook_verifier
          .verify(&d.payload, d.signature.as_deref())
      });
      if let Err(reason) = verified {
        warn!(%reason, "Webhook signature rejected.");
        return Err(AppError::InvalidSignature(reason.to_string()));
      }
      Ok::<_, AppError>(SagaControl::Continue)
    })
  });

  saga.on("parse_event", |ctx_data: ContextData<WebhookCtxData>| {
    Box::pin(async move {
      let parsed = ctx_data.inspect(|d| serde_json::from_slice::<StripeEvent>(&d.payload));
      let event = parsed.map_err(|e| AppError::validation("body", format!("Malformed webhook event: {}", e)))?;
      info!(event_id = %event.id, event_type = %event.event_type, "Webhook event received.");
      ctx_data.write().event = Some(event);
      Ok::<_, AppError>(SagaControl::Continue)
    })
  });

  saga.on("skip_processed_event", |ctx_data: ContextData<WebhookCtxData>| {
    Box::pin(async move {
      let (event_id, store) = {
        let guard = ctx_data.read();
        (guard.event.as_ref().map(|e| e.id.clone()), guard.app_state.store.clone())
      };
      let event_id = event_id.ok_or_else(|| AppError::Internal("Event missing after parsing".to_string()))?;

      if store.is_event_processed(&event_id).await? {
        info!(%event_id, "Event already processed; acknowledging duplicate delivery.");
        ctx_data.write().duplicate = true;
        return Ok(SagaControl::Stop);
      }
      Ok::<_, AppError>(SagaControl::Continue)
    })
  });

  saga.on("apply_event", |ctx_data: ContextData<WebhookCtxData>| {
    Box::pin(async move {
      let (event, store) = {
        let guard = ctx_data.read();
        (guard.event.clone(), guard.app_state.store.clone())
      };
      let event = event.ok_or_else(|| AppError::Internal("Event missing after parsing".to_string()))?;

      match event.event_type.as_str() {
        PAYMENT_SUCCEEDED => {
          let intent: PaymentIntentObject = serde_json::from_value(event.data.object.clone())
            .map_err(|e| AppError::validation("data.object", format!("Malformed payment intent: {}", e)))?;
          let Some(raw_order_id) = intent.order_id() else {
            warn!(payment_intent_id = %intent.id, "Succeeded payment carries no order id; ignoring.");
            return Ok(SagaControl::Continue);
          };
          let Ok(order_id) = Uuid::parse_str(raw_order_id) else {
            warn!(payment_intent_id = %intent.id, raw_order_id, "Order id in metadata is not a UUID; ignoring.");
            return Ok(SagaControl::Continue);
          };

          match store.mark_order_paid(order_id, &intent.id, Utc::now()).await? {
            Some(order) => {
              info!(order_id = %order.id, payment_intent_id = %intent.id, "Order marked as paid.");
              ctx_data.write().paid_order_id = Some(order.id);
            }
            None => warn!(%order_id, "Succeeded payment references an unknown order."),
          }
        }
        PAYMENT_FAILED => {
          let intent_id = event.data.object.get("id").and_then(|v| v.as_str()).unwrap_or("unknown");
          // TODO: decide with operations whether a failed payment should cancel the order.
          warn!(payment_intent_id = intent_id, "Payment failed; order left unchanged.");
        }
        other => info!(event_type = other, "Unhandled webhook event type ignored."),
      }
      Ok::<_, AppError>(SagaControl::Continue)
    })
  });

  saga.on("record_event", |ctx_data: ContextData<WebhookCtxData>| {
    Box::pin(async move {
      let (event, store) = {
        let guard = ctx_data.read();
        (
          guard.event.as_ref().map(|e| (e.id.clone(), e.event_type.clone())),
          guard.app_state.store.clone(),
        )
      };
      if let Some((event_id, event_type)) = event {
        if !store.record_event(&event_id, &event_type).await? {
          info!(%event_id, "Event was recorded concurrently by another delivery.");
        }
      }
      Ok::<_, AppError>(SagaControl::Continue)
    })
  });

  registry.register(saga);
}
