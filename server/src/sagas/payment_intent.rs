// server/src/sagas/payment_intent.rs

use crate::errors::AppError;
use crate::models::order::lines_total_cents;
use crate::models::{OrderStatus, Role};
use crate::sagas::contexts::PaymentIntentCtxData;
use crate::services::payments::PaymentIntentRequest;
use souk_flow::{ContextData, Saga, SagaControl, SagaRegistry};
use tracing::{info, warn};

/// Key forwarded to the processor: a retry for the same order and amount
/// gets the same intent back.
pub fn intent_idempotency_key(order_id: uuid::Uuid, amount_cents: i64) -> String {
  format!("pi-{}-{}", order_id, amount_cents)
}

pub fn register_payment_intent_saga(registry: &SagaRegistry<AppError>) {
  let mut saga = Saga::<PaymentIntentCtxData, AppError>::new(
    "payment_intent",
    &[
      ("load_order", false, None),
      ("compute_amount", false, None),
      ("create_intent", false, None),
    ],
  );

  saga.on("load_order", |ctx_data: ContextData<PaymentIntentCtxData>| {
    Box::pin(async move {
      let (order_id, requester, store) = {
        let guard = ctx_data.read();
        (guard.order_id, guard.requester.clone(), guard.app_state.store.clone())
      };

      let order = store
        .find_order(order_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Order {} not found", order_id)))?;
      if order.user_id != requester.id && !requester.has_role(&[Role::Admin]) {
        warn!(%order_id, requester = %requester.id, "Payment requested for someone else's order.");
        return Err(AppError::Forbidden("You do not have access to this order".to_string()));
      }
      if matches!(order.status, OrderStatus::Paid | OrderStatus::Cancelled) {
        return Err(AppError::Conflict(format!(
          "Order {} is {} and cannot be paid",
          order_id,
          order.status.as_str()
        )));
      }
      let lines = store.order_lines(order_id).await?;

      {
        let mut guard = ctx_data.write();
        guard.order = Some(order);
        guard.order_lines = lines;
      }
      Ok::<_, AppError>(SagaControl::Continue)
    })
  });

  saga.on("compute_amount", |ctx_data: ContextData<PaymentIntentCtxData>| {
    Box::pin(async move {
      // Captured line prices only; the live catalog price is never consulted.
      let amount_cents = ctx_data.inspect(|d| {
        lines_total_cents(d.order_lines.iter().map(|l| (l.unit_price_cents, l.quantity)))
      })?;
      if amount_cents <= 0 {
        return Err(AppError::validation("order_id", "Order has nothing to pay"));
      }
      ctx_data.write().amount_cents = amount_cents;
      Ok::<_, AppError>(SagaControl::Continue)
    })
  });

  saga.on("create_intent", |ctx_data: ContextData<PaymentIntentCtxData>| {
    Box::pin(async move {
      let (request, payments) = {
        let guard = ctx_data.read();
        let currency = guard
          .order
          .as_ref()
          .map(|o| o.currency.clone())
          .unwrap_or_else(|| guard.app_state.config.payment_currency.clone());
        (
          PaymentIntentRequest {
            order_id: guard.order_id,
            amount_cents: guard.amount_cents,
            currency,
            idempotency_key: intent_idempotency_key(guard.order_id, guard.amount_cents),
          },
          guard.app_state.payments.clone(),
        )
      };

      let intent = payments.create_payment_intent(&request).await?;
      info!(order_id = %request.order_id, payment_intent_id = %intent.id, "Payment intent ready.");
      ctx_data.write().intent = Some(intent);
      Ok::<_, AppError>(SagaControl::Continue)
    })
  });

  registry.register(saga);
}
