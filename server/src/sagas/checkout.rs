// server/src/sagas/checkout.rs

//! Cart to order. Every step that writes registers a compensation, so a
//! failure part-way leaves neither a half-built order nor an emptied cart.

use crate::errors::AppError;
use crate::models::order::lines_total_cents;
use crate::models::{NewOrder, NewOrderLine};
use crate::sagas::contexts::{CheckoutCtxData, PricedLine};
use souk_flow::{ContextData, Saga, SagaControl, SagaRegistry, SkipCondition};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

pub fn register_checkout_saga(registry: &SagaRegistry<AppError>) {
  let without_key: SkipCondition<CheckoutCtxData> =
    Arc::new(|ctx_data: ContextData<CheckoutCtxData>| ctx_data.inspect(|d| d.idempotency_key.is_none()));

  let mut saga = Saga::<CheckoutCtxData, AppError>::new(
    "checkout",
    &[
      ("replay_idempotent_order", false, Some(without_key.clone())),
      ("load_cart", false, None),
      ("capture_prices", false, None),
      ("create_order", false, None),
      ("copy_lines", false, None),
      ("clear_cart", false, None),
      ("remember_idempotency_key", false, Some(without_key)),
    ],
  );

  saga.on("replay_idempotent_order", |ctx_data: ContextData<CheckoutCtxData>| {
    Box::pin(async move {
      let (user_id, key, store) = {
        let guard = ctx_data.read();
        (guard.user_id, guard.idempotency_key, guard.app_state.store.clone())
      };
      let Some(key) = key else {
        return Ok(SagaControl::Continue);
      };

      let Some(order_id) = store.find_idempotent_order(user_id, key).await? else {
        return Ok(SagaControl::Continue);
      };
      let Some(order) = store.find_order(order_id).await? else {
        return Ok(SagaControl::Continue);
      };
      let lines = store.order_lines(order_id).await?;

      info!(%order_id, "Idempotency key matched an earlier checkout; replaying.");
      {
        let mut guard = ctx_data.write();
        guard.order = Some(order);
        guard.order_lines = lines;
        guard.replayed = true;
      }
      Ok::<_, AppError>(SagaControl::Stop)
    })
  });

  saga.on("load_cart", |ctx_data: ContextData<CheckoutCtxData>| {
    Box::pin(async move {
      let (user_id, store) = {
        let guard = ctx_data.read();
        (guard.user_id, guard.app_state.store.clone())
      };

      if store.find_user(user_id).await?.is_none() {
        return Err(AppError::NotFound(format!("User {} not found", user_id)));
      }
      let cart = store
        .find_cart(user_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Cart not found".to_string()))?;
      let lines = store.cart_lines(cart.id).await?;
      if lines.is_empty() {
        warn!(cart_id = %cart.id, "Checkout attempted on an empty cart.");
        return Err(AppError::EmptyCart);
      }

      {
        let mut guard = ctx_data.write();
        guard.cart = Some(cart);
        guard.cart_lines = lines;
      }
      Ok::<_, AppError>(SagaControl::Continue)
    })
  });

  saga.on("capture_prices", |ctx_data: ContextData<CheckoutCtxData>| {
    Box::pin(async move {
      let (cart_lines, store) = {
        let guard = ctx_data.read();
        (guard.cart_lines.clone(), guard.app_state.store.clone())
      };

      let mut priced = Vec::with_capacity(cart_lines.len());
      for line in &cart_lines {
        let product = store
          .find_product(line.product_id)
          .await?
          .filter(|p| p.is_active)
          .ok_or_else(|| AppError::NotFound(format!("Product {} is no longer available", line.product_id)))?;
        priced.push(PricedLine {
          product_id: product.id,
          product_name: product.name,
          quantity: line.quantity,
          unit_price_cents: product.price_cents,
        });
      }
      let total_cents = lines_total_cents(priced.iter().map(|l| (l.unit_price_cents, l.quantity)))?;

      {
        let mut guard = ctx_data.write();
        guard.priced_lines = priced;
        guard.total_cents = total_cents;
      }
      Ok::<_, AppError>(SagaControl::Continue)
    })
  });

  saga.on("create_order", |ctx_data: ContextData<CheckoutCtxData>| {
    Box::pin(async move {
      let (new_order, store) = {
        let guard = ctx_data.read();
        (
          NewOrder {
            id: Uuid::new_v4(),
            user_id: guard.user_id,
            total_cents: guard.total_cents,
            currency: guard.app_state.config.payment_currency.clone(),
          },
          guard.app_state.store.clone(),
        )
      };

      let order = store.insert_order(&new_order).await?;
      info!(order_id = %order.id, total_cents = order.total_cents, "Order created.");
      ctx_data.write().order = Some(order);
      Ok::<_, AppError>(SagaControl::Continue)
    })
  });

  saga.compensate("create_order", |ctx_data: ContextData<CheckoutCtxData>| {
    Box::pin(async move {
      let (order_id, store) = {
        let guard = ctx_data.read();
        (guard.order.as_ref().map(|o| o.id), guard.app_state.store.clone())
      };
      if let Some(order_id) = order_id {
        store.delete_order(order_id).await?;
        warn!(%order_id, "Order deleted during checkout rollback.");
      }
      Ok::<_, AppError>(())
    })
  });

  saga.on("copy_lines", |ctx_data: ContextData<CheckoutCtxData>| {
    Box::pin(async move {
      let (new_lines, store) = {
        let guard = ctx_data.read();
        let order_id = guard
          .order
          .as_ref()
          .map(|o| o.id)
          .ok_or_else(|| AppError::Internal("Order missing before line copy".to_string()))?;
        let new_lines: Vec<NewOrderLine> = guard
          .priced_lines
          .iter()
          .map(|l| NewOrderLine {
            order_id,
            product_id: l.product_id,
            product_name: l.product_name.clone(),
            quantity: l.quantity,
            unit_price_cents: l.unit_price_cents,
          })
          .collect();
        (new_lines, guard.app_state.store.clone())
      };

      let lines = store.insert_order_lines(&new_lines).await?;
      ctx_data.write().order_lines = lines;
      Ok::<_, AppError>(SagaControl::Continue)
    })
  });

  saga.compensate("copy_lines", |ctx_data: ContextData<CheckoutCtxData>| {
    Box::pin(async move {
      let (order_id, store) = {
        let guard = ctx_data.read();
        (guard.order.as_ref().map(|o| o.id), guard.app_state.store.clone())
      };
      if let Some(order_id) = order_id {
        store.delete_order_lines(order_id).await?;
      }
      Ok::<_, AppError>(())
    })
  });

  saga.on("clear_cart", |ctx_data: ContextData<CheckoutCtxData>| {
    Box::pin(async move {
      let (cart_id, captured, store) = {
        let guard = ctx_data.read();
        (
          guard.cart.as_ref().map(|c| c.id),
          guard.cart_lines.clone(),
          guard.app_state.store.clone(),
        )
      };
      let cart_id = cart_id.ok_or_else(|| AppError::Internal("Cart missing before clearing".to_string()))?;

      // Only the lines that were priced leave the cart. A concurrent checkout
      // that got there first makes this fail and unwinds our order.
      let cleared = store.take_cart_lines(cart_id, &captured).await.map_err(|e| {
        warn!(%cart_id, error = %e, "Cart changed under checkout.");
        e
      })?;
      info!(%cart_id, lines = cleared.len(), "Cart cleared.");
      ctx_data.write().cleared_lines = cleared;
      Ok::<_, AppError>(SagaControl::Continue)
    })
  });

  saga.compensate("clear_cart", |ctx_data: ContextData<CheckoutCtxData>| {
    Box::pin(async move {
      let (cleared, store) = {
        let guard = ctx_data.read();
        (guard.cleared_lines.clone(), guard.app_state.store.clone())
      };
      store.restore_cart_lines(&cleared).await?;
      Ok::<_, AppError>(())
    })
  });

  saga.on("remember_idempotency_key", |ctx_data: ContextData<CheckoutCtxData>| {
    Box::pin(async move {
      let (user_id, key, order_id, store) = {
        let guard = ctx_data.read();
        (
          guard.user_id,
          guard.idempotency_key,
          guard.order.as_ref().map(|o| o.id),
          guard.app_state.store.clone(),
        )
      };
      if let (Some(key), Some(order_id)) = (key, order_id) {
        store.remember_idempotent_order(user_id, key, order_id).await?;
      }
      Ok::<_, AppError>(SagaControl::Continue)
    })
  });

  registry.register(saga);
}
