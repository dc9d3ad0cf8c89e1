// tests/payment_tests.rs

#[macro_use]
mod common;

use actix_web::http::StatusCode;
use actix_web::test::{self, TestRequest};
use chrono::Utc;
use common::{authed, payment_succeeded_event, test_app, test_app_with, test_app_with_config, test_config_with, TestApp};
use serde_json::{json, Value};
use souk::models::{OrderStatus, Role};
use souk::sagas::contexts::CheckoutCtxData;
use souk::services::payments::MockPaymentGateway;
use souk::services::webhooks::SIGNATURE_HEADER;
use souk_flow::{ContextData, SagaOutcome};
use uuid::Uuid;

/// Places a 2 x 10.00 + 1 x 5.00 order through the checkout saga and
/// returns its id with the buyer's token.
async fn place_order(ctx: &TestApp) -> (Uuid, String) {
  let (seller, _) = ctx.user("seller@example.com", Role::Seller).await;
  let (buyer, token) = ctx.user("buyer@example.com", Role::Client).await;
  let plate = ctx.product(seller.id, "Plate", 1000).await;
  let cup = ctx.product(seller.id, "Cup", 500).await;

  let cart = ctx.state.store.get_or_create_cart(buyer.id).await.unwrap();
  ctx.state.store.add_cart_line(cart.id, plate.id, 2).await.unwrap();
  ctx.state.store.add_cart_line(cart.id, cup.id, 1).await.unwrap();

  let ctx_data = ContextData::new(CheckoutCtxData::new(ctx.state.clone(), buyer.id, None));
  let outcome = ctx.state.sagas.run(ctx_data.clone()).await.unwrap();
  assert_eq!(outcome, SagaOutcome::Completed);
  let order_id = ctx_data.inspect(|d| d.order.as_ref().map(|o| o.id)).unwrap();
  (order_id, token)
}

fn webhook_request(ctx: &TestApp, payload: &Value) -> TestRequest {
  let body = serde_json::to_vec(payload).unwrap();
  let signature = ctx
    .state
    .webhook_verifier
    .signature_header(&body, Utc::now().timestamp());
  TestRequest::post()
    .uri("/api/payments/webhooks/stripe")
    .insert_header((SIGNATURE_HEADER, signature))
    .set_payload(body)
}

async fn order_status(ctx: &TestApp, order_id: Uuid) -> OrderStatus {
  ctx.state.store.find_order(order_id).await.unwrap().unwrap().status
}

#[actix_web::test]
async fn payment_intent_amount_comes_from_the_captured_lines() {
  let ctx = test_app();
  let app = init_app!(ctx.state);
  let (order_id, token) = place_order(&ctx).await;

  let req = authed(TestRequest::post().uri("/api/payments/checkout/payment-intent"), &token)
    .set_json(json!({ "order_id": order_id }))
    .to_request();
  let resp = test::call_service(&app, req).await;
  assert_eq!(resp.status(), StatusCode::OK);
  let body: Value = test::read_body_json(resp).await;
  assert_eq!(body["amount"], 2500);
  assert_eq!(body["order_id"], order_id.to_string());
  assert!(body["clientSecret"].as_str().unwrap().starts_with("mock_pi_"));

  let requests = ctx.payments.requests();
  assert_eq!(requests.len(), 1);
  assert_eq!(requests[0].amount_cents, 2500);
  assert_eq!(requests[0].currency, "eur");
  assert_eq!(requests[0].idempotency_key, format!("pi-{}-2500", order_id));
}

#[actix_web::test]
async fn payment_intent_is_refused_for_other_users_and_unknown_orders() {
  let ctx = test_app();
  let app = init_app!(ctx.state);
  let (order_id, _) = place_order(&ctx).await;
  let (_, stranger_token) = ctx.user("stranger@example.com", Role::Client).await;

  let req = authed(TestRequest::post().uri("/api/payments/checkout/payment-intent"), &stranger_token)
    .set_json(json!({ "order_id": order_id }))
    .to_request();
  assert_eq!(test::call_service(&app, req).await.status(), StatusCode::FORBIDDEN);

  let req = authed(TestRequest::post().uri("/api/payments/checkout/payment-intent"), &stranger_token)
    .set_json(json!({ "order_id": Uuid::new_v4() }))
    .to_request();
  assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);
  assert!(ctx.payments.requests().is_empty());
}

#[actix_web::test]
async fn processor_failure_is_an_internal_error() {
  let ctx = test_app_with(MockPaymentGateway::failing("Your card was declined."));
  let app = init_app!(ctx.state);
  let (order_id, token) = place_order(&ctx).await;

  let req = authed(TestRequest::post().uri("/api/payments/checkout/payment-intent"), &token)
    .set_json(json!({ "order_id": order_id }))
    .to_request();
  let resp = test::call_service(&app, req).await;
  assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
  let body: Value = test::read_body_json(resp).await;
  assert_eq!(body["code"], "upstream_error");
  assert!(body["detail"].as_str().unwrap().contains("declined"));
  assert_eq!(order_status(&ctx, order_id).await, OrderStatus::Pending);
}

#[actix_web::test]
async fn production_hides_processor_detail() {
  let config = test_config_with(&[("APP_ENV", "production")]);
  let ctx = test_app_with_config(config, MockPaymentGateway::failing("Your card was declined."));
  let app = init_app!(ctx.state);
  let (order_id, token) = place_order(&ctx).await;

  let req = authed(TestRequest::post().uri("/api/payments/checkout/payment-intent"), &token)
    .set_json(json!({ "order_id": order_id }))
    .to_request();
  let resp = test::call_service(&app, req).await;
  assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
  let body: Value = test::read_body_json(resp).await;
  assert_eq!(body["code"], "upstream_error");
  assert!(body.get("detail").is_none());
  assert!(!body.to_string().contains("declined"));
}

#[actix_web::test]
async fn bad_signatures_change_nothing() {
  let ctx = test_app();
  let app = init_app!(ctx.state);
  let (order_id, _) = place_order(&ctx).await;
  let payload = serde_json::to_vec(&payment_succeeded_event("evt_forged", "pi_forged", order_id)).unwrap();
  let now = Utc::now().timestamp();

  let headers = [
    Some(format!("t={},v1={}", now, "00".repeat(32))),
    Some("garbage".to_string()),
    None,
  ];
  for header in headers {
    let mut req = TestRequest::post()
      .uri("/api/payments/webhooks/stripe")
      .set_payload(payload.clone());
    if let Some(header) = header {
      req = req.insert_header((SIGNATURE_HEADER, header));
    }
    let resp = test::call_service(&app, req.to_request()).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["code"], "invalid_signature");
  }

  // Correctly signed but outside the tolerance window.
  let stale = ctx.state.webhook_verifier.signature_header(&payload, now - 3600);
  let req = TestRequest::post()
    .uri("/api/payments/webhooks/stripe")
    .insert_header((SIGNATURE_HEADER, stale))
    .set_payload(payload.clone())
    .to_request();
  assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);

  assert_eq!(order_status(&ctx, order_id).await, OrderStatus::Pending);
  assert!(!ctx.state.store.is_event_processed("evt_forged").await.unwrap());
}

#[actix_web::test]
async fn succeeded_event_marks_the_order_paid_once() {
  let ctx = test_app();
  let app = init_app!(ctx.state);
  let (order_id, token) = place_order(&ctx).await;
  let event = payment_succeeded_event("evt_1", "pi_123", order_id);

  let resp = test::call_service(&app, webhook_request(&ctx, &event).to_request()).await;
  assert_eq!(resp.status(), StatusCode::OK);
  let body: Value = test::read_body_json(resp).await;
  assert_eq!(body, json!({ "received": true }));

  let order = ctx.state.store.find_order(order_id).await.unwrap().unwrap();
  assert_eq!(order.status, OrderStatus::Paid);
  assert_eq!(order.payment_intent_id.as_deref(), Some("pi_123"));
  let paid_at = order.paid_at.expect("paid_at recorded");

  let resp = test::call_service(&app, webhook_request(&ctx, &event).to_request()).await;
  assert_eq!(resp.status(), StatusCode::OK);
  let body: Value = test::read_body_json(resp).await;
  assert_eq!(body, json!({ "received": true, "duplicate": true }));
  let order = ctx.state.store.find_order(order_id).await.unwrap().unwrap();
  assert_eq!(order.paid_at, Some(paid_at));

  // A paid order cannot be charged again.
  let req = authed(TestRequest::post().uri("/api/payments/checkout/payment-intent"), &token)
    .set_json(json!({ "order_id": order_id }))
    .to_request();
  assert_eq!(test::call_service(&app, req).await.status(), StatusCode::CONFLICT);
}

#[actix_web::test]
async fn failed_and_unrelated_events_are_acknowledged_without_changes() {
  let ctx = test_app();
  let app = init_app!(ctx.state);
  let (order_id, _) = place_order(&ctx).await;

  let failed = json!({
    "id": "evt_failed",
    "type": "payment_intent.payment_failed",
    "data": { "object": { "id": "pi_9", "metadata": { "order_id": order_id.to_string() } } }
  });
  let refunded = json!({
    "id": "evt_other",
    "type": "charge.refunded",
    "data": { "object": { "id": "ch_1" } }
  });
  let unknown_order = payment_succeeded_event("evt_orphan", "pi_7", Uuid::new_v4());

  for event in [&failed, &refunded, &unknown_order] {
    let resp = test::call_service(&app, webhook_request(&ctx, event).to_request()).await;
    assert_eq!(resp.status(), StatusCode::OK);
  }

  assert_eq!(order_status(&ctx, order_id).await, OrderStatus::Pending);
  assert!(ctx.state.store.is_event_processed("evt_failed").await.unwrap());

  let resp = test::call_service(&app, webhook_request(&ctx, &failed).to_request()).await;
  let body: Value = test::read_body_json(resp).await;
  assert_eq!(body["duplicate"], true);
}

#[actix_web::test]
async fn signed_but_malformed_event_is_rejected() {
  let ctx = test_app();
  let app = init_app!(ctx.state);

  let resp = test::call_service(&app, webhook_request(&ctx, &json!({ "unexpected": true })).to_request()).await;
  assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}
