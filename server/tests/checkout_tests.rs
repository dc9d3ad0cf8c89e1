// tests/checkout_tests.rs

#[macro_use]
mod common;

use actix_web::http::StatusCode;
use actix_web::test::{self, TestRequest};
use common::{add_to_cart, authed, test_app};
use serde_json::{json, Value};
use souk::errors::AppError;
use souk::models::{NewUser, OrderQuery, PageParams, ProductPatch, Role};
use souk::sagas::contexts::CheckoutCtxData;
use souk_flow::{ContextData, SagaOutcome};
use uuid::Uuid;

#[actix_web::test]
async fn checkout_turns_the_cart_into_an_order() {
  let ctx = test_app();
  let app = init_app!(ctx.state);
  let (seller, _) = ctx.user("seller@example.com", Role::Seller).await;
  let (client, token) = ctx.user("client@example.com", Role::Client).await;
  let plate = ctx.product(seller.id, "Plate", 1000).await;
  let cup = ctx.product(seller.id, "Cup", 500).await;

  for (product_id, quantity) in [(plate.id, 2), (cup.id, 1)] {
    let resp = test::call_service(&app, add_to_cart(&token, product_id, quantity).to_request()).await;
    assert_eq!(resp.status(), StatusCode::CREATED);
  }

  let req = authed(TestRequest::post().uri("/api/orders"), &token).to_request();
  let resp = test::call_service(&app, req).await;
  assert_eq!(resp.status(), StatusCode::CREATED);
  let order: Value = test::read_body_json(resp).await;
  assert_eq!(order["total_cents"], 2500);
  assert_eq!(order["status"], "PENDING");
  assert_eq!(order["currency"], "eur");
  assert_eq!(order["user_id"], client.id.to_string());
  assert_eq!(order["lines"].as_array().unwrap().len(), 2);

  let req = authed(TestRequest::get().uri("/api/cart"), &token).to_request();
  let body: Value = test::call_and_read_body_json(&app, req).await;
  assert!(body["cart"]["cart_id"].is_string());
  assert_eq!(body["cart"]["lines"].as_array().unwrap().len(), 0);
  assert_eq!(body["cart"]["total_cents"], 0);
}

#[actix_web::test]
async fn later_price_changes_do_not_touch_the_order() {
  let ctx = test_app();
  let app = init_app!(ctx.state);
  let (seller, _) = ctx.user("seller@example.com", Role::Seller).await;
  let (_, token) = ctx.user("client@example.com", Role::Client).await;
  let plate = ctx.product(seller.id, "Plate", 1000).await;

  test::call_service(&app, add_to_cart(&token, plate.id, 3).to_request()).await;
  let req = authed(TestRequest::post().uri("/api/orders"), &token).to_request();
  let order: Value = test::call_and_read_body_json(&app, req).await;
  let order_id = order["id"].as_str().unwrap().to_string();

  ctx
    .state
    .store
    .update_product(
      plate.id,
      &ProductPatch {
        price_cents: Some(9999),
        ..ProductPatch::default()
      },
    )
    .await
    .unwrap();

  let req = authed(TestRequest::get().uri(&format!("/api/orders/{}", order_id)), &token).to_request();
  let order: Value = test::call_and_read_body_json(&app, req).await;
  assert_eq!(order["total_cents"], 3000);
  assert_eq!(order["lines"][0]["unit_price_cents"], 1000);
  assert_eq!(order["lines"][0]["product_name"], "Plate");
}

#[actix_web::test]
async fn empty_cart_is_rejected() {
  let ctx = test_app();
  let app = init_app!(ctx.state);
  let (seller, _) = ctx.user("seller@example.com", Role::Seller).await;
  let (_, token) = ctx.user("client@example.com", Role::Client).await;
  let plate = ctx.product(seller.id, "Plate", 1000).await;

  // No cart at all.
  let req = authed(TestRequest::post().uri("/api/orders"), &token).to_request();
  assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);

  // A cart whose only line was removed.
  test::call_service(&app, add_to_cart(&token, plate.id, 1).to_request()).await;
  let req = authed(TestRequest::delete().uri(&format!("/api/cart/items/{}", plate.id)), &token).to_request();
  assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);

  let req = authed(TestRequest::post().uri("/api/orders"), &token).to_request();
  let resp = test::call_service(&app, req).await;
  assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
  let body: Value = test::read_body_json(resp).await;
  assert_eq!(body["code"], "empty_cart");

  let req = authed(TestRequest::get().uri("/api/orders"), &token).to_request();
  let body: Value = test::call_and_read_body_json(&app, req).await;
  assert_eq!(body["pagination"]["total"], 0);
}

#[actix_web::test]
async fn deactivated_product_blocks_checkout_and_keeps_the_cart() {
  let ctx = test_app();
  let app = init_app!(ctx.state);
  let (seller, _) = ctx.user("seller@example.com", Role::Seller).await;
  let (_, token) = ctx.user("client@example.com", Role::Client).await;
  let plate = ctx.product(seller.id, "Plate", 1000).await;

  test::call_service(&app, add_to_cart(&token, plate.id, 2).to_request()).await;
  ctx
    .state
    .store
    .update_product(
      plate.id,
      &ProductPatch {
        is_active: Some(false),
        ..ProductPatch::default()
      },
    )
    .await
    .unwrap();

  let req = authed(TestRequest::post().uri("/api/orders"), &token).to_request();
  assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);

  let req = authed(TestRequest::get().uri("/api/cart"), &token).to_request();
  let body: Value = test::call_and_read_body_json(&app, req).await;
  assert_eq!(body["cart"]["lines"][0]["quantity"], 2);
}

#[actix_web::test]
async fn idempotency_key_replays_the_first_order() {
  let ctx = test_app();
  let app = init_app!(ctx.state);
  let (seller, _) = ctx.user("seller@example.com", Role::Seller).await;
  let (_, token) = ctx.user("client@example.com", Role::Client).await;
  let plate = ctx.product(seller.id, "Plate", 1000).await;
  let cup = ctx.product(seller.id, "Cup", 500).await;
  let key = Uuid::new_v4().to_string();

  test::call_service(&app, add_to_cart(&token, plate.id, 1).to_request()).await;
  let req = authed(TestRequest::post().uri("/api/orders"), &token)
    .insert_header(("Idempotency-Key", key.as_str()))
    .to_request();
  let resp = test::call_service(&app, req).await;
  assert_eq!(resp.status(), StatusCode::CREATED);
  let first: Value = test::read_body_json(resp).await;

  // New cart content must survive the replay.
  test::call_service(&app, add_to_cart(&token, cup.id, 4).to_request()).await;
  let req = authed(TestRequest::post().uri("/api/orders"), &token)
    .insert_header(("Idempotency-Key", key.as_str()))
    .to_request();
  let resp = test::call_service(&app, req).await;
  assert_eq!(resp.status(), StatusCode::OK);
  let replayed: Value = test::read_body_json(resp).await;
  assert_eq!(replayed["id"], first["id"]);
  assert_eq!(replayed["total_cents"], 1000);

  let req = authed(TestRequest::get().uri("/api/cart"), &token).to_request();
  let body: Value = test::call_and_read_body_json(&app, req).await;
  assert_eq!(body["cart"]["total_cents"], 2000);

  let req = authed(TestRequest::post().uri("/api/orders"), &token)
    .insert_header(("Idempotency-Key", "not-a-uuid"))
    .to_request();
  assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn orders_are_private_to_their_owner_and_admins() {
  let ctx = test_app();
  let app = init_app!(ctx.state);
  let (seller, _) = ctx.user("seller@example.com", Role::Seller).await;
  let (_, owner_token) = ctx.user("owner@example.com", Role::Client).await;
  let (_, other_token) = ctx.user("other@example.com", Role::Client).await;
  let (_, admin_token) = ctx.user("admin@example.com", Role::Admin).await;
  let plate = ctx.product(seller.id, "Plate", 1000).await;

  test::call_service(&app, add_to_cart(&owner_token, plate.id, 1).to_request()).await;
  let req = authed(TestRequest::post().uri("/api/orders"), &owner_token).to_request();
  let order: Value = test::call_and_read_body_json(&app, req).await;
  let uri = format!("/api/orders/{}", order["id"].as_str().unwrap());

  let req = authed(TestRequest::get().uri(&uri), &other_token).to_request();
  assert_eq!(test::call_service(&app, req).await.status(), StatusCode::FORBIDDEN);
  let req = authed(TestRequest::get().uri(&uri), &admin_token).to_request();
  assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);

  let req = authed(TestRequest::get().uri("/api/orders"), &other_token).to_request();
  let body: Value = test::call_and_read_body_json(&app, req).await;
  assert_eq!(body["pagination"]["total"], 0);
  let req = authed(TestRequest::get().uri("/api/orders?status=PENDING"), &admin_token).to_request();
  let body: Value = test::call_and_read_body_json(&app, req).await;
  assert_eq!(body["pagination"]["total"], 1);
  let req = authed(TestRequest::get().uri("/api/orders?status=LOST"), &admin_token).to_request();
  assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);

  let req = authed(TestRequest::delete().uri(&uri), &owner_token).to_request();
  assert_eq!(test::call_service(&app, req).await.status(), StatusCode::FORBIDDEN);
  let req = authed(TestRequest::delete().uri(&uri), &admin_token).to_request();
  assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);
  let req = authed(TestRequest::get().uri(&uri), &admin_token).to_request();
  assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);
}

#[actix_web::test]
async fn status_overwrite_is_permissive_but_never_paid() {
  let ctx = test_app();
  let app = init_app!(ctx.state);
  let (seller, seller_token) = ctx.user("seller@example.com", Role::Seller).await;
  let (_, client_token) = ctx.user("client@example.com", Role::Client).await;
  let plate = ctx.product(seller.id, "Plate", 1000).await;

  test::call_service(&app, add_to_cart(&client_token, plate.id, 1).to_request()).await;
  let req = authed(TestRequest::post().uri("/api/orders"), &client_token).to_request();
  let order: Value = test::call_and_read_body_json(&app, req).await;
  let uri = format!("/api/orders/{}/status", order["id"].as_str().unwrap());

  for status in ["DELIVERED", "PENDING", "SHIPPED"] {
    let req = authed(TestRequest::patch().uri(&uri), &seller_token)
      .set_json(json!({ "status": status }))
      .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["order"]["status"], status);
  }

  let req = authed(TestRequest::patch().uri(&uri), &seller_token)
    .set_json(json!({ "status": "PAID" }))
    .to_request();
  assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);

  let req = authed(TestRequest::patch().uri(&uri), &client_token)
    .set_json(json!({ "status": "CANCELLED" }))
    .to_request();
  assert_eq!(test::call_service(&app, req).await.status(), StatusCode::FORBIDDEN);
}

#[actix_web::test]
async fn cancel_is_allowed_until_shipping() {
  let ctx = test_app();
  let app = init_app!(ctx.state);
  let (seller, seller_token) = ctx.user("seller@example.com", Role::Seller).await;
  let (_, client_token) = ctx.user("client@example.com", Role::Client).await;
  let plate = ctx.product(seller.id, "Plate", 1000).await;

  let mut order_ids = Vec::new();
  for _ in 0..2 {
    test::call_service(&app, add_to_cart(&client_token, plate.id, 1).to_request()).await;
    let req = authed(TestRequest::post().uri("/api/orders"), &client_token).to_request();
    let order: Value = test::call_and_read_body_json(&app, req).await;
    order_ids.push(order["id"].as_str().unwrap().to_string());
  }

  let req = authed(TestRequest::post().uri(&format!("/api/orders/{}/cancel", order_ids[0])), &client_token)
    .set_json(json!({ "reason": "Changed my mind" }))
    .to_request();
  let body: Value = test::call_and_read_body_json(&app, req).await;
  assert_eq!(body["order"]["status"], "CANCELLED");
  assert_eq!(body["order"]["cancel_reason"], "Changed my mind");

  let req = authed(TestRequest::post().uri(&format!("/api/orders/{}/cancel", order_ids[0])), &client_token).to_request();
  assert_eq!(test::call_service(&app, req).await.status(), StatusCode::CONFLICT);

  let req = authed(TestRequest::patch().uri(&format!("/api/orders/{}/status", order_ids[1])), &seller_token)
    .set_json(json!({ "status": "SHIPPED" }))
    .to_request();
  assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);
  let req = authed(TestRequest::post().uri(&format!("/api/orders/{}/cancel", order_ids[1])), &client_token).to_request();
  assert_eq!(test::call_service(&app, req).await.status(), StatusCode::CONFLICT);
}

#[actix_web::test]
async fn failure_after_the_cart_is_cleared_restores_it_and_drops_the_order() {
  let ctx = test_app();
  let app = init_app!(ctx.state);
  let (seller, _) = ctx.user("seller@example.com", Role::Seller).await;
  let (client, token) = ctx.user("client@example.com", Role::Client).await;
  let plate = ctx.product(seller.id, "Plate", 1000).await;
  let cup = ctx.product(seller.id, "Cup", 500).await;
  test::call_service(&app, add_to_cart(&token, plate.id, 2).to_request()).await;
  test::call_service(&app, add_to_cart(&token, cup.id, 1).to_request()).await;

  // A key bound to a vanished order is not replayed, so the last step
  // collides with it after the cart has already been emptied.
  let key = Uuid::new_v4();
  ctx
    .state
    .store
    .remember_idempotent_order(client.id, key, Uuid::new_v4())
    .await
    .unwrap();

  let req = authed(TestRequest::post().uri("/api/orders"), &token)
    .insert_header(("Idempotency-Key", key.to_string()))
    .to_request();
  assert_eq!(test::call_service(&app, req).await.status(), StatusCode::CONFLICT);

  let (orders, total) = ctx
    .state
    .store
    .list_orders(&OrderQuery {
      user_id: Some(client.id),
      status: None,
      page: PageParams::default(),
    })
    .await
    .unwrap();
  assert!(orders.is_empty());
  assert_eq!(total, 0);

  let req = authed(TestRequest::get().uri("/api/cart"), &token).to_request();
  let body: Value = test::call_and_read_body_json(&app, req).await;
  assert_eq!(body["cart"]["lines"].as_array().unwrap().len(), 2);
  assert_eq!(body["cart"]["total_cents"], 2500);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_checkouts_of_one_cart_create_one_order() {
  let ctx = test_app();
  let (seller, _) = ctx.user("seller@example.com", Role::Seller).await;
  let plate = ctx.product(seller.id, "Plate", 1000).await;

  for round in 0..25 {
    let client = ctx
      .state
      .store
      .insert_user(&NewUser {
        id: Uuid::new_v4(),
        email: format!("client{}@example.com", round),
        first_name: "Race".to_string(),
        last_name: "Client".to_string(),
        phone: None,
        street: None,
        postal_code: None,
        city: None,
        role: Role::Client,
      })
      .await
      .unwrap();
    let cart = ctx.state.store.get_or_create_cart(client.id).await.unwrap();
    ctx.state.store.add_cart_line(cart.id, plate.id, 2).await.unwrap();

    let runs: Vec<_> = (0..2)
      .map(|_| {
        let state = ctx.state.clone();
        tokio::spawn(async move {
          let ctx_data = ContextData::new(CheckoutCtxData::new(state.clone(), client.id, None));
          state.sagas.run(ctx_data).await
        })
      })
      .collect();
    let mut completed = 0;
    for run in runs {
      match run.await.unwrap() {
        Ok(outcome) => {
          assert_eq!(outcome, SagaOutcome::Completed);
          completed += 1;
        }
        Err(err) => assert!(
          matches!(err, AppError::Conflict(_) | AppError::EmptyCart),
          "unexpected checkout error: {err:?}"
        ),
      }
    }

    let (orders, total) = ctx
      .state
      .store
      .list_orders(&OrderQuery {
        user_id: Some(client.id),
        status: None,
        page: PageParams::default(),
      })
      .await
      .unwrap();
    assert_eq!(completed, 1, "round {round}");
    assert_eq!(total, 1, "round {round}");
    assert_eq!(orders[0].total_cents, 2000);
    assert!(ctx.state.store.cart_lines(cart.id).await.unwrap().is_empty());
  }
}

#[actix_web::test]
async fn total_beyond_the_payable_range_is_a_bad_request() {
  let ctx = test_app();
  let app = init_app!(ctx.state);
  let (seller, _) = ctx.user("seller@example.com", Role::Seller).await;
  let (client, token) = ctx.user("client@example.com", Role::Client).await;
  let jewel = ctx.product(seller.id, "Crown jewel", i64::MAX / 2).await;
  test::call_service(&app, add_to_cart(&token, jewel.id, 3).to_request()).await;

  let req = authed(TestRequest::post().uri("/api/orders"), &token).to_request();
  let resp = test::call_service(&app, req).await;
  assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
  let body: Value = test::read_body_json(resp).await;
  assert_eq!(body["code"], "validation_error");

  let cart = ctx.state.store.find_cart(client.id).await.unwrap().unwrap();
  assert_eq!(ctx.state.store.cart_lines(cart.id).await.unwrap().len(), 1);
}
