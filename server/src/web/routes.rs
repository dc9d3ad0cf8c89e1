// server/src/web/routes.rs

use actix_web::middleware::ErrorHandlers;
use actix_web::{error, web, HttpRequest};

use crate::errors::{attach_error_detail, AppError};
use crate::web::handlers::{
  auth_handlers, cart_handlers, category_handlers, checkout_handlers, client_handlers, comment_handlers,
  health_handlers, order_handlers, payment_handlers, product_handlers, seller_handlers, webhook_handlers,
  wishlist_handlers,
};

fn json_error(err: error::JsonPayloadError, _req: &HttpRequest) -> actix_web::Error {
  AppError::validation("body", format!("Invalid JSON body: {}", err)).into()
}

fn query_error(err: error::QueryPayloadError, _req: &HttpRequest) -> actix_web::Error {
  AppError::validation("query", format!("Invalid query string: {}", err)).into()
}

fn path_error(err: error::PathError, _req: &HttpRequest) -> actix_web::Error {
  AppError::validation("path", format!("Invalid path parameter: {}", err)).into()
}

/// Mounts the whole API under `/api`. Malformed bodies, queries and path
/// ids are answered with the standard validation error; server-side
/// failures carry their detail outside production.
pub fn configure_app_routes(cfg: &mut web::ServiceConfig) {
  cfg
    .app_data(web::JsonConfig::default().error_handler(json_error))
    .app_data(web::QueryConfig::default().error_handler(query_error))
    .app_data(web::PathConfig::default().error_handler(path_error))
    .service(
      web::scope("/api")
        .wrap(ErrorHandlers::new().default_handler(attach_error_detail))
        .route("/health", web::get().to(health_handlers::health_check_handler))
        .service(
          web::scope("/auth")
            .route("/register", web::post().to(auth_handlers::register_handler))
            .route("/login", web::post().to(auth_handlers::login_handler))
            .route("/logout", web::post().to(auth_handlers::logout_handler))
            .route("/me", web::get().to(auth_handlers::me_handler))
            .route("/forgot-password", web::post().to(auth_handlers::forgot_password_handler))
            .route("/reset-password", web::post().to(auth_handlers::reset_password_handler)),
        )
        .service(
          web::scope("/products")
            .service(
              web::resource("")
                .route(web::get().to(product_handlers::list_products_handler))
                .route(web::post().to(product_handlers::create_product_handler)),
            )
            .route("/search", web::get().to(product_handlers::search_products_handler))
            .route("/{id}/related", web::get().to(product_handlers::related_products_handler))
            .route(
              "/{id}/toggle-status",
              web::patch().to(product_handlers::toggle_product_status_handler),
            )
            .route("/{id}/stock", web::patch().to(product_handlers::update_stock_handler))
            .service(
              web::resource("/{id}/comments")
                .route(web::get().to(comment_handlers::list_comments_handler))
                .route(web::post().to(comment_handlers::create_comment_handler)),
            )
            .service(
              web::resource("/{id}")
                .route(web::get().to(product_handlers::get_product_handler))
                .route(web::put().to(product_handlers::update_product_handler))
                .route(web::delete().to(product_handlers::delete_product_handler)),
            ),
        )
        .service(
          web::scope("/sellers")
            .service(
              web::resource("")
                .route(web::get().to(seller_handlers::list_sellers_handler))
                .route(web::post().to(seller_handlers::create_seller_handler)),
            )
            .route("/{id}/verify", web::patch().to(seller_handlers::verify_seller_handler))
            .route("/{id}/products", web::get().to(seller_handlers::seller_products_handler))
            .route("/{id}/orders", web::get().to(seller_handlers::seller_orders_handler))
            .service(
              web::resource("/{id}")
                .route(web::get().to(seller_handlers::get_seller_handler))
                .route(web::put().to(seller_handlers::update_seller_handler))
                .route(web::delete().to(seller_handlers::delete_seller_handler)),
            ),
        )
        .service(
          web::scope("/clients")
            .route("", web::get().to(client_handlers::list_clients_handler))
            .route("/{id}/role", web::patch().to(client_handlers::change_client_role_handler))
            .route("/{id}/orders", web::get().to(client_handlers::client_orders_handler))
            .route("/{id}/comments", web::get().to(client_handlers::client_comments_handler))
            .service(
              web::resource("/{id}")
                .route(web::get().to(client_handlers::get_client_handler))
                .route(web::put().to(client_handlers::update_client_handler))
                .route(web::delete().to(client_handlers::delete_client_handler)),
            ),
        )
        .route(
          "/comments/{id}/approve",
          web::patch().to(comment_handlers::approve_comment_handler),
        )
        .service(
          web::scope("/categories")
            .service(
              web::resource("")
                .route(web::get().to(category_handlers::list_categories_handler))
                .route(web::post().to(category_handlers::create_category_handler)),
            )
            .route("/{id}/products", web::get().to(category_handlers::category_products_handler))
            .service(
              web::resource("/{id}")
                .route(web::get().to(category_handlers::get_category_handler))
                .route(web::put().to(category_handlers::update_category_handler))
                .route(web::delete().to(category_handlers::delete_category_handler)),
            ),
        )
        .service(
          web::scope("/cart")
            .service(
              web::resource("")
                .route(web::get().to(cart_handlers::get_cart_handler))
                .route(web::delete().to(cart_handlers::clear_cart_handler)),
            )
            .route("/items", web::post().to(cart_handlers::add_to_cart_handler))
            .service(
              web::resource("/items/{product_id}")
                .route(web::put().to(cart_handlers::update_cart_line_handler))
                .route(web::delete().to(cart_handlers::remove_cart_line_handler)),
            ),
        )
        .service(
          web::scope("/orders")
            .service(
              web::resource("")
                .route(web::get().to(order_handlers::list_orders_handler))
                .route(web::post().to(checkout_handlers::checkout_handler)),
            )
            .route("/{id}/status", web::patch().to(order_handlers::update_order_status_handler))
            .route("/{id}/cancel", web::post().to(order_handlers::cancel_order_handler))
            .service(
              web::resource("/{id}")
                .route(web::get().to(order_handlers::get_order_handler))
                .route(web::delete().to(order_handlers::delete_order_handler)),
            ),
        )
        .service(
          web::scope("/payments")
            .route(
              "/checkout/payment-intent",
              web::post().to(payment_handlers::create_payment_intent_handler),
            )
            .route("/webhooks/stripe", web::post().to(webhook_handlers::stripe_webhook_handler)),
        )
        .service(
          web::scope("/wishlist")
            .service(
              web::resource("")
                .route(web::get().to(wishlist_handlers::get_wishlist_handler))
                .route(web::post().to(wishlist_handlers::add_to_wishlist_handler)),
            )
            .route("/{product_id}", web::delete().to(wishlist_handlers::remove_from_wishlist_handler)),
        ),
    );
}
