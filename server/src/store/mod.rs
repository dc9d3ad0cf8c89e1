// server/src/store/mod.rs

//! Data access. Handlers and sagas only see these traits; `PgStore` backs
//! them with Postgres and `MemoryStore` with in-process maps.

pub mod memory;
pub mod pg;

use crate::errors::Result;
use crate::models::{
  Cart, CartLine, Category, CategoryDetail, CategoryWithCounts, Comment, Credentials, NewCategory, NewComment,
  NewOrder, NewOrderLine, NewProduct, NewSeller, NewUser, Order, OrderLine, OrderQuery, OrderStatus, PageParams,
  Product, ProductFilter, ProductPatch, RatingSummary, Role, Seller, SellerPatch, SellerQuery, SellerWithStats,
  StockChange, User, UserPatch, UserQuery, WishlistEntry, WishlistItem,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use uuid::Uuid;

pub use memory::MemoryStore;
pub use pg::PgStore;

#[async_trait]
pub trait UserStore: Send + Sync {
  /// Fails with `Conflict` when the email is already registered.
  async fn insert_user(&self, user: &NewUser) -> Result<User>;
  async fn find_user(&self, id: Uuid) -> Result<Option<User>>;
  async fn find_user_by_email(&self, email: &str) -> Result<Option<User>>;
  async fn set_user_role(&self, id: Uuid, role: Role) -> Result<Option<User>>;
  /// Newest first.
  async fn list_users(&self, query: &UserQuery) -> Result<(Vec<User>, i64)>;
  async fn update_user(&self, id: Uuid, patch: &UserPatch) -> Result<Option<User>>;
  /// Deletes the profile and everything it owns: sessions, cart, wishlist,
  /// comments, orders, products and seller profile.
  async fn delete_user(&self, id: Uuid) -> Result<bool>;
}

/// Password and session records of the local identity provider.
#[async_trait]
pub trait CredentialStore: Send + Sync {
  async fn insert_credentials(&self, credentials: &Credentials) -> Result<()>;
  async fn find_credentials_by_email(&self, email: &str) -> Result<Option<Credentials>>;
  async fn update_password_hash(&self, user_id: Uuid, password_hash: &str) -> Result<()>;
  async fn delete_credentials(&self, user_id: Uuid) -> Result<()>;

  async fn insert_session(&self, token_digest: &str, user_id: Uuid, expires_at: DateTime<Utc>) -> Result<()>;
  /// Returns the owner of an unexpired session.
  async fn find_session(&self, token_digest: &str) -> Result<Option<Uuid>>;
  async fn delete_session(&self, token_digest: &str) -> Result<()>;
}

#[async_trait]
pub trait CatalogStore: Send + Sync {
  async fn list_categories(&self) -> Result<Vec<CategoryWithCounts>>;
  async fn find_category(&self, id: Uuid) -> Result<Option<Category>>;
  async fn category_detail(&self, id: Uuid) -> Result<Option<CategoryDetail>>;
  /// Case-insensitive name check, optionally ignoring one category.
  async fn category_name_taken(&self, name: &str, except: Option<Uuid>) -> Result<bool>;
  async fn insert_category(&self, category: &NewCategory) -> Result<Category>;
  async fn update_category(&self, id: Uuid, category: &NewCategory) -> Result<Option<Category>>;
  async fn delete_category(&self, id: Uuid) -> Result<bool>;
  /// Active and inactive products linked to the category.
  async fn count_category_products(&self, id: Uuid) -> Result<i64>;

  async fn list_products(&self, filter: &ProductFilter) -> Result<(Vec<Product>, i64)>;
  async fn find_product(&self, id: Uuid) -> Result<Option<Product>>;
  async fn insert_product(&self, product: &NewProduct) -> Result<Product>;
  async fn update_product(&self, id: Uuid, patch: &ProductPatch) -> Result<Option<Product>>;
  /// Fails with a validation error when the stock would leave `0..=i32::MAX`.
  async fn adjust_stock(&self, id: Uuid, change: StockChange) -> Result<Option<Product>>;
  /// Returns how many products were switched off.
  async fn deactivate_seller_products(&self, seller_id: Uuid) -> Result<u64>;
}

#[async_trait]
pub trait CommentStore: Send + Sync {
  async fn list_approved_comments(&self, product_id: Uuid, page: &PageParams) -> Result<(Vec<Comment>, i64)>;
  async fn insert_comment(&self, comment: &NewComment) -> Result<Comment>;
  async fn approve_comment(&self, id: Uuid) -> Result<Option<Comment>>;
  /// Rating aggregates keyed by product; products without approved
  /// comments are absent.
  async fn rating_summaries(&self, product_ids: &[Uuid]) -> Result<HashMap<Uuid, RatingSummary>>;
  /// Approved comments across every product of the seller.
  async fn seller_rating(&self, seller_id: Uuid) -> Result<RatingSummary>;
  /// Newest first.
  async fn list_user_comments(
    &self,
    user_id: Uuid,
    include_unapproved: bool,
    page: &PageParams,
  ) -> Result<(Vec<Comment>, i64)>;
}

#[async_trait]
pub trait CartStore: Send + Sync {
  async fn find_cart(&self, user_id: Uuid) -> Result<Option<Cart>>;
  async fn get_or_create_cart(&self, user_id: Uuid) -> Result<Cart>;
  async fn cart_lines(&self, cart_id: Uuid) -> Result<Vec<CartLine>>;
  /// Adds `quantity` to the line for `product_id`, creating it if needed.
  async fn add_cart_line(&self, cart_id: Uuid, product_id: Uuid, quantity: i32) -> Result<CartLine>;
  async fn set_cart_line_quantity(&self, cart_id: Uuid, product_id: Uuid, quantity: i32) -> Result<Option<CartLine>>;
  async fn remove_cart_line(&self, cart_id: Uuid, product_id: Uuid) -> Result<bool>;
  /// Removes every line and returns them; the cart row stays.
  async fn clear_cart(&self, cart_id: Uuid) -> Result<Vec<CartLine>>;
  /// Removes exactly `lines`, all or nothing. Fails with `Conflict` when
  /// any of them is gone or its quantity changed; other lines stay.
  async fn take_cart_lines(&self, cart_id: Uuid, lines: &[CartLine]) -> Result<Vec<CartLine>>;
  async fn restore_cart_lines(&self, lines: &[CartLine]) -> Result<()>;
}

#[async_trait]
pub trait OrderStore: Send + Sync {
  async fn insert_order(&self, order: &NewOrder) -> Result<Order>;
  async fn insert_order_lines(&self, lines: &[NewOrderLine]) -> Result<Vec<OrderLine>>;
  async fn delete_order_lines(&self, order_id: Uuid) -> Result<()>;
  /// Deletes the order together with its lines.
  async fn delete_order(&self, order_id: Uuid) -> Result<bool>;
  async fn find_order(&self, id: Uuid) -> Result<Option<Order>>;
  async fn order_lines(&self, order_id: Uuid) -> Result<Vec<OrderLine>>;
  async fn list_orders(&self, query: &OrderQuery) -> Result<(Vec<Order>, i64)>;
  async fn set_order_status(&self, id: Uuid, status: OrderStatus, cancel_reason: Option<&str>) -> Result<Option<Order>>;
  async fn mark_order_paid(&self, id: Uuid, payment_intent_id: &str, paid_at: DateTime<Utc>) -> Result<Option<Order>>;
  /// Orders holding at least one line of the seller's products, newest first.
  async fn list_seller_orders(
    &self,
    seller_id: Uuid,
    status: Option<OrderStatus>,
    page: &PageParams,
  ) -> Result<(Vec<Order>, i64)>;
  /// Open orders placed by the user. See `OrderStatus::is_open`.
  async fn count_open_orders(&self, user_id: Uuid) -> Result<i64>;
  /// Open orders holding the seller's products.
  async fn count_open_seller_orders(&self, seller_id: Uuid) -> Result<i64>;
}

/// Shop profiles. `seller_id` elsewhere in the store is the owning user's
/// id; these methods take the profile id unless named otherwise.
#[async_trait]
pub trait SellerStore: Send + Sync {
  /// Fails with `Conflict` when the user already has a shop or the SIRET is taken.
  async fn insert_seller(&self, seller: &NewSeller) -> Result<Seller>;
  async fn find_seller(&self, id: Uuid) -> Result<Option<Seller>>;
  async fn find_seller_by_user(&self, user_id: Uuid) -> Result<Option<Seller>>;
  /// Newest first, with active product counts.
  async fn list_sellers(&self, query: &SellerQuery) -> Result<(Vec<SellerWithStats>, i64)>;
  async fn update_seller(&self, id: Uuid, patch: &SellerPatch) -> Result<Option<Seller>>;
  async fn verify_seller(&self, id: Uuid) -> Result<Option<Seller>>;
  /// Removes the profile and deactivates the owner's products.
  async fn delete_seller(&self, id: Uuid) -> Result<bool>;
}

#[async_trait]
pub trait WishlistStore: Send + Sync {
  async fn wishlist(&self, user_id: Uuid) -> Result<Vec<WishlistEntry>>;
  /// Fails with `Conflict` when the product is already listed.
  async fn add_to_wishlist(&self, user_id: Uuid, product_id: Uuid) -> Result<WishlistItem>;
  async fn remove_from_wishlist(&self, user_id: Uuid, product_id: Uuid) -> Result<bool>;
}

/// Processed payment-processor events, for at-least-once delivery.
#[async_trait]
pub trait WebhookEventStore: Send + Sync {
  async fn is_event_processed(&self, event_id: &str) -> Result<bool>;
  /// Returns `false` when the event was already recorded.
  async fn record_event(&self, event_id: &str, event_type: &str) -> Result<bool>;
}

/// Checkout idempotency keys, scoped per user.
#[async_trait]
pub trait IdempotencyStore: Send + Sync {
  async fn find_idempotent_order(&self, user_id: Uuid, key: Uuid) -> Result<Option<Uuid>>;
  /// Fails with `Conflict` when the key is already bound.
  async fn remember_idempotent_order(&self, user_id: Uuid, key: Uuid, order_id: Uuid) -> Result<()>;
}

pub trait Store:
  UserStore
  + CredentialStore
  + CatalogStore
  + CommentStore
  + CartStore
  + OrderStore
  + WishlistStore
  + WebhookEventStore
  + IdempotencyStore
  + SellerStore
{
}

impl<T> Store for T where
  T: UserStore
    + CredentialStore
    + CatalogStore
    + CommentStore
    + CartStore
    + OrderStore
    + WishlistStore
    + WebhookEventStore
    + IdempotencyStore
  + SellerStore
{
}
