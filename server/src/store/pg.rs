// server/src/store/pg.rs

use super::{
  CartStore, CatalogStore, CommentStore, CredentialStore, IdempotencyStore, OrderStore, SellerStore, UserStore,
  WebhookEventStore, WishlistStore,
};
use crate::errors::{AppError, Result};
use crate::models::{
  Cart, CartLine, Category, CategoryDetail, CategoryWithCounts, Comment, Credentials, NewCategory, NewComment,
  NewOrder, NewOrderLine, NewProduct, NewSeller, NewUser, Order, OrderLine, OrderQuery, OrderStatus, PageParams,
  Product, ProductFilter, ProductPatch, RatingSummary, Role, Seller, SellerPatch, SellerQuery, SellerWithStats,
  StockChange, User, UserPatch, UserQuery, WishlistEntry, WishlistItem, MAX_LINE_QUANTITY,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, QueryBuilder};
use std::collections::HashMap;
use tracing::{info, instrument};
use uuid::Uuid;

const USER_COLUMNS: &str =
  "id, email, first_name, last_name, phone, street, postal_code, city, role, created_at, updated_at";
const PRODUCT_COLUMNS: &str =
  "id, seller_id, category_id, name, description, price_cents, stock, image_url, is_active, created_at, updated_at";
const ORDER_COLUMNS: &str =
  "id, user_id, status, total_cents, currency, payment_intent_id, paid_at, cancel_reason, created_at, updated_at";
const ORDER_LINE_COLUMNS: &str = "id, order_id, product_id, product_name, quantity, unit_price_cents";
const CART_LINE_COLUMNS: &str = "cart_id, product_id, quantity, added_at";
const SELLER_COLUMNS: &str = "id, user_id, shop_name, description, siret, is_verified, created_at, updated_at";
const COMMENT_COLUMNS: &str = "id, product_id, user_id, rate, comment, approved, created_at";
/// Keep in step with `OrderStatus::is_open`.
const OPEN_ORDER: &str = "status IN ('PENDING', 'PAID', 'PREPARING', 'SHIPPED')";
/// Orders holding a line of the products of seller `$1`.
const SELLER_ORDER_IDS: &str =
  "SELECT ol.order_id FROM order_lines ol JOIN products p ON p.id = ol.product_id WHERE p.seller_id = $1";

#[derive(Clone)]
pub struct PgStore {
  pool: PgPool,
}

impl PgStore {
  pub fn new(pool: PgPool) -> Self {
    Self { pool }
  }

  #[instrument(name = "store::connect", skip(database_url))]
  pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
    let pool = PgPoolOptions::new()
      .max_connections(max_connections)
      .connect(database_url)
      .await?;
    info!("Database connection pool created.");
    Ok(Self::new(pool))
  }

  pub async fn migrate(&self) -> Result<()> {
    sqlx::migrate!("./migrations")
      .run(&self.pool)
      .await
      .map_err(|e| AppError::Internal(format!("Migration failed: {}", e)))?;
    info!("Database migrations applied.");
    Ok(())
  }
}

/// Appends the `WHERE` clause shared by the product list and count queries.
fn push_product_filters(qb: &mut QueryBuilder<'_, Postgres>, filter: &ProductFilter) {
  qb.push(" WHERE TRUE");
  if !filter.include_inactive {
    qb.push(" AND is_active");
  }
  if filter.inactive_only {
    qb.push(" AND NOT is_active");
  }
  if let Some(term) = &filter.search {
    let pattern = format!("%{}%", term);
    qb.push(" AND (name ILIKE ")
      .push_bind(pattern.clone())
      .push(" OR description ILIKE ")
      .push_bind(pattern)
      .push(")");
  }
  if let Some(category_id) = filter.category_id {
    qb.push(" AND category_id = ").push_bind(category_id);
  }
  if let Some(seller_id) = filter.seller_id {
    qb.push(" AND seller_id = ").push_bind(seller_id);
  }
  if let Some(min) = filter.min_price_cents {
    qb.push(" AND price_cents >= ").push_bind(min);
  }
  if let Some(max) = filter.max_price_cents {
    qb.push(" AND price_cents <= ").push_bind(max);
  }
}

#[async_trait]
impl UserStore for PgStore {
  async fn insert_user(&self, user: &NewUser) -> Result<User> {
    let sql = format!(
      "INSERT INTO users (id, email, first_name, last_name, phone, street, postal_code, city, role) \
       VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) RETURNING {}",
      USER_COLUMNS
    );
    sqlx::query_as::<_, User>(&sql)
      .bind(user.id)
      .bind(&user.email)
      .bind(&user.first_name)
      .bind(&user.last_name)
      .bind(&user.phone)
      .bind(&user.street)
      .bind(&user.postal_code)
      .bind(&user.city)
      .bind(user.role)
      .fetch_one(&self.pool)
      .await
      .map_err(|e| match AppError::from(e) {
        AppError::Conflict(_) => AppError::Conflict("Email already registered".to_string()),
        other => other,
      })
  }

  async fn find_user(&self, id: Uuid) -> Result<Option<User>> {
    let sql = format!("SELECT {} FROM users WHERE id = $1", USER_COLUMNS);
    Ok(sqlx::query_as::<_, User>(&sql).bind(id).fetch_optional(&self.pool).await?)
  }

  async fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
    let sql = format!("SELECT {} FROM users WHERE lower(email) = lower($1)", USER_COLUMNS);
    Ok(sqlx::query_as::<_, User>(&sql).bind(email).fetch_optional(&self.pool).await?)
  }

  async fn set_user_role(&self, id: Uuid, role: Role) -> Result<Option<User>> {
    let sql = format!(
      "UPDATE users SET role = $2, updated_at = now() WHERE id = $1 RETURNING {}",
      USER_COLUMNS
    );
    Ok(
      sqlx::query_as::<_, User>(&sql)
        .bind(id)
        .bind(role)
        .fetch_optional(&self.pool)
        .await?,
    )
  }

  async fn list_users(&self, query: &UserQuery) -> Result<(Vec<User>, i64)> {
    let pattern = query.search.as_ref().map(|term| format!("%{}%", term));
    let condition = "($1::user_role IS NULL OR role = $1) \
       AND ($2::text IS NULL OR first_name ILIKE $2 OR last_name ILIKE $2 OR email ILIKE $2)";
    let total = sqlx::query_scalar::<_, i64>(&format!("SELECT COUNT(*) FROM users WHERE {}", condition))
      .bind(query.role)
      .bind(&pattern)
      .fetch_one(&self.pool)
      .await?;
    let sql = format!(
      "SELECT {} FROM users WHERE {} ORDER BY created_at DESC, id LIMIT $3 OFFSET $4",
      USER_COLUMNS, condition
    );
    let users = sqlx::query_as::<_, User>(&sql)
      .bind(query.role)
      .bind(&pattern)
      .bind(query.page.limit())
      .bind(query.page.offset())
      .fetch_all(&self.pool)
      .await?;
    Ok((users, total))
  }

  async fn update_user(&self, id: Uuid, patch: &UserPatch) -> Result<Option<User>> {
    let sql = format!(
      "UPDATE users SET \
         first_name = COALESCE($2, first_name), \
         last_name = COALESCE($3, last_name), \
         phone = COALESCE($4, phone), \
         street = COALESCE($5, street), \
         postal_code = COALESCE($6, postal_code), \
         city = COALESCE($7, city), \
         updated_at = now() \
       WHERE id = $1 RETURNING {}",
      USER_COLUMNS
    );
    Ok(
      sqlx::query_as::<_, User>(&sql)
        .bind(id)
        .bind(&patch.first_name)
        .bind(&patch.last_name)
        .bind(&patch.phone)
        .bind(&patch.street)
        .bind(&patch.postal_code)
        .bind(&patch.city)
        .fetch_optional(&self.pool)
        .await?,
    )
  }

  #[instrument(name = "store::delete_user", skip(self))]
  async fn delete_user(&self, id: Uuid) -> Result<bool> {
    // Everything else hangs off users through ON DELETE CASCADE.
    let mut tx = self.pool.begin().await?;
    sqlx::query("DELETE FROM sessions WHERE user_id = $1")
      .bind(id)
      .execute(&mut *tx)
      .await?;
    let result = sqlx::query("DELETE FROM users WHERE id = $1")
      .bind(id)
      .execute(&mut *tx)
      .await?;
    tx.commit().await?;
    Ok(result.rows_affected() > 0)
  }
}

#[async_trait]
impl CredentialStore for PgStore {
  async fn insert_credentials(&self, credentials: &Credentials) -> Result<()> {
    sqlx::query("INSERT INTO credentials (user_id, email, password_hash) VALUES ($1, $2, $3)")
      .bind(credentials.user_id)
      .bind(&credentials.email)
      .bind(&credentials.password_hash)
      .execute(&self.pool)
      .await
      .map_err(|e| match AppError::from(e) {
        AppError::Conflict(_) => AppError::Conflict("Email already registered".to_string()),
        other => other,
      })?;
    Ok(())
  }

  async fn find_credentials_by_email(&self, email: &str) -> Result<Option<Credentials>> {
    Ok(
      sqlx::query_as::<_, Credentials>(
        "SELECT user_id, email, password_hash FROM credentials WHERE lower(email) = lower($1)",
      )
      .bind(email)
      .fetch_optional(&self.pool)
      .await?,
    )
  }

  async fn update_password_hash(&self, user_id: Uuid, password_hash: &str) -> Result<()> {
    let result = sqlx::query("UPDATE credentials SET password_hash = $2 WHERE user_id = $1")
      .bind(user_id)
      .bind(password_hash)
      .execute(&self.pool)
      .await?;
    if result.rows_affected() == 0 {
      return Err(AppError::NotFound("Account not found".to_string()));
    }
    Ok(())
  }

  async fn delete_credentials(&self, user_id: Uuid) -> Result<()> {
    let mut tx = self.pool.begin().await?;
    sqlx::query("DELETE FROM sessions WHERE user_id = $1")
      .bind(user_id)
      .execute(&mut *tx)
      .await?;
    sqlx::query("DELETE FROM credentials WHERE user_id = $1")
      .bind(user_id)
      .execute(&mut *tx)
      .await?;
    tx.commit().await?;
    Ok(())
  }

  async fn insert_session(&self, token_digest: &str, user_id: Uuid, expires_at: DateTime<Utc>) -> Result<()> {
    sqlx::query("INSERT INTO sessions (token_digest, user_id, expires_at) VALUES ($1, $2, $3)")
      .bind(token_digest)
      .bind(user_id)
      .bind(expires_at)
      .execute(&self.pool)
      .await?;
    Ok(())
  }

  async fn find_session(&self, token_digest: &str) -> Result<Option<Uuid>> {
    Ok(
      sqlx::query_scalar::<_, Uuid>("SELECT user_id FROM sessions WHERE token_digest = $1 AND expires_at > now()")
        .bind(token_digest)
        .fetch_optional(&self.pool)
        .await?,
    )
  }

  async fn delete_session(&self, token_digest: &str) -> Result<()> {
    sqlx::query("DELETE FROM sessions WHERE token_digest = $1")
      .bind(token_digest)
      .execute(&self.pool)
      .await?;
    Ok(())
  }
}

#[async_trait]
impl CatalogStore for PgStore {
  async fn list_categories(&self) -> Result<Vec<CategoryWithCounts>> {
    Ok(
      sqlx::query_as::<_, CategoryWithCounts>(
        "SELECT c.id, c.name, c.description, c.created_at, c.updated_at, \
         COUNT(p.id) FILTER (WHERE p.is_active) AS total_products \
         FROM categories c LEFT JOIN products p ON p.category_id = c.id \
         GROUP BY c.id ORDER BY c.name",
      )
      .fetch_all(&self.pool)
      .await?,
    )
  }

  async fn find_category(&self, id: Uuid) -> Result<Option<Category>> {
    Ok(
      sqlx::query_as::<_, Category>(
        "SELECT id, name, description, created_at, updated_at FROM categories WHERE id = $1",
      )
      .bind(id)
      .fetch_optional(&self.pool)
      .await?,
    )
  }

  async fn category_detail(&self, id: Uuid) -> Result<Option<CategoryDetail>> {
    let Some(category) = self.find_category(id).await? else {
      return Ok(None);
    };
    let (total_products, total_sellers) = sqlx::query_as::<_, (i64, i64)>(
      "SELECT COUNT(*), COUNT(DISTINCT seller_id) FROM products WHERE category_id = $1 AND is_active",
    )
    .bind(id)
    .fetch_one(&self.pool)
    .await?;
    Ok(Some(CategoryDetail {
      category,
      total_products,
      total_sellers,
    }))
  }

  async fn category_name_taken(&self, name: &str, except: Option<Uuid>) -> Result<bool> {
    Ok(
      sqlx::query_scalar::<_, bool>(
        "SELECT EXISTS(SELECT 1 FROM categories WHERE lower(name) = lower($1) AND ($2::uuid IS NULL OR id <> $2))",
      )
      .bind(name)
      .bind(except)
      .fetch_one(&self.pool)
      .await?,
    )
  }

  async fn insert_category(&self, category: &NewCategory) -> Result<Category> {
    Ok(
      sqlx::query_as::<_, Category>(
        "INSERT INTO categories (id, name, description) VALUES ($1, $2, $3) \
         RETURNING id, name, description, created_at, updated_at",
      )
      .bind(Uuid::new_v4())
      .bind(&category.name)
      .bind(&category.description)
      .fetch_one(&self.pool)
      .await?,
    )
  }

  async fn update_category(&self, id: Uuid, category: &NewCategory) -> Result<Option<Category>> {
    Ok(
      sqlx::query_as::<_, Category>(
        "UPDATE categories SET name = $2, description = $3, updated_at = now() WHERE id = $1 \
         RETURNING id, name, description, created_at, updated_at",
      )
      .bind(id)
      .bind(&category.name)
      .bind(&category.description)
      .fetch_optional(&self.pool)
      .await?,
    )
  }

  async fn delete_category(&self, id: Uuid) -> Result<bool> {
    let result = sqlx::query("DELETE FROM categories WHERE id = $1")
      .bind(id)
      .execute(&self.pool)
      .await
      .map_err(|e| match AppError::from(e) {
        AppError::Validation { .. } => {
          AppError::Conflict("Cannot delete a category that still has products".to_string())
        }
        other => other,
      })?;
    Ok(result.rows_affected() > 0)
  }

  async fn count_category_products(&self, id: Uuid) -> Result<i64> {
    Ok(
      sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM products WHERE category_id = $1")
        .bind(id)
        .fetch_one(&self.pool)
        .await?,
    )
  }

  #[instrument(name = "store::list_products", skip(self, filter))]
  async fn list_products(&self, filter: &ProductFilter) -> Result<(Vec<Product>, i64)> {
    let mut count_qb = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM products");
    push_product_filters(&mut count_qb, filter);
    let total = count_qb.build_query_scalar::<i64>().fetch_one(&self.pool).await?;

    let mut qb = QueryBuilder::<Postgres>::new(format!("SELECT {} FROM products", PRODUCT_COLUMNS));
    push_product_filters(&mut qb, filter);
    qb.push(format!(
      " ORDER BY {} {}, id",
      filter.sort.column(),
      filter.direction.keyword()
    ));
    qb.push(" LIMIT ")
      .push_bind(filter.page.limit())
      .push(" OFFSET ")
      .push_bind(filter.page.offset());
    let products = qb.build_query_as::<Product>().fetch_all(&self.pool).await?;

    Ok((products, total))
  }

  async fn find_product(&self, id: Uuid) -> Result<Option<Product>> {
    let sql = format!("SELECT {} FROM products WHERE id = $1", PRODUCT_COLUMNS);
    Ok(sqlx::query_as::<_, Product>(&sql).bind(id).fetch_optional(&self.pool).await?)
  }

  async fn insert_product(&self, product: &NewProduct) -> Result<Product> {
    let sql = format!(
      "INSERT INTO products (id, seller_id, category_id, name, description, price_cents, stock, image_url) \
       VALUES ($1, $2, $3, $4, $5, $6, $7, $8) RETURNING {}",
      PRODUCT_COLUMNS
    );
    Ok(
      sqlx::query_as::<_, Product>(&sql)
        .bind(Uuid::new_v4())
        .bind(product.seller_id)
        .bind(product.category_id)
        .bind(&product.name)
        .bind(&product.description)
        .bind(product.price_cents)
        .bind(product.stock)
        .bind(&product.image_url)
        .fetch_one(&self.pool)
        .await?,
    )
  }

  async fn update_product(&self, id: Uuid, patch: &ProductPatch) -> Result<Option<Product>> {
    let sql = format!(
      "UPDATE products SET \
         name = COALESCE($2, name), \
         description = COALESCE($3, description), \
         category_id = COALESCE($4, category_id), \
         price_cents = COALESCE($5, price_cents), \
         stock = COALESCE($6, stock), \
         image_url = COALESCE($7, image_url), \
         is_active = COALESCE($8, is_active), \
         updated_at = now() \
       WHERE id = $1 RETURNING {}",
      PRODUCT_COLUMNS
    );
    Ok(
      sqlx::query_as::<_, Product>(&sql)
        .bind(id)
        .bind(&patch.name)
        .bind(&patch.description)
        .bind(patch.category_id)
        .bind(patch.price_cents)
        .bind(patch.stock)
        .bind(&patch.image_url)
        .bind(patch.is_active)
        .fetch_optional(&self.pool)
        .await?,
    )
  }

  async fn adjust_stock(&self, id: Uuid, change: StockChange) -> Result<Option<Product>> {
    let mut tx = self.pool.begin().await?;
    let Some(current) = sqlx::query_scalar::<_, i32>("SELECT stock FROM products WHERE id = $1 FOR UPDATE")
      .bind(id)
      .fetch_optional(&mut *tx)
      .await?
    else {
      return Ok(None);
    };
    let stock = change.apply(current)?;
    let sql = format!(
      "UPDATE products SET stock = $2, updated_at = now() WHERE id = $1 RETURNING {}",
      PRODUCT_COLUMNS
    );
    let product = sqlx::query_as::<_, Product>(&sql)
      .bind(id)
      .bind(stock)
      .fetch_one(&mut *tx)
      .await?;
    tx.commit().await?;
    Ok(Some(product))
  }

  async fn deactivate_seller_products(&self, seller_id: Uuid) -> Result<u64> {
    let result =
      sqlx::query("UPDATE products SET is_active = FALSE, updated_at = now() WHERE seller_id = $1 AND is_active")
        .bind(seller_id)
        .execute(&self.pool)
        .await?;
    Ok(result.rows_affected())
  }
}

#[async_trait]
impl CommentStore for PgStore {
  async fn list_approved_comments(&self, product_id: Uuid, page: &PageParams) -> Result<(Vec<Comment>, i64)> {
    let total = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM comments WHERE product_id = $1 AND approved")
      .bind(product_id)
      .fetch_one(&self.pool)
      .await?;
    let comments = sqlx::query_as::<_, Comment>(
      "SELECT id, product_id, user_id, rate, comment, approved, created_at FROM comments \
       WHERE product_id = $1 AND approved ORDER BY created_at DESC LIMIT $2 OFFSET $3",
    )
    .bind(product_id)
    .bind(page.limit())
    .bind(page.offset())
    .fetch_all(&self.pool)
    .await?;
    Ok((comments, total))
  }

  async fn insert_comment(&self, comment: &NewComment) -> Result<Comment> {
    Ok(
      sqlx::query_as::<_, Comment>(
        "INSERT INTO comments (id, product_id, user_id, rate, comment) VALUES ($1, $2, $3, $4, $5) \
         RETURNING id, product_id, user_id, rate, comment, approved, created_at",
      )
      .bind(Uuid::new_v4())
      .bind(comment.product_id)
      .bind(comment.user_id)
      .bind(comment.rate)
      .bind(&comment.comment)
      .fetch_one(&self.pool)
      .await?,
    )
  }

  async fn approve_comment(&self, id: Uuid) -> Result<Option<Comment>> {
    Ok(
      sqlx::query_as::<_, Comment>(
        "UPDATE comments SET approved = TRUE WHERE id = $1 \
         RETURNING id, product_id, user_id, rate, comment, approved, created_at",
      )
      .bind(id)
      .fetch_optional(&self.pool)
      .await?,
    )
  }

  async fn rating_summaries(&self, product_ids: &[Uuid]) -> Result<HashMap<Uuid, RatingSummary>> {
    if product_ids.is_empty() {
      return Ok(HashMap::new());
    }
    let rows = sqlx::query_as::<_, (Uuid, i64, i64)>(
      "SELECT product_id, SUM(rate)::BIGINT, COUNT(*) FROM comments \
       WHERE approved AND product_id = ANY($1) GROUP BY product_id",
    )
    .bind(product_ids)
    .fetch_all(&self.pool)
    .await?;
    Ok(
      rows
        .into_iter()
        .map(|(id, sum, count)| (id, RatingSummary::from_totals(sum, count)))
        .collect(),
    )
  }

  async fn seller_rating(&self, seller_id: Uuid) -> Result<RatingSummary> {
    let (sum, count) = sqlx::query_as::<_, (i64, i64)>(
      "SELECT COALESCE(SUM(c.rate), 0)::BIGINT, COUNT(*) FROM comments c \
       JOIN products p ON p.id = c.product_id WHERE c.approved AND p.seller_id = $1",
    )
    .bind(seller_id)
    .fetch_one(&self.pool)
    .await?;
    Ok(RatingSummary::from_totals(sum, count))
  }

  async fn list_user_comments(
    &self,
    user_id: Uuid,
    include_unapproved: bool,
    page: &PageParams,
  ) -> Result<(Vec<Comment>, i64)> {
    let total = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM comments WHERE user_id = $1 AND ($2 OR approved)")
      .bind(user_id)
      .bind(include_unapproved)
      .fetch_one(&self.pool)
      .await?;
    let sql = format!(
      "SELECT {} FROM comments WHERE user_id = $1 AND ($2 OR approved) \
       ORDER BY created_at DESC, id LIMIT $3 OFFSET $4",
      COMMENT_COLUMNS
    );
    let comments = sqlx::query_as::<_, Comment>(&sql)
      .bind(user_id)
      .bind(include_unapproved)
      .bind(page.limit())
      .bind(page.offset())
      .fetch_all(&self.pool)
      .await?;
    Ok((comments, total))
  }
}

#[async_trait]
impl CartStore for PgStore {
  async fn find_cart(&self, user_id: Uuid) -> Result<Option<Cart>> {
    Ok(
      sqlx::query_as::<_, Cart>("SELECT id, user_id, created_at FROM carts WHERE user_id = $1")
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?,
    )
  }

  async fn get_or_create_cart(&self, user_id: Uuid) -> Result<Cart> {
    // The no-op update makes RETURNING yield the existing row on conflict.
    Ok(
      sqlx::query_as::<_, Cart>(
        "INSERT INTO carts (id, user_id) VALUES ($1, $2) \
         ON CONFLICT (user_id) DO UPDATE SET user_id = EXCLUDED.user_id \
         RETURNING id, user_id, created_at",
      )
      .bind(Uuid::new_v4())
      .bind(user_id)
      .fetch_one(&self.pool)
      .await?,
    )
  }

  async fn cart_lines(&self, cart_id: Uuid) -> Result<Vec<CartLine>> {
    let sql = format!(
      "SELECT {} FROM cart_lines WHERE cart_id = $1 ORDER BY added_at",
      CART_LINE_COLUMNS
    );
    Ok(sqlx::query_as::<_, CartLine>(&sql).bind(cart_id).fetch_all(&self.pool).await?)
  }

  async fn add_cart_line(&self, cart_id: Uuid, product_id: Uuid, quantity: i32) -> Result<CartLine> {
    // A merge past the cap leaves the row untouched and returns nothing.
    let sql = format!(
      "INSERT INTO cart_lines (cart_id, product_id, quantity) VALUES ($1, $2, $3) \
       ON CONFLICT (cart_id, product_id) DO UPDATE SET quantity = cart_lines.quantity + EXCLUDED.quantity \
       WHERE cart_lines.quantity::BIGINT + EXCLUDED.quantity <= $4 \
       RETURNING {}",
      CART_LINE_COLUMNS
    );
    sqlx::query_as::<_, CartLine>(&sql)
      .bind(cart_id)
      .bind(product_id)
      .bind(quantity)
      .bind(i64::from(MAX_LINE_QUANTITY))
      .fetch_optional(&self.pool)
      .await?
      .ok_or_else(|| {
        AppError::validation(
          "quantity",
          format!("A cart line cannot hold more than {} units", MAX_LINE_QUANTITY),
        )
      })
  }

  async fn set_cart_line_quantity(&self, cart_id: Uuid, product_id: Uuid, quantity: i32) -> Result<Option<CartLine>> {
    let sql = format!(
      "UPDATE cart_lines SET quantity = $3 WHERE cart_id = $1 AND product_id = $2 RETURNING {}",
      CART_LINE_COLUMNS
    );
    Ok(
      sqlx::query_as::<_, CartLine>(&sql)
        .bind(cart_id)
        .bind(product_id)
        .bind(quantity)
        .fetch_optional(&self.pool)
        .await?,
    )
  }

  async fn remove_cart_line(&self, cart_id: Uuid, product_id: Uuid) -> Result<bool> {
    let result = sqlx::query("DELETE FROM cart_lines WHERE cart_id = $1 AND product_id = $2")
      .bind(cart_id)
      .bind(product_id)
      .execute(&self.pool)
      .await?;
    Ok(result.rows_affected() > 0)
  }

  async fn clear_cart(&self, cart_id: Uuid) -> Result<Vec<CartLine>> {
    let sql = format!("DELETE FROM cart_lines WHERE cart_id = $1 RETURNING {}", CART_LINE_COLUMNS);
    Ok(sqlx::query_as::<_, CartLine>(&sql).bind(cart_id).fetch_all(&self.pool).await?)
  }

  async fn take_cart_lines(&self, cart_id: Uuid, lines: &[CartLine]) -> Result<Vec<CartLine>> {
    let sql = format!(
      "DELETE FROM cart_lines WHERE cart_id = $1 AND product_id = $2 AND quantity = $3 RETURNING {}",
      CART_LINE_COLUMNS
    );
    let mut tx = self.pool.begin().await?;
    // Serializes concurrent checkouts of the same cart.
    sqlx::query("SELECT id FROM carts WHERE id = $1 FOR UPDATE")
      .bind(cart_id)
      .fetch_optional(&mut *tx)
      .await?;

    let mut taken = Vec::with_capacity(lines.len());
    for line in lines {
      let row = sqlx::query_as::<_, CartLine>(&sql)
        .bind(cart_id)
        .bind(line.product_id)
        .bind(line.quantity)
        .fetch_optional(&mut *tx)
        .await?;
      match row {
        Some(row) => taken.push(row),
        None => {
          tx.rollback().await?;
          return Err(AppError::Conflict("Cart changed during checkout; please retry".to_string()));
        }
      }
    }
    tx.commit().await?;
    Ok(taken)
  }

  async fn restore_cart_lines(&self, lines: &[CartLine]) -> Result<()> {
    let mut tx = self.pool.begin().await?;
    for line in lines {
      sqlx::query(
        "INSERT INTO cart_lines (cart_id, product_id, quantity, added_at) VALUES ($1, $2, $3, $4) \
         ON CONFLICT (cart_id, product_id) DO UPDATE SET quantity = cart_lines.quantity + EXCLUDED.quantity",
      )
      .bind(line.cart_id)
      .bind(line.product_id)
      .bind(line.quantity)
      .bind(line.added_at)
      .execute(&mut *tx)
      .await?;
    }
    tx.commit().await?;
    Ok(())
  }
}

#[async_trait]
impl OrderStore for PgStore {
  async fn insert_order(&self, order: &NewOrder) -> Result<Order> {
    let sql = format!(
      "INSERT INTO orders (id, user_id, status, total_cents, currency) VALUES ($1, $2, $3, $4, $5) RETURNING {}",
      ORDER_COLUMNS
    );
    Ok(
      sqlx::query_as::<_, Order>(&sql)
        .bind(order.id)
        .bind(order.user_id)
        .bind(OrderStatus::Pending)
        .bind(order.total_cents)
        .bind(&order.currency)
        .fetch_one(&self.pool)
        .await?,
    )
  }

  async fn insert_order_lines(&self, lines: &[NewOrderLine]) -> Result<Vec<OrderLine>> {
    let sql = format!(
      "INSERT INTO order_lines (id, order_id, product_id, product_name, quantity, unit_price_cents) \
       VALUES ($1, $2, $3, $4, $5, $6) RETURNING {}",
      ORDER_LINE_COLUMNS
    );
    let mut tx = self.pool.begin().await?;
    let mut rows = Vec::with_capacity(lines.len());
    for line in lines {
      let row = sqlx::query_as::<_, OrderLine>(&sql)
        .bind(Uuid::new_v4())
        .bind(line.order_id)
        .bind(line.product_id)
        .bind(&line.product_name)
        .bind(line.quantity)
        .bind(line.unit_price_cents)
        .fetch_one(&mut *tx)
        .await?;
      rows.push(row);
    }
    tx.commit().await?;
    Ok(rows)
  }

  async fn delete_order_lines(&self, order_id: Uuid) -> Result<()> {
    sqlx::query("DELETE FROM order_lines WHERE order_id = $1")
      .bind(order_id)
      .execute(&self.pool)
      .await?;
    Ok(())
  }

  async fn delete_order(&self, order_id: Uuid) -> Result<bool> {
    // Lines and idempotency keys go with the order through ON DELETE CASCADE.
    let result = sqlx::query("DELETE FROM orders WHERE id = $1")
      .bind(order_id)
      .execute(&self.pool)
      .await?;
    Ok(result.rows_affected() > 0)
  }

  async fn find_order(&self, id: Uuid) -> Result<Option<Order>> {
    let sql = format!("SELECT {} FROM orders WHERE id = $1", ORDER_COLUMNS);
    Ok(sqlx::query_as::<_, Order>(&sql).bind(id).fetch_optional(&self.pool).await?)
  }

  async fn order_lines(&self, order_id: Uuid) -> Result<Vec<OrderLine>> {
    let sql = format!(
      "SELECT {} FROM order_lines WHERE order_id = $1 ORDER BY product_name, id",
      ORDER_LINE_COLUMNS
    );
    Ok(sqlx::query_as::<_, OrderLine>(&sql).bind(order_id).fetch_all(&self.pool).await?)
  }

  async fn list_orders(&self, query: &OrderQuery) -> Result<(Vec<Order>, i64)> {
    let total = sqlx::query_scalar::<_, i64>(
      "SELECT COUNT(*) FROM orders WHERE ($1::uuid IS NULL OR user_id = $1) AND ($2::order_status IS NULL OR status = $2)",
    )
    .bind(query.user_id)
    .bind(query.status)
    .fetch_one(&self.pool)
    .await?;
    let sql = format!(
      "SELECT {} FROM orders WHERE ($1::uuid IS NULL OR user_id = $1) AND ($2::order_status IS NULL OR status = $2) \
       ORDER BY created_at DESC, id LIMIT $3 OFFSET $4",
      ORDER_COLUMNS
    );
    let orders = sqlx::query_as::<_, Order>(&sql)
      .bind(query.user_id)
      .bind(query.status)
      .bind(query.page.limit())
      .bind(query.page.offset())
      .fetch_all(&self.pool)
      .await?;
    Ok((orders, total))
  }

  async fn set_order_status(&self, id: Uuid, status: OrderStatus, cancel_reason: Option<&str>) -> Result<Option<Order>> {
    let sql = format!(
      "UPDATE orders SET status = $2, cancel_reason = COALESCE($3, cancel_reason), updated_at = now() \
       WHERE id = $1 RETURNING {}",
      ORDER_COLUMNS
    );
    Ok(
      sqlx::query_as::<_, Order>(&sql)
        .bind(id)
        .bind(status)
        .bind(cancel_reason)
        .fetch_optional(&self.pool)
        .await?,
    )
  }

  async fn mark_order_paid(&self, id: Uuid, payment_intent_id: &str, paid_at: DateTime<Utc>) -> Result<Option<Order>> {
    let sql = format!(
      "UPDATE orders SET status = $2, payment_intent_id = $3, paid_at = $4, updated_at = $4 \
       WHERE id = $1 RETURNING {}",
      ORDER_COLUMNS
    );
    Ok(
      sqlx::query_as::<_, Order>(&sql)
        .bind(id)
        .bind(OrderStatus::Paid)
        .bind(payment_intent_id)
        .bind(paid_at)
        .fetch_optional(&self.pool)
        .await?,
    )
  }

  async fn list_seller_orders(
    &self,
    seller_id: Uuid,
    status: Option<OrderStatus>,
    page: &PageParams,
  ) -> Result<(Vec<Order>, i64)> {
    let condition = format!(
      "id IN ({}) AND ($2::order_status IS NULL OR status = $2)",
      SELLER_ORDER_IDS
    );
    let total = sqlx::query_scalar::<_, i64>(&format!("SELECT COUNT(*) FROM orders WHERE {}", condition))
      .bind(seller_id)
      .bind(status)
      .fetch_one(&self.pool)
      .await?;
    let sql = format!(
      "SELECT {} FROM orders WHERE {} ORDER BY created_at DESC, id LIMIT $3 OFFSET $4",
      ORDER_COLUMNS, condition
    );
    let orders = sqlx::query_as::<_, Order>(&sql)
      .bind(seller_id)
      .bind(status)
      .bind(page.limit())
      .bind(page.offset())
      .fetch_all(&self.pool)
      .await?;
    Ok((orders, total))
  }

  async fn count_open_orders(&self, user_id: Uuid) -> Result<i64> {
    let sql = format!("SELECT COUNT(*) FROM orders WHERE user_id = $1 AND {}", OPEN_ORDER);
    Ok(sqlx::query_scalar::<_, i64>(&sql).bind(user_id).fetch_one(&self.pool).await?)
  }

  async fn count_open_seller_orders(&self, seller_id: Uuid) -> Result<i64> {
    let sql = format!(
      "SELECT COUNT(*) FROM orders WHERE id IN ({}) AND {}",
      SELLER_ORDER_IDS, OPEN_ORDER
    );
    Ok(sqlx::query_scalar::<_, i64>(&sql).bind(seller_id).fetch_one(&self.pool).await?)
  }
}

#[async_trait]
impl WishlistStore for PgStore {
  async fn wishlist(&self, user_id: Uuid) -> Result<Vec<WishlistEntry>> {
    Ok(
      sqlx::query_as::<_, WishlistEntry>(
        "SELECT p.id AS product_id, p.name, p.price_cents, p.image_url, w.added_at \
         FROM wishlist w JOIN products p ON p.id = w.product_id \
         WHERE w.user_id = $1 ORDER BY w.added_at DESC",
      )
      .bind(user_id)
      .fetch_all(&self.pool)
      .await?,
    )
  }

  async fn add_to_wishlist(&self, user_id: Uuid, product_id: Uuid) -> Result<WishlistItem> {
    sqlx::query_as::<_, WishlistItem>(
      "INSERT INTO wishlist (user_id, product_id) VALUES ($1, $2) RETURNING user_id, product_id, added_at",
    )
    .bind(user_id)
    .bind(product_id)
    .fetch_one(&self.pool)
    .await
    .map_err(|e| match AppError::from(e) {
      AppError::Conflict(_) => AppError::Conflict("Product already in wishlist".to_string()),
      other => other,
    })
  }

  async fn remove_from_wishlist(&self, user_id: Uuid, product_id: Uuid) -> Result<bool> {
    let result = sqlx::query("DELETE FROM wishlist WHERE user_id = $1 AND product_id = $2")
      .bind(user_id)
      .bind(product_id)
      .execute(&self.pool)
      .await?;
    Ok(result.rows_affected() > 0)
  }
}

#[async_trait]
impl WebhookEventStore for PgStore {
  async fn is_event_processed(&self, event_id: &str) -> Result<bool> {
    Ok(
      sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM webhook_events WHERE event_id = $1)")
        .bind(event_id)
        .fetch_one(&self.pool)
        .await?,
    )
  }

  async fn record_event(&self, event_id: &str, event_type: &str) -> Result<bool> {
    let result = sqlx::query(
      "INSERT INTO webhook_events (event_id, event_type) VALUES ($1, $2) ON CONFLICT (event_id) DO NOTHING",
    )
    .bind(event_id)
    .bind(event_type)
    .execute(&self.pool)
    .await?;
    Ok(result.rows_affected() > 0)
  }
}

#[async_trait]
impl IdempotencyStore for PgStore {
  async fn find_idempotent_order(&self, user_id: Uuid, key: Uuid) -> Result<Option<Uuid>> {
    Ok(
      sqlx::query_scalar::<_, Uuid>("SELECT order_id FROM idempotency_keys WHERE user_id = $1 AND key = $2")
        .bind(user_id)
        .bind(key)
        .fetch_optional(&self.pool)
        .await?,
    )
  }

  async fn remember_idempotent_order(&self, user_id: Uuid, key: Uuid, order_id: Uuid) -> Result<()> {
    sqlx::query("INSERT INTO idempotency_keys (user_id, key, order_id) VALUES ($1, $2, $3)")
      .bind(user_id)
      .bind(key)
      .bind(order_id)
      .execute(&self.pool)
      .await
      .map_err(|e| match AppError::from(e) {
        AppError::Conflict(_) => AppError::Conflict("Idempotency key already used".to_string()),
        other => other,
      })?;
    Ok(())
  }
}

fn seller_conflict(err: sqlx::Error) -> AppError {
  let siret_taken = err
    .as_database_error()
    .and_then(|db| db.constraint())
    .is_some_and(|c| c == "seller_profiles_siret_key");
  match AppError::from(err) {
    AppError::Conflict(_) if siret_taken => AppError::Conflict("SIRET already registered".to_string()),
    AppError::Conflict(_) => AppError::Conflict("User already has a seller profile".to_string()),
    other => other,
  }
}

#[async_trait]
impl SellerStore for PgStore {
  async fn insert_seller(&self, seller: &NewSeller) -> Result<Seller> {
    let sql = format!(
      "INSERT INTO seller_profiles (id, user_id, shop_name, description, siret) \
       VALUES ($1, $2, $3, $4, $5) RETURNING {}",
      SELLER_COLUMNS
    );
    sqlx::query_as::<_, Seller>(&sql)
      .bind(Uuid::new_v4())
      .bind(seller.user_id)
      .bind(&seller.shop_name)
      .bind(&seller.description)
      .bind(&seller.siret)
      .fetch_one(&self.pool)
      .await
      .map_err(seller_conflict)
  }

  async fn find_seller(&self, id: Uuid) -> Result<Option<Seller>> {
    let sql = format!("SELECT {} FROM seller_profiles WHERE id = $1", SELLER_COLUMNS);
    Ok(sqlx::query_as::<_, Seller>(&sql).bind(id).fetch_optional(&self.pool).await?)
  }

  async fn find_seller_by_user(&self, user_id: Uuid) -> Result<Option<Seller>> {
    let sql = format!("SELECT {} FROM seller_profiles WHERE user_id = $1", SELLER_COLUMNS);
    Ok(sqlx::query_as::<_, Seller>(&sql).bind(user_id).fetch_optional(&self.pool).await?)
  }

  async fn list_sellers(&self, query: &SellerQuery) -> Result<(Vec<SellerWithStats>, i64)> {
    let total =
      sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM seller_profiles WHERE ($1::boolean IS NULL OR is_verified = $1)")
        .bind(query.verified)
        .fetch_one(&self.pool)
        .await?;
    let sellers = sqlx::query_as::<_, SellerWithStats>(
      "SELECT s.id, s.user_id, s.shop_name, s.description, s.siret, s.is_verified, s.created_at, s.updated_at, \
       (SELECT COUNT(*) FROM products p WHERE p.seller_id = s.user_id AND p.is_active) AS total_products \
       FROM seller_profiles s WHERE ($1::boolean IS NULL OR s.is_verified = $1) \
       ORDER BY s.created_at DESC, s.id LIMIT $2 OFFSET $3",
    )
    .bind(query.verified)
    .bind(query.page.limit())
    .bind(query.page.offset())
    .fetch_all(&self.pool)
    .await?;
    Ok((sellers, total))
  }

  async fn update_seller(&self, id: Uuid, patch: &SellerPatch) -> Result<Option<Seller>> {
    let sql = format!(
      "UPDATE seller_profiles SET shop_name = COALESCE($2, shop_name), \
       description = COALESCE($3, description), updated_at = now() WHERE id = $1 RETURNING {}",
      SELLER_COLUMNS
    );
    Ok(
      sqlx::query_as::<_, Seller>(&sql)
        .bind(id)
        .bind(&patch.shop_name)
        .bind(&patch.description)
        .fetch_optional(&self.pool)
        .await?,
    )
  }

  async fn verify_seller(&self, id: Uuid) -> Result<Option<Seller>> {
    let sql = format!(
      "UPDATE seller_profiles SET is_verified = TRUE, updated_at = now() WHERE id = $1 RETURNING {}",
      SELLER_COLUMNS
    );
    Ok(sqlx::query_as::<_, Seller>(&sql).bind(id).fetch_optional(&self.pool).await?)
  }

  #[instrument(name = "store::delete_seller", skip(self))]
  async fn delete_seller(&self, id: Uuid) -> Result<bool> {
    let mut tx = self.pool.begin().await?;
    let Some(user_id) = sqlx::query_scalar::<_, Uuid>("DELETE FROM seller_profiles WHERE id = $1 RETURNING user_id")
      .bind(id)
      .fetch_optional(&mut *tx)
      .await?
    else {
      return Ok(false);
    };
    sqlx::query("UPDATE products SET is_active = FALSE, updated_at = now() WHERE seller_id = $1 AND is_active")
      .bind(user_id)
      .execute(&mut *tx)
      .await?;
    tx.commit().await?;
    Ok(true)
  }
}
