// server/src/store/memory.rs

//! In-process store used by tests and by development runs without
//! `DATABASE_URL`. Enforces the same uniqueness rules as the Postgres schema.

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
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

#[derive(Default)]
struct MemoryData {
  users: HashMap<Uuid, User>,
  credentials: HashMap<Uuid, Credentials>,
  sessions: HashMap<String, (Uuid, DateTime<Utc>)>,
  categories: HashMap<Uuid, Category>,
  products: HashMap<Uuid, Product>,
  comments: HashMap<Uuid, Comment>,
  carts: HashMap<Uuid, Cart>,
  cart_lines: Vec<CartLine>,
  orders: HashMap<Uuid, Order>,
  order_lines: Vec<OrderLine>,
  wishlist: Vec<WishlistItem>,
  webhook_events: HashMap<String, String>,
  idempotency_keys: HashMap<(Uuid, Uuid), Uuid>,
  sellers: HashMap<Uuid, Seller>,
}

#[derive(Default)]
pub struct MemoryStore {
  data: Mutex<MemoryData>,
}

impl MemoryStore {
  pub fn new() -> Self {
    Self::default()
  }
}

fn line_quantity_exceeded() -> AppError {
  AppError::validation(
    "quantity",
    format!("A cart line cannot hold more than {} units", MAX_LINE_QUANTITY),
  )
}

fn cart_changed() -> AppError {
  AppError::Conflict("Cart changed during checkout; please retry".to_string())
}

fn same_email(a: &str, b: &str) -> bool {
  a.eq_ignore_ascii_case(b)
}

#[async_trait]
impl UserStore for MemoryStore {
  async fn insert_user(&self, user: &NewUser) -> Result<User> {
    let mut data = self.data.lock();
    if data.users.values().any(|u| same_email(&u.email, &user.email)) || data.users.contains_key(&user.id) {
      return Err(AppError::Conflict("Email already registered".to_string()));
    }
    let now = Utc::now();
    let row = User {
      id: user.id,
      email: user.email.clone(),
      first_name: user.first_name.clone(),
      last_name: user.last_name.clone(),
      phone: user.phone.clone(),
      street: user.street.clone(),
      postal_code: user.postal_code.clone(),
      city: user.city.clone(),
      role: user.role,
      created_at: now,
      updated_at: now,
    };
    data.users.insert(row.id, row.clone());
    Ok(row)
  }

  async fn find_user(&self, id: Uuid) -> Result<Option<User>> {
    Ok(self.data.lock().users.get(&id).cloned())
  }

  async fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
    Ok(self.data.lock().users.values().find(|u| same_email(&u.email, email)).cloned())
  }

  async fn set_user_role(&self, id: Uuid, role: Role) -> Result<Option<User>> {
    let mut data = self.data.lock();
    Ok(data.users.get_mut(&id).map(|u| {
      u.role = role;
      u.updated_at = Utc::now();
      u.clone()
    }))
  }

  async fn list_users(&self, query: &UserQuery) -> Result<(Vec<User>, i64)> {
    let data = self.data.lock();
    let mut users: Vec<User> = data.users.values().filter(|u| query.matches(u)).cloned().collect();
    users.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
    let total = users.len() as i64;
    Ok((query.page.slice(&users), total))
  }

  async fn update_user(&self, id: Uuid, patch: &UserPatch) -> Result<Option<User>> {
    let mut data = self.data.lock();
    Ok(data.users.get_mut(&id).map(|u| {
      patch.apply(u);
      u.updated_at = Utc::now();
      u.clone()
    }))
  }

  async fn delete_user(&self, id: Uuid) -> Result<bool> {
    let mut data = self.data.lock();
    if data.users.remove(&id).is_none() {
      return Ok(false);
    }
    data.remove_user_rows(id);
    Ok(true)
  }
}

impl MemoryData {
  /// Mirrors the cascading foreign keys of the Postgres schema.
  fn remove_user_rows(&mut self, user_id: Uuid) {
    self.sessions.retain(|_, (owner, _)| *owner != user_id);
    self.sellers.retain(|_, s| s.user_id != user_id);

    let cart_ids: HashSet<Uuid> = self.carts.values().filter(|c| c.user_id == user_id).map(|c| c.id).collect();
    self.carts.retain(|id, _| !cart_ids.contains(id));

    let order_ids: HashSet<Uuid> = self.orders.values().filter(|o| o.user_id == user_id).map(|o| o.id).collect();
    self.orders.retain(|id, _| !order_ids.contains(id));
    self.order_lines.retain(|l| !order_ids.contains(&l.order_id));
    self.idempotency_keys.retain(|_, order_id| !order_ids.contains(order_id));

    let product_ids: HashSet<Uuid> = self
      .products
      .values()
      .filter(|p| p.seller_id == user_id)
      .map(|p| p.id)
      .collect();
    self.products.retain(|id, _| !product_ids.contains(id));

    self
      .cart_lines
      .retain(|l| !cart_ids.contains(&l.cart_id) && !product_ids.contains(&l.product_id));
    self
      .wishlist
      .retain(|w| w.user_id != user_id && !product_ids.contains(&w.product_id));
    self
      .comments
      .retain(|_, c| c.user_id != user_id && !product_ids.contains(&c.product_id));
  }

  fn deactivate_products_of(&mut self, seller_id: Uuid) -> u64 {
    let now = Utc::now();
    let mut count = 0;
    for product in self.products.values_mut().filter(|p| p.seller_id == seller_id && p.is_active) {
      product.is_active = false;
      product.updated_at = now;
      count += 1;
    }
    count
  }

  fn active_product_count(&self, seller_id: Uuid) -> i64 {
    self
      .products
      .values()
      .filter(|p| p.seller_id == seller_id && p.is_active)
      .count() as i64
  }

  /// Orders with at least one line of the seller's products.
  fn seller_order_ids(&self, seller_id: Uuid) -> HashSet<Uuid> {
    self
      .order_lines
      .iter()
      .filter(|l| self.products.get(&l.product_id).is_some_and(|p| p.seller_id == seller_id))
      .map(|l| l.order_id)
      .collect()
  }
}

#[async_trait]
impl CredentialStore for MemoryStore {
  async fn insert_credentials(&self, credentials: &Credentials) -> Result<()> {
    let mut data = self.data.lock();
    if data.credentials.values().any(|c| same_email(&c.email, &credentials.email)) {
      return Err(AppError::Conflict("Email already registered".to_string()));
    }
    data.credentials.insert(credentials.user_id, credentials.clone());
    Ok(())
  }

  async fn find_credentials_by_email(&self, email: &str) -> Result<Option<Credentials>> {
    Ok(
      self
        .data
        .lock()
        .credentials
        .values()
        .find(|c| same_email(&c.email, email))
        .cloned(),
    )
  }

  async fn update_password_hash(&self, user_id: Uuid, password_hash: &str) -> Result<()> {
    let mut data = self.data.lock();
    let credentials = data
      .credentials
      .get_mut(&user_id)
      .ok_or_else(|| AppError::NotFound("Account not found".to_string()))?;
    credentials.password_hash = password_hash.to_string();
    Ok(())
  }

  async fn delete_credentials(&self, user_id: Uuid) -> Result<()> {
    let mut data = self.data.lock();
    data.credentials.remove(&user_id);
    data.sessions.retain(|_, (owner, _)| *owner != user_id);
    Ok(())
  }

  async fn insert_session(&self, token_digest: &str, user_id: Uuid, expires_at: DateTime<Utc>) -> Result<()> {
    self
      .data
      .lock()
      .sessions
      .insert(token_digest.to_string(), (user_id, expires_at));
    Ok(())
  }

  async fn find_session(&self, token_digest: &str) -> Result<Option<Uuid>> {
    let now = Utc::now();
    Ok(
      self
        .data
        .lock()
        .sessions
        .get(token_digest)
        .filter(|(_, expires_at)| *expires_at > now)
        .map(|(user_id, _)| *user_id),
    )
  }

  async fn delete_session(&self, token_digest: &str) -> Result<()> {
    self.data.lock().sessions.remove(token_digest);
    Ok(())
  }
}

impl MemoryData {
  fn category_counts(&self, category_id: Uuid) -> (i64, i64) {
    let active: Vec<&Product> = self
      .products
      .values()
      .filter(|p| p.category_id == Some(category_id) && p.is_active)
      .collect();
    let sellers: HashSet<Uuid> = active.iter().map(|p| p.seller_id).collect();
    (active.len() as i64, sellers.len() as i64)
  }
}

#[async_trait]
impl CatalogStore for MemoryStore {
  async fn list_categories(&self) -> Result<Vec<CategoryWithCounts>> {
    let data = self.data.lock();
    let mut categories: Vec<CategoryWithCounts> = data
      .categories
      .values()
      .map(|c| CategoryWithCounts {
        category: c.clone(),
        total_products: data.category_counts(c.id).0,
      })
      .collect();
    categories.sort_by(|a, b| a.category.name.cmp(&b.category.name));
    Ok(categories)
  }

  async fn find_category(&self, id: Uuid) -> Result<Option<Category>> {
    Ok(self.data.lock().categories.get(&id).cloned())
  }

  async fn category_detail(&self, id: Uuid) -> Result<Option<CategoryDetail>> {
    let data = self.data.lock();
    Ok(data.categories.get(&id).map(|c| {
      let (total_products, total_sellers) = data.category_counts(id);
      CategoryDetail {
        category: c.clone(),
        total_products,
        total_sellers,
      }
    }))
  }

  async fn category_name_taken(&self, name: &str, except: Option<Uuid>) -> Result<bool> {
    let name = name.to_lowercase();
    Ok(
      self
        .data
        .lock()
        .categories
        .values()
        .any(|c| Some(c.id) != except && c.name.to_lowercase() == name),
    )
  }

  async fn insert_category(&self, category: &NewCategory) -> Result<Category> {
    let mut data = self.data.lock();
    let lowered = category.name.to_lowercase();
    if data.categories.values().any(|c| c.name.to_lowercase() == lowered) {
      return Err(AppError::Conflict("Category name already exists".to_string()));
    }
    let now = Utc::now();
    let row = Category {
      id: Uuid::new_v4(),
      name: category.name.clone(),
      description: category.description.clone(),
      created_at: now,
      updated_at: now,
    };
    data.categories.insert(row.id, row.clone());
    Ok(row)
  }

  async fn update_category(&self, id: Uuid, category: &NewCategory) -> Result<Option<Category>> {
    let mut data = self.data.lock();
    let lowered = category.name.to_lowercase();
    if data
      .categories
      .values()
      .any(|c| c.id != id && c.name.to_lowercase() == lowered)
    {
      return Err(AppError::Conflict("Category name already exists".to_string()));
    }
    Ok(data.categories.get_mut(&id).map(|c| {
      c.name = category.name.clone();
      c.description = category.description.clone();
      c.updated_at = Utc::now();
      c.clone()
    }))
  }

  async fn delete_category(&self, id: Uuid) -> Result<bool> {
    let mut data = self.data.lock();
    if data.products.values().any(|p| p.category_id == Some(id)) {
      return Err(AppError::Conflict(
        "Cannot delete a category that still has products".to_string(),
      ));
    }
    Ok(data.categories.remove(&id).is_some())
  }

  async fn count_category_products(&self, id: Uuid) -> Result<i64> {
    Ok(
      self
        .data
        .lock()
        .products
        .values()
        .filter(|p| p.category_id == Some(id))
        .count() as i64,
    )
  }

  async fn list_products(&self, filter: &ProductFilter) -> Result<(Vec<Product>, i64)> {
    let data = self.data.lock();
    let mut matching: Vec<Product> = data.products.values().filter(|p| filter.matches(p)).cloned().collect();
    matching.sort_by(|a, b| filter.compare(a, b).then_with(|| a.id.cmp(&b.id)));
    let total = matching.len() as i64;
    Ok((filter.page.slice(&matching), total))
  }

  async fn find_product(&self, id: Uuid) -> Result<Option<Product>> {
    Ok(self.data.lock().products.get(&id).cloned())
  }

  async fn insert_product(&self, product: &NewProduct) -> Result<Product> {
    let mut data = self.data.lock();
    if let Some(category_id) = product.category_id {
      if !data.categories.contains_key(&category_id) {
        return Err(AppError::validation("category_id", "Category does not exist"));
      }
    }
    let now = Utc::now();
    let row = Product {
      id: Uuid::new_v4(),
      seller_id: product.seller_id,
      category_id: product.category_id,
      name: product.name.clone(),
      description: product.description.clone(),
      price_cents: product.price_cents,
      stock: product.stock,
      image_url: product.image_url.clone(),
      is_active: true,
      created_at: now,
      updated_at: now,
    };
    data.products.insert(row.id, row.clone());
    Ok(row)
  }

  async fn update_product(&self, id: Uuid, patch: &ProductPatch) -> Result<Option<Product>> {
    let mut data = self.data.lock();
    if let Some(category_id) = patch.category_id {
      if !data.categories.contains_key(&category_id) {
        return Err(AppError::validation("category_id", "Category does not exist"));
      }
    }
    Ok(data.products.get_mut(&id).map(|p| {
      patch.apply(p);
      p.updated_at = Utc::now();
      p.clone()
    }))
  }

  async fn adjust_stock(&self, id: Uuid, change: StockChange) -> Result<Option<Product>> {
    let mut data = self.data.lock();
    let Some(product) = data.products.get_mut(&id) else {
      return Ok(None);
    };
    product.stock = change.apply(product.stock)?;
    product.updated_at = Utc::now();
    Ok(Some(product.clone()))
  }

  async fn deactivate_seller_products(&self, seller_id: Uuid) -> Result<u64> {
    Ok(self.data.lock().deactivate_products_of(seller_id))
  }
}

#[async_trait]
impl CommentStore for MemoryStore {
  async fn list_approved_comments(&self, product_id: Uuid, page: &PageParams) -> Result<(Vec<Comment>, i64)> {
    let data = self.data.lock();
    let mut approved: Vec<Comment> = data
      .comments
      .values()
      .filter(|c| c.product_id == product_id && c.approved)
      .cloned()
      .collect();
    approved.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    let total = approved.len() as i64;
    Ok((page.slice(&approved), total))
  }

  async fn insert_comment(&self, comment: &NewComment) -> Result<Comment> {
    let row = Comment {
      id: Uuid::new_v4(),
      product_id: comment.product_id,
      user_id: comment.user_id,
      rate: comment.rate,
      comment: comment.comment.clone(),
      approved: false,
      created_at: Utc::now(),
    };
    self.data.lock().comments.insert(row.id, row.clone());
    Ok(row)
  }

  async fn approve_comment(&self, id: Uuid) -> Result<Option<Comment>> {
    Ok(self.data.lock().comments.get_mut(&id).map(|c| {
      c.approved = true;
      c.clone()
    }))
  }

  async fn rating_summaries(&self, product_ids: &[Uuid]) -> Result<HashMap<Uuid, RatingSummary>> {
    let data = self.data.lock();
    let mut totals: HashMap<Uuid, (i64, i64)> = HashMap::new();
    for comment in data
      .comments
      .values()
      .filter(|c| c.approved && product_ids.contains(&c.product_id))
    {
      let entry = totals.entry(comment.product_id).or_default();
      entry.0 += i64::from(comment.rate);
      entry.1 += 1;
    }
    Ok(
      totals
        .into_iter()
        .map(|(id, (sum, count))| (id, RatingSummary::from_totals(sum, count)))
        .collect(),
    )
  }

  async fn seller_rating(&self, seller_id: Uuid) -> Result<RatingSummary> {
    let data = self.data.lock();
    let (sum, count) = data
      .comments
      .values()
      .filter(|c| c.approved)
      .filter(|c| data.products.get(&c.product_id).is_some_and(|p| p.seller_id == seller_id))
      .fold((0i64, 0i64), |(sum, count), c| (sum + i64::from(c.rate), count + 1));
    Ok(RatingSummary::from_totals(sum, count))
  }

  async fn list_user_comments(
    &self,
    user_id: Uuid,
    include_unapproved: bool,
    page: &PageParams,
  ) -> Result<(Vec<Comment>, i64)> {
    let data = self.data.lock();
    let mut comments: Vec<Comment> = data
      .comments
      .values()
      .filter(|c| c.user_id == user_id && (include_unapproved || c.approved))
      .cloned()
      .collect();
    comments.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
    let total = comments.len() as i64;
    Ok((page.slice(&comments), total))
  }
}

#[async_trait]
impl CartStore for MemoryStore {
  async fn find_cart(&self, user_id: Uuid) -> Result<Option<Cart>> {
    Ok(self.data.lock().carts.values().find(|c| c.user_id == user_id).cloned())
  }

  async fn get_or_create_cart(&self, user_id: Uuid) -> Result<Cart> {
    let mut data = self.data.lock();
    if let Some(cart) = data.carts.values().find(|c| c.user_id == user_id) {
      return Ok(cart.clone());
    }
    let cart = Cart {
      id: Uuid::new_v4(),
      user_id,
      created_at: Utc::now(),
    };
    data.carts.insert(cart.id, cart.clone());
    Ok(cart)
  }

  async fn cart_lines(&self, cart_id: Uuid) -> Result<Vec<CartLine>> {
    let data = self.data.lock();
    let mut lines: Vec<CartLine> = data.cart_lines.iter().filter(|l| l.cart_id == cart_id).cloned().collect();
    lines.sort_by(|a, b| a.added_at.cmp(&b.added_at));
    Ok(lines)
  }

  async fn add_cart_line(&self, cart_id: Uuid, product_id: Uuid, quantity: i32) -> Result<CartLine> {
    let mut data = self.data.lock();
    if let Some(line) = data
      .cart_lines
      .iter_mut()
      .find(|l| l.cart_id == cart_id && l.product_id == product_id)
    {
      let merged = line.quantity.saturating_add(quantity);
      if merged > MAX_LINE_QUANTITY {
        return Err(line_quantity_exceeded());
      }
      line.quantity = merged;
      return Ok(line.clone());
    }
    let line = CartLine {
      cart_id,
      product_id,
      quantity,
      added_at: Utc::now(),
    };
    data.cart_lines.push(line.clone());
    Ok(line)
  }

  async fn set_cart_line_quantity(&self, cart_id: Uuid, product_id: Uuid, quantity: i32) -> Result<Option<CartLine>> {
    let mut data = self.data.lock();
    Ok(
      data
        .cart_lines
        .iter_mut()
        .find(|l| l.cart_id == cart_id && l.product_id == product_id)
        .map(|l| {
          l.quantity = quantity;
          l.clone()
        }),
    )
  }

  async fn remove_cart_line(&self, cart_id: Uuid, product_id: Uuid) -> Result<bool> {
    let mut data = self.data.lock();
    let before = data.cart_lines.len();
    data
      .cart_lines
      .retain(|l| !(l.cart_id == cart_id && l.product_id == product_id));
    Ok(data.cart_lines.len() < before)
  }

  async fn clear_cart(&self, cart_id: Uuid) -> Result<Vec<CartLine>> {
    let mut data = self.data.lock();
    let (removed, kept): (Vec<CartLine>, Vec<CartLine>) =
      data.cart_lines.drain(..).partition(|l| l.cart_id == cart_id);
    data.cart_lines = kept;
    Ok(removed)
  }

  async fn take_cart_lines(&self, cart_id: Uuid, lines: &[CartLine]) -> Result<Vec<CartLine>> {
    let mut data = self.data.lock();
    let unchanged = lines.iter().all(|wanted| {
      data
        .cart_lines
        .iter()
        .any(|l| l.cart_id == cart_id && l.product_id == wanted.product_id && l.quantity == wanted.quantity)
    });
    if !unchanged {
      return Err(cart_changed());
    }
    let (taken, kept): (Vec<CartLine>, Vec<CartLine>) = data
      .cart_lines
      .drain(..)
      .partition(|l| l.cart_id == cart_id && lines.iter().any(|w| w.product_id == l.product_id));
    data.cart_lines = kept;
    Ok(taken)
  }

  async fn restore_cart_lines(&self, lines: &[CartLine]) -> Result<()> {
    let mut data = self.data.lock();
    for line in lines {
      match data
        .cart_lines
        .iter_mut()
        .find(|l| l.cart_id == line.cart_id && l.product_id == line.product_id)
      {
        Some(existing) => existing.quantity = existing.quantity.saturating_add(line.quantity),
        None => data.cart_lines.push(line.clone()),
      }
    }
    Ok(())
  }
}

#[async_trait]
impl OrderStore for MemoryStore {
  async fn insert_order(&self, order: &NewOrder) -> Result<Order> {
    let mut data = self.data.lock();
    if data.orders.contains_key(&order.id) {
      return Err(AppError::Conflict("Order already exists".to_string()));
    }
    let now = Utc::now();
    let row = Order {
      id: order.id,
      user_id: order.user_id,
      status: OrderStatus::Pending,
      total_cents: order.total_cents,
      currency: order.currency.clone(),
      payment_intent_id: None,
      paid_at: None,
      cancel_reason: None,
      created_at: now,
      updated_at: now,
    };
    data.orders.insert(row.id, row.clone());
    Ok(row)
  }

  async fn insert_order_lines(&self, lines: &[NewOrderLine]) -> Result<Vec<OrderLine>> {
    let mut data = self.data.lock();
    if let Some(line) = lines.iter().find(|l| !data.orders.contains_key(&l.order_id)) {
      return Err(AppError::validation(
        "order_id",
        format!("Order {} does not exist", line.order_id),
      ));
    }
    let rows: Vec<OrderLine> = lines
      .iter()
      .map(|l| OrderLine {
        id: Uuid::new_v4(),
        order_id: l.order_id,
        product_id: l.product_id,
        product_name: l.product_name.clone(),
        quantity: l.quantity,
        unit_price_cents: l.unit_price_cents,
      })
      .collect();
    data.order_lines.extend(rows.iter().cloned());
    Ok(rows)
  }

  async fn delete_order_lines(&self, order_id: Uuid) -> Result<()> {
    self.data.lock().order_lines.retain(|l| l.order_id != order_id);
    Ok(())
  }

  async fn delete_order(&self, order_id: Uuid) -> Result<bool> {
    let mut data = self.data.lock();
    data.order_lines.retain(|l| l.order_id != order_id);
    data.idempotency_keys.retain(|_, o| *o != order_id);
    Ok(data.orders.remove(&order_id).is_some())
  }

  async fn find_order(&self, id: Uuid) -> Result<Option<Order>> {
    Ok(self.data.lock().orders.get(&id).cloned())
  }

  async fn order_lines(&self, order_id: Uuid) -> Result<Vec<OrderLine>> {
    Ok(
      self
        .data
        .lock()
        .order_lines
        .iter()
        .filter(|l| l.order_id == order_id)
        .cloned()
        .collect(),
    )
  }

  async fn list_orders(&self, query: &OrderQuery) -> Result<(Vec<Order>, i64)> {
    let data = self.data.lock();
    let mut orders: Vec<Order> = data
      .orders
      .values()
      .filter(|o| query.user_id.map_or(true, |u| o.user_id == u))
      .filter(|o| query.status.map_or(true, |s| o.status == s))
      .cloned()
      .collect();
    orders.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
    let total = orders.len() as i64;
    Ok((query.page.slice(&orders), total))
  }

  async fn set_order_status(&self, id: Uuid, status: OrderStatus, cancel_reason: Option<&str>) -> Result<Option<Order>> {
    let mut data = self.data.lock();
    Ok(data.orders.get_mut(&id).map(|o| {
      o.status = status;
      if let Some(reason) = cancel_reason {
        o.cancel_reason = Some(reason.to_string());
      }
      o.updated_at = Utc::now();
      o.clone()
    }))
  }

  async fn mark_order_paid(&self, id: Uuid, payment_intent_id: &str, paid_at: DateTime<Utc>) -> Result<Option<Order>> {
    let mut data = self.data.lock();
    Ok(data.orders.get_mut(&id).map(|o| {
      o.status = OrderStatus::Paid;
      o.payment_intent_id = Some(payment_intent_id.to_string());
      o.paid_at = Some(paid_at);
      o.updated_at = paid_at;
      o.clone()
    }))
  }

  async fn list_seller_orders(
    &self,
    seller_id: Uuid,
    status: Option<OrderStatus>,
    page: &PageParams,
  ) -> Result<(Vec<Order>, i64)> {
    let data = self.data.lock();
    let order_ids = data.seller_order_ids(seller_id);
    let mut orders: Vec<Order> = data
      .orders
      .values()
      .filter(|o| order_ids.contains(&o.id))
      .filter(|o| status.map_or(true, |s| o.status == s))
      .cloned()
      .collect();
    orders.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
    let total = orders.len() as i64;
    Ok((page.slice(&orders), total))
  }

  async fn count_open_orders(&self, user_id: Uuid) -> Result<i64> {
    let data = self.data.lock();
    Ok(
      data
        .orders
        .values()
        .filter(|o| o.user_id == user_id && o.status.is_open())
        .count() as i64,
    )
  }

  async fn count_open_seller_orders(&self, seller_id: Uuid) -> Result<i64> {
    let data = self.data.lock();
    let order_ids = data.seller_order_ids(seller_id);
    Ok(
      data
        .orders
        .values()
        .filter(|o| order_ids.contains(&o.id) && o.status.is_open())
        .count() as i64,
    )
  }
}

#[async_trait]
impl WishlistStore for MemoryStore {
  async fn wishlist(&self, user_id: Uuid) -> Result<Vec<WishlistEntry>> {
    let data = self.data.lock();
    let mut entries: Vec<WishlistEntry> = data
      .wishlist
      .iter()
      .filter(|w| w.user_id == user_id)
      .filter_map(|w| {
        data.products.get(&w.product_id).map(|p| WishlistEntry {
          product_id: p.id,
          name: p.name.clone(),
          price_cents: p.price_cents,
          image_url: p.image_url.clone(),
          added_at: w.added_at,
        })
      })
      .collect();
    entries.sort_by(|a, b| b.added_at.cmp(&a.added_at));
    Ok(entries)
  }

  async fn add_to_wishlist(&self, user_id: Uuid, product_id: Uuid) -> Result<WishlistItem> {
    let mut data = self.data.lock();
    if data
      .wishlist
      .iter()
      .any(|w| w.user_id == user_id && w.product_id == product_id)
    {
      return Err(AppError::Conflict("Product already in wishlist".to_string()));
    }
    let item = WishlistItem {
      user_id,
      product_id,
      added_at: Utc::now(),
    };
    data.wishlist.push(item.clone());
    Ok(item)
  }

  async fn remove_from_wishlist(&self, user_id: Uuid, product_id: Uuid) -> Result<bool> {
    let mut data = self.data.lock();
    let before = data.wishlist.len();
    data
      .wishlist
      .retain(|w| !(w.user_id == user_id && w.product_id == product_id));
    Ok(data.wishlist.len() < before)
  }
}

#[async_trait]
impl WebhookEventStore for MemoryStore {
  async fn is_event_processed(&self, event_id: &str) -> Result<bool> {
    Ok(self.data.lock().webhook_events.contains_key(event_id))
  }

  async fn record_event(&self, event_id: &str, event_type: &str) -> Result<bool> {
    let mut data = self.data.lock();
    if data.webhook_events.contains_key(event_id) {
      return Ok(false);
    }
    data
      .webhook_events
      .insert(event_id.to_string(), event_type.to_string());
    Ok(true)
  }
}

#[async_trait]
impl IdempotencyStore for MemoryStore {
  async fn find_idempotent_order(&self, user_id: Uuid, key: Uuid) -> Result<Option<Uuid>> {
    Ok(self.data.lock().idempotency_keys.get(&(user_id, key)).copied())
  }

  async fn remember_idempotent_order(&self, user_id: Uuid, key: Uuid, order_id: Uuid) -> Result<()> {
    let mut data = self.data.lock();
    if data.idempotency_keys.contains_key(&(user_id, key)) {
      return Err(AppError::Conflict("Idempotency key already used".to_string()));
    }
    data.idempotency_keys.insert((user_id, key), order_id);
    Ok(())
  }
}

#[async_trait]
impl SellerStore for MemoryStore {
  async fn insert_seller(&self, seller: &NewSeller) -> Result<Seller> {
    let mut data = self.data.lock();
    if data.sellers.values().any(|s| s.user_id == seller.user_id) {
      return Err(AppError::Conflict("User already has a seller profile".to_string()));
    }
    if data.sellers.values().any(|s| s.siret == seller.siret) {
      return Err(AppError::Conflict("SIRET already registered".to_string()));
    }
    if !data.users.contains_key(&seller.user_id) {
      return Err(AppError::validation("user_id", "User does not exist"));
    }
    let now = Utc::now();
    let row = Seller {
      id: Uuid::new_v4(),
      user_id: seller.user_id,
      shop_name: seller.shop_name.clone(),
      description: seller.description.clone(),
      siret: seller.siret.clone(),
      is_verified: false,
      created_at: now,
      updated_at: now,
    };
    data.sellers.insert(row.id, row.clone());
    Ok(row)
  }

  async fn find_seller(&self, id: Uuid) -> Result<Option<Seller>> {
    Ok(self.data.lock().sellers.get(&id).cloned())
  }

  async fn find_seller_by_user(&self, user_id: Uuid) -> Result<Option<Seller>> {
    Ok(self.data.lock().sellers.values().find(|s| s.user_id == user_id).cloned())
  }

  async fn list_sellers(&self, query: &SellerQuery) -> Result<(Vec<SellerWithStats>, i64)> {
    let data = self.data.lock();
    let mut sellers: Vec<Seller> = data
      .sellers
      .values()
      .filter(|s| query.verified.map_or(true, |v| s.is_verified == v))
      .cloned()
      .collect();
    sellers.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
    let total = sellers.len() as i64;
    let page = query
      .page
      .slice(&sellers)
      .into_iter()
      .map(|seller| SellerWithStats {
        total_products: data.active_product_count(seller.user_id),
        seller,
      })
      .collect();
    Ok((page, total))
  }

  async fn update_seller(&self, id: Uuid, patch: &SellerPatch) -> Result<Option<Seller>> {
    let mut data = self.data.lock();
    Ok(data.sellers.get_mut(&id).map(|s| {
      patch.apply(s);
      s.updated_at = Utc::now();
      s.clone()
    }))
  }

  async fn verify_seller(&self, id: Uuid) -> Result<Option<Seller>> {
    let mut data = self.data.lock();
    Ok(data.sellers.get_mut(&id).map(|s| {
      s.is_verified = true;
      s.updated_at = Utc::now();
      s.clone()
    }))
  }

  async fn delete_seller(&self, id: Uuid) -> Result<bool> {
    let mut data = self.data.lock();
    let Some(seller) = data.sellers.remove(&id) else {
      return Ok(false);
    };
    data.deactivate_products_of(seller.user_id);
    Ok(true)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn new_product(seller_id: Uuid, price_cents: i64) -> NewProduct {
    NewProduct {
      seller_id,
      category_id: None,
      name: "Tote bag".to_string(),
      description: None,
      price_cents,
      stock: 10,
      image_url: None,
    }
  }

  #[tokio::test]
  async fn adding_the_same_product_merges_quantities() {
    let store = MemoryStore::new();
    let user = Uuid::new_v4();
    let product = store.insert_product(&new_product(Uuid::new_v4(), 1200)).await.unwrap();
    let cart = store.get_or_create_cart(user).await.unwrap();

    store.add_cart_line(cart.id, product.id, 2).await.unwrap();
    let merged = store.add_cart_line(cart.id, product.id, 3).await.unwrap();

    assert_eq!(merged.quantity, 5);
    assert_eq!(store.cart_lines(cart.id).await.unwrap().len(), 1);
    assert_eq!(store.get_or_create_cart(user).await.unwrap().id, cart.id);
  }

  #[tokio::test]
  async fn clearing_keeps_the_cart_and_restore_brings_lines_back() {
    let store = MemoryStore::new();
    let user = Uuid::new_v4();
    let product = store.insert_product(&new_product(Uuid::new_v4(), 500)).await.unwrap();
    let cart = store.get_or_create_cart(user).await.unwrap();
    store.add_cart_line(cart.id, product.id, 1).await.unwrap();

    let removed = store.clear_cart(cart.id).await.unwrap();
    assert_eq!(removed.len(), 1);
    assert!(store.cart_lines(cart.id).await.unwrap().is_empty());
    assert!(store.find_cart(user).await.unwrap().is_some());

    store.restore_cart_lines(&removed).await.unwrap();
    assert_eq!(store.cart_lines(cart.id).await.unwrap(), removed);
  }

  #[tokio::test]
  async fn taking_lines_leaves_later_additions_in_the_cart() {
    let store = MemoryStore::new();
    let seller = Uuid::new_v4();
    let plate = store.insert_product(&new_product(seller, 1000)).await.unwrap();
    let cup = store.insert_product(&new_product(seller, 500)).await.unwrap();
    let cart = store.get_or_create_cart(Uuid::new_v4()).await.unwrap();
    store.add_cart_line(cart.id, plate.id, 2).await.unwrap();
    let captured = store.cart_lines(cart.id).await.unwrap();

    store.add_cart_line(cart.id, cup.id, 1).await.unwrap();
    let taken = store.take_cart_lines(cart.id, &captured).await.unwrap();

    assert_eq!(taken, captured);
    let left = store.cart_lines(cart.id).await.unwrap();
    assert_eq!(left.len(), 1);
    assert_eq!(left[0].product_id, cup.id);
  }

  #[tokio::test]
  async fn taking_changed_or_missing_lines_is_a_conflict_and_removes_nothing() {
    let store = MemoryStore::new();
    let seller = Uuid::new_v4();
    let plate = store.insert_product(&new_product(seller, 1000)).await.unwrap();
    let cup = store.insert_product(&new_product(seller, 500)).await.unwrap();
    let cart = store.get_or_create_cart(Uuid::new_v4()).await.unwrap();
    store.add_cart_line(cart.id, plate.id, 2).await.unwrap();
    store.add_cart_line(cart.id, cup.id, 1).await.unwrap();
    let captured = store.cart_lines(cart.id).await.unwrap();

    store.add_cart_line(cart.id, cup.id, 1).await.unwrap();
    let err = store.take_cart_lines(cart.id, &captured).await.unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));
    assert_eq!(store.cart_lines(cart.id).await.unwrap().len(), 2);

    let fresh = store.cart_lines(cart.id).await.unwrap();
    store.take_cart_lines(cart.id, &fresh).await.unwrap();
    let err = store.take_cart_lines(cart.id, &fresh).await.unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));
  }

  #[tokio::test]
  async fn merged_quantity_is_capped() {
    let store = MemoryStore::new();
    let product = store.insert_product(&new_product(Uuid::new_v4(), 100)).await.unwrap();
    let cart = store.get_or_create_cart(Uuid::new_v4()).await.unwrap();
    store.add_cart_line(cart.id, product.id, MAX_LINE_QUANTITY).await.unwrap();

    let err = store.add_cart_line(cart.id, product.id, 1).await.unwrap_err();
    assert!(matches!(err, AppError::Validation { .. }));
    assert_eq!(store.cart_lines(cart.id).await.unwrap()[0].quantity, MAX_LINE_QUANTITY);
  }

  #[tokio::test]
  async fn category_with_products_cannot_be_deleted() {
    let store = MemoryStore::new();
    let category = store
      .insert_category(&NewCategory {
        name: "Ceramics".to_string(),
        description: None,
      })
      .await
      .unwrap();
    let mut product = new_product(Uuid::new_v4(), 900);
    product.category_id = Some(category.id);
    store.insert_product(&product).await.unwrap();

    let err = store.delete_category(category.id).await.unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));
  }

  #[tokio::test]
  async fn webhook_events_are_recorded_once() {
    let store = MemoryStore::new();
    assert!(store.record_event("evt_1", "payment_intent.succeeded").await.unwrap());
    assert!(!store.record_event("evt_1", "payment_intent.succeeded").await.unwrap());
    assert!(store.is_event_processed("evt_1").await.unwrap());
  }

  #[tokio::test]
  async fn expired_sessions_are_not_found() {
    let store = MemoryStore::new();
    let user = Uuid::new_v4();
    store
      .insert_session("digest", user, Utc::now() - chrono::Duration::seconds(1))
      .await
      .unwrap();
    assert_eq!(store.find_session("digest").await.unwrap(), None);
  }

  fn new_user(role: Role) -> NewUser {
    let id = Uuid::new_v4();
    NewUser {
      id,
      email: format!("{}@example.com", id),
      first_name: "Nadia".to_string(),
      last_name: "Haddad".to_string(),
      phone: None,
      street: None,
      postal_code: None,
      city: None,
      role,
    }
  }

  async fn place_order(store: &MemoryStore, buyer: Uuid, product: &Product) -> Order {
    let order = store
      .insert_order(&NewOrder {
        id: Uuid::new_v4(),
        user_id: buyer,
        total_cents: product.price_cents,
        currency: "eur".to_string(),
      })
      .await
      .unwrap();
    store
      .insert_order_lines(&[NewOrderLine {
        order_id: order.id,
        product_id: product.id,
        product_name: product.name.clone(),
        quantity: 1,
        unit_price_cents: product.price_cents,
      }])
      .await
      .unwrap();
    order
  }

  #[tokio::test]
  async fn deleting_a_user_removes_what_they_own() {
    let store = MemoryStore::new();
    let seller = store.insert_user(&new_user(Role::Seller)).await.unwrap();
    let buyer = store.insert_user(&new_user(Role::Client)).await.unwrap();
    let product = store.insert_product(&new_product(seller.id, 700)).await.unwrap();
    let kept = store.insert_product(&new_product(Uuid::new_v4(), 300)).await.unwrap();

    let cart = store.get_or_create_cart(buyer.id).await.unwrap();
    store.add_cart_line(cart.id, product.id, 1).await.unwrap();
    store.add_cart_line(cart.id, kept.id, 1).await.unwrap();
    store.add_to_wishlist(buyer.id, product.id).await.unwrap();
    place_order(&store, buyer.id, &kept).await;

    assert!(store.delete_user(seller.id).await.unwrap());
    assert!(store.find_product(product.id).await.unwrap().is_none());
    let lines = store.cart_lines(cart.id).await.unwrap();
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0].product_id, kept.id);
    assert!(store.wishlist(buyer.id).await.unwrap().is_empty());

    assert!(store.delete_user(buyer.id).await.unwrap());
    assert!(store.find_cart(buyer.id).await.unwrap().is_none());
    let (orders, total) = store
      .list_orders(&OrderQuery {
        user_id: Some(buyer.id),
        status: None,
        page: PageParams::default(),
      })
      .await
      .unwrap();
    assert!(orders.is_empty());
    assert_eq!(total, 0);
    assert!(!store.delete_user(buyer.id).await.unwrap());
  }

  #[tokio::test]
  async fn stock_adjustments_are_bounded() {
    let store = MemoryStore::new();
    let product = store.insert_product(&new_product(Uuid::new_v4(), 100)).await.unwrap();

    let updated = store.adjust_stock(product.id, StockChange::Subtract(4)).await.unwrap().unwrap();
    assert_eq!(updated.stock, 6);
    let err = store.adjust_stock(product.id, StockChange::Subtract(7)).await.unwrap_err();
    assert!(matches!(err, AppError::Validation { .. }));
    assert_eq!(store.find_product(product.id).await.unwrap().unwrap().stock, 6);
    assert!(store.adjust_stock(Uuid::new_v4(), StockChange::Set(1)).await.unwrap().is_none());
  }

  #[tokio::test]
  async fn seller_profiles_are_unique_and_deleting_one_hides_products() {
    let store = MemoryStore::new();
    let user = store.insert_user(&new_user(Role::Seller)).await.unwrap();
    let other = store.insert_user(&new_user(Role::Seller)).await.unwrap();
    let profile = NewSeller {
      user_id: user.id,
      shop_name: "Atelier Nord".to_string(),
      description: None,
      siret: "12345678901234".to_string(),
    };
    let seller = store.insert_seller(&profile).await.unwrap();
    let again = store.insert_seller(&profile).await.unwrap_err();
    assert!(matches!(again, AppError::Conflict(_)));
    let same_siret = store
      .insert_seller(&NewSeller {
        user_id: other.id,
        ..profile.clone()
      })
      .await
      .unwrap_err();
    assert!(matches!(same_siret, AppError::Conflict(_)));

    let product = store.insert_product(&new_product(user.id, 1500)).await.unwrap();
    let (listed, _) = store.list_sellers(&SellerQuery::default()).await.unwrap();
    assert_eq!(listed[0].total_products, 1);

    assert!(store.delete_seller(seller.id).await.unwrap());
    assert!(!store.find_product(product.id).await.unwrap().unwrap().is_active);
    assert!(store.find_seller_by_user(user.id).await.unwrap().is_none());
  }

  #[tokio::test]
  async fn seller_orders_are_those_holding_their_products() {
    let store = MemoryStore::new();
    let seller = Uuid::new_v4();
    let buyer = Uuid::new_v4();
    let mine = store.insert_product(&new_product(seller, 400)).await.unwrap();
    let theirs = store.insert_product(&new_product(Uuid::new_v4(), 400)).await.unwrap();
    let order = place_order(&store, buyer, &mine).await;
    place_order(&store, buyer, &theirs).await;

    let (orders, total) = store
      .list_seller_orders(seller, None, &PageParams::default())
      .await
      .unwrap();
    assert_eq!(total, 1);
    assert_eq!(orders[0].id, order.id);
    assert_eq!(store.count_open_seller_orders(seller).await.unwrap(), 1);
    assert_eq!(store.count_open_orders(buyer).await.unwrap(), 2);

    store.set_order_status(order.id, OrderStatus::Delivered, None).await.unwrap();
    assert_eq!(store.count_open_seller_orders(seller).await.unwrap(), 0);
  }
}
