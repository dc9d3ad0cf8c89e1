// server/src/models/user.rs

use crate::models::pagination::PageParams;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type as SqlxType};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, SqlxType)]
#[sqlx(type_name = "user_role", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
  Client,
  Seller,
  Admin,
}

impl Role {
  /// Case-insensitive role name.
  pub fn parse(raw: &str) -> Option<Self> {
    match raw.trim().to_ascii_uppercase().as_str() {
      "CLIENT" => Some(Role::Client),
      "SELLER" => Some(Role::Seller),
      "ADMIN" => Some(Role::Admin),
      _ => None,
    }
  }
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct User {
  pub id: Uuid,
  pub email: String,
  pub first_name: String,
  pub last_name: String,
  pub phone: Option<String>,
  pub street: Option<String>,
  pub postal_code: Option<String>,
  pub city: Option<String>,
  pub role: Role,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

impl User {
  pub fn has_role(&self, roles: &[Role]) -> bool {
    roles.contains(&self.role)
  }
}

/// Sign-up request body.
#[derive(Clone, Deserialize)]
pub struct Registration {
  pub email: String,
  pub password: String,
  #[serde(default)]
  pub first_name: String,
  #[serde(default)]
  pub last_name: String,
  pub phone: Option<String>,
  pub street: Option<String>,
  pub postal_code: Option<String>,
  pub city: Option<String>,
}

impl std::fmt::Debug for Registration {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Registration")
      .field("email", &self.email)
      .field("first_name", &self.first_name)
      .field("last_name", &self.last_name)
      .finish_non_exhaustive()
  }
}

#[derive(Debug, Clone)]
pub struct NewUser {
  pub id: Uuid,
  pub email: String,
  pub first_name: String,
  pub last_name: String,
  pub phone: Option<String>,
  pub street: Option<String>,
  pub postal_code: Option<String>,
  pub city: Option<String>,
  pub role: Role,
}

/// Profile fields a user or an admin may edit. The email belongs to the
/// identity provider and is not part of it.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserPatch {
  pub first_name: Option<String>,
  pub last_name: Option<String>,
  pub phone: Option<String>,
  pub street: Option<String>,
  pub postal_code: Option<String>,
  pub city: Option<String>,
}

impl UserPatch {
  pub fn apply(&self, user: &mut User) {
    if let Some(first_name) = &self.first_name {
      user.first_name = first_name.clone();
    }
    if let Some(last_name) = &self.last_name {
      user.last_name = last_name.clone();
    }
    if let Some(phone) = &self.phone {
      user.phone = Some(phone.clone());
    }
    if let Some(street) = &self.street {
      user.street = Some(street.clone());
    }
    if let Some(postal_code) = &self.postal_code {
      user.postal_code = Some(postal_code.clone());
    }
    if let Some(city) = &self.city {
      user.city = Some(city.clone());
    }
  }
}

#[derive(Debug, Clone, Default)]
pub struct UserQuery {
  pub role: Option<Role>,
  /// Matched against first name, last name and email.
  pub search: Option<String>,
  pub page: PageParams,
}

impl UserQuery {
  pub fn matches(&self, user: &User) -> bool {
    if self.role.is_some_and(|role| user.role != role) {
      return false;
    }
    match &self.search {
      Some(term) => {
        let term = term.to_lowercase();
        [&user.first_name, &user.last_name, &user.email]
          .iter()
          .any(|field| field.to_lowercase().contains(&term))
      }
      None => true,
    }
  }
}

/// Password login data kept by the local identity provider.
#[derive(Debug, Clone, FromRow)]
pub struct Credentials {
  pub user_id: Uuid,
  pub email: String,
  pub password_hash: String,
}
