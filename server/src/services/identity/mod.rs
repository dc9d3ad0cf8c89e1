// server/src/services/identity/mod.rs

//! Identity providers: who owns a bearer token, and the account lifecycle
//! around it. Profiles and roles live in the store, not here.

pub mod local;
pub mod supabase;

use crate::errors::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

pub use local::LocalIdentity;
pub use supabase::SupabaseAuth;

#[derive(Clone)]
pub struct Session {
  pub access_token: String,
  pub user_id: Uuid,
  pub expires_at: DateTime<Utc>,
}

impl std::fmt::Debug for Session {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Session")
      .field("user_id", &self.user_id)
      .field("expires_at", &self.expires_at)
      .finish_non_exhaustive()
  }
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
  /// Creates the identity and returns its id. Duplicate email is `Conflict`.
  async fn sign_up(&self, email: &str, password: &str) -> Result<Uuid>;

  /// Wrong email or password is `Auth`.
  async fn sign_in(&self, email: &str, password: &str) -> Result<Session>;

  /// Resolves a bearer token to its identity; unknown or expired is `Auth`.
  async fn resolve_token(&self, token: &str) -> Result<Uuid>;

  async fn sign_out(&self, token: &str) -> Result<()>;

  /// Sends a reset link pointing at `redirect_to`. Unknown emails succeed
  /// silently.
  async fn send_password_reset(&self, email: &str, redirect_to: &str) -> Result<()>;

  /// `token` is the recovery token carried by the reset link.
  async fn update_password(&self, token: &str, new_password: &str) -> Result<()>;

  async fn delete_identity(&self, user_id: Uuid) -> Result<()>;
}
