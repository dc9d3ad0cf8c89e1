// server/src/services/identity/local.rs

use super::{IdentityProvider, Session};
use crate::errors::{AppError, Result};
use crate::models::Credentials;
use crate::services::mailer::{Mailer, OutgoingEmail};
use crate::services::passwords;
use crate::store::Store;
use async_trait::async_trait;
use chrono::{Duration, Utc};
use rand_core::{OsRng, RngCore};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

const RECOVERY_TTL_MINUTES: i64 = 60;

/// Self-hosted identity: argon2 password hashes and opaque session tokens.
/// Only the SHA-256 digest of a token is persisted.
pub struct LocalIdentity {
  store: Arc<dyn Store>,
  mailer: Arc<dyn Mailer>,
  session_ttl: Duration,
}

impl LocalIdentity {
  pub fn new(store: Arc<dyn Store>, mailer: Arc<dyn Mailer>) -> Self {
    Self {
      store,
      mailer,
      session_ttl: Duration::hours(24),
    }
  }

  pub fn with_session_ttl(mut self, ttl: Duration) -> Self {
    self.session_ttl = ttl;
    self
  }

  async fn issue_token(&self, user_id: Uuid, ttl: Duration) -> Result<Session> {
    let mut raw = [0u8; 32];
    OsRng.fill_bytes(&mut raw);
    let access_token = hex::encode(raw);
    let expires_at = Utc::now() + ttl;
    self
      .store
      .insert_session(&token_digest(&access_token), user_id, expires_at)
      .await?;
    Ok(Session {
      access_token,
      user_id,
      expires_at,
    })
  }
}

fn token_digest(token: &str) -> String {
  hex::encode(Sha256::digest(token.as_bytes()))
}

#[async_trait]
impl IdentityProvider for LocalIdentity {
  #[instrument(name = "identity::local::sign_up", skip(self, password))]
  async fn sign_up(&self, email: &str, password: &str) -> Result<Uuid> {
    let password_hash = passwords::hash_password(password)?;
    let user_id = Uuid::new_v4();
    self
      .store
      .insert_credentials(&Credentials {
        user_id,
        email: email.to_string(),
        password_hash,
      })
      .await?;
    info!(%user_id, "Local identity created.");
    Ok(user_id)
  }

  #[instrument(name = "identity::local::sign_in", skip(self, password))]
  async fn sign_in(&self, email: &str, password: &str) -> Result<Session> {
    let invalid = || AppError::Auth("Invalid email or password".to_string());
    let credentials = self.store.find_credentials_by_email(email).await?.ok_or_else(invalid)?;
    if !passwords::verify_password(&credentials.password_hash, password)? {
      warn!("Password mismatch on sign-in.");
      return Err(invalid());
    }
    self.issue_token(credentials.user_id, self.session_ttl).await
  }

  async fn resolve_token(&self, token: &str) -> Result<Uuid> {
    self
      .store
      .find_session(&token_digest(token))
      .await?
      .ok_or_else(|| AppError::Auth("Invalid or expired token".to_string()))
  }

  async fn sign_out(&self, token: &str) -> Result<()> {
    self.store.delete_session(&token_digest(token)).await
  }

  #[instrument(name = "identity::local::send_password_reset", skip(self, redirect_to))]
  async fn send_password_reset(&self, email: &str, redirect_to: &str) -> Result<()> {
    let Some(credentials) = self.store.find_credentials_by_email(email).await? else {
      info!("Password reset requested for an unknown email; nothing sent.");
      return Ok(());
    };
    let recovery = self
      .issue_token(credentials.user_id, Duration::minutes(RECOVERY_TTL_MINUTES))
      .await?;
    let link = format!("{}#access_token={}&type=recovery", redirect_to, recovery.access_token);
    self
      .mailer
      .send(OutgoingEmail {
        to: credentials.email,
        subject: "Reset your password".to_string(),
        body: format!(
          "Follow this link within {} minutes to choose a new password: {}",
          RECOVERY_TTL_MINUTES, link
        ),
      })
      .await?;
    Ok(())
  }

  #[instrument(name = "identity::local::update_password", skip_all)]
  async fn update_password(&self, token: &str, new_password: &str) -> Result<()> {
    let user_id = self.resolve_token(token).await?;
    let password_hash = passwords::hash_password(new_password)?;
    self.store.update_password_hash(user_id, &password_hash).await?;
    self.store.delete_session(&token_digest(token)).await?;
    info!(%user_id, "Password updated.");
    Ok(())
  }

  async fn delete_identity(&self, user_id: Uuid) -> Result<()> {
    self.store.delete_credentials(user_id).await
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::services::mailer::LogMailer;
  use crate::store::MemoryStore;

  fn identity() -> (LocalIdentity, Arc<LogMailer>) {
    let mailer = Arc::new(LogMailer::new("noreply@example.com"));
    (LocalIdentity::new(Arc::new(MemoryStore::new()), mailer.clone()), mailer)
  }

  #[tokio::test]
  async fn sign_in_issues_a_resolvable_token() {
    let (identity, _) = identity();
    let user_id = identity.sign_up("ana@example.com", "s3cret-pass").await.unwrap();

    let session = identity.sign_in("ANA@example.com", "s3cret-pass").await.unwrap();
    assert_eq!(session.user_id, user_id);
    assert_eq!(identity.resolve_token(&session.access_token).await.unwrap(), user_id);

    identity.sign_out(&session.access_token).await.unwrap();
    assert!(matches!(
      identity.resolve_token(&session.access_token).await,
      Err(AppError::Auth(_))
    ));
  }

  #[tokio::test]
  async fn wrong_password_and_duplicate_email() {
    let (identity, _) = identity();
    identity.sign_up("ana@example.com", "s3cret-pass").await.unwrap();

    assert!(matches!(
      identity.sign_in("ana@example.com", "nope-nope").await,
      Err(AppError::Auth(_))
    ));
    assert!(matches!(
      identity.sign_up("ana@example.com", "another-pass").await,
      Err(AppError::Conflict(_))
    ));
  }

  #[tokio::test]
  async fn reset_link_carries_a_recovery_token() {
    let (identity, mailer) = identity();
    identity.sign_up("ana@example.com", "s3cret-pass").await.unwrap();
    identity
      .send_password_reset("ana@example.com", "http://localhost:3000/reset-password")
      .await
      .unwrap();

    let sent = mailer.sent();
    assert_eq!(sent.len(), 1);
    let token = sent[0]
      .body
      .split("access_token=")
      .nth(1)
      .and_then(|rest| rest.split('&').next())
      .unwrap()
      .to_string();

    identity.update_password(&token, "brand-new-pass").await.unwrap();
    assert!(identity.sign_in("ana@example.com", "brand-new-pass").await.is_ok());
    assert!(identity.resolve_token(&token).await.is_err());
  }

  #[tokio::test]
  async fn unknown_email_reset_is_silent() {
    let (identity, mailer) = identity();
    identity
      .send_password_reset("ghost@example.com", "http://localhost:3000/reset-password")
      .await
      .unwrap();
    assert!(mailer.sent().is_empty());
  }
}
