// server/src/services/identity/supabase.rs

//! Client for the managed auth service (GoTrue REST API under `/auth/v1`).

use super::{IdentityProvider, Session};
use crate::config::{Secret, SupabaseConfig};
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, instrument, warn};
use uuid::Uuid;

const SERVICE: &str = "supabase";

pub struct SupabaseAuth {
  client: reqwest::Client,
  base_url: String,
  anon_key: Secret,
  service_role_key: Option<Secret>,
}

#[derive(Deserialize)]
struct TokenResponse {
  access_token: String,
  #[serde(default)]
  expires_in: Option<i64>,
  user: AuthUser,
}

#[derive(Deserialize)]
struct AuthUser {
  id: Uuid,
}

impl SupabaseAuth {
  pub fn new(config: &SupabaseConfig) -> Result<Self> {
    let client = reqwest::Client::builder()
      .timeout(std::time::Duration::from_secs(10))
      .build()
      .map_err(|e| AppError::Config(format!("Failed to build auth HTTP client: {}", e)))?;
    Ok(Self {
      client,
      base_url: config.url.clone(),
      anon_key: config.anon_key.clone(),
      service_role_key: config.service_role_key.clone(),
    })
  }

  fn request(&self, method: Method, path: &str) -> RequestBuilder {
    self
      .client
      .request(method, format!("{}/auth/v1{}", self.base_url, path))
      .header("apikey", self.anon_key.expose())
  }

  async fn send(&self, request: RequestBuilder) -> Result<Response> {
    request.send().await.map_err(|e| AppError::Upstream {
      service: SERVICE,
      message: e.to_string(),
    })
  }
}

/// GoTrue reports errors under several keys depending on the endpoint.
fn error_message(body: &Value) -> String {
  ["msg", "error_description", "message", "error"]
    .iter()
    .find_map(|key| body.get(*key).and_then(Value::as_str))
    .unwrap_or("unknown error")
    .to_string()
}

async fn failure(response: Response) -> (StatusCode, String) {
  let status = response.status();
  let body = response.json::<Value>().await.unwrap_or(Value::Null);
  (status, error_message(&body))
}

fn upstream(status: StatusCode, message: String) -> AppError {
  AppError::Upstream {
    service: SERVICE,
    message: format!("{} ({})", message, status.as_u16()),
  }
}

#[async_trait]
impl IdentityProvider for SupabaseAuth {
  #[instrument(name = "identity::supabase::sign_up", skip(self, password))]
  async fn sign_up(&self, email: &str, password: &str) -> Result<Uuid> {
    let response = self
      .send(
        self
          .request(Method::POST, "/signup")
          .json(&json!({ "email": email, "password": password })),
      )
      .await?;
    if !response.status().is_success() {
      let (status, message) = failure(response).await;
      if message.to_lowercase().contains("already registered") {
        return Err(AppError::Conflict("Email already registered".to_string()));
      }
      return Err(upstream(status, message));
    }

    // With email confirmation on, the user object is returned bare.
    let body: Value = response.json().await.map_err(|e| upstream(StatusCode::OK, e.to_string()))?;
    let id = body
      .get("user")
      .and_then(|u| u.get("id"))
      .or_else(|| body.get("id"))
      .and_then(Value::as_str)
      .and_then(|s| Uuid::parse_str(s).ok())
      .ok_or_else(|| upstream(StatusCode::OK, "sign-up response carried no user id".to_string()))?;
    debug!(user_id = %id, "Identity created by the auth service.");
    Ok(id)
  }

  #[instrument(name = "identity::supabase::sign_in", skip(self, password))]
  async fn sign_in(&self, email: &str, password: &str) -> Result<Session> {
    let response = self
      .send(
        self
          .request(Method::POST, "/token")
          .query(&[("grant_type", "password")])
          .json(&json!({ "email": email, "password": password })),
      )
      .await?;
    match response.status() {
      status if status.is_success() => {
        let token: TokenResponse = response.json().await.map_err(|e| upstream(status, e.to_string()))?;
        Ok(Session {
          access_token: token.access_token,
          user_id: token.user.id,
          expires_at: Utc::now() + Duration::seconds(token.expires_in.unwrap_or(3600)),
        })
      }
      StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED => {
        Err(AppError::Auth("Invalid email or password".to_string()))
      }
      _ => {
        let (status, message) = failure(response).await;
        Err(upstream(status, message))
      }
    }
  }

  async fn resolve_token(&self, token: &str) -> Result<Uuid> {
    let response = self
      .send(self.request(Method::GET, "/user").bearer_auth(token))
      .await?;
    match response.status() {
      status if status.is_success() => {
        let user: AuthUser = response.json().await.map_err(|e| upstream(status, e.to_string()))?;
        Ok(user.id)
      }
      StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN | StatusCode::NOT_FOUND => {
        Err(AppError::Auth("Invalid or expired token".to_string()))
      }
      _ => {
        let (status, message) = failure(response).await;
        Err(upstream(status, message))
      }
    }
  }

  async fn sign_out(&self, token: &str) -> Result<()> {
    let response = self
      .send(self.request(Method::POST, "/logout").bearer_auth(token))
      .await?;
    if !response.status().is_success() {
      let (status, message) = failure(response).await;
      warn!(%status, %message, "Sign-out was not acknowledged by the auth service.");
    }
    Ok(())
  }

  #[instrument(name = "identity::supabase::send_password_reset", skip(self))]
  async fn send_password_reset(&self, email: &str, redirect_to: &str) -> Result<()> {
    let response = self
      .send(
        self
          .request(Method::POST, "/recover")
          .query(&[("redirect_to", redirect_to)])
          .json(&json!({ "email": email })),
      )
      .await?;
    if response.status().is_success() {
      return Ok(());
    }
    let (status, message) = failure(response).await;
    Err(upstream(status, message))
  }

  async fn update_password(&self, token: &str, new_password: &str) -> Result<()> {
    let response = self
      .send(
        self
          .request(Method::PUT, "/user")
          .bearer_auth(token)
          .json(&json!({ "password": new_password })),
      )
      .await?;
    match response.status() {
      status if status.is_success() => Ok(()),
      StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(AppError::Auth("Invalid or expired token".to_string())),
      StatusCode::UNPROCESSABLE_ENTITY => {
        let (_, message) = failure(response).await;
        Err(AppError::validation("password", message))
      }
      _ => {
        let (status, message) = failure(response).await;
        Err(upstream(status, message))
      }
    }
  }

  #[instrument(name = "identity::supabase::delete_identity", skip(self))]
  async fn delete_identity(&self, user_id: Uuid) -> Result<()> {
    let service_key = self
      .service_role_key
      .as_ref()
      .ok_or_else(|| AppError::Config("SUPABASE_SERVICE_ROLE_KEY is required to delete identities".to_string()))?;
    let response = self
      .send(
        self
          .client
          .delete(format!("{}/auth/v1/admin/users/{}", self.base_url, user_id))
          .header("apikey", service_key.expose())
          .bearer_auth(service_key.expose()),
      )
      .await?;
    if response.status().is_success() || response.status() == StatusCode::NOT_FOUND {
      return Ok(());
    }
    let (status, message) = failure(response).await;
    Err(upstream(status, message))
  }
}
