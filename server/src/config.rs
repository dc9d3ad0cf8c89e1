// server/src/config.rs

use crate::errors::{AppError, Result};
use std::collections::HashMap;
use std::fmt;

/// A configuration value that must never reach the logs.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
  pub fn new(value: impl Into<String>) -> Self {
    Secret(value.into())
  }

  pub fn expose(&self) -> &str {
    &self.0
  }
}

impl fmt::Debug for Secret {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str("[REDACTED]")
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
  Development,
  Production,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthBackend {
  Supabase,
  Local,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentBackend {
  Stripe,
  Mock,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
  Text,
  Json,
}

#[derive(Debug, Clone)]
pub struct SupabaseConfig {
  pub url: String,
  pub anon_key: Secret,
  pub service_role_key: Option<Secret>,
}

#[derive(Debug, Clone)]
pub struct StripeConfig {
  pub secret_key: Secret,
  pub api_base: String,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
  pub server_host: String,
  pub server_port: u16,
  pub environment: Environment,

  /// `None` runs against the in-memory store.
  pub database_url: Option<Secret>,
  pub database_max_connections: u32,

  pub auth_backend: AuthBackend,
  pub supabase: Option<SupabaseConfig>,

  pub payment_backend: PaymentBackend,
  pub stripe: Option<StripeConfig>,
  pub webhook_secret: Secret,
  pub webhook_tolerance_secs: i64,
  pub payment_currency: String,

  pub frontend_url: String,
  pub log_format: LogFormat,
  pub mock_email_sender: String,
}

impl AppConfig {
  pub fn from_env() -> Result<Self> {
    dotenvy::dotenv().ok();
    Self::from_lookup(|name| std::env::var(name).ok())
  }

  /// Builds the configuration from a plain map, as tests do.
  pub fn from_map(vars: &HashMap<String, String>) -> Result<Self> {
    Self::from_lookup(|name| vars.get(name).cloned())
  }

  pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
    let get_env = |var_name: &str| lookup(var_name).filter(|v| !v.trim().is_empty());
    let require = |var_name: &str| {
      get_env(var_name).ok_or_else(|| AppError::Config(format!("Missing environment variable '{}'", var_name)))
    };

    let server_host = get_env("SERVER_HOST").unwrap_or_else(|| "127.0.0.1".to_string());
    let server_port = parse_var("SERVER_PORT", get_env("SERVER_PORT"), 8080u16)?;

    let environment = match get_env("APP_ENV").as_deref().map(str::to_ascii_lowercase).as_deref() {
      None | Some("development") | Some("dev") | Some("test") => Environment::Development,
      Some("production") | Some("prod") => Environment::Production,
      Some(other) => return Err(AppError::Config(format!("Invalid APP_ENV value: {}", other))),
    };

    let database_url = get_env("DATABASE_URL").map(Secret::new);
    let database_max_connections = parse_var("DATABASE_MAX_CONNECTIONS", get_env("DATABASE_MAX_CONNECTIONS"), 10u32)?;

    let auth_backend = match get_env("AUTH_BACKEND").as_deref() {
      None | Some("local") => AuthBackend::Local,
      Some("supabase") => AuthBackend::Supabase,
      Some(other) => return Err(AppError::Config(format!("Invalid AUTH_BACKEND value: {}", other))),
    };
    let supabase = match auth_backend {
      AuthBackend::Supabase => Some(SupabaseConfig {
        url: require("SUPABASE_URL")?.trim_end_matches('/').to_string(),
        anon_key: Secret::new(require("SUPABASE_ANON_KEY")?),
        service_role_key: get_env("SUPABASE_SERVICE_ROLE_KEY").map(Secret::new),
      }),
      AuthBackend::Local => None,
    };

    let payment_backend = match get_env("PAYMENT_BACKEND").as_deref() {
      None | Some("mock") => PaymentBackend::Mock,
      Some("stripe") => PaymentBackend::Stripe,
      Some(other) => return Err(AppError::Config(format!("Invalid PAYMENT_BACKEND value: {}", other))),
    };
    let stripe = match payment_backend {
      PaymentBackend::Stripe => Some(StripeConfig {
        secret_key: Secret::new(require("STRIPE_SECRET_KEY")?),
        api_base: get_env("STRIPE_API_BASE")
          .unwrap_or_else(|| "https://api.stripe.com".to_string())
          .trim_end_matches('/')
          .to_string(),
      }),
      PaymentBackend::Mock => None,
    };
    let webhook_secret = Secret::new(require("STRIPE_WEBHOOK_SECRET")?);
    let webhook_tolerance_secs = parse_var(
      "STRIPE_WEBHOOK_TOLERANCE_SECS",
      get_env("STRIPE_WEBHOOK_TOLERANCE_SECS"),
      300i64,
    )?;
    if webhook_tolerance_secs <= 0 {
      return Err(AppError::Config("STRIPE_WEBHOOK_TOLERANCE_SECS must be positive".to_string()));
    }
    let payment_currency = get_env("PAYMENT_CURRENCY")
      .unwrap_or_else(|| "eur".to_string())
      .to_ascii_lowercase();

    let frontend_url = get_env("FRONTEND_URL")
      .unwrap_or_else(|| "http://localhost:3000".to_string())
      .trim_end_matches('/')
      .to_string();
    let log_format = match get_env("LOG_FORMAT").as_deref() {
      None | Some("text") => LogFormat::Text,
      Some("json") => LogFormat::Json,
      Some(other) => return Err(AppError::Config(format!("Invalid LOG_FORMAT value: {}", other))),
    };
    let mock_email_sender = get_env("MOCK_EMAIL_SENDER").unwrap_or_else(|| "noreply@example.com".to_string());

    Ok(Self {
      server_host,
      server_port,
      environment,
      database_url,
      database_max_connections,
      auth_backend,
      supabase,
      payment_backend,
      stripe,
      webhook_secret,
      webhook_tolerance_secs,
      payment_currency,
      frontend_url,
      log_format,
      mock_email_sender,
    })
  }

  pub fn is_production(&self) -> bool {
    self.environment == Environment::Production
  }
}

fn parse_var<T>(name: &str, raw: Option<String>, default: T) -> Result<T>
where
  T: std::str::FromStr,
  T::Err: fmt::Display,
{
  match raw {
    None => Ok(default),
    Some(value) => value
      .trim()
      .parse::<T>()
      .map_err(|e| AppError::Config(format!("Invalid {}: {}", name, e))),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
  }

  #[test]
  fn defaults_need_only_the_webhook_secret() {
    let cfg = AppConfig::from_map(&vars(&[("STRIPE_WEBHOOK_SECRET", "whsec_test")])).unwrap();
    assert_eq!(cfg.server_port, 8080);
    assert_eq!(cfg.environment, Environment::Development);
    assert_eq!(cfg.auth_backend, AuthBackend::Local);
    assert_eq!(cfg.payment_backend, PaymentBackend::Mock);
    assert_eq!(cfg.payment_currency, "eur");
    assert_eq!(cfg.webhook_tolerance_secs, 300);
    assert!(cfg.database_url.is_none());
  }

  #[test]
  fn missing_webhook_secret_is_a_config_error() {
    let err = AppConfig::from_map(&HashMap::new()).unwrap_err();
    assert!(err.to_string().contains("STRIPE_WEBHOOK_SECRET"));
  }

  #[test]
  fn stripe_backend_requires_secret_key() {
    let err = AppConfig::from_map(&vars(&[("STRIPE_WEBHOOK_SECRET", "whsec"), ("PAYMENT_BACKEND", "stripe")])).unwrap_err();
    assert!(err.to_string().contains("STRIPE_SECRET_KEY"));
  }

  #[test]
  fn invalid_port_names_the_variable() {
    let err = AppConfig::from_map(&vars(&[("STRIPE_WEBHOOK_SECRET", "whsec"), ("SERVER_PORT", "eighty")])).unwrap_err();
    assert!(err.to_string().contains("SERVER_PORT"));
  }

  #[test]
  fn secrets_are_redacted_in_debug_output() {
    let cfg = AppConfig::from_map(&vars(&[("STRIPE_WEBHOOK_SECRET", "whsec_very_secret")])).unwrap();
    let printed = format!("{:?}", cfg);
    assert!(!printed.contains("whsec_very_secret"));
    assert!(printed.contains("[REDACTED]"));
  }
}
