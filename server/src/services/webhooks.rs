// server/src/services/webhooks.rs

//! Payment-processor webhook authentication and event envelope.
//!
//! The `stripe-signature` header has the form `t=<unix>,v1=<hex>[,v1=<hex>...]`.
//! Each `v1` is an HMAC-SHA256 of `"{t}.{raw body}"` keyed with the endpoint
//! secret; any one matching signature is accepted.

use crate::config::Secret;
use crate::errors::AppError;
use chrono::Utc;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use serde_json::Value;
use sha2::Sha256;
use std::collections::HashMap;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "stripe-signature";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignatureError {
  #[error("missing signature header")]
  MissingHeader,
  #[error("malformed signature header")]
  MalformedHeader,
  #[error("no v1 signature in header")]
  NoSignatures,
  #[error("timestamp outside the tolerance window")]
  TimestampOutOfTolerance,
  #[error("no signature matches the payload")]
  Mismatch,
}

pub struct WebhookVerifier {
  keyed: HmacSha256,
  tolerance_secs: i64,
}

impl WebhookVerifier {
  pub fn new(secret: &Secret, tolerance_secs: i64) -> Result<Self, AppError> {
    let keyed = HmacSha256::new_from_slice(secret.expose().as_bytes())
      .map_err(|e| AppError::Config(format!("Invalid STRIPE_WEBHOOK_SECRET: {}", e)))?;
    Ok(Self { keyed, tolerance_secs })
  }

  pub fn verify(&self, payload: &[u8], header: Option<&str>) -> Result<(), SignatureError> {
    self.verify_at(payload, header, Utc::now().timestamp())
  }

  pub fn verify_at(&self, payload: &[u8], header: Option<&str>, now: i64) -> Result<(), SignatureError> {
    let header = header.ok_or(SignatureError::MissingHeader)?;

    let mut timestamp = None;
    let mut signatures = Vec::new();
    for part in header.split(',') {
      let (key, value) = part.trim().split_once('=').ok_or(SignatureError::MalformedHeader)?;
      match key {
        "t" => timestamp = Some(value.parse::<i64>().map_err(|_| SignatureError::MalformedHeader)?),
        "v1" => signatures.push(value),
        _ => {}
      }
    }
    let timestamp = timestamp.ok_or(SignatureError::MalformedHeader)?;
    if signatures.is_empty() {
      return Err(SignatureError::NoSignatures);
    }
    if now.abs_diff(timestamp) > self.tolerance_secs.unsigned_abs() {
      return Err(SignatureError::TimestampOutOfTolerance);
    }

    let matched = signatures.iter().any(|candidate| {
      let Ok(expected) = hex::decode(candidate) else {
        return false;
      };
      self.mac(timestamp, payload).verify_slice(&expected).is_ok()
    });
    if matched {
      Ok(())
    } else {
      Err(SignatureError::Mismatch)
    }
  }

  /// Header a processor would send for `payload` at `timestamp`.
  pub fn signature_header(&self, payload: &[u8], timestamp: i64) -> String {
    let signature = hex::encode(self.mac(timestamp, payload).finalize().into_bytes());
    format!("t={},v1={}", timestamp, signature)
  }

  fn mac(&self, timestamp: i64, payload: &[u8]) -> HmacSha256 {
    let mut mac = self.keyed.clone();
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    mac
  }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripeEvent {
  pub id: String,
  #[serde(rename = "type")]
  pub event_type: String,
  pub data: EventData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventData {
  pub object: Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaymentIntentObject {
  pub id: String,
  #[serde(default)]
  pub metadata: HashMap<String, String>,
}

impl PaymentIntentObject {
  pub fn order_id(&self) -> Option<&str> {
    self.metadata.get("order_id").map(String::as_str)
  }
}
