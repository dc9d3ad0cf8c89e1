// server/src/services/mailer.rs

use crate::errors::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{info, instrument};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct OutgoingEmail {
  pub to: String,
  pub subject: String,
  pub body: String,
}

#[derive(Debug, Clone)]
pub struct SentEmail {
  pub message_id: String,
  pub from: String,
  pub to: String,
  pub subject: String,
  pub body: String,
}

#[async_trait]
pub trait Mailer: Send + Sync {
  async fn send(&self, email: OutgoingEmail) -> Result<SentEmail>;
}

/// Logs outgoing mail and keeps it in memory instead of delivering it.
pub struct LogMailer {
  sender: String,
  outbox: Mutex<Vec<SentEmail>>,
}

impl LogMailer {
  pub fn new(sender: impl Into<String>) -> Self {
    Self {
      sender: sender.into(),
      outbox: Mutex::new(Vec::new()),
    }
  }

  pub fn sent(&self) -> Vec<SentEmail> {
    self.outbox.lock().clone()
  }
}

#[async_trait]
impl Mailer for LogMailer {
  #[instrument(name = "mailer::send", skip(self, email), fields(to = %email.to, subject = %email.subject))]
  async fn send(&self, email: OutgoingEmail) -> Result<SentEmail> {
    let sent = SentEmail {
      message_id: format!("log_email_{}", Uuid::new_v4()),
      from: self.sender.clone(),
      to: email.to,
      subject: email.subject,
      body: email.body,
    };
    info!(message_id = %sent.message_id, from = %sent.from, "Email recorded (not delivered).");
    self.outbox.lock().push(sent.clone());
    Ok(sent)
  }
}
