// server/src/services/mod.rs

pub mod identity;
pub mod mailer;
pub mod passwords;
pub mod payments;
pub mod webhooks;
