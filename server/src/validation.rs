// server/src/validation.rs

//! Field checks for request bodies. Errors are collected so a client sees
//! every rejected field at once.

use crate::errors::{AppError, FieldError, Result};

#[derive(Debug, Default)]
pub struct FieldErrors(Vec<FieldError>);

impl FieldErrors {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn add(&mut self, field: &str, message: impl Into<String>) {
    self.0.push(FieldError {
      field: field.to_string(),
      message: message.into(),
    });
  }

  /// Records `message` for `field` unless `ok` holds.
  pub fn check(&mut self, ok: bool, field: &str, message: &str) {
    if !ok {
      self.add(field, message);
    }
  }

  pub fn is_empty(&self) -> bool {
    self.0.is_empty()
  }

  pub fn into_result(self) -> Result<()> {
    if self.0.is_empty() {
      return Ok(());
    }
    let message = if self.0.len() == 1 {
      self.0[0].message.clone()
    } else {
      "Request validation failed".to_string()
    };
    Err(AppError::Validation {
      message,
      fields: self.0,
    })
  }
}

/// Loose structural check: one `@`, non-empty local part, a dot in the
/// domain and no whitespace.
pub fn is_valid_email(email: &str) -> bool {
  let Some((local, domain)) = email.split_once('@') else {
    return false;
  };
  !local.is_empty()
    && !domain.contains('@')
    && !email.chars().any(char::is_whitespace)
    && domain
      .split_once('.')
      .is_some_and(|(host, tld)| !host.is_empty() && !tld.is_empty() && !tld.ends_with('.'))
}

pub fn is_postal_code(value: &str) -> bool {
  value.len() == 5 && value.chars().all(|c| c.is_ascii_digit())
}

/// Trims and rejects blank input.
pub fn non_blank(value: &str) -> Option<String> {
  let trimmed = value.trim();
  (!trimmed.is_empty()).then(|| trimmed.to_string())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn email_shapes() {
    assert!(is_valid_email("ana@example.com"));
    assert!(is_valid_email("a.b+shop@mail.example.fr"));
    assert!(!is_valid_email("ana.example.com"));
    assert!(!is_valid_email("@example.com"));
    assert!(!is_valid_email("ana@localhost"));
    assert!(!is_valid_email("ana @example.com"));
    assert!(!is_valid_email("ana@ex@ample.com"));
  }

  #[test]
  fn postal_codes_are_five_digits() {
    assert!(is_postal_code("75011"));
    assert!(!is_postal_code("7501"));
    assert!(!is_postal_code("75O11"));
  }

  #[test]
  fn collected_errors_keep_every_field() {
    let mut errors = FieldErrors::new();
    errors.check(false, "email", "Invalid email format");
    errors.check(true, "first_name", "unused");
    errors.check(false, "password", "Password must be at least 8 characters");

    match errors.into_result() {
      Err(AppError::Validation { message, fields }) => {
        assert_eq!(message, "Request validation failed");
        assert_eq!(fields.len(), 2);
        assert_eq!(fields[1].field, "password");
      }
      other => panic!("expected validation error, got {other:?}"),
    }
  }

  #[test]
  fn single_error_uses_its_own_message() {
    let mut errors = FieldErrors::new();
    errors.add("name", "Category name is required");
    let err = errors.into_result().unwrap_err();
    assert_eq!(err.to_string(), "Validation Error: Category name is required");
  }
}
