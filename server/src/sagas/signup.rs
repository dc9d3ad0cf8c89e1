// server/src/sagas/signup.rs

use crate::errors::AppError;
use crate::models::{NewUser, Registration, Role};
use crate::sagas::contexts::SignupCtxData;
use crate::services::mailer::OutgoingEmail;
use crate::validation::{is_postal_code, is_valid_email, non_blank, FieldErrors};
use souk_flow::{ContextData, Saga, SagaControl, SagaRegistry};
use tracing::{info, warn};

pub const MIN_PASSWORD_LEN: usize = 8;

/// Trims the request and checks every field, reporting all failures at once.
pub fn normalize_registration(mut registration: Registration) -> Result<Registration, AppError> {
  let mut errors = FieldErrors::new();

  registration.email = registration.email.trim().to_string();
  errors.check(is_valid_email(&registration.email), "email", "Invalid email format");
  errors.check(
    registration.password.chars().count() >= MIN_PASSWORD_LEN,
    "password",
    "Password must be at least 8 characters",
  );

  match non_blank(&registration.first_name) {
    Some(name) => registration.first_name = name,
    None => errors.add("first_name", "First name is required"),
  }
  match non_blank(&registration.last_name) {
    Some(name) => registration.last_name = name,
    None => errors.add("last_name", "Last name is required"),
  }

  registration.phone = registration.phone.as_deref().and_then(non_blank);
  registration.street = registration.street.as_deref().and_then(non_blank);
  registration.city = registration.city.as_deref().and_then(non_blank);
  registration.postal_code = registration.postal_code.as_deref().and_then(non_blank);
  if let Some(postal_code) = &registration.postal_code {
    errors.check(is_postal_code(postal_code), "postal_code", "Postal code must be 5 digits");
  }

  errors.into_result()?;
  Ok(registration)
}

pub fn register_signup_saga(registry: &SagaRegistry<AppError>) {
  let mut saga = Saga::<SignupCtxData, AppError>::new(
    "signup",
    &[
      ("validate_registration", false, None),
      ("create_identity", false, None),
      ("insert_profile", false, None),
      ("send_welcome_email", true, None),
    ],
  );

  saga.on("validate_registration", |ctx_data: ContextData<SignupCtxData>| {
    Box::pin(async move {
      let (registration, store) = {
        let guard = ctx_data.read();
        (guard.registration.clone(), guard.app_state.store.clone())
      };

      let registration = normalize_registration(registration)?;
      if store.find_user_by_email(&registration.email).await?.is_some() {
        warn!("Sign-up attempted with an already registered email.");
        return Err(AppError::Conflict("Email already registered".to_string()));
      }

      ctx_data.write().registration = registration;
      Ok::<_, AppError>(SagaControl::Continue)
    })
  });

  saga.on("create_identity", |ctx_data: ContextData<SignupCtxData>| {
    Box::pin(async move {
      let (email, password, identity) = {
        let guard = ctx_data.read();
        (
          guard.registration.email.clone(),
          guard.registration.password.clone(),
          guard.app_state.identity.clone(),
        )
      };

      let identity_id = identity.sign_up(&email, &password).await?;
      ctx_data.write().identity_id = Some(identity_id);
      info!(%identity_id, "Identity created.");
      Ok::<_, AppError>(SagaControl::Continue)
    })
  });

  saga.compensate("create_identity", |ctx_data: ContextData<SignupCtxData>| {
    Box::pin(async move {
      let (identity_id, identity) = {
        let guard = ctx_data.read();
        (guard.identity_id, guard.app_state.identity.clone())
      };
      if let Some(identity_id) = identity_id {
        identity.delete_identity(identity_id).await?;
        warn!(%identity_id, "Identity removed after a failed sign-up.");
      }
      Ok::<_, AppError>(())
    })
  });

  saga.on("insert_profile", |ctx_data: ContextData<SignupCtxData>| {
    Box::pin(async move {
      let (new_user, store) = {
        let guard = ctx_data.read();
        let id = guard
          .identity_id
          .ok_or_else(|| AppError::Internal("Identity id missing before profile insert".to_string()))?;
        let r = &guard.registration;
        (
          NewUser {
            id,
            email: r.email.clone(),
            first_name: r.first_name.clone(),
            last_name: r.last_name.clone(),
            phone: r.phone.clone(),
            street: r.street.clone(),
            postal_code: r.postal_code.clone(),
            city: r.city.clone(),
            role: Role::Client,
          },
          guard.app_state.store.clone(),
        )
      };

      let user = store.insert_user(&new_user).await?;
      ctx_data.write().user = Some(user);
      Ok::<_, AppError>(SagaControl::Continue)
    })
  });

  saga.on("send_welcome_email", |ctx_data: ContextData<SignupCtxData>| {
    Box::pin(async move {
      let (email, first_name, mailer) = {
        let guard = ctx_data.read();
        (
          guard.registration.email.clone(),
          guard.registration.first_name.clone(),
          guard.app_state.mailer.clone(),
        )
      };

      let outcome = mailer
        .send(OutgoingEmail {
          to: email,
          subject: "Welcome to the marketplace".to_string(),
          body: format!("Hello {}, your account is ready.", first_name),
        })
        .await;
      match outcome {
        Ok(_) => ctx_data.write().welcome_email_sent = true,
        // Mail failure leaves the account in place.
        Err(e) => warn!(error = %e, "Welcome email could not be sent."),
      }
      Ok::<_, AppError>(SagaControl::Continue)
    })
  });

  registry.register(saga);
}

#[cfg(test)]
mod tests {
  use super::*;

  fn registration() -> Registration {
    Registration {
      email: "  ana@example.com ".into(),
      password: "long-enough".into(),
      first_name: " Ana ".into(),
      last_name: "Lopez".into(),
      phone: Some("  ".into()),
      street: None,
      postal_code: Some("75011".into()),
      city: None,
    }
  }

  #[test]
  fn normalization_trims_fields() {
    let r = normalize_registration(registration()).unwrap();
    assert_eq!(r.email, "ana@example.com");
    assert_eq!(r.first_name, "Ana");
    assert_eq!(r.phone, None);
  }

  #[test]
  fn every_bad_field_is_reported() {
    let mut r = registration();
    r.email = "nope".into();
    r.password = "short".into();
    r.last_name = " ".into();
    r.postal_code = Some("123".into());
    match normalize_registration(r) {
      Err(AppError::Validation { fields, .. }) => {
        let names: Vec<&str> = fields.iter().map(|f| f.field.as_str()).collect();
        assert_eq!(names, ["email", "password", "last_name", "postal_code"]);
      }
      other => panic!("expected validation error, got {:?}", other.map(|r| r.email)),
    }
  }
}
