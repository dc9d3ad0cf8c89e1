// server/src/main.rs

use std::sync::Arc;

use actix_web::{web, App, HttpServer};
use anyhow::Context;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::EnvFilter;

use souk::config::{AppConfig, AuthBackend, LogFormat, PaymentBackend};
use souk::services::identity::{IdentityProvider, LocalIdentity, SupabaseAuth};
use souk::services::mailer::{LogMailer, Mailer};
use souk::services::payments::{MockPaymentGateway, PaymentGateway, StripeGateway};
use souk::state::AppState;
use souk::store::{MemoryStore, PgStore, Store};

fn init_tracing(format: LogFormat) {
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
  let builder = tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_span_events(FmtSpan::CLOSE);
  match format {
    LogFormat::Json => builder.json().init(),
    LogFormat::Text => builder.init(),
  }
}

async fn build_store(config: &AppConfig) -> anyhow::Result<Arc<dyn Store>> {
  match &config.database_url {
    Some(url) => {
      let store = PgStore::connect(url.expose(), config.database_max_connections)
        .await
        .context("connecting to the database")?;
      store.migrate().await.context("running database migrations")?;
      tracing::info!("Connected to the database and applied migrations.");
      Ok(Arc::new(store))
    }
    None => {
      tracing::warn!("DATABASE_URL not set; using the in-memory store. Data is lost on restart.");
      Ok(Arc::new(MemoryStore::new()))
    }
  }
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
  let app_config = AppConfig::from_env().context("loading configuration")?;
  init_tracing(app_config.log_format);

  tracing::info!(
    environment = ?app_config.environment,
    auth_backend = ?app_config.auth_backend,
    payment_backend = ?app_config.payment_backend,
    "Starting marketplace server..."
  );

  let store = build_store(&app_config).await?;
  let mailer: Arc<dyn Mailer> = Arc::new(LogMailer::new(app_config.mock_email_sender.clone()));

  let identity: Arc<dyn IdentityProvider> = match (app_config.auth_backend, &app_config.supabase) {
    (AuthBackend::Supabase, Some(supabase)) => Arc::new(SupabaseAuth::new(supabase)?),
    (AuthBackend::Supabase, None) => anyhow::bail!("AUTH_BACKEND=supabase needs SUPABASE_URL and SUPABASE_ANON_KEY"),
    (AuthBackend::Local, _) => Arc::new(LocalIdentity::new(store.clone(), mailer.clone())),
  };

  let payments: Arc<dyn PaymentGateway> = match (app_config.payment_backend, &app_config.stripe) {
    (PaymentBackend::Stripe, Some(stripe)) => Arc::new(StripeGateway::new(stripe)?),
    (PaymentBackend::Stripe, None) => anyhow::bail!("PAYMENT_BACKEND=stripe needs STRIPE_SECRET_KEY"),
    (PaymentBackend::Mock, _) => {
      tracing::warn!("Using the mock payment gateway; no real charges are made.");
      Arc::new(MockPaymentGateway::new())
    }
  };

  let server_address = format!("{}:{}", app_config.server_host, app_config.server_port);
  let app_state = AppState::new(app_config, store, identity, payments, mailer)?;
  tracing::info!("Sagas registered.");

  tracing::info!("Binding server to {}...", server_address);
  HttpServer::new(move || {
    App::new()
      .app_data(web::Data::new(app_state.clone()))
      .wrap(tracing_actix_web::TracingLogger::default())
      .configure(souk::web::configure_app_routes)
  })
  .bind(&server_address)
  .with_context(|| format!("binding {}", server_address))?
  .run()
  .await?;

  Ok(())
}
