// core/src/registry.rs

//! `SagaRegistry<E>`: sagas keyed by their context data type.

use crate::core::context_data::ContextData;
use crate::core::control::SagaOutcome;
use crate::error::FlowError;
use crate::saga::definition::Saga;

use async_trait::async_trait;
use parking_lot::RwLock;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::{event, instrument, Level};

/// Type-erased runner so that sagas over different `TData` share one map.
#[async_trait]
trait AnySagaRunner<AppErr>: Send + Sync
where
  AppErr: std::error::Error + Send + Sync + 'static,
{
  async fn run_erased(&self, ctx_obj: Box<dyn Any + Send>) -> Result<SagaOutcome, AppErr>;
}

struct SagaWrapper<TData, SagaErr, AppErr>
where
  TData: 'static + Send + Sync,
  SagaErr: std::error::Error + From<FlowError> + Send + Sync + 'static,
{
  saga: Arc<Saga<TData, SagaErr>>,
  _phantom_app_err: PhantomData<fn() -> AppErr>,
}

#[async_trait]
impl<TData, SagaErr, AppErr> AnySagaRunner<AppErr> for SagaWrapper<TData, SagaErr, AppErr>
where
  TData: 'static + Send + Sync,
  SagaErr: std::error::Error + From<FlowError> + Send + Sync + 'static,
  AppErr: std::error::Error + From<SagaErr> + From<FlowError> + Send + Sync + 'static,
{
  #[instrument(
    name = "SagaWrapper::run_erased",
    skip_all,
    fields(target_tdata_type = %std::any::type_name::<TData>()),
    err(Display)
  )]
  async fn run_erased(&self, ctx_obj: Box<dyn Any + Send>) -> Result<SagaOutcome, AppErr> {
    let typed_ctx_data = match ctx_obj.downcast::<ContextData<TData>>() {
      Ok(boxed) => *boxed,
      Err(_) => {
        let expected_type = std::any::type_name::<ContextData<TData>>().to_string();
        event!(Level::ERROR, %expected_type, "Context object type mismatch.");
        return Err(AppErr::from(FlowError::TypeMismatch { expected_type }));
      }
    };
    self.saga.run(typed_ctx_data).await.map_err(AppErr::from)
  }
}

/// Holds one saga per context data type and runs it on demand.
pub struct SagaRegistry<AppErr = FlowError>
where
  AppErr: std::error::Error + From<FlowError> + Send + Sync + 'static,
{
  sagas: RwLock<HashMap<TypeId, Arc<dyn AnySagaRunner<AppErr>>>>,
}

impl<AppErr> SagaRegistry<AppErr>
where
  AppErr: std::error::Error + From<FlowError> + Send + Sync + 'static,
{
  pub fn new() -> Self {
    Self {
      sagas: RwLock::new(HashMap::new()),
    }
  }

  /// Registers `saga` under its context data type, replacing any saga
  /// previously registered for `TData`.
  pub fn register<TData, SagaErr>(&self, saga: Saga<TData, SagaErr>)
  where
    TData: 'static + Send + Sync,
    SagaErr: std::error::Error + From<FlowError> + Send + Sync + 'static,
    AppErr: From<SagaErr>,
  {
    event!(
      Level::DEBUG,
      saga = saga.name(),
      tdata_type = %std::any::type_name::<TData>(),
      "Registering saga."
    );
    let wrapper = SagaWrapper::<TData, SagaErr, AppErr> {
      saga: Arc::new(saga),
      _phantom_app_err: PhantomData,
    };
    self.sagas.write().insert(TypeId::of::<TData>(), Arc::new(wrapper));
  }

  pub fn is_registered<TData: 'static>(&self) -> bool {
    self.sagas.read().contains_key(&TypeId::of::<TData>())
  }

  /// Runs the saga registered for `TData`. The caller keeps its own clone of
  /// `ctx_data` to read results afterwards.
  pub async fn run<TData>(&self, ctx_data: ContextData<TData>) -> Result<SagaOutcome, AppErr>
  where
    TData: 'static + Send + Sync,
  {
    let runner = self.sagas.read().get(&TypeId::of::<TData>()).cloned().ok_or_else(|| {
      let context_type = std::any::type_name::<TData>();
      event!(Level::ERROR, %context_type, "No saga registered.");
      AppErr::from(FlowError::SagaNotRegistered { context_type })
    })?;

    runner.run_erased(Box::new(ctx_data)).await
  }
}

impl<AppErr> Default for SagaRegistry<AppErr>
where
  AppErr: std::error::Error + From<FlowError> + Send + Sync + 'static,
{
  fn default() -> Self {
    Self::new()
  }
}
