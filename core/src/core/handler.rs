// core/src/core/handler.rs

//! Boxed handler types stored by a [`Saga`](crate::Saga).

use crate::core::context_data::ContextData;
use crate::core::control::SagaControl;
use std::future::Future;
use std::pin::Pin;

/// A step handler: takes a clone of the shared context and resolves to a
/// [`SagaControl`] or the saga's error type.
///
/// Handlers must drop lock guards before awaiting.
pub type Handler<TData, Err> = Box<
  dyn Fn(ContextData<TData>) -> Pin<Box<dyn Future<Output = Result<SagaControl, Err>> + Send>>
    + Send
    + Sync,
>;

/// A compensating action for a completed step. Compensations cannot stop the
/// rollback; a failing compensation is logged and the next one still runs.
pub type Compensation<TData, Err> =
  Box<dyn Fn(ContextData<TData>) -> Pin<Box<dyn Future<Output = Result<(), Err>> + Send>> + Send + Sync>;
