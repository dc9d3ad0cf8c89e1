// core/src/lib.rs

//! souk-flow: an async saga engine.
//!
//! A [`Saga`] is an ordered list of named steps run against a shared
//! [`ContextData<T>`]. Each step may carry:
//!  - `before` / `on` / `after` handlers returning [`SagaControl`],
//!  - an `optional` flag and a `skip_if` predicate,
//!  - `compensate` handlers that undo the step's side effects.
//!
//! When a handler fails, the compensations of every step that already
//! completed run in reverse order, then the original error is returned.
//! A handler returning [`SagaControl::Stop`] ends the run gracefully and no
//! compensation happens.
//!
//! [`SagaRegistry`] keys sagas by their context data type so that an
//! application can register every workflow once at startup and run them by
//! handing over a context.

pub mod core;
pub mod error;
pub mod registry;
pub mod saga;

pub use crate::core::context_data::ContextData;
pub use crate::core::control::{SagaControl, SagaOutcome};
pub use crate::core::handler::{Compensation, Handler};
pub use crate::core::step::{SkipCondition, StepDef};

pub use crate::saga::definition::Saga;

pub use crate::error::{FlowError, FlowResult};

pub use crate::registry::SagaRegistry;
