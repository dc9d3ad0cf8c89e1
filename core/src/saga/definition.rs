// core/src/saga/definition.rs

//! The `Saga<TData, Err>` struct and its construction.

use crate::core::handler::{Compensation, Handler};
use crate::core::step::{SkipCondition, StepDef};
use crate::error::FlowError;
use std::collections::HashMap;

/// An ordered list of named steps over `ContextData<TData>`, with handlers
/// failing as `Err`.
///
/// `Err` must be `From<FlowError>` so that configuration problems found at
/// run time (a required step without handlers) surface in the caller's error
/// type.
pub struct Saga<TData, Err>
where
  TData: 'static + Send + Sync,
  Err: std::error::Error + From<FlowError> + Send + Sync + 'static,
{
  pub(crate) name: String,
  pub(crate) steps: Vec<StepDef<TData>>,

  pub(crate) before: HashMap<String, Vec<Handler<TData, Err>>>,
  pub(crate) on: HashMap<String, Vec<Handler<TData, Err>>>,
  pub(crate) after: HashMap<String, Vec<Handler<TData, Err>>>,
  pub(crate) compensations: HashMap<String, Vec<Compensation<TData, Err>>>,
}

impl<TData, Err> Saga<TData, Err>
where
  TData: 'static + Send + Sync,
  Err: std::error::Error + From<FlowError> + Send + Sync + 'static,
{
  /// Builds a saga from `(step_name, optional, skip_if)` tuples.
  ///
  /// # Panics
  ///
  /// Panics if two steps share a name. That is a setup mistake, not a
  /// runtime condition.
  pub fn new(name: &str, step_defs: &[(&str, bool, Option<SkipCondition<TData>>)]) -> Self {
    let mut steps: Vec<StepDef<TData>> = Vec::with_capacity(step_defs.len());
    for (step_name, optional, skip_if) in step_defs {
      if steps.iter().any(|s| s.name == *step_name) {
        panic!("saga '{}': step '{}' is declared twice", name, step_name);
      }
      steps.push(StepDef {
        name: (*step_name).to_string(),
        optional: *optional,
        skip_if: skip_if.clone(),
      });
    }

    Self {
      name: name.to_string(),
      steps,
      before: HashMap::new(),
      on: HashMap::new(),
      after: HashMap::new(),
      compensations: HashMap::new(),
    }
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  /// Step names in execution order.
  pub fn step_names(&self) -> Vec<&str> {
    self.steps.iter().map(|s| s.name.as_str()).collect()
  }

  pub(crate) fn ensure_step_exists(&self, step_name: &str) {
    if !self.steps.iter().any(|s| s.name == step_name) {
      panic!("saga '{}': step '{}' is not defined", self.name, step_name);
    }
  }
}
