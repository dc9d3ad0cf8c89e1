// core/src/saga/execution.rs

//! `Saga::run()`: step execution and rollback.

use crate::core::context_data::ContextData;
use crate::core::control::{SagaControl, SagaOutcome};
use crate::core::handler::Handler;
use crate::core::step::StepDef;
use crate::error::FlowError;
use crate::saga::definition::Saga;
use std::collections::HashMap;
use tracing::{event, instrument, span, Instrument, Level};

#[derive(Debug, Clone, Copy)]
enum Phase {
  Before,
  On,
  After,
}

impl Phase {
  fn as_str(self) -> &'static str {
    match self {
      Phase::Before => "before",
      Phase::On => "on",
      Phase::After => "after",
    }
  }
}

impl<TData, Err> Saga<TData, Err>
where
  TData: 'static + Send + Sync,
  Err: std::error::Error + From<FlowError> + Send + Sync + 'static,
{
  /// Executes the saga against `ctx_data`.
  ///
  /// On error, every completed step is compensated in reverse order and the
  /// error that caused the rollback is returned. Failing compensations are
  /// logged and do not replace that error.
  #[instrument(
    name = "Saga::run",
    skip_all,
    fields(
      saga = %self.name,
      context_data_type = %std::any::type_name::<TData>(),
      num_steps = self.steps.len(),
    ),
    err(Display)
  )]
  pub async fn run(&self, ctx_data: ContextData<TData>) -> Result<SagaOutcome, Err> {
    event!(Level::DEBUG, "Saga execution starting.");
    let mut completed: Vec<&str> = Vec::new();

    for (step_idx, step_def) in self.steps.iter().enumerate() {
      let step_span = span!(
        Level::INFO,
        "saga_step",
        step_name = step_def.name.as_str(),
        step_index = step_idx,
        optional = step_def.optional
      );

      match self
        .run_step(step_def, &ctx_data, &mut completed)
        .instrument(step_span)
        .await
      {
        Ok(SagaControl::Continue) => {}
        Ok(SagaControl::Stop) => {
          event!(Level::INFO, step_name = %step_def.name, "Saga stopped.");
          return Ok(SagaOutcome::Stopped);
        }
        Err(e) => {
          self.compensate_completed(&completed, &ctx_data).await;
          return Err(e);
        }
      }
    }

    event!(Level::DEBUG, "Saga execution completed.");
    Ok(SagaOutcome::Completed)
  }

  async fn run_step<'a>(
    &'a self,
    step_def: &'a StepDef<TData>,
    ctx_data: &ContextData<TData>,
    completed: &mut Vec<&'a str>,
  ) -> Result<SagaControl, Err> {
    let step_name = step_def.name.as_str();

    if let Some(skip_cond_fn) = &step_def.skip_if {
      if skip_cond_fn(ctx_data.clone()) {
        event!(Level::INFO, "Step skipped by its 'skip_if' condition.");
        return Ok(SagaControl::Continue);
      }
    }

    let has_any = [&self.before, &self.on, &self.after]
      .iter()
      .any(|phase| phase.get(step_name).is_some_and(|v| !v.is_empty()));
    if !has_any {
      if step_def.optional {
        event!(Level::DEBUG, "Optional step has no handlers, skipping.");
        return Ok(SagaControl::Continue);
      }
      event!(Level::ERROR, "Required step has no handlers.");
      return Err(Err::from(FlowError::HandlerMissing {
        step_name: step_def.name.clone(),
      }));
    }

    if let SagaControl::Stop = Self::run_phase(Phase::Before, &self.before, step_name, ctx_data).await? {
      return Ok(SagaControl::Stop);
    }
    let on_control = Self::run_phase(Phase::On, &self.on, step_name, ctx_data).await?;
    completed.push(step_name);
    if let SagaControl::Stop = on_control {
      return Ok(SagaControl::Stop);
    }
    Self::run_phase(Phase::After, &self.after, step_name, ctx_data).await
  }

  async fn run_phase(
    phase: Phase,
    handlers: &HashMap<String, Vec<Handler<TData, Err>>>,
    step_name: &str,
    ctx_data: &ContextData<TData>,
  ) -> Result<SagaControl, Err> {
    let Some(handlers) = handlers.get(step_name) else {
      return Ok(SagaControl::Continue);
    };

    for (handler_idx, handler_fn) in handlers.iter().enumerate() {
      let handler_span = span!(Level::DEBUG, "saga_handler", phase = phase.as_str(), handler_index = handler_idx);
      match handler_fn(ctx_data.clone()).instrument(handler_span).await {
        Ok(SagaControl::Continue) => {}
        Ok(SagaControl::Stop) => {
          event!(Level::INFO, phase = phase.as_str(), "Handler requested stop.");
          return Ok(SagaControl::Stop);
        }
        Err(e) => {
          event!(Level::ERROR, phase = phase.as_str(), error = %e, "Handler failed.");
          return Err(e);
        }
      }
    }
    Ok(SagaControl::Continue)
  }

  async fn compensate_completed(&self, completed: &[&str], ctx_data: &ContextData<TData>) {
    if completed.is_empty() {
      return;
    }
    event!(Level::WARN, steps = completed.len(), "Rolling back completed steps.");

    for step_name in completed.iter().rev() {
      let Some(compensations) = self.compensations.get(*step_name) else {
        continue;
      };
      for compensation_fn in compensations.iter().rev() {
        let span = span!(Level::INFO, "saga_compensation", step_name = *step_name);
        match compensation_fn(ctx_data.clone()).instrument(span).await {
          Ok(()) => event!(Level::DEBUG, step_name = *step_name, "Compensation applied."),
          Err(e) => event!(
            Level::ERROR,
            step_name = *step_name,
            error = %e,
            "Compensation failed, continuing rollback."
          ),
        }
      }
    }
  }
}
