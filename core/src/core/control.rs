// core/src/core/control.rs

//! Flow signals returned by handlers and the outcome of a whole run.

/// Returned by a handler to continue with the saga or end it early.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SagaControl {
  Continue,
  /// Halt the run without error. Completed steps are kept as they are;
  /// nothing is compensated.
  Stop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SagaOutcome {
  /// Every step ran (or was skipped).
  Completed,
  /// A handler returned [`SagaControl::Stop`].
  Stopped,
}
