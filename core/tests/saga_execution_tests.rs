// tests/saga_execution_tests.rs
mod common;

use common::*;
use souk_flow::{ContextData, FlowError, Saga, SagaControl, SagaOutcome};
use serial_test::serial;
use std::sync::Arc;

#[tokio::test]
#[serial]
async fn test_saga_runs_steps_in_order() {
  setup_tracing();
  let mut saga = Saga::<TestContext, TestError>::new(
    "ordered",
    &[("step1", false, None), ("step2", false, None), ("step3", false, None)],
  );

  saga.on("step1", create_simple_handler("step1", " S1"));
  saga.on("step2", create_simple_handler("step2", " S2"));
  saga.on("step3", create_simple_handler("step3", " S3"));

  let ctx = ContextData::new(TestContext::default());
  let result = saga.run(ctx.clone()).await;

  assert_eq!(result.unwrap(), SagaOutcome::Completed);
  let guard = ctx.read();
  assert_eq!(guard.counter, 3);
  assert_eq!(guard.message, " S1 S2 S3");
  assert_eq!(guard.steps_executed, vec!["step1", "step2", "step3"]);
  assert_eq!(saga.step_names(), vec!["step1", "step2", "step3"]);
}

#[tokio::test]
#[serial]
async fn test_before_on_after_phases_run_in_order() {
  setup_tracing();
  let mut saga = Saga::<TestContext, TestError>::new("phases", &[("only", false, None)]);

  saga.after("only", create_simple_handler("after", "c"));
  saga.on("only", create_simple_handler("on", "b"));
  saga.before("only", create_simple_handler("before", "a"));

  let ctx = ContextData::new(TestContext::default());
  saga.run(ctx.clone()).await.unwrap();

  assert_eq!(ctx.read().message, "abc");
}

#[tokio::test]
#[serial]
async fn test_saga_stops_on_stop_control() {
  setup_tracing();
  let mut saga = Saga::<TestContext, TestError>::new(
    "stopping",
    &[("stepA", false, None), ("stopStep", false, None), ("stepC", false, None)],
  );

  saga.on("stepA", create_simple_handler("stepA", "A"));
  saga.on("stopStep", |ctx: ContextData<TestContext>| {
    Box::pin(async move {
      ctx.write().steps_executed.push("stopStep".to_string());
      Ok::<SagaControl, FlowError>(SagaControl::Stop)
    })
  });
  saga.compensate("stepA", create_compensation("stepA"));
  saga.on("stepC", create_simple_handler("stepC", "C"));

  let ctx = ContextData::new(TestContext::default());
  let result = saga.run(ctx.clone()).await;

  assert_eq!(result.unwrap(), SagaOutcome::Stopped);
  let guard = ctx.read();
  assert_eq!(guard.message, "A");
  assert_eq!(guard.steps_executed, vec!["stepA", "stopStep"]);
  assert!(guard.compensated.is_empty(), "a stop never compensates");
}

#[tokio::test]
#[serial]
async fn test_saga_skips_step_if_condition_met() {
  setup_tracing();
  let mut saga = Saga::<TestContext, TestError>::new(
    "skipping",
    &[
      ("step1", false, None),
      (
        "step_to_skip",
        false,
        Some(Arc::new(|ctx: ContextData<TestContext>| ctx.read().counter > 0)),
      ),
      ("step3", false, None),
    ],
  );

  saga.on("step1", create_simple_handler("step1", " S1"));
  saga.on("step_to_skip", create_simple_handler("step_to_skip", " SKIPPED"));
  saga.on("step3", create_simple_handler("step3", " S3"));

  let ctx = ContextData::new(TestContext::default());
  assert_eq!(saga.run(ctx.clone()).await.unwrap(), SagaOutcome::Completed);

  let guard = ctx.read();
  assert_eq!(guard.message, " S1 S3");
  assert_eq!(guard.steps_executed, vec!["step1", "step3"]);
}

#[tokio::test]
#[serial]
async fn test_optional_step_without_handlers_is_skipped() {
  setup_tracing();
  let mut saga = Saga::<TestContext, TestError>::new("optional", &[("maybe", true, None), ("step2", false, None)]);
  saga.on("step2", create_simple_handler("step2", "2"));

  let ctx = ContextData::new(TestContext::default());
  assert_eq!(saga.run(ctx.clone()).await.unwrap(), SagaOutcome::Completed);
  assert_eq!(ctx.read().steps_executed, vec!["step2"]);
}

#[tokio::test]
#[serial]
async fn test_required_step_without_handlers_fails() {
  setup_tracing();
  let mut saga = Saga::<TestContext, TestError>::new("missing", &[("step1", false, None), ("empty", false, None)]);
  saga.on("step1", create_simple_handler("step1", "1"));
  saga.compensate("step1", create_compensation("step1"));

  let ctx = ContextData::new(TestContext::default());
  let err = saga.run(ctx.clone()).await.unwrap_err();

  match err {
    TestError::Flow(msg) => assert!(msg.contains("HandlerMissing"), "got {msg}"),
    other => panic!("Expected TestError::Flow, got {other:?}"),
  }
  assert_eq!(ctx.read().compensated, vec!["step1"]);
}

#[test]
#[should_panic(expected = "is not defined")]
fn test_registering_handler_for_unknown_step_panics() {
  let mut saga = Saga::<TestContext, TestError>::new("typo", &[("real", false, None)]);
  saga.on("reel", create_simple_handler("reel", ""));
}

#[test]
#[should_panic(expected = "declared twice")]
fn test_duplicate_step_names_panic() {
  let _ = Saga::<TestContext, TestError>::new("dupes", &[("a", false, None), ("a", true, None)]);
}
