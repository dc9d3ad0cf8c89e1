// tests/compensation_tests.rs
mod common;

use common::*;
use souk_flow::{ContextData, Saga};
use serial_test::serial;
use std::sync::Arc;

fn three_step_saga() -> Saga<TestContext, TestError> {
  let mut saga = Saga::<TestContext, TestError>::new(
    "three_steps",
    &[("reserve", false, None), ("charge", false, None), ("ship", false, None)],
  );
  saga.on("reserve", create_simple_handler("reserve", "R"));
  saga.compensate("reserve", create_compensation("reserve"));
  saga.on("charge", create_simple_handler("charge", "C"));
  saga.compensate("charge", create_compensation("charge"));
  saga
}

#[tokio::test]
#[serial]
async fn test_failure_compensates_completed_steps_in_reverse() {
  setup_tracing();
  let mut saga = three_step_saga();
  saga.on("ship", create_failing_handler("ship", "carrier down"));
  saga.compensate("ship", create_compensation("ship"));

  let ctx = ContextData::new(TestContext::default());
  let err = saga.run(ctx.clone()).await.unwrap_err();

  assert_eq!(err, TestError::Handler("carrier down".to_string()));
  let guard = ctx.read();
  assert_eq!(guard.compensated, vec!["charge", "reserve"], "the failing step is not compensated");
  assert_eq!(guard.counter, 0);
}

#[tokio::test]
#[serial]
async fn test_failure_in_after_phase_compensates_its_own_step() {
  setup_tracing();
  let mut saga = three_step_saga();
  saga.on("ship", create_simple_handler("ship", "S"));
  saga.after("ship", create_failing_handler("ship_audit", "audit failed"));
  saga.compensate("ship", create_compensation("ship"));

  let ctx = ContextData::new(TestContext::default());
  saga.run(ctx.clone()).await.unwrap_err();

  assert_eq!(ctx.read().compensated, vec!["ship", "charge", "reserve"]);
}

#[tokio::test]
#[serial]
async fn test_skipped_steps_are_not_compensated() {
  setup_tracing();
  let mut saga = Saga::<TestContext, TestError>::new(
    "skip_then_fail",
    &[
      ("first", false, None),
      ("skipped", false, Some(Arc::new(|_ctx: ContextData<TestContext>| true))),
      ("boom", false, None),
    ],
  );
  saga.on("first", create_simple_handler("first", "1"));
  saga.compensate("first", create_compensation("first"));
  saga.on("skipped", create_simple_handler("skipped", "2"));
  saga.compensate("skipped", create_compensation("skipped"));
  saga.on("boom", create_failing_handler("boom", "nope"));

  let ctx = ContextData::new(TestContext::default());
  saga.run(ctx.clone()).await.unwrap_err();

  assert_eq!(ctx.read().compensated, vec!["first"]);
}

#[tokio::test]
#[serial]
async fn test_failing_compensation_does_not_halt_rollback_or_mask_error() {
  setup_tracing();
  let mut saga = Saga::<TestContext, TestError>::new(
    "flaky_rollback",
    &[("a", false, None), ("b", false, None), ("c", false, None)],
  );
  saga.on("a", create_simple_handler("a", "a"));
  saga.compensate("a", create_compensation("a"));
  saga.on("b", create_simple_handler("b", "b"));
  saga.compensate("b", create_failing_compensation("b"));
  saga.on("c", create_failing_handler("c", "original"));

  let ctx = ContextData::new(TestContext::default());
  let err = saga.run(ctx.clone()).await.unwrap_err();

  assert_eq!(err, TestError::Handler("original".to_string()));
  assert_eq!(ctx.read().compensated, vec!["b!", "a"]);
}

#[tokio::test]
#[serial]
async fn test_multiple_compensations_on_one_step_run_in_reverse_registration_order() {
  setup_tracing();
  let mut saga = Saga::<TestContext, TestError>::new("multi", &[("a", false, None), ("b", false, None)]);
  saga.on("a", create_simple_handler("a", "a"));
  saga.compensate("a", create_compensation("a1"));
  saga.compensate("a", create_compensation("a2"));
  saga.on("b", create_failing_handler("b", "x"));

  let ctx = ContextData::new(TestContext::default());
  saga.run(ctx.clone()).await.unwrap_err();

  assert_eq!(ctx.read().compensated, vec!["a2", "a1"]);
}
