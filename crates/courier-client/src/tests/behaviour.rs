//! Behaviour-driven tests for job dispatch.

use std::cell::RefCell;
use std::sync::Arc;
use std::time::Duration;

use courier_config::Config;
use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};
use serde_json::json;
use tokio::runtime::Runtime;

use super::support::{ScriptedBroker, Step};
use crate::dispatch::{DispatchClient, DispatchError};
use crate::envelope::JobId;
use crate::options::JobOptions;
use crate::protocol::{BrokerCommand, RejectReason};
use crate::transport::TransportError;

// ---------------------------------------------------------------------------
// Test world
// ---------------------------------------------------------------------------

struct TestWorld {
    runtime: Runtime,
    config: Config,
    broker: ScriptedBroker,
    outcome: Option<Result<JobId, DispatchError>>,
}

#[fixture]
fn world() -> RefCell<TestWorld> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .start_paused(true)
        .build()
        .expect("test runtime");
    RefCell::new(TestWorld {
        runtime,
        config: Config::default(),
        broker: ScriptedBroker::new(),
        outcome: None,
    })
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn parse_reason(reason: &str) -> RejectReason {
    serde_json::from_value(json!(reason.trim_matches('"'))).expect("reject reason")
}

fn dispatch(world: &RefCell<TestWorld>, job_type: &str, options: &JobOptions, timeout: Duration) {
    let mut w = world.borrow_mut();
    let client = DispatchClient::new(Arc::new(w.broker.clone()), &w.config);
    let name = job_type.trim_matches('"');
    let outcome = w.runtime.block_on(client.dispatch_with_timeout(
        name,
        &json!({"task": name, "to": "x@example.com"}),
        Some(options),
        timeout,
    ));
    w.outcome = Some(outcome);
}

fn failure(world: &RefCell<TestWorld>) -> std::cell::Ref<'_, DispatchError> {
    std::cell::Ref::map(world.borrow(), |w| {
        w.outcome
            .as_ref()
            .expect("no dispatch attempted")
            .as_ref()
            .expect_err("expected the dispatch to fail")
    })
}

// ---------------------------------------------------------------------------
// Given steps
// ---------------------------------------------------------------------------

#[given("a client allowed {attempts} attempts")]
fn given_attempts(world: &RefCell<TestWorld>, attempts: u32) {
    world.borrow_mut().config.max_attempts = attempts;
}

#[given("a client that retries saturated pipelines")]
fn given_retry_saturated(world: &RefCell<TestWorld>) {
    world.borrow_mut().config.retry_saturated = true;
}

#[given("a broker that accepts the next job as {job_id}")]
fn given_accepting_broker(world: &RefCell<TestWorld>, job_id: String) {
    world
        .borrow()
        .broker
        .push(Step::accept(job_id.trim_matches('"')));
}

#[given("a broker that rejects the next job with {reason}")]
fn given_rejecting_broker(world: &RefCell<TestWorld>, reason: String) {
    world
        .borrow()
        .broker
        .push(Step::reject(parse_reason(&reason), "refused by broker"));
}

#[given("a broker that resets the next {count} connections")]
fn given_resetting_broker(world: &RefCell<TestWorld>, count: usize) {
    let w = world.borrow();
    for _ in 0..count {
        w.broker.push(Step::reset());
    }
}

#[given("a broker that never answers")]
fn given_silent_broker(world: &RefCell<TestWorld>) {
    world.borrow().broker.push(Step::Hang);
}

// ---------------------------------------------------------------------------
// When steps
// ---------------------------------------------------------------------------

#[when("a {job_type} job is dispatched")]
fn when_dispatched(world: &RefCell<TestWorld>, job_type: String) {
    let timeout = world.borrow().config.dispatch_timeout();
    dispatch(world, &job_type, &JobOptions::new(), timeout);
}

#[when("a {job_type} job is dispatched with a {delay} second delay")]
fn when_dispatched_delayed(world: &RefCell<TestWorld>, job_type: String, delay: u64) {
    let timeout = world.borrow().config.dispatch_timeout();
    dispatch(world, &job_type, &JobOptions::delayed(delay), timeout);
}

#[when("a {job_type} job is dispatched to pipeline {pipeline}")]
fn when_dispatched_to_pipeline(world: &RefCell<TestWorld>, job_type: String, pipeline: String) {
    let timeout = world.borrow().config.dispatch_timeout();
    let options = JobOptions::new().with_pipeline(Some(pipeline.trim_matches('"')));
    dispatch(world, &job_type, &options, timeout);
}

#[when("a {job_type} job is dispatched with a {seconds} second timeout")]
fn when_dispatched_with_timeout(world: &RefCell<TestWorld>, job_type: String, seconds: u64) {
    dispatch(
        world,
        &job_type,
        &JobOptions::new(),
        Duration::from_secs(seconds),
    );
}

// ---------------------------------------------------------------------------
// Then steps
// ---------------------------------------------------------------------------

#[then("the job is acknowledged as {job_id}")]
fn then_acknowledged(world: &RefCell<TestWorld>, job_id: String) {
    let w = world.borrow();
    let outcome = w.outcome.as_ref().expect("no dispatch attempted");
    match outcome {
        Ok(id) => assert_eq!(id, &JobId::from(job_id.trim_matches('"'))),
        Err(error) => panic!("expected an acknowledgement, got {error}"),
    }
}

#[then("the broker received options with delay {delay} and no pipeline")]
fn then_wire_options(world: &RefCell<TestWorld>, delay: u64) {
    let frames = world.borrow().broker.frames();
    let Some(BrokerCommand::Push { envelope }) = frames.last().map(|frame| &frame.command) else {
        panic!("expected a push frame, got {frames:?}");
    };
    assert_eq!(
        envelope.options().to_wire_format(),
        json!({"delay": delay, "pipeline": null})
    );
}

#[then("the dispatch fails as rejected with {reason}")]
fn then_rejected(world: &RefCell<TestWorld>, reason: String) {
    let expected = parse_reason(&reason);
    let error = failure(world);
    assert!(
        matches!(&*error, DispatchError::Rejected { reason, .. } if *reason == expected),
        "expected a {expected} rejection, got {error}"
    );
}

#[then("the dispatch fails with a transport error after {attempts} attempts")]
fn then_transport_failure(world: &RefCell<TestWorld>, attempts: u32) {
    let error = failure(world);
    assert!(
        matches!(
            &*error,
            DispatchError::Transport { attempts: made, source: TransportError::Io(_), .. }
                if *made == attempts
        ),
        "expected a transport failure after {attempts} attempts, got {error}"
    );
}

#[then("the dispatch times out with an unknown outcome")]
fn then_timed_out(world: &RefCell<TestWorld>) {
    let error = failure(world);
    assert!(matches!(&*error, DispatchError::Timeout { .. }), "got {error}");
    assert!(error.outcome_unknown());
}

#[then("the broker received {count} frame(s)")]
fn then_frame_count(world: &RefCell<TestWorld>, count: usize) {
    assert_eq!(world.borrow().broker.frames().len(), count);
}

#[then("every frame carried the same request id")]
fn then_same_request_id(world: &RefCell<TestWorld>) {
    let ids = world.borrow().broker.request_ids();
    assert!(
        ids.windows(2).all(|pair| pair.first() == pair.last()),
        "request ids differ across retries: {ids:?}"
    );
}

// ---------------------------------------------------------------------------
// Scenario bindings
// ---------------------------------------------------------------------------

#[scenario(
    path = "tests/features/job_dispatch.feature",
    name = "A delayed job is acknowledged"
)]
fn delayed_job_acknowledged(world: RefCell<TestWorld>) {
    let _ = world;
}

#[scenario(
    path = "tests/features/job_dispatch.feature",
    name = "An unknown pipeline is rejected without retries"
)]
fn unknown_pipeline_rejected(world: RefCell<TestWorld>) {
    let _ = world;
}

#[scenario(
    path = "tests/features/job_dispatch.feature",
    name = "A full queue is surfaced when saturation retries are off"
)]
fn saturation_surfaced(world: RefCell<TestWorld>) {
    let _ = world;
}

#[scenario(
    path = "tests/features/job_dispatch.feature",
    name = "A full queue is retried when saturation retries are on"
)]
fn saturation_retried(world: RefCell<TestWorld>) {
    let _ = world;
}

#[scenario(
    path = "tests/features/job_dispatch.feature",
    name = "Connection resets are retried until the budget runs out"
)]
fn resets_exhaust_budget(world: RefCell<TestWorld>) {
    let _ = world;
}

#[scenario(
    path = "tests/features/job_dispatch.feature",
    name = "A silent broker times out with an unknown outcome"
)]
fn silent_broker_times_out(world: RefCell<TestWorld>) {
    let _ = world;
}
