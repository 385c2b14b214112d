//! Behavioural coverage for instance reconciliation against a fake appliance.

#[path = "common/fake_backend.rs"]
mod fake_backend;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use fake_backend::FakeBackend;
use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};
use serde_json::{Map, json};
use tokio::runtime::Runtime;
use truevirt::{
    DesiredState, InstanceOutcome, InstanceParams, InstanceSpec, Reconciler, RunMode, VirtClient,
    VirtError,
};

#[derive(Debug, Default)]
struct Scenario {
    autostart: bool,
    result: Option<Result<InstanceOutcome, VirtError>>,
}

#[derive(Clone, Debug)]
struct ReconcileContext {
    backend: FakeBackend,
    scenario: Arc<Mutex<Scenario>>,
}

impl ReconcileContext {
    fn scenario(&self) -> MutexGuard<'_, Scenario> {
        self.scenario.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn run(&self, name: &str, state: &str, mode: RunMode) {
        let mut spec = InstanceSpec::new(name);
        if self.scenario().autostart {
            let mut config = Map::new();
            config.insert(String::from("boot.autostart"), json!("true"));
            spec.config = Some(config);
        }
        let params = InstanceParams::new(spec, parse_state(state));
        let reconciler = Reconciler::new(
            VirtClient::new(self.backend.clone()).with_poll_interval(Duration::from_millis(1)),
        );

        let runtime = Runtime::new().unwrap_or_else(|err| panic!("tokio runtime: {err}"));
        let result = runtime.block_on(reconciler.reconcile(&params, mode));
        self.scenario().result = Some(result);
    }

    fn outcome(&self) -> InstanceOutcome {
        match self.scenario().result.clone() {
            Some(Ok(outcome)) => outcome,
            Some(Err(err)) => panic!("expected success, got failure: {err}"),
            None => panic!("reconciliation has not run"),
        }
    }
}

fn parse_state(state: &str) -> DesiredState {
    serde_json::from_value(json!(state))
        .unwrap_or_else(|err| panic!("unknown state {state}: {err}"))
}

#[fixture]
fn reconcile_context() -> ReconcileContext {
    ReconcileContext {
        backend: FakeBackend::new(),
        scenario: Arc::default(),
    }
}

#[given("no instance exists")]
fn no_instance(reconcile_context: &ReconcileContext) {
    assert!(reconcile_context.backend.mutations().is_empty());
}

#[given("an instance \"{name}\" with status \"{status}\"")]
fn existing_instance(reconcile_context: &ReconcileContext, name: String, status: String) {
    reconcile_context.backend.add_instance(&name, &status);
}

#[given("autostart is enabled")]
fn autostart_enabled(reconcile_context: &ReconcileContext) {
    reconcile_context.scenario().autostart = true;
}

#[given("the instance listing fails")]
fn listing_fails(reconcile_context: &ReconcileContext) {
    reconcile_context.backend.fail_listing();
}

#[when("I reconcile \"{name}\" to \"{state}\"")]
fn reconcile(reconcile_context: &ReconcileContext, name: String, state: String) {
    reconcile_context.run(&name, &state, RunMode::Apply);
}

#[when("I check \"{name}\" against \"{state}\"")]
fn check(reconcile_context: &ReconcileContext, name: String, state: String) {
    reconcile_context.run(&name, &state, RunMode::Check);
}

#[then("the result reports a change")]
fn reports_change(reconcile_context: &ReconcileContext) {
    assert!(reconcile_context.outcome().changed);
}

#[then("the result reports no change")]
fn reports_no_change(reconcile_context: &ReconcileContext) {
    assert!(!reconcile_context.outcome().changed);
}

#[then("the backend received \"{calls}\"")]
fn backend_received(reconcile_context: &ReconcileContext, calls: String) {
    let expected: Vec<String> = calls.split(", ").map(str::to_owned).collect();
    assert_eq!(reconcile_context.backend.mutations(), expected);
}

#[then("the backend received no changes")]
fn backend_untouched(reconcile_context: &ReconcileContext) {
    assert_eq!(reconcile_context.backend.mutations(), Vec::<String>::new());
}

#[then("the instance \"{name}\" is \"{status}\"")]
fn instance_status(reconcile_context: &ReconcileContext, name: String, status: String) {
    assert_eq!(reconcile_context.backend.status_of(&name), Some(status.clone()));
    let reported = reconcile_context
        .outcome()
        .instance
        .map(|instance| instance.status.to_string());
    assert_eq!(reported, Some(status));
}

#[then("no instance \"{name}\" remains")]
fn instance_gone(reconcile_context: &ReconcileContext, name: String) {
    assert_eq!(reconcile_context.backend.status_of(&name), None);
    assert_eq!(reconcile_context.outcome().instance, None);
}

#[then("reconciliation fails with \"{message}\"")]
fn fails_with(reconcile_context: &ReconcileContext, message: String) {
    match reconcile_context.scenario().result.clone() {
        Some(Err(err)) => assert!(
            err.to_string().contains(&message),
            "unexpected error: {err}"
        ),
        other => panic!("expected failure, got {other:?}"),
    }
}

#[scenario(
    path = "tests/features/instance.feature",
    name = "Create and start a missing instance with autostart"
)]
fn scenario_create_with_autostart(reconcile_context: ReconcileContext) {
    let _ = reconcile_context;
}

#[scenario(
    path = "tests/features/instance.feature",
    name = "Leave a running instance alone"
)]
fn scenario_converged(reconcile_context: ReconcileContext) {
    let _ = reconcile_context;
}

#[scenario(path = "tests/features/instance.feature", name = "Stop a running instance")]
fn scenario_stop(reconcile_context: ReconcileContext) {
    let _ = reconcile_context;
}

#[scenario(path = "tests/features/instance.feature", name = "Delete an existing instance")]
fn scenario_delete(reconcile_context: ReconcileContext) {
    let _ = reconcile_context;
}

#[scenario(
    path = "tests/features/instance.feature",
    name = "Check mode leaves the backend untouched"
)]
fn scenario_check_mode(reconcile_context: ReconcileContext) {
    let _ = reconcile_context;
}

#[scenario(
    path = "tests/features/instance.feature",
    name = "Refuse to start a missing instance"
)]
fn scenario_missing_instance(reconcile_context: ReconcileContext) {
    let _ = reconcile_context;
}

#[scenario(
    path = "tests/features/instance.feature",
    name = "A failed listing is not read as absence"
)]
fn scenario_failed_listing(reconcile_context: ReconcileContext) {
    let _ = reconcile_context;
}

#[scenario(
    path = "tests/features/instance.feature",
    name = "Creating twice changes nothing the second time"
)]
fn scenario_idempotent_create(reconcile_context: ReconcileContext) {
    let _ = reconcile_context;
}
