//! Unit tests for the step runner.

use std::sync::{Arc, Mutex, PoisonError};

use rstest::{fixture, rstest};

use super::*;
use crate::cancel::CancelFlag;
use crate::remote::RemoteError;
use crate::test_support::{
    FakeCompute, ManualClock, ScriptedConnector, example_request, example_request_builder,
    fake_services,
};

type Journal = Arc<Mutex<Vec<String>>>;

fn entries(journal: &Journal) -> Vec<String> {
    journal
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .clone()
}

fn note(journal: &Journal, entry: String) {
    journal
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .push(entry);
}

#[derive(Clone, Copy, Debug)]
enum Behaviour {
    Continue,
    HaltWithError,
    HaltSilently,
    CancelThenContinue,
}

struct RecordingStep {
    name: &'static str,
    behaviour: Behaviour,
    cleanup_fails: bool,
    journal: Journal,
}

impl RecordingStep {
    fn boxed(name: &'static str, behaviour: Behaviour, journal: &Journal) -> Box<dyn Step> {
        Box::new(Self {
            name,
            behaviour,
            cleanup_fails: false,
            journal: Arc::clone(journal),
        })
    }

    fn failing_cleanup(name: &'static str, journal: &Journal) -> Box<dyn Step> {
        Box::new(Self {
            name,
            behaviour: Behaviour::Continue,
            cleanup_fails: true,
            journal: Arc::clone(journal),
        })
    }
}

impl Step for RecordingStep {
    fn name(&self) -> &'static str {
        self.name
    }

    fn run<'a>(&'a mut self, state: &'a mut BuildState) -> StepFuture<'a, StepAction> {
        Box::pin(async move {
            note(&self.journal, format!("run {}", self.name));
            match self.behaviour {
                Behaviour::Continue => StepAction::Continue,
                Behaviour::HaltWithError => state.halt(BuildError::remote(
                    self.name,
                    RemoteError::Io {
                        message: String::from("boom"),
                    },
                )),
                Behaviour::HaltSilently => StepAction::Halt,
                Behaviour::CancelThenContinue => {
                    state.cancel.cancel();
                    StepAction::Continue
                }
            }
        })
    }

    fn cleanup<'a>(
        &'a mut self,
        _state: &'a mut BuildState,
    ) -> StepFuture<'a, Result<(), BuildError>> {
        Box::pin(async move {
            note(&self.journal, format!("cleanup {}", self.name));
            if self.cleanup_fails {
                return Err(BuildError::remote(
                    "cleanup",
                    RemoteError::Io {
                        message: String::from("still busy"),
                    },
                ));
            }
            Ok(())
        })
    }
}

struct RecordingPause {
    journal: Journal,
}

impl PauseHook for RecordingPause {
    fn pause<'a>(&'a self, step: &'a str) -> StepFuture<'a, ()> {
        Box::pin(async move {
            note(&self.journal, format!("pause {step}"));
        })
    }
}

#[fixture]
fn journal() -> Journal {
    Arc::default()
}

#[fixture]
fn state() -> BuildState {
    let services = fake_services(
        &FakeCompute::with_defaults(),
        &ManualClock::new(),
        &ScriptedConnector::new(),
    );
    BuildState::new(example_request(), services, CancelFlag::new())
}

#[rstest]
#[tokio::test]
async fn all_continue_runs_every_step_without_cleanup(journal: Journal, mut state: BuildState) {
    let mut runner = Runner::new(vec![
        RecordingStep::boxed("one", Behaviour::Continue, &journal),
        RecordingStep::boxed("two", Behaviour::Continue, &journal),
        RecordingStep::boxed("three", Behaviour::Continue, &journal),
    ]);

    runner
        .run(&mut state)
        .await
        .unwrap_or_else(|err| panic!("run should succeed: {err}"));

    assert_eq!(entries(&journal), ["run one", "run two", "run three"]);
    assert!(state.cleanup_failures().is_empty());
}

#[rstest]
#[tokio::test]
async fn halt_cleans_completed_steps_in_reverse(journal: Journal, mut state: BuildState) {
    let mut runner = Runner::new(vec![
        RecordingStep::boxed("one", Behaviour::Continue, &journal),
        RecordingStep::boxed("two", Behaviour::Continue, &journal),
        RecordingStep::boxed("three", Behaviour::HaltWithError, &journal),
        RecordingStep::boxed("four", Behaviour::Continue, &journal),
    ]);

    let err = runner
        .run(&mut state)
        .await
        .err()
        .unwrap_or_else(|| panic!("run should fail"));

    assert!(err.to_string().contains("boom"), "unexpected error: {err}");
    assert_eq!(
        entries(&journal),
        ["run one", "run two", "run three", "cleanup two", "cleanup one"]
    );
}

#[rstest]
#[tokio::test]
async fn cleanup_failure_does_not_stop_unwinding(journal: Journal, mut state: BuildState) {
    let mut runner = Runner::new(vec![
        RecordingStep::boxed("one", Behaviour::Continue, &journal),
        RecordingStep::failing_cleanup("two", &journal),
        RecordingStep::boxed("three", Behaviour::HaltWithError, &journal),
    ]);

    let err = runner
        .run(&mut state)
        .await
        .err()
        .unwrap_or_else(|| panic!("run should fail"));

    assert!(matches!(err, BuildError::Remote { .. }), "unexpected error: {err}");
    assert_eq!(
        entries(&journal),
        ["run one", "run two", "run three", "cleanup two", "cleanup one"]
    );
    let failures = state.cleanup_failures();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures.first().map(|failure| failure.step), Some("two"));
}

#[rstest]
#[tokio::test]
async fn silent_halt_is_reported(journal: Journal, mut state: BuildState) {
    let mut runner = Runner::new(vec![
        RecordingStep::boxed("one", Behaviour::Continue, &journal),
        RecordingStep::boxed("quiet", Behaviour::HaltSilently, &journal),
    ]);

    let err = runner
        .run(&mut state)
        .await
        .err()
        .unwrap_or_else(|| panic!("run should fail"));

    assert!(matches!(err, BuildError::HaltWithoutError { step: "quiet" }));
    assert_eq!(entries(&journal), ["run one", "run quiet", "cleanup one"]);
}

#[rstest]
#[tokio::test]
async fn cancellation_is_observed_at_the_next_boundary(journal: Journal, mut state: BuildState) {
    let mut runner = Runner::new(vec![
        RecordingStep::boxed("one", Behaviour::Continue, &journal),
        RecordingStep::boxed("two", Behaviour::CancelThenContinue, &journal),
        RecordingStep::boxed("three", Behaviour::Continue, &journal),
    ]);

    let err = runner
        .run(&mut state)
        .await
        .err()
        .unwrap_or_else(|| panic!("run should be cancelled"));

    assert!(matches!(err, BuildError::Cancelled));
    assert_eq!(
        entries(&journal),
        ["run one", "run two", "cleanup two", "cleanup one"]
    );
}

#[rstest]
#[tokio::test]
async fn pause_hook_runs_after_each_continued_step(journal: Journal, mut state: BuildState) {
    let mut runner = Runner::new(vec![
        RecordingStep::boxed("one", Behaviour::Continue, &journal),
        RecordingStep::boxed("two", Behaviour::HaltWithError, &journal),
    ])
    .with_pause(Box::new(RecordingPause {
        journal: Arc::clone(&journal),
    }));

    let outcome = runner.run(&mut state).await;

    assert!(outcome.is_err());
    assert_eq!(
        entries(&journal),
        ["run one", "pause one", "run two", "cleanup one"]
    );
}

#[rstest]
#[case(false, &["create-credentials", "create-instance", "await-instance-ready", "connect", "provision", "capture-image", "teardown-instance"])]
#[case(true, &["create-credentials", "create-instance", "await-instance-ready", "connect", "provision", "refresh-gsutil", "capture-image", "teardown-instance"])]
fn default_steps_follow_the_build_order(#[case] update_gsutil: bool, #[case] expected: &[&str]) {
    let request = example_request_builder()
        .update_gsutil(update_gsutil)
        .build()
        .unwrap_or_else(|err| panic!("request should be valid: {err}"));
    let runner = Runner::new(steps::default_steps(&request));

    assert_eq!(runner.step_names(), expected);
}
