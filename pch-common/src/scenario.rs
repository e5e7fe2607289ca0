//! Functional scenarios: run the target, count marker lines, compare.

use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::counters::{CounterExtractor, CounterName, Counters, SubstringExtractor};
use crate::runner::{ExitStatus, LaunchError, ProcessRunner, RunResult};

/// One functional invocation and the counters it must produce.
#[derive(Debug, Clone)]
pub struct Scenario {
    pub id: String,
    pub command_line: Vec<String>,
    pub expected_counters: Counters,
    pub timeout: Duration,
}

impl Scenario {
    pub fn new(
        id: impl Into<String>,
        command_line: Vec<String>,
        expected_counters: Counters,
        timeout: Duration,
    ) -> Self {
        Self {
            id: id.into(),
            command_line,
            expected_counters,
            timeout,
        }
    }

    pub fn display_command(&self) -> String {
        self.command_line.join(" ")
    }
}

/// One row of the actual-vs-expected comparison.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CounterCheck {
    pub counter: CounterName,
    pub actual: usize,
    pub expected: usize,
}

impl CounterCheck {
    pub fn ok(&self) -> bool {
        self.actual == self.expected
    }
}

/// Why a functional scenario passed or failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScenarioVerdict {
    Passed,
    CounterMismatch,
    TimedOut,
    Errored { code: i32 },
    Crashed { signal: i32 },
    LaunchFailed { message: String },
}

impl ScenarioVerdict {
    pub fn passed(&self) -> bool {
        matches!(self, Self::Passed)
    }
}

/// Transient result of evaluating one [`Scenario`].
#[derive(Debug, Clone, Serialize)]
pub struct ScenarioOutcome {
    pub scenario_id: String,
    pub command_line: String,
    pub verdict: ScenarioVerdict,
    pub passed: bool,
    /// `None` when the run never reached a clean zero exit.
    pub actual_counters: Option<Counters>,
    pub expected_counters: Counters,
    pub checks: Vec<CounterCheck>,
    pub duration_ms: u64,
}

impl ScenarioOutcome {
    pub fn mismatches(&self) -> impl Iterator<Item = &CounterCheck> {
        self.checks.iter().filter(|check| !check.ok())
    }
}

/// Compare every expected key against the actual counts. Pure.
pub fn compare(expected: &Counters, actual: &Counters) -> Vec<CounterCheck> {
    expected
        .iter()
        .map(|(counter, expected)| CounterCheck {
            counter,
            actual: actual.get(counter),
            expected,
        })
        .collect()
}

/// Turn a finished (or failed-to-launch) run into an outcome. Pure apart
/// from logging: the same input always yields the same verdict.
pub fn judge<E>(
    scenario: &Scenario,
    run: &Result<RunResult, LaunchError>,
    extractor: &E,
) -> ScenarioOutcome
where
    E: CounterExtractor + ?Sized,
{
    let mut outcome = ScenarioOutcome {
        scenario_id: scenario.id.clone(),
        command_line: scenario.display_command(),
        verdict: ScenarioVerdict::Passed,
        passed: false,
        actual_counters: None,
        expected_counters: scenario.expected_counters.clone(),
        checks: Vec::new(),
        duration_ms: 0,
    };

    let result = match run {
        Ok(result) => result,
        Err(e) => {
            outcome.verdict = ScenarioVerdict::LaunchFailed {
                message: e.to_string(),
            };
            return outcome;
        }
    };
    outcome.duration_ms = result.duration.as_millis() as u64;

    match result.status {
        ExitStatus::Exited(0) => {}
        ExitStatus::Exited(code) => {
            outcome.verdict = ScenarioVerdict::Errored { code };
            return outcome;
        }
        ExitStatus::Signaled(signal) => {
            outcome.verdict = ScenarioVerdict::Crashed { signal };
            return outcome;
        }
        ExitStatus::TimedOut => {
            outcome.verdict = ScenarioVerdict::TimedOut;
            return outcome;
        }
    }

    let actual = extractor.extract(&result.stdout);
    let checks = compare(&scenario.expected_counters, &actual);
    let all_ok = checks.iter().all(CounterCheck::ok);

    outcome.verdict = if all_ok {
        ScenarioVerdict::Passed
    } else {
        ScenarioVerdict::CounterMismatch
    };
    outcome.passed = all_ok;
    outcome.actual_counters = Some(actual);
    outcome.checks = checks;
    outcome
}

/// Drives [`ProcessRunner`] and a [`CounterExtractor`] for functional scenarios.
pub struct ScenarioRunner<'a, E: CounterExtractor + ?Sized = SubstringExtractor> {
    runner: &'a ProcessRunner,
    extractor: &'a E,
}

impl<'a, E: CounterExtractor + ?Sized> ScenarioRunner<'a, E> {
    pub fn new(runner: &'a ProcessRunner, extractor: &'a E) -> Self {
        Self { runner, extractor }
    }

    pub async fn evaluate(&self, scenario: &Scenario) -> ScenarioOutcome {
        info!(
            scenario = %scenario.id,
            command = %scenario.display_command(),
            "Running functional scenario"
        );

        let run = self
            .runner
            .run(&scenario.command_line, scenario.timeout)
            .await;
        let outcome = judge(scenario, &run, self.extractor);

        match &outcome.verdict {
            ScenarioVerdict::Passed => {
                debug!(scenario = %scenario.id, "All counters match the expected values");
            }
            ScenarioVerdict::CounterMismatch => {
                for check in &outcome.checks {
                    warn!(
                        scenario = %scenario.id,
                        counter = %check.counter,
                        actual = check.actual,
                        expected = check.expected,
                        status = if check.ok() { "ok" } else { "error" },
                        "Counter comparison"
                    );
                }
            }
            ScenarioVerdict::TimedOut => {
                warn!(
                    scenario = %scenario.id,
                    timeout_ms = scenario.timeout.as_millis() as u64,
                    "Program did not finish within the time limit"
                );
            }
            ScenarioVerdict::Errored { code } => {
                warn!(scenario = %scenario.id, code, "Program terminated with an error");
            }
            ScenarioVerdict::Crashed { signal } => {
                warn!(scenario = %scenario.id, signal, "Program terminated by signal");
            }
            ScenarioVerdict::LaunchFailed { message } => {
                warn!(scenario = %scenario.id, error = %message, "Program could not be launched");
            }
        }

        outcome
    }
}
