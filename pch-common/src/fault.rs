//! Fault scenarios: invalid invocations the target must reject.
//!
//! A rejection is a non-zero exit or a signal. Exiting 0 means the target
//! accepted input it should have refused; hanging until the (short) fault
//! timeout is treated as a failure too.

use std::time::Duration;

use serde::Serialize;
use tracing::{info, warn};

use crate::outcome::{Outcome, classify};
use crate::runner::{LaunchError, ProcessRunner, RunResult};

/// Default timeout for fault scenarios. A well-behaved rejection is near instant.
pub const DEFAULT_FAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// An intentionally invalid invocation.
#[derive(Debug, Clone)]
pub struct FaultScenario {
    pub command_line: Vec<String>,
    pub description: String,
}

impl FaultScenario {
    pub fn new(command_line: Vec<String>, description: impl Into<String>) -> Self {
        Self {
            command_line,
            description: description.into(),
        }
    }

    pub fn display_command(&self) -> String {
        self.command_line.join(" ")
    }
}

/// How to score a fault scenario whose target could not even be launched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LaunchFailurePolicy {
    /// Count it as a pass: the invalid input did not produce a successful run.
    #[default]
    Permissive,
    /// Count it as a failure: the harness could not exercise the target.
    Strict,
}

/// What happened when a fault scenario ran.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FaultVerdict {
    /// Non-zero exit or signal: the target refused the input.
    Rejected { outcome: Outcome },
    /// Clean zero exit: the target accepted invalid input.
    Accepted,
    /// Neither exited nor was rejected within the fault timeout.
    TimedOut,
    /// The target could not be started.
    LaunchFailed { message: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct FaultOutcome {
    pub description: String,
    pub command_line: String,
    pub verdict: FaultVerdict,
    pub passed: bool,
    pub duration_ms: u64,
}

/// Score a finished (or failed-to-launch) fault run.
pub fn judge(
    scenario: &FaultScenario,
    run: &Result<RunResult, LaunchError>,
    policy: LaunchFailurePolicy,
) -> FaultOutcome {
    let (verdict, passed, duration_ms) = match run {
        Ok(result) => {
            let outcome = classify(result);
            let verdict = match outcome {
                Outcome::TimedOut => FaultVerdict::TimedOut,
                Outcome::CleanExit(0) => FaultVerdict::Accepted,
                _ => FaultVerdict::Rejected { outcome },
            };
            (
                verdict,
                outcome.rejects_input(),
                result.duration.as_millis() as u64,
            )
        }
        Err(e) => (
            FaultVerdict::LaunchFailed {
                message: e.to_string(),
            },
            policy == LaunchFailurePolicy::Permissive,
            0,
        ),
    };

    FaultOutcome {
        description: scenario.description.clone(),
        command_line: scenario.display_command(),
        verdict,
        passed,
        duration_ms,
    }
}

/// Drives [`ProcessRunner`] against fault scenarios.
pub struct FaultScenarioRunner<'a> {
    runner: &'a ProcessRunner,
    timeout: Duration,
    policy: LaunchFailurePolicy,
}

impl<'a> FaultScenarioRunner<'a> {
    pub fn new(runner: &'a ProcessRunner, timeout: Duration, policy: LaunchFailurePolicy) -> Self {
        Self {
            runner,
            timeout,
            policy,
        }
    }

    pub async fn evaluate(&self, scenario: &FaultScenario) -> FaultOutcome {
        info!(
            description = %scenario.description,
            command = %scenario.display_command(),
            "Running fault scenario"
        );

        let run = self.runner.run(&scenario.command_line, self.timeout).await;
        let outcome = judge(scenario, &run, self.policy);

        match &outcome.verdict {
            FaultVerdict::Rejected { outcome: how } => {
                info!(description = %scenario.description, "Input rejected: {}", how);
            }
            FaultVerdict::Accepted => {
                warn!(
                    description = %scenario.description,
                    "Program terminated normally when an error was expected"
                );
            }
            FaultVerdict::TimedOut => {
                warn!(
                    description = %scenario.description,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "Program did not finish within the time limit"
                );
            }
            FaultVerdict::LaunchFailed { message } => {
                warn!(
                    description = %scenario.description,
                    error = %message,
                    policy = ?self.policy,
                    passed = outcome.passed,
                    "Harness could not launch the target"
                );
            }
        }

        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::ExitStatus;

    fn scenario() -> FaultScenario {
        FaultScenario::new(
            vec!["./philo".into(), "0".into(), "800".into(), "200".into(), "200".into()],
            "Test with 0 philosophers",
        )
    }

    fn ran(status: ExitStatus) -> Result<RunResult, LaunchError> {
        Ok(RunResult {
            status,
            stdout: String::new(),
            stderr: String::new(),
            duration: Duration::from_millis(5),
        })
    }

    #[test]
    fn test_nonzero_exit_passes() {
        let outcome = judge(&scenario(), &ran(ExitStatus::Exited(1)), LaunchFailurePolicy::Strict);
        assert!(outcome.passed);
        assert_eq!(
            outcome.verdict,
            FaultVerdict::Rejected {
                outcome: Outcome::CleanExit(1)
            }
        );
    }

    #[test]
    fn test_signal_passes() {
        let outcome = judge(
            &scenario(),
            &ran(ExitStatus::Signaled(11)),
            LaunchFailurePolicy::Strict,
        );
        assert!(outcome.passed);
        assert_eq!(
            outcome.verdict,
            FaultVerdict::Rejected {
                outcome: Outcome::SignalExit(11)
            }
        );
    }

    #[test]
    fn test_zero_exit_fails() {
        let outcome = judge(
            &scenario(),
            &ran(ExitStatus::Exited(0)),
            LaunchFailurePolicy::Permissive,
        );
        assert!(!outcome.passed);
        assert_eq!(outcome.verdict, FaultVerdict::Accepted);
    }

    #[test]
    fn test_timeout_fails() {
        let outcome = judge(
            &scenario(),
            &ran(ExitStatus::TimedOut),
            LaunchFailurePolicy::Permissive,
        );
        assert!(!outcome.passed);
        assert_eq!(outcome.verdict, FaultVerdict::TimedOut);
    }

    #[test]
    fn test_launch_failure_follows_policy() {
        let run = Err(LaunchError::EmptyCommand);

        let permissive = judge(&scenario(), &run, LaunchFailurePolicy::Permissive);
        assert!(permissive.passed);
        assert!(matches!(permissive.verdict, FaultVerdict::LaunchFailed { .. }));

        let strict = judge(&scenario(), &run, LaunchFailurePolicy::Strict);
        assert!(!strict.passed);
        assert!(matches!(strict.verdict, FaultVerdict::LaunchFailed { .. }));
    }

    #[test]
    fn test_default_policy_is_permissive() {
        assert_eq!(LaunchFailurePolicy::default(), LaunchFailurePolicy::Permissive);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_evaluate_hanging_target_fails_within_timeout() {
        let runner = ProcessRunner::new().with_kill_grace(Duration::from_millis(100));
        let faults = FaultScenarioRunner::new(
            &runner,
            Duration::from_millis(200),
            LaunchFailurePolicy::Permissive,
        );
        let scenario = FaultScenario::new(
            vec!["sleep".into(), "30".into()],
            "Target hangs on invalid input",
        );

        let start = std::time::Instant::now();
        let outcome = faults.evaluate(&scenario).await;
        assert!(!outcome.passed);
        assert_eq!(outcome.verdict, FaultVerdict::TimedOut);
        assert!(start.elapsed() < Duration::from_secs(5));
    }
}
