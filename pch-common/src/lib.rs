//! Shared library for the Philosopher Conformance Harness.
//!
//! Black-box conformance testing of a dining-philosophers binary: launch it
//! under a matrix of arguments with process-group timeouts, count marker
//! lines in its stdout, and check that invalid invocations are rejected.
//!
//! Leaf-first:
//! - [`runner`]: process execution and group teardown
//! - [`outcome`]: normalised classification of a run
//! - [`counters`]: marker-line counting
//! - [`scenario`] / [`fault`]: functional and fault verdicts
//! - [`preflight`]: advisory style and build steps
//! - [`report`]: sequential execution and tallying

pub mod catalog;
pub mod config;
pub mod counters;
pub mod fault;
pub mod logging;
pub mod outcome;
pub mod preflight;
pub mod report;
pub mod runner;
pub mod scenario;

pub use config::{EnvError, HarnessConfig};
pub use counters::{CounterExtractor, CounterName, Counters, SubstringExtractor};
pub use fault::{FaultOutcome, FaultScenario, FaultScenarioRunner, FaultVerdict, LaunchFailurePolicy};
pub use logging::{LogConfig, LogFormat, LoggingGuards, init_logging};
pub use outcome::{Outcome, classify};
pub use preflight::{PreflightCheck, PreflightConfig, PreflightReport, run_preflight};
pub use report::{Overall, ReportAggregator, ReportSink, Summary};
pub use runner::{ExitStatus, LaunchError, ProcessRunner, RunResult};
pub use scenario::{CounterCheck, Scenario, ScenarioOutcome, ScenarioRunner, ScenarioVerdict};
