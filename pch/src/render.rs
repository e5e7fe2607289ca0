//! Report sinks for the terminal (text) and for machines (JSON).

use std::io::Write;

use pch_common::outcome::signal_name;
use pch_common::{
    FaultOutcome, FaultScenario, FaultVerdict, Outcome, Overall, PreflightReport, ReportSink,
    Scenario, ScenarioOutcome, ScenarioVerdict, Summary,
};
use serde::Serialize;
use tracing::warn;

/// Schema version of the JSON report.
pub const REPORT_SCHEMA_VERSION: &str = "1.0.0";

/// Human-readable report, streamed as results arrive.
pub struct TextReport<W: Write> {
    out: W,
    functional_header: bool,
    fault_header: bool,
}

impl<W: Write> TextReport<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            functional_header: false,
            fault_header: false,
        }
    }

    #[cfg(test)]
    fn into_inner(self) -> W {
        self.out
    }

    fn line(&mut self, text: &str) {
        if let Err(e) = writeln!(self.out, "{text}") {
            warn!("Failed to write report: {}", e);
        }
    }

    fn result(&mut self, passed: bool, message: &str) {
        let tag = if passed { "PASS" } else { "FAIL" };
        self.line(&format!("[{tag}] {message}"));
    }
}

fn functional_message(outcome: &ScenarioOutcome) -> String {
    match &outcome.verdict {
        ScenarioVerdict::Passed => "All counters match the expected values".to_string(),
        ScenarioVerdict::CounterMismatch => {
            "Some counters do not match the expected values".to_string()
        }
        ScenarioVerdict::TimedOut => "Program did not finish within the time limit".to_string(),
        ScenarioVerdict::Errored { code } => {
            format!("Program terminated with an error (code {code})")
        }
        ScenarioVerdict::Crashed { signal } => {
            format!(
                "Program terminated with signal {signal} ({})",
                signal_name(*signal)
            )
        }
        ScenarioVerdict::LaunchFailed { message } => format!("An error occurred: {message}"),
    }
}

fn fault_message(outcome: &FaultOutcome) -> String {
    match &outcome.verdict {
        FaultVerdict::Rejected {
            outcome: Outcome::SignalExit(signal),
        } => format!(
            "Program terminated with signal {signal} ({})",
            signal_name(*signal)
        ),
        FaultVerdict::Rejected {
            outcome: Outcome::CleanExit(code),
        } => format!("Program terminated with an error (code {code})"),
        FaultVerdict::Rejected { outcome } => format!("Program {outcome}"),
        FaultVerdict::Accepted => {
            "Program terminated normally when an error was expected".to_string()
        }
        FaultVerdict::TimedOut => "Program did not finish within the time limit".to_string(),
        FaultVerdict::LaunchFailed { message } => {
            format!("Could not launch the program: {message}")
        }
    }
}

impl<W: Write> ReportSink for TextReport<W> {
    fn preflight(&mut self, report: &PreflightReport) {
        for check in report.checks() {
            self.result(check.passed, &check.detail);
        }
        if !report.all_passed() {
            self.line("");
            self.line("Warning: Norm check failed or compilation failed.");
            self.line("Tests will still be executed, but results may be affected.");
        }
    }

    fn functional_started(&mut self, scenario: &Scenario) {
        if !self.functional_header {
            self.functional_header = true;
            self.line("");
            self.line("Functional Tests");
        }
        self.line("");
        self.line(&format!("Test {}: {}", scenario.id, scenario.display_command()));
    }

    fn functional(&mut self, outcome: &ScenarioOutcome) {
        self.result(outcome.passed, &functional_message(outcome));
        if outcome.verdict == ScenarioVerdict::CounterMismatch {
            self.line("");
            self.line("Details:");
            for check in &outcome.checks {
                let name = check.counter.as_str();
                let mut label = name[..1].to_uppercase();
                label.push_str(&name[1..]);
                let status = if check.ok() { "OK" } else { "ERROR" };
                self.line(&format!(
                    "  {label:8} : {:3} (actual) vs {:3} (expected) - {status}",
                    check.actual, check.expected
                ));
            }
        }
    }

    fn fault_started(&mut self, scenario: &FaultScenario) {
        if !self.fault_header {
            self.fault_header = true;
            self.line("");
            self.line("CRASH Tests");
        }
        self.line("");
        self.line(&format!(
            "{}: {}",
            scenario.description,
            scenario.display_command()
        ));
    }

    fn fault(&mut self, outcome: &FaultOutcome) {
        self.result(outcome.passed, &fault_message(outcome));
    }

    fn summary(&mut self, summary: &Summary) {
        self.line("");
        self.line(&format!(
            "Final Results: {}/{} tests passed",
            summary.passed, summary.total
        ));
        self.line(match summary.overall() {
            Overall::AllPassed => "All tests passed!",
            Overall::AllFailed => "All tests failed.",
            Overall::Mixed => "Some tests failed.",
        });
        if let Err(e) = self.out.flush() {
            warn!("Failed to flush report: {}", e);
        }
    }
}

#[derive(Serialize)]
struct JsonDocument<'a> {
    schema_version: &'static str,
    overall: Overall,
    #[serde(flatten)]
    summary: &'a Summary,
}

/// Machine-readable report, written once when the summary is ready.
pub struct JsonReport<W: Write> {
    out: W,
}

impl<W: Write> JsonReport<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    #[cfg(test)]
    fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> ReportSink for JsonReport<W> {
    fn functional(&mut self, _outcome: &ScenarioOutcome) {}

    fn fault(&mut self, _outcome: &FaultOutcome) {}

    fn summary(&mut self, summary: &Summary) {
        let document = JsonDocument {
            schema_version: REPORT_SCHEMA_VERSION,
            overall: summary.overall(),
            summary,
        };
        let written = serde_json::to_writer_pretty(&mut self.out, &document)
            .map_err(std::io::Error::from)
            .and_then(|()| writeln!(self.out))
            .and_then(|()| self.out.flush());
        if let Err(e) = written {
            warn!("Failed to write JSON report: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pch_common::{CounterCheck, CounterName, Counters};

    fn mismatch_outcome() -> ScenarioOutcome {
        ScenarioOutcome {
            scenario_id: "2".to_string(),
            command_line: "./philo 5 800 200 200 7".to_string(),
            verdict: ScenarioVerdict::CounterMismatch,
            passed: false,
            actual_counters: Some(Counters::new(1, 33, 33, 34)),
            expected_counters: Counters::new(0, 35, 35, 35),
            checks: vec![
                CounterCheck {
                    counter: CounterName::Deaths,
                    actual: 1,
                    expected: 0,
                },
                CounterCheck {
                    counter: CounterName::Meals,
                    actual: 35,
                    expected: 35,
                },
            ],
            duration_ms: 4200,
        }
    }

    fn fault_outcome(verdict: FaultVerdict, passed: bool) -> FaultOutcome {
        FaultOutcome {
            description: "Test with 0 philosophers".to_string(),
            command_line: "./philo 0 800 200 200".to_string(),
            verdict,
            passed,
            duration_ms: 3,
        }
    }

    #[test]
    fn test_text_report_renders_mismatch_details() {
        let mut report = TextReport::new(Vec::new());
        report.functional(&mismatch_outcome());
        let text = String::from_utf8(report.into_inner()).unwrap();

        assert!(text.contains("[FAIL] Some counters do not match the expected values"));
        assert!(text.contains("  Deaths   :   1 (actual) vs   0 (expected) - ERROR"));
        assert!(text.contains("  Meals    :  35 (actual) vs  35 (expected) - OK"));
    }

    #[test]
    fn test_text_report_fault_messages() {
        let mut report = TextReport::new(Vec::new());
        report.fault(&fault_outcome(
            FaultVerdict::Rejected {
                outcome: Outcome::SignalExit(11),
            },
            true,
        ));
        report.fault(&fault_outcome(FaultVerdict::Accepted, false));
        let text = String::from_utf8(report.into_inner()).unwrap();

        assert!(text.contains("[PASS] Program terminated with signal 11 (SIGSEGV)"));
        assert!(text.contains("[FAIL] Program terminated normally when an error was expected"));
    }

    #[test]
    fn test_text_report_summary_classification() {
        let mut report = TextReport::new(Vec::new());
        report.summary(&Summary {
            total: 13,
            passed: 12,
            ..Summary::default()
        });
        let text = String::from_utf8(report.into_inner()).unwrap();

        assert!(text.contains("Final Results: 12/13 tests passed"));
        assert!(text.contains("Some tests failed."));
    }

    #[test]
    fn test_json_report_document() {
        let summary = Summary {
            total: 2,
            passed: 1,
            preflight: None,
            functional: vec![mismatch_outcome()],
            faults: vec![fault_outcome(FaultVerdict::TimedOut, false)],
        };
        let mut report = JsonReport::new(Vec::new());
        report.summary(&summary);

        let value: serde_json::Value = serde_json::from_slice(&report.into_inner()).unwrap();
        assert_eq!(value["schema_version"], REPORT_SCHEMA_VERSION);
        assert_eq!(value["overall"], "mixed");
        assert_eq!(value["total"], 2);
        assert_eq!(value["functional"][0]["verdict"]["kind"], "counter_mismatch");
        assert_eq!(value["functional"][0]["expected_counters"]["meals"], 35);
        assert_eq!(value["faults"][0]["verdict"]["kind"], "timed_out");
    }
}
