//! Sequential execution of every scenario and the final tally.

use serde::Serialize;
use tracing::info;

use crate::counters::{CounterExtractor, SubstringExtractor};
use crate::fault::{FaultOutcome, FaultScenario, FaultScenarioRunner};
use crate::preflight::PreflightReport;
use crate::scenario::{Scenario, ScenarioOutcome, ScenarioRunner};

/// Overall classification of a run, for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Overall {
    AllPassed,
    AllFailed,
    Mixed,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Summary {
    pub total: usize,
    pub passed: usize,
    pub preflight: Option<PreflightReport>,
    pub functional: Vec<ScenarioOutcome>,
    pub faults: Vec<FaultOutcome>,
}

impl Summary {
    pub fn failed(&self) -> usize {
        self.total - self.passed
    }

    pub fn overall(&self) -> Overall {
        if self.passed == self.total {
            Overall::AllPassed
        } else if self.passed == 0 {
            Overall::AllFailed
        } else {
            Overall::Mixed
        }
    }

    fn record_functional(&mut self, outcome: ScenarioOutcome) {
        self.total += 1;
        if outcome.passed {
            self.passed += 1;
        }
        self.functional.push(outcome);
    }

    fn record_fault(&mut self, outcome: FaultOutcome) {
        self.total += 1;
        if outcome.passed {
            self.passed += 1;
        }
        self.faults.push(outcome);
    }
}

/// Receives results as they are produced.
pub trait ReportSink {
    fn preflight(&mut self, _report: &PreflightReport) {}
    fn functional_started(&mut self, _scenario: &Scenario) {}
    fn functional(&mut self, outcome: &ScenarioOutcome);
    fn fault_started(&mut self, _scenario: &FaultScenario) {}
    fn fault(&mut self, outcome: &FaultOutcome);
    fn summary(&mut self, summary: &Summary);
}

/// Runs every scenario in order and tallies the results.
pub struct ReportAggregator<'a, E: CounterExtractor + ?Sized = SubstringExtractor> {
    scenarios: ScenarioRunner<'a, E>,
    faults: FaultScenarioRunner<'a>,
}

impl<'a, E: CounterExtractor + ?Sized> ReportAggregator<'a, E> {
    pub fn new(scenarios: ScenarioRunner<'a, E>, faults: FaultScenarioRunner<'a>) -> Self {
        Self { scenarios, faults }
    }

    /// Run all functional scenarios, then all fault scenarios. Never stops
    /// early: one bad run must not hide later results.
    pub async fn run_all(
        &self,
        preflight: Option<PreflightReport>,
        functional: &[Scenario],
        faults: &[FaultScenario],
        sink: &mut dyn ReportSink,
    ) -> Summary {
        let mut summary = Summary::default();

        if let Some(report) = &preflight {
            sink.preflight(report);
        }
        summary.preflight = preflight;

        for scenario in functional {
            sink.functional_started(scenario);
            let outcome = self.scenarios.evaluate(scenario).await;
            sink.functional(&outcome);
            summary.record_functional(outcome);
        }

        for scenario in faults {
            sink.fault_started(scenario);
            let outcome = self.faults.evaluate(scenario).await;
            sink.fault(&outcome);
            summary.record_fault(outcome);
        }

        info!(
            total = summary.total,
            passed = summary.passed,
            overall = ?summary.overall(),
            "Final results"
        );
        sink.summary(&summary);
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::counters::Counters;
    use crate::fault::LaunchFailurePolicy;
    use crate::runner::ProcessRunner;
    use std::time::Duration;

    #[derive(Default)]
    struct RecordingSink {
        events: Vec<String>,
    }

    impl ReportSink for RecordingSink {
        fn functional_started(&mut self, scenario: &Scenario) {
            self.events.push(format!("start:{}", scenario.id));
        }

        fn functional(&mut self, outcome: &ScenarioOutcome) {
            self.events
                .push(format!("functional:{}:{}", outcome.scenario_id, outcome.passed));
        }

        fn fault(&mut self, outcome: &FaultOutcome) {
            self.events
                .push(format!("fault:{}:{}", outcome.description, outcome.passed));
        }

        fn summary(&mut self, summary: &Summary) {
            self.events
                .push(format!("summary:{}/{}", summary.passed, summary.total));
        }
    }

    #[test]
    fn test_overall_classification() {
        let mut summary = Summary {
            total: 3,
            passed: 3,
            ..Summary::default()
        };
        assert_eq!(summary.overall(), Overall::AllPassed);
        summary.passed = 0;
        assert_eq!(summary.overall(), Overall::AllFailed);
        summary.passed = 2;
        assert_eq!(summary.overall(), Overall::Mixed);
        assert_eq!(summary.failed(), 1);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_all_continues_after_failures() {
        let runner = ProcessRunner::new();
        let extractor = SubstringExtractor::new();
        let aggregator = ReportAggregator::new(
            ScenarioRunner::new(&runner, &extractor),
            FaultScenarioRunner::new(&runner, Duration::from_secs(5), LaunchFailurePolicy::Strict),
        );

        let functional = vec![
            Scenario::new(
                "missing",
                vec!["./no-such-philo".into()],
                Counters::default(),
                Duration::from_secs(5),
            ),
            Scenario::new(
                "ok",
                vec!["sh".into(), "-c".into(), "echo '1 1 is eating'".into()],
                Counters::new(0, 1, 0, 0),
                Duration::from_secs(5),
            ),
        ];
        let faults = vec![
            FaultScenario::new(vec!["false".into()], "rejects"),
            FaultScenario::new(vec!["true".into()], "accepts"),
        ];

        let mut sink = RecordingSink::default();
        let summary = aggregator
            .run_all(None, &functional, &faults, &mut sink)
            .await;

        assert_eq!(summary.total, 4);
        assert_eq!(summary.passed, 2);
        assert_eq!(summary.overall(), Overall::Mixed);
        assert_eq!(
            sink.events,
            vec![
                "start:missing",
                "functional:missing:false",
                "start:ok",
                "functional:ok:true",
                "fault:rejects:true",
                "fault:accepts:false",
                "summary:2/4",
            ]
        );
    }
}
