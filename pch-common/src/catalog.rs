//! Compiled-in scenario tables.

use std::path::Path;
use std::time::Duration;

use crate::counters::Counters;
use crate::fault::FaultScenario;
use crate::scenario::Scenario;

/// Default timeout for functional scenarios.
pub const DEFAULT_FUNCTIONAL_TIMEOUT: Duration = Duration::from_secs(60);

struct FunctionalCase {
    id: &'static str,
    args: &'static [&'static str],
    /// deaths, meals, sleeps, thinks
    expected: (usize, usize, usize, usize),
}

const FUNCTIONAL_CASES: &[FunctionalCase] = &[
    FunctionalCase {
        id: "1",
        args: &["1", "800", "200", "200"],
        expected: (1, 0, 0, 0),
    },
    FunctionalCase {
        id: "2",
        args: &["5", "800", "200", "200", "7"],
        expected: (0, 35, 35, 35),
    },
    FunctionalCase {
        id: "3",
        args: &["4", "410", "200", "200", "20"],
        expected: (0, 80, 80, 80),
    },
    FunctionalCase {
        id: "4",
        args: &["2", "125", "60", "60", "100"],
        expected: (0, 200, 200, 200),
    },
    FunctionalCase {
        id: "5",
        args: &["5", "800", "211", "600"],
        expected: (1, 5, 5, 0),
    },
];

const FAULT_CASES: &[(&[&str], &str)] = &[
    (&["0", "800", "200", "200"], "Test with 0 philosophers"),
    (
        &["-1", "800", "200", "200"],
        "Test with a negative number of philosophers",
    ),
    (&["5", "-800", "200", "200"], "Test with a negative time"),
    (&["5", "800", "200", "200", "0"], "Test with 0 meals"),
    (&[], "Test without arguments"),
    (&["5", "800", "200"], "Test with too few arguments"),
    (
        &["5", "800", "200", "200", "7", "10"],
        "Test with too many arguments",
    ),
    (
        &["2147483648", "800", "200", "200"],
        "Test with a number of philosophers that's too large",
    ),
];

fn command_line(binary: &Path, args: &[&str]) -> Vec<String> {
    std::iter::once(binary.to_string_lossy().into_owned())
        .chain(args.iter().map(|arg| arg.to_string()))
        .collect()
}

/// Functional scenarios against `binary`, each with `timeout`.
pub fn functional_scenarios(binary: &Path, timeout: Duration) -> Vec<Scenario> {
    FUNCTIONAL_CASES
        .iter()
        .map(|case| {
            let (deaths, meals, sleeps, thinks) = case.expected;
            Scenario::new(
                case.id,
                command_line(binary, case.args),
                Counters::new(deaths, meals, sleeps, thinks),
                timeout,
            )
        })
        .collect()
}

/// Fault scenarios against `binary`.
pub fn fault_scenarios(binary: &Path) -> Vec<FaultScenario> {
    FAULT_CASES
        .iter()
        .map(|(args, description)| FaultScenario::new(command_line(binary, args), *description))
        .collect()
}
