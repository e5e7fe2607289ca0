//! Normalised classification of a finished run.

use serde::Serialize;

use crate::runner::{ExitStatus, RunResult};

/// What a run amounted to, independent of how the platform encodes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Outcome {
    /// The process exited on its own with this code (0 included).
    CleanExit(i32),
    /// The process was terminated by this signal.
    SignalExit(i32),
    /// The harness gave up waiting and killed the process group.
    TimedOut,
}

impl Outcome {
    /// True when the outcome shows the target refused to run normally:
    /// a signal or a non-zero exit. A zero exit or a hang is not a rejection.
    pub fn rejects_input(self) -> bool {
        match self {
            Self::SignalExit(_) => true,
            Self::CleanExit(code) => code != 0,
            Self::TimedOut => false,
        }
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CleanExit(code) => write!(f, "exited with code {code}"),
            Self::SignalExit(signal) => {
                write!(f, "terminated by signal {signal} ({})", signal_name(*signal))
            }
            Self::TimedOut => write!(f, "did not finish within the time limit"),
        }
    }
}

/// Classify a captured run.
pub fn classify(result: &RunResult) -> Outcome {
    match result.status {
        ExitStatus::Exited(code) => Outcome::CleanExit(code),
        ExitStatus::Signaled(signal) => Outcome::SignalExit(signal),
        ExitStatus::TimedOut => Outcome::TimedOut,
    }
}

/// Format a signal number as a human-readable name.
pub fn signal_name(signal: i32) -> &'static str {
    match signal {
        1 => "SIGHUP",
        2 => "SIGINT",
        3 => "SIGQUIT",
        4 => "SIGILL",
        6 => "SIGABRT",
        7 => "SIGBUS",
        8 => "SIGFPE",
        9 => "SIGKILL",
        11 => "SIGSEGV",
        13 => "SIGPIPE",
        14 => "SIGALRM",
        15 => "SIGTERM",
        _ => "UNKNOWN",
    }
}
