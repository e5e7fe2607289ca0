//! Advisory style-check and build steps run before the scenarios.
//!
//! Neither step gates the scenarios; a failure is reported and the run
//! continues, since a partially working build can still be exercised.

use std::time::Duration;

use serde::Serialize;
use tracing::{info, warn};

use crate::runner::{ExitStatus, LaunchError, ProcessRunner, RunResult};

/// Substring whose presence in the style checker's stdout marks a violation.
pub const STYLE_ERROR_MARKER: &str = "Error";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PreflightKind {
    Style,
    Build,
}

impl PreflightKind {
    pub fn label(self) -> &'static str {
        match self {
            Self::Style => "Norm check",
            Self::Build => "Compilation",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PreflightCheck {
    pub kind: PreflightKind,
    pub command_line: String,
    pub passed: bool,
    pub detail: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct PreflightReport {
    pub style: Option<PreflightCheck>,
    pub build: Option<PreflightCheck>,
}

impl PreflightReport {
    /// True when every check that ran passed.
    pub fn all_passed(&self) -> bool {
        self.checks().all(|check| check.passed)
    }

    pub fn checks(&self) -> impl Iterator<Item = &PreflightCheck> {
        self.style.iter().chain(self.build.iter())
    }
}

/// Which preflight steps to run and how.
#[derive(Debug, Clone)]
pub struct PreflightConfig {
    /// `None` skips the style check.
    pub style_command: Option<Vec<String>>,
    /// `None` skips the build.
    pub build_command: Option<Vec<String>>,
    pub timeout: Duration,
}

pub async fn run_preflight(runner: &ProcessRunner, config: &PreflightConfig) -> PreflightReport {
    let mut report = PreflightReport::default();

    if let Some(command) = &config.style_command {
        let run = runner.run(command, config.timeout).await;
        report.style = Some(judge(PreflightKind::Style, command, &run));
    }
    if let Some(command) = &config.build_command {
        let run = runner.run(command, config.timeout).await;
        report.build = Some(judge(PreflightKind::Build, command, &run));
    }

    for check in report.checks() {
        if check.passed {
            info!(check = check.kind.label(), "{}", check.detail);
        } else {
            warn!(check = check.kind.label(), "{}", check.detail);
        }
    }
    if !report.all_passed() {
        warn!("Preflight failed; scenarios will still run but results may be affected");
    }

    report
}

/// Score one preflight run.
pub fn judge(
    kind: PreflightKind,
    command: &[String],
    run: &Result<RunResult, LaunchError>,
) -> PreflightCheck {
    let (passed, detail) = match run {
        Err(e) => (false, format!("{} could not run: {}", kind.label(), e)),
        Ok(result) if result.status == ExitStatus::TimedOut => (
            false,
            format!("{} did not finish within the time limit", kind.label()),
        ),
        Ok(result) => match kind {
            PreflightKind::Style => {
                if result.stdout_contains(STYLE_ERROR_MARKER) {
                    (false, "Code does not comply with the norm".to_string())
                } else {
                    (true, "Norm check passed".to_string())
                }
            }
            PreflightKind::Build => {
                if result.success() {
                    (true, "Project compiled successfully".to_string())
                } else {
                    (false, format!("Compilation failed ({})", result.status))
                }
            }
        },
    };

    PreflightCheck {
        kind,
        command_line: command.join(" "),
        passed,
        detail,
    }
}
