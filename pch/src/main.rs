//! Philosopher Conformance Harness
//!
//! Runs a dining-philosophers binary through the functional and fault
//! scenario catalogs and prints a PASS/FAIL report.

#![forbid(unsafe_code)]

mod render;

use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, ValueEnum};
use pch_common::config::{Sourced, split_command};
use pch_common::{
    FaultScenarioRunner, HarnessConfig, LaunchFailurePolicy, LogConfig, LoggingGuards,
    ReportAggregator, ReportSink, Scenario, ScenarioRunner, SubstringExtractor, init_logging,
    run_preflight,
};
use render::{JsonReport, TextReport};
use tracing::{debug, info, warn};

#[derive(Parser)]
#[command(name = "pch")]
#[command(author, version, about = "Conformance harness for dining-philosophers binaries")]
struct Cli {
    /// Path to the binary under test
    #[arg(long)]
    binary: Option<PathBuf>,

    /// Working directory for the binary, style checker and build
    #[arg(long)]
    project_dir: Option<PathBuf>,

    /// Timeout for each functional scenario
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..=3600))]
    timeout_secs: Option<u64>,

    /// Timeout for each fault scenario
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..=3600))]
    fault_timeout_secs: Option<u64>,

    /// Grace period between SIGTERM and SIGKILL on timeout
    #[arg(long, value_parser = clap::value_parser!(u64).range(0..=60_000))]
    kill_grace_ms: Option<u64>,

    /// Skip the style check
    #[arg(long)]
    skip_norm: bool,

    /// Skip the build step
    #[arg(long)]
    skip_build: bool,

    /// Style checker command (whitespace separated)
    #[arg(long)]
    norm_cmd: Option<String>,

    /// Build command (whitespace separated)
    #[arg(long)]
    build_cmd: Option<String>,

    /// Which scenario groups to run
    #[arg(long, value_enum, default_value_t = Only::All)]
    only: Only,

    /// Run only the functional scenario with this id, or those whose arguments contain this text
    #[arg(long)]
    filter: Option<String>,

    /// Count fault scenarios that fail to launch as failures
    #[arg(long)]
    strict_launch: bool,

    /// Report format
    #[arg(long, value_enum, default_value_t = Format::Text)]
    format: Format,

    /// Exit with status 1 when any scenario fails
    #[arg(long)]
    fail_on_error: bool,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Only {
    Functional,
    Fault,
    All,
}

impl Only {
    fn functional(self) -> bool {
        matches!(self, Only::Functional | Only::All)
    }

    fn fault(self) -> bool {
        matches!(self, Only::Fault | Only::All)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
    Text,
    Json,
}

/// Flags win over `PCH_*` variables.
fn apply_overrides(config: &mut HarnessConfig, cli: &Cli) {
    if let Some(binary) = &cli.binary {
        config.binary = Sourced::from_cli(binary.clone());
    }
    if let Some(dir) = &cli.project_dir {
        config.project_dir = Sourced::from_cli(dir.clone());
    }
    if let Some(secs) = cli.timeout_secs {
        config.functional_timeout = Duration::from_secs(secs);
    }
    if let Some(secs) = cli.fault_timeout_secs {
        config.fault_timeout = Duration::from_secs(secs);
    }
    if let Some(ms) = cli.kill_grace_ms {
        config.kill_grace = Duration::from_millis(ms);
    }
    if let Some(cmd) = &cli.norm_cmd {
        config.norm_command = split_command(cmd);
    }
    if let Some(cmd) = &cli.build_cmd {
        config.build_command = split_command(cmd);
    }
    if cli.skip_norm {
        config.run_norm = false;
    }
    if cli.skip_build {
        config.run_build = false;
    }
    if cli.strict_launch {
        config.launch_failure_policy = LaunchFailurePolicy::Strict;
    }
}

/// An exact id wins; otherwise keep scenarios whose arguments contain `filter`.
fn select_functional(scenarios: &mut Vec<Scenario>, filter: &str) {
    if scenarios.iter().any(|s| s.id == filter) {
        scenarios.retain(|s| s.id == filter);
        return;
    }
    scenarios.retain(|s| {
        s.command_line
            .get(1..)
            .unwrap_or_default()
            .join(" ")
            .contains(filter)
    });
}

/// Install logging, falling back to stderr only when the log file is
/// unusable. Logging problems never stop a run.
fn install_logging(config: &LogConfig) -> Option<LoggingGuards> {
    match init_logging(config) {
        Ok(guards) => Some(guards),
        Err(file_error) if config.file.is_some() => {
            match init_logging(&config.clone().without_file()) {
                Ok(guards) => {
                    warn!("Log file unusable, logging to stderr only: {}", file_error);
                    Some(guards)
                }
                Err(e) => {
                    eprintln!("pch: logging disabled: {file_error}; {e}");
                    None
                }
            }
        }
        Err(e) => {
            eprintln!("pch: logging disabled: {e}");
            None
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let (log_config, log_env_errors) = LogConfig::from_env("info");
    let mut log_config = log_config.with_stderr();
    if cli.verbose {
        log_config = log_config.with_level("debug");
    }
    let _logging_guards = install_logging(&log_config);

    let (mut config, env_errors) = HarnessConfig::from_env();
    for error in log_env_errors.iter().chain(&env_errors) {
        warn!("{}, using default", error);
    }
    apply_overrides(&mut config, &cli);
    debug!(
        binary = %config.binary.value.display(),
        binary_source = ?config.binary.source,
        project_dir = %config.project_dir.value.display(),
        project_dir_source = ?config.project_dir.source,
        "Resolved configuration"
    );

    let runner = config.process_runner();

    let preflight_config = config.preflight();
    let preflight = if preflight_config.style_command.is_some()
        || preflight_config.build_command.is_some()
    {
        Some(run_preflight(&runner, &preflight_config).await)
    } else {
        None
    };

    let mut functional = if cli.only.functional() {
        config.functional_scenarios()
    } else {
        Vec::new()
    };
    if let Some(filter) = &cli.filter {
        select_functional(&mut functional, filter);
    }
    let faults = if cli.only.fault() {
        config.fault_scenarios()
    } else {
        Vec::new()
    };
    info!(
        functional = functional.len(),
        faults = faults.len(),
        binary = %config.resolved_binary().display(),
        "Running scenarios"
    );

    let extractor = SubstringExtractor::new();
    let aggregator = ReportAggregator::new(
        ScenarioRunner::new(&runner, &extractor),
        FaultScenarioRunner::new(&runner, config.fault_timeout, config.launch_failure_policy),
    );

    let stdout = io::stdout();
    let mut sink: Box<dyn ReportSink> = match cli.format {
        Format::Text => Box::new(TextReport::new(stdout.lock())),
        Format::Json => Box::new(JsonReport::new(stdout.lock())),
    };
    let summary = aggregator
        .run_all(preflight, &functional, &faults, sink.as_mut())
        .await;

    if cli.fail_on_error && summary.failed() > 0 {
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}
