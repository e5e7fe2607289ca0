//! Harness configuration.
//!
//! Values are resolved once at start-up, in order: built-in defaults,
//! `PCH_*` environment variables, then command-line flags. The resulting
//! [`HarnessConfig`] is immutable and passed explicitly to every component.

pub mod env;

use std::path::PathBuf;
use std::time::Duration;

pub use env::{ConfigSource, EnvError, EnvParser, Sourced, split_command};

use crate::catalog::{self, DEFAULT_FUNCTIONAL_TIMEOUT};
use crate::fault::{DEFAULT_FAULT_TIMEOUT, FaultScenario, LaunchFailurePolicy};
use crate::preflight::PreflightConfig;
use crate::runner::{DEFAULT_KILL_GRACE, ProcessRunner};
use crate::scenario::Scenario;

pub const DEFAULT_BINARY: &str = "./philo";
pub const DEFAULT_NORM_COMMAND: &str = "norminette";
pub const DEFAULT_BUILD_COMMAND: &str = "make";
pub const DEFAULT_PREFLIGHT_TIMEOUT: Duration = Duration::from_secs(300);

const MAX_TIMEOUT_SECS: u64 = 3600;
const MAX_KILL_GRACE_MS: u64 = 60_000;

#[derive(Debug, Clone)]
pub struct HarnessConfig {
    /// Target binary; relative paths are resolved against `project_dir`.
    pub binary: Sourced<PathBuf>,
    /// Working directory for the target, the style checker and the build.
    pub project_dir: Sourced<PathBuf>,
    pub functional_timeout: Duration,
    pub fault_timeout: Duration,
    pub preflight_timeout: Duration,
    pub kill_grace: Duration,
    pub norm_command: Vec<String>,
    pub build_command: Vec<String>,
    pub run_norm: bool,
    pub run_build: bool,
    pub launch_failure_policy: LaunchFailurePolicy,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            binary: Sourced::default_value(PathBuf::from(DEFAULT_BINARY)),
            project_dir: Sourced::default_value(PathBuf::from(".")),
            functional_timeout: DEFAULT_FUNCTIONAL_TIMEOUT,
            fault_timeout: DEFAULT_FAULT_TIMEOUT,
            preflight_timeout: DEFAULT_PREFLIGHT_TIMEOUT,
            kill_grace: DEFAULT_KILL_GRACE,
            norm_command: split_command(DEFAULT_NORM_COMMAND),
            build_command: split_command(DEFAULT_BUILD_COMMAND),
            run_norm: true,
            run_build: true,
            launch_failure_policy: LaunchFailurePolicy::Permissive,
        }
    }
}

impl HarnessConfig {
    /// Defaults overlaid with `PCH_*` variables. Invalid values fall back to
    /// the default and are returned for the caller to report.
    pub fn from_env() -> (Self, Vec<EnvError>) {
        let mut parser = EnvParser::new();
        let config = Self::from_parser(&mut parser);
        (config, parser.take_errors())
    }

    pub fn from_parser(parser: &mut EnvParser) -> Self {
        let defaults = Self::default();
        let strict = parser.get_bool("STRICT_LAUNCH", false).value;

        Self {
            binary: parser.get_path("BINARY", DEFAULT_BINARY),
            project_dir: parser.get_path("PROJECT_DIR", "."),
            functional_timeout: Duration::from_secs(
                parser
                    .get_u64_range(
                        "TIMEOUT_SECS",
                        defaults.functional_timeout.as_secs(),
                        1,
                        MAX_TIMEOUT_SECS,
                    )
                    .value,
            ),
            fault_timeout: Duration::from_secs(
                parser
                    .get_u64_range(
                        "FAULT_TIMEOUT_SECS",
                        defaults.fault_timeout.as_secs(),
                        1,
                        MAX_TIMEOUT_SECS,
                    )
                    .value,
            ),
            preflight_timeout: Duration::from_secs(
                parser
                    .get_u64_range(
                        "PREFLIGHT_TIMEOUT_SECS",
                        defaults.preflight_timeout.as_secs(),
                        1,
                        MAX_TIMEOUT_SECS,
                    )
                    .value,
            ),
            kill_grace: Duration::from_millis(
                parser
                    .get_u64_range(
                        "KILL_GRACE_MS",
                        defaults.kill_grace.as_millis() as u64,
                        0,
                        MAX_KILL_GRACE_MS,
                    )
                    .value,
            ),
            norm_command: parser.get_command("NORM_CMD", DEFAULT_NORM_COMMAND).value,
            build_command: parser.get_command("BUILD_CMD", DEFAULT_BUILD_COMMAND).value,
            run_norm: !parser.get_bool("SKIP_NORM", false).value,
            run_build: !parser.get_bool("SKIP_BUILD", false).value,
            launch_failure_policy: if strict {
                LaunchFailurePolicy::Strict
            } else {
                LaunchFailurePolicy::Permissive
            },
        }
    }

    /// The binary path used in scenario command lines.
    ///
    /// Children run with `project_dir` as their working directory, and how a
    /// relative program path interacts with that is platform specific, so
    /// anything path-like is made absolute here. A bare name is left for
    /// `PATH` lookup.
    pub fn resolved_binary(&self) -> PathBuf {
        let binary = &self.binary.value;
        let bare_name = binary.components().count() == 1 && !binary.starts_with(".");
        if binary.is_absolute() || bare_name {
            return binary.clone();
        }
        let joined = self.project_dir.value.join(binary);
        std::path::absolute(&joined).unwrap_or(joined)
    }

    pub fn process_runner(&self) -> ProcessRunner {
        ProcessRunner::new()
            .with_current_dir(&self.project_dir.value)
            .with_kill_grace(self.kill_grace)
    }

    pub fn preflight(&self) -> PreflightConfig {
        PreflightConfig {
            style_command: (self.run_norm && !self.norm_command.is_empty())
                .then(|| self.norm_command.clone()),
            build_command: (self.run_build && !self.build_command.is_empty())
                .then(|| self.build_command.clone()),
            timeout: self.preflight_timeout,
        }
    }

    pub fn functional_scenarios(&self) -> Vec<Scenario> {
        catalog::functional_scenarios(&self.resolved_binary(), self.functional_timeout)
    }

    pub fn fault_scenarios(&self) -> Vec<FaultScenario> {
        catalog::fault_scenarios(&self.resolved_binary())
    }
}

#[cfg(test)]
pub(crate) fn env_test_lock() -> std::sync::MutexGuard<'static, ()> {
    use std::sync::{Mutex, OnceLock};

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    ENV_LOCK
        .get_or_init(|| Mutex::new(()))
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
#[allow(unsafe_code)]
mod tests {
    use super::*;

    const VARS: &[&str] = &[
        "PCH_BINARY",
        "PCH_PROJECT_DIR",
        "PCH_TIMEOUT_SECS",
        "PCH_FAULT_TIMEOUT_SECS",
        "PCH_KILL_GRACE_MS",
        "PCH_NORM_CMD",
        "PCH_SKIP_BUILD",
        "PCH_STRICT_LAUNCH",
    ];

    fn cleanup_env() {
        for var in VARS {
            // SAFETY: env access is serialized by env_test_lock
            unsafe { std::env::remove_var(var) };
        }
    }

    fn set_env(key: &str, value: &str) {
        // SAFETY: env access is serialized by env_test_lock
        unsafe { std::env::set_var(key, value) };
    }

    #[test]
    fn test_defaults() {
        let _guard = env_test_lock();
        cleanup_env();

        let (config, errors) = HarnessConfig::from_env();
        assert!(errors.is_empty());
        assert_eq!(config.functional_timeout, Duration::from_secs(60));
        assert_eq!(config.fault_timeout, Duration::from_secs(5));
        assert_eq!(config.norm_command, vec!["norminette"]);
        assert_eq!(config.build_command, vec!["make"]);
        assert_eq!(config.launch_failure_policy, LaunchFailurePolicy::Permissive);
        let binary = config.resolved_binary();
        assert!(binary.is_absolute());
        assert!(binary.ends_with("philo"));
    }

    #[test]
    fn test_env_overrides_and_errors() {
        let _guard = env_test_lock();
        cleanup_env();

        set_env("PCH_BINARY", "/opt/philo/philo");
        set_env("PCH_TIMEOUT_SECS", "10");
        set_env("PCH_FAULT_TIMEOUT_SECS", "0");
        set_env("PCH_NORM_CMD", "norminette -R CheckForbiddenSourceHeader");
        set_env("PCH_SKIP_BUILD", "yes");
        set_env("PCH_STRICT_LAUNCH", "1");

        let (config, errors) = HarnessConfig::from_env();
        cleanup_env();

        assert_eq!(config.resolved_binary(), PathBuf::from("/opt/philo/philo"));
        assert_eq!(config.functional_timeout, Duration::from_secs(10));
        assert_eq!(config.fault_timeout, DEFAULT_FAULT_TIMEOUT);
        assert_eq!(errors.len(), 1);
        assert!(matches!(errors[0], EnvError::OutOfRange { .. }));
        assert_eq!(
            config.norm_command,
            vec!["norminette", "-R", "CheckForbiddenSourceHeader"]
        );
        assert!(!config.run_build);
        assert!(config.preflight().build_command.is_none());
        assert!(config.preflight().style_command.is_some());
        assert_eq!(config.launch_failure_policy, LaunchFailurePolicy::Strict);
    }

    #[test]
    fn test_relative_binary_resolves_against_project_dir() {
        let config = HarnessConfig {
            binary: Sourced::from_cli(PathBuf::from("./philo")),
            project_dir: Sourced::from_cli(PathBuf::from("/work/philo")),
            ..HarnessConfig::default()
        };
        let binary = config.resolved_binary();
        assert!(binary.is_absolute());
        assert!(binary.starts_with("/work/philo"));
        assert!(binary.ends_with("philo/philo"));

        let expected = binary.to_string_lossy().into_owned();
        let scenarios = config.functional_scenarios();
        assert_eq!(scenarios[0].command_line[0], expected);
        assert_eq!(config.fault_scenarios()[4].command_line, vec![expected]);
    }

    #[test]
    fn test_bare_binary_name_is_left_for_path_lookup() {
        let config = HarnessConfig {
            binary: Sourced::from_cli(PathBuf::from("philo")),
            project_dir: Sourced::from_cli(PathBuf::from("/work/philo")),
            ..HarnessConfig::default()
        };
        assert_eq!(config.resolved_binary(), PathBuf::from("philo"));
    }
}
