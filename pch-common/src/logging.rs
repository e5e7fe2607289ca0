//! Tracing subscriber setup shared by the binaries and integration tests.
//!
//! Logs always go to stderr (when enabled) so stdout carries only the
//! report. An optional JSON log file is written through a non-blocking
//! appender whose guard must be held for the life of the process.

use std::path::PathBuf;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt};

use crate::config::{EnvError, EnvParser};

#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("Invalid log file path: {0}")]
    InvalidFile(PathBuf),

    #[error("Failed to create log directory: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to install tracing subscriber: {0}")]
    Init(#[from] TryInitError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

#[derive(Debug, Clone)]
pub struct LogConfig {
    pub level: String,
    pub format: LogFormat,
    pub file: Option<PathBuf>,
    pub stderr: bool,
}

impl LogConfig {
    /// Read `PCH_LOG_LEVEL`, `PCH_LOG_FORMAT` and `PCH_LOG_FILE`.
    ///
    /// Invalid values fall back to the defaults. The errors are returned
    /// rather than logged, since no subscriber exists yet.
    pub fn from_env(default_level: &str) -> (Self, Vec<EnvError>) {
        let mut parser = EnvParser::new();
        let level = parser.get_log_level("LOG_LEVEL", default_level).value;
        let format = match parser
            .get_choice("LOG_FORMAT", "pretty", &["pretty", "json"])
            .value
            .as_str()
        {
            "json" => LogFormat::Json,
            _ => LogFormat::Pretty,
        };
        let file = parser.get_optional_string("LOG_FILE").value.map(PathBuf::from);

        let config = Self {
            level,
            format,
            file,
            stderr: false,
        };
        (config, parser.take_errors())
    }

    pub fn with_stderr(mut self) -> Self {
        self.stderr = true;
        self
    }

    pub fn with_level(mut self, level: &str) -> Self {
        self.level = level.to_string();
        self
    }

    pub fn without_file(mut self) -> Self {
        self.file = None;
        self
    }
}

/// Keeps background log writers alive; drop at process exit.
#[must_use = "dropping the guards stops file logging"]
pub struct LoggingGuards {
    _file: Option<WorkerGuard>,
}

/// Install the global subscriber. `RUST_LOG`, when set, overrides the level.
pub fn init_logging(config: &LogConfig) -> Result<LoggingGuards, LoggingError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = Vec::new();

    if config.stderr {
        let layer = match config.format {
            LogFormat::Pretty => fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .boxed(),
            LogFormat::Json => fmt::layer().json().with_writer(std::io::stderr).boxed(),
        };
        layers.push(layer);
    }

    let mut file_guard = None;
    if let Some(path) = &config.file {
        let file_name = path
            .file_name()
            .ok_or_else(|| LoggingError::InvalidFile(path.clone()))?;
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir)?;

        let appender = tracing_appender::rolling::never(dir, file_name);
        let (writer, guard) = tracing_appender::non_blocking(appender);
        file_guard = Some(guard);
        layers.push(
            fmt::layer()
                .json()
                .with_ansi(false)
                .with_writer(writer)
                .boxed(),
        );
    }

    tracing_subscriber::registry()
        .with(layers)
        .with(filter)
        .try_init()?;

    Ok(LoggingGuards { _file: file_guard })
}
