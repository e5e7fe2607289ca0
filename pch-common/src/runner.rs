//! Child process execution with process-group timeout enforcement.
//!
//! Every command is spawned as the leader of a fresh process group so the
//! target and anything it forks can be signalled as one unit. A run ends in
//! exactly one of three ways:
//!
//! - the leader exits on its own (`ExitStatus::Exited` / `ExitStatus::Signaled`)
//! - the timeout elapses (`ExitStatus::TimedOut`), after which the group gets
//!   SIGTERM, a grace period, then SIGKILL
//! - the child could not be started at all (`LaunchError`)
//!
//! In every case the group is swept and the leader reaped before `run`
//! returns, so no descendant outlives the call.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Default time between SIGTERM and SIGKILL on the timeout path.
pub const DEFAULT_KILL_GRACE: Duration = Duration::from_millis(500);

/// Default bound on draining the output pipes once the group is gone.
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

const READ_CHUNK: usize = 8192;

/// Error raised when a child never reached a terminal state we could observe.
#[derive(Debug, thiserror::Error)]
pub enum LaunchError {
    #[error("Empty command line")]
    EmptyCommand,

    #[error("Failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed waiting on {program}: {source}")]
    Wait {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ExitStatus {
    /// The leader exited with this code.
    Exited(i32),
    /// The leader was terminated by this signal.
    Signaled(i32),
    /// The timeout elapsed and the group was killed.
    TimedOut,
}

impl ExitStatus {
    fn from_std(status: std::process::ExitStatus) -> Self {
        if let Some(code) = status.code() {
            return Self::Exited(code);
        }

        #[cfg(unix)]
        {
            use std::os::unix::process::ExitStatusExt;
            if let Some(signal) = status.signal() {
                return Self::Signaled(signal);
            }
        }

        Self::Exited(-1)
    }
}

impl std::fmt::Display for ExitStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Exited(code) => write!(f, "exited({code})"),
            Self::Signaled(signal) => write!(f, "signaled({signal})"),
            Self::TimedOut => write!(f, "timed_out"),
        }
    }
}

/// Captured result of a single execution.
#[derive(Debug, Clone)]
pub struct RunResult {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
    pub duration: Duration,
}

impl RunResult {
    /// True when the leader exited on its own with code 0.
    pub fn success(&self) -> bool {
        self.status == ExitStatus::Exited(0)
    }

    pub fn stdout_contains(&self, pattern: &str) -> bool {
        self.stdout.contains(pattern)
    }
}

/// Spawns commands in their own process group and waits with a deadline.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    current_dir: Option<PathBuf>,
    kill_grace: Duration,
    drain_timeout: Duration,
}

impl Default for ProcessRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessRunner {
    pub fn new() -> Self {
        Self {
            current_dir: None,
            kill_grace: DEFAULT_KILL_GRACE,
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
        }
    }

    /// Run every child from this directory.
    pub fn with_current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    pub fn with_kill_grace(mut self, grace: Duration) -> Self {
        self.kill_grace = grace;
        self
    }

    pub fn with_drain_timeout(mut self, drain: Duration) -> Self {
        self.drain_timeout = drain;
        self
    }

    /// Execute `command_line` (argv, program first) and wait at most `timeout`.
    ///
    /// Returns `Err` only when the child could not be spawned or waited on;
    /// a timeout is reported as `ExitStatus::TimedOut` alongside whatever
    /// output was captured before the group was killed.
    pub async fn run(
        &self,
        command_line: &[String],
        timeout: Duration,
    ) -> Result<RunResult, LaunchError> {
        let (program, args) = command_line
            .split_first()
            .ok_or(LaunchError::EmptyCommand)?;

        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        cmd.process_group(0);
        if let Some(dir) = &self.current_dir {
            cmd.current_dir(dir);
        }

        debug!(command = %command_line.join(" "), ?timeout, "Executing");
        let start = Instant::now();

        let mut child = cmd.spawn().map_err(|source| LaunchError::Spawn {
            program: program.clone(),
            source,
        })?;
        // The leader's pid doubles as the process-group id.
        let pgid = child.id();

        let stdout = OutputCapture::spawn(child.stdout.take());
        let stderr = OutputCapture::spawn(child.stderr.take());

        let status = match tokio::time::timeout(timeout, child.wait()).await {
            Ok(Ok(status)) => {
                sweep_group(pgid);
                ExitStatus::from_std(status)
            }
            Ok(Err(source)) => {
                self.terminate(&mut child, pgid).await;
                stdout.abandon();
                stderr.abandon();
                return Err(LaunchError::Wait {
                    program: program.clone(),
                    source,
                });
            }
            Err(_) => {
                info!(
                    command = %command_line.join(" "),
                    pid = ?pgid,
                    ?timeout,
                    "Timeout elapsed, terminating process group"
                );
                self.terminate(&mut child, pgid).await;
                ExitStatus::TimedOut
            }
        };

        let stdout = stdout.finish(self.drain_timeout).await;
        let stderr = stderr.finish(self.drain_timeout).await;
        let duration = start.elapsed();

        debug!(
            command = %command_line.join(" "),
            %status,
            duration_ms = duration.as_millis() as u64,
            stdout_len_bytes = stdout.len(),
            stderr_len_bytes = stderr.len(),
            "Process finished"
        );

        Ok(RunResult {
            status,
            stdout,
            stderr,
            duration,
        })
    }

    /// SIGTERM the group, give the leader `kill_grace` to exit, then SIGKILL
    /// the group and reap the leader.
    async fn terminate(&self, child: &mut Child, pgid: Option<u32>) {
        if !signal_group(pgid, GroupSignal::Terminate)
            && let Err(e) = child.start_kill()
        {
            debug!("Failed to signal child directly: {}", e);
        }

        if tokio::time::timeout(self.kill_grace, child.wait())
            .await
            .is_err()
        {
            debug!(pid = ?pgid, "Leader survived SIGTERM grace period, escalating");
        }

        signal_group(pgid, GroupSignal::Kill);
        if let Err(e) = child.start_kill() {
            // Already reaped during the grace period.
            debug!("start_kill after group kill: {}", e);
        }

        if tokio::time::timeout(self.kill_grace, child.wait())
            .await
            .is_err()
        {
            warn!(pid = ?pgid, "Leader not reaped after SIGKILL");
        }
    }
}

/// Kill whatever is left of the group after the leader exited on its own.
fn sweep_group(pgid: Option<u32>) {
    if signal_group(pgid, GroupSignal::Kill) {
        debug!(pgid = ?pgid, "Killed lingering members of process group");
    }
}

#[derive(Debug, Clone, Copy)]
enum GroupSignal {
    Terminate,
    Kill,
}

/// Deliver `signal` to every member of the group. Returns false when there
/// was nothing to signal.
#[cfg(unix)]
fn signal_group(pgid: Option<u32>, signal: GroupSignal) -> bool {
    use nix::errno::Errno;
    use nix::sys::signal::{Signal, killpg};
    use nix::unistd::Pid;

    let Some(raw) = pgid.and_then(|pid| i32::try_from(pid).ok()) else {
        return false;
    };
    // Never address our own group or init.
    if raw <= 1 {
        return false;
    }

    let sig = match signal {
        GroupSignal::Terminate => Signal::SIGTERM,
        GroupSignal::Kill => Signal::SIGKILL,
    };

    match killpg(Pid::from_raw(raw), sig) {
        Ok(()) => true,
        Err(Errno::ESRCH) => false,
        Err(e) => {
            debug!("Failed to send {} to process group {}: {}", sig, raw, e);
            false
        }
    }
}

#[cfg(not(unix))]
fn signal_group(_pgid: Option<u32>, _signal: GroupSignal) -> bool {
    false
}

/// Background reader that accumulates one pipe into a shared buffer, so the
/// bytes read so far survive even if the reader has to be abandoned.
struct OutputCapture {
    buffer: Arc<Mutex<Vec<u8>>>,
    task: Option<JoinHandle<()>>,
}

impl OutputCapture {
    fn spawn<R>(pipe: Option<R>) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let buffer = Arc::new(Mutex::new(Vec::new()));
        let task = pipe.map(|mut pipe| {
            let buffer = Arc::clone(&buffer);
            tokio::spawn(async move {
                let mut chunk = [0u8; READ_CHUNK];
                loop {
                    match pipe.read(&mut chunk).await {
                        Ok(0) => break,
                        Ok(n) => match buffer.lock() {
                            Ok(mut buf) => buf.extend_from_slice(&chunk[..n]),
                            Err(poisoned) => poisoned.into_inner().extend_from_slice(&chunk[..n]),
                        },
                        Err(e) => {
                            debug!("Output pipe read failed: {}", e);
                            break;
                        }
                    }
                }
            })
        });
        Self { buffer, task }
    }

    /// Wait up to `drain_timeout` for EOF, then return what was captured.
    async fn finish(mut self, drain_timeout: Duration) -> String {
        if let Some(task) = self.task.take() {
            let abort = task.abort_handle();
            if tokio::time::timeout(drain_timeout, task).await.is_err() {
                // A descendant escaped the group and still holds the pipe.
                warn!(?drain_timeout, "Output pipe still open after drain timeout");
                abort.abort();
            }
        }
        self.snapshot()
    }

    fn abandon(mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }

    fn snapshot(&self) -> String {
        let bytes = match self.buffer.lock() {
            Ok(buf) => buf.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };
        String::from_utf8_lossy(&bytes).into_owned()
    }
}
