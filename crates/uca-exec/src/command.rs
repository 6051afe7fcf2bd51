//! Command execution abstraction

use async_trait::async_trait;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};
use uca_core::UcaError;

/// Exit code reported when a command could not be started at all
pub const SPAWN_FAILURE_CODE: i32 = 127;

/// How long to wait for output pipes after the child is gone
///
/// Grandchildren may inherit the pipes and keep them open.
const PIPE_DRAIN_GRACE: Duration = Duration::from_secs(2);

/// How a command ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exit {
    /// Process exited; `-1` when it was killed by a signal
    Code(i32),
    /// Per-command timeout elapsed and the process was killed
    TimedOut,
    /// Run-scoped cancellation fired and the process was killed
    Canceled,
}

/// Output from a finished command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// Standard output only (probes parse this)
    pub stdout: String,
    /// Standard output followed by standard error
    pub combined: String,
    pub exit: Exit,
    pub duration: Duration,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit == Exit::Code(0)
    }

    pub(crate) fn spawn_failure(error: &UcaError, started: Instant) -> Self {
        Self {
            stdout: String::new(),
            combined: error.to_string(),
            exit: Exit::Code(SPAWN_FAILURE_CODE),
            duration: started.elapsed(),
        }
    }

    pub(crate) fn canceled(started: Instant) -> Self {
        Self {
            stdout: String::new(),
            combined: String::new(),
            exit: Exit::Canceled,
            duration: started.elapsed(),
        }
    }
}

/// Trait for running external commands (allows mocking in tests)
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run `args[0]` with the remaining arguments
    ///
    /// Never fails: spawn errors surface as exit code 127 with the error text
    /// as output. `timeout: None` disables the deadline.
    async fn run(&self, args: &[String], timeout: Option<Duration>) -> CommandOutput;

    /// Run-scoped cancellation signal honoured by this runner
    fn cancellation(&self) -> &CancellationToken;
}

/// Real command runner backed by `tokio::process`
#[derive(Clone, Default)]
pub struct SystemRunner {
    cancel: CancellationToken,
}

impl SystemRunner {
    pub fn new(cancel: CancellationToken) -> Self {
        Self { cancel }
    }
}

#[async_trait]
impl CommandRunner for SystemRunner {
    #[instrument(skip(self), fields(cmd = %display_command(args)))]
    async fn run(&self, args: &[String], timeout: Option<Duration>) -> CommandOutput {
        let started = Instant::now();
        let Some((program, rest)) = args.split_first() else {
            return CommandOutput::spawn_failure(&UcaError::EmptyCommand, started);
        };
        if self.cancel.is_cancelled() {
            return CommandOutput::canceled(started);
        }

        debug!("Executing {:?}", args);

        let spawned = Command::new(program)
            .args(rest)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn();
        let mut child = match spawned {
            Ok(child) => child,
            Err(e) => {
                let error = UcaError::Spawn {
                    program: program.clone(),
                    message: e.to_string(),
                };
                debug!("{}", error);
                return CommandOutput::spawn_failure(&error, started);
            }
        };

        let stdout_reader = child.stdout.take().map(|pipe| tokio::spawn(read_pipe(pipe)));
        let stderr_reader = child.stderr.take().map(|pipe| tokio::spawn(read_pipe(pipe)));

        let exit = tokio::select! {
            status = child.wait() => match status {
                Ok(status) => Exit::Code(status.code().unwrap_or(-1)),
                Err(e) => {
                    warn!("Failed to wait for {}: {}", program, e);
                    Exit::Code(1)
                }
            },
            _ = deadline(timeout) => {
                let _ = child.kill().await;
                Exit::TimedOut
            }
            _ = self.cancel.cancelled() => {
                let _ = child.kill().await;
                Exit::Canceled
            }
        };

        let stdout = drain(stdout_reader).await;
        let stderr = drain(stderr_reader).await;
        let duration = started.elapsed();

        if exit != Exit::Code(0) {
            debug!("Command ended with {:?} after {:?}", exit, duration);
        }

        let mut combined = stdout.clone();
        combined.push_str(&stderr);
        CommandOutput {
            stdout,
            combined,
            exit,
            duration,
        }
    }

    fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }
}

/// Sleep for `timeout`, or forever when there is none
pub(crate) async fn deadline(timeout: Option<Duration>) {
    match timeout {
        Some(duration) => tokio::time::sleep(duration).await,
        None => std::future::pending::<()>().await,
    }
}

async fn read_pipe<R: AsyncRead + Unpin>(mut pipe: R) -> Vec<u8> {
    let mut buf = Vec::new();
    // Partial output is still useful when the read fails midway
    let _ = pipe.read_to_end(&mut buf).await;
    buf
}

async fn drain(reader: Option<JoinHandle<Vec<u8>>>) -> String {
    let Some(mut handle) = reader else {
        return String::new();
    };
    match tokio::time::timeout(PIPE_DRAIN_GRACE, &mut handle).await {
        Ok(Ok(bytes)) => String::from_utf8_lossy(&bytes).into_owned(),
        Ok(Err(e)) => {
            warn!("Output reader failed: {}", e);
            String::new()
        }
        Err(_) => {
            handle.abort();
            String::new()
        }
    }
}

/// Render an argv for display, quoting arguments that need it
pub fn display_command(args: &[String]) -> String {
    args.iter()
        .map(|arg| {
            if arg.contains([' ', '\t', '\n', '"', '\'']) {
                format!("{:?}", arg)
            } else {
                arg.clone()
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_display_command_quotes() {
        assert_eq!(
            display_command(&argv(&["npm", "install", "-g", "a b"])),
            "npm install -g \"a b\""
        );
        assert_eq!(display_command(&[]), "");
    }

    #[tokio::test]
    async fn test_empty_command() {
        let runner = SystemRunner::default();
        let output = runner.run(&[], None).await;
        assert_eq!(output.exit, Exit::Code(SPAWN_FAILURE_CODE));
    }

    #[tokio::test]
    async fn test_spawn_failure_is_not_an_error() {
        let runner = SystemRunner::default();
        let output = runner
            .run(&argv(&["uca-definitely-not-a-real-binary"]), None)
            .await;
        assert_eq!(output.exit, Exit::Code(SPAWN_FAILURE_CODE));
        assert!(output.combined.contains("uca-definitely-not-a-real-binary"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_captures_combined_output() {
        let runner = SystemRunner::default();
        let output = runner
            .run(&argv(&["sh", "-c", "echo out; echo err >&2; exit 3"]), None)
            .await;
        assert_eq!(output.exit, Exit::Code(3));
        assert_eq!(output.stdout, "out\n");
        assert!(output.combined.contains("out"));
        assert!(output.combined.contains("err"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_timeout_kills_child() {
        let runner = SystemRunner::default();
        let output = runner
            .run(&argv(&["sleep", "5"]), Some(Duration::from_millis(100)))
            .await;
        assert_eq!(output.exit, Exit::TimedOut);
        assert!(output.duration < Duration::from_secs(4));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_cancellation_kills_child() {
        let cancel = CancellationToken::new();
        let runner = SystemRunner::new(cancel.clone());

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.cancel();
        });

        let output = runner.run(&argv(&["sleep", "5"]), None).await;
        assert_eq!(output.exit, Exit::Canceled);

        // Already-canceled runners do not spawn at all
        let output = runner.run(&argv(&["true"]), None).await;
        assert_eq!(output.exit, Exit::Canceled);
    }
}
