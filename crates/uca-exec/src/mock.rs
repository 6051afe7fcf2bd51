//! Scripted command runner for tests

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::command::{deadline, CommandOutput, CommandRunner, Exit, SPAWN_FAILURE_CODE};

/// Canned result for one command line
#[derive(Debug, Clone, Default)]
pub struct MockResponse {
    pub stdout: String,
    pub stderr: String,
    pub code: i32,
    /// Simulated run time; timeouts and cancellation cut it short
    pub delay: Duration,
}

impl MockResponse {
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            ..Self::default()
        }
    }

    pub fn fail(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            stderr: stderr.into(),
            code,
            ..Self::default()
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

/// One recorded call
#[derive(Debug, Clone)]
pub struct Invocation {
    pub args: Vec<String>,
    pub started: Instant,
    pub finished: Instant,
    pub exit: Exit,
}

impl Invocation {
    /// Command line joined with single spaces
    pub fn line(&self) -> String {
        self.args.join(" ")
    }

    /// Whether the two calls were running at the same time
    pub fn overlaps(&self, other: &Invocation) -> bool {
        self.started < other.finished && other.started < self.finished
    }
}

/// Mock runner keyed by the space-joined command line
///
/// Multiple responses for one command are returned in order; the last one
/// repeats. Unscripted commands behave like a missing program (exit 127).
pub struct MockRunner {
    responses: Mutex<HashMap<String, VecDeque<MockResponse>>>,
    calls: Mutex<Vec<Invocation>>,
    cancel: CancellationToken,
}

impl Default for MockRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl MockRunner {
    pub fn new() -> Self {
        Self::with_cancellation(CancellationToken::new())
    }

    pub fn with_cancellation(cancel: CancellationToken) -> Self {
        Self {
            responses: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            cancel,
        }
    }

    /// Script a single response for `command`
    pub fn on(self, command: &str, response: MockResponse) -> Self {
        self.on_sequence(command, vec![response])
    }

    /// Script successive responses for `command`
    pub fn on_sequence(mut self, command: &str, responses: Vec<MockResponse>) -> Self {
        self.responses
            .get_mut()
            .entry(command.to_string())
            .or_default()
            .extend(responses);
        self
    }

    /// All calls made so far, in start order
    pub async fn calls(&self) -> Vec<Invocation> {
        let mut calls = self.calls.lock().await.clone();
        calls.sort_by_key(|call| call.started);
        calls
    }

    /// Calls whose command line equals `command`
    pub async fn calls_to(&self, command: &str) -> Vec<Invocation> {
        self.calls()
            .await
            .into_iter()
            .filter(|call| call.line() == command)
            .collect()
    }

    async fn next_response(&self, key: &str) -> Option<MockResponse> {
        let mut responses = self.responses.lock().await;
        let queue = responses.get_mut(key)?;
        if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        }
    }
}

#[async_trait]
impl CommandRunner for MockRunner {
    async fn run(&self, args: &[String], timeout: Option<Duration>) -> CommandOutput {
        let started = Instant::now();
        if self.cancel.is_cancelled() {
            return CommandOutput::canceled(started);
        }

        let key = args.join(" ");
        let response = self.next_response(&key).await.unwrap_or_else(|| {
            MockResponse::fail(SPAWN_FAILURE_CODE, format!("mock: no response for {}", key))
        });

        let exit = tokio::select! {
            _ = tokio::time::sleep(response.delay) => Exit::Code(response.code),
            _ = deadline(timeout) => Exit::TimedOut,
            _ = self.cancel.cancelled() => Exit::Canceled,
        };

        let finished = Instant::now();
        self.calls.lock().await.push(Invocation {
            args: args.to_vec(),
            started,
            finished,
            exit,
        });

        let (stdout, combined) = match exit {
            Exit::Code(_) => (
                response.stdout.clone(),
                format!("{}{}", response.stdout, response.stderr),
            ),
            Exit::TimedOut | Exit::Canceled => (String::new(), String::new()),
        };

        CommandOutput {
            stdout,
            combined,
            exit,
            duration: finished - started,
        }
    }

    fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }
}
