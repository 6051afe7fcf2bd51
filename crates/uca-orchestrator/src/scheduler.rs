//! Bounded worker pool executing update tasks
//!
//! Workers are tokio tasks draining a shared queue. Tasks of a kind that
//! mutates shared global state hold that kind's lock while they run, so two
//! npm (or brew, or ...) commands never overlap while unrelated kinds do.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{debug, info, warn};
use uca_core::{AgentResult, FailureReason, ManagerKind, Outcome, Phase, UNKNOWN_VERSION};
use uca_exec::{display_command, CommandRunner, Exit};
use uca_probe::EnvironmentProbe;

use crate::batcher::{Task, TaskMember};
use crate::classifier::Classifier;
use crate::events::EventSink;
use crate::retry::{apply_failure, run_update_command, UpdateRun};

/// Explanation appended when a failed batch is split up
pub const BATCH_FALLBACK_HINT: &str = "batch update failed; retrying individually";

/// Log marker between the batch output and an individual retry
pub const BATCH_RETRY_MARKER: &str = "(uca) retrying individually after batch failure";

/// Scheduling knobs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerOptions {
    /// Run one task at a time
    pub serial: bool,
    /// Conservative mode: one at a time unless a limit is given
    pub safe: bool,
    /// Explicit worker limit
    pub concurrency: Option<usize>,
    /// Per-command timeout; `None` disables it
    pub timeout: Option<Duration>,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self {
            serial: false,
            safe: false,
            concurrency: None,
            timeout: Some(Duration::from_secs(15 * 60)),
        }
    }
}

/// Number of workers for `tasks` queued tasks, always within `1..=max(tasks, 1)`
pub fn effective_concurrency(options: &SchedulerOptions, tasks: usize) -> usize {
    let limit = options.concurrency.filter(|n| *n > 0);
    let requested = if options.serial || (options.safe && limit.is_none()) {
        1
    } else {
        limit.unwrap_or(tasks)
    };
    requested.min(tasks).max(1)
}

/// One mutex per manager kind, created on first use
#[derive(Default)]
pub(crate) struct ManagerLocks {
    locks: Mutex<HashMap<ManagerKind, Arc<AsyncMutex<()>>>>,
}

impl ManagerLocks {
    /// Hold `kind`'s lock, or nothing for kinds that may run concurrently
    pub(crate) async fn acquire(&self, kind: ManagerKind) -> Option<OwnedMutexGuard<()>> {
        if !kind.requires_lock() {
            return None;
        }
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            locks.entry(kind).or_default().clone()
        };
        Some(lock.lock_owned().await)
    }
}

/// Index-addressed, write-once result slots
pub(crate) type Slots = Arc<Vec<OnceLock<AgentResult>>>;

pub(crate) fn new_slots(len: usize) -> Slots {
    Arc::new((0..len).map(|_| OnceLock::new()).collect())
}

pub(crate) fn fill_slot(slots: &Slots, index: usize, result: AgentResult) {
    match slots.get(index) {
        Some(slot) => {
            if slot.set(result).is_err() {
                warn!("Result slot {} written twice; keeping the first", index);
            }
        }
        None => warn!("Result slot {} out of range", index),
    }
}

/// Executes tasks against the environment
pub(crate) struct Scheduler {
    probe: Arc<EnvironmentProbe>,
    runner: Arc<dyn CommandRunner>,
    classifier: Arc<Classifier>,
    events: EventSink,
    options: SchedulerOptions,
    locks: ManagerLocks,
}

impl Scheduler {
    pub(crate) fn new(
        probe: Arc<EnvironmentProbe>,
        runner: Arc<dyn CommandRunner>,
        classifier: Arc<Classifier>,
        events: EventSink,
        options: SchedulerOptions,
    ) -> Self {
        Self {
            probe,
            runner,
            classifier,
            events,
            options,
            locks: ManagerLocks::default(),
        }
    }

    /// Run every task to completion, filling `slots` by agent index
    pub(crate) async fn run(self: Arc<Self>, tasks: Vec<Task>, slots: Slots) {
        if tasks.is_empty() {
            return;
        }
        let workers = effective_concurrency(&self.options, tasks.len());
        info!("Running {} tasks on {} workers", tasks.len(), workers);

        let queue = Arc::new(AsyncMutex::new(VecDeque::from(tasks)));
        let handles = (0..workers).map(|worker| {
            let scheduler = Arc::clone(&self);
            let queue = Arc::clone(&queue);
            let slots = Arc::clone(&slots);
            tokio::spawn(async move {
                loop {
                    let Some(task) = queue.lock().await.pop_front() else {
                        break;
                    };
                    debug!(worker, kind = %task.kind, "Picked task");
                    for (index, result) in scheduler.run_task(task).await {
                        fill_slot(&slots, index, result);
                    }
                }
            })
        });

        for joined in join_all(handles).await {
            if let Err(e) = joined {
                warn!("Worker aborted: {}", e);
            }
        }
    }

    fn prepare(&self, task: &Task, member: &TaskMember) -> AgentResult {
        let mut result = AgentResult::new(member.agent.name.clone());
        result.method = Some(task.kind);
        result.explain = member.explain.clone();
        result.command = display_command(&task.command);
        result
    }

    fn cancel_all(&self, task: &Task) -> Vec<(usize, AgentResult)> {
        let run = UpdateRun {
            log: String::new(),
            classify_output: String::new(),
            exit: Exit::Canceled,
            duration: Duration::ZERO,
        };
        let prepared = task.members.iter().map(|member| self.prepare(task, member)).collect();
        self.fail_canceled(task, prepared, &run)
    }

    /// Mark every member interrupted, keeping whatever the run logged
    fn fail_canceled(
        &self,
        task: &Task,
        prepared: Vec<AgentResult>,
        run: &UpdateRun,
    ) -> Vec<(usize, AgentResult)> {
        task.members
            .iter()
            .zip(prepared)
            .map(|(member, mut result)| {
                result.duration = run.duration;
                result.log = run.log.clone();
                apply_failure(&mut result, &self.classifier, &task.command, run, self.options.timeout);
                self.events.emit(member.index, Phase::Finish, &result, member.visible);
                (member.index, result)
            })
            .collect()
    }

    /// Re-probe the version and settle a successful or failed run
    async fn settle(
        &self,
        mut result: AgentResult,
        member: &TaskMember,
        kind: ManagerKind,
        command: &[String],
        run: &UpdateRun,
    ) -> AgentResult {
        result.after = self.probe.version(&member.agent, Some(kind)).await;
        if !run.succeeded() {
            apply_failure(&mut result, &self.classifier, command, run, self.options.timeout);
        } else if !result.before.is_empty()
            && result.before == result.after
            && result.before != UNKNOWN_VERSION
        {
            result.outcome = Some(Outcome::Unchanged);
        } else {
            result.outcome = Some(Outcome::Updated { dry_run: false });
        }
        self.events.emit(member.index, Phase::Finish, &result, member.visible);
        result
    }

    async fn run_task(&self, task: Task) -> Vec<(usize, AgentResult)> {
        let cancel = self.runner.cancellation();
        if cancel.is_cancelled() {
            return self.cancel_all(&task);
        }

        let _guard = self.locks.acquire(task.kind).await;
        if cancel.is_cancelled() {
            return self.cancel_all(&task);
        }

        let mut prepared = Vec::with_capacity(task.members.len());
        for member in &task.members {
            let mut result = self.prepare(&task, member);
            result.before = self.probe.version(&member.agent, Some(task.kind)).await;
            prepared.push(result);
        }
        for (member, result) in task.members.iter().zip(&prepared) {
            self.events.emit(member.index, Phase::Start, result, member.visible);
        }

        debug!(command = %display_command(&task.command), "Running update");
        let run = run_update_command(
            self.runner.as_ref(),
            &self.classifier,
            &task.command,
            self.options.timeout,
        )
        .await;

        // An interrupted batch is not split up
        if !run.succeeded() && (run.exit == Exit::Canceled || cancel.is_cancelled()) {
            let run = UpdateRun {
                exit: Exit::Canceled,
                ..run
            };
            return self.fail_canceled(&task, prepared, &run);
        }
        if !run.succeeded() && task.is_batch() && task.kind.is_node() {
            info!(
                "{} batch of {} failed; retrying individually",
                task.kind,
                task.members.len()
            );
            return self.retry_individually(&task, prepared, &run).await;
        }

        let mut finished = Vec::with_capacity(task.members.len());
        for (member, mut result) in task.members.iter().zip(prepared) {
            result.duration = run.duration;
            result.log = run.log.clone();
            let result = self.settle(result, member, task.kind, &task.command, &run).await;
            finished.push((member.index, result));
        }
        finished
    }

    /// Rerun each member of a failed batch with its own command
    async fn retry_individually(
        &self,
        task: &Task,
        prepared: Vec<AgentResult>,
        batch: &UpdateRun,
    ) -> Vec<(usize, AgentResult)> {
        let mut finished = Vec::with_capacity(task.members.len());
        for (member, mut result) in task.members.iter().zip(prepared) {
            result.push_hint(BATCH_FALLBACK_HINT);
            result.command = display_command(&member.single_command);

            let single = run_update_command(
                self.runner.as_ref(),
                &self.classifier,
                &member.single_command,
                self.options.timeout,
            )
            .await;

            result.duration = single.duration;
            result.log = merge_fallback_log(&batch.log, &single.log);
            let result = self
                .settle(result, member, task.kind, &member.single_command, &single)
                .await;
            finished.push((member.index, result));
        }
        finished
    }
}

/// Batch output followed by the individual attempt's output
fn merge_fallback_log(batch: &str, single: &str) -> String {
    let batch = batch.trim_end_matches('\n');
    let single = single.trim();
    match (batch.trim().is_empty(), single.is_empty()) {
        (false, false) => format!("{batch}\n\n{BATCH_RETRY_MARKER}\n{single}"),
        (false, true) => format!("{batch}\n"),
        (true, _) => single.to_string(),
    }
}

/// Failure marking for agents whose task never ran
pub(crate) fn canceled_result(mut result: AgentResult) -> AgentResult {
    result.push_hint("interrupted; retry the update");
    result.outcome = Some(Outcome::Failed(FailureReason::Canceled));
    result
}
