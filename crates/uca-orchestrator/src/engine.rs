//! Update Engine - one full update run over a selection of agents
//!
//! A run flows through four stages:
//! 1. Resolve every agent against the shared probe (concurrently)
//! 2. Batch resolved node-family installs into tasks
//! 3. Publish `detect` events and settle skips (and dry-run previews)
//! 4. Hand the tasks to the scheduler
//!
//! The returned vector is index-aligned with the input agents.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::join_all;
use tracing::{debug, error, info, instrument};
use uca_core::{Agent, AgentResult, Outcome, Phase};
use uca_exec::{display_command, CommandRunner};
use uca_probe::{format_version_with_token, EnvironmentProbe};

use crate::batcher::{build_tasks, Resolution};
use crate::classifier::Classifier;
use crate::events::EventSink;
use crate::resolver::resolve;
use crate::scheduler::{canceled_result, fill_slot, new_slots, Scheduler, SchedulerOptions};

/// Options for one run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunOptions {
    /// Resolve and report, but never run an update command
    pub dry_run: bool,
    pub scheduler: SchedulerOptions,
}

/// Drives resolution, batching and scheduling for a run
pub struct UpdateEngine {
    probe: Arc<EnvironmentProbe>,
    runner: Arc<dyn CommandRunner>,
    classifier: Arc<Classifier>,
    events: EventSink,
}

impl UpdateEngine {
    /// Create an engine with the default classifier and no event consumer
    pub fn new(probe: Arc<EnvironmentProbe>, runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            probe,
            runner,
            classifier: Arc::new(Classifier::default()),
            events: EventSink::disabled(),
        }
    }

    pub fn with_classifier(mut self, classifier: Classifier) -> Self {
        self.classifier = Arc::new(classifier);
        self
    }

    /// Publish lifecycle events to `events`
    pub fn with_events(mut self, events: EventSink) -> Self {
        self.events = events;
        self
    }

    pub fn probe(&self) -> &Arc<EnvironmentProbe> {
        &self.probe
    }

    /// Resolve every agent; resolutions come back in input order
    pub async fn resolve_all(&self, agents: &[Agent]) -> Vec<Resolution> {
        let probe = self.probe.as_ref();
        join_all(agents.iter().enumerate().map(|(index, agent)| async move {
            let update = resolve(agent, probe).await;
            debug!(agent = %agent.name, explanation = update.explanation(), "Resolved");
            Resolution {
                index,
                agent: agent.clone(),
                update,
            }
        }))
        .await
    }

    /// Run an update over `agents`, returning one result per agent
    #[instrument(skip_all, fields(agents = agents.len(), dry_run = options.dry_run))]
    pub async fn run(&self, agents: &[Agent], options: &RunOptions) -> Vec<AgentResult> {
        let resolutions = self.resolve_all(agents).await;
        let tasks = build_tasks(&resolutions);
        info!(
            "Resolved {} agents into {} tasks",
            resolutions.len(),
            tasks.len()
        );

        // Batch members report the batch command they share
        let commands: HashMap<usize, String> = tasks
            .iter()
            .flat_map(|task| {
                let display = display_command(&task.command);
                task.members
                    .iter()
                    .map(move |member| (member.index, display.clone()))
            })
            .collect();

        let slots = new_slots(agents.len());
        let mut previews = Vec::new();

        for resolution in &resolutions {
            let index = resolution.index;
            let visible = resolution.update.is_visible();
            let mut result = AgentResult::new(resolution.agent.name.clone());
            result.method = resolution.update.kind();
            result.explain = resolution.update.explanation().to_string();
            result.command = commands.get(&index).cloned().unwrap_or_default();

            if let Some(reason) = resolution.update.skip_reason() {
                result.outcome = Some(Outcome::Skipped(reason));
                self.events.emit(index, Phase::Detect, &result, visible);
                self.events.emit(index, Phase::Finish, &result, visible);
                fill_slot(&slots, index, result);
                continue;
            }

            self.events.emit(index, Phase::Detect, &result, visible);
            if options.dry_run {
                previews.push((resolution, result, visible));
            }
        }

        if options.dry_run {
            let previewed = join_all(
                previews
                    .into_iter()
                    .map(|(resolution, result, visible)| async move {
                        let result = self.preview(resolution, result).await;
                        (resolution.index, result, visible)
                    }),
            )
            .await;
            for (index, result, visible) in previewed {
                self.events.emit(index, Phase::Finish, &result, visible);
                fill_slot(&slots, index, result);
            }
        } else {
            let scheduler = Arc::new(Scheduler::new(
                Arc::clone(&self.probe),
                Arc::clone(&self.runner),
                Arc::clone(&self.classifier),
                self.events.clone(),
                options.scheduler,
            ));
            scheduler.run(tasks, Arc::clone(&slots)).await;
        }

        agents
            .iter()
            .zip(slots.iter())
            .map(|(agent, slot)| match slot.get() {
                Some(result) => result.clone(),
                None => {
                    error!(agent = %agent.name, "No result recorded; reporting as canceled");
                    canceled_result(AgentResult::new(agent.name.clone()))
                }
            })
            .collect()
    }

    /// Dry-run result: current version and, for node managers, the registry's latest
    async fn preview(&self, resolution: &Resolution, mut result: AgentResult) -> AgentResult {
        let agent = &resolution.agent;
        let method = resolution.update.kind();

        result.before = self.probe.version(agent, method).await;
        result.after = result.before.clone();

        if let Some(kind) = method.filter(|kind| kind.is_node()) {
            let package = agent
                .strategies
                .iter()
                .find(|strategy| strategy.kind == kind)
                .and_then(|strategy| strategy.package_name())
                .or_else(|| agent.node_package());
            if let Some(package) = package {
                if let Some(latest) = self.probe.node_latest_version(kind, package).await {
                    result.after = format_version_with_token(&result.before, &latest).unwrap_or(latest);
                }
            }
        }

        result.outcome = Some(Outcome::Updated { dry_run: true });
        result
    }
}
