//! # uca-orchestrator
//!
//! Update orchestration for uca.
//!
//! This crate turns a selection of agents into per-agent results:
//! - Resolver: picks one update method per agent from probe evidence
//! - Batcher: merges same-manager node installs into one command
//! - Scheduler: bounded worker pool with per-manager mutual exclusion
//! - Classifier: failure reasons, hints and the one-shot npm retry
//! - Events: the detect / start / finish stream feeding the dashboard
//!
//! ## Usage
//!
//! ```rust,ignore
//! let engine = UpdateEngine::new(probe, runner).with_events(sink);
//! let results = engine.run(&agents, &RunOptions::default()).await;
//! let summary = summarize(&results, &[]);
//! ```

mod batcher;
mod classifier;
mod engine;
mod events;
mod resolver;
mod retry;
mod scheduler;
mod summary;

pub use batcher::{build_tasks, node_batch_command, node_update_command, Resolution, Task, TaskMember};
pub use classifier::{
    default_rules, is_npm_global_mutate, Classification, Classifier, FailureRule, Marker, Scope,
};
pub use engine::{RunOptions, UpdateEngine};
pub use events::{event_channel, EventSink};
pub use resolver::resolve;
pub use retry::{
    apply_failure, cleanup_npm_enotempty, extract_npm_rename_paths, format_retry_output,
    is_safe_npm_rename_target, run_update_command, UpdateRun, NPM_RETRY_MARKER,
};
pub use scheduler::{
    effective_concurrency, SchedulerOptions, BATCH_FALLBACK_HINT, BATCH_RETRY_MARKER,
};
pub use summary::{summarize, Summary};
