//! Plain-text report printed after a run
//!
//! Everything here is a pure function of the result array so the exact
//! wording can be tested without a terminal.

use std::time::Duration;

use uca_core::{AgentResult, Outcome, Status};
use uca_dashboard::safe_version;
use uca_orchestrator::Summary;

/// Output switches taken from the command line
#[derive(Debug, Clone, Copy, Default)]
pub struct OutputOptions {
    pub verbose: bool,
    pub explain: bool,
    pub dry_run: bool,
}

/// Whole seconds, rounded
pub fn fmt_duration(duration: Duration) -> String {
    format!("{}s", duration.as_secs_f64().round() as u64)
}

/// One line per agent, e.g. `amp: 0.0.17 -> 0.0.18 (3s)`
pub fn format_result(result: &AgentResult) -> String {
    let before = safe_version(&result.before);
    let after = safe_version(&result.after);
    let took = fmt_duration(result.duration);

    match &result.outcome {
        Some(Outcome::Skipped(reason)) => format!("{}: skipped ({})", result.agent, reason),
        Some(Outcome::Failed(reason)) => format!(
            "{}: failed ({}; {} -> {} ({}))",
            result.agent, reason, before, after, took
        ),
        Some(Outcome::Updated { dry_run: true }) if !result.command.is_empty() => {
            format!("{}: {}", result.agent, result.command)
        }
        Some(Outcome::Updated { .. }) => {
            format!("{}: {} -> {} ({})", result.agent, before, after, took)
        }
        Some(Outcome::Unchanged) => {
            format!("{}: unchanged {} -> {} ({})", result.agent, before, after, took)
        }
        None => format!("{}: unknown", result.agent),
    }
}

/// Per-agent lines for runs without the dashboard
pub fn result_lines(results: &[AgentResult], options: OutputOptions) -> Vec<String> {
    let mut lines = Vec::with_capacity(results.len());
    for result in results {
        lines.push(format_result(result));
        if options.explain && !result.explain.is_empty() {
            lines.push(format!("  info: {}", result.explain));
        }
    }
    lines
}

/// `name: explanation` lines, printed under the dashboard with `--explain`
pub fn explain_lines(results: &[AgentResult]) -> Vec<String> {
    results
        .iter()
        .filter(|result| !result.explain.is_empty())
        .map(|result| format!("{}: {}", result.agent, result.explain))
        .collect()
}

/// Agents sharing one command, status and log
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogGroup {
    pub agents: Vec<String>,
    pub log: String,
}

/// Logs worth showing: failures always, updates only when verbose
///
/// Agents of one batch share an identical log, so they collapse into one
/// group. Groups keep the order of their first agent.
pub fn log_groups(results: &[AgentResult], options: OutputOptions) -> Vec<LogGroup> {
    if options.dry_run {
        return Vec::new();
    }

    let mut keys: Vec<(String, Status, String)> = Vec::new();
    let mut groups: Vec<LogGroup> = Vec::new();

    for result in results {
        let Some(status) = result.status() else {
            continue;
        };
        let wanted = status == Status::Failed || (options.verbose && status == Status::Updated);
        if !wanted {
            continue;
        }

        let log = result.log.trim().to_string();
        let key = (result.command.clone(), status, log.clone());
        match keys.iter().position(|existing| *existing == key) {
            Some(pos) => groups[pos].agents.push(result.agent.clone()),
            None => {
                keys.push(key);
                groups.push(LogGroup {
                    agents: vec![result.agent.clone()],
                    log,
                });
            }
        }
    }

    groups
}

/// `==> a, b` headers followed by the log body
pub fn log_lines(groups: &[LogGroup]) -> Vec<String> {
    let mut lines = Vec::new();
    for group in groups {
        lines.push(format!("==> {}", group.agents.join(", ")));
        if group.log.is_empty() {
            lines.push("(no output)".to_string());
        } else {
            lines.extend(group.log.lines().map(str::to_string));
        }
        lines.push(String::new());
    }
    lines
}

/// Summary block, with a placeholder when nothing was selected
pub fn summary_lines(summary: &Summary) -> Vec<String> {
    let lines = summary.lines();
    if lines.is_empty() {
        return vec!["nothing to update".to_string()];
    }
    lines
}
