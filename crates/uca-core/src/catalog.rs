//! Built-in agent catalog and `--only`/`--skip` selection

use std::collections::{BTreeSet, HashSet};

use crate::{Agent, ManagerKind, UpdateStrategy};

/// Strategies for every node-family manager, in detection order
fn node_strategies(package: &str) -> impl Iterator<Item = UpdateStrategy> + '_ {
    ManagerKind::NODE
        .into_iter()
        .map(move |kind| UpdateStrategy::package(kind, package))
}

fn with_node(mut agent: Agent, package: &str) -> Agent {
    agent.strategies.extend(node_strategies(package));
    agent
}

/// The built-in catalog of supported agents, in display order
pub fn default_agents() -> Vec<Agent> {
    vec![
        Agent::new("amp")
            .with_binary("amp")
            .with_version_cmd(["amp", "--version"])
            .with_strategy(UpdateStrategy::native(["amp", "update"])),
        Agent::new("claude")
            .with_binary("claude")
            .with_version_cmd(["claude", "--version"])
            .with_strategy(UpdateStrategy::native(["claude", "update"])),
        with_node(
            Agent::new("codex")
                .with_binary("codex")
                .with_version_cmd(["codex", "--version"]),
            "@openai/codex",
        )
        .with_strategy(UpdateStrategy::package(ManagerKind::Brew, "codex")),
        with_node(
            Agent::new("gemini")
                .with_binary("gemini")
                .with_version_cmd(["gemini", "--version"]),
            "@google/gemini-cli",
        )
        .with_strategy(UpdateStrategy::package(ManagerKind::Brew, "gemini-cli")),
        with_node(
            Agent::new("opencode")
                .with_binary("opencode")
                .with_version_cmd(["opencode", "--version"]),
            "opencode-ai",
        )
        .with_strategy(UpdateStrategy::package(ManagerKind::Brew, "opencode"))
        .with_strategy(UpdateStrategy::native(["opencode", "upgrade"])),
        with_node(
            Agent::new("copilot")
                .with_binary("copilot")
                .with_version_cmd(["copilot", "--version"]),
            "@github/copilot",
        ),
        with_node(
            Agent::new("qwen")
                .with_binary("qwen")
                .with_version_cmd(["qwen", "--version"]),
            "@qwen-code/qwen-code",
        ),
        with_node(
            Agent::new("crush")
                .with_binary("crush")
                .with_version_cmd(["crush", "--version"])
                .with_strategy(UpdateStrategy::package(
                    ManagerKind::Brew,
                    "charmbracelet/tap/crush",
                )),
            "@charmland/crush",
        ),
        Agent::new("goose")
            .with_binary("goose")
            .with_version_cmd(["goose", "--version"])
            .with_strategy(UpdateStrategy::native(["goose", "update"])),
        Agent::new("aider")
            .with_binary("aider")
            .with_version_cmd(["aider", "--version"])
            .with_strategy(UpdateStrategy::package(ManagerKind::Uv, "aider-chat"))
            .with_strategy(UpdateStrategy::package(ManagerKind::Pip, "aider-chat")),
        Agent::new("cline")
            .with_extension("saoudrizwan.claude-dev")
            .with_strategy(UpdateStrategy::vscode("saoudrizwan.claude-dev")),
        Agent::new("continue")
            .with_extension("Continue.continue")
            .with_strategy(UpdateStrategy::vscode("Continue.continue")),
    ]
}

/// Parse a comma-separated, case-insensitive agent list
pub fn parse_list(raw: &str) -> HashSet<String> {
    raw.split(',')
        .map(|part| part.trim().to_lowercase())
        .filter(|name| !name.is_empty())
        .collect()
}

/// Agents chosen for a run plus names that matched nothing
#[derive(Debug, Clone, Default)]
pub struct Selection {
    /// Selected agents in catalog order
    pub agents: Vec<Agent>,
    /// Requested names absent from the catalog, sorted
    pub unknown: Vec<String>,
}

/// Apply `--only` and `--skip` lists to the catalog
pub fn select_agents(all: &[Agent], only: &str, skip: &str) -> Selection {
    let only = parse_list(only);
    let skip = parse_list(skip);

    let known: HashSet<&str> = all.iter().map(|a| a.name.as_str()).collect();
    let unknown: BTreeSet<String> = only
        .iter()
        .chain(skip.iter())
        .filter(|name| !known.contains(name.as_str()))
        .cloned()
        .collect();

    let agents = all
        .iter()
        .filter(|agent| only.is_empty() || only.contains(&agent.name))
        .filter(|agent| !skip.contains(&agent.name))
        .cloned()
        .collect();

    Selection {
        agents,
        unknown: unknown.into_iter().collect(),
    }
}
