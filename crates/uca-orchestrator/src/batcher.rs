//! Grouping of resolved updates into executable tasks

use std::collections::{BTreeMap, BTreeSet};

use uca_core::{Agent, ManagerKind, ResolvedUpdate, UpdateStrategy};

/// Resolution of one selected agent
#[derive(Debug, Clone)]
pub struct Resolution {
    /// Slot in the selected agent list
    pub index: usize,
    pub agent: Agent,
    pub update: ResolvedUpdate,
}

/// An agent covered by a task
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskMember {
    pub index: usize,
    pub agent: Agent,
    /// Command updating this agent alone (batch fallback)
    pub single_command: Vec<String>,
    pub explain: String,
    pub visible: bool,
}

/// One schedulable unit of execution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    pub kind: ManagerKind,
    pub command: Vec<String>,
    pub members: Vec<TaskMember>,
}

impl Task {
    pub fn is_batch(&self) -> bool {
        self.members.len() > 1
    }
}

fn node_install_prefix(kind: ManagerKind) -> Option<&'static [&'static str]> {
    match kind {
        ManagerKind::Npm => Some(&["npm", "install", "-g"]),
        ManagerKind::Pnpm => Some(&["pnpm", "add", "-g"]),
        ManagerKind::Yarn => Some(&["yarn", "global", "add"]),
        ManagerKind::Bun => Some(&["bun", "add", "-g"]),
        _ => None,
    }
}

/// `<manager> install P1@latest P2@latest ...`
///
/// Always installs `@latest`; plain `npm update -g` can stay on an old
/// minor or prerelease.
pub fn node_batch_command<'a>(
    kind: ManagerKind,
    packages: impl IntoIterator<Item = &'a str>,
) -> Option<Vec<String>> {
    let prefix = node_install_prefix(kind)?;
    let mut command: Vec<String> = prefix.iter().map(|s| s.to_string()).collect();
    command.extend(
        packages
            .into_iter()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(|p| format!("{}@latest", p)),
    );
    Some(command)
}

/// Single-agent command for a node-family strategy
pub fn node_update_command(strategy: &UpdateStrategy) -> Option<Vec<String>> {
    if !strategy.command.is_empty() {
        return Some(strategy.command.clone());
    }
    let package = strategy.package_name()?;
    node_batch_command(strategy.kind, [package])
}

/// Build tasks from resolutions
///
/// Node-family updates with a package name are merged per manager into one
/// command listing each distinct package once, sorted. Everything else runs
/// as a singleton. Skipped agents produce no task.
pub fn build_tasks(resolutions: &[Resolution]) -> Vec<Task> {
    let mut tasks = Vec::new();
    let mut groups: BTreeMap<ManagerKind, Vec<(TaskMember, String)>> = BTreeMap::new();

    for resolution in resolutions {
        let ResolvedUpdate::Update {
            command,
            kind,
            explanation,
        } = &resolution.update
        else {
            continue;
        };
        let member = TaskMember {
            index: resolution.index,
            agent: resolution.agent.clone(),
            single_command: command.clone(),
            explain: explanation.clone(),
            visible: resolution.update.is_visible(),
        };

        match resolution.agent.node_package().filter(|_| kind.is_node()) {
            Some(package) => groups
                .entry(*kind)
                .or_default()
                .push((member, package.to_string())),
            None => tasks.push(Task {
                kind: *kind,
                command: command.clone(),
                members: vec![member],
            }),
        }
    }

    for (kind, entries) in groups {
        let packages: BTreeSet<&str> = entries.iter().map(|(_, p)| p.as_str()).collect();
        let Some(command) = node_batch_command(kind, packages) else {
            continue;
        };
        tasks.push(Task {
            kind,
            command,
            members: entries.into_iter().map(|(member, _)| member).collect(),
        });
    }

    tasks
}
