//! Per-agent install-method resolution
//!
//! Each strategy is judged on its own by a total match over its kind; the
//! first usable strategy in declared order wins. When none is usable the
//! recorded blockers decide the skip reason.

use tracing::debug;
use uca_core::{Agent, ManagerKind, ResolvedUpdate, SkipReason, UpdateStrategy};
use uca_probe::EnvironmentProbe;

use crate::batcher::node_update_command;

/// Why a strategy could not be used
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Blocker {
    /// The manager itself is not installed
    Manager(ManagerKind),
    /// No editor CLI on the search path
    EditorCli,
}

/// Judgement on one strategy
#[derive(Debug, Clone, PartialEq, Eq)]
enum Verdict {
    Use {
        command: Vec<String>,
        explanation: String,
    },
    Blocked(Blocker),
    NoMatch,
}

impl Verdict {
    fn use_if(usable: bool, command: Vec<String>, explanation: String) -> Self {
        if usable && !command.is_empty() {
            Self::Use {
                command,
                explanation,
            }
        } else {
            Self::NoMatch
        }
    }
}

/// Node-family ownership evidence gathered once per agent
#[derive(Debug, Clone, Copy, Default)]
struct NodeEvidence {
    /// Manager whose global bin dir holds the agent's binary
    by_bin_dir: Option<ManagerKind>,
    /// Sole manager listing the agent's package (only when no bin-dir match)
    by_package: Option<ManagerKind>,
}

async fn gather_node_evidence(agent: &Agent, probe: &EnvironmentProbe) -> NodeEvidence {
    let by_bin_dir = match agent.binary_name() {
        Some(binary) => probe.node_manager_for_binary(binary).await,
        None => None,
    };
    let by_package = match (by_bin_dir, agent.node_package()) {
        (None, Some(package)) => probe.node_manager_for_package(package).await,
        _ => None,
    };
    NodeEvidence {
        by_bin_dir,
        by_package,
    }
}

/// Explicit strategy command, or the manager's default for `package`
fn package_command(strategy: &UpdateStrategy, default: &[&str], package: &str) -> Vec<String> {
    if !strategy.command.is_empty() {
        return strategy.command.clone();
    }
    default
        .iter()
        .map(|s| s.to_string())
        .chain(std::iter::once(package.to_string()))
        .collect()
}

async fn evaluate(
    agent: &Agent,
    strategy: &UpdateStrategy,
    probe: &EnvironmentProbe,
    evidence: NodeEvidence,
) -> Verdict {
    let kind = strategy.kind;
    let binary = agent.binary_name();

    match kind {
        ManagerKind::Native => {
            let present = binary.map_or(true, |b| probe.has_binary(b));
            let explanation = match binary {
                Some(b) => format!("binary {} found; using built-in update", b),
                None => "no binary required; using built-in update".to_string(),
            };
            Verdict::use_if(present, strategy.command.clone(), explanation)
        }

        ManagerKind::Npm | ManagerKind::Pnpm | ManagerKind::Yarn | ManagerKind::Bun => {
            if !probe.has_manager(kind) {
                return Verdict::Blocked(Blocker::Manager(kind));
            }
            let (Some(binary), Some(package)) = (binary, strategy.package_name()) else {
                return Verdict::NoMatch;
            };
            let command = node_update_command(strategy).unwrap_or_default();
            let by_bin_dir = format!(
                "{kind} global bin has {binary}; matched by bin dir; updating via {kind}"
            );

            if let Some(owner) = evidence.by_bin_dir {
                return Verdict::use_if(owner == kind, command, by_bin_dir);
            }
            if let Some(owner) = evidence.by_package {
                let explanation = format!(
                    "{kind} global package {package} installed; matched by package list; updating via {kind}"
                );
                return Verdict::use_if(owner == kind, command, explanation);
            }
            let in_bin_dir = probe.node_bin_has_binary(kind, binary).await;
            Verdict::use_if(in_bin_dir, command, by_bin_dir)
        }

        ManagerKind::Brew => {
            if !probe.has_manager(kind) {
                return Verdict::Blocked(Blocker::Manager(kind));
            }
            let Some(formula) = strategy.package_name() else {
                return Verdict::NoMatch;
            };
            Verdict::use_if(
                probe.brew_has(formula).await,
                package_command(strategy, &["brew", "upgrade"], formula),
                format!("brew formula {} installed", formula),
            )
        }

        ManagerKind::Pip => {
            if !probe.has_manager(kind) {
                return Verdict::Blocked(Blocker::Manager(kind));
            }
            let Some(package) = strategy.package_name() else {
                return Verdict::NoMatch;
            };
            Verdict::use_if(
                probe.pip_has(package).await,
                package_command(
                    strategy,
                    &["python3", "-m", "pip", "install", "-U", "--upgrade-strategy", "only-if-needed"],
                    package,
                ),
                format!("pip package {} installed", package),
            )
        }

        ManagerKind::Uv => {
            if !probe.has_manager(kind) {
                return Verdict::Blocked(Blocker::Manager(kind));
            }
            let Some(tool) = strategy.package_name() else {
                return Verdict::NoMatch;
            };
            Verdict::use_if(
                probe.uv_has(tool).await,
                package_command(
                    strategy,
                    &["uv", "tool", "install", "--force", "--python", "python3.12", "--with", "pip"],
                    &format!("{}@latest", tool),
                ),
                format!("uv tool {} installed", tool),
            )
        }

        ManagerKind::VsCode => {
            let Some(code) = probe.code_cmd() else {
                return Verdict::Blocked(Blocker::EditorCli);
            };
            let Some(extension) = strategy.extension_id.as_deref().filter(|e| !e.is_empty())
            else {
                return Verdict::NoMatch;
            };
            let command = if strategy.command.is_empty() {
                vec![
                    code.to_string(),
                    "--install-extension".to_string(),
                    extension.to_string(),
                    "--force".to_string(),
                ]
            } else {
                strategy.command.clone()
            };
            Verdict::use_if(
                probe.vscode_has(extension).await,
                command,
                format!("VS Code extension {} installed (via {})", extension, code),
            )
        }
    }
}

fn skip(reason: SkipReason, explanation: &str) -> ResolvedUpdate {
    ResolvedUpdate::Skip {
        reason,
        explanation: explanation.to_string(),
    }
}

/// Skip reason once every strategy has been rejected
fn fallback(agent: &Agent, probe: &EnvironmentProbe, blockers: &[Blocker]) -> ResolvedUpdate {
    let binary_present = agent.binary_name().is_some_and(|b| probe.has_binary(b));

    if !blockers.is_empty() && blockers.iter().all(|b| *b == Blocker::EditorCli) {
        return skip(
            SkipReason::MissingEditorCli,
            "VS Code CLI not found (code/codium/code-insiders)",
        );
    }
    if binary_present {
        return skip(
            SkipReason::ManualInstall,
            "binary found but no supported install method detected",
        );
    }
    // A binary-less agent blocked only by absent managers needs one of them
    if agent.binary_name().is_none() && blockers.len() == agent.strategies.len() {
        if let Some(Blocker::Manager(kind)) = blockers.first() {
            if blockers.iter().all(|b| matches!(b, Blocker::Manager(_))) {
                return skip(
                    SkipReason::MissingManager(*kind),
                    &format!("{} not found; required to update {}", kind, agent.name),
                );
            }
        }
    }
    skip(
        SkipReason::Missing,
        "no supported binary or install method detected",
    )
}

/// Pick exactly one update method for `agent`, or a skip reason
///
/// Pure with respect to the probe: resolving twice against the same probe
/// yields the same answer.
pub async fn resolve(agent: &Agent, probe: &EnvironmentProbe) -> ResolvedUpdate {
    let evidence = gather_node_evidence(agent, probe).await;
    let mut blockers = Vec::new();

    for strategy in &agent.strategies {
        match evaluate(agent, strategy, probe, evidence).await {
            Verdict::Use {
                command,
                explanation,
            } => {
                debug!(agent = %agent.name, kind = %strategy.kind, "{}", explanation);
                return ResolvedUpdate::Update {
                    command,
                    kind: strategy.kind,
                    explanation,
                };
            }
            Verdict::Blocked(blocker) => blockers.push(blocker),
            Verdict::NoMatch => {}
        }
    }

    let resolved = fallback(agent, probe, &blockers);
    debug!(agent = %agent.name, "{}", resolved.explanation());
    resolved
}
