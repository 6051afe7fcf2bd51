//! Core type definitions for uca

use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Version string reported when no version could be determined
pub const UNKNOWN_VERSION: &str = "unknown";

/// Install mechanism an update strategy relies on
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ManagerKind {
    /// The agent's own self-update command
    Native,
    Npm,
    Pnpm,
    Yarn,
    Bun,
    /// Homebrew
    Brew,
    Pip,
    Uv,
    /// VS Code extension manager
    #[serde(rename = "vscode")]
    VsCode,
}

impl ManagerKind {
    /// Node-style global package managers, in detection order
    pub const NODE: [ManagerKind; 4] = [Self::Npm, Self::Pnpm, Self::Yarn, Self::Bun];

    /// Whether this is a node-style global package manager
    pub fn is_node(self) -> bool {
        matches!(self, Self::Npm | Self::Pnpm | Self::Yarn | Self::Bun)
    }

    /// Whether two commands of this kind must never run at the same time
    ///
    /// Every kind that mutates shared global state is serialized.
    pub fn requires_lock(self) -> bool {
        !matches!(self, Self::Native)
    }

    /// Short label used in explanations and the dashboard
    pub fn label(self) -> &'static str {
        match self {
            Self::Native => "native",
            Self::Npm => "npm",
            Self::Pnpm => "pnpm",
            Self::Yarn => "yarn",
            Self::Bun => "bun",
            Self::Brew => "brew",
            Self::Pip => "pip",
            Self::Uv => "uv",
            Self::VsCode => "vscode",
        }
    }
}

impl std::fmt::Display for ManagerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

impl std::str::FromStr for ManagerKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "native" => Ok(Self::Native),
            "npm" => Ok(Self::Npm),
            "pnpm" => Ok(Self::Pnpm),
            "yarn" => Ok(Self::Yarn),
            "bun" => Ok(Self::Bun),
            "brew" | "homebrew" => Ok(Self::Brew),
            "pip" => Ok(Self::Pip),
            "uv" => Ok(Self::Uv),
            "vscode" | "code" => Ok(Self::VsCode),
            _ => Err(format!("Invalid manager kind: {}", s)),
        }
    }
}

/// One candidate method by which an agent might be updated
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateStrategy {
    pub kind: ManagerKind,
    /// Explicit command line; empty means "derive from kind and package"
    #[serde(default)]
    pub command: Vec<String>,
    /// Package/formula/tool name managed by `kind`
    #[serde(default)]
    pub package: Option<String>,
    /// Editor extension identifier (VS Code strategies only)
    #[serde(default)]
    pub extension_id: Option<String>,
}

impl UpdateStrategy {
    pub fn native<I, S>(command: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            kind: ManagerKind::Native,
            command: command.into_iter().map(Into::into).collect(),
            package: None,
            extension_id: None,
        }
    }

    pub fn package(kind: ManagerKind, package: impl Into<String>) -> Self {
        Self {
            kind,
            command: Vec::new(),
            package: Some(package.into()),
            extension_id: None,
        }
    }

    pub fn vscode(extension_id: impl Into<String>) -> Self {
        Self {
            kind: ManagerKind::VsCode,
            command: Vec::new(),
            package: None,
            extension_id: Some(extension_id.into()),
        }
    }

    pub fn with_command<I, S>(mut self, command: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.command = command.into_iter().map(Into::into).collect();
        self
    }

    /// Declared package name, if non-blank
    pub fn package_name(&self) -> Option<&str> {
        self.package.as_deref().map(str::trim).filter(|p| !p.is_empty())
    }
}

/// A third-party CLI tool uca knows how to detect and update
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Agent {
    /// Unique, lowercase catalog key
    pub name: String,
    /// Binary to look for on the search path
    #[serde(default)]
    pub binary: Option<String>,
    /// Command printing the installed version
    #[serde(default)]
    pub version_cmd: Vec<String>,
    /// Candidate strategies, highest priority first
    #[serde(default)]
    pub strategies: Vec<UpdateStrategy>,
    /// Editor extension identifier, used for version lookups
    #[serde(default)]
    pub extension_id: Option<String>,
}

impl Agent {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            binary: None,
            version_cmd: Vec::new(),
            strategies: Vec::new(),
            extension_id: None,
        }
    }

    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = Some(binary.into());
        self
    }

    pub fn with_version_cmd<I, S>(mut self, command: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.version_cmd = command.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_strategy(mut self, strategy: UpdateStrategy) -> Self {
        self.strategies.push(strategy);
        self
    }

    pub fn with_extension(mut self, extension_id: impl Into<String>) -> Self {
        self.extension_id = Some(extension_id.into());
        self
    }

    /// Binary name, if the agent declares a non-blank one
    pub fn binary_name(&self) -> Option<&str> {
        self.binary.as_deref().filter(|b| !b.is_empty())
    }

    /// First package name declared by a node-family strategy
    pub fn node_package(&self) -> Option<&str> {
        self.strategies
            .iter()
            .filter(|s| s.kind.is_node())
            .find_map(UpdateStrategy::package_name)
    }
}

/// Why an agent was not updated at detection time (closed set)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SkipReason {
    /// Binary absent entirely
    Missing,
    /// Every strategy needs a manager that is not installed
    MissingManager(ManagerKind),
    /// Binary present but no supported manager owns it
    ManualInstall,
    /// Editor-extension strategy blocked by a missing editor CLI
    MissingEditorCli,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Missing => write!(f, "missing"),
            Self::MissingManager(kind) => write!(f, "missing {}", kind),
            Self::ManualInstall => write!(f, "manual install"),
            Self::MissingEditorCli => write!(f, "missing vscode"),
        }
    }
}

/// Why an update command failed
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FailureReason {
    Quota,
    NpmNotEmpty,
    Permission,
    Network,
    Tls,
    BrewBusy,
    /// Command exceeded the per-command timeout
    Timeout,
    /// Run-scoped cancellation stopped the command
    Canceled,
    /// No classification matched; carries the exit code
    Exit(i32),
}

impl FailureReason {
    /// Content-classified reasons, in classifier priority order
    pub const CLASSIFIED: [FailureReason; 6] = [
        Self::Quota,
        Self::NpmNotEmpty,
        Self::Permission,
        Self::Network,
        Self::Tls,
        Self::BrewBusy,
    ];

    /// Parse a reason tag as written in configuration files
    pub fn from_tag(tag: &str) -> Option<Self> {
        let tag = tag.trim().to_lowercase();
        Self::CLASSIFIED
            .into_iter()
            .find(|reason| reason.to_string().to_lowercase() == tag)
    }
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Quota => write!(f, "quota"),
            Self::NpmNotEmpty => write!(f, "npm ENOTEMPTY"),
            Self::Permission => write!(f, "permission"),
            Self::Network => write!(f, "network"),
            Self::Tls => write!(f, "tls"),
            Self::BrewBusy => write!(f, "brew busy"),
            Self::Timeout => write!(f, "timeout"),
            Self::Canceled => write!(f, "canceled"),
            Self::Exit(code) => write!(f, "exit {}", code),
        }
    }
}

/// Final per-agent status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Updated,
    Unchanged,
    Failed,
    Skipped,
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Updated => write!(f, "updated"),
            Self::Unchanged => write!(f, "unchanged"),
            Self::Failed => write!(f, "failed"),
            Self::Skipped => write!(f, "skipped"),
        }
    }
}

/// Final outcome of one agent, carrying its reason where one applies
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Update ran (or would run, for dry-run) and the version moved or is unknown
    Updated { dry_run: bool },
    Unchanged,
    Skipped(SkipReason),
    Failed(FailureReason),
}

impl Outcome {
    pub fn status(&self) -> Status {
        match self {
            Self::Updated { .. } => Status::Updated,
            Self::Unchanged => Status::Unchanged,
            Self::Skipped(_) => Status::Skipped,
            Self::Failed(_) => Status::Failed,
        }
    }

    /// Human-readable reason, e.g. `manual install` or `exit 1`
    pub fn reason(&self) -> Option<String> {
        match self {
            Self::Updated { dry_run: true } => Some("dry-run".to_string()),
            Self::Updated { dry_run: false } | Self::Unchanged => None,
            Self::Skipped(reason) => Some(reason.to_string()),
            Self::Failed(reason) => Some(reason.to_string()),
        }
    }

    pub fn is_dry_run(&self) -> bool {
        matches!(self, Self::Updated { dry_run: true })
    }
}

/// Resolution of one agent against the environment probe
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedUpdate {
    /// A usable strategy was found
    Update {
        command: Vec<String>,
        kind: ManagerKind,
        explanation: String,
    },
    /// Nothing usable, with the closed-set reason
    Skip {
        reason: SkipReason,
        explanation: String,
    },
}

impl ResolvedUpdate {
    pub fn explanation(&self) -> &str {
        match self {
            Self::Update { explanation, .. } | Self::Skip { explanation, .. } => explanation,
        }
    }

    pub fn kind(&self) -> Option<ManagerKind> {
        match self {
            Self::Update { kind, .. } => Some(*kind),
            Self::Skip { .. } => None,
        }
    }

    pub fn command(&self) -> Option<&[String]> {
        match self {
            Self::Update { command, .. } => Some(command),
            Self::Skip { .. } => None,
        }
    }

    pub fn skip_reason(&self) -> Option<SkipReason> {
        match self {
            Self::Update { .. } => None,
            Self::Skip { reason, .. } => Some(*reason),
        }
    }

    /// Whether the agent deserves a dashboard row
    ///
    /// Agents with a real update path and known manual installs are shown;
    /// everything else only appears in the textual summary.
    pub fn is_visible(&self) -> bool {
        match self {
            Self::Update { .. } => true,
            Self::Skip { reason, .. } => *reason == SkipReason::ManualInstall,
        }
    }
}

/// Per-agent result, written exactly once per run
///
/// Snapshots published with `detect` and `start` events carry no outcome yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentResult {
    pub agent: String,
    pub outcome: Option<Outcome>,
    pub before: String,
    pub after: String,
    pub duration: Duration,
    /// Combined captured output of the update command(s)
    pub log: String,
    /// Command that ran (or would run) for this agent, display form
    pub command: String,
    pub method: Option<ManagerKind>,
    /// Detection explanation plus any appended hints
    pub explain: String,
}

impl AgentResult {
    pub fn new(agent: impl Into<String>) -> Self {
        Self {
            agent: agent.into(),
            outcome: None,
            before: String::new(),
            after: String::new(),
            duration: Duration::ZERO,
            log: String::new(),
            command: String::new(),
            method: None,
            explain: String::new(),
        }
    }

    pub fn status(&self) -> Option<Status> {
        self.outcome.as_ref().map(Outcome::status)
    }

    pub fn reason(&self) -> Option<String> {
        self.outcome.as_ref().and_then(Outcome::reason)
    }

    pub fn is_failed(&self) -> bool {
        self.status() == Some(Status::Failed)
    }

    /// Append `hint: ...` to the explanation
    pub fn push_hint(&mut self, hint: &str) {
        self.explain = append_hint(&self.explain, hint);
    }
}

/// Join a hint onto an explanation as `detail; hint: ...`
pub fn append_hint(detail: &str, hint: &str) -> String {
    let hint = hint.trim();
    if hint.is_empty() {
        return detail.to_string();
    }
    if detail.trim().is_empty() {
        return format!("hint: {}", hint);
    }
    format!("{}; hint: {}", detail, hint)
}

/// Lifecycle phase of one agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Phase {
    /// Resolution finished
    Detect,
    /// A child process is about to run
    Start,
    /// Result is final
    Finish,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Detect => write!(f, "detect"),
            Self::Start => write!(f, "start"),
            Self::Finish => write!(f, "finish"),
        }
    }
}

/// One entry of the event stream consumed by the presentation layer
#[derive(Debug, Clone)]
pub struct UpdateEvent {
    /// Slot of the agent in the selected list
    pub index: usize,
    pub phase: Phase,
    pub result: AgentResult,
    pub at: Instant,
    /// Whether the agent gets a dashboard row
    pub visible: bool,
}
