//! Per-run environment probe with single-flight lazy values

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::OnceCell;
use tracing::{debug, instrument};
use uca_core::fail_open::fail_open_or_default;
use uca_core::{Agent, ManagerKind, Result, UcaConfig, UcaError};
use uca_exec::{CommandOutput, CommandRunner};

use crate::listing::{
    parse_code_extensions, parse_npm_packages, parse_package_list_output, parse_pnpm_packages,
    parse_uv_tools,
};
use crate::locator::BinaryLocator;
use crate::paths::{bin_dir_has_binary, longest_unique_match, same_path};

/// Editor CLIs tried in order when looking for the extension manager
pub const EDITOR_CLI_CANDIDATES: [&str; 3] = ["code", "codium", "code-insiders"];

/// Timeouts applied to probe commands; `None` runs without a deadline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeTimeouts {
    /// Package lists and bin-dir queries
    pub detect: Option<Duration>,
    /// `--version` style probes
    pub version: Option<Duration>,
    /// Registry latest-tag lookups
    pub latest: Option<Duration>,
}

impl Default for ProbeTimeouts {
    fn default() -> Self {
        Self::from(&UcaConfig::default())
    }
}

impl From<&UcaConfig> for ProbeTimeouts {
    fn from(config: &UcaConfig) -> Self {
        Self {
            detect: config.detect_timeout(),
            version: config.version_timeout(),
            latest: config.latest_timeout(),
        }
    }
}

/// Lazily computed values keyed by string, each initialised at most once
struct KeyedOnce<T> {
    cells: Mutex<HashMap<String, Arc<OnceCell<T>>>>,
}

impl<T: Clone> KeyedOnce<T> {
    fn new() -> Self {
        Self {
            cells: Mutex::new(HashMap::new()),
        }
    }

    fn cell(&self, key: &str) -> Arc<OnceCell<T>> {
        // The guard only covers map insertion, so a poisoned map is still consistent
        let mut cells = self.cells.lock().unwrap_or_else(PoisonError::into_inner);
        cells.entry(key.to_string()).or_default().clone()
    }

    async fn get_or_init<F, Fut>(&self, key: &str, init: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = T>,
    {
        self.cell(key).get_or_init(init).await.clone()
    }
}

/// Per-node-manager lazy values
#[derive(Default)]
struct NodeCells {
    bin_dir: OnceCell<Option<PathBuf>>,
    packages: OnceCell<HashSet<String>>,
}

/// What this machine has installed, discovered lazily for one run
///
/// Manager presence is decided up front from the search path; everything
/// else is memoised on first use and shared across concurrent callers.
pub struct EnvironmentProbe {
    runner: Arc<dyn CommandRunner>,
    locator: Arc<dyn BinaryLocator>,
    timeouts: ProbeTimeouts,
    managers: HashSet<ManagerKind>,
    code_cmd: Option<String>,

    binary_paths: Mutex<HashMap<String, Option<PathBuf>>>,
    node: [NodeCells; 4],
    brew_formulas: KeyedOnce<bool>,
    pip_packages: KeyedOnce<bool>,
    uv_tools: OnceCell<HashSet<String>>,
    code_extensions: OnceCell<HashMap<String, String>>,
}

impl EnvironmentProbe {
    /// Detect available managers and build an empty probe
    pub fn detect(
        runner: Arc<dyn CommandRunner>,
        locator: Arc<dyn BinaryLocator>,
        timeouts: ProbeTimeouts,
    ) -> Self {
        let manager_binaries = [
            (ManagerKind::Npm, "npm"),
            (ManagerKind::Pnpm, "pnpm"),
            (ManagerKind::Yarn, "yarn"),
            (ManagerKind::Bun, "bun"),
            (ManagerKind::Brew, "brew"),
            (ManagerKind::Pip, "python3"),
            (ManagerKind::Uv, "uv"),
        ];
        let mut managers: HashSet<ManagerKind> = manager_binaries
            .into_iter()
            .filter(|(_, binary)| locator.locate(binary).is_some())
            .map(|(kind, _)| kind)
            .collect();

        let code_cmd = EDITOR_CLI_CANDIDATES
            .into_iter()
            .find(|candidate| locator.locate(candidate).is_some())
            .map(str::to_string);
        if code_cmd.is_some() {
            managers.insert(ManagerKind::VsCode);
        }

        debug!(?managers, ?code_cmd, "Detected package managers");

        Self {
            runner,
            locator,
            timeouts,
            managers,
            code_cmd,
            binary_paths: Mutex::new(HashMap::new()),
            node: Default::default(),
            brew_formulas: KeyedOnce::new(),
            pip_packages: KeyedOnce::new(),
            uv_tools: OnceCell::new(),
            code_extensions: OnceCell::new(),
        }
    }

    pub fn timeouts(&self) -> ProbeTimeouts {
        self.timeouts
    }

    pub(crate) fn runner(&self) -> &dyn CommandRunner {
        self.runner.as_ref()
    }

    /// Editor CLI used for extension queries and updates
    pub fn code_cmd(&self) -> Option<&str> {
        self.code_cmd.as_deref()
    }

    /// Whether the tooling behind `kind` is installed
    pub fn has_manager(&self, kind: ManagerKind) -> bool {
        kind == ManagerKind::Native || self.managers.contains(&kind)
    }

    /// Resolved path of a binary on the search path, cached per name
    pub fn binary_path(&self, name: &str) -> Option<PathBuf> {
        if name.is_empty() {
            return None;
        }
        let mut cache = self
            .binary_paths
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        cache
            .entry(name.to_string())
            .or_insert_with(|| {
                self.locator
                    .locate(name)
                    .map(|path| path.components().collect())
            })
            .clone()
    }

    pub fn has_binary(&self, name: &str) -> bool {
        self.binary_path(name).is_some()
    }

    async fn run_probe(&self, args: &[&str], timeout: Option<Duration>) -> CommandOutput {
        let args: Vec<String> = args.iter().map(|s| s.to_string()).collect();
        self.runner.run(&args, timeout).await
    }

    /// Run a probe and insist on a clean exit
    async fn run_checked(&self, args: &[&str]) -> Result<String> {
        let output = self.run_probe(args, self.timeouts.detect).await;
        if output.success() {
            Ok(output.stdout)
        } else {
            Err(UcaError::ProbeOutput {
                command: args.join(" "),
                message: format!("{:?}", output.exit),
            })
        }
    }

    fn node_cells(&self, kind: ManagerKind) -> Option<&NodeCells> {
        let slot = ManagerKind::NODE.iter().position(|k| *k == kind)?;
        self.node.get(slot)
    }

    /// Global bin directory of a node-family manager
    pub async fn node_bin_dir(&self, kind: ManagerKind) -> Option<PathBuf> {
        let cells = self.node_cells(kind)?;
        if !self.has_manager(kind) {
            return None;
        }
        cells
            .bin_dir
            .get_or_init(|| async {
                fail_open_or_default(&format!("{} bin dir", kind), self.load_bin_dir(kind)).await
            })
            .await
            .clone()
    }

    async fn load_bin_dir(&self, kind: ManagerKind) -> Result<Option<PathBuf>> {
        let args: &[&str] = match kind {
            ManagerKind::Npm => return self.load_npm_bin_dir().await,
            ManagerKind::Pnpm => &["pnpm", "bin", "-g"],
            ManagerKind::Yarn => &["yarn", "global", "bin"],
            ManagerKind::Bun => &["bun", "pm", "bin", "-g"],
            _ => return Ok(None),
        };
        let out = self.run_checked(args).await?;
        Ok(non_blank_path(&out))
    }

    async fn load_npm_bin_dir(&self) -> Result<Option<PathBuf>> {
        if let Ok(out) = self.run_checked(&["npm", "bin", "-g"]).await {
            if let Some(dir) = non_blank_path(&out) {
                return Ok(Some(dir));
            }
        }

        // Newer npm dropped `npm bin`; binaries live under the global prefix
        let out = self.run_checked(&["npm", "prefix", "-g"]).await?;
        let Some(prefix) = non_blank_path(&out) else {
            return Ok(None);
        };
        if cfg!(windows) {
            let bin = prefix.join("bin");
            return Ok(Some(if bin.is_dir() { bin } else { prefix }));
        }
        Ok(Some(prefix.join("bin")))
    }

    /// Globally installed packages of a node-family manager
    async fn node_packages(&self, kind: ManagerKind) -> HashSet<String> {
        let Some(cells) = self.node_cells(kind) else {
            return HashSet::new();
        };
        if !self.has_manager(kind) {
            return HashSet::new();
        }
        cells
            .packages
            .get_or_init(|| async {
                fail_open_or_default(&format!("{} package list", kind), self.load_node_packages(kind))
                    .await
            })
            .await
            .clone()
    }

    async fn load_node_packages(&self, kind: ManagerKind) -> Result<HashSet<String>> {
        match kind {
            // npm and pnpm exit non-zero on peer warnings but still print JSON
            ManagerKind::Npm => {
                let output = self
                    .run_probe(&["npm", "list", "-g", "--depth=0", "--json"], self.timeouts.detect)
                    .await;
                parse_npm_packages(&output.stdout)
            }
            ManagerKind::Pnpm => {
                let output = self
                    .run_probe(&["pnpm", "list", "-g", "--depth=0", "--json"], self.timeouts.detect)
                    .await;
                parse_pnpm_packages(&output.stdout)
            }
            ManagerKind::Yarn => {
                let out = self.run_checked(&["yarn", "global", "list", "--depth=0"]).await?;
                Ok(parse_package_list_output(&out))
            }
            ManagerKind::Bun => {
                let out = self.run_checked(&["bun", "pm", "ls", "-g"]).await?;
                Ok(parse_package_list_output(&out))
            }
            _ => Ok(HashSet::new()),
        }
    }

    pub async fn node_has_package(&self, kind: ManagerKind, package: &str) -> bool {
        self.node_packages(kind).await.contains(package)
    }

    /// Whether `kind`'s global bin directory holds a file named `binary`
    pub async fn node_bin_has_binary(&self, kind: ManagerKind, binary: &str) -> bool {
        match self.node_bin_dir(kind).await {
            Some(dir) => bin_dir_has_binary(&dir, binary),
            None => false,
        }
    }

    /// Node manager whose global bin directory holds the resolved binary
    ///
    /// Symlinked binaries also match on their target's directory. Several
    /// matches are settled by the longest bin dir; an exact tie yields `None`.
    #[instrument(skip(self))]
    pub async fn node_manager_for_binary(&self, binary: &str) -> Option<ManagerKind> {
        let bin_path = self.binary_path(binary)?;
        let bin_dir = bin_path.parent()?.to_path_buf();
        let resolved_dir = std::fs::canonicalize(&bin_path)
            .ok()
            .and_then(|p| p.parent().map(Path::to_path_buf));

        let mut matches = Vec::new();
        for kind in ManagerKind::NODE {
            let Some(dir) = self.node_bin_dir(kind).await else {
                continue;
            };
            let direct = same_path(&dir, &bin_dir);
            let via_link = resolved_dir
                .as_deref()
                .is_some_and(|resolved| same_path(&dir, resolved));
            if direct || via_link {
                matches.push((kind, dir));
            }
        }

        let winner = longest_unique_match(&matches);
        if winner.is_none() && matches.len() > 1 {
            debug!(?matches, "Ambiguous bin dir match for {}", binary);
        }
        winner
    }

    /// The only node manager listing `package`, if exactly one does
    pub async fn node_manager_for_package(&self, package: &str) -> Option<ManagerKind> {
        if package.is_empty() {
            return None;
        }
        let mut owners = Vec::new();
        for kind in ManagerKind::NODE {
            if self.has_manager(kind) && self.node_has_package(kind, package).await {
                owners.push(kind);
            }
        }
        match owners.as_slice() {
            [only] => Some(*only),
            _ => None,
        }
    }

    pub async fn brew_has(&self, formula: &str) -> bool {
        if !self.has_manager(ManagerKind::Brew) || formula.is_empty() {
            return false;
        }
        self.brew_formulas
            .get_or_init(formula, || async {
                let args = ["brew", "list", "--formula", "--versions", formula];
                match self.run_checked(&args).await {
                    Ok(out) => !out.trim().is_empty(),
                    Err(e) => {
                        debug!("{}", e);
                        false
                    }
                }
            })
            .await
    }

    pub async fn pip_has(&self, package: &str) -> bool {
        if !self.has_manager(ManagerKind::Pip) || package.is_empty() {
            return false;
        }
        self.pip_packages
            .get_or_init(package, || async {
                self.run_checked(&["python3", "-m", "pip", "show", package])
                    .await
                    .is_ok()
            })
            .await
    }

    pub async fn uv_has(&self, tool: &str) -> bool {
        if !self.has_manager(ManagerKind::Uv) {
            return false;
        }
        self.uv_tools
            .get_or_init(|| async {
                let output = self
                    .run_probe(&["uv", "tool", "list"], self.timeouts.detect)
                    .await;
                parse_uv_tools(&output.stdout)
            })
            .await
            .contains(tool)
    }

    async fn code_extensions(&self) -> &HashMap<String, String> {
        self.code_extensions
            .get_or_init(|| async {
                let Some(code) = self.code_cmd.as_deref() else {
                    return HashMap::new();
                };
                let args = [code, "--list-extensions", "--show-versions"];
                let output = self.run_probe(&args, self.timeouts.detect).await;
                debug!("{} listed {} extensions", code, output.stdout.lines().count());
                parse_code_extensions(&output.stdout)
            })
            .await
    }

    pub async fn vscode_has(&self, extension_id: &str) -> bool {
        self.code_extensions().await.contains_key(extension_id)
    }

    /// Installed version of an editor extension, if listed
    pub async fn vscode_version(&self, extension_id: &str) -> Option<String> {
        self.code_extensions()
            .await
            .get(extension_id)
            .filter(|v| !v.is_empty())
            .cloned()
    }

    /// Start computing lazy values in the background
    ///
    /// Later queries wait on the in-flight computation rather than repeat it.
    pub fn prewarm(self: &Arc<Self>, agents: &[Agent]) {
        for kind in ManagerKind::NODE {
            if !self.has_manager(kind) {
                continue;
            }
            let probe = Arc::clone(self);
            tokio::spawn(async move {
                probe.node_bin_dir(kind).await;
                probe.node_packages(kind).await;
            });
        }
        if self.has_manager(ManagerKind::Uv) {
            let probe = Arc::clone(self);
            tokio::spawn(async move {
                probe.uv_has("").await;
            });
        }
        if self.code_cmd.is_some() {
            let probe = Arc::clone(self);
            tokio::spawn(async move {
                probe.code_extensions().await;
            });
        }
        for agent in agents {
            if let Some(binary) = agent.binary_name() {
                self.binary_path(binary);
            }
        }
    }
}

fn non_blank_path(out: &str) -> Option<PathBuf> {
    let trimmed = out.trim();
    (!trimmed.is_empty()).then(|| PathBuf::from(trimmed))
}
