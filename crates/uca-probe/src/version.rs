//! Installed and latest version lookups

use regex::Regex;
use std::sync::LazyLock;

use uca_core::{Agent, ManagerKind, UNKNOWN_VERSION};

use crate::probe::EnvironmentProbe;

/// First semver-looking token in a version string
static SEMVER_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bv?\d+\.\d+(?:\.\d+)?(?:-[0-9a-z.-]+)?(?:\+[0-9a-z.-]+)?\b")
        .expect("constant regex pattern is valid")
});

/// Pick the version out of `--version` output
///
/// The last line that is only a version wins; otherwise the first non-blank
/// line is returned verbatim.
pub fn parse_version_output(out: &str) -> String {
    let lines: Vec<&str> = out
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect();
    lines
        .iter()
        .rev()
        .find(|line| is_version_only_line(line))
        .or_else(|| lines.first())
        .map(|line| line.to_string())
        .unwrap_or_else(|| UNKNOWN_VERSION.to_string())
}

/// `1.2`, `v1.2.3`, `10.0.0.1`: digits only, at least two components
pub fn is_version_only_line(line: &str) -> bool {
    if line.contains([' ', '\t']) {
        return false;
    }
    let line = line.strip_prefix('v').unwrap_or(line);
    let parts: Vec<&str> = line.split('.').collect();
    parts.len() >= 2
        && parts
            .iter()
            .all(|part| !part.is_empty() && part.chars().all(|c| c.is_ascii_digit()))
}

/// Splice `new_version` into `before` in place of its first version token
///
/// Keeps surrounding text (e.g. `codex-cli 0.1.0`) and a leading `v`.
/// Returns `None` for a blank `new_version`.
pub fn format_version_with_token(before: &str, new_version: &str) -> Option<String> {
    let new_version = new_version.trim();
    if new_version.is_empty() {
        return None;
    }
    let before = before.trim();
    if before.is_empty() || before == UNKNOWN_VERSION {
        return Some(new_version.to_string());
    }
    let Some(token) = SEMVER_TOKEN.find(before) else {
        return Some(new_version.to_string());
    };
    let token = token.as_str();
    let replacement = if token.starts_with('v') && !new_version.starts_with('v') {
        format!("v{}", new_version)
    } else {
        new_version.to_string()
    };
    Some(before.replacen(token, &replacement, 1))
}

impl EnvironmentProbe {
    /// Currently installed version of `agent`, or `unknown`
    ///
    /// Editor extensions prefer the editor's own listing when that is the
    /// update method.
    pub async fn version(&self, agent: &Agent, method: Option<ManagerKind>) -> String {
        let extension = agent.extension_id.as_deref().filter(|id| !id.is_empty());

        if method == Some(ManagerKind::VsCode) {
            if let Some(version) = self.extension_version(extension).await {
                return version;
            }
        }

        let runnable = agent.binary_name().map_or(true, |b| self.has_binary(b));
        if !agent.version_cmd.is_empty() && runnable {
            let output = self
                .runner()
                .run(&agent.version_cmd, self.timeouts().version)
                .await;
            if !output.success() {
                return UNKNOWN_VERSION.to_string();
            }
            return parse_version_output(&output.combined);
        }

        self.extension_version(extension)
            .await
            .unwrap_or_else(|| UNKNOWN_VERSION.to_string())
    }

    async fn extension_version(&self, extension: Option<&str>) -> Option<String> {
        self.vscode_version(extension?).await
    }

    /// Registry `latest` tag of a node package, for dry-run previews
    pub async fn node_latest_version(&self, kind: ManagerKind, package: &str) -> Option<String> {
        let package = package.trim();
        if package.is_empty() {
            return None;
        }
        let args: Vec<&str> = match kind {
            ManagerKind::Npm => vec!["npm", "view", package, "dist-tags.latest"],
            ManagerKind::Pnpm => vec!["pnpm", "view", package, "dist-tags.latest", "--silent"],
            ManagerKind::Yarn => vec!["yarn", "info", package, "dist-tags.latest", "--silent"],
            // `bun info` only works outside a project with -g
            ManagerKind::Bun => vec!["bun", "info", "-g", package, "version", "--json"],
            _ => return None,
        };
        let args: Vec<String> = args.into_iter().map(str::to_string).collect();

        let output = self
            .runner()
            .run(&args, self.timeouts().latest)
            .await;
        if !output.success() {
            return None;
        }
        let latest = output
            .stdout
            .trim()
            .trim_matches(|c| c == '"' || c == '\'')
            .trim();
        (!latest.is_empty()).then(|| latest.to_string())
    }
}
