//! Configuration management for uca
//!
//! Settings come from an optional TOML file; command-line flags override them.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::{FailureReason, Result, UcaError};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV: &str = "UCA_CONFIG";

/// User-level uca configuration
///
/// Loaded from `<config_dir>/uca/config.toml` unless another path is given.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UcaConfig {
    /// Per update command timeout in seconds (0 disables)
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Maximum concurrent update commands (0 means unlimited)
    #[serde(default)]
    pub concurrency: usize,

    /// Timeout for detection queries (package lists, bin dirs)
    #[serde(default = "default_detect_timeout_secs")]
    pub detect_timeout_secs: u64,

    /// Timeout for `--version` style probes
    #[serde(default = "default_version_timeout_secs")]
    pub version_timeout_secs: u64,

    /// Timeout for registry "latest version" lookups in dry-run mode
    #[serde(default = "default_latest_timeout_secs")]
    pub latest_timeout_secs: u64,

    /// Failure classifier extensions
    #[serde(default)]
    pub classifier: ClassifierConfig,
}

/// Extra output markers for the failure classifier
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifierConfig {
    /// Reason tag (e.g. `network`) to additional case-insensitive substrings
    #[serde(default)]
    pub extra_markers: BTreeMap<String, Vec<String>>,
}

impl ClassifierConfig {
    /// Extra markers keyed by reason, ignoring tags that name no classified reason
    pub fn markers(&self) -> Vec<(FailureReason, Vec<String>)> {
        self.extra_markers
            .iter()
            .filter_map(|(tag, markers)| match FailureReason::from_tag(tag) {
                Some(reason) => Some((reason, markers.clone())),
                None => {
                    tracing::warn!("Ignoring classifier markers for unknown reason {:?}", tag);
                    None
                }
            })
            .collect()
    }
}

// Default value providers
fn default_timeout_secs() -> u64 {
    15 * 60
}

fn default_detect_timeout_secs() -> u64 {
    30
}

fn default_version_timeout_secs() -> u64 {
    10
}

fn default_latest_timeout_secs() -> u64 {
    12
}

impl UcaConfig {
    /// Resolve the config file location
    ///
    /// Explicit path wins, then `$UCA_CONFIG`, then the platform config dir.
    pub fn locate(explicit: Option<&Path>) -> Option<PathBuf> {
        if let Some(path) = explicit {
            return Some(path.to_path_buf());
        }
        if let Some(path) = std::env::var_os(CONFIG_ENV).filter(|p| !p.is_empty()) {
            return Some(PathBuf::from(path));
        }
        dirs::config_dir().map(|dir| dir.join("uca").join("config.toml"))
    }

    /// Load configuration from `path` or use defaults when it does not exist
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };

        if !path.exists() {
            tracing::debug!("No config file at {}", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
            .map_err(|e| UcaError::Config(format!("{}: {}", path.display(), e)))
    }

    /// Parse a TOML document
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| UcaError::Config(format!("Failed to parse config: {}", e)))
    }

    /// Per-command timeout, `None` when disabled
    pub fn timeout(&self) -> Option<Duration> {
        secs_or_disabled(self.timeout_secs)
    }

    /// Detection query timeout, `None` when disabled
    pub fn detect_timeout(&self) -> Option<Duration> {
        secs_or_disabled(self.detect_timeout_secs)
    }

    pub fn version_timeout(&self) -> Option<Duration> {
        secs_or_disabled(self.version_timeout_secs)
    }

    pub fn latest_timeout(&self) -> Option<Duration> {
        secs_or_disabled(self.latest_timeout_secs)
    }
}

/// `0` means no deadline for every timeout key
fn secs_or_disabled(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}

impl Default for UcaConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            concurrency: 0,
            detect_timeout_secs: default_detect_timeout_secs(),
            version_timeout_secs: default_version_timeout_secs(),
            latest_timeout_secs: default_latest_timeout_secs(),
            classifier: ClassifierConfig::default(),
        }
    }
}
