//! # uca-probe
//!
//! Environment probing for uca.
//!
//! An [`EnvironmentProbe`] answers "is binary X present?", "is manager M
//! present?", "does M manage package P?" and "which M's global bin directory
//! holds X?". Every answer that needs an external command is computed at most
//! once per probe, concurrent callers share that single execution, and every
//! failure degrades to an empty answer.

mod listing;
mod locator;
mod paths;
mod probe;
mod version;

pub use listing::{
    parse_code_extensions, parse_npm_packages, parse_package_from_token,
    parse_package_list_output, parse_pnpm_packages, parse_uv_tools,
};
pub use locator::{BinaryLocator, SearchPath, StaticLocator};
pub use paths::{bin_dir_has_binary, longest_unique_match, same_path};
pub use probe::{EnvironmentProbe, ProbeTimeouts, EDITOR_CLI_CANDIDATES};
pub use version::{format_version_with_token, is_version_only_line, parse_version_output};
