//! Search-path lookups

use std::collections::HashMap;
use std::path::PathBuf;

/// Resolves a binary name to an executable path
pub trait BinaryLocator: Send + Sync {
    fn locate(&self, name: &str) -> Option<PathBuf>;
}

/// Locator backed by the process `PATH`
#[derive(Debug, Clone, Copy, Default)]
pub struct SearchPath;

impl BinaryLocator for SearchPath {
    fn locate(&self, name: &str) -> Option<PathBuf> {
        which::which(name).ok()
    }
}

/// Fixed name-to-path table, for tests and dry environments
#[derive(Debug, Clone, Default)]
pub struct StaticLocator {
    paths: HashMap<String, PathBuf>,
}

impl StaticLocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: &str, path: impl Into<PathBuf>) -> Self {
        self.paths.insert(name.to_string(), path.into());
        self
    }
}

impl BinaryLocator for StaticLocator {
    fn locate(&self, name: &str) -> Option<PathBuf> {
        self.paths.get(name).cloned()
    }
}
