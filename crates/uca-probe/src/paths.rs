//! Path comparison helpers for bin-directory evidence

use std::path::{Path, PathBuf};

use uca_core::ManagerKind;

/// Lexically normalise a path (drops `.` components and trailing separators)
fn clean(path: &Path) -> PathBuf {
    path.components().collect()
}

fn resolve(path: &Path) -> Option<PathBuf> {
    std::fs::canonicalize(path).ok().map(|p| clean(&p))
}

/// Whether two paths name the same directory, following symlinks
pub fn same_path(a: &Path, b: &Path) -> bool {
    if a.as_os_str().is_empty() || b.as_os_str().is_empty() {
        return false;
    }
    let a = clean(a);
    let b = clean(b);
    if cfg!(windows) {
        return a
            .to_string_lossy()
            .eq_ignore_ascii_case(&b.to_string_lossy());
    }
    if a == b {
        return true;
    }
    match (resolve(&a), resolve(&b)) {
        (Some(ra), Some(rb)) => ra == rb,
        (Some(ra), None) => ra == b,
        (None, Some(rb)) => rb == a,
        (None, None) => false,
    }
}

/// Whether `dir` contains a regular file for `name`
pub fn bin_dir_has_binary(dir: &Path, name: &str) -> bool {
    if dir.as_os_str().is_empty() || name.is_empty() {
        return false;
    }
    let mut candidates = vec![dir.join(name)];
    if cfg!(windows) {
        for ext in ["exe", "cmd", "bat"] {
            candidates.push(dir.join(format!("{}.{}", name, ext)));
        }
    }
    candidates.iter().any(|candidate| candidate.is_file())
}

/// Pick the manager whose matching bin dir is strictly the longest
///
/// Returns `None` when nothing matched or the longest length is shared.
pub fn longest_unique_match(matches: &[(ManagerKind, PathBuf)]) -> Option<ManagerKind> {
    let longest = matches
        .iter()
        .map(|(_, dir)| dir.as_os_str().len())
        .max()?;
    let mut best = matches
        .iter()
        .filter(|(_, dir)| dir.as_os_str().len() == longest);
    let (kind, _) = best.next()?;
    match best.next() {
        Some(_) => None,
        None => Some(*kind),
    }
}
