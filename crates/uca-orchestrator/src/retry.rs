//! Update command execution with the bounded npm retry

use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, info, warn};
use uca_core::{AgentResult, FailureReason, Outcome};
use uca_exec::{CommandRunner, Exit};

use crate::classifier::Classifier;

/// Log marker written before the npm retry output
pub const NPM_RETRY_MARKER: &str = "(uca) retrying npm after ENOTEMPTY";

/// Everything known about one (possibly retried) update command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateRun {
    /// Full log, including the retry when one happened
    pub log: String,
    /// Output of the final attempt, used for classification
    pub classify_output: String,
    pub exit: Exit,
    pub duration: Duration,
}

impl UpdateRun {
    pub fn succeeded(&self) -> bool {
        self.exit == Exit::Code(0)
    }
}

/// Run an update command, retrying once after an npm rename failure
pub async fn run_update_command(
    runner: &dyn CommandRunner,
    classifier: &Classifier,
    args: &[String],
    timeout: Option<Duration>,
) -> UpdateRun {
    let first = runner.run(args, timeout).await;
    let failed_with_code = matches!(first.exit, Exit::Code(code) if code != 0);

    if !failed_with_code || !classifier.is_npm_rename_failure(args, &first.combined) {
        return UpdateRun {
            classify_output: first.combined.clone(),
            log: first.combined,
            exit: first.exit,
            duration: first.duration,
        };
    }

    info!("npm rename failure detected; retrying once");
    let cleanup = cleanup_npm_enotempty(&first.combined).await;
    let second = runner.run(args, timeout).await;

    let classify_output = if second.combined.trim().is_empty() {
        first.combined.clone()
    } else {
        second.combined.clone()
    };
    UpdateRun {
        log: format_retry_output(&first.combined, cleanup.as_deref(), &second.combined),
        classify_output,
        exit: second.exit,
        duration: first.duration + second.duration,
    }
}

/// Join the first attempt, any cleanup note and the retry into one log
pub fn format_retry_output(first: &str, cleanup: Option<&str>, second: &str) -> String {
    let first = first.trim_end_matches('\n');
    let second = second.trim();
    if first.is_empty() {
        return second.to_string();
    }
    if second.is_empty() {
        return first.to_string();
    }
    match cleanup.map(str::trim).filter(|c| !c.is_empty()) {
        Some(cleanup) => format!("{first}\n\n(uca) {cleanup}\n{NPM_RETRY_MARKER}\n{second}"),
        None => format!("{first}\n\n{NPM_RETRY_MARKER}\n{second}"),
    }
}

/// Pull the `(path, dest)` pair of a failed rename out of npm's error output
///
/// Prefers the `npm error path` / `npm error dest` lines and falls back to a
/// `rename 'a' -> 'b'` fragment.
pub fn extract_npm_rename_paths(output: &str) -> Option<(PathBuf, PathBuf)> {
    let mut path = None;
    let mut dest = None;
    for line in output.lines().map(str::trim) {
        if let Some(rest) = line.strip_prefix("npm error path ") {
            path = Some(rest.trim());
        } else if let Some(rest) = line.strip_prefix("npm error dest ") {
            dest = Some(rest.trim());
        }
    }
    if let (Some(path), Some(dest)) = (path, dest) {
        if !path.is_empty() && !dest.is_empty() {
            return Some((PathBuf::from(path), PathBuf::from(dest)));
        }
    }

    output.lines().find_map(|line| {
        let (_, rest) = line.split_once("rename '")?;
        let (path, rest) = rest.split_once("' -> '")?;
        let (dest, _) = rest.split_once('\'')?;
        Some((PathBuf::from(path), PathBuf::from(dest)))
    })
}

/// Whether `dest` looks like npm's own temp copy of `path`
///
/// Both absolute, same parent, and dest's name is `.` + path's name plus a suffix.
pub fn is_safe_npm_rename_target(path: &Path, dest: &Path) -> bool {
    if !path.is_absolute() || !dest.is_absolute() {
        return false;
    }
    if path.parent() != dest.parent() {
        return false;
    }
    let (Some(base), Some(dest_base)) = (path.file_name(), dest.file_name()) else {
        return false;
    };
    let (Some(base), Some(dest_base)) = (base.to_str(), dest_base.to_str()) else {
        return false;
    };
    dest_base.starts_with(&format!(".{}", base))
}

/// Remove npm's stale rename target when it is provably safe to do so
///
/// Returns a note for the log when something was attempted.
pub async fn cleanup_npm_enotempty(output: &str) -> Option<String> {
    let (path, dest) = extract_npm_rename_paths(output)?;
    if !is_safe_npm_rename_target(&path, &dest) {
        debug!(?path, ?dest, "Refusing to clean up npm rename target");
        return None;
    }
    if !tokio::fs::try_exists(&dest).await.unwrap_or(false) {
        return None;
    }
    match tokio::fs::remove_dir_all(&dest).await {
        Ok(()) => {
            info!("Removed stale npm temp dir {}", dest.display());
            Some(format!("removed stale npm temp dir {}", dest.display()))
        }
        Err(e) => {
            warn!("Failed to remove stale npm temp dir {}: {}", dest.display(), e);
            Some(format!(
                "failed to remove stale npm temp dir {}: {}",
                dest.display(),
                e
            ))
        }
    }
}

fn format_timeout(timeout: Duration) -> String {
    let secs = timeout.as_secs();
    if secs == 0 || timeout.subsec_millis() != 0 {
        format!("{}ms", timeout.as_millis())
    } else if secs % 3600 == 0 {
        format!("{}h", secs / 3600)
    } else if secs % 60 == 0 {
        format!("{}m", secs / 60)
    } else {
        format!("{}s", secs)
    }
}

/// Mark `result` failed, classifying structural causes before output content
pub fn apply_failure(
    result: &mut AgentResult,
    classifier: &Classifier,
    args: &[String],
    run: &UpdateRun,
    timeout: Option<Duration>,
) {
    let reason = match run.exit {
        Exit::TimedOut => {
            let hint = match timeout {
                Some(t) => format!(
                    "command timed out after {}; rerun with --timeout 0 or increase it",
                    format_timeout(t)
                ),
                None => "command timed out; rerun with a larger --timeout".to_string(),
            };
            result.push_hint(&hint);
            FailureReason::Timeout
        }
        Exit::Canceled => {
            result.push_hint("interrupted; retry the update");
            FailureReason::Canceled
        }
        Exit::Code(code) => match classifier.classify(args, &run.classify_output) {
            Some(classification) => {
                result.push_hint(&classification.hint);
                classification.reason
            }
            None => FailureReason::Exit(code),
        },
    };
    warn!(agent = %result.agent, %reason, "Update failed");
    result.outcome = Some(Outcome::Failed(reason));
}

#[cfg(test)]
mod tests {
    use super::*;
    use uca_exec::{MockResponse, MockRunner};

    fn argv(line: &str) -> Vec<String> {
        line.split(' ').map(String::from).collect()
    }

    #[test]
    fn test_extract_from_error_lines() {
        let output = "npm error code ENOTEMPTY\n\
                      npm error syscall rename\n\
                      npm error path /usr/lib/node_modules/pkg\n\
                      npm error dest /usr/lib/node_modules/.pkg-abc\n";
        assert_eq!(
            extract_npm_rename_paths(output),
            Some((
                PathBuf::from("/usr/lib/node_modules/pkg"),
                PathBuf::from("/usr/lib/node_modules/.pkg-abc")
            ))
        );
    }

    #[test]
    fn test_extract_from_rename_fragment() {
        let output = "npm ERR! ENOTEMPTY: directory not empty, rename '/g/lib/node_modules/pkg' -> '/g/lib/node_modules/.pkg-x1'";
        assert_eq!(
            extract_npm_rename_paths(output),
            Some((
                PathBuf::from("/g/lib/node_modules/pkg"),
                PathBuf::from("/g/lib/node_modules/.pkg-x1")
            ))
        );
        assert_eq!(extract_npm_rename_paths("nothing useful"), None);
    }

    #[test]
    fn test_safe_rename_target() {
        let safe = |a: &str, b: &str| is_safe_npm_rename_target(Path::new(a), Path::new(b));

        assert!(safe("/g/node_modules/pkg", "/g/node_modules/.pkg-abc"));
        assert!(!safe("pkg", ".pkg-abc"));
        assert!(!safe("/g/node_modules/pkg", "/other/.pkg-abc"));
        assert!(!safe("/g/node_modules/pkg", "/g/node_modules/pkg-abc"));
        assert!(!safe("/g/node_modules/pkg", "/g/node_modules/.other"));
        assert!(!safe("/g/node_modules/pkg", "/g/node_modules/.."));
    }

    #[tokio::test]
    async fn test_cleanup_removes_only_safe_sibling() {
        let dir = tempfile::tempdir().unwrap();
        let pkg = dir.path().join("pkg");
        let stale = dir.path().join(".pkg-abc");
        std::fs::create_dir_all(stale.join("nested")).unwrap();
        std::fs::create_dir(&pkg).unwrap();

        let output = format!("rename '{}' -> '{}'", pkg.display(), stale.display());
        let note = cleanup_npm_enotempty(&output).await.unwrap();
        assert!(note.starts_with("removed stale npm temp dir"));
        assert!(!stale.exists());
        assert!(pkg.exists());

        // Already gone: nothing to report
        assert_eq!(cleanup_npm_enotempty(&output).await, None);
    }

    #[tokio::test]
    async fn test_cleanup_refuses_cross_directory() {
        let a = tempfile::tempdir().unwrap();
        let b = tempfile::tempdir().unwrap();
        let pkg = a.path().join("pkg");
        let other = b.path().join(".pkg-abc");
        std::fs::create_dir(&other).unwrap();

        let output = format!("rename '{}' -> '{}'", pkg.display(), other.display());
        assert_eq!(cleanup_npm_enotempty(&output).await, None);
        assert!(other.exists());
    }

    #[test]
    fn test_format_timeout_keeps_fractions() {
        assert_eq!(format_timeout(Duration::from_millis(1500)), "1500ms");
        assert_eq!(format_timeout(Duration::from_millis(250)), "250ms");
        assert_eq!(format_timeout(Duration::from_secs(90)), "90s");
        assert_eq!(format_timeout(Duration::from_secs(120)), "2m");
        assert_eq!(format_timeout(Duration::from_secs(7200)), "2h");
    }

    #[test]
    fn test_format_retry_output() {
        assert_eq!(format_retry_output("", None, "second\n"), "second");
        assert_eq!(format_retry_output("first\n", None, "  "), "first");
        assert_eq!(
            format_retry_output("first\n", None, "second"),
            "first\n\n(uca) retrying npm after ENOTEMPTY\nsecond"
        );
        assert_eq!(
            format_retry_output("first", Some("removed stale npm temp dir /x"), "second"),
            "first\n\n(uca) removed stale npm temp dir /x\n(uca) retrying npm after ENOTEMPTY\nsecond"
        );
    }

    #[tokio::test]
    async fn test_npm_retry_happens_exactly_once() {
        let cmd = "npm install -g pkg@latest";
        let runner = MockRunner::new().on_sequence(
            cmd,
            vec![
                MockResponse::fail(1, "npm error code ENOTEMPTY"),
                MockResponse::fail(1, "npm error code ENOTEMPTY again"),
            ],
        );
        let classifier = Classifier::default();

        let run = run_update_command(&runner, &classifier, &argv(cmd), None).await;
        assert_eq!(run.exit, Exit::Code(1));
        assert!(run.log.contains(NPM_RETRY_MARKER));
        assert!(run.classify_output.contains("again"));
        assert_eq!(runner.calls_to(cmd).await.len(), 2);
    }

    #[tokio::test]
    async fn test_npm_retry_can_succeed() {
        let cmd = "npm install -g pkg@latest";
        let runner = MockRunner::new().on_sequence(
            cmd,
            vec![
                MockResponse::fail(1, "ENOTEMPTY: directory not empty"),
                MockResponse::ok("added 1 package"),
            ],
        );
        let run = run_update_command(&runner, &Classifier::default(), &argv(cmd), None).await;
        assert!(run.succeeded());
        assert!(run.log.ends_with("added 1 package"));
    }

    #[tokio::test]
    async fn test_no_retry_for_other_failures() {
        let cmd = "bun add -g pkg@latest";
        let runner = MockRunner::new().on(cmd, MockResponse::fail(1, "ENOTEMPTY"));
        let run = run_update_command(&runner, &Classifier::default(), &argv(cmd), None).await;
        assert_eq!(run.exit, Exit::Code(1));
        assert_eq!(runner.calls_to(cmd).await.len(), 1);
    }

    #[test]
    fn test_apply_failure_structural_first() {
        let classifier = Classifier::default();
        let args = argv("npm install -g a@latest");
        let run = |exit| UpdateRun {
            log: "EACCES".to_string(),
            classify_output: "EACCES".to_string(),
            exit,
            duration: Duration::ZERO,
        };

        let mut result = AgentResult::new("codex");
        apply_failure(&mut result, &classifier, &args, &run(Exit::TimedOut), Some(Duration::from_secs(900)));
        assert_eq!(result.outcome, Some(Outcome::Failed(FailureReason::Timeout)));
        assert!(result.explain.contains("timed out after 15m"));

        let mut result = AgentResult::new("codex");
        apply_failure(&mut result, &classifier, &args, &run(Exit::Canceled), None);
        assert_eq!(result.reason().as_deref(), Some("canceled"));

        let mut result = AgentResult::new("codex");
        apply_failure(&mut result, &classifier, &args, &run(Exit::Code(243)), None);
        assert_eq!(result.outcome, Some(Outcome::Failed(FailureReason::Permission)));
        assert!(result.explain.starts_with("hint: permission error"));
    }

    #[test]
    fn test_unclassified_failure_uses_exit_code() {
        let mut result = AgentResult::new("amp");
        let run = UpdateRun {
            log: "something odd".to_string(),
            classify_output: "something odd".to_string(),
            exit: Exit::Code(1),
            duration: Duration::ZERO,
        };
        apply_failure(&mut result, &Classifier::default(), &argv("amp update"), &run, None);
        assert_eq!(result.reason().as_deref(), Some("exit 1"));
        assert!(result.explain.is_empty());
    }
}
