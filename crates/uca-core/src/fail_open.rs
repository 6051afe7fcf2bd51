//! Graceful degradation for environment queries
//!
//! A probe that cannot run (manager half-installed, unparsable listing,
//! non-zero exit) must not abort the run. Its answer degrades to "nothing
//! found" and resolution carries on with the next strategy.
//!
//! Update commands never go through here: their failures are classified and
//! reported per agent.

use std::future::Future;
use tracing::debug;

use crate::Result;

/// Await `query`, turning an error into `None`
///
/// The error is logged at debug level under `what`. Probe failures are
/// routine on machines with partially installed managers.
///
/// ```no_run
/// use uca_core::fail_open::fail_open;
/// use uca_core::Result;
///
/// async fn npm_prefix() -> Result<String> {
///     Ok("/usr/local".to_string())
/// }
///
/// async fn example() {
///     let prefix = fail_open("npm prefix", npm_prefix()).await;
/// }
/// ```
pub async fn fail_open<T>(what: &str, query: impl Future<Output = Result<T>>) -> Option<T> {
    query
        .await
        .map_err(|e| debug!("{} unavailable, continuing without it: {}", what, e))
        .ok()
}

/// Await `query`, substituting `T::default()` when it fails
pub async fn fail_open_or_default<T: Default>(
    what: &str,
    query: impl Future<Output = Result<T>>,
) -> T {
    fail_open(what, query).await.unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::UcaError;
    use std::collections::HashSet;
    use std::path::PathBuf;

    #[tokio::test]
    async fn test_passes_values_through() {
        let dir = fail_open("npm bin dir", async { Ok(PathBuf::from("/opt/npm/bin")) }).await;
        assert_eq!(dir, Some(PathBuf::from("/opt/npm/bin")));
    }

    #[tokio::test]
    async fn test_errors_become_none() {
        let dir: Option<PathBuf> = fail_open("yarn bin dir", async {
            Err(UcaError::ProbeOutput {
                command: "yarn global bin".to_string(),
                message: "Code(1)".to_string(),
            })
        })
        .await;
        assert_eq!(dir, None);
    }

    #[tokio::test]
    async fn test_unparsable_listing_is_empty() {
        let packages: HashSet<String> = fail_open_or_default("pnpm package list", async {
            Err(UcaError::ProbeOutput {
                command: "pnpm list -g --depth=0 --json".to_string(),
                message: "not json".to_string(),
            })
        })
        .await;
        assert!(packages.is_empty());
    }
}
