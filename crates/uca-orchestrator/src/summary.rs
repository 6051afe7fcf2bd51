//! Final summary, a pure fold over the result array

use std::collections::BTreeMap;

use uca_core::{AgentResult, ManagerKind, Outcome, SkipReason};

/// Agents grouped by outcome, names in result order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Summary {
    pub updated: Vec<String>,
    pub unchanged: Vec<String>,
    /// `(label, names)` per skip reason, in a stable reason order
    pub skipped: Vec<(String, Vec<String>)>,
    /// Requested names that matched no known agent
    pub unknown: Vec<String>,
    pub failed: Vec<String>,
}

fn skip_rank(reason: SkipReason) -> (u8, Option<ManagerKind>) {
    match reason {
        SkipReason::Missing => (0, None),
        SkipReason::MissingManager(kind) => (1, Some(kind)),
        SkipReason::MissingEditorCli => (2, None),
        SkipReason::ManualInstall => (3, None),
    }
}

/// Fold `results` into a summary
pub fn summarize(results: &[AgentResult], unknown: &[String]) -> Summary {
    let mut summary = Summary {
        unknown: unknown.to_vec(),
        ..Summary::default()
    };
    let mut skipped: BTreeMap<(u8, Option<ManagerKind>), (String, Vec<String>)> = BTreeMap::new();

    for result in results {
        let name = result.agent.clone();
        match &result.outcome {
            Some(Outcome::Updated { .. }) => summary.updated.push(name),
            Some(Outcome::Unchanged) => summary.unchanged.push(name),
            Some(Outcome::Skipped(reason)) => skipped
                .entry(skip_rank(*reason))
                .or_insert_with(|| (format!("skipped ({})", reason), Vec::new()))
                .1
                .push(name),
            Some(Outcome::Failed(_)) => summary.failed.push(name),
            None => {}
        }
    }

    summary.skipped = skipped.into_values().collect();
    summary
}

impl Summary {
    /// Whether the run should exit non-zero
    pub fn has_failures(&self) -> bool {
        !self.failed.is_empty()
    }

    /// `label: a b c` lines, omitting empty groups
    pub fn lines(&self) -> Vec<String> {
        let groups = [
            ("updated".to_string(), &self.updated),
            ("unchanged".to_string(), &self.unchanged),
        ]
        .into_iter()
        .chain(self.skipped.iter().map(|(label, names)| (label.clone(), names)))
        .chain([
            ("skipped (unknown)".to_string(), &self.unknown),
            ("failed".to_string(), &self.failed),
        ]);

        groups
            .filter(|(_, names)| !names.is_empty())
            .map(|(label, names)| format!("{}: {}", label, names.join(" ")))
            .collect()
    }
}
