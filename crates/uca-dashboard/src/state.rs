//! Live state model folded from the event stream
//!
//! One row per selected agent. Rows move strictly forward:
//! `pending -> updating -> final`, or straight from `pending` to a skip.

use std::time::{Duration, Instant};

use uca_core::{ManagerKind, Outcome, Phase, SkipReason, UpdateEvent, UNKNOWN_VERSION};

/// Display status of one row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RowStatus {
    Pending,
    Updating,
    Updated,
    DryRun,
    Unchanged,
    Skipped,
    /// Known manual install; shown as soon as it is detected
    Manual,
    Failed,
}

impl RowStatus {
    pub fn is_final(self) -> bool {
        !matches!(self, Self::Pending | Self::Updating)
    }

    /// Column label
    pub fn label(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Updating => "updating",
            Self::Updated => "updated",
            Self::DryRun => "dry-run",
            Self::Unchanged => "same",
            Self::Skipped => "skipped",
            Self::Manual => "manual",
            Self::Failed => "failed",
        }
    }

    /// Status icon; `Updating` gets the spinner instead
    pub fn icon(self, unicode: bool) -> &'static str {
        match (self, unicode) {
            (Self::Pending, true) => "·",
            (Self::Pending, false) => ".",
            (Self::Updating, _) => "",
            (Self::Updated, true) => "✓",
            (Self::Updated, false) => "ok",
            (Self::DryRun, true) => "≈",
            (Self::DryRun, false) => "dr",
            (Self::Unchanged, true) => "≡",
            (Self::Unchanged, false) => "=",
            (Self::Skipped, true) => "–",
            (Self::Skipped, false) => "-",
            (Self::Manual, true) => "○",
            (Self::Manual, false) => "o",
            (Self::Failed, true) => "✕",
            (Self::Failed, false) => "x",
        }
    }

    fn from_outcome(outcome: &Outcome) -> Self {
        match outcome {
            Outcome::Updated { dry_run: true } => Self::DryRun,
            Outcome::Updated { dry_run: false } => Self::Updated,
            Outcome::Unchanged => Self::Unchanged,
            Outcome::Skipped(SkipReason::ManualInstall) => Self::Manual,
            Outcome::Skipped(_) => Self::Skipped,
            Outcome::Failed(_) => Self::Failed,
        }
    }
}

/// One dashboard row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    pub name: String,
    pub status: RowStatus,
    pub visible: bool,
    pub detected: bool,
    pub before: String,
    pub after: String,
    pub reason: Option<String>,
    pub method: Option<ManagerKind>,
    pub started: Option<Instant>,
    pub duration: Duration,
}

impl Row {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: RowStatus::Pending,
            visible: false,
            detected: false,
            before: String::new(),
            after: String::new(),
            reason: None,
            method: None,
            started: None,
            duration: Duration::ZERO,
        }
    }

    /// Fold one event into the row
    pub fn apply(&mut self, event: &UpdateEvent) {
        let result = &event.result;
        match event.phase {
            Phase::Detect => {
                self.detected = true;
                self.visible = event.visible;
                self.method = result.method;
                self.before = result.before.clone();
                self.reason = result.reason();
                if self.status.is_final() {
                    return;
                }
                self.status = match &result.outcome {
                    Some(Outcome::Skipped(SkipReason::ManualInstall)) => RowStatus::Manual,
                    _ => RowStatus::Pending,
                };
            }
            Phase::Start => {
                if self.status.is_final() {
                    return;
                }
                self.status = RowStatus::Updating;
                self.before = result.before.clone();
                self.method = result.method;
                self.started = Some(event.at);
            }
            Phase::Finish => {
                if let Some(outcome) = &result.outcome {
                    self.status = RowStatus::from_outcome(outcome);
                }
                self.before = result.before.clone();
                self.after = result.after.clone();
                self.reason = result.reason();
                self.method = result.method;
                self.duration = result.duration;
            }
        }
    }
}

/// Counters shown in the header
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Counts {
    pub visible: usize,
    pub completed: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub failed: usize,
}

/// Whole-run dashboard state
#[derive(Debug, Clone)]
pub struct LiveState {
    pub rows: Vec<Row>,
    pub started: Instant,
    pub detected: usize,
}

impl LiveState {
    /// Pending rows for `names`, in selection order
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            rows: names.into_iter().map(Row::new).collect(),
            started: Instant::now(),
            detected: 0,
        }
    }

    /// Apply an event; events for unknown slots are ignored
    pub fn apply(&mut self, event: &UpdateEvent) {
        let Some(row) = self.rows.get_mut(event.index) else {
            tracing::debug!("Event for unknown row {}", event.index);
            return;
        };
        if event.phase == Phase::Detect && !row.detected {
            self.detected += 1;
        }
        row.apply(event);
    }

    pub fn is_detecting(&self) -> bool {
        self.detected < self.rows.len()
    }

    pub fn visible_rows(&self) -> impl Iterator<Item = &Row> {
        self.rows.iter().filter(|row| row.visible)
    }

    pub fn counts(&self) -> Counts {
        self.visible_rows().fold(Counts::default(), |mut counts, row| {
            counts.visible += 1;
            if row.status.is_final() {
                counts.completed += 1;
            }
            match row.status {
                RowStatus::Updated => counts.updated += 1,
                RowStatus::Unchanged => counts.unchanged += 1,
                RowStatus::Failed => counts.failed += 1,
                _ => {}
            }
            counts
        })
    }

    /// Width of the name column
    pub fn name_width(&self) -> usize {
        self.rows.iter().map(|row| row.name.chars().count()).max().unwrap_or(0)
    }
}

/// Rendering options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DashboardConfig {
    /// Unicode glyphs instead of ASCII
    pub unicode: bool,
    /// Colored icons
    pub color: bool,
    /// Show the update method on rows without another note
    pub explain: bool,
    /// Redraw interval while nothing happens
    pub tick: Duration,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            unicode: false,
            color: false,
            explain: false,
            tick: Duration::from_millis(120),
        }
    }
}

impl DashboardConfig {
    /// Glyph and color support from the locale and terminal environment
    pub fn from_env() -> Self {
        let var = |name: &str| std::env::var(name).unwrap_or_default();
        let locale = format!("{}{}{}", var("LC_ALL"), var("LC_CTYPE"), var("LANG")).to_uppercase();
        let term = var("TERM").to_lowercase();
        Self {
            unicode: locale.contains("UTF-8"),
            color: var("NO_COLOR").is_empty() && !term.is_empty() && term != "dumb",
            ..Self::default()
        }
    }

    pub fn with_explain(mut self, explain: bool) -> Self {
        self.explain = explain;
        self
    }
}

/// `unknown` for blank versions
pub fn safe_version(version: &str) -> &str {
    if version.trim().is_empty() {
        UNKNOWN_VERSION
    } else {
        version
    }
}
