//! # uca-dashboard
//!
//! Live terminal dashboard for uca update runs.
//!
//! The dashboard is a pure consumer of the engine's event stream: it owns
//! its own task, folds `detect` / `start` / `finish` events into per-agent
//! rows and redraws on a fixed tick, so rendering never stalls updates.
//!
//! ```text
//! uca  ⠹  2/4  ok:1 same:0 fail:0  12s
//!
//! amp    ✓ updated   0.0.17 → 0.0.18     3s
//! claude ⠼ updating  2.0.1 → …           9s
//! codex  · pending   --                  --
//! cline  ○ manual    --                  --
//! ```

mod run;
mod state;
mod terminal;
mod ui;

pub use run::run;
pub use state::{safe_version, Counts, DashboardConfig, LiveState, Row, RowStatus};
pub use ui::{draw, fmt_elapsed, render_lines, spinner_glyph, status_color};
