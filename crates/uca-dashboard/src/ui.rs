//! Frame rendering
//!
//! The dashboard is a header line, a blank line and one line per visible
//! agent. Before any row is visible only the detection header is drawn.

use std::time::{Duration, Instant};

use ratatui::{
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::Paragraph,
    Frame,
};

use crate::state::{safe_version, DashboardConfig, LiveState, Row, RowStatus};

const SPINNER_UNICODE: [&str; 10] = ["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];
const SPINNER_ASCII: [&str; 4] = ["-", "\\", "|", "/"];
const SPINNER_STEP: Duration = Duration::from_millis(120);

/// Draw the whole dashboard into the frame
pub fn draw(frame: &mut Frame, state: &LiveState, config: &DashboardConfig) {
    let lines = render_lines(state, config, Instant::now());
    frame.render_widget(Paragraph::new(lines), frame.area());
}

/// Dashboard content at `now`
pub fn render_lines(state: &LiveState, config: &DashboardConfig, now: Instant) -> Vec<Line<'static>> {
    let elapsed = now.saturating_duration_since(state.started);
    let spinner = spinner_glyph(elapsed, config.unicode);
    let counts = state.counts();
    let header_style = Style::default().add_modifier(Modifier::BOLD);

    if state.is_detecting() && counts.visible == 0 {
        let boot = format!(
            "uca  {}  detecting {}/{}  {}",
            spinner,
            state.detected,
            state.rows.len(),
            fmt_elapsed(elapsed)
        );
        return vec![Line::styled(boot, header_style)];
    }

    let mut header = format!(
        "uca  {}  {}/{}  ok:{} same:{} fail:{}  {}",
        spinner,
        counts.completed,
        counts.visible,
        counts.updated,
        counts.unchanged,
        counts.failed,
        fmt_elapsed(elapsed)
    );
    if state.is_detecting() {
        header.push_str(&format!("  detecting {}/{}", state.detected, state.rows.len()));
    }

    let width = state.name_width();
    let mut lines = vec![Line::styled(header, header_style), Line::default()];
    lines.extend(
        state
            .visible_rows()
            .map(|row| row_line(row, width, config, now)),
    );
    lines
}

fn row_line(row: &Row, name_width: usize, config: &DashboardConfig, now: Instant) -> Line<'static> {
    let icon = match row.status {
        RowStatus::Updating => {
            let running = row.started.map_or(Duration::ZERO, |s| now.saturating_duration_since(s));
            spinner_glyph(running, config.unicode)
        }
        status => status.icon(config.unicode),
    };

    let arrow = if config.unicode { "→" } else { "->" };
    let ellipsis = if config.unicode { "…" } else { "..." };
    let finished = format!("{} {} {}", safe_version(&row.before), arrow, safe_version(&row.after));

    let mut version = "--".to_string();
    let mut elapsed = "--".to_string();
    let mut info = None;
    match row.status {
        RowStatus::Pending | RowStatus::Manual => {}
        RowStatus::Updating => {
            version = format!("{} {} {}", safe_version(&row.before), arrow, ellipsis);
            if let Some(started) = row.started {
                elapsed = fmt_elapsed(now.saturating_duration_since(started));
            }
        }
        RowStatus::Updated | RowStatus::Unchanged => {
            version = finished;
            elapsed = fmt_elapsed(row.duration);
        }
        RowStatus::Failed => {
            version = finished;
            elapsed = fmt_elapsed(row.duration);
            info = row.reason.clone();
        }
        RowStatus::Skipped => info = row.reason.clone(),
        RowStatus::DryRun => {
            version = finished;
            info = Some("preview".to_string());
        }
    }
    if config.explain && info.is_none() {
        info = row.method.map(|kind| kind.label().to_string());
    }
    let info = info
        .filter(|note| !note.is_empty())
        .map(|note| format!(" ({})", note))
        .unwrap_or_default();

    let icon_style = if config.color {
        Style::default().fg(status_color(row.status))
    } else {
        Style::default()
    };

    Line::from(vec![
        Span::raw(format!("{:<width$} ", row.name, width = name_width)),
        Span::styled(icon.to_string(), icon_style),
        Span::raw(format!(
            " {:<9} {} {:>6}{}",
            row.status.label(),
            version,
            elapsed,
            info
        )),
    ])
}

/// Icon color per status
pub fn status_color(status: RowStatus) -> Color {
    match status {
        RowStatus::Pending | RowStatus::Unchanged => Color::DarkGray,
        RowStatus::Updating => Color::Cyan,
        RowStatus::Updated => Color::Green,
        RowStatus::DryRun => Color::Magenta,
        RowStatus::Skipped | RowStatus::Manual => Color::Yellow,
        RowStatus::Failed => Color::Red,
    }
}

/// Spinner frame for `elapsed`
pub fn spinner_glyph(elapsed: Duration, unicode: bool) -> &'static str {
    let frames: &[&'static str] = if unicode {
        &SPINNER_UNICODE
    } else {
        &SPINNER_ASCII
    };
    let step = (elapsed.as_millis() / SPINNER_STEP.as_millis()) as usize;
    frames[step % frames.len()]
}

/// `42s`, `3m07s` or `1h05m`
pub fn fmt_elapsed(elapsed: Duration) -> String {
    let total = elapsed.as_secs();
    if total < 60 {
        return format!("{}s", total);
    }
    let (mins, secs) = (total / 60, total % 60);
    if mins < 60 {
        return format!("{}m{:02}s", mins, secs);
    }
    format!("{}h{:02}m", mins / 60, mins % 60)
}
