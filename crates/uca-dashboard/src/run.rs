//! Main run loop for the dashboard
//!
//! Drains the event channel and redraws on every batch of events and on a
//! fixed tick, until the producer side closes.

use std::io::Write;
use std::time::Instant;

use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::MissedTickBehavior;
use uca_core::{Result, UpdateEvent};

use crate::state::{DashboardConfig, LiveState};
use crate::terminal::{self, CursorGuard, Tui};
use crate::ui;

/// Render events for `names` until every sender is dropped
pub async fn run(
    mut events: UnboundedReceiver<UpdateEvent>,
    names: Vec<String>,
    config: DashboardConfig,
) -> Result<()> {
    let mut state = LiveState::new(names);
    let height = u16::try_from(state.rows.len() + 2).unwrap_or(u16::MAX);

    let mut terminal = terminal::init(height)?;
    let _cursor = CursorGuard;

    let mut ticker = tokio::time::interval(config.tick);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        terminal.draw(|frame| ui::draw(frame, &state, &config))?;

        tokio::select! {
            event = events.recv() => match event {
                Some(event) => {
                    state.apply(&event);
                    // Fold everything already queued into one redraw
                    while let Ok(event) = events.try_recv() {
                        state.apply(&event);
                    }
                }
                None => break,
            },
            _ = ticker.tick() => {}
        }
    }

    finish(&mut terminal, &state, &config)
}

/// Draw the last frame and leave the cursor just below its content
fn finish(terminal: &mut Tui, state: &LiveState, config: &DashboardConfig) -> Result<()> {
    let used = ui::render_lines(state, config, Instant::now()).len();
    terminal.draw(|frame| {
        ui::draw(frame, state, config);
        let area = frame.area();
        let last = u16::try_from(used.saturating_sub(1)).unwrap_or(u16::MAX);
        let y = area.y + last.min(area.height.saturating_sub(1));
        frame.set_cursor_position((0, y));
    })?;

    let backend = terminal.backend_mut();
    writeln!(backend)?;
    backend.flush()?;
    tracing::debug!("Dashboard closed with {} of {} agents detected", state.detected, state.rows.len());
    Ok(())
}
