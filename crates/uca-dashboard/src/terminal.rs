//! Inline viewport setup
//!
//! The dashboard draws into a fixed number of lines below the shell prompt
//! instead of taking over the screen, so the final frame stays in the
//! scrollback next to the textual summary. No raw mode: the run is not
//! interactive and Ctrl-C must still reach the process as a signal.

use crossterm::{cursor, execute};
use ratatui::{backend::CrosstermBackend, Terminal, TerminalOptions, Viewport};
use std::io::{self, Stdout};
use uca_core::{Result, UcaError};

pub type Tui = Terminal<CrosstermBackend<Stdout>>;

/// Reserve `height` lines on stdout and hide the cursor
pub fn init(height: u16) -> Result<Tui> {
    let options = TerminalOptions {
        viewport: Viewport::Inline(height.max(1)),
    };
    let mut terminal = Terminal::with_options(CrosstermBackend::new(io::stdout()), options)
        .map_err(|e| UcaError::Dashboard(format!("cannot reserve {} lines: {}", height, e)))?;
    terminal
        .hide_cursor()
        .map_err(|e| UcaError::Dashboard(format!("cannot hide cursor: {}", e)))?;
    Ok(terminal)
}

/// Shows the cursor again when dropped, however the render loop ends
pub struct CursorGuard;

impl Drop for CursorGuard {
    fn drop(&mut self) {
        if let Err(e) = execute!(io::stdout(), cursor::Show) {
            tracing::debug!("Could not show cursor: {}", e);
        }
    }
}
