//! UI layer - TUI and views

mod output;
mod picker;

use crate::app::{App, View};
use anyhow::Result;
use crossterm::{
    event::{DisableMouseCapture, EnableMouseCapture},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph},
    Frame, Terminal,
};
use std::io;

const HEADER_HEIGHT: u16 = 3;
const FOOTER_HEIGHT: u16 = 3;

/// Main TUI controller
pub struct TUI {
    terminal: Terminal<CrosstermBackend<io::Stdout>>,
}

impl TUI {
    /// Create a new TUI
    pub fn new() -> Result<Self> {
        enable_raw_mode()?;
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
        let backend = CrosstermBackend::new(stdout);
        let terminal = Terminal::new(backend)?;

        Ok(Self { terminal })
    }

    /// Get mutable reference to terminal
    pub fn terminal(&mut self) -> &mut Terminal<CrosstermBackend<io::Stdout>> {
        &mut self.terminal
    }
}

impl Drop for TUI {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
        let _ = execute!(
            self.terminal.backend_mut(),
            LeaveAlternateScreen,
            DisableMouseCapture
        );
        let _ = self.terminal.show_cursor();
    }
}

/// Console lines visible inside the bordered body of `area`
pub fn console_height(area: Rect) -> usize {
    area.height.saturating_sub(HEADER_HEIGHT + FOOTER_HEIGHT + 2) as usize
}

/// Render the whole screen
pub fn render(f: &mut Frame, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(HEADER_HEIGHT),
            Constraint::Min(3),
            Constraint::Length(FOOTER_HEIGHT),
        ])
        .split(f.area());

    render_header(f, app, chunks[0]);
    match app.view {
        View::Picker => picker::render(f, app, chunks[1]),
        View::Console => output::render(f, app, chunks[1]),
    }
    render_footer(f, app, chunks[2]);
}

fn render_header(f: &mut Frame, app: &App, area: Rect) {
    let (state, color) = match app.session.current_target() {
        Some(target) => (format!("building {}", target), Color::Yellow),
        None => ("idle".to_string(), Color::Gray),
    };

    let diagnostics = app.session.diagnostics();
    let counts = crate::indexer::DiagnosticCounts::from_regions(diagnostics);

    let line = Line::from(vec![
        Span::styled(" buildpane ", Style::default().fg(Color::Cyan)),
        Span::raw("| "),
        Span::styled(state, Style::default().fg(color)),
        Span::raw(" | "),
        Span::styled(
            format!("{} errors", counts.errors),
            Style::default().fg(if counts.errors > 0 { Color::Red } else { Color::Gray }),
        ),
        Span::raw(", "),
        Span::styled(
            format!("{} warnings", counts.warnings),
            Style::default().fg(if counts.warnings > 0 { Color::Yellow } else { Color::Gray }),
        ),
    ]);

    let header = Paragraph::new(line).block(Block::default().borders(Borders::ALL));
    f.render_widget(header, area);
}

fn render_footer(f: &mut Frame, app: &App, area: Rect) {
    let help = match app.view {
        View::Picker => "↑↓: Select │ Enter: Build │ r: Re-compute │ Esc: Console │ q: Quit",
        View::Console => "b: Targets │ c: Cancel │ n/p: Diagnostics │ PgUp/PgDn: Scroll │ q: Quit",
    };

    let text = if app.status.is_empty() {
        help.to_string()
    } else {
        format!("{} │ {}", app.status, help)
    };

    let footer = Paragraph::new(text)
        .block(Block::default().borders(Borders::ALL))
        .style(Style::default().fg(Color::DarkGray));

    f.render_widget(footer, area);
}
