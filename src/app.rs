//! Application state and main event loop

use crate::catalog::CatalogEntry;
use crate::console::Span;
use crate::core::BuildEvent;
use crate::indexer::{self, DiagnosticRegion, ERRORS_CATEGORY};
use crate::session::{BuildSession, SelectOutcome};
use crate::ui::{self, TUI};
use anyhow::Result;
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind};
use std::time::Duration;
use tokio::sync::mpsc;

/// Which pane has the keyboard
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum View {
    Picker,
    Console,
}

/// Application state
pub struct App {
    pub session: BuildSession,
    pub event_rx: mpsc::UnboundedReceiver<BuildEvent>,
    pub entries: Vec<CatalogEntry>,
    pub selected: usize,
    pub view: View,
    /// First visible console line when not following
    pub scroll: usize,
    /// Keep the newest output in view
    pub follow: bool,
    /// Console lines that fit on screen, updated on every draw
    pub viewport: usize,
    /// Diagnostic the user last jumped to
    pub cursor: Option<Span>,
    pub status: String,
    pub should_quit: bool,
}

impl App {
    pub fn new(session: BuildSession, event_rx: mpsc::UnboundedReceiver<BuildEvent>) -> Self {
        let mut app = Self {
            session,
            event_rx,
            entries: Vec::new(),
            selected: 0,
            view: View::Picker,
            scroll: 0,
            follow: true,
            viewport: 20,
            cursor: None,
            status: String::new(),
            should_quit: false,
        };
        app.load_targets();
        app
    }

    /// Draw and handle input until the user quits
    pub fn run(&mut self, tui: &mut TUI) -> Result<()> {
        while !self.should_quit {
            self.process_events();

            tui.terminal().draw(|f| {
                self.viewport = ui::console_height(f.area());
                ui::render(f, self);
            })?;

            if event::poll(Duration::from_millis(50))? {
                if let Event::Key(key) = event::read()? {
                    if key.kind == KeyEventKind::Press {
                        self.handle_key(key);
                    }
                }
            }
        }

        self.session.shutdown();
        Ok(())
    }

    /// Apply every queued build event (non-blocking)
    pub fn process_events(&mut self) {
        while let Ok(event) = self.event_rx.try_recv() {
            if let Some(summary) = self.session.apply(event) {
                self.cursor = None;
                self.status = format!(
                    "{}: {} ({} errors, {} warnings)",
                    summary.target, summary.outcome, summary.counts.errors, summary.counts.warnings
                );
            }
        }
    }

    /// Handle keyboard input
    pub fn handle_key(&mut self, key: KeyEvent) {
        match (self.view, key.code) {
            (_, KeyCode::Char('q')) => self.quit(),
            (_, KeyCode::Char('r')) => self.recompute(),
            (_, KeyCode::Char('c')) => self.cancel(),

            (View::Picker, KeyCode::Up) => self.selected = self.selected.saturating_sub(1),
            (View::Picker, KeyCode::Down) => {
                if self.selected + 1 < self.entries.len() {
                    self.selected += 1;
                }
            }
            (View::Picker, KeyCode::Enter) => self.pick(),
            (View::Picker, KeyCode::Esc) => self.view = View::Console,

            (View::Console, KeyCode::Char('b')) => self.open_picker(),
            (View::Console, KeyCode::Char('n')) => self.next_diagnostic(),
            (View::Console, KeyCode::Char('p')) => self.previous_diagnostic(),
            (View::Console, KeyCode::PageUp) => self.page_up(),
            (View::Console, KeyCode::PageDown) => self.page_down(),
            (View::Console, KeyCode::Up) => self.scroll_by(-1),
            (View::Console, KeyCode::Down) => self.scroll_by(1),
            (View::Console, KeyCode::End) => self.follow = true,
            _ => {}
        }
    }

    pub fn open_picker(&mut self) {
        if self.entries.is_empty() {
            self.load_targets();
        }
        if let Some(index) = self.session.last_selected_index() {
            self.selected = index;
        }
        self.view = View::Picker;
    }

    /// Act on the highlighted picker row
    pub fn pick(&mut self) {
        match self.session.select(self.selected) {
            Ok(SelectOutcome::Started { target, .. }) => {
                self.status = format!("Building {}", target.name);
                self.view = View::Console;
                self.follow = true;
                self.cursor = None;
            }
            Ok(SelectOutcome::Recomputed(entries)) => {
                self.status = format!("Found {} targets", entries.len().saturating_sub(1));
                self.entries = entries;
                self.selected = 0;
            }
            Err(e) => {
                log::warn!("Selection failed: {}", e);
                self.status = e.to_string();
                self.view = View::Console;
            }
        }
    }

    pub fn recompute(&mut self) {
        match self.session.recompute_targets() {
            Ok(entries) => {
                self.status = format!("Found {} targets", entries.len().saturating_sub(1));
                self.entries = entries;
                self.selected = self.selected.min(self.entries.len().saturating_sub(1));
            }
            Err(e) => {
                log::warn!("Target discovery failed: {}", e);
                self.status = e.to_string();
            }
        }
    }

    pub fn cancel(&mut self) {
        if self.session.is_running() {
            self.session.cancel();
            self.status = "Cancelling...".to_string();
        }
    }

    pub fn quit(&mut self) {
        self.session.shutdown();
        self.should_quit = true;
    }

    pub fn next_diagnostic(&mut self) {
        let spans = self.session.console().regions(ERRORS_CATEGORY);
        let next = match self.cursor {
            Some(current) => indexer::next_after(&spans, current.start),
            None => spans.first().copied(),
        };
        self.jump_to(next);
    }

    pub fn previous_diagnostic(&mut self) {
        let spans = self.session.console().regions(ERRORS_CATEGORY);
        let previous = match self.cursor {
            Some(current) => indexer::previous_before(&spans, current.start),
            None => spans.last().copied(),
        };
        self.jump_to(previous);
    }

    /// Diagnostic under the cursor, if any
    pub fn current_diagnostic(&self) -> Option<&DiagnosticRegion> {
        let cursor = self.cursor?;
        self.session.diagnostics().iter().find(|d| d.span == cursor)
    }

    /// First visible line for a console of `line_count` lines
    pub fn top_line(&self, line_count: usize) -> usize {
        let last_page = line_count.saturating_sub(self.viewport);
        if self.follow {
            last_page
        } else {
            self.scroll.min(last_page)
        }
    }

    fn page_up(&mut self) {
        let top = self.top_line(self.line_count());
        self.follow = false;
        self.scroll = top.saturating_sub(self.viewport);
    }

    fn page_down(&mut self) {
        let lines = self.line_count();
        let top = self.top_line(lines) + self.viewport;
        self.scroll = top;
        self.follow = top + self.viewport >= lines;
    }

    fn scroll_by(&mut self, delta: isize) {
        let lines = self.line_count();
        let top = self.top_line(lines).saturating_add_signed(delta);
        self.scroll = top;
        self.follow = top + self.viewport >= lines;
    }

    fn jump_to(&mut self, span: Option<Span>) {
        let Some(span) = span else {
            self.status = "No diagnostics".to_string();
            return;
        };

        let line = self.session.console().line_at(span.start);
        self.cursor = Some(span);
        self.follow = false;
        self.scroll = line.saturating_sub(self.viewport / 3);

        let base_dir = self.session.config().result_base_dir();
        self.status = match self.current_diagnostic() {
            Some(d) => format!(
                "{}:{}:{} {}: {}",
                d.resolve(&base_dir).display(),
                d.line,
                d.column,
                d.severity,
                d.message
            ),
            None => format!("line {}", line + 1),
        };
    }

    fn line_count(&self) -> usize {
        self.session.console().line_count()
    }

    fn load_targets(&mut self) {
        match self.session.targets() {
            Ok(entries) => {
                self.entries = entries;
                self.selected = self.session.last_selected_index().unwrap_or(0);
            }
            Err(e) => {
                log::warn!("Could not load build targets: {}", e);
                self.status = e.to_string();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::TargetSource;
    use crate::config::Config;
    use crate::error::BuildError;
    use crossterm::event::KeyModifiers;

    struct StaticSource;

    impl TargetSource for StaticSource {
        fn discover(&self) -> Result<Vec<String>, BuildError> {
            Ok(vec!["alpha".to_string(), "beta".to_string()])
        }
    }

    fn app(dir: &std::path::Path) -> App {
        let mut config = Config::default();
        config.sandbox.host_path = "/home/dev/chip/".to_string();
        config.cache_file = Some(dir.join("targets.list"));
        config.state_file = Some(dir.join("state.json"));
        let (session, rx) = BuildSession::with_source(config, Box::new(StaticSource));
        App::new(session, rx)
    }

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    #[test]
    fn test_picker_navigation() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = app(dir.path());
        assert_eq!(app.view, View::Picker);
        assert_eq!(app.entries.len(), 3);

        app.handle_key(key(KeyCode::Down));
        app.handle_key(key(KeyCode::Down));
        app.handle_key(key(KeyCode::Down));
        assert_eq!(app.selected, 2);

        app.handle_key(key(KeyCode::Up));
        assert_eq!(app.selected, 1);

        app.handle_key(key(KeyCode::Esc));
        assert_eq!(app.view, View::Console);
        app.handle_key(key(KeyCode::Char('b')));
        assert_eq!(app.view, View::Picker);
    }

    #[test]
    fn test_picking_sentinel_reloads_list() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = app(dir.path());

        app.selected = 2;
        app.handle_key(key(KeyCode::Enter));
        assert_eq!(app.view, View::Picker);
        assert_eq!(app.selected, 0);
        assert_eq!(app.status, "Found 2 targets");
    }

    #[test]
    fn test_diagnostic_navigation_wraps() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = app(dir.path());
        app.view = View::Console;

        let console = app.session.console().clone();
        console.write("one\ntwo\nthree\nfour\n");
        console.set_regions(ERRORS_CATEGORY, vec![Span::new(4, 7), Span::new(14, 18)]);

        app.handle_key(key(KeyCode::Char('n')));
        assert_eq!(app.cursor, Some(Span::new(4, 7)));
        assert!(!app.follow);

        app.handle_key(key(KeyCode::Char('n')));
        assert_eq!(app.cursor, Some(Span::new(14, 18)));
        app.handle_key(key(KeyCode::Char('n')));
        assert_eq!(app.cursor, Some(Span::new(4, 7)));

        app.handle_key(key(KeyCode::Char('p')));
        assert_eq!(app.cursor, Some(Span::new(14, 18)));
        assert_eq!(app.status, "line 4");
    }

    #[test]
    fn test_no_diagnostics() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = app(dir.path());
        app.view = View::Console;

        app.handle_key(key(KeyCode::Char('n')));
        assert!(app.cursor.is_none());
        assert_eq!(app.status, "No diagnostics");
    }

    #[test]
    fn test_paging() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = app(dir.path());
        app.view = View::Console;
        app.viewport = 10;

        let text: String = (0..50).map(|i| format!("line {}\n", i)).collect();
        app.session.console().write(&text);
        assert_eq!(app.top_line(50), 40);

        app.handle_key(key(KeyCode::PageUp));
        assert!(!app.follow);
        assert_eq!(app.top_line(50), 30);

        app.handle_key(key(KeyCode::PageDown));
        assert!(app.follow);
        assert_eq!(app.top_line(50), 40);
    }

    #[test]
    fn test_quit() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = app(dir.path());
        app.handle_key(key(KeyCode::Char('q')));
        assert!(app.should_quit);
    }
}
