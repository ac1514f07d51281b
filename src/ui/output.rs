//! Console view - build output with diagnostic lines highlighted

use crate::app::App;
use crate::indexer::{Severity, ERRORS_CATEGORY};
use ratatui::{
    layout::Rect,
    style::{Color, Modifier, Style},
    text::Line,
    widgets::{Block, Borders, Paragraph},
    Frame,
};

pub fn render(f: &mut Frame, app: &App, area: Rect) {
    let console = app.session.console();
    let diagnostics = app.session.diagnostics();

    let title = match app.session.current_target() {
        Some(target) => format!("Output: {}", target),
        None => "Output".to_string(),
    };

    if console.is_empty() {
        let empty = Paragraph::new("(no build yet, press b to pick a target)")
            .block(Block::default().borders(Borders::ALL).title(title))
            .style(Style::default().fg(Color::DarkGray));
        f.render_widget(empty, area);
        return;
    }

    let height = area.height.saturating_sub(2) as usize;
    let top = app.top_line(console.line_count());
    let regions = console.regions(ERRORS_CATEGORY);

    let lines: Vec<Line> = console
        .lines(top, height)
        .into_iter()
        .map(|(start, raw)| {
            let mut style = Style::default();
            if let Some(span) = regions.iter().find(|span| span.start == start) {
                let severity = diagnostics
                    .iter()
                    .find(|d| d.span == *span)
                    .map(|d| d.severity)
                    .unwrap_or(Severity::Error);
                style = match severity {
                    Severity::Error => style.fg(Color::Red),
                    Severity::Warning => style.fg(Color::Yellow),
                };
                if app.cursor == Some(*span) {
                    style = style.add_modifier(Modifier::REVERSED);
                }
            }
            Line::styled(raw, style)
        })
        .collect();

    let output = Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title(title));
    f.render_widget(output, area);
}
