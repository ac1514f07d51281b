//! Target picker

use crate::app::App;
use crate::catalog::CatalogEntry;
use ratatui::{
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, ListState},
    Frame,
};

pub fn render(f: &mut Frame, app: &App, area: Rect) {
    let items: Vec<ListItem> = app
        .entries
        .iter()
        .map(|entry| {
            let label_style = match entry {
                CatalogEntry::Target(_) => Style::default().fg(Color::White),
                CatalogEntry::Recompute => Style::default()
                    .fg(Color::Magenta)
                    .add_modifier(Modifier::BOLD),
            };

            let mut spans = vec![Span::styled(entry.label().to_string(), label_style)];
            if let Some(note) = entry.annotation() {
                spans.push(Span::styled(
                    format!("  {}", note),
                    Style::default().fg(Color::DarkGray),
                ));
            }
            ListItem::new(Line::from(spans))
        })
        .collect();

    let title = format!("Build targets ({})", app.entries.len().saturating_sub(1));
    let list = List::new(items)
        .block(Block::default().borders(Borders::ALL).title(title))
        .highlight_style(Style::default().bg(Color::DarkGray))
        .highlight_symbol("> ");

    let mut state = ListState::default();
    if !app.entries.is_empty() {
        state.select(Some(app.selected));
    }

    f.render_stateful_widget(list, area, &mut state);
}
