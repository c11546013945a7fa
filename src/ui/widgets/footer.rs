// src/ui/widgets/footer.rs

use crate::app::{App, AppState};
use ratatui::{
    prelude::*,
    text::{Line, Span},
    widgets::Paragraph,
};

fn key(label: &str) -> Span<'_> {
    Span::styled(label, Style::new().bold().fg(Color::Yellow))
}

/// Renders the key hints for the current state. A status message replaces them.
pub fn render_footer(frame: &mut Frame, app: &App, area: Rect) {
    if let Some(message) = &app.status_message {
        let line = Line::from(Span::styled(message.as_str(), Style::default().fg(Color::Red)));
        frame.render_widget(Paragraph::new(line).alignment(Alignment::Center), area);
        return;
    }

    let spans = match app.state {
        AppState::Disclaimer => Line::from(vec![key("Enter"), Span::raw(" to continue, "), key("Esc"), Span::raw(" to quit.")]),
        AppState::Idle => Line::from(vec![
            key("Enter"),
            Span::raw(" scan, "),
            key("Tab"),
            Span::raw(" scan type, "),
            key("Shift+Tab"),
            Span::raw(" threshold, "),
            key("Esc"),
            Span::raw(" quit"),
        ]),
        AppState::Scanning => Line::from(vec![
            Span::raw("Waiting for the job... "),
            key("[L]"),
            Span::raw("ogs, "),
            key("Esc"),
            Span::raw(" quit"),
        ]),
        AppState::Finished => Line::from(vec![
            key("[N]"),
            Span::raw("ew Scan, "),
            key("[L]"),
            Span::raw("ogs, "),
            key("↑ ↓"),
            Span::raw(" findings, "),
            key("[Q]"),
            Span::raw("uit"),
        ]),
    };

    frame.render_widget(Paragraph::new(spans).alignment(Alignment::Center), area);
}
