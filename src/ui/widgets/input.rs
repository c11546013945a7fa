// src/ui/widgets/input.rs

use crate::app::{App, AppState};
use ratatui::{
    prelude::*,
    widgets::{Block, Borders, Paragraph},
};

/// Renders the target input box. The title carries the selected scan and gate.
pub fn render_input(frame: &mut Frame, app: &App, area: Rect) {
    let title = Line::from(vec![
        Span::raw(" Target URL "),
        Span::styled(format!("[{}]", app.scan_kind.label()), Style::new().bold().fg(Color::Cyan)),
        Span::raw(" fail on "),
        Span::styled(format!("{}+", app.fail_on), super::severity_style(app.fail_on).bold()),
        Span::raw(" "),
    ]);
    let input_block = Block::default().borders(Borders::ALL).title(title);
    let input_paragraph = Paragraph::new(app.input.as_str())
        .block(input_block)
        .style(Style::default().fg(Color::Yellow));
    frame.render_widget(input_paragraph, area);

    if let AppState::Idle = app.state {
        frame.set_cursor_position(Position::new(
            area.x + app.input.chars().count() as u16 + 1,
            area.y + 1,
        ));
    }
}
