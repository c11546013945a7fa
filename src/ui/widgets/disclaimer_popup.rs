// src/ui/widgets/disclaimer_popup.rs

use ratatui::{
    prelude::*,
    text::Line,
    widgets::{Block, Borders, Clear, Paragraph, Wrap},
};

/// Renders the authorization notice shown before the first scan.
pub fn render_disclaimer_popup(frame: &mut Frame, area: Rect) {
    let disclaimer_text = Text::from(vec![
        Line::from("AUTHORIZED TESTING ONLY".bold().yellow()),
        Line::from(""),
        Line::from("StackGuard RS drives active scanners (OWASP ZAP, Nuclei) as well as passive TLS and header checks against the targets you enter."),
        Line::from(""),
        Line::from("Active scans send attack traffic. Only scan systems you own or have written permission to test; unauthorized scanning is illegal in many jurisdictions."),
        Line::from(""),
        Line::from("The authors accept no liability for misuse of this program or for damage caused by it."),
        Line::from(""),
        Line::from("Press ".bold() + "Enter".bold().yellow() + " to continue or ".bold() + "Esc".bold().yellow() + " to quit".bold()),
    ]);

    let block = Block::default()
        .title("Disclaimer")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Red));

    let popup_area = centered_rect(64, 60, area);
    let popup = Paragraph::new(disclaimer_text)
        .block(block)
        .wrap(Wrap { trim: true })
        .alignment(Alignment::Center);

    // Clear first, or the job view bleeds through.
    frame.render_widget(Clear, popup_area);
    frame.render_widget(popup, popup_area);
}

fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let [_, middle, _] = Layout::vertical([
        Constraint::Percentage((100 - percent_y) / 2),
        Constraint::Percentage(percent_y),
        Constraint::Percentage((100 - percent_y) / 2),
    ])
    .areas(r);

    let [_, center, _] = Layout::horizontal([
        Constraint::Percentage((100 - percent_x) / 2),
        Constraint::Percentage(percent_x),
        Constraint::Percentage((100 - percent_x) / 2),
    ])
    .areas(middle);
    center
}
