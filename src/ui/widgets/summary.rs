// src/ui/widgets/summary.rs

use crate::app::{App, AppState};
use ratatui::{
    prelude::*,
    text::Line,
    widgets::{Block, Borders, Paragraph},
};
use stackguard_rs::core::models::SeveritySummary;
use stackguard_rs::core::policy::PolicyVerdict;

use super::severity_style;

/// Renders the verdict, the per-severity counts for the current job and the
/// totals across every successful job of this session.
pub fn render_summary(frame: &mut Frame, app: &App, area: Rect) {
    let summary_container = Block::default().borders(Borders::ALL).title("Summary");
    frame.render_widget(summary_container, area);

    let summary_chunks = Layout::default()
        .direction(Direction::Vertical)
        .margin(1)
        .constraints([
            Constraint::Length(3), // Verdict
            Constraint::Length(1),
            Constraint::Length(8), // Current job
            Constraint::Length(1),
            Constraint::Min(0), // Session
        ])
        .split(area);

    if matches!(app.state, AppState::Finished) {
        frame.render_widget(verdict_paragraph(app), summary_chunks[0]);
    }

    if let Some(report) = app.job_view.as_ref().and_then(|view| view.result.as_ref()).and_then(|output| output.report()) {
        frame.render_widget(
            Paragraph::new(count_lines(&report.summary)).block(Block::default().title("THIS SCAN".bold())),
            summary_chunks[2],
        );
    }

    if !app.session_runs.is_empty() {
        let session = app.session_summary();
        let mut lines = vec![Line::from(format!(
            "{} job(s), {} finding(s)",
            app.session_runs.len(),
            session.total()
        ))];
        lines.extend(count_lines(&session));
        frame.render_widget(
            Paragraph::new(lines).block(Block::default().title("SESSION".bold())),
            summary_chunks[4],
        );
    }
}

fn verdict_paragraph(app: &App) -> Paragraph<'_> {
    let threshold = Line::from(format!("Fail on {} and above", app.fail_on)).style(Style::default().fg(Color::DarkGray));
    let verdict = match (&app.verdict, app.job_view.as_ref().and_then(|view| view.error.as_ref())) {
        (Some(PolicyVerdict::Pass), _) => Line::from("PASS".bold()).style(Style::default().fg(Color::Green)),
        (Some(PolicyVerdict::Fail { severity, .. }), _) => {
            Line::from(Span::from(format!("FAIL ({})", severity)).bold()).style(Style::default().fg(Color::Red))
        }
        (None, Some(error)) => Line::from(Span::from(error.kind.to_string()).bold()).style(Style::default().fg(Color::Red)),
        (None, None) => Line::from("No findings to gate".italic()),
    };
    Paragraph::new(Text::from(vec![verdict, threshold])).alignment(Alignment::Center)
}

fn count_lines(summary: &SeveritySummary) -> Vec<Line<'static>> {
    summary
        .iter()
        .map(|(severity, count)| {
            Line::from(vec![
                Span::styled(format!("{:<14}", severity.to_string()), severity_style(severity)),
                Span::raw(count.to_string()),
            ])
        })
        .collect()
}
