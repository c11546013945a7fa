// src/ui/widgets/analysis_view.rs

use crate::app::{App, AppState, SPINNER_CHARS};
use ratatui::{
    prelude::*,
    text::Line,
    widgets::{Block, Borders, List, ListItem, Paragraph, Wrap},
};
use stackguard_rs::core::models::{
    HttpHeadersReport, JobError, ScanOutput, ScanReport, SslTlsReport, VulnerabilityFinding,
};

use super::severity_style;

pub fn render_analysis_view(frame: &mut Frame, app: &mut App, area: Rect) {
    let main_block = Block::default().borders(Borders::ALL).title(title(app));

    match app.state {
        AppState::Disclaimer | AppState::Idle => {
            let hint = Paragraph::new(vec![
                Line::from(""),
                Line::from("Scan results will appear here..."),
                Line::from("Tab switches between TLS, headers, ZAP and Nuclei.".dark_gray()),
            ])
            .alignment(Alignment::Center);
            frame.render_widget(hint.block(main_block), area);
            return;
        }
        AppState::Scanning => {
            let status = app
                .job_view
                .as_ref()
                .map_or_else(|| "PENDING".to_string(), |view| view.status.to_string());
            let spinner = Paragraph::new(Line::from(vec![
                Span::styled(format!("{} ", SPINNER_CHARS[app.spinner_frame]), Style::default().fg(Color::Cyan)),
                Span::raw(format!("Job {}... ", status)),
            ]))
            .alignment(Alignment::Center);
            frame.render_widget(spinner.block(main_block), area);
            return;
        }
        AppState::Finished => {}
    }

    let inner_area = main_block.inner(area);
    frame.render_widget(main_block, area);

    let Some(view) = app.job_view.clone() else {
        let message = app.status_message.clone().unwrap_or_default();
        frame.render_widget(Paragraph::new(message).wrap(Wrap { trim: true }), inner_area);
        return;
    };

    match (&view.result, &view.error) {
        (Some(ScanOutput::SslTls(report)), _) => render_certificate(frame, report, inner_area),
        (Some(ScanOutput::HttpHeaders(report)), _) => render_headers(frame, report, inner_area),
        (Some(ScanOutput::Zap(report) | ScanOutput::Nuclei(report)), _) => {
            render_findings(frame, app, report, inner_area)
        }
        (None, Some(error)) => render_job_error(frame, error, inner_area),
        (None, None) => {}
    }
}

fn title(app: &App) -> String {
    match &app.active_job {
        Some(job) => format!("{} - {}", job.kind.label(), job.target),
        None => format!("{} Scan", app.scan_kind.label()),
    }
}

fn render_findings(frame: &mut Frame, app: &mut App, report: &ScanReport, area: Rect) {
    if report.findings.is_empty() {
        let text = Text::from(vec![
            Line::from(""),
            Line::from("✓ NO FINDINGS".bold().fg(Color::Green)),
            Line::from(""),
            Line::from(format!("{} reported nothing for {}.", report.scan_tool, report.target)),
        ]);
        frame.render_widget(Paragraph::new(text).alignment(Alignment::Center), area);
        return;
    }

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Percentage(40), Constraint::Min(0)])
        .split(area);

    let items: Vec<ListItem> = report
        .findings
        .iter()
        .map(|finding| {
            ListItem::new(Line::from(vec![
                Span::styled(format!("[{}] ", finding.severity), severity_style(finding.severity)),
                Span::raw(finding.name.as_str()),
            ]))
        })
        .collect();

    let findings_list = List::new(items)
        .highlight_style(Style::new().bg(Color::DarkGray).add_modifier(Modifier::BOLD));
    frame.render_stateful_widget(findings_list, chunks[0], &mut app.findings_list_state);

    let detail_block = Block::default().borders(Borders::TOP).title("Details");
    let selected = app.findings_list_state.selected().and_then(|i| report.findings.get(i));
    let text = match selected {
        Some(finding) => finding_details(finding),
        None => vec![Line::from("Select a finding above to see details.")],
    };
    frame.render_widget(Paragraph::new(text).wrap(Wrap { trim: true }).block(detail_block), chunks[1]);
}

fn finding_details(finding: &VulnerabilityFinding) -> Vec<Line<'_>> {
    let mut lines = vec![Line::from("")];
    let mut field = |label: &'static str, value: Option<String>| {
        if let Some(value) = value.filter(|v| !v.is_empty()) {
            lines.push(Line::from(vec![Span::styled(label, Style::new().yellow().bold()), Span::raw(value)]));
        }
    };
    field("Severity: ", Some(finding.severity.to_string()));
    field("CWE: ", finding.cwe.as_ref().map(ToString::to_string));
    field("URL: ", finding.url_found.clone());
    field("Parameter: ", finding.parameter.clone());
    field("Evidence: ", finding.evidence.clone());

    if !finding.description.is_empty() {
        lines.push(Line::from(""));
        lines.push(Line::from("WHAT IT IS:".yellow().bold()));
        lines.push(Line::from(finding.description.as_str()));
    }
    if let Some(solution) = &finding.solution {
        lines.push(Line::from(""));
        lines.push(Line::from("HOW TO FIX:".yellow().bold()));
        lines.push(Line::from(solution.as_str()));
    }
    lines
}

fn render_certificate(frame: &mut Frame, report: &SslTlsReport, area: Rect) {
    let name = |fields: &std::collections::BTreeMap<String, String>| {
        fields
            .get("commonName")
            .or_else(|| fields.get("organizationName"))
            .cloned()
            .unwrap_or_else(|| "N/A".to_string())
    };
    let date = |value: Option<chrono::NaiveDateTime>| value.map_or_else(|| "N/A".to_string(), |d| d.to_string());
    let (status, style) = if report.is_expired {
        ("✗ EXPIRED", Style::default().fg(Color::Red))
    } else {
        ("✓ VALID", Style::default().fg(Color::Green))
    };

    let lines = vec![
        Line::from(""),
        Line::from(Span::styled(status, style.bold())),
        Line::from(""),
        Line::from(format!("Host:       {}:{}", report.hostname, report.port)),
        Line::from(format!("Protocol:   {}", report.tls_version.as_deref().unwrap_or("N/A"))),
        Line::from(format!("Cipher:     {}", report.cipher.as_deref().unwrap_or("N/A"))),
        Line::from(format!("Subject:    {}", name(&report.subject))),
        Line::from(format!("Issuer:     {}", name(&report.issuer))),
        Line::from(format!("Version:    {}", report.version.map_or("N/A".to_string(), |v| v.to_string()))),
        Line::from(format!("Serial:     {}", report.serial_number.as_deref().unwrap_or("N/A"))),
        Line::from(format!("Not before: {}", date(report.not_before))),
        Line::from(format!("Not after:  {}", date(report.not_after))),
    ];
    frame.render_widget(Paragraph::new(lines).wrap(Wrap { trim: false }), area);
}

fn render_headers(frame: &mut Frame, report: &HttpHeadersReport, area: Rect) {
    let mut lines = vec![
        Line::from(format!("{} -> HTTP {}", report.final_url, report.status_code)),
        Line::from(""),
    ];
    for (header, value) in report.security_headers_summary.entries() {
        lines.push(match value {
            Some(value) => Line::from(vec![
                Span::styled("✓ ", Style::default().fg(Color::Green)),
                Span::styled(header, Style::new().bold()),
                Span::raw(format!(": {}", value)),
            ]),
            None => Line::from(vec![
                Span::styled("✗ ", Style::default().fg(Color::Red)),
                Span::raw(header),
                Span::styled(" (missing)", Style::default().fg(Color::DarkGray)),
            ]),
        });
    }
    lines.push(Line::from(""));
    lines.push(Line::from(Span::from(format!("{} response headers in total.", report.all_headers.len())).dark_gray()));
    frame.render_widget(Paragraph::new(lines).wrap(Wrap { trim: false }), area);
}

fn render_job_error(frame: &mut Frame, error: &JobError, area: Rect) {
    let mut lines = vec![
        Line::from(""),
        Line::from(Span::from(format!("✗ {}", error.kind)).bold().fg(Color::Red)),
        Line::from(""),
        Line::from(error.error.as_str()),
    ];
    if let Some(details) = &error.details {
        lines.push(Line::from(""));
        lines.push(Line::from("DETAILS:".yellow().bold()));
        let pretty = serde_json::to_string_pretty(details).unwrap_or_default();
        lines.extend(pretty.lines().map(|line| Line::from(line.to_string())));
    }
    frame.render_widget(Paragraph::new(lines).wrap(Wrap { trim: false }), area);
}
