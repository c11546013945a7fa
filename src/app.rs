// src/app.rs

use chrono::{DateTime, Utc};
use ratatui::widgets::{ListState, ScrollbarState};
use strum::IntoEnumIterator;
use url::Url;

use stackguard_rs::core::models::{
    JobId, JobView, NucleiScanConfig, ScanKind, ScanOutput, ScanSubmission, Severity, SeveritySummary,
    VulnerabilityFinding, ZapScanConfig,
};
use stackguard_rs::core::policy::{PolicyVerdict, gate};
use stackguard_rs::core::reporting::{ScanRun, overall_summary};

pub const SPINNER_CHARS: [char; 10] = ['⠋', '⠙', '⠹', '⠸', '⠼', '⠴', '⠦', '⠧', '⠇', '⠏'];

pub enum AppState {
    Disclaimer,
    Idle,
    Scanning,
    Finished,
}

/// The job currently being polled.
pub struct ActiveJob {
    pub job_id: JobId,
    pub kind: ScanKind,
    pub target: String,
    pub submitted_at: DateTime<Utc>,
}

pub struct App {
    pub should_quit: bool,
    pub state: AppState,
    pub input: String,
    pub scan_kind: ScanKind,
    pub fail_on: Severity,
    pub active_job: Option<ActiveJob>,
    pub job_view: Option<JobView>,
    pub verdict: Option<PolicyVerdict>,
    pub status_message: Option<String>,
    pub findings_list_state: ListState,
    pub spinner_frame: usize,
    pub show_logs: bool,
    pub log_content: Vec<String>,
    pub log_horizontal_scroll: usize,
    pub log_horizontal_scroll_state: ScrollbarState,
    pub session_runs: Vec<ScanRun>,
}

impl App {
    pub fn new() -> Self {
        Self {
            should_quit: false,
            state: AppState::Disclaimer,
            input: String::new(),
            scan_kind: ScanKind::HttpHeaders,
            fail_on: Severity::High,
            active_job: None,
            job_view: None,
            verdict: None,
            status_message: None,
            findings_list_state: ListState::default(),
            spinner_frame: 0,
            show_logs: false,
            log_content: Vec::new(),
            log_horizontal_scroll: 0,
            log_horizontal_scroll_state: ScrollbarState::default(),
            session_runs: Vec::new(),
        }
    }

    /// Builds a submission from the input box. A missing scheme defaults to https.
    pub fn submission(&self) -> Option<ScanSubmission> {
        let raw = self.input.trim();
        if raw.is_empty() {
            return None;
        }
        let target = if raw.starts_with("http://") || raw.starts_with("https://") {
            raw.to_string()
        } else {
            format!("https://{}", raw)
        };

        let submission = ScanSubmission::new(self.scan_kind, target.clone());
        let submission = match self.scan_kind {
            ScanKind::Zap => submission.with_zap_config(ZapScanConfig::new(Url::parse(&target).ok()?)),
            ScanKind::Nuclei => submission.with_nuclei_config(NucleiScanConfig::new(Url::parse(&target).ok()?)),
            ScanKind::SslTls | ScanKind::HttpHeaders => submission,
        };
        Some(submission)
    }

    pub fn start_job(&mut self, job_id: JobId, submission: &ScanSubmission) {
        self.active_job = Some(ActiveJob {
            job_id,
            kind: submission.scan_type,
            target: submission.target_url.clone(),
            submitted_at: Utc::now(),
        });
        self.job_view = None;
        self.verdict = None;
        self.status_message = None;
        self.findings_list_state = ListState::default();
        self.state = AppState::Scanning;
    }

    /// Records the latest poll result. Terminal views end the scan and are archived.
    pub fn apply_job_view(&mut self, view: JobView) {
        if !view.is_terminal() {
            self.job_view = Some(view);
            return;
        }

        self.verdict = view
            .result
            .as_ref()
            .and_then(ScanOutput::report)
            .map(|report| gate(report, self.fail_on));
        if let Some(job) = &self.active_job {
            self.session_runs.push(ScanRun::from_job_view(
                &view,
                job.kind,
                job.target.clone(),
                job.submitted_at,
                Utc::now(),
            ));
        }
        self.job_view = Some(view);
        if !self.findings().is_empty() {
            self.findings_list_state.select(Some(0));
        }
        self.state = AppState::Finished;
    }

    /// Ends the current scan with a message instead of a job view.
    pub fn fail_scan(&mut self, message: String) {
        self.status_message = Some(message);
        self.state = AppState::Finished;
    }

    pub fn findings(&self) -> &[VulnerabilityFinding] {
        self.job_view
            .as_ref()
            .and_then(|view| view.result.as_ref())
            .and_then(ScanOutput::report)
            .map(|report| report.findings.as_slice())
            .unwrap_or_default()
    }

    pub fn session_summary(&self) -> SeveritySummary {
        overall_summary(&self.session_runs)
    }

    pub fn cycle_scan_kind(&mut self) {
        let kinds: Vec<ScanKind> = ScanKind::iter().collect();
        let index = kinds.iter().position(|kind| *kind == self.scan_kind).unwrap_or(0);
        self.scan_kind = kinds[(index + 1) % kinds.len()];
    }

    pub fn cycle_fail_on(&mut self) {
        let levels: Vec<Severity> = Severity::iter().collect();
        let index = levels.iter().position(|level| *level == self.fail_on).unwrap_or(0);
        self.fail_on = levels[(index + 1) % levels.len()];
    }

    pub fn select_next(&mut self) {
        let count = self.findings().len();
        if count == 0 {
            return;
        }
        let next = self.findings_list_state.selected().map_or(0, |i| (i + 1).min(count - 1));
        self.findings_list_state.select(Some(next));
    }

    pub fn select_previous(&mut self) {
        let previous = self.findings_list_state.selected().map_or(0, |i| i.saturating_sub(1));
        if !self.findings().is_empty() {
            self.findings_list_state.select(Some(previous));
        }
    }

    pub fn on_tick(&mut self) {
        if matches!(self.state, AppState::Scanning) {
            self.spinner_frame = (self.spinner_frame + 1) % SPINNER_CHARS.len();
        }
    }

    pub fn scroll_logs_left(&mut self) {
        self.log_horizontal_scroll = self.log_horizontal_scroll.saturating_sub(4);
        self.log_horizontal_scroll_state = self.log_horizontal_scroll_state.position(self.log_horizontal_scroll);
    }

    pub fn scroll_logs_right(&mut self) {
        self.log_horizontal_scroll = self.log_horizontal_scroll.saturating_add(4);
        self.log_horizontal_scroll_state = self.log_horizontal_scroll_state.position(self.log_horizontal_scroll);
    }

    pub fn quit(&mut self) {
        self.should_quit = true;
    }

    pub fn reset(&mut self) {
        self.state = AppState::Idle;
        self.input = String::new();
        self.active_job = None;
        self.job_view = None;
        self.verdict = None;
        self.status_message = None;
        self.findings_list_state = ListState::default();
        self.spinner_frame = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use stackguard_rs::core::models::ScanReport;

    fn finding(severity: Severity) -> VulnerabilityFinding {
        VulnerabilityFinding {
            name: format!("{} finding", severity),
            severity,
            description: String::new(),
            cwe: None,
            url_found: None,
            parameter: None,
            evidence: None,
            solution: None,
            raw_details: json!({}),
        }
    }

    #[test]
    fn test_submission_defaults_to_https() {
        let mut app = App::new();
        app.input = "example.com".to_string();
        app.scan_kind = ScanKind::Nuclei;

        let submission = app.submission().unwrap();
        assert_eq!(submission.target_url, "https://example.com");
        assert!(submission.nuclei_config.is_some());
    }

    #[test]
    fn test_terminal_view_finishes_and_archives() {
        let mut app = App::new();
        app.input = "example.com".to_string();
        let submission = app.submission().unwrap();
        let job_id = JobId::from("job-1");
        app.start_job(job_id.clone(), &submission);

        let report = ScanReport::new(
            "Nuclei",
            "https://example.com",
            &[Severity::Critical, Severity::Low],
            vec![finding(Severity::Critical), finding(Severity::Low)],
        );
        app.apply_job_view(JobView::success(job_id, ScanOutput::Nuclei(report)));

        assert!(matches!(app.state, AppState::Finished));
        assert!(app.verdict.as_ref().is_some_and(PolicyVerdict::is_fail));
        assert_eq!(app.session_runs.len(), 1);
        assert_eq!(app.session_summary().count(Severity::Critical), 1);
        assert_eq!(app.findings_list_state.selected(), Some(0));

        app.select_next();
        app.select_next();
        assert_eq!(app.findings_list_state.selected(), Some(1));
    }

    #[test]
    fn test_selectors_cycle() {
        let mut app = App::new();
        for _ in 0..4 {
            app.cycle_scan_kind();
        }
        assert_eq!(app.scan_kind, ScanKind::HttpHeaders);

        app.fail_on = Severity::Critical;
        app.cycle_fail_on();
        assert_eq!(app.fail_on, Severity::Informational);
    }
}
