//! ZAP and Nuclei adapters driven against stub executables.
#![cfg(unix)]

use std::fs;
use std::path::Path;
use std::time::Duration;

use tempfile::TempDir;
use url::Url;

use stackguard_rs::config::{ScannerSettings, Settings};
use stackguard_rs::core::error::ErrorKind;
use stackguard_rs::core::jobs::ScanEngine;
use stackguard_rs::core::models::{
    Cwe, ErrorCategory, JobStatus, NucleiScanConfig, ScanKind, ScanOutput, ScanSubmission, Severity, ZapScanConfig,
};
use stackguard_rs::core::policy::{PolicyVerdict, evaluate_policy, filter_report};
use stackguard_rs::core::scanner::nuclei_scanner::run_nuclei_scan;
use stackguard_rs::core::scanner::zap_scanner::run_zap_scan;

const ZAP_ALERTS: &str = r#"[
  {"name": "Cross Site Scripting (Reflected)", "risk": "High", "cweid": 79,
   "url": "https://example.com/search", "param": "q", "evidence": "<script>", "solution": "Encode output."},
  {"alert": "Cookie Without Secure Flag", "risk": "low", "desc": "Cookie sent over http.", "cweid": "614"},
  {"name": "Server Leaks Version", "risk": "Informational"}
]"#;

const NUCLEI_LINES: &str = r#"{"template-id": "exposed-git", "info": {"name": "Exposed .git", "severity": "critical", "classification": {"cwe-id": ["CWE-538"]}}, "matched-at": "https://example.com/.git/config"}
not json at all
{"template-id": "tech-detect", "info": {"severity": "info"}, "host": "example.com", "extracted-results": ["nginx", "1.25"]}
{"template-id": "odd-severity", "info": {"name": "Odd", "severity": "urgent"}}"#;

/// Writes a shell stub that records its arguments, prints `stdout` and exits with `code`.
fn stub(dir: &Path, name: &str, stdout: &str, code: i32) -> Vec<String> {
    let payload = dir.join(format!("{}.out", name));
    fs::write(&payload, stdout).unwrap();
    let args_file = dir.join(format!("{}.args", name));
    let script = dir.join(format!("{}.sh", name));
    fs::write(
        &script,
        format!(
            "echo \"$@\" > '{}'\ncat '{}'\nexit {}\n",
            args_file.display(),
            payload.display(),
            code
        ),
    )
    .unwrap();
    vec!["sh".to_string(), script.display().to_string()]
}

fn recorded_args(dir: &Path, name: &str) -> String {
    fs::read_to_string(dir.join(format!("{}.args", name))).unwrap()
}

fn target() -> Url {
    Url::parse("https://example.com").unwrap()
}

#[tokio::test]
async fn test_zap_alerts_are_normalized() {
    let dir = TempDir::new().unwrap();
    let mut settings = ScannerSettings::default();
    // Exit code 1 means ZAP found warnings; it is still a successful scan.
    settings.zap.baseline_command = stub(dir.path(), "zap", ZAP_ALERTS, 1);

    let report = run_zap_scan(&ZapScanConfig::new(target()), &settings).await.unwrap();

    assert!(recorded_args(dir.path(), "zap").starts_with("-t https://example.com/ -j"));
    assert_eq!(report.scan_tool, "OWASP ZAP Baseline");
    assert_eq!(report.findings.len(), 3);
    assert!(report.is_consistent());
    assert_eq!(report.summary.count(Severity::High), 1);
    assert_eq!(report.summary.count(Severity::Low), 1);
    assert_eq!(report.summary.count(Severity::Informational), 1);
    assert_eq!(report.summary.count(Severity::Critical), 0);

    let xss = &report.findings[0];
    assert_eq!(xss.cwe, Some(Cwe::Id(79)));
    assert_eq!(xss.parameter.as_deref(), Some("q"));
    assert_eq!(xss.url_found.as_deref(), Some("https://example.com/search"));

    let cookie = &report.findings[1];
    assert_eq!(cookie.name, "Cookie Without Secure Flag");
    assert_eq!(cookie.description, "Cookie sent over http.");
    assert_eq!(cookie.url_found.as_deref(), Some("https://example.com/"));

    assert!(evaluate_policy(&report, Some("High")).unwrap().is_fail());
    let filtered = filter_report(&report, Some("Low")).unwrap();
    assert_eq!(filtered.findings.len(), 2);
    assert!(filtered.is_consistent());
}

#[tokio::test]
async fn test_zap_error_exit_keeps_process_output() {
    let dir = TempDir::new().unwrap();
    let mut settings = ScannerSettings::default();
    settings.zap.baseline_command = stub(dir.path(), "zap", "boom", 3);

    let error = run_zap_scan(&ZapScanConfig::new(target()), &settings).await.unwrap_err();
    assert_eq!(error.category, ErrorCategory::ProcessFailed);
    assert!(error.message.contains("exit code 3"));
    assert_eq!(error.stdout.as_deref(), Some("boom"));
}

#[tokio::test]
async fn test_nuclei_skips_bad_lines() {
    let dir = TempDir::new().unwrap();
    let mut settings = ScannerSettings::default();
    settings.nuclei.command = stub(dir.path(), "nuclei", NUCLEI_LINES, 0);

    let mut config = NucleiScanConfig::new(target());
    config.templates = Some(vec!["exposures/".to_string(), "technologies/".to_string()]);
    config.severity = Some(vec!["Critical".to_string(), "informational".to_string()]);
    let report = run_nuclei_scan(&config, &settings).await.unwrap();

    let args = recorded_args(dir.path(), "nuclei");
    assert!(args.contains("-jsonl"));
    assert!(args.contains("-t exposures/,technologies/"));
    assert!(args.contains("-s critical,info"));

    assert_eq!(report.findings.len(), 3);
    assert!(report.is_consistent());
    assert_eq!(report.summary.iter().count(), 6);

    let git = &report.findings[0];
    assert_eq!(git.severity, Severity::Critical);
    assert_eq!(git.cwe, Some(Cwe::Id(538)));
    assert_eq!(git.url_found.as_deref(), Some("https://example.com/.git/config"));

    let tech = &report.findings[1];
    assert_eq!(tech.name, "tech-detect");
    assert_eq!(tech.severity, Severity::Informational);
    assert_eq!(tech.evidence.as_deref(), Some("nginx, 1.25"));
    assert_eq!(tech.url_found.as_deref(), Some("example.com"));

    assert_eq!(report.findings[2].severity, Severity::Unknown);
}

#[tokio::test]
async fn test_nuclei_failure_without_output_is_an_error() {
    let dir = TempDir::new().unwrap();
    let mut settings = ScannerSettings::default();
    settings.nuclei.command = stub(dir.path(), "nuclei", "", 2);

    let error = run_nuclei_scan(&NucleiScanConfig::new(target()), &settings).await.unwrap_err();
    assert_eq!(error.category, ErrorCategory::ProcessFailed);
}

#[tokio::test]
async fn test_missing_executable_is_a_process_failure() {
    let mut settings = ScannerSettings::default();
    settings.nuclei.command = vec!["/nonexistent/stackguard-nuclei".to_string()];

    let error = run_nuclei_scan(&NucleiScanConfig::new(target()), &settings).await.unwrap_err();
    assert_eq!(error.category, ErrorCategory::ProcessFailed);
}

async fn run_job(settings: &Settings, submission: ScanSubmission) -> stackguard_rs::core::models::JobView {
    let engine = ScanEngine::local(settings);
    let handle = engine.dispatcher.submit(submission).await.unwrap();
    for _ in 0..500 {
        let view = engine.tracker.status(&handle.job_id).await.unwrap();
        if view.is_terminal() {
            return view;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("job {} never finished", handle.job_id);
}

#[tokio::test]
async fn test_nuclei_job_end_to_end() {
    let dir = TempDir::new().unwrap();
    let mut settings = Settings::default();
    settings.scanner.nuclei.command = stub(dir.path(), "nuclei", NUCLEI_LINES, 0);

    let submission = ScanSubmission::new(ScanKind::Nuclei, "https://example.com")
        .with_nuclei_config(NucleiScanConfig::new(target()));
    let view = run_job(&settings, submission).await;

    assert_eq!(view.status, JobStatus::Success);
    let Some(ScanOutput::Nuclei(report)) = &view.result else {
        panic!("expected a Nuclei report, got {:?}", view.result);
    };
    assert_eq!(report.findings.len(), 3);
    match evaluate_policy(report, Some("high")).unwrap() {
        PolicyVerdict::Fail { finding_name, .. } => assert_eq!(finding_name, "Exposed .git"),
        PolicyVerdict::Pass => panic!("a critical finding must fail a high threshold"),
    }
}

#[tokio::test]
async fn test_zap_job_failure_is_reported_as_tool_error() {
    let dir = TempDir::new().unwrap();
    let mut settings = Settings::default();
    settings.scanner.zap.baseline_command = stub(dir.path(), "zap", "", 2);

    let submission =
        ScanSubmission::new(ScanKind::Zap, "https://example.com").with_zap_config(ZapScanConfig::new(target()));
    let view = run_job(&settings, submission).await;

    assert_eq!(view.status, JobStatus::Failure);
    let error = view.error.unwrap();
    assert_eq!(error.kind, ErrorKind::ToolExecutionError);
    assert!(error.error.contains("exit code 2"));

    let json = serde_json::to_value(&error).unwrap();
    assert_eq!(json["kind"], "TOOL_EXECUTION_ERROR");
    assert_eq!(json["details"]["category"], "PROCESS_FAILED");
}
