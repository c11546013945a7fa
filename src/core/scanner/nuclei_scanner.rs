// src/core/scanner/nuclei_scanner.rs

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::config::ScannerSettings;
use crate::core::models::{
    Cwe, ErrorCategory, NucleiScanConfig, ScanReport, Severity, ToolError, VulnerabilityFinding,
};
use crate::core::scanner::process::{ProcessOutput, run_process};

pub const NUCLEI_TOOL_NAME: &str = "Nuclei";

pub const NUCLEI_SEVERITIES: [Severity; 6] = [
    Severity::Critical,
    Severity::High,
    Severity::Medium,
    Severity::Low,
    Severity::Informational,
    Severity::Unknown,
];

const NUCLEI_SOLUTION: &str = "Refer to template details and general remediation guidelines.";

static CWE_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^\s*(?:CWE-)?(\d+)\s*$").unwrap());

/// Runs Nuclei against the configured target and normalizes its JSONL findings.
pub async fn run_nuclei_scan(
    config: &NucleiScanConfig,
    settings: &ScannerSettings,
) -> Result<ScanReport, ToolError> {
    let target = config.target_url.to_string();
    info!(target = %target, "Starting Nuclei scan.");

    let output = run_process(&settings.nuclei.command, &nuclei_args(config), &[]).await?;
    let report = parse_nuclei_output(&output, &target)?;

    info!(findings = report.findings.len(), "Nuclei scan finished.");
    Ok(report)
}

pub fn nuclei_args(config: &NucleiScanConfig) -> Vec<String> {
    let mut args = vec![
        "-u".to_string(),
        config.target_url.to_string(),
        "-jsonl".to_string(),
        "-silent".to_string(),
    ];

    if let Some(templates) = config.templates.as_ref().filter(|t| !t.is_empty()) {
        args.push("-t".to_string());
        args.push(templates.join(","));
    }

    let severities: Vec<&str> = config
        .severity
        .iter()
        .flatten()
        .filter_map(|raw| {
            let mapped = cli_severity(raw);
            if mapped.is_none() {
                warn!(severity = %raw, "Ignoring unrecognized Nuclei severity filter.");
            }
            mapped
        })
        .collect();
    if !severities.is_empty() {
        args.push("-s".to_string());
        args.push(severities.join(","));
    }

    for (key, value) in config.other_options.iter().flatten() {
        let value = match value {
            Value::String(text) => text.clone(),
            other => other.to_string(),
        };
        args.push("-var".to_string());
        args.push(format!("{}={}", key, value));
    }
    args
}

fn cli_severity(raw: &str) -> Option<&'static str> {
    match raw.trim().to_lowercase().as_str() {
        "critical" => Some("critical"),
        "high" => Some("high"),
        "medium" => Some("medium"),
        "low" => Some("low"),
        "info" | "informational" => Some("info"),
        "unknown" => Some("unknown"),
        _ => None,
    }
}

/// Interprets a finished Nuclei process.
///
/// Every stdout line is a JSON record. Lines that fail to decode are skipped.
/// A nonzero exit is only a failure when no finding could be recovered; with
/// partial output the findings are returned and the exit code is logged.
pub fn parse_nuclei_output(output: &ProcessOutput, target: &str) -> Result<ScanReport, ToolError> {
    let exited_cleanly = output.exit_code == Some(0);

    if !exited_cleanly && output.stdout.trim().is_empty() {
        error!(exit_code = %output.exit_code_label(), stderr = %output.stderr, "Nuclei scan process failed.");
        return Err(ToolError::new(
            ErrorCategory::ProcessFailed,
            format!("Nuclei scan failed with exit code {} and produced no output.", output.exit_code_label()),
        )
        .with_output(&output.stdout, &output.stderr));
    }

    let mut findings = Vec::new();
    let mut skipped = 0usize;
    for (index, line) in output.stdout.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<Value>(line) {
            Ok(record) if record.is_object() => findings.push(normalize_record(record, target)),
            Ok(_) => {
                skipped += 1;
                warn!(line = index + 1, "Skipping Nuclei output line that is not a JSON object.");
            }
            Err(e) => {
                skipped += 1;
                warn!(line = index + 1, error = %e, "Skipping undecodable Nuclei output line.");
            }
        }
    }
    debug!(parsed = findings.len(), skipped, "Decoded Nuclei output.");

    if !exited_cleanly {
        if findings.is_empty() {
            error!(exit_code = %output.exit_code_label(), skipped, "Nuclei failed and no finding could be decoded.");
            return Err(ToolError::new(
                ErrorCategory::ProcessFailed,
                format!(
                    "Nuclei scan failed with exit code {}; no findings could be decoded from its output.",
                    output.exit_code_label()
                ),
            )
            .with_output(&output.stdout, &output.stderr));
        }
        warn!(
            exit_code = %output.exit_code_label(),
            findings = findings.len(),
            "Nuclei exited with an error, keeping the findings it reported."
        );
    }

    Ok(ScanReport::new(NUCLEI_TOOL_NAME, target, &NUCLEI_SEVERITIES, findings))
}

fn normalize_record(record: Value, target: &str) -> VulnerabilityFinding {
    let info = record.get("info");
    let info_text = |key: &str| info.and_then(|i| i.get(key)).and_then(Value::as_str).map(String::from);
    let record_text = |key: &str| record.get(key).and_then(Value::as_str).map(String::from);

    let name = info_text("name")
        .or_else(|| record_text("template-id"))
        .unwrap_or_else(|| "N/A".to_string());
    let severity = nuclei_severity(info.and_then(|i| i.get("severity")).and_then(Value::as_str).unwrap_or("unknown"));
    let cwe = info
        .and_then(|i| i.get("classification"))
        .and_then(|c| c.get("cwe-id"))
        .and_then(parse_cwe)
        .map(Cwe::Id);
    let url_found = record_text("matched-at")
        .or_else(|| record_text("host"))
        .or_else(|| Some(target.to_string()));
    let evidence = extracted_evidence(&record).or_else(|| record_text("matcher-name"));
    let description = info_text("description").unwrap_or_default();

    VulnerabilityFinding {
        name,
        severity,
        description,
        cwe,
        url_found,
        parameter: None,
        evidence,
        solution: Some(NUCLEI_SOLUTION.to_string()),
        raw_details: record,
    }
}

fn extracted_evidence(record: &Value) -> Option<String> {
    let results = record.get("extracted-results")?.as_array()?;
    if results.is_empty() {
        return None;
    }
    let parts: Vec<String> = results
        .iter()
        .map(|value| match value {
            Value::String(text) => text.clone(),
            other => other.to_string(),
        })
        .collect();
    Some(parts.join(", "))
}

pub fn nuclei_severity(raw: &str) -> Severity {
    match raw.trim().to_lowercase().as_str() {
        "critical" => Severity::Critical,
        "high" => Severity::High,
        "medium" => Severity::Medium,
        "low" => Severity::Low,
        "info" | "informational" => Severity::Informational,
        _ => Severity::Unknown,
    }
}

/// Derives a numeric CWE id from `cwe-id`, which may be a list (first element
/// wins), a `CWE-<n>` string, a bare number string, or an integer.
pub fn parse_cwe(value: &Value) -> Option<u32> {
    match value {
        Value::Array(items) => items.first().and_then(parse_cwe),
        Value::String(text) => CWE_PATTERN
            .captures(text)
            .and_then(|caps| caps.get(1))
            .and_then(|id| id.as_str().parse().ok()),
        Value::Number(number) => number.as_u64().and_then(|id| u32::try_from(id).ok()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use url::Url;

    fn output(exit_code: Option<i32>, stdout: &str, stderr: &str) -> ProcessOutput {
        ProcessOutput {
            exit_code,
            stdout: stdout.to_string(),
            stderr: stderr.to_string(),
        }
    }

    fn line(severity: &str, cwe: Value) -> String {
        json!({
            "template-id": "tech-detect",
            "host": "https://example.com",
            "matched-at": "https://example.com/login",
            "info": {
                "name": format!("{} template", severity),
                "severity": severity,
                "description": "Something matched",
                "classification": {"cwe-id": cwe}
            },
            "extracted-results": ["v1.2"]
        })
        .to_string()
    }

    #[test]
    fn test_cwe_forms() {
        assert_eq!(parse_cwe(&json!(["CWE-79", "CWE-80"])), Some(79));
        assert_eq!(parse_cwe(&json!("cwe-89")), Some(89));
        assert_eq!(parse_cwe(&json!("22")), Some(22));
        assert_eq!(parse_cwe(&json!(200)), Some(200));
        assert_eq!(parse_cwe(&json!("not-a-cwe")), None);
        assert_eq!(parse_cwe(&json!([])), None);
        assert_eq!(parse_cwe(&Value::Null), None);
    }

    #[test]
    fn test_records_are_normalized() {
        let stdout = [line("high", json!(["CWE-79"])), line("info", json!(null))].join("\n");
        let report = parse_nuclei_output(&output(Some(0), &stdout, ""), "https://example.com").unwrap();

        assert_eq!(report.scan_tool, NUCLEI_TOOL_NAME);
        assert!(report.is_consistent());
        assert_eq!(report.summary.iter().count(), 6);
        assert_eq!(report.summary.count(Severity::High), 1);
        assert_eq!(report.summary.count(Severity::Informational), 1);

        let high = &report.findings[0];
        assert_eq!(high.cwe, Some(Cwe::Id(79)));
        assert_eq!(high.url_found.as_deref(), Some("https://example.com/login"));
        assert_eq!(high.evidence.as_deref(), Some("v1.2"));
        assert_eq!(high.solution.as_deref(), Some(NUCLEI_SOLUTION));
        assert_eq!(high.raw_details["template-id"], "tech-detect");
    }

    #[test]
    fn test_unrecognized_severity_is_unknown() {
        let stdout = line("weird", json!(null));
        let report = parse_nuclei_output(&output(Some(0), &stdout, ""), "https://example.com").unwrap();
        assert_eq!(report.findings[0].severity, Severity::Unknown);
        assert_eq!(report.summary.count(Severity::Unknown), 1);
    }

    #[test]
    fn test_bad_lines_are_skipped() {
        let stdout = format!("{}\n{{broken\n[1,2]\n\n{}", line("low", json!(null)), line("medium", json!(null)));
        let report = parse_nuclei_output(&output(Some(0), &stdout, ""), "https://example.com").unwrap();
        assert_eq!(report.findings.len(), 2);
    }

    #[test]
    fn test_matcher_name_used_without_extracted_results() {
        let stdout = json!({"info": {"name": "Panel", "severity": "low"}, "matcher-name": "admin", "extracted-results": []})
            .to_string();
        let report = parse_nuclei_output(&output(Some(0), &stdout, ""), "https://example.com").unwrap();
        let finding = &report.findings[0];
        assert_eq!(finding.evidence.as_deref(), Some("admin"));
        assert_eq!(finding.url_found.as_deref(), Some("https://example.com"));
    }

    #[test]
    fn test_failed_exit_without_output_is_an_error() {
        let error = parse_nuclei_output(&output(Some(2), "  \n", "flag provided but not defined"), "t").unwrap_err();
        assert_eq!(error.category, ErrorCategory::ProcessFailed);
        assert_eq!(error.stderr.as_deref(), Some("flag provided but not defined"));
    }

    #[test]
    fn test_failed_exit_with_findings_keeps_them() {
        let stdout = line("critical", json!("CWE-502"));
        let report = parse_nuclei_output(&output(Some(1), &stdout, "rate limited"), "t").unwrap();
        assert_eq!(report.summary.count(Severity::Critical), 1);
    }

    #[test]
    fn test_failed_exit_with_only_garbage_is_an_error() {
        let error = parse_nuclei_output(&output(Some(1), "garbage\n", ""), "t").unwrap_err();
        assert_eq!(error.category, ErrorCategory::ProcessFailed);
    }

    #[test]
    fn test_args() {
        let mut config = NucleiScanConfig::new(Url::parse("https://example.com").unwrap());
        config.templates = Some(vec!["cves/".to_string(), "exposures/".to_string()]);
        config.severity = Some(vec!["High".to_string(), "informational".to_string(), "bogus".to_string()]);

        assert_eq!(
            nuclei_args(&config),
            ["-u", "https://example.com/", "-jsonl", "-silent", "-t", "cves/,exposures/", "-s", "high,info"]
        );
    }
}
