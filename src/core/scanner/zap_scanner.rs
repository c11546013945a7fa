// src/core/scanner/zap_scanner.rs

use serde_json::Value;
use tracing::{debug, error, info};

use crate::config::ScannerSettings;
use crate::core::models::{
    Cwe, ErrorCategory, ScanReport, Severity, ToolError, VulnerabilityFinding, ZapScanConfig,
    ZapScanType,
};
use crate::core::scanner::process::{ProcessOutput, run_process};

pub const ZAP_TOOL_NAME: &str = "OWASP ZAP Baseline";

/// The buckets a ZAP report carries. ZAP has no `Critical` risk.
pub const ZAP_SEVERITIES: [Severity; 4] =
    [Severity::High, Severity::Medium, Severity::Low, Severity::Informational];

/// Runs the configured ZAP packaged scan and normalizes its JSON alerts.
pub async fn run_zap_scan(config: &ZapScanConfig, settings: &ScannerSettings) -> Result<ScanReport, ToolError> {
    let target = config.target_url.to_string();
    info!(target = %target, scan_type = %config.scan_type, "Starting ZAP scan.");

    let envs: Vec<(String, String)> = settings
        .zap
        .api_key
        .iter()
        .map(|key| ("ZAP_API_KEY".to_string(), key.clone()))
        .collect();

    let output = run_process(settings.zap.command_for(config.scan_type), &zap_args(config), &envs).await?;
    let report = parse_zap_output(&output, &target)?;

    info!(findings = report.findings.len(), "ZAP scan finished.");
    Ok(report)
}

/// Command-line arguments for the ZAP packaged scan scripts.
pub fn zap_args(config: &ZapScanConfig) -> Vec<String> {
    let scan_target = match (config.scan_type, &config.api_definition_url) {
        (ZapScanType::Api, Some(definition)) => definition.to_string(),
        _ => config.target_url.to_string(),
    };

    let mut args = vec!["-t".to_string(), scan_target, "-j".to_string()];
    if config.scan_type == ZapScanType::Api {
        args.extend(["-f".to_string(), "openapi".to_string()]);
    }
    if let Some(context) = config.context_id.as_deref().filter(|context| !context.is_empty()) {
        args.extend(["-n".to_string(), context.to_string()]);
    }
    for (key, value) in config.other_options.iter().flatten() {
        args.push("-z".to_string());
        args.push(format!("-config {}={}", key, option_text(value)));
    }
    args
}

fn option_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

/// Interprets a finished ZAP process.
///
/// Exit code 0 means no alerts and 1 means alerts were raised; anything else
/// is a failed run. Empty stdout is a clean run with no findings.
pub fn parse_zap_output(output: &ProcessOutput, target: &str) -> Result<ScanReport, ToolError> {
    if !matches!(output.exit_code, Some(0) | Some(1)) {
        error!(exit_code = %output.exit_code_label(), stderr = %output.stderr, "ZAP scan process failed.");
        return Err(ToolError::new(
            ErrorCategory::ProcessFailed,
            format!("ZAP Baseline scan failed with exit code {}.", output.exit_code_label()),
        )
        .with_output(&output.stdout, &output.stderr));
    }

    let stdout = output.stdout.trim();
    let alerts: Vec<Value> = if stdout.is_empty() {
        debug!("ZAP produced no output, treating as zero alerts.");
        Vec::new()
    } else {
        serde_json::from_str(stdout).map_err(|e| {
            error!(error = %e, "Failed to decode ZAP output.");
            ToolError::new(
                ErrorCategory::OutputParseError,
                format!("Failed to decode ZAP output as a JSON array of alerts: {}", e),
            )
            .with_output(&output.stdout, &output.stderr)
        })?
    };

    let findings = alerts.into_iter().map(|alert| normalize_alert(alert, target)).collect();
    Ok(ScanReport::new(ZAP_TOOL_NAME, target, &ZAP_SEVERITIES, findings))
}

fn normalize_alert(alert: Value, target: &str) -> VulnerabilityFinding {
    let text = |key: &str| alert.get(key).and_then(Value::as_str).map(String::from);

    let name = text("name")
        .or_else(|| text("alert"))
        .unwrap_or_else(|| "N/A".to_string());
    let severity = zap_severity(alert.get("risk").and_then(Value::as_str).unwrap_or_default());
    let description = text("description").or_else(|| text("desc")).unwrap_or_default();
    let cwe = alert.get("cweid").and_then(zap_cwe);
    let url_found = text("url").or_else(|| Some(target.to_string()));
    let parameter = text("param");
    let evidence = text("evidence");
    let solution = text("solution");

    VulnerabilityFinding {
        name,
        severity,
        description,
        cwe,
        url_found,
        parameter,
        evidence,
        solution,
        raw_details: alert,
    }
}

/// Maps a ZAP risk label onto the canonical scale. Unrecognized risks are informational.
pub fn zap_severity(risk: &str) -> Severity {
    match capitalize(risk.trim()).as_str() {
        "High" => Severity::High,
        "Medium" => Severity::Medium,
        "Low" => Severity::Low,
        _ => Severity::Informational,
    }
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

// ZAP reports cweid as a string ("79") or a number; either is kept as given.
fn zap_cwe(value: &Value) -> Option<Cwe> {
    match value {
        Value::Number(number) => Some(
            number
                .as_u64()
                .and_then(|id| u32::try_from(id).ok())
                .map(Cwe::Id)
                .unwrap_or_else(|| Cwe::Raw(number.to_string())),
        ),
        Value::String(text) if !text.is_empty() => Some(Cwe::Raw(text.clone())),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use url::Url;

    fn output(exit_code: Option<i32>, stdout: &str) -> ProcessOutput {
        ProcessOutput { exit_code, stdout: stdout.to_string(), stderr: String::new() }
    }

    #[test]
    fn test_alerts_are_normalized() {
        let stdout = json!([
            {"name": "XSS", "risk": "HIGH", "cweid": "79", "url": "https://example.com/q",
             "param": "q", "evidence": "<script>", "solution": "Encode output", "desc": "Reflected"},
            {"name": "Cookie flag", "risk": "low"},
            {"name": "Odd", "risk": "severe"}
        ])
        .to_string();

        let report = parse_zap_output(&output(Some(1), &stdout), "https://example.com").unwrap();

        assert_eq!(report.scan_tool, ZAP_TOOL_NAME);
        assert!(report.is_consistent());
        assert_eq!(report.summary.count(Severity::High), 1);
        assert_eq!(report.summary.count(Severity::Low), 1);
        assert_eq!(report.summary.count(Severity::Informational), 1);

        let xss = &report.findings[0];
        assert_eq!(xss.cwe, Some(Cwe::Raw("79".to_string())));
        assert_eq!(xss.description, "Reflected");
        assert_eq!(xss.parameter.as_deref(), Some("q"));
        assert_eq!(xss.raw_details["evidence"], "<script>");

        let cookie = &report.findings[1];
        assert_eq!(cookie.url_found.as_deref(), Some("https://example.com"));
        assert_eq!(cookie.description, "");
    }

    #[test]
    fn test_high_and_medium_alerts_are_counted() {
        let stdout = json!([
            {"name": "SQL Injection", "risk": "High", "cweid": "89"},
            {"name": "Missing Anti-CSRF Tokens", "risk": "Medium", "cweid": "352"}
        ])
        .to_string();

        let report = parse_zap_output(&output(Some(1), &stdout), "https://example.com").unwrap();

        assert_eq!(report.findings.len(), 2);
        assert_eq!(report.findings[1].severity, Severity::Medium);
        assert_eq!(
            serde_json::to_value(&report.summary).unwrap(),
            json!({"High": 1, "Medium": 1, "Low": 0, "Informational": 0})
        );
    }

    #[test]
    fn test_summary_has_no_critical_bucket() {
        let report = parse_zap_output(&output(Some(0), ""), "https://example.com").unwrap();
        assert!(report.findings.is_empty());
        assert_eq!(report.summary.iter().count(), 4);
        assert!(report.summary.iter().all(|(severity, _)| severity != Severity::Critical));
    }

    #[test]
    fn test_exit_code_above_one_fails() {
        let error = parse_zap_output(&output(Some(3), "[]"), "https://example.com").unwrap_err();
        assert_eq!(error.category, ErrorCategory::ProcessFailed);
        assert!(error.message.contains("exit code 3"));
        assert_eq!(error.stdout.as_deref(), Some("[]"));
    }

    #[test]
    fn test_signal_termination_fails() {
        let error = parse_zap_output(&output(None, ""), "https://example.com").unwrap_err();
        assert_eq!(error.category, ErrorCategory::ProcessFailed);
    }

    #[test]
    fn test_non_array_output_is_a_parse_error() {
        for stdout in ["not json", r#"{"site": []}"#] {
            let error = parse_zap_output(&output(Some(0), stdout), "https://example.com").unwrap_err();
            assert_eq!(error.category, ErrorCategory::OutputParseError);
        }
    }

    #[test]
    fn test_numeric_cwe_becomes_an_id() {
        assert_eq!(zap_cwe(&json!(16)), Some(Cwe::Id(16)));
        assert_eq!(zap_cwe(&json!(-1)), Some(Cwe::Raw("-1".to_string())));
        assert_eq!(zap_cwe(&json!("")), None);
    }

    #[test]
    fn test_api_scan_targets_the_definition() {
        let mut config = ZapScanConfig::new(Url::parse("https://api.example.com").unwrap());
        config.scan_type = ZapScanType::Api;
        config.api_definition_url = Some(Url::parse("https://api.example.com/openapi.json").unwrap());
        config.other_options = json!({"spider.maxDuration": 5}).as_object().cloned();

        let args = zap_args(&config);
        assert_eq!(
            args,
            [
                "-t",
                "https://api.example.com/openapi.json",
                "-j",
                "-f",
                "openapi",
                "-z",
                "-config spider.maxDuration=5"
            ]
        );
    }

    #[test]
    fn test_context_is_passed_to_zap() {
        let mut config = ZapScanConfig::new(Url::parse("https://example.com").unwrap());
        assert!(!zap_args(&config).contains(&"-n".to_string()));

        config.context_id = Some("/zap/wrk/app.context".to_string());
        let args = zap_args(&config);
        assert_eq!(args, ["-t", "https://example.com/", "-j", "-n", "/zap/wrk/app.context"]);
    }
}
