// src/core/jobs/tasks.rs

//! Task names and argument encoding for scan jobs, plus the handler that runs them.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{error, warn};
use tracing_error::SpanTrace;
use url::Url;

use crate::config::ScannerSettings;
use crate::core::error::ErrorKind;
use crate::core::jobs::facility::TaskHandler;
use crate::core::models::{JobError, NucleiScanConfig, ScanKind, ZapScanConfig};
use crate::core::scanner::ssl_scanner::DEFAULT_TLS_PORT;
use crate::core::scanner::{ScanConfig, run_scan};

#[derive(Deserialize)]
struct TargetArgs {
    target_url: Url,
}

#[derive(Deserialize)]
struct TlsTargetArgs {
    target_url: Url,
    #[serde(default)]
    port: Option<u16>,
}

/// Encodes a scan configuration as a task name and its JSON arguments.
pub fn encode_task(config: &ScanConfig) -> Result<(&'static str, Value), serde_json::Error> {
    let args = match config {
        ScanConfig::SslTls { target_url, port } => json!({ "target_url": target_url, "port": port }),
        ScanConfig::HttpHeaders { target_url } => json!({ "target_url": target_url }),
        ScanConfig::Zap(zap_config) => serde_json::to_value(zap_config)?,
        ScanConfig::Nuclei(nuclei_config) => serde_json::to_value(nuclei_config)?,
    };
    Ok((config.kind().task_name(), args))
}

/// Rebuilds the scan configuration a task was submitted with.
pub fn decode_task(task_name: &str, args: Value) -> Result<ScanConfig, String> {
    let kind = ScanKind::from_task_name(task_name).ok_or_else(|| format!("Unknown task '{}'", task_name))?;
    let invalid = |e: serde_json::Error| format!("Invalid arguments for task '{}': {}", task_name, e);

    let config = match kind {
        ScanKind::SslTls => {
            let TlsTargetArgs { target_url, port } = serde_json::from_value(args).map_err(invalid)?;
            let port = port.unwrap_or_else(|| target_url.port().unwrap_or(DEFAULT_TLS_PORT));
            ScanConfig::SslTls { target_url, port }
        }
        ScanKind::HttpHeaders => {
            let TargetArgs { target_url } = serde_json::from_value(args).map_err(invalid)?;
            ScanConfig::HttpHeaders { target_url }
        }
        ScanKind::Zap => ScanConfig::Zap(serde_json::from_value::<ZapScanConfig>(args).map_err(invalid)?),
        ScanKind::Nuclei => ScanConfig::Nuclei(serde_json::from_value::<NucleiScanConfig>(args).map_err(invalid)?),
    };
    Ok(config)
}

/// Routes scan task names to the adapters.
pub struct ScanTaskHandler {
    settings: ScannerSettings,
}

impl ScanTaskHandler {
    pub fn new(settings: ScannerSettings) -> Self {
        Self { settings }
    }
}

#[async_trait]
impl TaskHandler for ScanTaskHandler {
    async fn handle(&self, task_name: &str, args: Value) -> Result<Value, Value> {
        let config = decode_task(task_name, args).map_err(|message| {
            error!(task = task_name, error = %message, "Rejected task.");
            error_value(&JobError::new(ErrorKind::InternalError, message))
        })?;

        match run_scan(&config, &self.settings).await {
            Ok(output) => serde_json::to_value(&output).map_err(|e| {
                error!(error = %e, "Failed to encode scan result.");
                error_value(&JobError::new(
                    ErrorKind::InternalError,
                    format!("Failed to encode scan result: {}", e),
                ))
            }),
            Err(tool_error) => {
                warn!(category = %tool_error.category, error = %tool_error.message, "Scan ended with a tool error.");
                let job_error = JobError::from(&tool_error).with_traceback(SpanTrace::capture().to_string());
                Err(error_value(&job_error))
            }
        }
    }
}

fn error_value(job_error: &JobError) -> Value {
    serde_json::to_value(job_error).unwrap_or_else(|_| json!({ "error": job_error.error, "traceback": null }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::ZapScanType;

    #[test]
    fn test_configs_survive_the_task_boundary() {
        let url = Url::parse("https://example.com/app").unwrap();
        let mut zap = ZapScanConfig::new(url.clone());
        zap.scan_type = ZapScanType::Full;

        let configs = [
            ScanConfig::SslTls {
                target_url: Url::parse("http://example.com:80").unwrap(),
                port: 80,
            },
            ScanConfig::HttpHeaders { target_url: url.clone() },
            ScanConfig::Zap(zap),
            ScanConfig::Nuclei(NucleiScanConfig::new(url)),
        ];
        for config in configs {
            let (task_name, args) = encode_task(&config).unwrap();
            assert_eq!(decode_task(task_name, args).unwrap(), config);
        }
    }

    #[test]
    fn test_tls_task_without_port_uses_url_port() {
        let config = decode_task("tasks.run_ssl_tls_scan", json!({"target_url": "https://example.com:8443/"})).unwrap();
        assert!(matches!(config, ScanConfig::SslTls { port: 8443, .. }));
    }

    #[test]
    fn test_unknown_task_is_rejected() {
        let error = decode_task("tasks.run_port_scan", Value::Null).unwrap_err();
        assert!(error.contains("Unknown task"));
    }

    #[test]
    fn test_bad_arguments_are_rejected() {
        let error = decode_task("tasks.run_ssl_tls_scan", json!({"target": "x"})).unwrap_err();
        assert!(error.contains("Invalid arguments"));
    }

    #[tokio::test]
    async fn test_handler_reports_structured_errors() {
        let handler = ScanTaskHandler::new(ScannerSettings::default());
        let error = handler.handle("tasks.nope", Value::Null).await.unwrap_err();
        let job_error: JobError = serde_json::from_value(error).unwrap();
        assert_eq!(job_error.kind, ErrorKind::InternalError);
    }
}
