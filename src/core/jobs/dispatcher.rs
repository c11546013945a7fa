// src/core/jobs/dispatcher.rs

use std::sync::Arc;

use tracing::{info, warn};
use url::Url;

use crate::core::error::{CoreError, Result};
use crate::core::jobs::facility::ExecutionFacility;
use crate::core::jobs::tasks::encode_task;
use crate::core::models::{JobHandle, JobStatus, ScanKind, ScanSubmission};
use crate::core::scanner::ScanConfig;
use crate::core::scanner::ssl_scanner::tls_port;

/// Validates scan submissions and hands them to the execution facility.
#[derive(Clone)]
pub struct JobDispatcher {
    facility: Arc<dyn ExecutionFacility>,
}

impl JobDispatcher {
    pub fn new(facility: Arc<dyn ExecutionFacility>) -> Self {
        Self { facility }
    }

    /// Submits a scan and returns as soon as the facility accepted it.
    ///
    /// Configuration problems are reported here, before anything is handed off.
    pub async fn submit(&self, submission: ScanSubmission) -> Result<JobHandle> {
        let config = validate_submission(submission)?;
        let (task_name, args) = encode_task(&config)
            .map_err(|e| CoreError::Facility(format!("Failed to encode task arguments: {}", e)))?;

        let job_id = self.facility.submit(task_name, args).await?;
        info!(job_id = %job_id, kind = %config.kind(), target = %config.target_url(), "Scan dispatched.");
        Ok(JobHandle {
            job_id,
            status: JobStatus::Pending,
        })
    }
}

/// Turns a raw submission into the immutable configuration its adapter runs with.
pub fn validate_submission(submission: ScanSubmission) -> Result<ScanConfig> {
    let target_url = parse_target(&submission.target_url)?;

    let mismatched = match submission.scan_type {
        ScanKind::Zap => submission.nuclei_config.is_some().then_some("nuclei_config"),
        ScanKind::Nuclei => submission.zap_config.is_some().then_some("zap_config"),
        ScanKind::SslTls | ScanKind::HttpHeaders => {
            if submission.zap_config.is_some() {
                Some("zap_config")
            } else {
                submission.nuclei_config.is_some().then_some("nuclei_config")
            }
        }
    };
    if let Some(field) = mismatched {
        warn!(kind = %submission.scan_type, field, "Rejected submission with a mismatched configuration.");
        return Err(CoreError::Configuration(format!(
            "{} must not be provided for scan_type '{}'",
            field, submission.scan_type
        )));
    }

    let config = match submission.scan_type {
        ScanKind::SslTls => {
            let port = tls_port(&submission.target_url, &target_url);
            ScanConfig::SslTls { target_url, port }
        }
        ScanKind::HttpHeaders => ScanConfig::HttpHeaders { target_url },
        ScanKind::Zap => {
            let zap_config = submission.zap_config.ok_or_else(|| {
                CoreError::Configuration("zap_config must be provided for scan_type 'zap'".to_string())
            })?;
            check_scheme(&zap_config.target_url)?;
            if let Some(definition) = &zap_config.api_definition_url {
                check_scheme(definition)?;
            }
            ScanConfig::Zap(zap_config)
        }
        ScanKind::Nuclei => {
            let nuclei_config = submission.nuclei_config.ok_or_else(|| {
                CoreError::Configuration("nuclei_config must be provided for scan_type 'nuclei'".to_string())
            })?;
            check_scheme(&nuclei_config.target_url)?;
            ScanConfig::Nuclei(nuclei_config)
        }
    };
    Ok(config)
}

fn parse_target(raw: &str) -> Result<Url> {
    let url = Url::parse(raw.trim())
        .map_err(|e| CoreError::Configuration(format!("Invalid target_url '{}': {}", raw, e)))?;
    check_scheme(&url)?;
    Ok(url)
}

fn check_scheme(url: &Url) -> Result<()> {
    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return Err(CoreError::Configuration(format!(
            "Target '{}' must be an http(s) URL with a host",
            url
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::ErrorKind;
    use crate::core::models::{NucleiScanConfig, ZapScanConfig};

    fn url(raw: &str) -> Url {
        Url::parse(raw).unwrap()
    }

    #[test]
    fn test_passive_scans_need_only_a_target() {
        let config = validate_submission(ScanSubmission::new(ScanKind::HttpHeaders, "https://example.com")).unwrap();
        assert_eq!(config.kind(), ScanKind::HttpHeaders);
        assert_eq!(config.target_url().as_str(), "https://example.com/");
    }

    #[test]
    fn test_tls_scan_keeps_explicit_port_80() {
        let config = validate_submission(ScanSubmission::new(ScanKind::SslTls, "http://example.com:80")).unwrap();
        assert!(matches!(config, ScanConfig::SslTls { port: 80, .. }), "{:?}", config);

        let config = validate_submission(ScanSubmission::new(ScanKind::SslTls, "http://example.com")).unwrap();
        assert!(matches!(config, ScanConfig::SslTls { port: 443, .. }), "{:?}", config);
    }

    #[test]
    fn test_tool_scans_require_their_config() {
        for kind in [ScanKind::Zap, ScanKind::Nuclei] {
            let error = validate_submission(ScanSubmission::new(kind, "https://example.com")).unwrap_err();
            assert_eq!(error.kind(), ErrorKind::ConfigurationError);
        }
    }

    #[test]
    fn test_mismatched_config_is_rejected() {
        let submission = ScanSubmission::new(ScanKind::Nuclei, "https://example.com")
            .with_nuclei_config(NucleiScanConfig::new(url("https://example.com")))
            .with_zap_config(ZapScanConfig::new(url("https://example.com")));
        assert!(matches!(validate_submission(submission), Err(CoreError::Configuration(_))));

        let submission = ScanSubmission::new(ScanKind::SslTls, "https://example.com")
            .with_zap_config(ZapScanConfig::new(url("https://example.com")));
        assert!(matches!(validate_submission(submission), Err(CoreError::Configuration(_))));
    }

    #[test]
    fn test_tool_config_target_wins() {
        let submission = ScanSubmission::new(ScanKind::Zap, "https://outer.example.com")
            .with_zap_config(ZapScanConfig::new(url("https://inner.example.com")));
        let config = validate_submission(submission).unwrap();
        assert_eq!(config.target_url().host_str(), Some("inner.example.com"));
    }

    #[test]
    fn test_invalid_targets_are_rejected() {
        for target in ["not a url", "ftp://example.com", "file:///etc/passwd"] {
            let result = validate_submission(ScanSubmission::new(ScanKind::SslTls, target));
            assert!(matches!(result, Err(CoreError::Configuration(_))), "{}", target);
        }
    }
}
