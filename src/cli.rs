// src/cli.rs

//! Non-interactive scan command for CI/CD pipelines.
//!
//! Submits one scan, polls until it reaches a terminal state, applies the
//! severity gate and prints the job as JSON. The exit status carries the verdict.

use std::process::ExitCode;
use std::time::{Duration, Instant};

use clap::Args;
use color_eyre::eyre::Result;
use serde::Serialize;
use tracing::{debug, info, warn};
use url::Url;

use stackguard_rs::config::Settings;
use stackguard_rs::core::error::{CoreError, ErrorKind};
use stackguard_rs::core::jobs::ScanEngine;
use stackguard_rs::core::jobs::tracker::JobTracker;
use stackguard_rs::core::models::{
    JobError, JobId, JobView, NucleiScanConfig, ScanKind, ScanSubmission, ZapScanConfig, ZapScanType,
};
use stackguard_rs::core::policy::{PolicyVerdict, evaluate_policy, filter_report, parse_threshold};

const EXIT_POLICY_FAILURE: u8 = 1;
const EXIT_ERROR: u8 = 2;

#[derive(Args, Debug)]
pub struct ScanArgs {
    /// Scan to run: ssl_tls, http_headers, zap or nuclei
    #[arg(long)]
    kind: ScanKind,

    /// Target URL, e.g. https://example.com
    #[arg(long)]
    target: String,

    /// Fail (exit 1) when a finding is at or above this severity
    #[arg(long)]
    fail_on: Option<String>,

    /// Only report findings at or above this severity
    #[arg(long)]
    min_level: Option<String>,

    /// Nuclei template paths or tags (repeatable)
    #[arg(long = "template")]
    templates: Vec<String>,

    /// Nuclei severities to run (repeatable)
    #[arg(long = "severity")]
    severities: Vec<String>,

    /// ZAP scan flavour: baseline, full or api
    #[arg(long, default_value = "baseline")]
    zap_scan_type: ZapScanType,

    /// OpenAPI definition for ZAP api scans
    #[arg(long)]
    api_definition: Option<String>,

    /// Delay between status polls
    #[arg(long, default_value_t = 1000)]
    poll_interval_ms: u64,

    /// Give up waiting after this many seconds
    #[arg(long, default_value_t = 1800)]
    wait_secs: u64,

    /// Pretty-print the JSON output
    #[arg(long)]
    pretty: bool,
}

impl ScanArgs {
    fn submission(&self) -> Result<ScanSubmission, CoreError> {
        let submission = ScanSubmission::new(self.kind, self.target.clone());
        let submission = match self.kind {
            ScanKind::Zap => {
                let mut config = ZapScanConfig::new(parse_url("target", &self.target)?);
                config.scan_type = self.zap_scan_type;
                config.api_definition_url = self
                    .api_definition
                    .as_deref()
                    .map(|raw| parse_url("api_definition", raw))
                    .transpose()?;
                submission.with_zap_config(config)
            }
            ScanKind::Nuclei => {
                let mut config = NucleiScanConfig::new(parse_url("target", &self.target)?);
                config.templates = Some(self.templates.clone()).filter(|t| !t.is_empty());
                config.severity = Some(self.severities.clone()).filter(|s| !s.is_empty());
                submission.with_nuclei_config(config)
            }
            ScanKind::SslTls | ScanKind::HttpHeaders => submission,
        };
        Ok(submission)
    }
}

fn parse_url(field: &str, raw: &str) -> Result<Url, CoreError> {
    Url::parse(raw).map_err(|e| CoreError::Configuration(format!("Invalid {} '{}': {}", field, raw, e)))
}

#[derive(Serialize)]
struct GateOutput<'a> {
    #[serde(flatten)]
    job: &'a JobView,
    #[serde(skip_serializing_if = "Option::is_none")]
    policy: Option<&'a PolicyVerdict>,
}

pub async fn scan_command(args: ScanArgs, settings: &Settings) -> Result<ExitCode> {
    // Thresholds are validated before anything is dispatched.
    if let Some(err) = [args.fail_on.as_deref(), args.min_level.as_deref()]
        .into_iter()
        .flatten()
        .find_map(|raw| parse_threshold(raw).err())
    {
        return report_error(&err.to_job_error(), args.pretty);
    }

    let submission = match args.submission() {
        Ok(submission) => submission,
        Err(err) => return report_error(&err.to_job_error(), args.pretty),
    };

    let engine = ScanEngine::local(settings);
    let handle = match engine.dispatcher.submit(submission).await {
        Ok(handle) => handle,
        Err(err) => return report_error(&err.to_job_error(), args.pretty),
    };
    info!(job_id = %handle.job_id, "Waiting for scan to finish.");

    let interval = Duration::from_millis(args.poll_interval_ms.max(10));
    let deadline = Instant::now() + Duration::from_secs(args.wait_secs);
    let mut view = match wait_for_terminal(&engine.tracker, &handle.job_id, interval, deadline).await {
        Ok(view) => view,
        Err(err) => return report_error(&err, args.pretty),
    };

    let mut verdict = None;
    if let Some(report) = view.result.as_mut().and_then(|output| output.report_mut()) {
        verdict = Some(evaluate_policy(report, args.fail_on.as_deref())?);
        *report = filter_report(report, args.min_level.as_deref())?;
    }

    print_json(&GateOutput { job: &view, policy: verdict.as_ref() }, args.pretty)?;

    if view.error.is_some() {
        warn!(job_id = %view.job_id, "Scan job failed.");
        return Ok(ExitCode::from(EXIT_ERROR));
    }
    if verdict.as_ref().is_some_and(PolicyVerdict::is_fail) {
        return Ok(ExitCode::from(EXIT_POLICY_FAILURE));
    }
    Ok(ExitCode::SUCCESS)
}

async fn wait_for_terminal(
    tracker: &JobTracker,
    job_id: &JobId,
    interval: Duration,
    deadline: Instant,
) -> Result<JobView, JobError> {
    loop {
        let view = tracker.status(job_id).await.map_err(|e| e.to_job_error())?;
        if view.is_terminal() {
            return Ok(view);
        }
        if Instant::now() >= deadline {
            return Err(JobError::new(
                ErrorKind::TimeLimitExceeded,
                format!("Gave up waiting for job {} in state {}", job_id, view.status),
            ));
        }
        debug!(job_id = %job_id, status = %view.status, "Scan still running.");
        tokio::time::sleep(interval).await;
    }
}

fn report_error(error: &JobError, pretty: bool) -> Result<ExitCode> {
    warn!(kind = %error.kind, error = %error.error, "Scan command failed.");
    print_json(error, pretty)?;
    Ok(ExitCode::from(EXIT_ERROR))
}

fn print_json<T: Serialize>(value: &T, pretty: bool) -> Result<()> {
    let text = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    println!("{}", text);
    Ok(())
}
