// src/core/reporting.rs

//! Archive of finished scan runs and the aggregation queries over it.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use crate::core::error::{CoreError, Result};
use crate::core::models::{
    JobError, JobId, JobStatus, JobView, ScanKind, Severity, SeveritySummary, VulnerabilityFinding,
};

pub const DEFAULT_LISTING_LIMIT: usize = 100;
pub const MAX_LISTING_LIMIT: usize = 500;

/// A finding as archived, tied to the run that reported it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredFinding {
    pub run_id: Uuid,
    #[serde(flatten)]
    pub finding: VulnerabilityFinding,
    pub first_seen_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
}

/// One scan job as archived.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanRun {
    pub id: Uuid,
    pub job_id: JobId,
    pub scan_kind: ScanKind,
    pub target: String,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub summary: Option<SeveritySummary>,
    pub findings: Vec<StoredFinding>,
    pub error: Option<JobError>,
}

impl ScanRun {
    /// Archives the latest view of a job. Findings are stamped with `updated_at`.
    pub fn from_job_view(
        view: &JobView,
        scan_kind: ScanKind,
        target: impl Into<String>,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Self {
        let id = Uuid::new_v4();
        let report = view.result.as_ref().and_then(|output| output.report());
        let findings = report
            .map(|report| {
                report
                    .findings
                    .iter()
                    .map(|finding| StoredFinding {
                        run_id: id,
                        finding: finding.clone(),
                        first_seen_at: updated_at,
                        last_seen_at: updated_at,
                    })
                    .collect()
            })
            .unwrap_or_default();

        Self {
            id,
            job_id: view.job_id.clone(),
            scan_kind,
            target: target.into(),
            status: view.status,
            created_at,
            updated_at,
            summary: report.map(|report| report.summary.clone()),
            findings,
            error: view.error.clone(),
        }
    }

    pub fn is_successful(&self) -> bool {
        self.status == JobStatus::Success
    }
}

/// Persistence collaborator for scan runs.
#[async_trait]
pub trait ScanStore: Send + Sync {
    /// Inserts a run, replacing an earlier record of the same job.
    async fn record(&self, run: ScanRun) -> Result<()>;

    async fn runs(&self) -> Result<Vec<ScanRun>>;
}

#[derive(Debug, Default)]
pub struct MemoryScanStore {
    runs: RwLock<Vec<ScanRun>>,
}

impl MemoryScanStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ScanStore for MemoryScanStore {
    async fn record(&self, run: ScanRun) -> Result<()> {
        let mut runs = self.runs.write().await;
        match runs.iter_mut().find(|existing| existing.job_id == run.job_id) {
            Some(existing) => {
                debug!(job_id = %run.job_id, status = %run.status, "Updated archived scan run.");
                let created_at = existing.created_at;
                *existing = ScanRun { created_at, ..run };
            }
            None => {
                info!(job_id = %run.job_id, target = %run.target, "Archived scan run.");
                runs.push(run);
            }
        }
        Ok(())
    }

    async fn runs(&self) -> Result<Vec<ScanRun>> {
        Ok(self.runs.read().await.clone())
    }
}

/// Severity counts for one target across its successful runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VulnerabilitySummary {
    pub target: String,
    pub severity_counts: SeveritySummary,
    pub last_scanned: Option<DateTime<Utc>>,
}

/// Filters for `list_vulnerabilities`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct VulnerabilityQuery {
    /// Case-insensitive substring of the run target.
    pub target: Option<String>,
    pub min_severity: Option<Severity>,
    pub scan_kind: Option<ScanKind>,
    pub limit: Option<usize>,
    pub offset: usize,
}

/// Newest runs first.
pub fn recent_runs(runs: &[ScanRun], limit: usize) -> Vec<&ScanRun> {
    let mut sorted: Vec<&ScanRun> = runs.iter().collect();
    sorted.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    sorted.truncate(limit);
    sorted
}

/// `None` when the target has no successful run.
pub fn summary_by_target(runs: &[ScanRun], target: &str) -> Option<VulnerabilitySummary> {
    let successful: Vec<&ScanRun> = runs
        .iter()
        .filter(|run| run.is_successful() && run.target == target)
        .collect();
    let last_scanned = successful.iter().map(|run| run.updated_at).max()?;

    let mut severity_counts = SeveritySummary::all_levels();
    for finding in successful.iter().flat_map(|run| &run.findings) {
        severity_counts.record(finding.finding.severity);
    }

    Some(VulnerabilitySummary {
        target: target.to_string(),
        severity_counts,
        last_scanned: Some(last_scanned),
    })
}

/// Counts over every successful run, with a bucket for each canonical severity.
pub fn overall_summary(runs: &[ScanRun]) -> SeveritySummary {
    let mut summary = SeveritySummary::all_levels();
    for finding in runs.iter().filter(|run| run.is_successful()).flat_map(|run| &run.findings) {
        summary.record(finding.finding.severity);
    }
    summary
}

/// Lists archived findings, most severe first and newest first within a severity.
pub fn list_vulnerabilities<'a>(
    runs: &'a [ScanRun],
    query: &VulnerabilityQuery,
) -> Result<Vec<&'a StoredFinding>> {
    let limit = query.limit.unwrap_or(DEFAULT_LISTING_LIMIT);
    if !(1..=MAX_LISTING_LIMIT).contains(&limit) {
        return Err(CoreError::Configuration(format!(
            "limit must be between 1 and {}, got {}",
            MAX_LISTING_LIMIT, limit
        )));
    }
    let needle = query.target.as_deref().map(str::to_lowercase);

    let mut findings: Vec<&StoredFinding> = runs
        .iter()
        .filter(|run| {
            needle
                .as_deref()
                .is_none_or(|needle| run.target.to_lowercase().contains(needle))
        })
        .filter(|run| query.scan_kind.is_none_or(|kind| run.scan_kind == kind))
        .flat_map(|run| &run.findings)
        .filter(|stored| query.min_severity.is_none_or(|minimum| stored.finding.severity >= minimum))
        .collect();

    findings.sort_by(|a, b| {
        a.finding
            .severity
            .listing_rank()
            .cmp(&b.finding.severity.listing_rank())
            .then_with(|| b.last_seen_at.cmp(&a.last_seen_at))
    });

    Ok(findings.into_iter().skip(query.offset).take(limit).collect())
}
