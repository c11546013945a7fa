// src/core/policy.rs

//! Severity gating and filtering over finished scan reports.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::core::error::{CoreError, Result};
use crate::core::models::{ScanReport, Severity};

/// Outcome of a policy gate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "verdict", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PolicyVerdict {
    Pass,
    Fail {
        finding_name: String,
        severity: Severity,
        threshold: Severity,
        message: String,
    },
}

impl PolicyVerdict {
    pub fn is_fail(&self) -> bool {
        matches!(self, PolicyVerdict::Fail { .. })
    }
}

/// Parses a threshold strictly: anything outside the canonical set is a configuration error.
pub fn parse_threshold(raw: &str) -> Result<Severity> {
    raw.trim().parse::<Severity>().map_err(|_| {
        CoreError::Configuration(format!(
            "Invalid severity threshold '{}'; expected one of Critical, High, Medium, Low, Informational, Unknown",
            raw
        ))
    })
}

/// True iff any finding is at or above `threshold`.
pub fn fails_policy(report: &ScanReport, threshold: Severity) -> bool {
    first_offender(report, threshold).is_some()
}

fn first_offender(report: &ScanReport, threshold: Severity) -> Option<usize> {
    report.findings.iter().position(|finding| {
        if finding.severity == Severity::Unknown {
            debug!(finding = %finding.name, "Finding has no recognized severity.");
        }
        finding.severity >= threshold
    })
}

/// A copy of `report` keeping only findings at or above `minimum`.
///
/// The summary is recounted over the report's own severity buckets, so it
/// always agrees with the filtered findings.
pub fn filter_minimum(report: &ScanReport, minimum: Severity) -> ScanReport {
    let findings: Vec<_> = report
        .findings
        .iter()
        .filter(|finding| finding.severity >= minimum)
        .cloned()
        .collect();

    debug!(
        minimum = %minimum,
        kept = findings.len(),
        dropped = report.findings.len() - findings.len(),
        "Filtered report findings."
    );

    ScanReport {
        scan_tool: report.scan_tool.clone(),
        target: report.target.clone(),
        summary: report.summary.recount(&findings),
        findings,
    }
}

/// Gates a report on a parsed threshold, naming the first offending finding.
pub fn gate(report: &ScanReport, threshold: Severity) -> PolicyVerdict {
    let Some(index) = first_offender(report, threshold) else {
        info!(threshold = %threshold, target = %report.target, "Policy passed.");
        return PolicyVerdict::Pass;
    };

    let finding = &report.findings[index];
    warn!(
        threshold = %threshold,
        finding = %finding.name,
        severity = %finding.severity,
        "Policy failed."
    );
    PolicyVerdict::Fail {
        finding_name: finding.name.clone(),
        severity: finding.severity,
        threshold,
        message: format!(
            "Policy violation: Found '{}' with severity '{}' (threshold: '{}').",
            finding.name, finding.severity, threshold
        ),
    }
}

/// Gates a report on an optional threshold. No threshold always passes.
pub fn evaluate_policy(report: &ScanReport, threshold: Option<&str>) -> Result<PolicyVerdict> {
    match threshold {
        Some(raw) => Ok(gate(report, parse_threshold(raw)?)),
        None => Ok(PolicyVerdict::Pass),
    }
}

/// Filters a report on an optional minimum severity. No minimum returns it unchanged.
pub fn filter_report(report: &ScanReport, minimum: Option<&str>) -> Result<ScanReport> {
    match minimum {
        Some(raw) => Ok(filter_minimum(report, parse_threshold(raw)?)),
        None => Ok(report.clone()),
    }
}
