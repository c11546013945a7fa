// src/core/models.rs

use std::collections::BTreeMap;
use std::fmt;

use chrono::NaiveDateTime;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use strum::{Display, EnumIter, EnumString, IntoEnumIterator};
use tracing::warn;
use url::Url;
use uuid::Uuid;

use crate::core::error::ErrorKind;

// --- Canonical Vulnerability Model ---

/// Canonical severity shared by every adapter.
///
/// Declaration order is the ordinal order used by policy gating and filtering:
/// `Informational < Unknown < Low < Medium < High < Critical`.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash,
    Serialize, Deserialize, Display, EnumString, EnumIter,
)]
#[strum(ascii_case_insensitive)]
pub enum Severity {
    Informational,
    #[default]
    Unknown,
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Maps any string onto the canonical set, falling back to `Unknown`.
    pub fn parse_lenient(raw: &str) -> Self {
        raw.trim().parse().unwrap_or(Severity::Unknown)
    }

    /// Position used when listing findings: Critical first, Unknown last.
    pub fn listing_rank(&self) -> u8 {
        match self {
            Severity::Critical => 0,
            Severity::High => 1,
            Severity::Medium => 2,
            Severity::Low => 3,
            Severity::Informational => 4,
            Severity::Unknown => 5,
        }
    }
}

// Stored findings may come back from a queue or a database with a vocabulary we
// never produced ourselves. Those decode as `Unknown` instead of failing the record.
fn deserialize_lenient_severity<'de, D>(deserializer: D) -> Result<Severity, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    match raw.parse::<Severity>() {
        Ok(severity) => Ok(severity),
        Err(_) => {
            warn!(severity = %raw, "Unrecognized severity on finding, treating it as Unknown.");
            Ok(Severity::Unknown)
        }
    }
}

/// A CWE reference as reported by a tool.
///
/// `Id` is used whenever a numeric identifier could be derived. `Raw` keeps a
/// tool value verbatim when the adapter passes it through untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Cwe {
    Id(u32),
    Raw(String),
}

impl fmt::Display for Cwe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cwe::Id(id) => write!(f, "CWE-{}", id),
            Cwe::Raw(raw) => write!(f, "{}", raw),
        }
    }
}

/// One discovered issue, normalized from a tool-native record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VulnerabilityFinding {
    pub name: String,
    #[serde(default, deserialize_with = "deserialize_lenient_severity")]
    pub severity: Severity,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub cwe: Option<Cwe>,
    #[serde(default)]
    pub url_found: Option<String>,
    #[serde(default)]
    pub parameter: Option<String>,
    #[serde(default)]
    pub evidence: Option<String>,
    #[serde(default)]
    pub solution: Option<String>,
    /// The untouched tool record, kept for audit and debugging.
    #[serde(default = "empty_object")]
    pub raw_details: Value,
}

fn empty_object() -> Value {
    Value::Object(Map::new())
}

/// Count of findings per severity.
///
/// The key set is declared by the producing adapter, so a tool that never emits
/// `Critical` does not report a `Critical: 0` bucket.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SeveritySummary(BTreeMap<Severity, usize>);

impl SeveritySummary {
    pub fn with_levels(levels: &[Severity]) -> Self {
        Self(levels.iter().map(|level| (*level, 0)).collect())
    }

    /// A summary with a zeroed bucket for every canonical severity.
    pub fn all_levels() -> Self {
        Self(Severity::iter().map(|level| (level, 0)).collect())
    }

    pub fn record(&mut self, severity: Severity) {
        *self.0.entry(severity).or_insert(0) += 1;
    }

    pub fn add(&mut self, severity: Severity, count: usize) {
        *self.0.entry(severity).or_insert(0) += count;
    }

    pub fn count(&self, severity: Severity) -> usize {
        self.0.get(&severity).copied().unwrap_or(0)
    }

    pub fn total(&self) -> usize {
        self.0.values().sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Severity, usize)> + '_ {
        self.0.iter().map(|(severity, count)| (*severity, *count))
    }

    /// Recounts `findings` over this summary's key set.
    pub fn recount(&self, findings: &[VulnerabilityFinding]) -> Self {
        let mut summary = Self(self.0.keys().map(|level| (*level, 0)).collect());
        for finding in findings {
            summary.record(finding.severity);
        }
        summary
    }
}

/// The normalized output of a vulnerability-producing adapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanReport {
    pub scan_tool: String,
    pub target: String,
    pub summary: SeveritySummary,
    pub findings: Vec<VulnerabilityFinding>,
}

impl ScanReport {
    /// Builds a report whose summary is counted from `findings` over `levels`.
    pub fn new(
        scan_tool: impl Into<String>,
        target: impl Into<String>,
        levels: &[Severity],
        findings: Vec<VulnerabilityFinding>,
    ) -> Self {
        let summary = SeveritySummary::with_levels(levels).recount(&findings);
        Self {
            scan_tool: scan_tool.into(),
            target: target.into(),
            summary,
            findings,
        }
    }

    pub fn is_consistent(&self) -> bool {
        self.summary.total() == self.findings.len()
    }
}

// --- Passive Scan Results ---

/// Certificate details and negotiated parameters read from a TLS handshake.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SslTlsReport {
    pub hostname: String,
    pub port: u16,
    pub issuer: BTreeMap<String, String>,
    pub subject: BTreeMap<String, String>,
    pub version: Option<u32>,
    pub serial_number: Option<String>,
    pub not_before: Option<NaiveDateTime>,
    pub not_after: Option<NaiveDateTime>,
    pub is_expired: bool,
    /// Protocol in OpenSSL's naming, e.g. `TLSv1.3`.
    pub tls_version: Option<String>,
    pub cipher: Option<String>,
}

/// Security-relevant response headers, each present or `null`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityHeadersSummary {
    #[serde(rename = "Strict-Transport-Security")]
    pub strict_transport_security: Option<String>,
    #[serde(rename = "Content-Security-Policy")]
    pub content_security_policy: Option<String>,
    #[serde(rename = "X-Content-Type-Options")]
    pub x_content_type_options: Option<String>,
    #[serde(rename = "X-Frame-Options")]
    pub x_frame_options: Option<String>,
    #[serde(rename = "Referrer-Policy")]
    pub referrer_policy: Option<String>,
    #[serde(rename = "Permissions-Policy")]
    pub permissions_policy: Option<String>,
    #[serde(rename = "Server")]
    pub server: Option<String>,
    #[serde(rename = "X-Powered-By")]
    pub x_powered_by: Option<String>,
}

impl SecurityHeadersSummary {
    /// Header name and value pairs in display order.
    pub fn entries(&self) -> [(&'static str, Option<&str>); 8] {
        [
            ("Strict-Transport-Security", self.strict_transport_security.as_deref()),
            ("Content-Security-Policy", self.content_security_policy.as_deref()),
            ("X-Content-Type-Options", self.x_content_type_options.as_deref()),
            ("X-Frame-Options", self.x_frame_options.as_deref()),
            ("Referrer-Policy", self.referrer_policy.as_deref()),
            ("Permissions-Policy", self.permissions_policy.as_deref()),
            ("Server", self.server.as_deref()),
            ("X-Powered-By", self.x_powered_by.as_deref()),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpHeadersReport {
    pub final_url: String,
    pub status_code: u16,
    pub all_headers: BTreeMap<String, String>,
    pub security_headers_summary: SecurityHeadersSummary,
}

/// The result of one completed job, tagged by the scan that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "scan_type", rename_all = "snake_case")]
pub enum ScanOutput {
    SslTls(SslTlsReport),
    HttpHeaders(HttpHeadersReport),
    Zap(ScanReport),
    Nuclei(ScanReport),
}

impl ScanOutput {
    pub fn kind(&self) -> ScanKind {
        match self {
            ScanOutput::SslTls(_) => ScanKind::SslTls,
            ScanOutput::HttpHeaders(_) => ScanKind::HttpHeaders,
            ScanOutput::Zap(_) => ScanKind::Zap,
            ScanOutput::Nuclei(_) => ScanKind::Nuclei,
        }
    }

    /// The vulnerability report, for outputs that carry one.
    pub fn report(&self) -> Option<&ScanReport> {
        match self {
            ScanOutput::Zap(report) | ScanOutput::Nuclei(report) => Some(report),
            _ => None,
        }
    }

    pub fn report_mut(&mut self) -> Option<&mut ScanReport> {
        match self {
            ScanOutput::Zap(report) | ScanOutput::Nuclei(report) => Some(report),
            _ => None,
        }
    }
}

// --- Adapter Errors ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCategory {
    SslError,
    DnsError,
    Timeout,
    ConnectionRefused,
    ConnectionError,
    RequestError,
    ProcessFailed,
    OutputParseError,
    Unknown,
}

/// Structured failure returned by an adapter instead of propagating a fault.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolError {
    pub category: ErrorCategory,
    #[serde(rename = "error")]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stdout: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stderr: Option<String>,
}

impl ToolError {
    pub fn new(category: ErrorCategory, message: impl Into<String>) -> Self {
        Self {
            category,
            message: message.into(),
            stdout: None,
            stderr: None,
        }
    }

    pub fn with_output(mut self, stdout: &str, stderr: &str) -> Self {
        self.stdout = Some(stdout.to_string()).filter(|s| !s.is_empty());
        self.stderr = Some(stderr.to_string()).filter(|s| !s.is_empty());
        self
    }

    pub fn kind(&self) -> ErrorKind {
        match self.category {
            ErrorCategory::OutputParseError => ErrorKind::ParseError,
            _ => ErrorKind::ToolExecutionError,
        }
    }
}

impl fmt::Display for ToolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.category, self.message)
    }
}

// --- Scan Configuration ---

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum ScanKind {
    SslTls,
    HttpHeaders,
    Zap,
    Nuclei,
}

impl ScanKind {
    pub fn task_name(&self) -> &'static str {
        match self {
            ScanKind::SslTls => "tasks.run_ssl_tls_scan",
            ScanKind::HttpHeaders => "tasks.run_http_headers_scan",
            ScanKind::Zap => "tasks.run_zap_scan",
            ScanKind::Nuclei => "tasks.run_nuclei_scan",
        }
    }

    pub fn from_task_name(task_name: &str) -> Option<Self> {
        ScanKind::iter().find(|kind| kind.task_name() == task_name)
    }

    pub fn label(&self) -> &'static str {
        match self {
            ScanKind::SslTls => "SSL/TLS",
            ScanKind::HttpHeaders => "HTTP Headers",
            ScanKind::Zap => "OWASP ZAP",
            ScanKind::Nuclei => "Nuclei",
        }
    }
}

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum ZapScanType {
    #[default]
    Baseline,
    Full,
    Api,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZapScanConfig {
    pub target_url: Url,
    #[serde(default)]
    pub scan_type: ZapScanType,
    #[serde(default)]
    pub api_definition_url: Option<Url>,
    /// ZAP context file, passed to the packaged scan as `-n`.
    #[serde(default)]
    pub context_id: Option<String>,
    #[serde(default)]
    pub other_options: Option<Map<String, Value>>,
}

impl ZapScanConfig {
    pub fn new(target_url: Url) -> Self {
        Self {
            target_url,
            scan_type: ZapScanType::default(),
            api_definition_url: None,
            context_id: None,
            other_options: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NucleiScanConfig {
    pub target_url: Url,
    #[serde(default)]
    pub templates: Option<Vec<String>>,
    #[serde(default)]
    pub severity: Option<Vec<String>>,
    #[serde(default)]
    pub other_options: Option<Map<String, Value>>,
}

impl NucleiScanConfig {
    pub fn new(target_url: Url) -> Self {
        Self {
            target_url,
            templates: None,
            severity: None,
            other_options: None,
        }
    }
}

/// An inbound scan request, before validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanSubmission {
    pub scan_type: ScanKind,
    pub target_url: String,
    #[serde(default)]
    pub zap_config: Option<ZapScanConfig>,
    #[serde(default)]
    pub nuclei_config: Option<NucleiScanConfig>,
}

impl ScanSubmission {
    pub fn new(scan_type: ScanKind, target_url: impl Into<String>) -> Self {
        Self {
            scan_type,
            target_url: target_url.into(),
            zap_config: None,
            nuclei_config: None,
        }
    }

    pub fn with_zap_config(mut self, config: ZapScanConfig) -> Self {
        self.zap_config = Some(config);
        self
    }

    pub fn with_nuclei_config(mut self, config: NucleiScanConfig) -> Self {
        self.nuclei_config = Some(config);
        self
    }
}

// --- Jobs ---

/// Opaque job identifier assigned by the execution facility.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for JobId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for JobId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Pending,
    Started,
    Success,
    Failure,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Success | JobStatus::Failure)
    }
}

/// Returned by the dispatcher. Carries no result data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobHandle {
    pub job_id: JobId,
    pub status: JobStatus,
}

/// The only failure shape handed to callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobError {
    pub kind: ErrorKind,
    pub error: String,
    #[serde(default)]
    pub traceback: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl JobError {
    pub fn new(kind: ErrorKind, error: impl Into<String>) -> Self {
        Self {
            kind,
            error: error.into(),
            traceback: None,
            details: None,
        }
    }

    pub fn with_traceback(mut self, traceback: impl Into<String>) -> Self {
        self.traceback = Some(traceback.into());
        self
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }
}

impl From<&ToolError> for JobError {
    fn from(tool_error: &ToolError) -> Self {
        let details = serde_json::to_value(tool_error).ok();
        Self {
            kind: tool_error.kind(),
            error: tool_error.to_string(),
            traceback: None,
            details,
        }
    }
}

/// Point-in-time view of a job. `result` and `error` are never both set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobView {
    pub job_id: JobId,
    pub status: JobStatus,
    pub result: Option<ScanOutput>,
    pub error: Option<JobError>,
}

impl JobView {
    pub fn in_progress(job_id: JobId, status: JobStatus) -> Self {
        Self { job_id, status, result: None, error: None }
    }

    pub fn success(job_id: JobId, output: ScanOutput) -> Self {
        Self { job_id, status: JobStatus::Success, result: Some(output), error: None }
    }

    pub fn failure(job_id: JobId, error: JobError) -> Self {
        Self { job_id, status: JobStatus::Failure, result: None, error: Some(error) }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}
