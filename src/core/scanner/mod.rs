// src/core/scanner/mod.rs

// Tool adapters. Each one takes a validated configuration and returns either
// its normalized output or a structured `ToolError`, never a fault.
pub mod headers_scanner;
pub mod nuclei_scanner;
pub mod process;
pub mod ssl_scanner;
pub mod zap_scanner;

use tracing::{Instrument, info_span};
use url::Url;

use crate::config::ScannerSettings;
use crate::core::models::{NucleiScanConfig, ScanKind, ScanOutput, ToolError, ZapScanConfig};
use self::headers_scanner::run_headers_scan;
use self::nuclei_scanner::run_nuclei_scan;
use self::ssl_scanner::run_ssl_scan;
use self::zap_scanner::run_zap_scan;

/// A validated, immutable scan configuration: the single input of an adapter.
#[derive(Debug, Clone, PartialEq)]
pub enum ScanConfig {
    /// `port` is resolved at validation time, while the raw target is still at hand.
    SslTls { target_url: Url, port: u16 },
    HttpHeaders { target_url: Url },
    Zap(ZapScanConfig),
    Nuclei(NucleiScanConfig),
}

impl ScanConfig {
    pub fn kind(&self) -> ScanKind {
        match self {
            ScanConfig::SslTls { .. } => ScanKind::SslTls,
            ScanConfig::HttpHeaders { .. } => ScanKind::HttpHeaders,
            ScanConfig::Zap(_) => ScanKind::Zap,
            ScanConfig::Nuclei(_) => ScanKind::Nuclei,
        }
    }

    pub fn target_url(&self) -> &Url {
        match self {
            ScanConfig::SslTls { target_url, .. } | ScanConfig::HttpHeaders { target_url } => target_url,
            ScanConfig::Zap(config) => &config.target_url,
            ScanConfig::Nuclei(config) => &config.target_url,
        }
    }
}

/// Runs the adapter matching `config`.
pub async fn run_scan(config: &ScanConfig, settings: &ScannerSettings) -> Result<ScanOutput, ToolError> {
    let span = info_span!("scan", kind = %config.kind(), target = %config.target_url());
    async move {
        match config {
            ScanConfig::SslTls { target_url, port } => run_ssl_scan(target_url, *port, settings.network_timeout())
                .await
                .map(ScanOutput::SslTls),
            ScanConfig::HttpHeaders { target_url } => run_headers_scan(target_url, settings)
                .await
                .map(ScanOutput::HttpHeaders),
            ScanConfig::Zap(zap_config) => run_zap_scan(zap_config, settings).await.map(ScanOutput::Zap),
            ScanConfig::Nuclei(nuclei_config) => run_nuclei_scan(nuclei_config, settings)
                .await
                .map(ScanOutput::Nuclei),
        }
    }
    .instrument(span)
    .await
}
