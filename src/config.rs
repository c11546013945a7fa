// src/config.rs

//! Runtime settings: defaults, an optional TOML file, then environment overrides.

use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::core::models::ZapScanType;
use crate::logging::PROJECT_NAME;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid value for {key}: {message}")]
    Invalid { key: String, message: String },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub scanner: ScannerSettings,
    pub worker: WorkerSettings,
    pub logging: LoggingSettings,
}

/// Settings consumed by the tool adapters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScannerSettings {
    /// Timeout applied to the network-probing adapters (TLS, HTTP headers).
    pub network_timeout_secs: u64,
    pub user_agent: String,
    pub zap: ZapSettings,
    pub nuclei: NucleiSettings,
}

impl Default for ScannerSettings {
    fn default() -> Self {
        Self {
            network_timeout_secs: 10,
            user_agent: "StackGuardRS/0.1".to_string(),
            zap: ZapSettings::default(),
            nuclei: NucleiSettings::default(),
        }
    }
}

impl ScannerSettings {
    pub fn network_timeout(&self) -> Duration {
        Duration::from_secs(self.network_timeout_secs)
    }
}

/// ZAP packaged scan scripts. Each command is the program followed by any
/// leading arguments, so the scripts can be wrapped in `docker run`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ZapSettings {
    pub baseline_command: Vec<String>,
    pub full_scan_command: Vec<String>,
    pub api_scan_command: Vec<String>,
    pub api_key: Option<String>,
}

impl Default for ZapSettings {
    fn default() -> Self {
        Self {
            baseline_command: vec!["zap-baseline.py".to_string()],
            full_scan_command: vec!["zap-full-scan.py".to_string()],
            api_scan_command: vec!["zap-api-scan.py".to_string()],
            api_key: None,
        }
    }
}

impl ZapSettings {
    pub fn command_for(&self, scan_type: ZapScanType) -> &[String] {
        match scan_type {
            ZapScanType::Baseline => &self.baseline_command,
            ZapScanType::Full => &self.full_scan_command,
            ZapScanType::Api => &self.api_scan_command,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NucleiSettings {
    pub command: Vec<String>,
}

impl Default for NucleiSettings {
    fn default() -> Self {
        Self { command: vec!["nuclei".to_string()] }
    }
}

/// Settings for the in-process execution facility.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerSettings {
    pub concurrency: usize,
    /// Hard limit per task. `None` lets tasks run to completion.
    pub task_time_limit_secs: Option<u64>,
    /// How long terminal results stay queryable.
    pub result_retention_secs: u64,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            concurrency: 4,
            task_time_limit_secs: Some(900),
            result_retention_secs: 86_400,
        }
    }
}

impl WorkerSettings {
    pub fn task_time_limit(&self) -> Option<Duration> {
        self.task_time_limit_secs.map(Duration::from_secs)
    }

    pub fn result_retention(&self) -> Duration {
        Duration::from_secs(self.result_retention_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self { level: "info".to_string() }
    }
}

impl Settings {
    /// `<platform config dir>/config.toml`, when a home directory can be found.
    pub fn default_config_path() -> Option<PathBuf> {
        ProjectDirs::from("com", "stackguard-rs", env!("CARGO_PKG_NAME"))
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Loads settings from `path` (which must exist) or from the default
    /// location when present, then applies `STACKGUARD_RS_*` overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut settings = match path {
            Some(path) => Self::from_file(path)?,
            None => match Self::default_config_path().filter(|p| p.exists()) {
                Some(default_path) => Self::from_file(&default_path)?,
                None => {
                    debug!("No config file found, using defaults.");
                    Self::default()
                }
            },
        };

        settings.apply_env_overrides(|key| std::env::var(key).ok())?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(path = %path.display(), "Loaded config file.");
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Applies overrides read through `lookup`, keyed by the full variable name.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |suffix: &str| {
            let key = format!("{}_{}", *PROJECT_NAME, suffix);
            lookup(&key).map(|value| (key, value))
        };

        if let Some((_, value)) = var("ZAP_API_KEY") {
            self.scanner.zap.api_key = Some(value).filter(|v| !v.is_empty());
        }
        if let Some((_, value)) = var("ZAP_COMMAND") {
            self.scanner.zap.baseline_command = split_command(&value);
        }
        if let Some((_, value)) = var("NUCLEI_COMMAND") {
            self.scanner.nuclei.command = split_command(&value);
        }
        if let Some((key, value)) = var("NETWORK_TIMEOUT_SECS") {
            self.scanner.network_timeout_secs = parse_number(&key, &value)?;
        }
        if let Some((key, value)) = var("WORKER_CONCURRENCY") {
            self.worker.concurrency = parse_number(&key, &value)?;
        }
        if let Some((key, value)) = var("TASK_TIME_LIMIT_SECS") {
            let limit: u64 = parse_number(&key, &value)?;
            self.worker.task_time_limit_secs = Some(limit).filter(|l| *l > 0);
        }
        if let Some((key, value)) = var("RESULT_RETENTION_SECS") {
            self.worker.result_retention_secs = parse_number(&key, &value)?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |key: &str, message: &str| ConfigError::Invalid {
            key: key.to_string(),
            message: message.to_string(),
        };

        if self.worker.concurrency == 0 {
            return Err(invalid("worker.concurrency", "must be at least 1"));
        }
        if self.scanner.network_timeout_secs == 0 {
            return Err(invalid("scanner.network_timeout_secs", "must be at least 1"));
        }
        let commands = [
            ("scanner.zap.baseline_command", &self.scanner.zap.baseline_command),
            ("scanner.zap.full_scan_command", &self.scanner.zap.full_scan_command),
            ("scanner.zap.api_scan_command", &self.scanner.zap.api_scan_command),
            ("scanner.nuclei.command", &self.scanner.nuclei.command),
        ];
        for (key, command) in commands {
            if command.is_empty() {
                return Err(invalid(key, "command must name a program"));
            }
        }
        Ok(())
    }
}

fn split_command(value: &str) -> Vec<String> {
    value.split_whitespace().map(String::from).collect()
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
        key: key.to_string(),
        message: e.to_string(),
    })
}
