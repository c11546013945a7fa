// src/core/error.rs

use serde::{Deserialize, Serialize};
use strum::Display;
use thiserror::Error;

use crate::core::models::{JobError, JobId};

/// Classification attached to every failure a caller can observe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// Missing or mismatched scan configuration, invalid severity threshold.
    ConfigurationError,
    /// Network, protocol, timeout or process failure inside an adapter.
    ToolExecutionError,
    /// Tool output that could not be decoded.
    ParseError,
    /// Unknown job id, or a result past its retention window.
    NotFoundError,
    /// The execution facility stopped the task at its time limit.
    TimeLimitExceeded,
    /// A task that panicked or whose result could not be interpreted.
    InternalError,
}

/// Errors raised synchronously by the caller-facing operations.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Job '{0}' not found or its result has expired")]
    NotFound(JobId),

    #[error("Execution facility error: {0}")]
    Facility(String),
}

impl CoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CoreError::Configuration(_) => ErrorKind::ConfigurationError,
            CoreError::NotFound(_) => ErrorKind::NotFoundError,
            CoreError::Facility(_) => ErrorKind::InternalError,
        }
    }

    pub fn to_job_error(&self) -> JobError {
        JobError::new(self.kind(), self.to_string())
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
