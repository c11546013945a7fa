// src/core/jobs/tracker.rs

use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::{debug, error, warn};

use crate::core::error::{CoreError, ErrorKind, Result};
use crate::core::jobs::facility::{ExecutionFacility, FailureInfo, TaskState};
use crate::core::models::{JobError, JobId, JobStatus, JobView, ScanOutput, ToolError};

const NON_DICT_FAILURE: &str = "Task failed with non-dictionary info";

/// Reports job state without blocking. Callers poll until a terminal view.
#[derive(Clone)]
pub struct JobTracker {
    facility: Arc<dyn ExecutionFacility>,
}

impl JobTracker {
    pub fn new(facility: Arc<dyn ExecutionFacility>) -> Self {
        Self { facility }
    }

    pub async fn status(&self, job_id: &JobId) -> Result<JobView> {
        let state = self.facility.query(job_id).await.ok_or_else(|| {
            warn!(job_id = %job_id, "Status requested for an unknown or expired job.");
            CoreError::NotFound(job_id.clone())
        })?;

        let view = match state {
            TaskState::Pending => JobView::in_progress(job_id.clone(), JobStatus::Pending),
            TaskState::Started => JobView::in_progress(job_id.clone(), JobStatus::Started),
            TaskState::Success(value) => match decode_output(value) {
                Ok(output) => JobView::success(job_id.clone(), output),
                Err(job_error) => JobView::failure(job_id.clone(), job_error),
            },
            TaskState::Failure(info) => JobView::failure(job_id.clone(), coerce_failure(info)),
        };

        debug!(job_id = %job_id, status = %view.status, "Job status read.");
        Ok(view)
    }
}

fn decode_output(value: Value) -> std::result::Result<ScanOutput, JobError> {
    serde_json::from_value::<ScanOutput>(value.clone()).map_err(|e| {
        error!(error = %e, "Stored task result does not decode as a scan output.");
        JobError::new(
            ErrorKind::InternalError,
            format!("Task result could not be decoded: {}", e),
        )
        .with_details(value)
    })
}

/// Converts whatever the facility recorded into the caller-facing error shape.
pub fn coerce_failure(info: FailureInfo) -> JobError {
    match info {
        FailureInfo::Returned(value) => coerce_returned(value),
        FailureInfo::Panicked { message, traceback } => {
            JobError::new(ErrorKind::InternalError, message).with_traceback(traceback)
        }
        FailureInfo::TimeLimitExceeded { limit_secs } => JobError::new(
            ErrorKind::TimeLimitExceeded,
            format!("Task exceeded its time limit of {} seconds", limit_secs),
        ),
        FailureInfo::Lost(message) => JobError::new(ErrorKind::InternalError, message),
    }
}

fn coerce_returned(value: Value) -> JobError {
    if let Ok(job_error) = serde_json::from_value::<JobError>(value.clone()) {
        return job_error;
    }
    if let Ok(tool_error) = serde_json::from_value::<ToolError>(value.clone()) {
        return JobError::from(&tool_error);
    }

    match value {
        Value::Object(map) => coerce_object(map),
        other => {
            warn!("Task failure info was not a dictionary.");
            let details = match other {
                Value::String(text) => text,
                other => other.to_string(),
            };
            JobError::new(ErrorKind::InternalError, NON_DICT_FAILURE).with_details(Value::String(details))
        }
    }
}

fn coerce_object(map: Map<String, Value>) -> JobError {
    let error = match map.get("error") {
        Some(Value::String(text)) => text.clone(),
        Some(other) => other.to_string(),
        None => "Task failed without an error message".to_string(),
    };
    let traceback = map.get("traceback").and_then(Value::as_str).map(String::from);

    JobError {
        kind: ErrorKind::InternalError,
        error,
        traceback,
        details: Some(Value::Object(map)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::ErrorCategory;
    use serde_json::json;

    #[test]
    fn test_structured_errors_pass_through() {
        let original = JobError::new(ErrorKind::ToolExecutionError, "TIMEOUT: took too long").with_traceback("span");
        let coerced = coerce_failure(FailureInfo::Returned(serde_json::to_value(&original).unwrap()));
        assert_eq!(coerced, original);
    }

    #[test]
    fn test_tool_errors_keep_their_category() {
        let tool_error = ToolError::new(ErrorCategory::OutputParseError, "bad json");
        let coerced = coerce_failure(FailureInfo::Returned(serde_json::to_value(&tool_error).unwrap()));
        assert_eq!(coerced.kind, ErrorKind::ParseError);
        assert_eq!(coerced.details.unwrap()["category"], "OUTPUT_PARSE_ERROR");
    }

    #[test]
    fn test_dictionary_without_kind_is_wrapped() {
        let coerced = coerce_failure(FailureInfo::Returned(json!({"error": "boom", "traceback": "line 1"})));
        assert_eq!(coerced.kind, ErrorKind::InternalError);
        assert_eq!(coerced.error, "boom");
        assert_eq!(coerced.traceback.as_deref(), Some("line 1"));
    }

    #[test]
    fn test_non_dictionary_failure_is_coerced() {
        let coerced = coerce_failure(FailureInfo::Returned(json!(["not", "a", "dict"])));
        assert_eq!(coerced.error, NON_DICT_FAILURE);
        assert_eq!(coerced.details, Some(json!(r#"["not","a","dict"]"#)));

        let value = serde_json::to_value(&coerced).unwrap();
        assert!(value.get("traceback").is_some());
    }

    #[test]
    fn test_panics_and_time_limits() {
        let panicked = coerce_failure(FailureInfo::Panicked {
            message: "index out of bounds".to_string(),
            traceback: "task panicked: index out of bounds".to_string(),
        });
        assert_eq!(panicked.kind, ErrorKind::InternalError);
        assert!(panicked.traceback.is_some());

        let timed_out = coerce_failure(FailureInfo::TimeLimitExceeded { limit_secs: 900 });
        assert_eq!(timed_out.kind, ErrorKind::TimeLimitExceeded);
    }

    #[test]
    fn test_undecodable_success_becomes_failure() {
        let error = decode_output(json!({"scan_type": "port_scan"})).unwrap_err();
        assert_eq!(error.kind, ErrorKind::InternalError);
        assert!(error.details.is_some());
    }
}
